use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::auth::Token;
use crate::config::Config;
use crate::error::MigrafixError;
use crate::exec::SystemRunner;
use crate::oracle::GeminiOracle;
use crate::output;
use crate::pipeline::{Pipeline, RunOptions};
use crate::report::{parse_reports, ReportLayout};
use crate::vcs::Repository;

#[derive(Parser)]
#[command(name = "migrafix")]
#[command(author, version, about = "Automated upgrade and test repair", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone, transform, test, repair and publish a repository
    Upgrade {
        #[arg(short, long)]
        repo: String,

        #[arg(short, long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Base name of the result branch
        #[arg(short, long)]
        branch: Option<String>,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        workspace_root: Option<PathBuf>,

        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
        oracle_key: Option<String>,

        #[arg(short, long)]
        model: Option<String>,

        #[arg(long)]
        max_attempts: Option<u32>,

        #[arg(long)]
        retry_delay_secs: Option<u64>,

        /// Commit the result branch locally without pushing it
        #[arg(long, default_value_t = false)]
        no_push: bool,
    },

    /// Print the test records found in a report directory
    Report {
        dir: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    fn write_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let Some(output_path) = &self.output else {
            return Ok(());
        };

        let json_output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        std::fs::write(output_path, json_output)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        info!("Run summary written to: {}", output_path.display());
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_upgrade(
        &self,
        repo: &str,
        token: Option<&str>,
        branch: Option<&str>,
        config_path: Option<&Path>,
        workspace_root: Option<&Path>,
        oracle_key: Option<&str>,
        model: Option<&str>,
        max_attempts: Option<u32>,
        retry_delay_secs: Option<u64>,
        no_push: bool,
    ) -> Result<()> {
        let mut config = Config::load(config_path)?;
        if let Some(branch) = branch {
            config.git.branch = branch.to_owned();
        }
        if let Some(root) = workspace_root {
            config.workspace.root = Some(root.to_path_buf());
        }
        if let Some(key) = oracle_key {
            config.oracle.api_key = Some(key.to_owned());
        }
        if let Some(model) = model {
            config.oracle.model = model.to_owned();
        }
        if let Some(attempts) = max_attempts {
            config.oracle.max_attempts = attempts;
        }
        if let Some(delay) = retry_delay_secs {
            config.oracle.retry_delay_secs = delay;
        }
        config.validate(true)?;

        let repository = Repository::parse(repo)?;
        info!("Upgrading repository: {}", repository.url());

        let api_key = Token::from(config.oracle.api_key.clone().unwrap_or_default());
        let oracle = GeminiOracle::new(&config.oracle, api_key)
            .context("Failed to build the fix oracle client")?;
        let runner = SystemRunner;

        let options = RunOptions {
            repository,
            token: token.filter(|t| !t.is_empty()).map(Token::from),
            push: !no_push,
        };

        let summary = Pipeline::new(&runner, &oracle, &config)
            .run(&options)
            .await
            .with_context(|| format!("Upgrade of {repo} aborted"))?;

        output::print_summary(&summary);
        self.write_json(&summary)?;
        Ok(())
    }

    fn execute_report(&self, dir: &Path, config_path: Option<&Path>) -> Result<()> {
        let config = Config::load(config_path)?;
        let layout = ReportLayout {
            prefix: config.tests.report_prefix,
            suffix: config.tests.report_suffix,
        };

        let report = parse_reports(dir, &layout)?;
        if !report.tests_ran() {
            return Err(MigrafixError::ReportMissing(dir.to_path_buf()).into());
        }

        output::print_records(&report);
        self.write_json(&report.records())?;
        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Upgrade {
                repo,
                token,
                branch,
                config,
                workspace_root,
                oracle_key,
                model,
                max_attempts,
                retry_delay_secs,
                no_push,
            } => {
                self.execute_upgrade(
                    repo,
                    token.as_deref(),
                    branch.as_deref(),
                    config.as_deref(),
                    workspace_root.as_deref(),
                    oracle_key.as_deref(),
                    model.as_deref(),
                    *max_attempts,
                    *retry_delay_secs,
                    *no_push,
                )
                .await
            }
            Commands::Report { dir, config } => self.execute_report(dir, config.as_deref()),
        }
    }
}
