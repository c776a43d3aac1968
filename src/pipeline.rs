use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{info, warn};
use uuid::Uuid;

use crate::auth::Token;
use crate::config::Config;
use crate::engine::{plan_stages, Engine, TransformationStage};
use crate::error::{MigrafixError, Result};
use crate::exec::{CommandRunner, Invocation};
use crate::locate::SourceLayout;
use crate::oracle::FixOracle;
use crate::outcome::{AppliedStage, Outcome, RunSummary, TestCounts};
use crate::output;
use crate::repair::{RepairLoop, RepairReport, RetryPolicy};
use crate::report::{parse_reports, ReportLayout, TestReport};
use crate::toolchain::Toolchain;
use crate::vcs::{BranchNamer, Git, Identity, Repository};

/// States a run passes through, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Acquired,
    Transformed { stage: String },
    Tested,
    Clean,
    Repairing { failing: usize },
    Retested,
    Finalized { branch: String },
    Released,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquired => write!(f, "Acquired workspace"),
            Self::Transformed { stage } => write!(f, "Transformed ({stage})"),
            Self::Tested => write!(f, "Tested"),
            Self::Clean => write!(f, "Clean: no failing tests"),
            Self::Repairing { failing } => write!(f, "Repairing {failing} failing tests"),
            Self::Retested => write!(f, "Retested"),
            Self::Finalized { branch } => write!(f, "Finalized branch {branch}"),
            Self::Released => write!(f, "Released workspace"),
        }
    }
}

/// Per-invocation inputs that do not come from the config file.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub repository: Repository,
    pub token: Option<Token>,
    pub push: bool,
}

/// Exclusively owned working copy for one run.
#[derive(Debug)]
struct Workspace {
    run_dir: PathBuf,
    path: PathBuf,
}

impl Workspace {
    fn allocate(root: &Path, repository: &Repository) -> Result<Self> {
        let run_id = format!(
            "{}-{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let run_dir = root.join(run_id);
        fs::create_dir_all(&run_dir)?;
        let path = run_dir.join(repository.name());
        Ok(Self { run_dir, path })
    }

    /// Deletes the workspace; failures are logged only.
    fn release(self) {
        match fs::remove_dir_all(&self.run_dir) {
            Ok(()) => info!("{}: {}", RunState::Released, self.run_dir.display()),
            Err(e) => warn!(
                "Failed to delete workspace {}: {e}",
                self.run_dir.display()
            ),
        }
    }
}

/// Drives one run from clone to workspace release.
///
/// Every stage is fatal on failure except the oracle retries inside the
/// repair loop. The workspace is released once it exists, whatever the
/// outcome.
pub struct Pipeline<'a, R, O> {
    runner: &'a R,
    oracle: &'a O,
    config: &'a Config,
    namer: BranchNamer,
}

impl<'a, R: CommandRunner, O: FixOracle> Pipeline<'a, R, O> {
    pub fn new(runner: &'a R, oracle: &'a O, config: &'a Config) -> Self {
        Self {
            runner,
            oracle,
            config,
            namer: BranchNamer::new(&config.git.branch),
        }
    }

    fn git(&self, token: Option<&Token>) -> Git<'a, R> {
        Git::new(
            self.runner,
            &self.config.git.program,
            Identity {
                name: self.config.git.author_name.clone(),
                email: self.config.git.author_email.clone(),
            },
            token.cloned(),
        )
    }

    /// Executes one full run.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: invalid configuration, a failed clone,
    /// a failed or misconfigured transformation stage, a test toolchain that
    /// cannot be started or produced no reports, a malformed report, or a
    /// failed git operation during finalization. The workspace is released
    /// before the error is returned.
    pub async fn run(&mut self, options: &RunOptions) -> Result<RunSummary> {
        self.config.validate(false)?;
        let stages = plan_stages(self.config)?;
        let started_at = Utc::now();

        let workspace = Workspace::allocate(
            &self.config.workspace.resolved_root(),
            &options.repository,
        )?;

        let result = self
            .acquire_and_execute(&workspace, &stages, options, started_at)
            .await;
        workspace.release();

        let mut summary = result?;
        summary.finished_at = Utc::now();
        Ok(summary)
    }

    async fn acquire_and_execute(
        &mut self,
        workspace: &Workspace,
        stages: &[TransformationStage],
        options: &RunOptions,
        started_at: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let total_steps = 4;
        let git = self.git(options.token.as_ref());

        output::print_phase(1, total_steps, "Acquiring workspace");
        git.clone_into(&options.repository, &workspace.path).await?;
        info!("{}: {}", RunState::Acquired, workspace.path.display());

        output::print_phase(2, total_steps, "Applying transformations");
        self.transform(&workspace.path, stages).await?;

        output::print_phase(3, total_steps, "Running tests");
        let initial = self.run_tests(&workspace.path).await?;
        info!("{}", RunState::Tested);

        let (repair, final_report) = if initial.is_clean() {
            info!("{}", RunState::Clean);
            (RepairReport::default(), initial.clone())
        } else {
            info!(
                "{}",
                RunState::Repairing {
                    failing: initial.failing_count()
                }
            );
            let layout = SourceLayout::from_config(&workspace.path, &self.config.tests);
            let failing = initial.failing();
            let repair = RepairLoop::new(
                self.oracle,
                &layout,
                RetryPolicy::from_config(&self.config.oracle),
            )
            .repair(&failing)
            .await?;
            info!(
                "Repair round fixed {} of {} failing tests ({} unresolved)",
                repair.fixed_count(),
                failing.len(),
                repair.unresolved().len()
            );

            let retested = self.run_tests(&workspace.path).await?;
            info!("{}", RunState::Retested);
            (repair, retested)
        };

        output::print_phase(4, total_steps, "Publishing result branch");
        let outcome = if final_report.is_clean() {
            Outcome::Clean
        } else {
            Outcome::ResidualFailures
        };
        let branch = self.namer.next(Utc::now());
        let message = commit_message(&self.config.git.commit_message, &final_report);

        git.checkout_new_branch(&workspace.path, &branch).await?;
        git.stage_all(&workspace.path).await?;
        git.commit(&workspace.path, &message).await?;
        if options.push {
            git.push(&workspace.path, &options.repository, &branch)
                .await?;
        } else {
            info!("Skipping push of {branch}");
        }
        info!(
            "{}",
            RunState::Finalized {
                branch: branch.clone()
            }
        );

        Ok(RunSummary {
            repository: options.repository.url().to_string(),
            branch,
            workspace: workspace.path.clone(),
            started_at,
            finished_at: Utc::now(),
            stages: stages.iter().map(AppliedStage::from).collect(),
            initial_tests: TestCounts::from(&initial),
            final_tests: TestCounts::from(&final_report),
            repairs: repair.outcomes,
            records: final_report.records().to_vec(),
            outcome,
            pushed: options.push,
        })
    }

    async fn transform(&self, workdir: &Path, stages: &[TransformationStage]) -> Result<()> {
        let engine = Engine::new(self.runner, &self.config.engine.program);

        let first = stages
            .first()
            .ok_or_else(|| MigrafixError::Config("no transformation stages".to_string()))?;
        engine.build_context(workdir, &first.toolchain).await?;

        for (index, stage) in stages.iter().enumerate() {
            if stage.position != index {
                return Err(MigrafixError::Config(format!(
                    "stage '{}' is out of order (position {}, expected {index})",
                    stage.name, stage.position
                )));
            }
            engine.apply_stage(workdir, stage).await?;
            info!(
                "{}",
                RunState::Transformed {
                    stage: stage.name.clone()
                }
            );
        }
        Ok(())
    }

    /// Runs the suite and parses its reports. Failing tests are expected;
    /// a toolchain that cannot start or leaves no reports is fatal.
    async fn run_tests(&self, workdir: &Path) -> Result<TestReport> {
        let tests = &self.config.tests;
        let report_dir = workdir.join(&tests.report_dir);
        if report_dir.exists() {
            fs::remove_dir_all(&report_dir)?;
        }

        let overlay = match &tests.toolchain {
            Some(name) => {
                let home = self.config.toolchains.get(name).ok_or_else(|| {
                    MigrafixError::Config(format!("tests require undeclared toolchain '{name}'"))
                })?;
                Toolchain::new(name, home).activate()?
            }
            None => IndexMap::new(),
        };

        let invocation = Invocation::new(&tests.program)
            .args(tests.args.iter().cloned())
            .current_dir(workdir)
            .envs(&overlay);
        let result = self.runner.run(&invocation).await?;
        if !result.success() {
            warn!(
                "{} exited with {:?}; reading test reports",
                invocation.operation(),
                result.code
            );
        }

        let layout = ReportLayout {
            prefix: tests.report_prefix.clone(),
            suffix: tests.report_suffix.clone(),
        };
        let report = parse_reports(&report_dir, &layout)?;
        if !report.tests_ran() {
            return Err(MigrafixError::ReportMissing(report_dir));
        }
        output::print_records(&report);
        Ok(report)
    }
}

/// Commit message for the result branch; residual failures are spelled out.
pub fn commit_message(base: &str, report: &TestReport) -> String {
    let failing = report.failing();
    if failing.is_empty() {
        return base.to_string();
    }

    let mut message = format!("{base} ({} residual test failures)\n\n", failing.len());
    message.push_str("Tests still failing after automated repair:\n");
    for record in failing {
        message.push_str("- ");
        message.push_str(&record.qualified_name());
        message.push('\n');
    }
    message
}
