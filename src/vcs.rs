use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use url::Url;

use crate::auth::Token;
use crate::error::{MigrafixError, Result};
use crate::exec::{CommandRunner, Invocation};

/// Remote repository reference.
#[derive(Debug, Clone)]
pub struct Repository {
    url: Url,
    name: String,
}

impl Repository {
    /// Parses an `https` clone URL such as `https://github.com/owner/repo.git`.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)
            .map_err(|e| MigrafixError::InvalidRepository(format!("{raw}: {e}")))?;

        if url.scheme() != "https" {
            return Err(MigrafixError::InvalidRepository(format!(
                "{raw}: only https URLs are supported"
            )));
        }

        let name = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|segment| segment.trim_end_matches(".git").to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                MigrafixError::InvalidRepository(format!("{raw}: no repository name in path"))
            })?;

        Ok(Self { url, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Clone/push URL with the token embedded as user-info.
    pub fn authenticated_url(&self, token: Option<&Token>) -> Result<String> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Ok(self.url.to_string());
        };
        let mut url = self.url.clone();
        url.set_username(token.as_str()).map_err(|()| {
            MigrafixError::InvalidRepository(format!("{}: cannot embed credentials", self.url))
        })?;
        Ok(url.to_string())
    }
}

/// Issues timestamp-qualified branch names that are never repeated within
/// one invocation.
#[derive(Debug)]
pub struct BranchNamer {
    base: String,
    issued: HashSet<String>,
}

impl BranchNamer {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            issued: HashSet::new(),
        }
    }

    pub fn next(&mut self, now: DateTime<Utc>) -> String {
        let stamp = now.format("%Y%m%d-%H%M%S-%3f");
        let candidate = format!("{}-{stamp}", self.base);

        let mut name = candidate.clone();
        let mut counter = 1;
        while self.issued.contains(&name) {
            counter += 1;
            name = format!("{candidate}-{counter}");
        }
        self.issued.insert(name.clone());
        name
    }
}

/// Optional commit identity passed as `-c user.name=... -c user.email=...`.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Git operations consumed by the pipeline.
pub struct Git<'a, R> {
    runner: &'a R,
    program: String,
    identity: Identity,
    token: Option<Token>,
}

impl<'a, R: CommandRunner> Git<'a, R> {
    pub fn new(runner: &'a R, program: impl Into<String>, identity: Identity, token: Option<Token>) -> Self {
        Self {
            runner,
            program: program.into(),
            identity,
            token,
        }
    }

    fn invocation(&self, subcommand: &str) -> Invocation {
        Invocation::new(&self.program)
            .masking(self.token.as_ref())
            .labelled(format!("{} {subcommand}", self.program))
    }

    /// Clones `repository` into `dest` and returns the local path.
    pub async fn clone_into(&self, repository: &Repository, dest: &Path) -> Result<PathBuf> {
        let url = repository.authenticated_url(self.token.as_ref())?;
        let invocation = self
            .invocation("clone")
            .arg("clone")
            .arg(url)
            .arg(dest.to_string_lossy());
        self.runner.run_checked(&invocation).await?;
        Ok(dest.to_path_buf())
    }

    pub async fn checkout_new_branch(&self, workdir: &Path, branch: &str) -> Result<()> {
        let invocation = self
            .invocation("checkout")
            .args(["checkout", "-b", branch])
            .current_dir(workdir);
        self.runner.run_checked(&invocation).await?;
        Ok(())
    }

    pub async fn stage_all(&self, workdir: &Path) -> Result<()> {
        let invocation = self.invocation("add").args(["add", "--all"]).current_dir(workdir);
        self.runner.run_checked(&invocation).await?;
        Ok(())
    }

    pub async fn commit(&self, workdir: &Path, message: &str) -> Result<()> {
        let mut invocation = self.invocation("commit");
        if let Some(name) = &self.identity.name {
            invocation = invocation.arg("-c").arg(format!("user.name={name}"));
        }
        if let Some(email) = &self.identity.email {
            invocation = invocation.arg("-c").arg(format!("user.email={email}"));
        }
        let invocation = invocation.args(["commit", "-m", message]).current_dir(workdir);
        self.runner.run_checked(&invocation).await?;
        Ok(())
    }

    pub async fn push(&self, workdir: &Path, repository: &Repository, branch: &str) -> Result<()> {
        let url = repository.authenticated_url(self.token.as_ref())?;
        let invocation = self
            .invocation("push")
            .arg("push")
            .arg(url)
            .arg(branch)
            .current_dir(workdir);
        self.runner.run_checked(&invocation).await?;
        Ok(())
    }
}
