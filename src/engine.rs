use std::path::Path;

use log::info;

use crate::config::Config;
use crate::error::{MigrafixError, Result};
use crate::exec::{CommandRunner, Invocation};
use crate::toolchain::Toolchain;

/// One ordered, named recipe run with its toolchain precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformationStage {
    pub name: String,
    pub recipe: String,
    pub position: usize,
    pub toolchain: Toolchain,
}

/// Builds the stage list from configuration, in declared order.
pub fn plan_stages(config: &Config) -> Result<Vec<TransformationStage>> {
    config
        .stages
        .iter()
        .enumerate()
        .map(|(position, stage)| {
            let home = config.toolchains.get(&stage.toolchain).ok_or_else(|| {
                MigrafixError::Config(format!(
                    "stage '{}' requires undeclared toolchain '{}'",
                    stage.name, stage.toolchain
                ))
            })?;
            Ok(TransformationStage {
                name: stage.name.clone(),
                recipe: stage.recipe.clone(),
                position,
                toolchain: Toolchain::new(&stage.toolchain, home),
            })
        })
        .collect()
}

/// The recipe engine CLI (`mod build`, `mod run`, `mod git apply`).
pub struct Engine<'a, R> {
    runner: &'a R,
    program: String,
}

impl<'a, R: CommandRunner> Engine<'a, R> {
    pub fn new(runner: &'a R, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    pub async fn build_context(&self, workspace: &Path, toolchain: &Toolchain) -> Result<()> {
        let overlay = toolchain.activate()?;
        let invocation = Invocation::new(&self.program)
            .args(["build", "."])
            .current_dir(workspace)
            .envs(&overlay);
        self.runner.run_checked(&invocation).await?;
        Ok(())
    }

    /// Runs the stage's recipe and materializes the edits into the working tree.
    pub async fn apply_stage(&self, workspace: &Path, stage: &TransformationStage) -> Result<()> {
        let overlay = stage.toolchain.activate()?;
        info!(
            "Stage {} '{}': recipe {} with toolchain {}",
            stage.position + 1,
            stage.name,
            stage.recipe,
            stage.toolchain.name
        );

        let run = Invocation::new(&self.program)
            .args(["run", ".", "--recipe", stage.recipe.as_str()])
            .current_dir(workspace)
            .envs(&overlay);
        self.runner.run_checked(&run).await?;

        let apply = Invocation::new(&self.program)
            .args(["git", "apply", ".", "--last-recipe-run"])
            .current_dir(workspace)
            .envs(&overlay);
        self.runner.run_checked(&apply).await?;
        Ok(())
    }
}
