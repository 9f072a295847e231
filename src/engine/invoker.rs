use crate::definition::options::BuildConfig;
use crate::engine::EngineSettings;
use crate::Recipe;
use std::process::ExitStatus;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug)]
pub struct Invoker {
    settings: Arc<EngineSettings>,
}

/// The toolchain could not be run at all. Distinct from the toolchain
/// running and failing, which is a [`BuildError`].
#[derive(Debug, Error)]
#[error("could not start toolchain `{command}`")]
pub struct ProcessError {
    pub command: String,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("toolchain exited with code {code} (`{command}`)")]
    BuildFailed { code: i32, command: String },
    #[error("toolchain was terminated by a signal (`{command}`)")]
    Interrupted { command: String },
}

/// A finished toolchain invocation. The exit status is plain data here;
/// turning a non-zero status into an error is [`ToolchainRun::check`]'s job,
/// so callers can record the run before deciding what it means.
#[derive(Debug)]
pub struct ToolchainRun {
    pub command: String,
    pub status: ExitStatus,
}

impl ToolchainRun {
    pub fn check(&self) -> Result<(), BuildError> {
        if self.status.success() {
            return Ok(());
        }

        match self.status.code() {
            Some(code) => Err(BuildError::BuildFailed {
                code,
                command: self.command.clone(),
            }),
            None => Err(BuildError::Interrupted {
                command: self.command.clone(),
            }),
        }
    }
}

impl Invoker {
    pub fn new(settings: Arc<EngineSettings>) -> Self {
        Invoker { settings }
    }

    /// Runs the toolchain inside the build tree and waits for it, however
    /// long it takes. The environment is inherited untouched and the flag
    /// order never varies.
    pub async fn invoke(
        &self,
        recipe: &Recipe,
        config: BuildConfig,
    ) -> Result<ToolchainRun, ProcessError> {
        let build_tree = self.settings.build_tree_for(recipe, config);
        let command = config.command_line(&recipe.toolchain);

        let mut child = Command::new(&recipe.toolchain)
            .args(config.toolchain_args())
            .current_dir(&build_tree)
            .spawn()
            .map_err(|source| ProcessError {
                command: command.clone(),
                source,
            })?;

        let status = child.wait().await.map_err(|source| ProcessError {
            command: command.clone(),
            source,
        })?;

        Ok(ToolchainRun { command, status })
    }
}
