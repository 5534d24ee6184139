//! External command invocation.
//!
//! Collectors never spawn processes directly; they go through a
//! [`CommandRunner`] so that tool output can be scripted in tests.

pub mod runner;

#[cfg(test)]
pub(crate) mod scripted;

pub use runner::ProcessRunner;

/// Captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the tool with `args`. `None` means the invocation itself failed
    /// (could not spawn, timed out); no usable output exists.
    async fn run(&self, args: &[String]) -> Option<CommandOutput>;
}
