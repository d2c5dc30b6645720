use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::types::StrategyError;

/// Longest stderr tail carried into an error message.
const STDERR_TAIL_CHARS: usize = 400;

/// Spawn `command`, feed it `stdin`, and collect its output.
///
/// The child is started with `kill_on_drop`, so it is killed both when `cancel` fires and
/// when the caller's future is dropped at a deadline. A missing executable is reported as
/// [`StrategyError::Unavailable`].
pub(crate) async fn run_to_completion(
    mut command: Command,
    stdin: Option<&[u8]>,
    cancel: &CancellationToken,
) -> Result<Output, StrategyError> {
    command
        .kill_on_drop(true)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let mut child = command.spawn().map_err(|error| match error.kind() {
        std::io::ErrorKind::NotFound => StrategyError::Unavailable(format!("{program} not found")),
        _ => StrategyError::Failed(format!("failed to start {program}: {error}")),
    })?;

    let pipe = child.stdin.take();
    let feed = async move {
        if let (Some(mut pipe), Some(input)) = (pipe, stdin) {
            // A child that exits without draining stdin closes the pipe; its exit status
            // carries the real failure.
            if let Err(error) = pipe.write_all(input).await {
                tracing::debug!(error = %error, "Child closed stdin early");
            }
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(StrategyError::Cancelled),
        (_, output) = async { tokio::join!(feed, child.wait_with_output()) } => {
            output.map_err(|error| StrategyError::Failed(format!("{program} failed: {error}")))
        }
    }
}

/// Turn a finished process into its stdout, or an error carrying the stderr tail.
pub(crate) fn stdout_or_error(program: &str, output: Output) -> Result<String, StrategyError> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let skip = stderr.chars().count().saturating_sub(STDERR_TAIL_CHARS);
    let tail: String = stderr.chars().skip(skip).collect();
    Err(StrategyError::Failed(format!(
        "{program} exited with {}: {tail}",
        output.status
    )))
}
