//! Cancellable external-process invocation

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::SourceError;

/// Run a tool to completion and return its stdout. Cancellation kills
/// the child (`kill_on_drop`); a non-zero exit becomes a tool error
/// carrying the tail of stderr.
pub async fn run_tool(
    cancel: &CancellationToken,
    cwd: &Path,
    program: &str,
    args: &[&str],
) -> Result<String, SourceError> {
    tracing::debug!("running {program} {}", args.join(" "));
    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| SourceError::tool(program, err.to_string()))?;

    let output = tokio::select! {
        _ = cancel.cancelled() => return Err(SourceError::Cancelled),
        output = child.wait_with_output() => {
            output.map_err(|err| SourceError::tool(program, err.to_string()))?
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join("; ");
        return Err(SourceError::tool(
            program,
            format!("exit {}: {tail}", output.status),
        ));
    }
    String::from_utf8(output.stdout)
        .map_err(|_| SourceError::Parse(format!("{program} produced non-UTF-8 output")))
}
