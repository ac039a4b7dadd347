use crate::{HostdeckError, Result, log_debug, log_error};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Run a system tool and return its stdout, failing on a non-zero exit.
pub async fn run(program: &str, args: &[&str]) -> Result<String> {
    run_with_input(program, args, None).await
}

/// Like [`run`], feeding `input` to the child's stdin.
pub async fn run_with_input(program: &str, args: &[&str], input: Option<&str>) -> Result<String> {
    let command_line = format!("{} {}", program, args.join(" "));
    log_debug!("Running {}", command_line);

    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    let mut child = command.spawn().map_err(|err| {
        log_error!("Failed to spawn {}: {}", program, err);
        HostdeckError::command_failed(&command_line, err.to_string())
    })?;

    if let Some(input) = input {
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes()).await?;
        }
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        log_error!("{} failed: {}", command_line, stderr);
        return Err(HostdeckError::command_failed(command_line, stderr));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
