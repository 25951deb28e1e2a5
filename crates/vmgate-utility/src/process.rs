//! Subprocess execution helpers.
//!
//! Vendor tooling is driven through short-lived command invocations.
//! Output is captured as combined stdout + stderr since the vendor
//! tools report failures on either stream.

use tokio::process::Command;

/// Result of an external command invocation.
#[derive(Debug)]
pub struct CommandOutput {
    /// Process exit code; -1 when the process was killed by a signal or
    /// could not be waited on.
    pub exit_code: i32,
    /// Combined stdout and stderr.
    pub output: String,
}

impl CommandOutput {
    /// Returns true for a conventional zero exit code.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs `cmd` to completion, capturing output. Spawn failures are folded
/// into a -1 exit code with the error text as output, matching how the
/// vendor tool failures are handled everywhere else.
pub async fn execute_with_output(cmd: &mut Command) -> CommandOutput {
    match cmd.output().await {
        Ok(out) => {
            let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&out.stderr));
            CommandOutput {
                exit_code: out.status.code().unwrap_or(-1),
                output: combined,
            }
        }
        Err(err) => CommandOutput {
            exit_code: -1,
            output: err.to_string(),
        },
    }
}

/// Runs `cmd` to completion, returning only the exit code.
pub async fn execute(cmd: &mut Command) -> i32 {
    execute_with_output(cmd).await.exit_code
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_exit_code_and_output() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err 1>&2; exit 3"]);
        let result = execute_with_output(&mut cmd).await;
        assert_eq!(result.exit_code, 3);
        assert!(result.output.contains("out"));
        assert!(result.output.contains("err"));
        assert!(!result.success());
    }

    #[tokio::test]
    async fn missing_binary_reports_failure() {
        let mut cmd = Command::new("/nonexistent/vmgate-test-binary");
        let result = execute_with_output(&mut cmd).await;
        assert_eq!(result.exit_code, -1);
        assert!(!result.output.is_empty());
    }
}
