use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

/// An external program and its leading arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn display(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }

    /// Run to completion with `extra` appended to the arguments and return stdout.
    ///
    /// The child is killed if `limit` elapses first. Errors are rendered
    /// as text for the caller to wrap.
    pub async fn capture(&self, extra: &[&str], limit: Duration) -> Result<String, String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("cannot run {}: {e}", self.program.display())),
            Err(_) => return Err(format!("timed out after {}s", limit.as_secs_f64())),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            return Err(if stderr.is_empty() {
                format!("{}", output.status)
            } else {
                format!("{}: {stderr}", output.status)
            });
        }

        String::from_utf8(output.stdout).map_err(|_| "output is not valid UTF-8".to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").args(["-c", script, "sh"])
    }

    #[tokio::test]
    async fn test_capture_passes_extra_args() {
        let out = sh("echo \"got $1\"")
            .capture(&["worker-1"], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out, "got worker-1\n");
    }

    #[tokio::test]
    async fn test_capture_reports_exit_and_stderr() {
        let err = sh("echo broken >&2; exit 3")
            .capture(&[], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.contains("3"), "{err}");
        assert!(err.ends_with("broken"), "{err}");
    }

    #[tokio::test]
    async fn test_capture_times_out() {
        let err = sh("sleep 5")
            .capture(&[], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.starts_with("timed out"), "{err}");
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = CommandSpec::new("/nonexistent/get-node-resource-status.sh")
            .capture(&["n1"], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.starts_with("cannot run"), "{err}");
    }
}
