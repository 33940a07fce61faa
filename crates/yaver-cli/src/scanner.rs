//! Concrete [`CodeScanner`] backed by configurable shell commands, one per
//! file extension, run with a bounded timeout.
//!
//! Grounded on the invariant runner: spawn, capture stdout/stderr
//! concurrently with waiting, enforce a timeout by killing the child.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use yaver_core::interfaces::{CodeScanner, Finding, SyntaxResult};

/// A command template: `(program, args)`. `{path}` in `args` is substituted
/// with the file path being checked.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    pub program: String,
    pub args: Vec<String>,
}

pub struct ShellCodeScanner {
    syntax_checkers: HashMap<String, CommandTemplate>,
    timeout: Duration,
}

impl ShellCodeScanner {
    pub fn new(syntax_checkers: HashMap<String, CommandTemplate>, timeout: Duration) -> Self {
        ShellCodeScanner { syntax_checkers, timeout }
    }

    async fn run(&self, template: &CommandTemplate, path: &Path) -> anyhow::Result<(bool, String)> {
        let args: Vec<String> = template.args.iter().map(|a| if a == "{path}" { path.display().to_string() } else { a.clone() }).collect();

        let mut child = Command::new(&template.program)
            .args(&args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let read_stdout = async {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            String::from_utf8_lossy(&buf).into_owned()
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            String::from_utf8_lossy(&buf).into_owned()
        };

        match tokio::time::timeout(self.timeout, async { tokio::join!(child.wait(), read_stdout, read_stderr) }).await {
            Ok((Ok(status), stdout, stderr)) => Ok((status.success(), format!("{stdout}{stderr}"))),
            Ok((Err(e), _, _)) => Err(e.into()),
            Err(_) => {
                let _ = child.kill().await;
                Ok((false, format!("syntax checker timed out after {:?}", self.timeout)))
            }
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(str::to_string)
}

#[async_trait]
impl CodeScanner for ShellCodeScanner {
    async fn syntax(&self, path: &Path) -> anyhow::Result<SyntaxResult> {
        let Some(ext) = extension_of(path) else {
            return Ok(SyntaxResult { valid: true, error_message: None, tool_used: "none".to_string() });
        };
        let Some(template) = self.syntax_checkers.get(&ext) else {
            return Ok(SyntaxResult { valid: true, error_message: None, tool_used: "none".to_string() });
        };

        let (valid, output) = self.run(template, path).await?;
        Ok(SyntaxResult {
            valid,
            error_message: if valid { None } else { Some(output) },
            tool_used: template.program.clone(),
        })
    }

    async fn complexity(&self, _path: &Path, _body: &str) -> anyhow::Result<Vec<Finding>> {
        Ok(Vec::new())
    }

    async fn security(&self, _path: &Path) -> anyhow::Result<Vec<Finding>> {
        Ok(Vec::new())
    }

    async fn lint(&self, _path: &Path) -> anyhow::Result<Vec<Finding>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_of_returns_lowercase_suffix() {
        assert_eq!(extension_of(Path::new("src/main.rs")), Some("rs".to_string()));
        assert_eq!(extension_of(Path::new("README")), None);
    }

    #[tokio::test]
    async fn unconfigured_extension_is_treated_as_valid() {
        let scanner = ShellCodeScanner::new(HashMap::new(), Duration::from_secs(1));
        let result = scanner.syntax(Path::new("notes.txt")).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.tool_used, "none");
    }
}
