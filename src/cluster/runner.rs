//! Local process backends for [`CliCluster`](super::CliCluster).

use super::cli::{CommandRunner, DaemonControl};
use crate::config::DaemonCommands;
use crate::error::{Result, ThrashError};
use crate::types::DaemonRole;
use tokio::process::Command;
use tracing::{debug, info};

/// Runs the cluster tool as a local child process.
#[derive(Debug, Clone)]
pub struct LocalRunner {
    program: String,
    prefix: Vec<String>,
}

impl LocalRunner {
    /// `command` is the program followed by arguments prepended to every call.
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, prefix) = command.split_first().ok_or_else(|| {
            ThrashError::Config("cluster command must name a program".to_string())
        })?;
        Ok(Self {
            program: program.clone(),
            prefix: prefix.to_vec(),
        })
    }
}

#[async_trait::async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, args: &[String]) -> Result<String> {
        let output = Command::new(&self.program)
            .args(&self.prefix)
            .args(args)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ThrashError::Command {
                command: format!("{} {}", self.program, args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Manages daemons through `sh -c` command templates.
#[derive(Debug, Clone)]
pub struct ShellDaemonControl {
    commands: DaemonCommands,
}

impl ShellDaemonControl {
    pub fn new(commands: DaemonCommands) -> Self {
        Self { commands }
    }

    fn render(template: &str, role: DaemonRole, id: &str) -> String {
        template
            .replace("{role}", role.as_str())
            .replace("{id}", id)
    }

    async fn shell(&self, script: &str) -> Result<std::process::ExitStatus> {
        debug!(script, "running daemon command");
        Ok(Command::new("sh").arg("-c").arg(script).status().await?)
    }

    async fn shell_ok(&self, script: &str) -> Result<()> {
        let status = self.shell(script).await?;
        if status.success() {
            Ok(())
        } else {
            Err(ThrashError::Daemon(format!(
                "`{}` exited with {}",
                script,
                status.code().unwrap_or(-1)
            )))
        }
    }
}

#[async_trait::async_trait]
impl DaemonControl for ShellDaemonControl {
    async fn stop(&self, role: DaemonRole, id: &str) -> Result<()> {
        info!(%role, id, "Stopping daemon");
        self.shell_ok(&Self::render(&self.commands.stop, role, id))
            .await
    }

    async fn restart(&self, role: DaemonRole, id: &str) -> Result<()> {
        info!(%role, id, "Restarting daemon");
        self.shell_ok(&Self::render(&self.commands.restart, role, id))
            .await
    }

    async fn is_running(&self, role: DaemonRole, id: &str) -> Result<bool> {
        let status = self
            .shell(&Self::render(&self.commands.status, role, id))
            .await?;
        Ok(status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_template() {
        assert_eq!(
            ShellDaemonControl::render("systemctl stop ceph-{role}@{id}", DaemonRole::Osd, "3"),
            "systemctl stop ceph-osd@3"
        );
    }

    #[test]
    fn test_runner_requires_program() {
        assert!(LocalRunner::new(&[]).is_err());
        let runner = LocalRunner::new(&["ceph".to_string(), "--cluster".to_string()]).unwrap();
        assert_eq!(runner.program, "ceph");
        assert_eq!(runner.prefix, vec!["--cluster".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_runner_captures_stdout() {
        let runner = LocalRunner::new(&["echo".to_string()]).unwrap();
        let out = runner.run(&["hello".to_string()]).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_runner_reports_failure() {
        let runner = LocalRunner::new(&["false".to_string()]).unwrap();
        let err = runner.run(&[]).await.unwrap_err();
        assert!(matches!(err, ThrashError::Command { status: 1, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shell_daemon_status() {
        let daemons = ShellDaemonControl::new(DaemonCommands {
            stop: "true".to_string(),
            restart: "exit 3".to_string(),
            status: "test {id} = 1".to_string(),
        });

        assert!(daemons.is_running(DaemonRole::Osd, "1").await.unwrap());
        assert!(!daemons.is_running(DaemonRole::Osd, "2").await.unwrap());
        daemons.stop(DaemonRole::Osd, "1").await.unwrap();
        assert!(matches!(
            daemons.restart(DaemonRole::Osd, "1").await.unwrap_err(),
            ThrashError::Daemon(_)
        ));
    }
}
