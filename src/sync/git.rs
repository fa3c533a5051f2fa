use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use wait_timeout::ChildExt;

use super::SyncError;

/// Reads of local metadata.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
/// Index and object writes.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
/// Anything that talks to a remote.
pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct GitAdapter {
    metadata_timeout: Duration,
    write_timeout: Duration,
    network_timeout: Duration,
}

impl Default for GitAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl GitAdapter {
    pub fn new() -> Self {
        Self {
            metadata_timeout: METADATA_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
            network_timeout: NETWORK_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_timeouts(metadata: Duration, write: Duration, network: Duration) -> Self {
        Self {
            metadata_timeout: metadata,
            write_timeout: write,
            network_timeout: network,
        }
    }

    pub fn is_repository(&self, dir: &Path) -> bool {
        dir.join(".git").exists()
    }

    pub fn init(&self, cwd: &Path) -> Result<(), SyncError> {
        self.run_checked(cwd, vec!["init".to_string()], self.write_timeout)?;
        Ok(())
    }

    /// Branch name, including on a repository with no commits yet.
    pub fn current_branch(&self, cwd: &Path) -> Result<String, SyncError> {
        match self.run_checked(
            cwd,
            vec![
                "symbolic-ref".to_string(),
                "--short".to_string(),
                "HEAD".to_string(),
            ],
            self.metadata_timeout,
        ) {
            Ok(branch) => Ok(branch),
            Err(_) => self.run_checked(
                cwd,
                vec![
                    "rev-parse".to_string(),
                    "--abbrev-ref".to_string(),
                    "HEAD".to_string(),
                ],
                self.metadata_timeout,
            ),
        }
    }

    pub fn remotes(&self, cwd: &Path) -> Result<Vec<String>, SyncError> {
        let stdout = self.run_checked(cwd, vec!["remote".to_string()], self.metadata_timeout)?;
        Ok(parse_lines(&stdout))
    }

    pub fn remote_url(&self, cwd: &Path, remote: &str) -> Result<String, SyncError> {
        self.run_checked(
            cwd,
            vec![
                "remote".to_string(),
                "get-url".to_string(),
                remote.to_string(),
            ],
            self.metadata_timeout,
        )
    }

    /// `(ahead, behind)` relative to the upstream of the current branch.
    pub fn ahead_behind(&self, cwd: &Path) -> Result<(u32, u32), SyncError> {
        let stdout = self.run_checked(
            cwd,
            vec![
                "rev-list".to_string(),
                "--left-right".to_string(),
                "--count".to_string(),
                "HEAD...@{upstream}".to_string(),
            ],
            self.metadata_timeout,
        )?;
        let mut counts = stdout
            .split_whitespace()
            .map(|value| value.parse::<u32>().unwrap_or(0));
        Ok((counts.next().unwrap_or(0), counts.next().unwrap_or(0)))
    }

    pub fn status_clean(&self, cwd: &Path) -> Result<bool, SyncError> {
        let output = self.run_checked(
            cwd,
            vec!["status".to_string(), "--porcelain".to_string()],
            self.metadata_timeout,
        )?;
        Ok(output.trim().is_empty())
    }

    pub fn last_commit_time(&self, cwd: &Path) -> Result<Option<OffsetDateTime>, SyncError> {
        let stdout = self.run_checked(
            cwd,
            vec![
                "log".to_string(),
                "-1".to_string(),
                "--format=%cI".to_string(),
            ],
            self.metadata_timeout,
        )?;
        Ok(OffsetDateTime::parse(stdout.trim(), &Rfc3339).ok())
    }

    pub fn add_paths(&self, cwd: &Path, paths: &[&str]) -> Result<(), SyncError> {
        let mut args = vec!["add".to_string(), "--".to_string()];
        for path in paths {
            args.push((*path).to_string());
        }
        self.run_checked(cwd, args, self.write_timeout)?;
        Ok(())
    }

    /// Exit code of `git diff --cached --quiet`: 0 means nothing staged.
    pub fn has_staged_changes(&self, cwd: &Path, paths: &[&str]) -> Result<bool, SyncError> {
        let mut args = vec![
            "diff".to_string(),
            "--cached".to_string(),
            "--quiet".to_string(),
            "--".to_string(),
        ];
        for path in paths {
            args.push((*path).to_string());
        }
        let output = self.run_allow_failure(cwd, args.clone(), self.metadata_timeout)?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                Err(SyncError::GitCommandFailed {
                    command: display_command(cwd, &args),
                    code: output.status.code(),
                    stderr,
                })
            }
        }
    }

    pub fn commit(&self, cwd: &Path, message: &str) -> Result<String, SyncError> {
        self.run_checked(
            cwd,
            vec![
                "commit".to_string(),
                "--no-gpg-sign".to_string(),
                "-m".to_string(),
                message.to_string(),
            ],
            self.write_timeout,
        )?;
        self.run_checked(
            cwd,
            vec!["rev-parse".to_string(), "HEAD".to_string()],
            self.metadata_timeout,
        )
    }

    pub fn push_branch(&self, cwd: &Path, remote: &str, branch: &str) -> Result<(), SyncError> {
        self.run_checked(
            cwd,
            vec![
                "push".to_string(),
                "--set-upstream".to_string(),
                remote.to_string(),
                branch.to_string(),
            ],
            self.network_timeout,
        )?;
        Ok(())
    }

    pub fn pull_rebase(&self, cwd: &Path, remote: &str, branch: &str) -> Result<(), SyncError> {
        self.run_checked(
            cwd,
            vec![
                "pull".to_string(),
                "--rebase".to_string(),
                remote.to_string(),
                branch.to_string(),
            ],
            self.network_timeout,
        )?;
        Ok(())
    }

    fn run_checked(
        &self,
        cwd: &Path,
        args: Vec<String>,
        timeout: Duration,
    ) -> Result<String, SyncError> {
        let output = self.run_allow_failure(cwd, args.clone(), timeout)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(SyncError::GitCommandFailed {
                command: display_command(cwd, &args),
                code: output.status.code(),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_allow_failure(
        &self,
        cwd: &Path,
        args: Vec<String>,
        timeout: Duration,
    ) -> Result<Output, SyncError> {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(cwd).args(&args);
        sanitize_env(&mut cmd);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::trace!(command = %display_command(cwd, &args), "running git");
        let mut child = cmd.spawn().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                SyncError::GitUnavailable
            } else {
                SyncError::Io(err)
            }
        })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child.wait_timeout(timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                kill(&mut child);
                let _ = stdout.join();
                let _ = stderr.join();
                tracing::warn!(command = %display_command(cwd, &args), ?timeout, "git timed out");
                return Err(SyncError::Timeout {
                    command: display_command(cwd, &args),
                    after: timeout,
                });
            }
            Err(err) => {
                kill(&mut child);
                return Err(SyncError::Io(err));
            }
        };

        Ok(Output {
            status,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }
}

/// Never let git wait on a human: no terminal prompts, no credential
/// manager dialogs, no interactive ssh. Messages stay in English.
fn sanitize_env(cmd: &mut Command) {
    cmd.env("GIT_TERMINAL_PROMPT", "0")
        .env("GCM_INTERACTIVE", "never")
        .env("GIT_ASKPASS", "")
        .env("SSH_ASKPASS", "")
        .env("LC_ALL", "C");
    if std::env::var_os("GIT_SSH_COMMAND").is_none() {
        cmd.env("GIT_SSH_COMMAND", "ssh -o BatchMode=yes");
    }
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buffer);
        }
        buffer
    })
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn parse_lines(value: &str) -> Vec<String> {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn display_command(cwd: &Path, args: &[String]) -> String {
    format!("git -C {} {}", cwd.display(), args.join(" "))
}
