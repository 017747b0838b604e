//! Release archive creation.
//!
//! The repository is cloned at the tag into a scratch directory. If the tree
//! ships a packaging script at the configured path it is run with the tag name
//! and its stdout becomes the archive; otherwise `git archive --format=zip`
//! snapshots the tag. The scratch directory is a [`tempfile::TempDir`] owned
//! by [`ArchiveBuilder::build`], so it is removed on every return path.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::error::ReleaseError;

/// Captured result of an external command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs external commands for the archive stage.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String], cwd: Option<&Path>)
    -> io::Result<CommandOutput>;
}

/// [`CommandRunner`] backed by real processes, each bounded by a timeout.
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> io::Result<CommandOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn()?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{} timed out after {:?}", program, self.timeout),
                )
            })??;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Packaged release artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveBlob {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ArchiveBlob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub struct ArchiveBuilder {
    runner: Arc<dyn CommandRunner>,
    git: String,
    script_path: PathBuf,
    work_dir: Option<PathBuf>,
}

impl ArchiveBuilder {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            git: "git".to_string(),
            script_path: PathBuf::from(crate::DEFAULT_SCRIPT_PATH),
            work_dir: None,
        }
    }

    pub fn with_git(mut self, git: impl Into<String>) -> Self {
        self.git = git.into();
        self
    }

    /// Location of the packaging script, relative to the repository root.
    pub fn with_script_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.script_path = path.into();
        self
    }

    /// Parent directory for clones instead of the system temp dir.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    fn scratch_dir(&self) -> io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("release-");
        match &self.work_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
    }

    /// Clones `clone_url` at `tag` and packages it as `<name>.zip`.
    pub async fn build(
        &self,
        clone_url: &str,
        tag: &str,
        name: &str,
    ) -> Result<ArchiveBlob, ReleaseError> {
        let scratch = self
            .scratch_dir()
            .map_err(|e| ReleaseError::Clone(format!("failed to create work directory: {}", e)))?;
        let checkout = scratch.path().join("repo");

        info!("Cloning {} at {}", clone_url, tag);
        let clone_args = vec![
            "clone".to_string(),
            "--quiet".to_string(),
            "--branch".to_string(),
            tag.to_string(),
            clone_url.to_string(),
            checkout.to_string_lossy().into_owned(),
        ];
        let clone = self
            .runner
            .run(&self.git, &clone_args, Some(scratch.path()))
            .await
            .map_err(|e| {
                error!("git clone failed to start: {}", e);
                ReleaseError::Clone(e.to_string())
            })?;
        if !clone.success() {
            let msg = format!("git clone failed: {}", String::from_utf8_lossy(&clone.stderr));
            error!("{}", msg);
            return Err(ReleaseError::Clone(msg));
        }

        let script = checkout.join(&self.script_path);
        let (program, args) = if script.is_file() {
            info!("Packaging with {}", self.script_path.display());
            (
                "sh".to_string(),
                vec![script.to_string_lossy().into_owned(), tag.to_string()],
            )
        } else {
            debug!("No packaging script, using git archive");
            (
                self.git.clone(),
                vec![
                    "archive".to_string(),
                    "--format=zip".to_string(),
                    tag.to_string(),
                ],
            )
        };

        let packaged = self
            .runner
            .run(&program, &args, Some(&checkout))
            .await
            .map_err(|e| {
                error!("{} failed to start: {}", program, e);
                ReleaseError::Archive(e.to_string())
            })?;
        if !packaged.success() {
            let msg = format!(
                "{} exited with {:?}: {}",
                program,
                packaged.exit_code,
                String::from_utf8_lossy(&packaged.stderr)
            );
            error!("{}", msg);
            return Err(ReleaseError::Archive(msg));
        }

        info!("Built archive of {} bytes", packaged.stdout.len());
        Ok(ArchiveBlob {
            file_name: format!("{}.zip", name),
            bytes: packaged.stdout,
        })
    }
}
