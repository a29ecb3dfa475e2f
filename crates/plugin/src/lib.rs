//! Client for the §4.E transport plugin ABI: a fixed sub-command surface
//! implemented by an external executable, installed on every segment host,
//! that relays archive bytes to and from remote storage.
//!
//! The contract is argv + stdio, not an RPC envelope, so [`PluginCommand`]
//! only needs to know how to render itself into a `Command` rather than how
//! to (de)serialize a request/response pair — the sibling idea to a
//! connector's typed `Request`/`Response` enums, adapted to a subprocess ABI
//! instead of a JSON-over-stdio one.

use std::path::{Path, PathBuf};
use std::process::Stdio;

mod command;
pub use command::PluginCommand;

/// The lowest plugin API version this orchestrator has been validated
/// against. `plugin_api_version` output below this is rejected.
pub const MIN_SUPPORTED_API_VERSION: &str = "0.3.0";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to launch plugin executable {0}")]
    Spawn(PathBuf, #[source] std::io::Error),
    #[error("plugin exited with status {0}: {1}")]
    NonZeroExit(std::process::ExitStatus, String),
    #[error("plugin printed an unparseable api version {0:?}")]
    BadApiVersion(String, #[source] semver::Error),
    #[error("plugin api version {found} is older than the minimum supported version {min}")]
    UnsupportedApiVersion {
        found: semver::Version,
        min: semver::Version,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// PluginHandle is a resolved, ready-to-invoke transport plugin: an
/// executable path plus the plugin's own configuration file, both supplied
/// by the orchestrator from `--plugin-config`.
#[derive(Debug, Clone)]
pub struct PluginHandle {
    pub executable: PathBuf,
    pub config_path: PathBuf,
}

impl PluginHandle {
    pub fn new(executable: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            config_path: config_path.into(),
        }
    }

    /// Runs `plugin_api_version` and parses its stdout as a semver. Used by
    /// [`Self::verify_installed`] and can be called standalone to log the
    /// resolved version.
    pub async fn api_version(&self) -> Result<semver::Version, Error> {
        let output = self.run_for_output(PluginCommand::ApiVersion).await?;
        let raw = String::from_utf8_lossy(&output).trim().to_string();
        semver::Version::parse(&raw).map_err(|e| Error::BadApiVersion(raw, e))
    }

    /// Verifies the plugin is installed and satisfies the minimum supported
    /// API version. The orchestrator calls this once per segment host
    /// during setup, per §4.E.
    pub async fn verify_installed(&self) -> Result<semver::Version, Error> {
        let min = semver::Version::parse(MIN_SUPPORTED_API_VERSION).expect("valid constant");
        let found = self.api_version().await?;
        if found < min {
            return Err(Error::UnsupportedApiVersion { found, min });
        }
        Ok(found)
    }

    pub async fn setup_for_backup(&self, timestamp_dir: &Path) -> Result<(), Error> {
        self.run_to_completion(PluginCommand::SetupBackup {
            timestamp_dir: timestamp_dir.to_path_buf(),
        })
        .await
    }

    pub async fn setup_for_restore(&self, timestamp_dir: &Path) -> Result<(), Error> {
        self.run_to_completion(PluginCommand::SetupRestore {
            timestamp_dir: timestamp_dir.to_path_buf(),
        })
        .await
    }

    pub async fn backup_file(&self, local_path: &Path) -> Result<(), Error> {
        self.run_to_completion(PluginCommand::BackupFile {
            local_path: local_path.to_path_buf(),
        })
        .await
    }

    pub async fn restore_file(&self, local_path: &Path) -> Result<(), Error> {
        self.run_to_completion(PluginCommand::RestoreFile {
            local_path: local_path.to_path_buf(),
        })
        .await
    }

    /// Spawns the streaming `backup_data` variant and returns the child with
    /// its stdin piped, so the caller (the mover) can stream helper output
    /// straight through without buffering the whole table in memory.
    pub fn backup_data(&self, path: &Path) -> Result<async_process::Child, Error> {
        self.spawn_streaming(
            PluginCommand::BackupData { path: path.to_path_buf() },
            Stdio::piped(),
            Stdio::null(),
        )
    }

    /// Spawns the streaming `restore_data` variant with its stdout piped.
    pub fn restore_data(&self, path: &Path) -> Result<async_process::Child, Error> {
        self.spawn_streaming(
            PluginCommand::RestoreData { path: path.to_path_buf() },
            Stdio::null(),
            Stdio::piped(),
        )
    }

    pub async fn cleanup_for_backup(&self, timestamp_dir: &Path) -> Result<(), Error> {
        self.run_to_completion(PluginCommand::CleanupBackup {
            timestamp_dir: timestamp_dir.to_path_buf(),
        })
        .await
    }

    pub async fn cleanup_for_restore(&self, timestamp_dir: &Path) -> Result<(), Error> {
        self.run_to_completion(PluginCommand::CleanupRestore {
            timestamp_dir: timestamp_dir.to_path_buf(),
        })
        .await
    }

    fn base_command(&self, cmd: &PluginCommand) -> std::process::Command {
        let mut command = std::process::Command::new(&self.executable);
        command.arg(cmd.sub_command());
        command.arg(&self.config_path);
        command.args(cmd.extra_args());
        command
    }

    async fn run_for_output(&self, cmd: PluginCommand) -> Result<Vec<u8>, Error> {
        let mut command = self.base_command(&cmd);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = command
            .spawn()
            .map_err(|e| Error::Spawn(self.executable.clone(), e))?;
        let output = tokio::task::spawn_blocking(move || child.wait_with_output())
            .await
            .expect("join does not panic")?;
        if !output.status.success() {
            return Err(Error::NonZeroExit(
                output.status,
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(output.stdout)
    }

    async fn run_to_completion(&self, cmd: PluginCommand) -> Result<(), Error> {
        self.run_for_output(cmd).await.map(|_| ())
    }

    fn spawn_streaming(
        &self,
        cmd: PluginCommand,
        stdin: Stdio,
        stdout: Stdio,
    ) -> Result<async_process::Child, Error> {
        let mut command = self.base_command(&cmd);
        command.stdin(stdin).stdout(stdout).stderr(Stdio::piped());
        let child: std::process::Child = command
            .spawn()
            .map_err(|e| Error::Spawn(self.executable.clone(), e))?;
        Ok(child.into())
    }
}
