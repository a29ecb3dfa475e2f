use std::ffi::OsString;
use std::path::PathBuf;

/// PluginCommand enumerates the fixed sub-command surface of §4.E. Every
/// variant maps to exactly one sub-command name and its positional
/// arguments, after the common `<executable> <sub-command> <config>` prefix
/// every invocation shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginCommand {
    ApiVersion,
    SetupBackup { timestamp_dir: PathBuf },
    SetupRestore { timestamp_dir: PathBuf },
    BackupFile { local_path: PathBuf },
    RestoreFile { local_path: PathBuf },
    BackupData { path: PathBuf },
    RestoreData { path: PathBuf },
    CleanupBackup { timestamp_dir: PathBuf },
    CleanupRestore { timestamp_dir: PathBuf },
}

impl PluginCommand {
    pub fn sub_command(&self) -> &'static str {
        match self {
            PluginCommand::ApiVersion => "plugin_api_version",
            PluginCommand::SetupBackup { .. } => "setup_plugin_for_backup",
            PluginCommand::SetupRestore { .. } => "setup_plugin_for_restore",
            PluginCommand::BackupFile { .. } => "backup_file",
            PluginCommand::RestoreFile { .. } => "restore_file",
            PluginCommand::BackupData { .. } => "backup_data",
            PluginCommand::RestoreData { .. } => "restore_data",
            PluginCommand::CleanupBackup { .. } => "cleanup_plugin_for_backup",
            PluginCommand::CleanupRestore { .. } => "cleanup_plugin_for_restore",
        }
    }

    pub fn extra_args(&self) -> Vec<OsString> {
        match self {
            PluginCommand::ApiVersion => vec![],
            PluginCommand::SetupBackup { timestamp_dir }
            | PluginCommand::SetupRestore { timestamp_dir }
            | PluginCommand::CleanupBackup { timestamp_dir }
            | PluginCommand::CleanupRestore { timestamp_dir } => vec![timestamp_dir.clone().into()],
            PluginCommand::BackupFile { local_path } | PluginCommand::RestoreFile { local_path } => {
                vec![local_path.clone().into()]
            }
            PluginCommand::BackupData { path } | PluginCommand::RestoreData { path } => {
                vec![path.clone().into()]
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sub_command_and_args() {
        let cmd = PluginCommand::BackupFile {
            local_path: PathBuf::from("/tmp/backups/gpbackup_20260727120000_toc.yaml"),
        };
        assert_eq!(cmd.sub_command(), "backup_file");
        assert_eq!(
            cmd.extra_args(),
            vec![OsString::from("/tmp/backups/gpbackup_20260727120000_toc.yaml")]
        );
    }
}
