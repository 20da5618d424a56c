pub mod process;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::config::Config;
use crate::error::EngineError;
use crate::lease::Resource;

/// Sink for engine output: stdout for the CLI, a response buffer for HTTP.
pub type Output = dyn AsyncWrite + Send + Unpin;

/// Call surface of the backup engine. Implementations own all snapshot, shadow
/// and remote-storage behavior; the dispatcher only decides what to call.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn print_tables(&self, config: &Config, out: &mut Output) -> Result<(), EngineError>;

    async fn create_backup(
        &self,
        config: &Config,
        kind: &str,
        name: &str,
        tables: &str,
        out: &mut Output,
    ) -> Result<(), EngineError>;

    async fn upload(
        &self,
        config: &Config,
        kind: &str,
        name: &str,
        diff_from: &str,
        out: &mut Output,
    ) -> Result<(), EngineError>;

    async fn download(
        &self,
        config: &Config,
        kind: &str,
        name: &str,
        out: &mut Output,
    ) -> Result<(), EngineError>;

    #[allow(clippy::too_many_arguments)]
    async fn restore(
        &self,
        config: &Config,
        kind: &str,
        name: &str,
        tables: &str,
        schema_only: bool,
        data_only: bool,
        out: &mut Output,
    ) -> Result<(), EngineError>;

    async fn remove_backup_local(
        &self,
        config: &Config,
        kind: &str,
        name: &str,
        out: &mut Output,
    ) -> Result<(), EngineError>;

    async fn remove_backup_remote(
        &self,
        config: &Config,
        kind: &str,
        name: &str,
        out: &mut Output,
    ) -> Result<(), EngineError>;

    async fn print_local_backups(
        &self,
        config: &Config,
        kind: &str,
        format: &str,
        out: &mut Output,
    ) -> Result<(), EngineError>;

    async fn print_remote_backups(
        &self,
        config: &Config,
        kind: &str,
        format: &str,
        out: &mut Output,
    ) -> Result<(), EngineError>;

    async fn freeze(&self, config: &Config, tables: &str, out: &mut Output)
    -> Result<(), EngineError>;

    async fn clean(&self, config: &Config, out: &mut Output) -> Result<(), EngineError>;

    /// Whether the shadow directory is empty, i.e. no freeze is in progress or left behind.
    async fn is_clean(&self, config: &Config) -> Result<bool, EngineError>;

    async fn print_default_config(&self, config: &Config, out: &mut Output)
    -> Result<(), EngineError>;
}

/// A single engine invocation with its arguments, as planned by an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    PrintTables,
    CreateBackup {
        kind: String,
        name: String,
        tables: String,
    },
    Upload {
        kind: String,
        name: String,
        diff_from: String,
    },
    Download {
        kind: String,
        name: String,
    },
    Restore {
        kind: String,
        name: String,
        tables: String,
        schema_only: bool,
        data_only: bool,
    },
    RemoveBackupLocal {
        kind: String,
        name: String,
    },
    RemoveBackupRemote {
        kind: String,
        name: String,
    },
    PrintLocalBackups {
        kind: String,
        format: String,
    },
    PrintRemoteBackups {
        kind: String,
        format: String,
    },
    Freeze {
        tables: String,
    },
    Clean,
    IsClean,
    PrintDefaultConfig,
}

impl EngineCall {
    pub fn name(&self) -> &'static str {
        match self {
            EngineCall::PrintTables => "print_tables",
            EngineCall::CreateBackup { .. } => "create_backup",
            EngineCall::Upload { .. } => "upload",
            EngineCall::Download { .. } => "download",
            EngineCall::Restore { .. } => "restore",
            EngineCall::RemoveBackupLocal { .. } => "remove_backup_local",
            EngineCall::RemoveBackupRemote { .. } => "remove_backup_remote",
            EngineCall::PrintLocalBackups { .. } => "print_local_backups",
            EngineCall::PrintRemoteBackups { .. } => "print_remote_backups",
            EngineCall::Freeze { .. } => "freeze",
            EngineCall::Clean => "clean",
            EngineCall::IsClean => "is_clean",
            EngineCall::PrintDefaultConfig => "print_default_config",
        }
    }

    /// Resources that must not be touched by another operation while this call runs.
    pub fn resources(&self) -> Vec<Resource> {
        match self {
            EngineCall::CreateBackup { kind, name, .. } => {
                vec![Resource::Shadow, Resource::backup(kind, name)]
            }
            EngineCall::Freeze { .. } | EngineCall::Clean => vec![Resource::Shadow],
            EngineCall::Upload { kind, name, .. }
            | EngineCall::Download { kind, name }
            | EngineCall::Restore { kind, name, .. }
            | EngineCall::RemoveBackupLocal { kind, name }
            | EngineCall::RemoveBackupRemote { kind, name } => vec![Resource::backup(kind, name)],
            EngineCall::PrintTables
            | EngineCall::PrintLocalBackups { .. }
            | EngineCall::PrintRemoteBackups { .. }
            | EngineCall::IsClean
            | EngineCall::PrintDefaultConfig => Vec::new(),
        }
    }

    /// Calls that populate the shadow directory and so need it empty first.
    pub fn needs_clean_shadow(&self) -> bool {
        matches!(self, EngineCall::CreateBackup { .. } | EngineCall::Freeze { .. })
    }

    pub async fn invoke(
        &self,
        engine: &dyn Engine,
        config: &Config,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        match self {
            EngineCall::PrintTables => engine.print_tables(config, out).await,
            EngineCall::CreateBackup { kind, name, tables } => {
                engine.create_backup(config, kind, name, tables, out).await
            }
            EngineCall::Upload {
                kind,
                name,
                diff_from,
            } => engine.upload(config, kind, name, diff_from, out).await,
            EngineCall::Download { kind, name } => engine.download(config, kind, name, out).await,
            EngineCall::Restore {
                kind,
                name,
                tables,
                schema_only,
                data_only,
            } => {
                engine
                    .restore(config, kind, name, tables, *schema_only, *data_only, out)
                    .await
            }
            EngineCall::RemoveBackupLocal { kind, name } => {
                engine.remove_backup_local(config, kind, name, out).await
            }
            EngineCall::RemoveBackupRemote { kind, name } => {
                engine.remove_backup_remote(config, kind, name, out).await
            }
            EngineCall::PrintLocalBackups { kind, format } => {
                engine.print_local_backups(config, kind, format, out).await
            }
            EngineCall::PrintRemoteBackups { kind, format } => {
                engine.print_remote_backups(config, kind, format, out).await
            }
            EngineCall::Freeze { tables } => engine.freeze(config, tables, out).await,
            EngineCall::Clean => engine.clean(config, out).await,
            EngineCall::IsClean => {
                use tokio::io::AsyncWriteExt;

                let clean = engine.is_clean(config).await?;
                out.write_all(format!("{clean}\n").as_bytes()).await?;
                Ok(())
            }
            EngineCall::PrintDefaultConfig => engine.print_default_config(config, out).await,
        }
    }
}
