use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{Engine, Output};
use crate::config::Config;
use crate::error::EngineError;

/// Runs each engine call as a subprocess of the configured engine binary.
/// Child stdout is streamed to the caller's output; a non-zero exit becomes an
/// [`EngineError::Failed`] carrying the child's stderr. Dropping a call kills
/// its child, as does an output that stops accepting writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEngine;

impl ProcessEngine {
    pub fn new() -> Self {
        Self
    }

    async fn exec(
        &self,
        config: &Config,
        args: Vec<String>,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let binary = &config.engine.binary;
        let argv = command_line(config, args);
        debug!(binary = %binary, args = ?argv, "Running engine");

        let mut child = Command::new(binary)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                binary: binary.clone(),
                source,
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::failed("engine stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::failed("engine stderr was not captured"))?;

        let forward = async {
            let copied = tokio::io::copy(&mut stdout, out).await;
            if copied.is_err() {
                // Nothing drains the pipe any more, so the child would block on it.
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "Failed to kill engine");
                }
            }
            copied
        };
        let (copied, stderr) = tokio::join!(forward, read_all(stderr));
        let status = child.wait().await?;
        if let Err(e) = copied {
            warn!(binary = %binary, error = %e, "Engine output could not be written");
            return Err(e.into());
        }

        if status.success() {
            return Ok(());
        }
        let stderr = stderr.trim();
        warn!(binary = %binary, %status, "Engine command failed");
        if stderr.is_empty() {
            Err(EngineError::failed(format!("{binary} exited with {status}")))
        } else {
            Err(EngineError::failed(stderr))
        }
    }
}

/// Full argument list for one engine command: configured prefix arguments,
/// the config path, then the command itself.
fn command_line(config: &Config, args: Vec<String>) -> Vec<String> {
    let mut argv = config.engine.args.clone();
    if let Some(path) = &config.source {
        argv.push("--config".to_string());
        argv.push(path.display().to_string());
    }
    argv.extend(args);
    argv
}

async fn read_all(mut reader: impl AsyncRead + Unpin) -> String {
    let mut buf = String::new();
    if let Err(e) = reader.read_to_string(&mut buf).await {
        debug!(error = %e, "Failed to read engine stderr");
    }
    buf
}

fn command(name: &str) -> Vec<String> {
    vec![name.to_string()]
}

fn push_nonempty(args: &mut Vec<String>, value: &str) {
    if !value.is_empty() {
        args.push(value.to_string());
    }
}

fn push_tables(args: &mut Vec<String>, config: &Config, requested: &str) {
    let tables = config.table_filter(requested);
    if !tables.is_empty() {
        args.push(format!("--tables={tables}"));
    }
}

fn addressed(name: &str, kind: &str, backup: &str) -> Vec<String> {
    let mut args = command(name);
    push_nonempty(&mut args, kind);
    args.push(backup.to_string());
    args
}

#[async_trait]
impl Engine for ProcessEngine {
    async fn print_tables(&self, config: &Config, out: &mut Output) -> Result<(), EngineError> {
        self.exec(config, command("tables"), out).await
    }

    async fn create_backup(
        &self,
        config: &Config,
        kind: &str,
        name: &str,
        tables: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let mut args = command("create");
        push_tables(&mut args, config, tables);
        push_nonempty(&mut args, kind);
        args.push(name.to_string());
        self.exec(config, args, out).await
    }

    async fn upload(
        &self,
        config: &Config,
        kind: &str,
        name: &str,
        diff_from: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let mut args = command("upload");
        if !diff_from.is_empty() {
            args.push(format!("--diff-from={diff_from}"));
        }
        push_nonempty(&mut args, kind);
        args.push(name.to_string());
        self.exec(config, args, out).await
    }

    async fn download(
        &self,
        config: &Config,
        kind: &str,
        name: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        self.exec(config, addressed("download", kind, name), out)
            .await
    }

    async fn restore(
        &self,
        config: &Config,
        kind: &str,
        name: &str,
        tables: &str,
        schema_only: bool,
        data_only: bool,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let mut args = command("restore");
        push_tables(&mut args, config, tables);
        if schema_only {
            args.push("--schema".to_string());
        }
        if data_only {
            args.push("--data".to_string());
        }
        push_nonempty(&mut args, kind);
        args.push(name.to_string());
        self.exec(config, args, out).await
    }

    async fn remove_backup_local(
        &self,
        config: &Config,
        kind: &str,
        name: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let mut args = command("delete");
        args.extend(addressed("local", kind, name));
        self.exec(config, args, out).await
    }

    async fn remove_backup_remote(
        &self,
        config: &Config,
        kind: &str,
        name: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let mut args = command("delete");
        args.extend(addressed("remote", kind, name));
        self.exec(config, args, out).await
    }

    async fn print_local_backups(
        &self,
        config: &Config,
        kind: &str,
        format: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        self.exec(config, list_args("local", kind, format), out)
            .await
    }

    async fn print_remote_backups(
        &self,
        config: &Config,
        kind: &str,
        format: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        self.exec(config, list_args("remote", kind, format), out)
            .await
    }

    async fn freeze(
        &self,
        config: &Config,
        tables: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let mut args = command("freeze");
        push_tables(&mut args, config, tables);
        self.exec(config, args, out).await
    }

    async fn clean(&self, config: &Config, out: &mut Output) -> Result<(), EngineError> {
        self.exec(config, command("clean"), out).await
    }

    async fn is_clean(&self, config: &Config) -> Result<bool, EngineError> {
        let mut buf: Vec<u8> = Vec::new();
        self.exec(config, command("isclean"), &mut buf).await?;
        let answer = String::from_utf8_lossy(&buf);
        match answer.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(EngineError::failed(format!(
                "unexpected isclean output: {other:?}"
            ))),
        }
    }

    async fn print_default_config(
        &self,
        config: &Config,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        self.exec(config, command("default-config"), out).await
    }
}

/// `list <tier> [kind] [format]`. An empty kind is passed explicitly when a
/// format follows so the engine does not read the format as a kind.
fn list_args(tier: &str, kind: &str, format: &str) -> Vec<String> {
    let mut args = vec!["list".to_string(), tier.to_string()];
    if !kind.is_empty() || !format.is_empty() {
        args.push(kind.to_string());
    }
    push_nonempty(&mut args, format);
    args
}
