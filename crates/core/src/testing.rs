//! In-memory engine for exercising the dispatcher and transports.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::config::Config;
use crate::engine::{Engine, EngineCall, Output};
use crate::error::EngineError;

/// Records every call in order, writes `<call> ok` to the output, and fails
/// the calls it was told to fail.
#[derive(Debug)]
pub struct RecordingEngine {
    calls: Mutex<Vec<EngineCall>>,
    failures: HashMap<&'static str, String>,
    delays: HashMap<&'static str, Duration>,
    clean: bool,
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: HashMap::new(),
            delays: HashMap::new(),
            clean: true,
        }
    }
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the call named `call` (see [`EngineCall::name`]) fail with `message`.
    pub fn failing(mut self, call: &'static str, message: &str) -> Self {
        self.failures.insert(call, message.to_string());
        self
    }

    /// Makes the call named `call` take `delay` before it completes.
    pub fn delayed(mut self, call: &'static str, delay: Duration) -> Self {
        self.delays.insert(call, delay);
        self
    }

    pub fn with_dirty_shadow(mut self) -> Self {
        self.clean = false;
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.calls().iter().map(EngineCall::name).collect()
    }

    async fn record(&self, call: EngineCall, out: &mut Output) -> Result<(), EngineError> {
        let name = call.name();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if let Some(delay) = self.delays.get(name) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(message) = self.failures.get(name) {
            return Err(EngineError::failed(message.clone()));
        }
        out.write_all(format!("{name} ok\n").as_bytes()).await?;
        Ok(())
    }
}

#[async_trait]
impl Engine for RecordingEngine {
    async fn print_tables(&self, _config: &Config, out: &mut Output) -> Result<(), EngineError> {
        self.record(EngineCall::PrintTables, out).await
    }

    async fn create_backup(
        &self,
        _config: &Config,
        kind: &str,
        name: &str,
        tables: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let call = EngineCall::CreateBackup {
            kind: kind.into(),
            name: name.into(),
            tables: tables.into(),
        };
        self.record(call, out).await
    }

    async fn upload(
        &self,
        _config: &Config,
        kind: &str,
        name: &str,
        diff_from: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let call = EngineCall::Upload {
            kind: kind.into(),
            name: name.into(),
            diff_from: diff_from.into(),
        };
        self.record(call, out).await
    }

    async fn download(
        &self,
        _config: &Config,
        kind: &str,
        name: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let call = EngineCall::Download {
            kind: kind.into(),
            name: name.into(),
        };
        self.record(call, out).await
    }

    async fn restore(
        &self,
        _config: &Config,
        kind: &str,
        name: &str,
        tables: &str,
        schema_only: bool,
        data_only: bool,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let call = EngineCall::Restore {
            kind: kind.into(),
            name: name.into(),
            tables: tables.into(),
            schema_only,
            data_only,
        };
        self.record(call, out).await
    }

    async fn remove_backup_local(
        &self,
        _config: &Config,
        kind: &str,
        name: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let call = EngineCall::RemoveBackupLocal {
            kind: kind.into(),
            name: name.into(),
        };
        self.record(call, out).await
    }

    async fn remove_backup_remote(
        &self,
        _config: &Config,
        kind: &str,
        name: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let call = EngineCall::RemoveBackupRemote {
            kind: kind.into(),
            name: name.into(),
        };
        self.record(call, out).await
    }

    async fn print_local_backups(
        &self,
        _config: &Config,
        kind: &str,
        format: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let call = EngineCall::PrintLocalBackups {
            kind: kind.into(),
            format: format.into(),
        };
        self.record(call, out).await
    }

    async fn print_remote_backups(
        &self,
        _config: &Config,
        kind: &str,
        format: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let call = EngineCall::PrintRemoteBackups {
            kind: kind.into(),
            format: format.into(),
        };
        self.record(call, out).await
    }

    async fn freeze(
        &self,
        _config: &Config,
        tables: &str,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        let call = EngineCall::Freeze {
            tables: tables.into(),
        };
        self.record(call, out).await
    }

    async fn clean(&self, _config: &Config, out: &mut Output) -> Result<(), EngineError> {
        self.record(EngineCall::Clean, out).await
    }

    async fn is_clean(&self, _config: &Config) -> Result<bool, EngineError> {
        let mut sink: Vec<u8> = Vec::new();
        self.record(EngineCall::IsClean, &mut sink).await?;
        Ok(self.clean)
    }

    async fn print_default_config(
        &self,
        _config: &Config,
        out: &mut Output,
    ) -> Result<(), EngineError> {
        self.record(EngineCall::PrintDefaultConfig, out).await
    }
}
