use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgMatches;
use console::style;
use tracing::error;

use chbackup_core::engine::Output;
use chbackup_core::engine::process::ProcessEngine;
use chbackup_core::{Dispatcher, Engine, Operation};

use crate::{cli, config};

pub async fn run(op: &'static Operation, matches: &ArgMatches, config_path: &Path) -> ExitCode {
    let engine: Arc<dyn Engine> = Arc::new(ProcessEngine::new());
    let mut stdout = tokio::io::stdout();
    ExitCode::from(execute(op, matches, config_path, engine, &mut stdout).await)
}

/// Loads the config, validates the arguments against its address scheme and
/// runs `op`, writing engine output to `out` and diagnostics to stderr.
/// Returns the exit code.
pub async fn execute(
    op: &'static Operation,
    matches: &ArgMatches,
    config_path: &Path,
    engine: Arc<dyn Engine>,
    out: &mut Output,
) -> u8 {
    let config = if op.name == "default-config" {
        config::load_or_default(config_path)
    } else {
        match config::load(config_path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %format!("{e:#}"), "Fatal");
                return 1;
            }
        }
    };

    let scheme = config.api.addressing;
    let (address, options) = match cli::request(op, matches, scheme) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("{} {err}\n", style("error:").red().bold());
            eprintln!("{}", cli::operation_command(op, scheme).render_help());
            return err.exit_code();
        }
    };

    match Dispatcher::new(engine)
        .dispatch(&config, op, &address, &options, out)
        .await
    {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{} {err}", style("error:").red().bold());
            err.exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chbackup_core::engine::EngineCall;
    use chbackup_core::operation::find;
    use chbackup_core::testing::RecordingEngine;

    use super::*;

    fn write_config(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "general:\n  tables: \"db.*\"\n").unwrap();
        path
    }

    fn write_kinded_config(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("kinded.yml");
        std::fs::write(&path, "api:\n  addressing: kinded\n").unwrap();
        path
    }

    async fn exec(
        engine: Arc<RecordingEngine>,
        config_path: &Path,
        args: &[&str],
    ) -> (u8, String) {
        let matches = cli::command()
            .try_get_matches_from(std::iter::once("chbackup-agent").chain(args.iter().copied()))
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        let mut out: Vec<u8> = Vec::new();
        let code = execute(find(name).unwrap(), sub, config_path, engine, &mut out).await;
        (code, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn create_prints_engine_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir);
        let engine = Arc::new(RecordingEngine::new());

        let (code, out) = exec(engine.clone(), &path, &["create", "nightly"]).await;
        assert_eq!(code, 0);
        assert_eq!(out, "create_backup ok\n");
        assert_eq!(engine.call_names(), ["is_clean", "create_backup"]);
    }

    #[tokio::test]
    async fn usage_error_exits_two_without_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir);
        let engine = Arc::new(RecordingEngine::new());

        let (code, out) = exec(engine.clone(), &path, &["restore"]).await;
        assert_eq!(code, 2);
        assert!(out.is_empty());
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn engine_failure_exits_one_keeping_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir);
        let engine =
            Arc::new(RecordingEngine::new().failing("print_remote_backups", "no remote storage"));

        let (code, out) = exec(engine.clone(), &path, &["list"]).await;
        assert_eq!(code, 1);
        assert_eq!(out, "Local backups:\nprint_local_backups ok\nRemote backups:\n");
    }

    #[tokio::test]
    async fn missing_config_is_fatal_except_for_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yml");
        let engine = Arc::new(RecordingEngine::new());

        let (code, _) = exec(engine.clone(), &path, &["tables"]).await;
        assert_eq!(code, 1);
        assert!(engine.calls().is_empty());

        let (code, out) = exec(engine.clone(), &path, &["default-config"]).await;
        assert_eq!(code, 0);
        assert_eq!(out, "print_default_config ok\n");
    }

    #[tokio::test]
    async fn delete_all_fans_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_kinded_config(&dir);
        let engine = Arc::new(RecordingEngine::new());

        let (code, _) = exec(engine.clone(), &path, &["delete", "all", "shard1", "nightly"]).await;
        assert_eq!(code, 0);
        assert_eq!(
            engine.calls(),
            [
                EngineCall::RemoveBackupLocal {
                    kind: "shard1".into(),
                    name: "nightly".into()
                },
                EngineCall::RemoveBackupRemote {
                    kind: "shard1".into(),
                    name: "nightly".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn named_list_reads_second_value_as_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir);
        let engine = Arc::new(RecordingEngine::new());

        let (code, _) = exec(engine.clone(), &path, &["list", "remote", "latest"]).await;
        assert_eq!(code, 0);
        assert_eq!(
            engine.calls(),
            [EngineCall::PrintRemoteBackups {
                kind: String::new(),
                format: "latest".into()
            }]
        );
    }
}
