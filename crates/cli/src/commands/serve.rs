use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::ArgMatches;

use chbackup_core::engine::process::ProcessEngine;

use crate::config;

pub async fn run(matches: &ArgMatches, config_path: &Path) -> Result<()> {
    let config = config::load(config_path)?;
    let port = matches.get_one::<u16>("port").copied();
    chbackup_server::serve(config, Arc::new(ProcessEngine::new()), port).await
}
