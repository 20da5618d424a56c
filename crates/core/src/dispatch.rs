use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::address::{Address, Options};
use crate::config::Config;
use crate::engine::{Engine, Output};
use crate::error::DispatchError;
use crate::lease::LeaseTable;
use crate::operation::Operation;
use crate::plan::Plan;

/// Runs validated operations against the engine. Shared by both transports;
/// cloning shares the lease table.
#[derive(Clone)]
pub struct Dispatcher {
    engine: Arc<dyn Engine>,
    leases: LeaseTable,
}

impl Dispatcher {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            leases: LeaseTable::new(),
        }
    }

    pub fn leases(&self) -> &LeaseTable {
        &self.leases
    }

    pub async fn dispatch(
        &self,
        config: &Config,
        op: &Operation,
        address: &Address,
        options: &Options,
        out: &mut Output,
    ) -> Result<(), DispatchError> {
        let plan = op.plan(address, options)?;
        let _leases = self.leases.acquire(plan.resources())?;

        if plan.needs_clean_shadow() && config.api.require_clean_shadow {
            if !self.engine.is_clean(config).await? {
                warn!(op = op.name, "Shadow directory is not clean, refusing to start");
                return Err(DispatchError::ShadowNotClean);
            }
        }

        info!(
            op = op.name,
            tier = ?address.server_tier,
            backup_type = %address.backup_kind,
            backup = %address.backup_name,
            "Dispatching"
        );
        self.execute(config, &plan, out).await
    }

    /// Runs steps in order and stops at the first failure. Output already
    /// written by earlier steps stays written.
    async fn execute(
        &self,
        config: &Config,
        plan: &Plan,
        out: &mut Output,
    ) -> Result<(), DispatchError> {
        for step in plan.steps() {
            if let Some(heading) = step.heading {
                out.write_all(format!("{heading}\n").as_bytes())
                    .await
                    .map_err(DispatchError::Output)?;
            }
            debug!(call = step.call.name(), "Calling engine");
            if let Err(e) = step.call.invoke(self.engine.as_ref(), config, out).await {
                warn!(call = step.call.name(), error = %e, "Engine call failed");
                out.flush().await.map_err(DispatchError::Output)?;
                return Err(e.into());
            }
        }
        out.flush().await.map_err(DispatchError::Output)
    }
}
