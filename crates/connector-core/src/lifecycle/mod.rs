//! Stack lifecycle: the Up and Destroy protocols against one stack.
//!
//! ```text
//! ABSENT ──upsert──▶ ACQUIRED ──plugins+config, refresh──▶ REFRESHED
//!                                                            │
//!               ┌──────────────── up ok ─────────────────────┤
//!               ▼                                            │ up failed
//!            APPLIED                                         ▼
//!                                              destroy + remove ──▶ ROLLED_BACK
//!
//! REFRESHED ──destroy + remove──▶ DESTROYED
//! ```
//!
//! A refresh failure aborts before anything is mutated. Both protocols hold
//! the per-identity lock from upsert to return.

mod locks;

pub use locks::{StackGuard, StackLocks};

use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::engine::{EngineError, PluginSpec, ProvisioningEngine, StackHandle};
use crate::error::CoreError;
use crate::properties::{ConfigSet, REGION_KEY};
use crate::template::{ProgramSource, ProvisioningProgram, StackIdentity};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("error rendering program: {0}")]
    Render(#[source] CoreError),

    #[error("error acquiring stack {identity}: {source}")]
    Acquire {
        identity: StackIdentity,
        #[source]
        source: EngineError,
    },

    #[error("error installing {plugin} resource plugin: {source}")]
    Plugin {
        plugin: String,
        #[source]
        source: EngineError,
    },

    #[error("error setting config '{key}': {source}")]
    Config {
        key: String,
        #[source]
        source: EngineError,
    },

    #[error("error refreshing stack: {0}")]
    Refresh(#[source] EngineError),

    /// The apply failed and the partial stack was rolled back.
    #[error("failed update: {0}")]
    Apply(#[source] EngineError),

    /// The apply failed and so did the rollback. The stack is in an unknown
    /// state.
    #[error("rollback failed to {step} stack: {rollback} (after failed update: {apply})")]
    RollbackFailed {
        step: RollbackStep,
        apply: EngineError,
        #[source]
        rollback: EngineError,
    },

    #[error("error destroying stack: {0}")]
    Destroy(#[source] EngineError),

    #[error("failed to remove stack: {0}")]
    RemoveStack(#[source] EngineError),

    #[error("deadline exceeded before {0}")]
    DeadlineExceeded(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackStep {
    Destroy,
    Remove,
}

impl std::fmt::Display for RollbackStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollbackStep::Destroy => f.write_str("destroy"),
            RollbackStep::Remove => f.write_str("remove"),
        }
    }
}

// ---------------------------------------------------------------------------
// StackLifecycle
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StackLifecycle {
    engine: Arc<dyn ProvisioningEngine>,
    plugins: Vec<PluginSpec>,
    locks: StackLocks,
}

impl StackLifecycle {
    pub fn new(engine: Arc<dyn ProvisioningEngine>, plugins: Vec<PluginSpec>) -> Self {
        Self {
            engine,
            plugins,
            locks: StackLocks::new(),
        }
    }

    pub fn locks(&self) -> &StackLocks {
        &self.locks
    }

    /// Create or update the stack. On apply failure the stack is destroyed
    /// and deregistered.
    pub async fn up(
        &self,
        identity: &StackIdentity,
        config: &ConfigSet,
        program: &dyn ProvisioningProgram,
        deadline: Option<Instant>,
    ) -> Result<(), LifecycleError> {
        let _guard = self.locks.acquire(identity).await;
        let rendered = program
            .render(identity, config)
            .map_err(LifecycleError::Render)?;
        let stack = self.prepare(identity, config, program.name(), &rendered).await?;

        check_deadline(deadline, "update")?;
        info!(stack = %identity, "applying stack");
        let apply_err = match self.engine.up(&stack).await {
            Ok(()) => {
                info!(stack = %identity, "stack applied");
                return Ok(());
            }
            Err(e) => e,
        };

        warn!(stack = %identity, error = %apply_err, "update failed, rolling back");
        if let Err(rollback) = self.engine.destroy(&stack).await {
            error!(stack = %identity, error = %rollback, "rollback destroy failed");
            return Err(LifecycleError::RollbackFailed {
                step: RollbackStep::Destroy,
                apply: apply_err,
                rollback,
            });
        }
        if let Err(rollback) = self.engine.remove_stack(stack).await {
            error!(stack = %identity, error = %rollback, "rollback remove failed");
            return Err(LifecycleError::RollbackFailed {
                step: RollbackStep::Remove,
                apply: apply_err,
                rollback,
            });
        }
        info!(stack = %identity, "stack rolled back");
        Err(LifecycleError::Apply(apply_err))
    }

    /// Tear the stack down and deregister it. No retries.
    pub async fn destroy(
        &self,
        identity: &StackIdentity,
        config: &ConfigSet,
        program: &dyn ProvisioningProgram,
        deadline: Option<Instant>,
    ) -> Result<(), LifecycleError> {
        let _guard = self.locks.acquire(identity).await;
        let rendered = program
            .render_teardown(identity, config)
            .map_err(LifecycleError::Render)?;
        let stack = self.prepare(identity, config, program.name(), &rendered).await?;

        check_deadline(deadline, "destroy")?;
        info!(stack = %identity, "destroying stack");
        self.engine
            .destroy(&stack)
            .await
            .map_err(LifecycleError::Destroy)?;
        self.engine
            .remove_stack(stack)
            .await
            .map_err(LifecycleError::RemoveStack)?;
        info!(stack = %identity, "stack destroyed and removed");
        Ok(())
    }

    /// ABSENT → REFRESHED: upsert, plugins, config, refresh.
    async fn prepare(
        &self,
        identity: &StackIdentity,
        config: &ConfigSet,
        program: &str,
        rendered: &ProgramSource,
    ) -> Result<StackHandle, LifecycleError> {
        let stack = self
            .engine
            .upsert_stack(identity, rendered)
            .await
            .map_err(|source| LifecycleError::Acquire {
                identity: identity.clone(),
                source,
            })?;
        info!(stack = %identity, program, "stack acquired");

        for plugin in &self.plugins {
            info!(plugin = %plugin.name, version = %plugin.version, "installing plugin");
            self.engine
                .install_plugin(&stack, plugin)
                .await
                .map_err(|source| LifecycleError::Plugin {
                    plugin: plugin.name.clone(),
                    source,
                })?;
        }

        self.apply_config(&stack, config).await?;

        info!(stack = %identity, "refreshing stack");
        self.engine
            .refresh(&stack)
            .await
            .map_err(LifecycleError::Refresh)?;
        Ok(stack)
    }

    /// Write every config entry; `region` is also written under each
    /// regional provider's namespace.
    async fn apply_config(&self, stack: &StackHandle, config: &ConfigSet) -> Result<(), LifecycleError> {
        for (key, value) in config.iter() {
            self.set(stack, key, value).await?;
            if key == REGION_KEY && !value.is_empty() {
                for plugin in self.plugins.iter().filter(|p| p.regional) {
                    self.set(stack, &plugin.region_key(), value).await?;
                }
            }
        }
        Ok(())
    }

    async fn set(&self, stack: &StackHandle, key: &str, value: &str) -> Result<(), LifecycleError> {
        self.engine
            .set_config(stack, key, value)
            .await
            .map_err(|source| LifecycleError::Config {
                key: key.to_string(),
                source,
            })
    }
}

fn check_deadline(deadline: Option<Instant>, step: &'static str) -> Result<(), LifecycleError> {
    match deadline {
        Some(d) if Instant::now() >= d => {
            warn!(step, "deadline exceeded, aborting before irreversible step");
            Err(LifecycleError::DeadlineExceeded(step))
        }
        _ => Ok(()),
    }
}
