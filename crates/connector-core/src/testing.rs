//! Recording fakes for the engine and status reporter.
//!
//! Compiled for this crate's tests and, with the `testing` feature, for
//! downstream crates' tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::action::{RunOutcome, RunStatus};
use crate::engine::{EngineError, PluginSpec, ProvisioningEngine, StackHandle};
use crate::report::{ReportError, StatusReporter};
use crate::template::{ProgramSource, StackIdentity};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// FakeEngine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    Upsert,
    InstallPlugin,
    SetConfig,
    Refresh,
    Up,
    Destroy,
    RemoveStack,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCall {
    pub op: EngineOp,
    pub stack: String,
    /// Project for upserts, plugin name, or `key=value` for config.
    pub detail: String,
}

/// Records every call before deciding its result, so a failing call is
/// still visible in `calls()`.
#[derive(Debug, Default)]
pub struct FakeEngine {
    calls: Mutex<Vec<EngineCall>>,
    sources: Mutex<Vec<ProgramSource>>,
    failures: Mutex<HashSet<EngineOp>>,
    delay: Option<Duration>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(self, op: EngineOp) -> Self {
        lock(&self.failures).insert(op);
        self
    }

    /// Sleep inside every call, widening any interleaving window.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        lock(&self.calls).clone()
    }

    pub fn ops(&self) -> Vec<EngineOp> {
        lock(&self.calls).iter().map(|c| c.op).collect()
    }

    /// Calls other than plugin installs and config writes.
    pub fn lifecycle_ops(&self) -> Vec<EngineOp> {
        self.ops()
            .into_iter()
            .filter(|op| !matches!(op, EngineOp::InstallPlugin | EngineOp::SetConfig))
            .collect()
    }

    pub fn config_writes(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.op == EngineOp::SetConfig)
            .map(|c| c.detail.clone())
            .collect()
    }

    pub fn upserted(&self) -> Vec<ProgramSource> {
        lock(&self.sources).clone()
    }

    pub fn count(&self, op: EngineOp) -> usize {
        lock(&self.calls).iter().filter(|c| c.op == op).count()
    }

    async fn record(&self, op: EngineOp, stack: &str, detail: String) -> Result<(), EngineError> {
        lock(&self.calls).push(EngineCall {
            op,
            stack: stack.to_string(),
            detail,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if lock(&self.failures).contains(&op) {
            return Err(EngineError::Other(format!("simulated {op:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl ProvisioningEngine for FakeEngine {
    async fn upsert_stack(
        &self,
        identity: &StackIdentity,
        source: &ProgramSource,
    ) -> Result<StackHandle, EngineError> {
        lock(&self.sources).push(source.clone());
        self.record(EngineOp::Upsert, &identity.stack_name, identity.project_name.clone())
            .await?;
        Ok(StackHandle::new(identity.clone(), std::env::temp_dir()))
    }

    async fn install_plugin(
        &self,
        stack: &StackHandle,
        plugin: &PluginSpec,
    ) -> Result<(), EngineError> {
        self.record(
            EngineOp::InstallPlugin,
            &stack.identity().stack_name,
            plugin.name.clone(),
        )
        .await
    }

    async fn set_config(
        &self,
        stack: &StackHandle,
        key: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        self.record(
            EngineOp::SetConfig,
            &stack.identity().stack_name,
            format!("{key}={value}"),
        )
        .await
    }

    async fn refresh(&self, stack: &StackHandle) -> Result<(), EngineError> {
        self.record(EngineOp::Refresh, &stack.identity().stack_name, String::new())
            .await
    }

    async fn up(&self, stack: &StackHandle) -> Result<(), EngineError> {
        self.record(EngineOp::Up, &stack.identity().stack_name, String::new())
            .await
    }

    async fn destroy(&self, stack: &StackHandle) -> Result<(), EngineError> {
        self.record(EngineOp::Destroy, &stack.identity().stack_name, String::new())
            .await
    }

    async fn remove_stack(&self, stack: StackHandle) -> Result<(), EngineError> {
        self.record(
            EngineOp::RemoveStack,
            &stack.identity().stack_name,
            String::new(),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<RunOutcome>>,
    fail: bool,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the attempt, then rejects it.
    pub fn failing() -> Self {
        Self {
            reports: Mutex::default(),
            fail: true,
        }
    }

    pub fn reports(&self) -> Vec<RunOutcome> {
        lock(&self.reports).clone()
    }
}

#[async_trait]
impl StatusReporter for RecordingReporter {
    async fn report(&self, run_id: &str, status: RunStatus) -> Result<(), ReportError> {
        lock(&self.reports).push(RunOutcome {
            run_id: run_id.to_string(),
            status,
        });
        if self.fail {
            return Err(ReportError::new(run_id, status, "simulated report failure"));
        }
        Ok(())
    }
}
