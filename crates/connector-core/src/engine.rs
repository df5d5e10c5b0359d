//! The provisioning-engine capability surface the lifecycle is written
//! against. `pulumi-driver` provides the real implementation; tests use the
//! recording fake in `testing`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::template::{ProgramSource, StackIdentity};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("`{command}` failed ({status}){}", stderr_suffix(.stderr))]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("engine binary not found: {0}")]
    BinaryNotFound(String),

    #[error("invalid program source: {0}")]
    Program(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// A resource plugin pinned to an exact version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    pub version: String,
    /// Download server for plugins not published to the default registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Whether the provider reads `<name>:region` from stack config.
    #[serde(default)]
    pub regional: bool,
}

impl PluginSpec {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            server: None,
            regional: false,
        }
    }

    pub fn regional(mut self) -> Self {
        self.regional = true;
        self
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn region_key(&self) -> String {
        format!("{}:region", self.name)
    }
}

/// A live stack acquired from the engine for the duration of one lifecycle
/// call.
#[derive(Debug, Clone)]
pub struct StackHandle {
    identity: StackIdentity,
    workdir: PathBuf,
}

impl StackHandle {
    pub fn new(identity: StackIdentity, workdir: impl Into<PathBuf>) -> Self {
        Self {
            identity,
            workdir: workdir.into(),
        }
    }

    pub fn identity(&self) -> &StackIdentity {
        &self.identity
    }

    /// Engine-private working directory (project files, local state).
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Select the stack for `identity`, creating it if it does not exist.
    async fn upsert_stack(
        &self,
        identity: &StackIdentity,
        source: &ProgramSource,
    ) -> Result<StackHandle, EngineError>;

    async fn install_plugin(
        &self,
        stack: &StackHandle,
        plugin: &PluginSpec,
    ) -> Result<(), EngineError>;

    async fn set_config(&self, stack: &StackHandle, key: &str, value: &str)
        -> Result<(), EngineError>;

    /// Reconcile tracked state with the real infrastructure.
    async fn refresh(&self, stack: &StackHandle) -> Result<(), EngineError>;

    async fn up(&self, stack: &StackHandle) -> Result<(), EngineError>;

    async fn destroy(&self, stack: &StackHandle) -> Result<(), EngineError>;

    /// Drop the stack's workspace registration. Consumes the handle.
    async fn remove_stack(&self, stack: StackHandle) -> Result<(), EngineError>;
}
