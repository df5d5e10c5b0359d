//! `pulumi-driver`: the `ProvisioningEngine` backed by the `pulumi` CLI.
//!
//! Every stack gets its own project directory under the workspace root,
//! holding the rendered `Pulumi.yaml`. State lives in whichever backend the
//! CLI is logged into (`PULUMI_ACCESS_TOKEN` for the managed service).
//!
//! ```text
//! <workspace root>/
//!   bucket_e_3f2a.../Pulumi.yaml
//!   civo_cluster_e1/Pulumi.yaml
//! ```

mod process;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use connector_core::{
    EngineError, PluginSpec, ProgramSource, ProvisioningEngine, StackHandle, StackIdentity,
};
use process::Invocation;

pub const PROJECT_FILE: &str = "Pulumi.yaml";

pub struct PulumiCli {
    binary: PathBuf,
    workspace_root: PathBuf,
    env: BTreeMap<String, String>,
}

impl PulumiCli {
    /// Use the `pulumi` found on `PATH`.
    pub fn locate(workspace_root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let binary =
            which::which("pulumi").map_err(|_| EngineError::BinaryNotFound("pulumi".into()))?;
        Ok(Self::with_binary(binary, workspace_root))
    }

    pub fn with_binary(binary: impl Into<PathBuf>, workspace_root: impl Into<PathBuf>) -> Self {
        let mut env = BTreeMap::new();
        env.insert("PULUMI_SKIP_UPDATE_CHECK".to_string(), "true".to_string());
        Self {
            binary: binary.into(),
            workspace_root: workspace_root.into(),
            env,
        }
    }

    /// Extra environment for every invocation (e.g. `PULUMI_ACCESS_TOKEN`).
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn project_dir(&self, identity: &StackIdentity) -> PathBuf {
        self.workspace_root.join(&identity.project_name)
    }

    async fn pulumi<I, S>(&self, stack: &StackHandle, args: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation {
            binary: &self.binary,
            args: args.into_iter().map(Into::into).collect(),
            cwd: stack.workdir(),
            env: &self.env,
            stack: &stack.identity().stack_name,
        }
        .run()
        .await
    }

    async fn stack_cmd(&self, stack: &StackHandle, cmd: &str) -> Result<(), EngineError> {
        let name = stack.identity().stack_name.as_str();
        self.pulumi(stack, [cmd, "--yes", "--skip-preview", "--stack", name])
            .await
    }
}

#[async_trait]
impl ProvisioningEngine for PulumiCli {
    async fn upsert_stack(
        &self,
        identity: &StackIdentity,
        source: &ProgramSource,
    ) -> Result<StackHandle, EngineError> {
        let dir = self.project_dir(identity);
        tokio::fs::create_dir_all(&dir).await?;
        let yaml = source
            .to_yaml()
            .map_err(|e| EngineError::Program(e.to_string()))?;
        tokio::fs::write(dir.join(PROJECT_FILE), yaml).await?;

        let stack = StackHandle::new(identity.clone(), dir);
        self.pulumi(
            &stack,
            [
                "stack",
                "select",
                "--create",
                "--stack",
                identity.stack_name.as_str(),
            ],
        )
        .await?;
        Ok(stack)
    }

    async fn install_plugin(
        &self,
        stack: &StackHandle,
        plugin: &PluginSpec,
    ) -> Result<(), EngineError> {
        let mut args = vec![
            "plugin".to_string(),
            "install".to_string(),
            "resource".to_string(),
            plugin.name.clone(),
            plugin.version.clone(),
        ];
        if let Some(server) = &plugin.server {
            args.push("--server".to_string());
            args.push(server.clone());
        }
        self.pulumi(stack, args).await
    }

    async fn set_config(
        &self,
        stack: &StackHandle,
        key: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        let name = stack.identity().stack_name.as_str();
        // `--` so values starting with '-' are not read as flags.
        self.pulumi(stack, ["config", "set", "--stack", name, "--", key, value])
            .await
    }

    async fn refresh(&self, stack: &StackHandle) -> Result<(), EngineError> {
        self.stack_cmd(stack, "refresh").await
    }

    async fn up(&self, stack: &StackHandle) -> Result<(), EngineError> {
        self.stack_cmd(stack, "up").await
    }

    async fn destroy(&self, stack: &StackHandle) -> Result<(), EngineError> {
        self.stack_cmd(stack, "destroy").await
    }

    async fn remove_stack(&self, stack: StackHandle) -> Result<(), EngineError> {
        let name = stack.identity().stack_name.clone();
        self.pulumi(&stack, ["stack", "rm", "--yes", name.as_str()])
            .await?;
        match tokio::fs::remove_dir_all(stack.workdir()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(stack = %name, error = %e, "stack removed but project dir was not");
            }
        }
        info!(stack = %stack.identity(), "stack removed");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests;
