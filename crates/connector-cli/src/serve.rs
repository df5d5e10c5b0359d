use anyhow::{bail, Context};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use connector_core::{Dispatcher, Settings, StackLifecycle, TemplateRegistry};
use connector_server::AppState;
use port_client::{PortClient, RetryPolicy};
use pulumi_driver::PulumiCli;

use crate::Cli;

pub fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.pulumi_access_token.trim().is_empty() {
        bail!("PULUMI_ACCESS_TOKEN is not set");
    }
    let settings = load_settings(cli.settings.as_deref())?;
    let workspace_root = workspace_root(cli.workspace_root.as_deref());
    std::fs::create_dir_all(&workspace_root)
        .with_context(|| format!("creating workspace root {}", workspace_root.display()))?;

    let engine = match &cli.pulumi_bin {
        Some(bin) => PulumiCli::with_binary(bin, &workspace_root),
        None => PulumiCli::locate(&workspace_root)?,
    }
    .env("PULUMI_ACCESS_TOKEN", cli.pulumi_access_token.as_str());
    info!(
        pulumi = %engine.binary().display(),
        workspace = %workspace_root.display(),
        "using pulumi CLI"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let port = PortClient::new(&cli.port_base_url, RetryPolicy::from(&settings.retry))?;
        port.authenticate(&cli.client_id, &cli.client_secret)
            .await
            .context("authenticating with Port")?;

        let registry = TemplateRegistry::builtin();
        info!(blueprints = ?registry.blueprints(), "templates registered");
        let lifecycle = StackLifecycle::new(Arc::new(engine), settings.plugins);
        let dispatcher = Dispatcher::new(registry, lifecycle, Arc::new(port));

        let mut state = AppState::new(dispatcher);
        if let Some(secs) = cli.action_timeout_secs {
            state = state.with_action_timeout(Duration::from_secs(secs));
        }
        connector_server::serve(state, cli.port).await
    })
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    match path {
        Some(p) => Settings::load(p).with_context(|| format!("loading settings from {}", p.display())),
        None => Ok(Settings::default()),
    }
}

fn workspace_root(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| std::env::temp_dir().join("pulumi-connector"))
}
