mod serve;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pulumi-connector",
    about = "Receive Port self-service actions and provision their infrastructure with Pulumi",
    version
)]
pub struct Cli {
    /// HTTP port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Port API client id
    #[arg(long, env = "PORT_CLIENT_ID")]
    client_id: String,

    /// Port API client secret
    #[arg(long, env = "PORT_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    /// Port API base URL
    #[arg(long, env = "PORT_BASE_URL", default_value = port_client::DEFAULT_BASE_URL)]
    port_base_url: String,

    /// Pulumi Cloud access token, passed through to every pulumi invocation
    #[arg(long, env = "PULUMI_ACCESS_TOKEN", hide_env_values = true)]
    pulumi_access_token: String,

    /// Directory holding one project dir per stack (default: $TMPDIR/pulumi-connector)
    #[arg(long, env = "CONNECTOR_WORKSPACE_ROOT")]
    workspace_root: Option<PathBuf>,

    /// Path to the pulumi binary (default: looked up on PATH)
    #[arg(long, env = "PULUMI_BIN")]
    pulumi_bin: Option<PathBuf>,

    /// Abort an action before its next irreversible step once this many
    /// seconds have passed
    #[arg(long, env = "ACTION_TIMEOUT_SECS")]
    action_timeout_secs: Option<u64>,

    /// YAML settings file overriding plugin pins and the retry policy
    #[arg(long, env = "CONNECTOR_SETTINGS")]
    settings: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    if let Err(e) = serve::run(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const REQUIRED: [&str; 7] = [
        "pulumi-connector",
        "--client-id",
        "id",
        "--client-secret",
        "secret",
        "--pulumi-access-token",
        "pul-123",
    ];

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_apply_when_only_credentials_are_given() {
        let cli = Cli::try_parse_from(REQUIRED).unwrap();
        assert_eq!(cli.client_id, "id");
        assert_eq!(cli.port_base_url, "https://api.getport.io");
        assert!(cli.workspace_root.is_none());
        assert!(cli.action_timeout_secs.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let mut args = REQUIRED.to_vec();
        args.extend(["--port", "9090", "--action-timeout-secs", "600"]);
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.port, 9090);
        assert_eq!(cli.action_timeout_secs, Some(600));
    }
}
