use super::*;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

/// Logs each invocation's args to `$FAKE_LOG`; exits 3 with a message on
/// stderr when the first arg equals `$FAKE_FAIL`.
const FAKE_PULUMI: &str = r#"#!/bin/sh
echo "$*" >> "$FAKE_LOG"
if [ "$1" = "$FAKE_FAIL" ]; then
  echo "error: $1 went wrong" >&2
  exit 3
fi
echo "Updating ($1)"
"#;

struct Fixture {
    _tmp: TempDir,
    log: PathBuf,
    root: PathBuf,
    binary: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let binary = tmp.path().join("pulumi");
        std::fs::write(&binary, FAKE_PULUMI).unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self {
            log: tmp.path().join("calls.log"),
            root: tmp.path().join("workspaces"),
            binary,
            _tmp: tmp,
        }
    }

    fn cli(&self, fail: &str) -> PulumiCli {
        PulumiCli::with_binary(&self.binary, &self.root)
            .env("FAKE_LOG", self.log.to_string_lossy())
            .env("FAKE_FAIL", fail)
    }

    fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn identity() -> StackIdentity {
    StackIdentity::derive("bucket", "e1")
}

fn source() -> ProgramSource {
    ProgramSource {
        project: "bucket_e1".into(),
        manifest: serde_json::json!({"name": "bucket_e1", "runtime": "yaml"}),
    }
}

#[tokio::test]
async fn upsert_writes_project_file_and_selects_stack() {
    let fx = Fixture::new();
    let stack = fx.cli("").upsert_stack(&identity(), &source()).await.unwrap();

    assert_eq!(stack.workdir(), fx.root.join("bucket_e1"));
    let yaml = std::fs::read_to_string(stack.workdir().join(PROJECT_FILE)).unwrap();
    assert!(yaml.contains("name: bucket_e1"));
    assert!(yaml.contains("runtime: yaml"));
    assert_eq!(fx.calls(), ["stack select --create --stack e1"]);
}

#[tokio::test]
async fn lifecycle_commands_map_to_cli_invocations() {
    let fx = Fixture::new();
    let cli = fx.cli("");
    let stack = cli.upsert_stack(&identity(), &source()).await.unwrap();

    cli.install_plugin(&stack, &PluginSpec::new("aws", "v5.30.0"))
        .await
        .unwrap();
    cli.install_plugin(
        &stack,
        &PluginSpec::new("port", "v0.8.3").with_server("https://example.test/port"),
    )
    .await
    .unwrap();
    cli.set_config(&stack, "aws:region", "eu-west-1").await.unwrap();
    cli.refresh(&stack).await.unwrap();
    cli.up(&stack).await.unwrap();
    cli.destroy(&stack).await.unwrap();

    assert_eq!(
        fx.calls()[1..],
        [
            "plugin install resource aws v5.30.0",
            "plugin install resource port v0.8.3 --server https://example.test/port",
            "config set --stack e1 -- aws:region eu-west-1",
            "refresh --yes --skip-preview --stack e1",
            "up --yes --skip-preview --stack e1",
            "destroy --yes --skip-preview --stack e1",
        ]
    );
}

#[tokio::test]
async fn remove_stack_deletes_project_dir() {
    let fx = Fixture::new();
    let cli = fx.cli("");
    let stack = cli.upsert_stack(&identity(), &source()).await.unwrap();
    let dir = stack.workdir().to_path_buf();

    cli.remove_stack(stack).await.unwrap();
    assert!(!dir.exists());
    assert_eq!(fx.calls().last().unwrap(), "stack rm --yes e1");
}

#[tokio::test]
async fn non_zero_exit_carries_command_and_stderr() {
    let fx = Fixture::new();
    let cli = fx.cli("up");
    let stack = cli.upsert_stack(&identity(), &source()).await.unwrap();

    let err = cli.up(&stack).await.unwrap_err();
    match &err {
        EngineError::CommandFailed {
            command,
            status,
            stderr,
        } => {
            assert_eq!(command, "pulumi up --yes --skip-preview --stack e1");
            assert_eq!(status, "exit code 3");
            assert_eq!(stderr, "error: up went wrong");
        }
        other => panic!("expected CommandFailed, got {other}"),
    }
    assert!(err.to_string().ends_with(": error: up went wrong"));
}

#[tokio::test]
async fn failed_remove_keeps_project_dir() {
    let fx = Fixture::new();
    let cli = fx.cli("stack");
    let dir = fx.root.join("bucket_e1");
    std::fs::create_dir_all(&dir).unwrap();

    let err = cli
        .remove_stack(StackHandle::new(identity(), &dir))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CommandFailed { .. }));
    assert!(dir.exists());
}

#[test]
fn missing_binary_is_reported() {
    let fx = Fixture::new();
    let cli = PulumiCli::with_binary(fx.root.join("no-such-pulumi"), &fx.root);
    let rt = tokio::runtime::Runtime::new().unwrap();
    std::fs::create_dir_all(&fx.root).unwrap();
    let err = rt
        .block_on(cli.refresh(&StackHandle::new(identity(), &fx.root)))
        .unwrap_err();
    assert!(matches!(err, EngineError::Io(_)));
}
