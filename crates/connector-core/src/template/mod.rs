//! Template resolution: blueprint → provisioning program + stack identity.

mod bucket;
mod cluster;

pub use bucket::S3Bucket;
pub use cluster::CivoCluster;

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::properties::ConfigSet;

/// Length of the random part of a generated entity key.
pub const GENERATED_KEY_LEN: usize = 16;

// ---------------------------------------------------------------------------
// StackIdentity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StackIdentity {
    pub project_name: String,
    pub stack_name: String,
}

impl StackIdentity {
    /// Pure: the same prefix and key always give the same identity.
    pub fn derive(project_prefix: &str, entity_key: &str) -> Self {
        Self {
            project_name: format!("{project_prefix}_{entity_key}"),
            stack_name: entity_key.to_string(),
        }
    }
}

impl fmt::Display for StackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_name, self.stack_name)
    }
}

/// A fresh entity key for a first CREATE: `e_` + 16 hex characters.
pub fn generate_entity_key() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("e_{}", &id[..GENERATED_KEY_LEN])
}

// ---------------------------------------------------------------------------
// ProvisioningProgram
// ---------------------------------------------------------------------------

/// A rendered project the engine can run: the project name and its
/// Pulumi YAML manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSource {
    pub project: String,
    pub manifest: serde_json::Value,
}

impl ProgramSource {
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.manifest)
    }
}

/// A pluggable unit of infrastructure logic. Each program produces its
/// resources plus exactly one Port entity describing them.
pub trait ProvisioningProgram: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Prefix of the project name (`<prefix>_<entity key>`).
    fn project_prefix(&self) -> &str;

    fn render(&self, identity: &StackIdentity, config: &ConfigSet) -> Result<ProgramSource>;

    /// Render for a destroy. The engine tears down from stack state and never
    /// evaluates the program, so inputs only an apply needs may be absent.
    fn render_teardown(&self, identity: &StackIdentity, config: &ConfigSet) -> Result<ProgramSource> {
        self.render(identity, config)
    }
}

/// Skeleton shared by every program manifest.
pub(crate) fn manifest(
    identity: &StackIdentity,
    description: &str,
    resources: serde_json::Value,
) -> serde_json::Value {
    serde_json::json!({
        "name": identity.project_name,
        "runtime": "yaml",
        "description": description,
        "resources": resources,
    })
}

/// The `port:index:Entity` resource every program registers.
pub(crate) fn entity_resource(
    config: &ConfigSet,
    title: &str,
    properties: &[(&str, serde_json::Value)],
) -> serde_json::Value {
    use crate::properties::{BLUEPRINT_KEY, ENTITY_IDENTIFIER_KEY, RUN_ID_KEY};

    let properties: Vec<_> = properties
        .iter()
        .map(|(name, value)| serde_json::json!({ "name": name, "value": value }))
        .collect();
    serde_json::json!({
        "type": "port:index:Entity",
        "properties": {
            "runId": config.get(RUN_ID_KEY).unwrap_or_default(),
            "blueprint": config.get(BLUEPRINT_KEY).unwrap_or_default(),
            "identifier": config.get(ENTITY_IDENTIFIER_KEY).unwrap_or_default(),
            "title": title,
            "properties": properties,
        }
    })
}

// ---------------------------------------------------------------------------
// TemplateRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    pub program: Arc<dyn ProvisioningProgram>,
    pub identity: StackIdentity,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    programs: HashMap<String, Arc<dyn ProvisioningProgram>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `s3_bucket` and `civo_cluster`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("s3_bucket", Arc::new(S3Bucket));
        registry.register("civo_cluster", Arc::new(CivoCluster));
        registry
    }

    pub fn register(&mut self, blueprint: impl Into<String>, program: Arc<dyn ProvisioningProgram>) {
        self.programs.insert(blueprint.into(), program);
    }

    pub fn blueprints(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.programs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn resolve(&self, blueprint: &str, entity_key: &str) -> Result<ResolvedTemplate> {
        let program = self
            .programs
            .get(blueprint)
            .ok_or_else(|| CoreError::UnknownBlueprint(blueprint.to_string()))?;
        Ok(ResolvedTemplate {
            identity: StackIdentity::derive(program.project_prefix(), entity_key),
            program: Arc::clone(program),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let a = StackIdentity::derive("bucket", "e1");
        let b = StackIdentity::derive("bucket", "e1");
        assert_eq!(a, b);
        assert_eq!(a.project_name, "bucket_e1");
        assert_eq!(a.stack_name, "e1");
        assert_eq!(a.to_string(), "bucket_e1/e1");
    }

    #[test]
    fn generated_keys_are_fresh_and_fixed_length() {
        let a = generate_entity_key();
        let b = generate_entity_key();
        assert_ne!(a, b);
        for key in [&a, &b] {
            let suffix = key.strip_prefix("e_").expect("generated keys start with e_");
            assert_eq!(suffix.len(), GENERATED_KEY_LEN);
            assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn builtin_registry_resolves_known_blueprints() {
        let registry = TemplateRegistry::builtin();
        assert_eq!(registry.blueprints(), ["civo_cluster", "s3_bucket"]);

        let bucket = registry.resolve("s3_bucket", "e1").unwrap();
        assert_eq!(bucket.identity, StackIdentity::derive("bucket", "e1"));
        assert_eq!(bucket.program.name(), "aws-s3-bucket");

        let cluster = registry.resolve("civo_cluster", "e2").unwrap();
        assert_eq!(cluster.identity.project_name, "civo_cluster_e2");
    }

    #[test]
    fn unknown_blueprint_names_the_value() {
        let err = TemplateRegistry::builtin()
            .resolve("gcs_bucket", "e1")
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownBlueprint(ref b) if b == "gcs_bucket"));
        assert_eq!(err.to_string(), "unknown blueprint: 'gcs_bucket'");
    }

    #[test]
    fn lookup_is_exact() {
        assert!(TemplateRegistry::builtin().resolve("S3_BUCKET", "e1").is_err());
    }
}
