use serde_json::json;

use super::{entity_resource, manifest, ProgramSource, ProvisioningProgram, StackIdentity};
use crate::error::Result;
use crate::properties::ConfigSet;

const DEFAULT_ACL: &str = "private";

/// An S3 bucket with optional ACL and tags.
///
/// Config keys: `bucket_name`, `bucket_acl` (default `private`), `tags`
/// (`key=value,key2=value2`, or the JSON object text the entity stores).
#[derive(Debug, Clone, Copy, Default)]
pub struct S3Bucket;

impl ProvisioningProgram for S3Bucket {
    fn name(&self) -> &str {
        "aws-s3-bucket"
    }

    fn project_prefix(&self) -> &str {
        "bucket"
    }

    fn render(&self, identity: &StackIdentity, config: &ConfigSet) -> Result<ProgramSource> {
        let mut bucket = serde_json::Map::new();
        bucket.insert(
            "acl".into(),
            json!(config.non_empty("bucket_acl").unwrap_or(DEFAULT_ACL)),
        );
        if let Some(name) = config.non_empty("bucket_name") {
            bucket.insert("bucket".into(), json!(name));
        }
        bucket.insert("tags".into(), json!(parse_tags(config.get("tags"))));

        let entity = entity_resource(
            config,
            "Bucket ${bucket.bucket}",
            &[
                ("bucket_name", json!("${bucket.bucket}")),
                ("bucket_acl", json!("${bucket.acl}")),
                ("tags", json!({ "fn::toJSON": "${bucket.tags}" })),
                (
                    "url",
                    json!("https://s3.console.aws.amazon.com/s3/buckets/${bucket.bucket}"),
                ),
            ],
        );

        let resources = json!({
            "bucket": { "type": "aws:s3:Bucket", "properties": bucket },
            "entity": entity,
        });
        Ok(ProgramSource {
            project: identity.project_name.clone(),
            manifest: manifest(identity, "S3 bucket managed by Port", resources),
        })
    }
}

/// Malformed pairs (no `=`, empty key) are skipped.
fn parse_tags(raw: Option<&str>) -> serde_json::Map<String, serde_json::Value> {
    let raw = raw.unwrap_or_default().trim();
    if raw.starts_with('{') {
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(raw) {
            return map
                .into_iter()
                .filter(|(k, _)| !k.trim().is_empty())
                .map(|(k, v)| {
                    let v = match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (k, json!(v))
                })
                .collect();
        }
    }
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(k, _)| !k.trim().is_empty())
        .map(|(k, v)| (k.trim().to_string(), json!(v.trim())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> ConfigSet {
        let mut c = ConfigSet::new();
        for (k, v) in pairs {
            c.insert(*k, *v);
        }
        c.insert("run_id", "r1");
        c.insert("blueprint", "s3_bucket");
        c.insert("entity_identifier", "e1");
        c
    }

    fn render(pairs: &[(&str, &str)]) -> serde_json::Value {
        let identity = StackIdentity::derive("bucket", "e1");
        S3Bucket.render(&identity, &config(pairs)).unwrap().manifest
    }

    #[test]
    fn renders_bucket_and_entity() {
        let m = render(&[("bucket_name", "logs"), ("tags", "team=infra,env=prod")]);
        assert_eq!(m["name"], "bucket_e1");
        assert_eq!(m["runtime"], "yaml");
        let bucket = &m["resources"]["bucket"];
        assert_eq!(bucket["type"], "aws:s3:Bucket");
        assert_eq!(bucket["properties"]["bucket"], "logs");
        assert_eq!(bucket["properties"]["acl"], "private");
        assert_eq!(bucket["properties"]["tags"]["team"], "infra");
        assert_eq!(bucket["properties"]["tags"]["env"], "prod");

        let entity = &m["resources"]["entity"]["properties"];
        assert_eq!(entity["identifier"], "e1");
        assert_eq!(entity["runId"], "r1");
        assert_eq!(entity["properties"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn explicit_acl_wins() {
        let m = render(&[("bucket_acl", "public-read")]);
        assert_eq!(m["resources"]["bucket"]["properties"]["acl"], "public-read");
    }

    #[test]
    fn empty_name_lets_provider_generate_one() {
        let m = render(&[("bucket_name", "")]);
        assert!(m["resources"]["bucket"]["properties"].get("bucket").is_none());
    }

    #[test]
    fn malformed_tags_are_skipped() {
        let tags = parse_tags(Some("a=1,broken,=x,b=2"));
        assert_eq!(tags.len(), 2);
        assert_eq!(tags["a"], "1");
        assert_eq!(tags["b"], "2");
        assert!(parse_tags(None).is_empty());
    }

    #[test]
    fn tags_read_back_from_the_entity_survive_an_update() {
        let first = render(&[("tags", "team=infra,env=prod")]);
        let applied = &first["resources"]["bucket"]["properties"]["tags"];
        // Port stores the entity's tags as the JSON text of the applied map.
        let stored = serde_json::to_string(applied).unwrap();

        let second = render(&[("tags", stored.as_str())]);
        assert_eq!(&second["resources"]["bucket"]["properties"]["tags"], applied);
    }

    #[test]
    fn json_tags_keep_non_string_values_as_text() {
        let tags = parse_tags(Some(r#"{"tier": 2, "public": false, "": "x"}"#));
        assert_eq!(tags.len(), 2);
        assert_eq!(tags["tier"], "2");
        assert_eq!(tags["public"], "false");
    }

    #[test]
    fn manifest_serializes_to_yaml() {
        let identity = StackIdentity::derive("bucket", "e1");
        let source = S3Bucket.render(&identity, &config(&[])).unwrap();
        let yaml = source.to_yaml().unwrap();
        assert!(yaml.contains("runtime: yaml"));
        assert!(yaml.contains("port:index:Entity"));
    }
}
