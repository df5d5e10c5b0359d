//! Inbound action model.
//!
//! `ActionBody` mirrors the JSON document Port posts to a webhook action
//! backend. `ActionRequest` is the immutable, typed view the dispatcher works
//! with: property bags are converted to `PropertyValue` trees and the
//! invocation context is flattened into plain fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tokio::time::Instant;

use crate::properties::{bag_from_json, PropertyBag};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBody {
    #[serde(default)]
    pub action: String,
    #[serde(default, alias = "resource_type")]
    pub resource_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub trigger: TriggerInfo,
    pub context: ActionContext,
    #[serde(default)]
    pub payload: Payload,
}

/// Who fired the action, and when.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerInfo {
    #[serde(default)]
    pub by: TriggeredBy,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub origin: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredBy {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub org_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionContext {
    /// Absent (or empty) on the first CREATE of an entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default)]
    pub blueprint: String,
    pub run_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub entity: EntitySnapshot,
    #[serde(default)]
    pub action: ActionDefinition,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Current state of the entity the action runs against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub blueprint: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub relations: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub updated_by: String,
}

/// The action definition as configured in Port.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub blueprint: String,
    #[serde(default)]
    pub invocation_method: InvocationMethod,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationMethod {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub url: String,
}

/// Port sends `null` for the entity of a CREATE action and for empty bags.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// TriggerKind
// ---------------------------------------------------------------------------

/// Classification of an inbound action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Create,
    /// Update of an existing entity.
    Day2,
    Delete,
}

impl TriggerKind {
    /// Exact, case-sensitive match on the Port trigger names.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "CREATE" => Some(Self::Create),
            "DAY-2" => Some(Self::Day2),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Day2 => "DAY-2",
            Self::Delete => "DELETE",
        }
    }

    /// CREATE and DAY-2 both converge the stack; only DELETE tears it down.
    pub fn is_teardown(&self) -> bool {
        matches!(self, Self::Delete)
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionRequest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ActionRequest {
    /// Raw trigger string; classified by the dispatcher.
    pub trigger: String,
    pub action_identifier: String,
    pub resource_type: String,
    pub run_id: String,
    pub blueprint: String,
    pub entity_id: Option<String>,
    pub entity_properties: PropertyBag,
    pub action_properties: PropertyBag,
    /// Irreversible steps are not started once this instant has passed.
    pub deadline: Option<Instant>,
}

impl ActionRequest {
    pub fn from_body(body: &ActionBody) -> Self {
        let entity_id = body
            .context
            .entity
            .as_deref()
            .filter(|e| !e.is_empty())
            .map(str::to_string);

        Self {
            trigger: body.payload.action.trigger.clone(),
            action_identifier: body.payload.action.identifier.clone(),
            resource_type: body.resource_type.clone(),
            run_id: body.context.run_id.clone(),
            blueprint: body.context.blueprint.clone(),
            entity_id,
            entity_properties: bag_from_json(&body.payload.entity.properties),
            action_properties: bag_from_json(&body.payload.properties),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn trigger_kind(&self) -> Option<TriggerKind> {
        TriggerKind::parse(&self.trigger)
    }
}

// ---------------------------------------------------------------------------
// RunStatus / RunOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Failure,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
}
