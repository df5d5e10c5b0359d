use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown action: {identifier} (trigger '{trigger}')")]
    UnknownAction { identifier: String, trigger: String },

    #[error("unknown blueprint: '{0}'")]
    UnknownBlueprint(String),

    #[error("{trigger} action '{identifier}' requires an entity identifier")]
    MissingEntity { identifier: String, trigger: String },

    #[error("invalid value for '{key}': {reason}")]
    InvalidProperty { key: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Errors caused by the shape of the inbound action rather than by the
    /// provisioning engine. These never reach the lifecycle or the reporter.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CoreError::UnknownAction { .. }
                | CoreError::UnknownBlueprint(_)
                | CoreError::MissingEntity { .. }
                | CoreError::InvalidProperty { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
