//! Action dispatch: classify, resolve, run the lifecycle, report once.

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::action::{ActionRequest, RunOutcome, RunStatus, TriggerKind};
use crate::error::CoreError;
use crate::lifecycle::{LifecycleError, StackLifecycle};
use crate::properties::{assemble, AssemblyContext};
use crate::report::{ReportError, StatusReporter};
use crate::template::{generate_entity_key, TemplateRegistry};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Rejected before the lifecycle ran. Nothing was reported.
    #[error(transparent)]
    Input(#[from] CoreError),

    /// The lifecycle failed. A FAILURE report was attempted first.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The lifecycle succeeded but the SUCCESS report did not go through.
    #[error(transparent)]
    Report(#[from] ReportError),
}

impl DispatchError {
    /// The inbound action itself was at fault: unknown trigger or blueprint,
    /// missing entity, or properties the program refused to render.
    pub fn is_input_error(&self) -> bool {
        match self {
            DispatchError::Input(e) => e.is_input_error(),
            DispatchError::Lifecycle(LifecycleError::Render(e)) => e.is_input_error(),
            _ => false,
        }
    }
}

pub struct Dispatcher {
    registry: TemplateRegistry,
    lifecycle: StackLifecycle,
    reporter: Arc<dyn StatusReporter>,
}

impl Dispatcher {
    pub fn new(
        registry: TemplateRegistry,
        lifecycle: StackLifecycle,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            registry,
            lifecycle,
            reporter,
        }
    }

    pub async fn dispatch(&self, request: &ActionRequest) -> Result<RunOutcome, DispatchError> {
        let kind = request
            .trigger_kind()
            .ok_or_else(|| CoreError::UnknownAction {
                identifier: request.action_identifier.clone(),
                trigger: request.trigger.clone(),
            })?;

        let entity_key = match (&request.entity_id, kind) {
            (Some(id), _) => id.clone(),
            (None, TriggerKind::Delete) => {
                return Err(CoreError::MissingEntity {
                    identifier: request.action_identifier.clone(),
                    trigger: kind.to_string(),
                }
                .into())
            }
            (None, TriggerKind::Day2) => {
                warn!(
                    action = %request.action_identifier,
                    run_id = %request.run_id,
                    "DAY-2 action without an entity, provisioning a new stack"
                );
                generate_entity_key()
            }
            (None, TriggerKind::Create) => generate_entity_key(),
        };

        let resolved = self.registry.resolve(&request.blueprint, &entity_key)?;
        let ctx = AssemblyContext {
            entity_key,
            blueprint: request.blueprint.clone(),
            run_id: request.run_id.clone(),
        };

        info!(
            action = %request.action_identifier,
            trigger = %kind,
            run_id = %request.run_id,
            stack = %resolved.identity,
            "running action"
        );
        let result = if kind.is_teardown() {
            let config = assemble(&request.entity_properties, None, &ctx);
            self.lifecycle
                .destroy(&resolved.identity, &config, resolved.program.as_ref(), request.deadline)
                .await
        } else {
            let config = assemble(
                &request.entity_properties,
                Some(&request.action_properties),
                &ctx,
            );
            self.lifecycle
                .up(&resolved.identity, &config, resolved.program.as_ref(), request.deadline)
                .await
        };

        match result {
            Ok(()) => {
                self.reporter
                    .report(&request.run_id, RunStatus::Success)
                    .await?;
                info!(run_id = %request.run_id, "run reported as SUCCESS");
                Ok(RunOutcome {
                    run_id: request.run_id.clone(),
                    status: RunStatus::Success,
                })
            }
            Err(lifecycle_err) => {
                error!(run_id = %request.run_id, error = %lifecycle_err, "action failed");
                if let Err(report_err) = self
                    .reporter
                    .report(&request.run_id, RunStatus::Failure)
                    .await
                {
                    error!(run_id = %request.run_id, error = %report_err, "failed to report FAILURE");
                }
                Err(lifecycle_err.into())
            }
        }
    }
}
