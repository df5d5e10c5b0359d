pub mod action;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod properties;
pub mod report;
pub mod settings;
pub mod template;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use action::{ActionBody, ActionRequest, RunOutcome, RunStatus, TriggerKind};
pub use dispatch::{DispatchError, Dispatcher};
pub use engine::{EngineError, PluginSpec, ProvisioningEngine, StackHandle};
pub use error::{CoreError, Result};
pub use lifecycle::{LifecycleError, StackLifecycle};
pub use properties::{assemble, AssemblyContext, ConfigSet, PropertyBag, PropertyValue};
pub use report::{ReportError, StatusReporter};
pub use settings::Settings;
pub use template::{ProgramSource, ProvisioningProgram, StackIdentity, TemplateRegistry};
