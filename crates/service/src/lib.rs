pub mod bootstrap;
pub mod workflow;

pub use bootstrap::{bootstrap, bootstrap_with_config, init_logging, Application, BootstrapError};
pub use workflow::{RequestWorkflowService, ServiceError};
