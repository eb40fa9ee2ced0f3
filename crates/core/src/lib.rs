pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod routing;
pub mod workflow;

pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
};
pub use domain::request::{
    ApprovalDecision, ChangeRequest, NewRequest, ProjectId, RequestId, RequestStatus, RequestType,
    StudentId, UserId,
};
pub use errors::WorkflowError;
pub use routing::{next_approval_step, requires_supervisor_approval, ApprovalStep};
pub use workflow::{DecisionCommand, TransitionOutcome, WorkflowEvent};
