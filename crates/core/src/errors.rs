use thiserror::Error;

use crate::domain::request::{RequestId, RequestStatus, StudentId};
use crate::workflow::WorkflowEvent;

/// Domain-level failures of the approval workflow.
///
/// `InvalidTransition` carries the status observed at decision time, so a
/// caller can tell "someone else already decided this" (a terminal or
/// advanced status) apart from `Forbidden` ("you are not authorized").
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("student {actor:?} does not own request {request:?}")]
    Forbidden { request: RequestId, actor: StudentId },
    #[error("invalid transition from {status:?} using event {event:?}")]
    InvalidTransition { status: RequestStatus, event: WorkflowEvent },
}
