//! The inbound operation surface of the approval workflow.
//!
//! Every mutation runs read → guard → write as one critical section under a
//! per-request-id lock, so two racing decisions on the same id cannot both
//! observe the pre-transition status: exactly one wins and the loser fails
//! its guard against the updated status.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use petitions_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use petitions_core::domain::request::{ChangeRequest, NewRequest, RequestId, StudentId, UserId};
use petitions_core::errors::WorkflowError;
use petitions_core::routing::{next_approval_step, ApprovalStep};
use petitions_core::workflow::{self, DecisionCommand};
use petitions_db::repositories::{RepositoryError, RequestRepository};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("change request {0:?} was not found")]
    NotFound(RequestId),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
}

enum DecisionPath {
    Supervisor,
    Committee,
    /// Legacy callers do not name a stage; the routing policy picks it.
    Auto,
}

pub struct RequestWorkflowService<R> {
    repository: Arc<R>,
    audit: Arc<dyn AuditSink>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<R> RequestWorkflowService<R>
where
    R: RequestRepository,
{
    pub fn new(repository: Arc<R>, audit: Arc<dyn AuditSink>) -> Self {
        Self { repository, audit, locks: Mutex::new(HashMap::new()) }
    }

    pub async fn create_request(&self, input: NewRequest) -> Result<ChangeRequest, ServiceError> {
        let request = ChangeRequest::create(input)?;
        self.repository.save(request.clone()).await?;

        let correlation_id = Uuid::new_v4().to_string();
        info!(
            event_name = "workflow.request_created",
            correlation_id = %correlation_id,
            request_id = %request.id.0,
            request_type = ?request.request_type,
            "change request created"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(request.id.clone()),
                correlation_id,
                "workflow.request_created",
                AuditCategory::Workflow,
                request.student_id.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("request_type", format!("{:?}", request.request_type)),
        );

        Ok(request)
    }

    pub async fn get_request(&self, id: &RequestId) -> Result<ChangeRequest, ServiceError> {
        self.repository.find_by_id(id).await?.ok_or_else(|| ServiceError::NotFound(id.clone()))
    }

    pub async fn supervisor_decision(
        &self,
        id: &RequestId,
        approver: UserId,
        approved: bool,
        comments: Option<String>,
    ) -> Result<ChangeRequest, ServiceError> {
        let command = DecisionCommand { decided_by: approver, approved, comments };
        self.apply_decision(id, command, DecisionPath::Supervisor).await
    }

    pub async fn committee_decision(
        &self,
        id: &RequestId,
        approver: UserId,
        approved: bool,
        comments: Option<String>,
    ) -> Result<ChangeRequest, ServiceError> {
        let command = DecisionCommand { decided_by: approver, approved, comments };
        self.apply_decision(id, command, DecisionPath::Committee).await
    }

    /// Legacy entry point: a generic approve/reject intent; the stage is
    /// inferred from the request's current status via the routing policy.
    pub async fn decide(
        &self,
        id: &RequestId,
        approver: UserId,
        approved: bool,
        comments: Option<String>,
    ) -> Result<ChangeRequest, ServiceError> {
        let command = DecisionCommand { decided_by: approver, approved, comments };
        self.apply_decision(id, command, DecisionPath::Auto).await
    }

    pub async fn cancel_request(
        &self,
        id: &RequestId,
        student: &StudentId,
    ) -> Result<(), ServiceError> {
        let guard = self.lock_for(id).await;
        let _held = guard.lock().await;

        let mut request =
            self.repository.find_by_id(id).await?.ok_or_else(|| ServiceError::NotFound(id.clone()))?;
        let correlation_id = Uuid::new_v4().to_string();

        match workflow::cancel(&mut request, student) {
            Ok(outcome) => {
                self.repository.save(request).await?;
                info!(
                    event_name = "workflow.request_cancelled",
                    correlation_id = %correlation_id,
                    request_id = %id.0,
                    "change request cancelled by its student"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(id.clone()),
                        correlation_id,
                        "workflow.request_cancelled",
                        AuditCategory::Workflow,
                        student.0.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from)),
                );
                Ok(())
            }
            Err(error) => {
                warn!(
                    event_name = "workflow.cancel_rejected",
                    correlation_id = %correlation_id,
                    request_id = %id.0,
                    error = %error,
                    "cancellation rejected"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(id.clone()),
                        correlation_id,
                        "workflow.cancel_rejected",
                        AuditCategory::Workflow,
                        student.0.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
                Err(error.into())
            }
        }
    }

    /// Requests waiting on this supervisor's decision.
    pub async fn list_pending_for_supervisor(
        &self,
        supervisor: &UserId,
    ) -> Result<Vec<ChangeRequest>, ServiceError> {
        let open = self.repository.list_open().await?;
        Ok(open
            .into_iter()
            .filter(|request| {
                next_approval_step(&request.request_type, &request.status)
                    == ApprovalStep::Supervisor
            })
            .filter(|request| request.supervisor_id.as_ref() == Some(supervisor))
            .collect())
    }

    /// Requests waiting on a committee decision, across all supervisors.
    pub async fn list_pending_for_committee(&self) -> Result<Vec<ChangeRequest>, ServiceError> {
        let open = self.repository.list_open().await?;
        Ok(open
            .into_iter()
            .filter(|request| {
                next_approval_step(&request.request_type, &request.status)
                    == ApprovalStep::Committee
            })
            .collect())
    }

    async fn apply_decision(
        &self,
        id: &RequestId,
        command: DecisionCommand,
        path: DecisionPath,
    ) -> Result<ChangeRequest, ServiceError> {
        let guard = self.lock_for(id).await;
        let _held = guard.lock().await;

        let mut request =
            self.repository.find_by_id(id).await?.ok_or_else(|| ServiceError::NotFound(id.clone()))?;
        let actor = command.decided_by.0.clone();
        let correlation_id = Uuid::new_v4().to_string();

        let outcome = match path {
            DecisionPath::Supervisor => workflow::record_supervisor_decision(&mut request, command),
            DecisionPath::Committee => workflow::record_committee_decision(&mut request, command),
            DecisionPath::Auto => workflow::record_decision(&mut request, command),
        };

        match outcome {
            Ok(outcome) => {
                self.repository.save(request.clone()).await?;
                info!(
                    event_name = "workflow.transition_applied",
                    correlation_id = %correlation_id,
                    request_id = %id.0,
                    from = ?outcome.from,
                    to = ?outcome.to,
                    "decision recorded"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(id.clone()),
                        correlation_id,
                        "workflow.transition_applied",
                        AuditCategory::Workflow,
                        actor,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
                Ok(request)
            }
            Err(error) => {
                warn!(
                    event_name = "workflow.transition_rejected",
                    correlation_id = %correlation_id,
                    request_id = %id.0,
                    error = %error,
                    "decision rejected"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(id.clone()),
                        correlation_id,
                        "workflow.transition_rejected",
                        AuditCategory::Workflow,
                        actor,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
                Err(error.into())
            }
        }
    }

    // One lock per request id; entries live as long as the service.
    async fn lock_for(&self, id: &RequestId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(id.0.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}
