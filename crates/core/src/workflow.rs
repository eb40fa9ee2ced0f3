//! The request state machine: legal transitions and decision stamping.
//!
//! Every mutation validates against [`crate::routing`] before touching the
//! request; a failed guard returns a typed error and leaves the request
//! unmodified.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::request::{
    ApprovalDecision, ChangeRequest, RequestStatus, RequestType, StudentId, UserId,
};
use crate::errors::WorkflowError;
use crate::routing::{next_approval_step, requires_supervisor_approval, ApprovalStep};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEvent {
    SupervisorApprove,
    SupervisorReject,
    CommitteeApprove,
    CommitteeReject,
    Cancel,
}

/// Decision payload supplied by the acting approver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionCommand {
    pub decided_by: UserId,
    pub approved: bool,
    pub comments: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub event: WorkflowEvent,
}

/// The transition table. Undeclared `(status, event)` combinations are
/// rejected with the observed status and attempted event.
pub fn transition(
    request_type: &RequestType,
    current: &RequestStatus,
    event: &WorkflowEvent,
) -> Result<RequestStatus, WorkflowError> {
    use RequestStatus::{
        Cancelled, CommitteeApproved, CommitteeRejected, Pending, SupervisorApproved,
        SupervisorRejected,
    };
    use WorkflowEvent::{
        Cancel, CommitteeApprove, CommitteeReject, SupervisorApprove, SupervisorReject,
    };

    let next = match (current, event) {
        (Pending, SupervisorApprove) if requires_supervisor_approval(request_type) => {
            SupervisorApproved
        }
        (Pending, SupervisorReject) if requires_supervisor_approval(request_type) => {
            SupervisorRejected
        }
        (Pending, CommitteeApprove) if !requires_supervisor_approval(request_type) => {
            CommitteeApproved
        }
        (Pending, CommitteeReject) if !requires_supervisor_approval(request_type) => {
            CommitteeRejected
        }
        (SupervisorApproved, CommitteeApprove) => CommitteeApproved,
        (SupervisorApproved, CommitteeReject) => CommitteeRejected,
        (Pending, Cancel) => Cancelled,
        _ => {
            return Err(WorkflowError::InvalidTransition {
                status: current.clone(),
                event: event.clone(),
            });
        }
    };

    Ok(next)
}

/// Record the supervisor's decision on a pending, supervisor-gated request.
pub fn record_supervisor_decision(
    request: &mut ChangeRequest,
    command: DecisionCommand,
) -> Result<TransitionOutcome, WorkflowError> {
    let event = if command.approved {
        WorkflowEvent::SupervisorApprove
    } else {
        WorkflowEvent::SupervisorReject
    };
    let to = transition(&request.request_type, &request.status, &event)?;
    let from = request.status.clone();

    request.supervisor_approval = Some(ApprovalDecision {
        approved: command.approved,
        comments: command.comments,
        decided_by: command.decided_by,
        decided_at: Utc::now(),
    });
    request.status = to.clone();
    request.updated_at = Utc::now();

    Ok(TransitionOutcome { from, to, event })
}

/// Record the committee's decision. Legal on `Pending` only for types that
/// bypass the supervisor stage, otherwise only after supervisor approval.
pub fn record_committee_decision(
    request: &mut ChangeRequest,
    command: DecisionCommand,
) -> Result<TransitionOutcome, WorkflowError> {
    let event = if command.approved {
        WorkflowEvent::CommitteeApprove
    } else {
        WorkflowEvent::CommitteeReject
    };
    let to = transition(&request.request_type, &request.status, &event)?;
    let from = request.status.clone();

    request.committee_approval = Some(ApprovalDecision {
        approved: command.approved,
        comments: command.comments,
        decided_by: command.decided_by,
        decided_at: Utc::now(),
    });
    request.status = to.clone();
    request.updated_at = Utc::now();

    Ok(TransitionOutcome { from, to, event })
}

/// Cancel a still-pending request. Only the owning student may cancel.
pub fn cancel(
    request: &mut ChangeRequest,
    student: &StudentId,
) -> Result<TransitionOutcome, WorkflowError> {
    if &request.student_id != student {
        return Err(WorkflowError::Forbidden {
            request: request.id.clone(),
            actor: student.clone(),
        });
    }

    let to = transition(&request.request_type, &request.status, &WorkflowEvent::Cancel)?;
    let from = request.status.clone();
    request.status = to.clone();
    request.updated_at = Utc::now();

    Ok(TransitionOutcome { from, to, event: WorkflowEvent::Cancel })
}

/// Legacy entry point: a generic approve/reject intent without the caller
/// naming the stage. Dispatches to the stage the routing policy expects next
/// and never duplicates the transition guards.
pub fn record_decision(
    request: &mut ChangeRequest,
    command: DecisionCommand,
) -> Result<TransitionOutcome, WorkflowError> {
    match next_approval_step(&request.request_type, &request.status) {
        ApprovalStep::Supervisor => record_supervisor_decision(request, command),
        ApprovalStep::Committee => record_committee_decision(request, command),
        // No stage left to dispatch to; the committee stage is the last one
        // any request can be waiting on.
        ApprovalStep::Complete | ApprovalStep::None => Err(WorkflowError::InvalidTransition {
            status: request.status.clone(),
            event: if command.approved {
                WorkflowEvent::CommitteeApprove
            } else {
                WorkflowEvent::CommitteeReject
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        cancel, record_committee_decision, record_decision, record_supervisor_decision, transition,
        DecisionCommand, WorkflowEvent,
    };
    use crate::domain::request::{
        ChangeRequest, NewRequest, RequestStatus, RequestType, StudentId, UserId,
    };
    use crate::errors::WorkflowError;

    fn request(request_type: RequestType) -> ChangeRequest {
        ChangeRequest::create(NewRequest {
            request_type,
            student_id: StudentId("s-100".to_string()),
            supervisor_id: Some(UserId("u-super".to_string())),
            project_id: None,
            reason: "topic mismatch".to_string(),
        })
        .expect("create request")
    }

    fn approve(by: &str) -> DecisionCommand {
        DecisionCommand {
            decided_by: UserId(by.to_string()),
            approved: true,
            comments: Some("ok".to_string()),
        }
    }

    fn reject(by: &str) -> DecisionCommand {
        DecisionCommand { decided_by: UserId(by.to_string()), approved: false, comments: None }
    }

    #[test]
    fn gated_request_passes_through_both_stages() {
        let mut request = request(RequestType::ChangeGroup);

        let first = record_supervisor_decision(&mut request, approve("u-super"))
            .expect("pending -> supervisor_approved");
        assert_eq!(first.to, RequestStatus::SupervisorApproved);
        assert_eq!(request.supervisor_approval.as_ref().map(|d| d.approved), Some(true));

        let second = record_committee_decision(&mut request, approve("u-chair"))
            .expect("supervisor_approved -> committee_approved");
        assert_eq!(second.from, RequestStatus::SupervisorApproved);
        assert_eq!(request.status, RequestStatus::CommitteeApproved);
        assert_eq!(request.committee_approval.as_ref().map(|d| d.approved), Some(true));
    }

    #[test]
    fn ungated_request_skips_the_supervisor_stage() {
        let mut request = request(RequestType::Other);

        record_committee_decision(&mut request, reject("u-chair"))
            .expect("pending -> committee_rejected");

        assert_eq!(request.status, RequestStatus::CommitteeRejected);
        assert!(request.supervisor_approval.is_none());
        assert_eq!(request.committee_approval.as_ref().map(|d| d.approved), Some(false));
    }

    #[test]
    fn committee_cannot_act_on_pending_gated_request() {
        let mut request = request(RequestType::ChangeSupervisor);
        let before = request.clone();

        let error = record_committee_decision(&mut request, approve("u-chair"))
            .expect_err("supervisor stage must come first");

        assert!(matches!(
            error,
            WorkflowError::InvalidTransition {
                status: RequestStatus::Pending,
                event: WorkflowEvent::CommitteeApprove
            }
        ));
        // Failed guards leave the request untouched.
        assert_eq!(request, before);
    }

    #[test]
    fn supervisor_cannot_act_on_ungated_request() {
        let mut request = request(RequestType::ChangeProject);
        let error = record_supervisor_decision(&mut request, approve("u-super"))
            .expect_err("type bypasses the supervisor stage");

        assert!(matches!(error, WorkflowError::InvalidTransition { .. }));
        assert!(request.supervisor_approval.is_none());
    }

    #[test]
    fn committee_never_reviews_after_supervisor_rejection() {
        let mut request = request(RequestType::ChangeGroup);
        record_supervisor_decision(&mut request, reject("u-super"))
            .expect("pending -> supervisor_rejected");

        let error = record_committee_decision(&mut request, approve("u-chair"))
            .expect_err("workflow already ended");

        assert!(matches!(
            error,
            WorkflowError::InvalidTransition { status: RequestStatus::SupervisorRejected, .. }
        ));
        assert!(request.committee_approval.is_none());
    }

    #[test]
    fn decisions_fire_at_most_once_per_stage() {
        let mut request = request(RequestType::Other);
        record_committee_decision(&mut request, approve("u-chair")).expect("first decision");

        let error = record_committee_decision(&mut request, reject("u-chair"))
            .expect_err("no re-review");

        assert!(matches!(error, WorkflowError::InvalidTransition { .. }));
        // The original stamp survives.
        assert_eq!(request.committee_approval.as_ref().map(|d| d.approved), Some(true));
        assert_eq!(request.status, RequestStatus::CommitteeApproved);
    }

    #[test]
    fn cancel_is_owner_only_and_pending_only() {
        let mut request = request(RequestType::ChangeSupervisor);

        let error = cancel(&mut request, &StudentId("s-999".to_string()))
            .expect_err("only the owner may cancel");
        assert!(matches!(error, WorkflowError::Forbidden { .. }));
        assert_eq!(request.status, RequestStatus::Pending);

        cancel(&mut request, &StudentId("s-100".to_string())).expect("owner cancels pending");
        assert_eq!(request.status, RequestStatus::Cancelled);

        let error = cancel(&mut request, &StudentId("s-100".to_string()))
            .expect_err("cancelled is terminal");
        assert!(matches!(
            error,
            WorkflowError::InvalidTransition {
                status: RequestStatus::Cancelled,
                event: WorkflowEvent::Cancel
            }
        ));
    }

    #[test]
    fn cancel_is_illegal_after_a_decision() {
        let mut request = request(RequestType::ChangeGroup);
        record_supervisor_decision(&mut request, approve("u-super")).expect("supervisor approves");

        let error = cancel(&mut request, &StudentId("s-100".to_string()))
            .expect_err("past pending, cancellation is closed");
        assert!(matches!(
            error,
            WorkflowError::InvalidTransition { status: RequestStatus::SupervisorApproved, .. }
        ));
    }

    #[test]
    fn legacy_dispatch_follows_the_routing_policy() {
        let mut request = request(RequestType::ChangeGroup);

        let first = record_decision(&mut request, approve("u-super")).expect("supervisor stage");
        assert_eq!(first.event, WorkflowEvent::SupervisorApprove);
        assert_eq!(request.status, RequestStatus::SupervisorApproved);

        let second = record_decision(&mut request, reject("u-chair")).expect("committee stage");
        assert_eq!(second.event, WorkflowEvent::CommitteeReject);
        assert_eq!(request.status, RequestStatus::CommitteeRejected);

        let error = record_decision(&mut request, approve("u-chair"))
            .expect_err("workflow complete, nothing to dispatch");
        assert!(matches!(error, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn transition_table_rejects_every_undeclared_combination() {
        let gated = RequestType::ChangeSupervisor;
        let terminal = [
            RequestStatus::SupervisorRejected,
            RequestStatus::CommitteeApproved,
            RequestStatus::CommitteeRejected,
            RequestStatus::Cancelled,
        ];
        let events = [
            WorkflowEvent::SupervisorApprove,
            WorkflowEvent::SupervisorReject,
            WorkflowEvent::CommitteeApprove,
            WorkflowEvent::CommitteeReject,
            WorkflowEvent::Cancel,
        ];

        for status in &terminal {
            for event in &events {
                let result = transition(&gated, status, event);
                assert!(result.is_err(), "{status:?} must reject {event:?}");
            }
        }
    }

    #[test]
    fn updated_at_is_refreshed_on_every_applied_transition() {
        let mut request = request(RequestType::Other);
        let created = request.updated_at;

        record_committee_decision(&mut request, approve("u-chair")).expect("decision");
        assert!(request.updated_at >= created);
    }
}
