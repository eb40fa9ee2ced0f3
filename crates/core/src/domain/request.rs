use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::WorkflowError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

/// Identifier of an acting approver (supervisor or committee member).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    ChangeSupervisor,
    ChangeGroup,
    ChangeProject,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    SupervisorApproved,
    SupervisorRejected,
    CommitteeApproved,
    CommitteeRejected,
    Cancelled,
}

impl RequestStatus {
    /// `SupervisorApproved` is the only intermediate state; everything else
    /// besides `Pending` ends the workflow.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::SupervisorApproved)
    }
}

/// One recorded approval-stage decision. Set at most once per stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub comments: Option<String>,
    pub decided_by: UserId,
    pub decided_at: DateTime<Utc>,
}

/// Input for submitting a new change request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    pub request_type: RequestType,
    pub student_id: StudentId,
    pub supervisor_id: Option<UserId>,
    pub project_id: Option<ProjectId>,
    pub reason: String,
}

/// A student-submitted change petition tracked through approval.
///
/// `status` is only ever mutated by the operations in [`crate::workflow`];
/// everything except `status`, the two decision stamps, and `updated_at` is
/// immutable after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: RequestId,
    pub request_type: RequestType,
    pub student_id: StudentId,
    pub supervisor_id: Option<UserId>,
    pub project_id: Option<ProjectId>,
    pub reason: String,
    pub status: RequestStatus,
    pub supervisor_approval: Option<ApprovalDecision>,
    pub committee_approval: Option<ApprovalDecision>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChangeRequest {
    pub fn create(input: NewRequest) -> Result<Self, WorkflowError> {
        if input.reason.trim().is_empty() {
            return Err(WorkflowError::Validation("reason must not be empty".to_owned()));
        }

        let now = Utc::now();
        Ok(Self {
            id: RequestId::generate(),
            request_type: input.request_type,
            student_id: input.student_id,
            supervisor_id: input.supervisor_id,
            project_id: input.project_id,
            reason: input.reason,
            status: RequestStatus::Pending,
            supervisor_approval: None,
            committee_approval: None,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeRequest, NewRequest, RequestStatus, RequestType, StudentId, UserId};
    use crate::errors::WorkflowError;

    fn input(reason: &str) -> NewRequest {
        NewRequest {
            request_type: RequestType::ChangeGroup,
            student_id: StudentId("s-100".to_string()),
            supervisor_id: Some(UserId("u-super".to_string())),
            project_id: None,
            reason: reason.to_string(),
        }
    }

    #[test]
    fn create_starts_pending_with_no_decisions() {
        let request = ChangeRequest::create(input("group 4 dissolved")).expect("create");

        assert_eq!(request.status, RequestStatus::Pending);
        assert!(request.supervisor_approval.is_none());
        assert!(request.committee_approval.is_none());
        assert_eq!(request.created_at, request.updated_at);
    }

    #[test]
    fn create_rejects_blank_reason() {
        let error = ChangeRequest::create(input("   ")).expect_err("blank reason must fail");
        assert!(matches!(error, WorkflowError::Validation(_)));
    }

    #[test]
    fn generated_ids_are_unique() {
        let first = ChangeRequest::create(input("first")).expect("create first");
        let second = ChangeRequest::create(input("second")).expect("create second");
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn terminal_states_exclude_the_intermediate_one() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::SupervisorApproved.is_terminal());
        assert!(RequestStatus::SupervisorRejected.is_terminal());
        assert!(RequestStatus::CommitteeApproved.is_terminal());
        assert!(RequestStatus::CommitteeRejected.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
    }

    /// Front ends consume these values; the wire names are part of the contract.
    #[test]
    fn status_and_type_serialize_as_snake_case() {
        assert_eq!(
            serde_json::to_value(RequestStatus::SupervisorApproved).expect("serialize status"),
            serde_json::json!("supervisor_approved")
        );
        assert_eq!(
            serde_json::to_value(RequestType::ChangeSupervisor).expect("serialize type"),
            serde_json::json!("change_supervisor")
        );
    }
}
