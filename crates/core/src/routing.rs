//! Routing policy: which approval stages a request type passes through.
//!
//! This is the single source of truth consulted by every mutation in
//! [`crate::workflow`] and by the work-queue listings, so the "is supervisor
//! approval required" rule has exactly one implementation.

use serde::{Deserialize, Serialize};

use crate::domain::request::{RequestStatus, RequestType};

/// The next actor expected to move a request forward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStep {
    Supervisor,
    Committee,
    /// The workflow has ended, positively or negatively.
    Complete,
    /// No further action is defined for this `(type, status)` pair; the pair
    /// should never arise and signals an invariant violation to the caller.
    None,
}

/// Supervisor pre-approval is required exactly for supervisor and group
/// changes; project changes and free-form requests go straight to committee.
pub fn requires_supervisor_approval(request_type: &RequestType) -> bool {
    match request_type {
        RequestType::ChangeSupervisor | RequestType::ChangeGroup => true,
        RequestType::ChangeProject | RequestType::Other => false,
    }
}

/// Derive the next expected step for a `(type, status)` pair.
///
/// Never panics: an inconsistent pair (e.g. `SupervisorApproved` for a type
/// that bypasses the supervisor stage) yields [`ApprovalStep::None`] rather
/// than a guess.
pub fn next_approval_step(request_type: &RequestType, status: &RequestStatus) -> ApprovalStep {
    match status {
        RequestStatus::Pending => {
            if requires_supervisor_approval(request_type) {
                ApprovalStep::Supervisor
            } else {
                ApprovalStep::Committee
            }
        }
        RequestStatus::SupervisorApproved if requires_supervisor_approval(request_type) => {
            ApprovalStep::Committee
        }
        RequestStatus::SupervisorApproved => ApprovalStep::None,
        RequestStatus::SupervisorRejected
        | RequestStatus::CommitteeApproved
        | RequestStatus::CommitteeRejected
        | RequestStatus::Cancelled => ApprovalStep::Complete,
    }
}

#[cfg(test)]
mod tests {
    use super::{next_approval_step, requires_supervisor_approval, ApprovalStep};
    use crate::domain::request::{RequestStatus, RequestType};

    #[test]
    fn supervisor_approval_is_required_exactly_for_supervisor_and_group_changes() {
        assert!(requires_supervisor_approval(&RequestType::ChangeSupervisor));
        assert!(requires_supervisor_approval(&RequestType::ChangeGroup));
        assert!(!requires_supervisor_approval(&RequestType::ChangeProject));
        assert!(!requires_supervisor_approval(&RequestType::Other));
    }

    #[test]
    fn pending_routes_to_supervisor_when_gated_and_committee_otherwise() {
        assert_eq!(
            next_approval_step(&RequestType::ChangeGroup, &RequestStatus::Pending),
            ApprovalStep::Supervisor
        );
        assert_eq!(
            next_approval_step(&RequestType::Other, &RequestStatus::Pending),
            ApprovalStep::Committee
        );
    }

    #[test]
    fn supervisor_approved_routes_to_committee_for_gated_types() {
        assert_eq!(
            next_approval_step(&RequestType::ChangeSupervisor, &RequestStatus::SupervisorApproved),
            ApprovalStep::Committee
        );
    }

    #[test]
    fn terminal_statuses_are_complete() {
        for status in [
            RequestStatus::SupervisorRejected,
            RequestStatus::CommitteeApproved,
            RequestStatus::CommitteeRejected,
            RequestStatus::Cancelled,
        ] {
            assert_eq!(next_approval_step(&RequestType::ChangeGroup, &status), ApprovalStep::Complete);
            assert_eq!(next_approval_step(&RequestType::Other, &status), ApprovalStep::Complete);
        }
    }

    #[test]
    fn inconsistent_pair_yields_the_none_sentinel() {
        // A type that bypasses the supervisor stage can never legally sit in
        // SupervisorApproved.
        assert_eq!(
            next_approval_step(&RequestType::Other, &RequestStatus::SupervisorApproved),
            ApprovalStep::None
        );
        assert_eq!(
            next_approval_step(&RequestType::ChangeProject, &RequestStatus::SupervisorApproved),
            ApprovalStep::None
        );
    }
}
