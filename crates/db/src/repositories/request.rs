use chrono::{DateTime, Utc};
use sqlx::Row;

use petitions_core::domain::request::{
    ApprovalDecision, ChangeRequest, ProjectId, RequestId, RequestStatus, RequestType, StudentId,
    UserId,
};

use super::{RepositoryError, RequestRepository};
use crate::DbPool;

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub fn request_status_as_str(status: &RequestStatus) -> &'static str {
    match status {
        RequestStatus::Pending => "pending",
        RequestStatus::SupervisorApproved => "supervisor_approved",
        RequestStatus::SupervisorRejected => "supervisor_rejected",
        RequestStatus::CommitteeApproved => "committee_approved",
        RequestStatus::CommitteeRejected => "committee_rejected",
        RequestStatus::Cancelled => "cancelled",
    }
}

// Unknown strings are a decode failure, not a silent default: the status
// column backs the workflow guards.
fn parse_status(s: &str) -> Result<RequestStatus, RepositoryError> {
    match s {
        "pending" => Ok(RequestStatus::Pending),
        "supervisor_approved" => Ok(RequestStatus::SupervisorApproved),
        "supervisor_rejected" => Ok(RequestStatus::SupervisorRejected),
        "committee_approved" => Ok(RequestStatus::CommitteeApproved),
        "committee_rejected" => Ok(RequestStatus::CommitteeRejected),
        "cancelled" => Ok(RequestStatus::Cancelled),
        other => Err(RepositoryError::Decode(format!("unknown request status `{other}`"))),
    }
}

pub fn request_type_as_str(request_type: &RequestType) -> &'static str {
    match request_type {
        RequestType::ChangeSupervisor => "change_supervisor",
        RequestType::ChangeGroup => "change_group",
        RequestType::ChangeProject => "change_project",
        RequestType::Other => "other",
    }
}

fn parse_type(s: &str) -> Result<RequestType, RepositoryError> {
    match s {
        "change_supervisor" => Ok(RequestType::ChangeSupervisor),
        "change_group" => Ok(RequestType::ChangeGroup),
        "change_project" => Ok(RequestType::ChangeProject),
        "other" => Ok(RequestType::Other),
        other => Err(RepositoryError::Decode(format!("unknown request type `{other}`"))),
    }
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("bad timestamp in `{column}`: {e}")))
}

fn decode_decision(
    stage: &str,
    approved: Option<bool>,
    comments: Option<String>,
    decided_by: Option<String>,
    decided_at: Option<String>,
) -> Result<Option<ApprovalDecision>, RepositoryError> {
    match (approved, decided_by, decided_at) {
        (None, None, None) => Ok(None),
        (Some(approved), Some(decided_by), Some(decided_at)) => Ok(Some(ApprovalDecision {
            approved,
            comments,
            decided_by: UserId(decided_by),
            decided_at: parse_timestamp(&decided_at, &format!("{stage}_decided_at"))?,
        })),
        _ => Err(RepositoryError::Decode(format!("partial `{stage}` decision columns"))),
    }
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<ChangeRequest, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_type: String =
        row.try_get("request_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let student_id: String =
        row.try_get("student_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let supervisor_id: Option<String> =
        row.try_get("supervisor_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let project_id: Option<String> =
        row.try_get("project_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let reason: String =
        row.try_get("reason").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let supervisor_approved: Option<bool> =
        row.try_get("supervisor_approved").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let supervisor_comments: Option<String> =
        row.try_get("supervisor_comments").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let supervisor_decided_by: Option<String> = row
        .try_get("supervisor_decided_by")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let supervisor_decided_at: Option<String> = row
        .try_get("supervisor_decided_at")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let committee_approved: Option<bool> =
        row.try_get("committee_approved").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let committee_comments: Option<String> =
        row.try_get("committee_comments").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let committee_decided_by: Option<String> = row
        .try_get("committee_decided_by")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let committee_decided_at: Option<String> = row
        .try_get("committee_decided_at")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ChangeRequest {
        id: RequestId(id),
        request_type: parse_type(&request_type)?,
        student_id: StudentId(student_id),
        supervisor_id: supervisor_id.map(UserId),
        project_id: project_id.map(ProjectId),
        reason,
        status: parse_status(&status)?,
        supervisor_approval: decode_decision(
            "supervisor",
            supervisor_approved,
            supervisor_comments,
            supervisor_decided_by,
            supervisor_decided_at,
        )?,
        committee_approval: decode_decision(
            "committee",
            committee_approved,
            committee_comments,
            committee_decided_by,
            committee_decided_at,
        )?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

const SELECT_COLUMNS: &str = "id, request_type, student_id, supervisor_id, project_id, reason,
        status, supervisor_approved, supervisor_comments, supervisor_decided_by,
        supervisor_decided_at, committee_approved, committee_comments, committee_decided_by,
        committee_decided_at, created_at, updated_at";

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ChangeRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM change_request WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_request(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, request: ChangeRequest) -> Result<(), RepositoryError> {
        let (supervisor_approved, supervisor_comments, supervisor_decided_by, supervisor_decided_at) =
            decision_columns(&request.supervisor_approval);
        let (committee_approved, committee_comments, committee_decided_by, committee_decided_at) =
            decision_columns(&request.committee_approval);

        // Everything except the workflow-mutable columns is immutable after
        // creation, so the upsert only rewrites those.
        sqlx::query(
            "INSERT INTO change_request (id, request_type, student_id, supervisor_id, project_id,
                                         reason, status, supervisor_approved, supervisor_comments,
                                         supervisor_decided_by, supervisor_decided_at,
                                         committee_approved, committee_comments,
                                         committee_decided_by, committee_decided_at,
                                         created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 supervisor_approved = excluded.supervisor_approved,
                 supervisor_comments = excluded.supervisor_comments,
                 supervisor_decided_by = excluded.supervisor_decided_by,
                 supervisor_decided_at = excluded.supervisor_decided_at,
                 committee_approved = excluded.committee_approved,
                 committee_comments = excluded.committee_comments,
                 committee_decided_by = excluded.committee_decided_by,
                 committee_decided_at = excluded.committee_decided_at,
                 updated_at = excluded.updated_at",
        )
        .bind(&request.id.0)
        .bind(request_type_as_str(&request.request_type))
        .bind(&request.student_id.0)
        .bind(request.supervisor_id.as_ref().map(|id| id.0.clone()))
        .bind(request.project_id.as_ref().map(|id| id.0.clone()))
        .bind(&request.reason)
        .bind(request_status_as_str(&request.status))
        .bind(supervisor_approved)
        .bind(supervisor_comments)
        .bind(supervisor_decided_by)
        .bind(supervisor_decided_at)
        .bind(committee_approved)
        .bind(committee_comments)
        .bind(committee_decided_by)
        .bind(committee_decided_at)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_open(&self) -> Result<Vec<ChangeRequest>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM change_request
             WHERE status IN ('pending', 'supervisor_approved')
             ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect::<Result<Vec<_>, _>>()
    }
}

type DecisionColumns = (Option<bool>, Option<String>, Option<String>, Option<String>);

fn decision_columns(decision: &Option<ApprovalDecision>) -> DecisionColumns {
    match decision {
        Some(decision) => (
            Some(decision.approved),
            decision.comments.clone(),
            Some(decision.decided_by.0.clone()),
            Some(decision.decided_at.to_rfc3339()),
        ),
        None => (None, None, None, None),
    }
}
