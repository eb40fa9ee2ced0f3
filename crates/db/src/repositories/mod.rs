use async_trait::async_trait;
use thiserror::Error;

use petitions_core::domain::request::{ChangeRequest, RequestId};

pub mod memory;
pub mod request;

pub use memory::InMemoryRequestRepository;
pub use request::SqlRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Persistence seam for the approval workflow. The service layer never
/// touches storage directly, so it can be tested against the in-memory fake.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ChangeRequest>, RepositoryError>;

    async fn save(&self, request: ChangeRequest) -> Result<(), RepositoryError>;

    /// Requests still awaiting a decision (`pending` or `supervisor_approved`),
    /// oldest first.
    async fn list_open(&self) -> Result<Vec<ChangeRequest>, RepositoryError>;
}
