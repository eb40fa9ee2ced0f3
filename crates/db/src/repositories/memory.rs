use std::collections::HashMap;

use tokio::sync::RwLock;

use petitions_core::domain::request::{ChangeRequest, RequestId};

use super::{RepositoryError, RequestRepository};

/// In-memory fake with the same contract as the SQL repository; the service
/// tests run against this.
#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, ChangeRequest>>,
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<ChangeRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn save(&self, request: ChangeRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn list_open(&self) -> Result<Vec<ChangeRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut open: Vec<ChangeRequest> =
            requests.values().filter(|request| !request.status.is_terminal()).cloned().collect();
        open.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        Ok(open)
    }
}
