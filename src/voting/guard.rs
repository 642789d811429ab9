use std::sync::Arc;

use log::info;

use crate::error::Result;
use crate::store::DocumentStore;

/// Answers whether a voter already holds a ballot.
pub struct VoteGuard<S: DocumentStore + ?Sized> {
    store: Arc<S>,
}

impl<S: DocumentStore + ?Sized> VoteGuard<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn has_voted(&self, voter_id: &str) -> Result<bool> {
        let ballots = self.store.ballots_for_voter(voter_id).await?;
        info!("Voter {} has {} ballot(s) on record", voter_id, ballots.len());
        Ok(!ballots.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewBallot;
    use crate::store::memory::StoreOp;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn reports_existing_ballots() {
        let store = Arc::new(MemoryStore::new());
        store.insert_ballot(NewBallot::new("u1", "c1")).await.unwrap();

        let guard = VoteGuard::new(Arc::clone(&store));
        assert!(guard.has_voted("u1").await.unwrap());
        assert!(!guard.has_voted("u2").await.unwrap());
    }

    #[tokio::test]
    async fn query_failures_are_returned() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(StoreOp::QueryBallots, "offline");
        let guard = VoteGuard::new(store);
        assert!(guard.has_voted("u1").await.is_err());
    }
}
