pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::Result;
use crate::models::{Ballot, CandidateDocument, NewBallot};

pub use memory::MemoryStore;

/// One delivery of the `candidates` collection: the full ordered document
/// list, or the message of a subscription error.
pub type CandidateSnapshot = std::result::Result<Arc<Vec<CandidateDocument>>, String>;

/// A standing subscription to the `candidates` collection. Dropping it
/// releases the subscription.
pub struct CandidateSubscription {
    receiver: watch::Receiver<CandidateSnapshot>,
}

impl CandidateSubscription {
    pub(crate) fn new(mut receiver: watch::Receiver<CandidateSnapshot>) -> Self {
        // The current snapshot is delivered first, like a listener's initial callback.
        receiver.mark_changed();
        Self { receiver }
    }

    /// Wait for the next snapshot. Returns `None` once the store is gone.
    pub async fn next(&mut self) -> Option<CandidateSnapshot> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}

/// Publishes candidate snapshots to every subscriber. Callers publish while
/// still holding whatever serializes their writes, so the last snapshot sent
/// is never older than one sent before it.
pub(crate) struct SnapshotPublisher {
    sender: watch::Sender<CandidateSnapshot>,
}

impl SnapshotPublisher {
    pub(crate) fn new() -> Self {
        let (sender, _) = watch::channel(Ok(Arc::new(Vec::new())));
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> CandidateSubscription {
        CandidateSubscription::new(self.sender.subscribe())
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub(crate) fn publish(&self, documents: Vec<CandidateDocument>) {
        let _previous = self.sender.send_replace(Ok(Arc::new(documents)));
    }

    pub(crate) fn publish_error(&self, message: impl Into<String>) {
        let _previous = self.sender.send_replace(Err(message.into()));
    }
}

/// The document database holding the `candidates` and `votes` collections.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// All candidate documents ordered by id.
    async fn candidates(&self) -> Result<Vec<CandidateDocument>>;

    fn subscribe_candidates(&self) -> CandidateSubscription;

    /// Insert or replace a candidate document.
    async fn put_candidate(&self, document: &CandidateDocument) -> Result<()>;

    /// Atomically add `by` to a candidate's `total-votes`. Counters never go down.
    async fn increment_votes(&self, candidate_id: &str, by: u64) -> Result<()>;

    /// Equality query on `user_ID`.
    async fn ballots_for_voter(&self, voter_id: &str) -> Result<Vec<Ballot>>;

    async fn ballots(&self) -> Result<Vec<Ballot>>;

    /// Append a ballot without any duplicate check.
    async fn insert_ballot(&self, ballot: NewBallot) -> Result<Ballot>;

    /// Check-and-insert the ballot and increment the chosen candidate's
    /// counter as one all-or-nothing unit.
    async fn cast_ballot(&self, ballot: NewBallot) -> Result<Ballot>;
}
