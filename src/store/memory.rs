use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use log::debug;

use super::{CandidateSubscription, DocumentStore, SnapshotPublisher};
use crate::auth::AccountStore;
use crate::error::{Result, VoteError};
use crate::models::{Account, Ballot, CandidateDocument, NewBallot};

/// Operations that can be made to fail once with [`MemoryStore::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    QueryBallots,
    InsertBallot,
    IncrementVotes,
    CastBallot,
}

#[derive(Default)]
struct Collections {
    candidates: BTreeMap<String, CandidateDocument>,
    ballots: Vec<Ballot>,
    // Keyed by lowercased email.
    accounts: HashMap<String, Account>,
    failures: HashMap<StoreOp, String>,
}

impl Collections {
    fn take_failure(&mut self, op: StoreOp) -> Result<()> {
        match self.failures.remove(&op) {
            Some(message) => Err(VoteError::Store(message)),
            None => Ok(()),
        }
    }

    fn increment(&mut self, candidate_id: &str, by: u64) -> Result<()> {
        let document = self
            .candidates
            .get_mut(candidate_id)
            .ok_or_else(|| VoteError::UnknownCandidate(candidate_id.to_string()))?;
        let total = i64::try_from(by)
            .ok()
            .and_then(|by| document.total_votes.unwrap_or(0).checked_add(by))
            .ok_or_else(|| {
                VoteError::Store(format!("Vote counter overflow for {}", candidate_id))
            })?;
        document.total_votes = Some(total);
        Ok(())
    }

    fn snapshot(&self) -> Vec<CandidateDocument> {
        self.candidates.values().cloned().collect()
    }
}

/// In-process document store. Every write is a single critical section, which
/// makes the counter increment atomic.
pub struct MemoryStore {
    collections: Mutex<Collections>,
    snapshots: SnapshotPublisher,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(Collections::default()),
            snapshots: SnapshotPublisher::new(),
        }
    }

    pub fn with_candidates(documents: impl IntoIterator<Item = CandidateDocument>) -> Self {
        let store = Self::new();
        {
            let mut collections = store.lock();
            for document in documents {
                collections.candidates.insert(document.id.clone(), document);
            }
            store.snapshots.publish(collections.snapshot());
        }
        store
    }

    /// Make the next call of `op` fail with `message`.
    pub fn fail_next(&self, op: StoreOp, message: impl Into<String>) {
        self.lock().failures.insert(op, message.into());
    }

    /// Deliver an error to every candidate subscriber.
    pub fn fail_subscription(&self, message: impl Into<String>) {
        self.snapshots.publish_error(message);
    }

    /// Number of live candidate subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.snapshots.subscriber_count()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn candidates(&self) -> Result<Vec<CandidateDocument>> {
        Ok(self.lock().snapshot())
    }

    fn subscribe_candidates(&self) -> CandidateSubscription {
        self.snapshots.subscribe()
    }

    async fn put_candidate(&self, document: &CandidateDocument) -> Result<()> {
        let mut collections = self.lock();
        collections
            .candidates
            .insert(document.id.clone(), document.clone());
        // Publish under the lock so snapshots go out in write order.
        self.snapshots.publish(collections.snapshot());
        Ok(())
    }

    async fn increment_votes(&self, candidate_id: &str, by: u64) -> Result<()> {
        let mut collections = self.lock();
        collections.take_failure(StoreOp::IncrementVotes)?;
        collections.increment(candidate_id, by)?;
        self.snapshots.publish(collections.snapshot());
        Ok(())
    }

    async fn ballots_for_voter(&self, voter_id: &str) -> Result<Vec<Ballot>> {
        let mut collections = self.lock();
        collections.take_failure(StoreOp::QueryBallots)?;
        Ok(collections
            .ballots
            .iter()
            .filter(|ballot| ballot.voter_id == voter_id)
            .cloned()
            .collect())
    }

    async fn ballots(&self) -> Result<Vec<Ballot>> {
        Ok(self.lock().ballots.clone())
    }

    async fn insert_ballot(&self, ballot: NewBallot) -> Result<Ballot> {
        let mut collections = self.lock();
        collections.take_failure(StoreOp::InsertBallot)?;
        let ballot = ballot.into_ballot();
        debug!("Inserted ballot {} for voter {}", ballot.id, ballot.voter_id);
        collections.ballots.push(ballot.clone());
        Ok(ballot)
    }

    async fn cast_ballot(&self, ballot: NewBallot) -> Result<Ballot> {
        let mut collections = self.lock();
        collections.take_failure(StoreOp::CastBallot)?;

        if collections
            .ballots
            .iter()
            .any(|existing| existing.voter_id == ballot.voter_id)
        {
            return Err(VoteError::AlreadyVoted {
                voter_id: ballot.voter_id,
            });
        }
        // Increment first so an unknown candidate leaves nothing behind.
        collections.increment(&ballot.candidate_id, 1)?;

        let ballot = ballot.into_ballot();
        collections.ballots.push(ballot.clone());
        self.snapshots.publish(collections.snapshot());
        Ok(ballot)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_account(&self, email: &str) -> Result<Option<Account>> {
        Ok(self.lock().accounts.get(email).cloned())
    }

    async fn create_account(&self, account: &Account) -> Result<()> {
        let mut collections = self.lock();
        if collections.accounts.contains_key(&account.email) {
            return Err(VoteError::EmailInUse(account.email.clone()));
        }
        collections
            .accounts
            .insert(account.email.clone(), account.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> MemoryStore {
        MemoryStore::with_candidates([
            CandidateDocument::new("c2", "Bob", 41),
            CandidateDocument::new("c1", "Alice", 30).with_votes(5),
        ])
    }

    #[tokio::test]
    async fn candidates_are_ordered_by_id() {
        let ids: Vec<String> = store()
            .candidates()
            .await
            .unwrap()
            .into_iter()
            .map(|doc| doc.id)
            .collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn subscription_sees_initial_and_updated_snapshots() {
        let store = store();
        let mut subscription = store.subscribe_candidates();

        let initial = subscription.next().await.unwrap().unwrap();
        assert_eq!(initial.len(), 2);

        store.increment_votes("c1", 1).await.unwrap();
        let updated = subscription.next().await.unwrap().unwrap();
        assert_eq!(updated[0].total_votes, Some(6));
    }

    #[tokio::test]
    async fn subscription_reports_errors() {
        let store = store();
        let mut subscription = store.subscribe_candidates();
        store.fail_subscription("permission denied");
        assert_eq!(
            subscription.next().await.unwrap().unwrap_err(),
            "permission denied"
        );
    }

    #[tokio::test]
    async fn cast_rejects_second_ballot_for_voter() {
        let store = store();
        store.cast_ballot(NewBallot::new("u1", "c1")).await.unwrap();

        let err = store
            .cast_ballot(NewBallot::new("u1", "c2"))
            .await
            .unwrap_err();
        assert!(err.is_already_voted());

        let docs = store.candidates().await.unwrap();
        assert_eq!(docs[0].total_votes, Some(6));
        assert_eq!(docs[1].total_votes, Some(0));
        assert_eq!(store.ballots().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cast_for_unknown_candidate_writes_nothing() {
        let store = store();
        let err = store
            .cast_ballot(NewBallot::new("u1", "nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, VoteError::UnknownCandidate(id) if id == "nobody"));
        assert!(store.ballots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failures_fire_once() {
        let store = store();
        store.fail_next(StoreOp::InsertBallot, "unavailable");
        assert!(store.insert_ballot(NewBallot::new("u1", "c1")).await.is_err());
        assert!(store.insert_ballot(NewBallot::new("u1", "c1")).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_increments_all_land() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.increment_votes("c2", 1).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.candidates().await.unwrap()[1].total_votes, Some(20));
    }

    #[tokio::test]
    async fn increment_overflow_is_a_store_error() {
        let store = MemoryStore::with_candidates([
            CandidateDocument::new("c1", "Alice", 30).with_votes(i64::MAX)
        ]);
        let err = store.increment_votes("c1", 1).await.unwrap_err();
        assert!(matches!(err, VoteError::Store(_)));

        let err = store.increment_votes("c1", u64::MAX).await.unwrap_err();
        assert!(matches!(err, VoteError::Store(_)));
        assert_eq!(store.candidates().await.unwrap()[0].total_votes, Some(i64::MAX));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_casts_publish_increasing_totals() {
        let store = Arc::new(store());
        let mut subscription = store.subscribe_candidates();
        let expected: i64 = 5 + 40;

        let watcher = tokio::spawn(async move {
            let mut last = 0;
            loop {
                let snapshot = subscription.next().await.unwrap().unwrap();
                let total: i64 = snapshot.iter().filter_map(|doc| doc.total_votes).sum();
                assert!(total >= last, "total went from {} to {}", last, total);
                last = total;
                if total == expected {
                    return snapshot;
                }
            }
        });

        let casts: Vec<_> = (0..40)
            .map(|i| {
                let store = Arc::clone(&store);
                let candidate = if i % 2 == 0 { "c1" } else { "c2" };
                tokio::spawn(async move {
                    store
                        .cast_ballot(NewBallot::new(format!("u{}", i), candidate))
                        .await
                })
            })
            .collect();
        for cast in casts {
            cast.await.unwrap().unwrap();
        }

        let last_published = tokio::time::timeout(std::time::Duration::from_secs(5), watcher)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*last_published, store.candidates().await.unwrap());
    }
}
