use log::{debug, warn};

use crate::models::Candidate;
use crate::store::{CandidateSubscription, DocumentStore};

/// Live, ordered list of candidates. Each delivery replaces the previous one.
pub struct CandidateFeed {
    subscription: CandidateSubscription,
}

impl CandidateFeed {
    pub fn subscribe<S: DocumentStore + ?Sized>(store: &S) -> Self {
        Self {
            subscription: store.subscribe_candidates(),
        }
    }

    /// The next full snapshot, or the subscription error message. `None` once
    /// the store has gone away.
    pub async fn next(&mut self) -> Option<Result<Vec<Candidate>, String>> {
        let snapshot = self.subscription.next().await?;
        Some(match snapshot {
            Ok(documents) => {
                debug!("Candidate snapshot with {} document(s)", documents.len());
                Ok(documents.iter().map(Candidate::from).collect())
            }
            Err(message) => {
                warn!("Candidate subscription error: {}", message);
                Err(message)
            }
        })
    }
}
