use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{error, info};

use crate::error::{Result, VoteError};
use crate::models::{Ballot, NewBallot};
use crate::store::DocumentStore;

/// How a vote reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CastStrategy {
    /// One store transaction: duplicate check, ballot insert, counter increment.
    #[default]
    Transactional,
    /// Ballot insert, then a separate counter increment. No rollback between them.
    Sequential,
}

impl FromStr for CastStrategy {
    type Err = VoteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transactional" => Ok(CastStrategy::Transactional),
            "sequential" => Ok(CastStrategy::Sequential),
            other => Err(VoteError::Config(format!("Unknown cast strategy: {}", other))),
        }
    }
}

impl fmt::Display for CastStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastStrategy::Transactional => f.write_str("transactional"),
            CastStrategy::Sequential => f.write_str("sequential"),
        }
    }
}

pub struct VoteCaster<S: DocumentStore + ?Sized> {
    store: Arc<S>,
    strategy: CastStrategy,
}

impl<S: DocumentStore + ?Sized> VoteCaster<S> {
    pub fn new(store: Arc<S>, strategy: CastStrategy) -> Self {
        Self { store, strategy }
    }

    pub fn strategy(&self) -> CastStrategy {
        self.strategy
    }

    pub async fn cast(&self, voter_id: &str, candidate_id: &str) -> Result<Ballot> {
        let ballot = NewBallot::new(voter_id, candidate_id);
        let ballot = match self.strategy {
            CastStrategy::Transactional => self.store.cast_ballot(ballot).await?,
            CastStrategy::Sequential => self.cast_sequential(ballot).await?,
        };
        info!(
            "Voter {} cast ballot {} for candidate {}",
            ballot.voter_id, ballot.id, ballot.candidate_id
        );
        Ok(ballot)
    }

    async fn cast_sequential(&self, ballot: NewBallot) -> Result<Ballot> {
        let ballot = self.store.insert_ballot(ballot).await?;

        if let Err(e) = self.store.increment_votes(&ballot.candidate_id, 1).await {
            error!(
                "Ballot {} recorded but tally for {} not updated: {}",
                ballot.id, ballot.candidate_id, e
            );
            return Err(VoteError::TallyNotUpdated {
                ballot_id: ballot.id,
                candidate_id: ballot.candidate_id,
                reason: e.to_string(),
            });
        }

        Ok(ballot)
    }
}
