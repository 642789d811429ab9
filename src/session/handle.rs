use std::sync::Arc;

use log::{info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{Notice, Session, SessionEvent};
use crate::auth::AuthProvider;
use crate::error::{Result, VoteError};
use crate::models::{Ballot, UserIdentity};
use crate::store::DocumentStore;
use crate::voting::{CandidateFeed, CastStrategy, VoteCaster, VoteGuard};

/// One screen visit. Opening it starts the vote check and the candidate
/// subscription concurrently; dropping it stops both.
pub struct VotingSession<S: DocumentStore + ?Sized> {
    voter: UserIdentity,
    caster: VoteCaster<S>,
    state: Arc<watch::Sender<Session>>,
    tasks: Vec<JoinHandle<()>>,
}

fn apply(state: &watch::Sender<Session>, event: SessionEvent) {
    state.send_modify(|session| {
        if let Err(e) = session.apply(event) {
            warn!("Session event refused: {}", e);
        }
    });
}

impl<S: DocumentStore + ?Sized> VotingSession<S> {
    /// Open a session for whoever is signed in.
    pub fn open_for<A: AuthProvider + ?Sized>(
        auth: &A,
        store: Arc<S>,
        strategy: CastStrategy,
    ) -> Result<Self> {
        let voter = auth.current_user().ok_or(VoteError::NotSignedIn)?;
        Ok(Self::open(store, voter, strategy))
    }

    pub fn open(store: Arc<S>, voter: UserIdentity, strategy: CastStrategy) -> Self {
        let (sender, _) = watch::channel(Session::new());
        let state = Arc::new(sender);
        info!("Opening voting session for {}", voter.uid);

        let guard_task = {
            let guard = VoteGuard::new(Arc::clone(&store));
            let state = Arc::clone(&state);
            let voter_id = voter.uid.clone();
            tokio::spawn(async move {
                let event = match guard.has_voted(&voter_id).await {
                    Ok(has_voted) => SessionEvent::GuardResolved(has_voted),
                    Err(e) => {
                        warn!("Vote check for {} failed: {}", voter_id, e);
                        SessionEvent::GuardFailed(e.to_string())
                    }
                };
                apply(&state, event);
            })
        };

        let feed_task = {
            let mut feed = CandidateFeed::subscribe(store.as_ref());
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                while let Some(update) = feed.next().await {
                    let event = match update {
                        Ok(candidates) => SessionEvent::FeedUpdated(candidates),
                        Err(message) => SessionEvent::FeedFailed(message),
                    };
                    apply(&state, event);
                }
            })
        };

        Self {
            voter,
            caster: VoteCaster::new(store, strategy),
            state,
            tasks: vec![guard_task, feed_task],
        }
    }

    pub fn voter(&self) -> &UserIdentity {
        &self.voter
    }

    pub fn strategy(&self) -> CastStrategy {
        self.caster.strategy()
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Watch state changes, e.g. to re-render.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// Wait until the vote check and the first candidate delivery have settled.
    pub async fn wait_until_settled(&self) -> Result<Session> {
        let mut receiver = self.state.subscribe();
        let session = receiver
            .wait_for(|session| !session.is_loading())
            .await
            .map_err(|_| VoteError::Store("session closed".to_string()))?;
        Ok(session.clone())
    }

    pub fn take_notices(&self) -> Vec<Notice> {
        let mut notices = Vec::new();
        self.state.send_if_modified(|session| {
            notices = session.take_notices();
            !notices.is_empty()
        });
        notices
    }

    /// Cast this session's one vote.
    pub async fn cast_vote(&self, candidate_id: &str) -> Result<Ballot> {
        let mut started = Ok(());
        self.state.send_if_modified(|session| {
            started = session.apply(SessionEvent::CastStarted);
            started.is_ok()
        });
        started.map_err(|e| match e {
            VoteError::AlreadyVoted { .. } => VoteError::AlreadyVoted {
                voter_id: self.voter.uid.clone(),
            },
            other => other,
        })?;

        match self.caster.cast(&self.voter.uid, candidate_id).await {
            Ok(ballot) => {
                apply(&self.state, SessionEvent::CastSucceeded);
                Ok(ballot)
            }
            Err(e) => {
                warn!("Vote by {} for {} failed: {}", self.voter.uid, candidate_id, e);
                apply(
                    &self.state,
                    SessionEvent::CastFailed {
                        message: e.to_string(),
                        already_voted: e.is_already_voted(),
                    },
                );
                Err(e)
            }
        }
    }

    pub fn close(self) {
        info!("Closing voting session for {}", self.voter.uid);
    }
}

impl<S: DocumentStore + ?Sized> Drop for VotingSession<S> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
