//! Per-visit voting state.
//!
//! [`Session`] is a plain state machine driven by [`SessionEvent`]s; it does
//! no I/O. [`VotingSession`] runs the vote check and the candidate feed
//! against a store and feeds their outcomes into it.

mod handle;

use std::collections::VecDeque;

use serde::Serialize;

use crate::error::VoteError;
use crate::models::Candidate;

pub use handle::VotingSession;

/// Undrained notices kept per session; the oldest are dropped first.
pub const MAX_NOTICES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    /// Waiting for the vote check and the first candidate delivery.
    Loading,
    Ready,
    /// Both initial operations settled but no candidates could be loaded.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Notice {
    Info(String),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    FeedUpdated(Vec<Candidate>),
    FeedFailed(String),
    GuardResolved(bool),
    GuardFailed(String),
    CastStarted,
    CastSucceeded,
    CastFailed { message: String, already_voted: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Progress {
    #[default]
    Pending,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    phase: SessionPhase,
    candidates: Vec<Candidate>,
    has_voted: bool,
    casting: bool,
    error: Option<String>,
    #[serde(skip)]
    notices: VecDeque<Notice>,
    #[serde(skip)]
    guard: Progress,
    #[serde(skip)]
    feed: Progress,
    #[serde(skip)]
    delivered: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Loading,
            candidates: Vec::new(),
            has_voted: false,
            casting: false,
            error: None,
            notices: VecDeque::new(),
            guard: Progress::Pending,
            feed: Progress::Pending,
            delivered: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == SessionPhase::Loading
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn has_voted(&self) -> bool {
        self.has_voted
    }

    pub fn is_casting(&self) -> bool {
        self.casting
    }

    /// Whether the vote action should be enabled.
    pub fn can_vote(&self) -> bool {
        self.phase == SessionPhase::Ready && !self.has_voted && !self.casting
    }

    /// The most recent failure message, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn pending_notices(&self) -> usize {
        self.notices.len()
    }

    /// Drain the notices raised since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    /// Apply one event. Only `CastStarted` can be refused; everything else
    /// always transitions.
    pub fn apply(&mut self, event: SessionEvent) -> Result<(), VoteError> {
        match event {
            SessionEvent::FeedUpdated(candidates) => {
                self.candidates = candidates;
                self.feed = Progress::Done;
                self.delivered = true;
            }
            SessionEvent::FeedFailed(message) => {
                if self.feed == Progress::Pending {
                    self.feed = Progress::Failed;
                }
                self.fail(message);
            }
            SessionEvent::GuardResolved(has_voted) => {
                // A cast that landed first already proved the voter has a ballot.
                self.has_voted |= has_voted;
                self.guard = Progress::Done;
            }
            SessionEvent::GuardFailed(message) => {
                self.guard = Progress::Failed;
                self.fail(message);
            }
            SessionEvent::CastStarted => {
                if self.phase != SessionPhase::Ready {
                    return Err(VoteError::SessionNotReady);
                }
                if self.casting {
                    return Err(VoteError::CastInProgress);
                }
                if self.has_voted {
                    return Err(VoteError::AlreadyVoted {
                        voter_id: String::new(),
                    });
                }
                self.casting = true;
            }
            SessionEvent::CastSucceeded => {
                self.casting = false;
                self.has_voted = true;
                self.notify(Notice::Info("Vote recorded".to_string()));
            }
            SessionEvent::CastFailed {
                message,
                already_voted,
            } => {
                self.casting = false;
                self.has_voted |= already_voted;
                self.fail(message);
            }
        }
        self.advance();
        Ok(())
    }

    fn fail(&mut self, message: String) {
        self.notify(Notice::Error(message.clone()));
        self.error = Some(message);
    }

    fn notify(&mut self, notice: Notice) {
        // A repeat of the newest notice is not shown twice.
        if self.notices.back() == Some(&notice) {
            return;
        }
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(notice);
    }

    fn advance(&mut self) {
        let settled = self.guard != Progress::Pending && self.feed != Progress::Pending;
        self.phase = match (settled, self.delivered) {
            (_, true) if settled || self.phase != SessionPhase::Loading => SessionPhase::Ready,
            (true, false) => SessionPhase::Error,
            _ => self.phase,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn alice() -> Candidate {
        Candidate {
            id: "c1".to_string(),
            name: "Alice".to_string(),
            age: 30,
            total_votes: 5,
            image_url: None,
        }
    }

    fn ready() -> Session {
        let mut session = Session::new();
        session.apply(SessionEvent::FeedUpdated(vec![alice()])).unwrap();
        session.apply(SessionEvent::GuardResolved(false)).unwrap();
        session
    }

    #[test]
    fn loading_until_both_settle_in_either_order() {
        let mut feed_first = Session::new();
        feed_first.apply(SessionEvent::FeedUpdated(vec![alice()])).unwrap();
        assert!(feed_first.is_loading());
        feed_first.apply(SessionEvent::GuardResolved(true)).unwrap();
        assert_eq!(feed_first.phase(), SessionPhase::Ready);
        assert!(feed_first.has_voted());

        let mut guard_first = Session::new();
        guard_first.apply(SessionEvent::GuardResolved(false)).unwrap();
        assert!(guard_first.is_loading());
        guard_first.apply(SessionEvent::FeedUpdated(vec![alice()])).unwrap();
        assert_eq!(guard_first.phase(), SessionPhase::Ready);
        assert!(guard_first.can_vote());
    }

    #[test]
    fn guard_failure_is_fail_open() {
        let mut session = Session::new();
        session.apply(SessionEvent::GuardFailed("offline".to_string())).unwrap();
        session.apply(SessionEvent::FeedUpdated(vec![alice()])).unwrap();

        assert_eq!(session.phase(), SessionPhase::Ready);
        assert!(!session.has_voted());
        assert!(session.can_vote());
        assert_eq!(session.error(), Some("offline"));
        assert_eq!(
            session.take_notices(),
            vec![Notice::Error("offline".to_string())]
        );
        assert_eq!(session.pending_notices(), 0);
    }

    #[test]
    fn feed_failure_before_any_snapshot_is_an_error_phase() {
        let mut session = Session::new();
        session.apply(SessionEvent::FeedFailed("denied".to_string())).unwrap();
        session.apply(SessionEvent::GuardResolved(false)).unwrap();
        assert_eq!(session.phase(), SessionPhase::Error);
        assert!(!session.can_vote());

        session.apply(SessionEvent::FeedUpdated(vec![alice()])).unwrap();
        assert_eq!(session.phase(), SessionPhase::Ready);
    }

    #[test]
    fn later_feed_errors_keep_the_session_ready() {
        let mut session = ready();
        session.apply(SessionEvent::FeedFailed("blip".to_string())).unwrap();
        assert_eq!(session.phase(), SessionPhase::Ready);
        assert_eq!(session.candidates(), &[alice()]);
        assert_eq!(session.pending_notices(), 1);
    }

    #[test]
    fn cast_lifecycle() {
        let mut session = ready();
        session.apply(SessionEvent::CastStarted).unwrap();
        assert!(session.is_casting());
        assert!(matches!(
            session.apply(SessionEvent::CastStarted),
            Err(VoteError::CastInProgress)
        ));

        session.apply(SessionEvent::CastSucceeded).unwrap();
        assert!(session.has_voted());
        assert!(!session.can_vote());
        assert_eq!(
            session.take_notices(),
            vec![Notice::Info("Vote recorded".to_string())]
        );
        assert!(matches!(
            session.apply(SessionEvent::CastStarted),
            Err(VoteError::AlreadyVoted { .. })
        ));
    }

    #[test]
    fn failed_cast_permits_retry() {
        let mut session = ready();
        session.apply(SessionEvent::CastStarted).unwrap();
        session
            .apply(SessionEvent::CastFailed {
                message: "unavailable".to_string(),
                already_voted: false,
            })
            .unwrap();
        assert!(!session.has_voted());
        assert!(session.can_vote());
        session.apply(SessionEvent::CastStarted).unwrap();
    }

    #[test]
    fn store_side_duplicate_locks_the_session() {
        let mut session = ready();
        session.apply(SessionEvent::CastStarted).unwrap();
        session
            .apply(SessionEvent::CastFailed {
                message: "already voted".to_string(),
                already_voted: true,
            })
            .unwrap();
        assert!(session.has_voted());
    }

    #[test]
    fn casting_while_loading_is_refused() {
        let mut session = Session::new();
        assert!(matches!(
            session.apply(SessionEvent::CastStarted),
            Err(VoteError::SessionNotReady)
        ));
    }

    #[test]
    fn notices_collapse_repeats_and_stay_bounded() {
        let mut session = ready();
        for _ in 0..5 {
            session.apply(SessionEvent::FeedFailed("offline".to_string())).unwrap();
        }
        assert_eq!(session.pending_notices(), 1);

        for i in 0..(MAX_NOTICES + 10) {
            session.apply(SessionEvent::FeedFailed(format!("offline {}", i))).unwrap();
        }
        assert_eq!(session.pending_notices(), MAX_NOTICES);

        let notices = session.take_notices();
        assert_eq!(notices.first(), Some(&Notice::Error("offline 10".to_string())));
        assert_eq!(
            notices.last(),
            Some(&Notice::Error(format!("offline {}", MAX_NOTICES + 9)))
        );
    }
}
