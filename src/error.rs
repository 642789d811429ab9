use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoteError {
    #[error("Please fill in all fields")]
    MissingCredentials,

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Password must be at least {min} characters")]
    WeakSecret { min: usize },

    #[error("An account already exists for {0}")]
    EmailInUse(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("No user is signed in")]
    NotSignedIn,

    #[error("Voter {voter_id} has already voted")]
    AlreadyVoted { voter_id: String },

    #[error("Unknown candidate: {0}")]
    UnknownCandidate(String),

    #[error("Ballot {ballot_id} was recorded but the tally for {candidate_id} was not updated: {reason}")]
    TallyNotUpdated {
        ballot_id: String,
        candidate_id: String,
        reason: String,
    },

    #[error("A vote is already being cast")]
    CastInProgress,

    #[error("Candidates are still loading")]
    SessionNotReady,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl VoteError {
    /// True when the store proves the voter already holds a ballot.
    pub fn is_already_voted(&self) -> bool {
        matches!(self, VoteError::AlreadyVoted { .. })
    }
}

pub type Result<T, E = VoteError> = std::result::Result<T, E>;
