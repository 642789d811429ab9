use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A candidate document as it sits in the `candidates` collection. Every
/// field is optional because the collection is schemaless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    #[serde(rename = "total-votes", default, skip_serializing_if = "Option::is_none")]
    pub total_votes: Option<i64>,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl CandidateDocument {
    pub fn new(id: impl Into<String>, name: impl Into<String>, age: i64) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            age: Some(age),
            total_votes: Some(0),
            image_url: None,
        }
    }

    pub fn with_votes(mut self, total_votes: i64) -> Self {
        self.total_votes = Some(total_votes);
        self
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}

/// Read-only view of a candidate, with missing fields defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub age: u64,
    pub total_votes: u64,
    pub image_url: Option<String>,
}

impl From<&CandidateDocument> for Candidate {
    fn from(doc: &CandidateDocument) -> Self {
        // Negative integers are as malformed as missing ones.
        let non_negative = |value: Option<i64>| value.and_then(|v| u64::try_from(v).ok()).unwrap_or(0);

        Self {
            id: doc.id.clone(),
            name: doc.name.clone().unwrap_or_default(),
            age: non_negative(doc.age),
            total_votes: non_negative(doc.total_votes),
            image_url: doc.image_url.clone(),
        }
    }
}

/// A recorded vote. Field names on the wire follow the `votes` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub id: String,
    #[serde(rename = "user_ID")]
    pub voter_id: String,
    #[serde(rename = "vote_Choice")]
    pub candidate_id: String,
    #[serde(rename = "timestamp")]
    pub cast_at: DateTime<Utc>,
}

/// What a client submits; the store assigns the id and the timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBallot {
    pub voter_id: String,
    pub candidate_id: String,
}

impl NewBallot {
    pub fn new(voter_id: impl Into<String>, candidate_id: impl Into<String>) -> Self {
        Self {
            voter_id: voter_id.into(),
            candidate_id: candidate_id.into(),
        }
    }

    /// Stamp the ballot the way the store does on insert.
    pub fn into_ballot(self) -> Ballot {
        Ballot {
            id: Uuid::new_v4().to_string(),
            voter_id: self.voter_id,
            candidate_id: self.candidate_id,
            cast_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub uid: String,
    pub email: String,
    pub secret_digest: String,
    pub salt: String,
    pub created_at: DateTime<Utc>,
}

/// The signed-in user. `uid` is the opaque key used for duplicate-vote checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity {
    pub uid: String,
    pub email: String,
}

impl From<&Account> for UserIdentity {
    fn from(account: &Account) -> Self {
        Self {
            uid: account.uid.clone(),
            email: account.email.clone(),
        }
    }
}
