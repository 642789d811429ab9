use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tokio::sync::Mutex;

use crate::auth::AccountStore;
use crate::error::{Result, VoteError};
use crate::models::{Account, Ballot, CandidateDocument, NewBallot};
use crate::store::{CandidateSubscription, DocumentStore, SnapshotPublisher};

/// SQLite-backed document store. Subscribers are notified after every write
/// made through this handle.
pub struct Database {
    pool: SqlitePool,
    snapshots: SnapshotPublisher,
    // Held across the re-read and the publish so snapshots leave in read order.
    publish_lock: Mutex<()>,
}

impl Database {
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        if db_url.contains(":memory:") {
            // Every connection to `sqlite::memory:` is its own database; keep exactly one alive.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;

        Self::init_schema(&pool).await?;
        info!("Connected to {}", db_url);

        let database = Self {
            pool,
            snapshots: SnapshotPublisher::new(),
            publish_lock: Mutex::new(()),
        };
        database.publish_candidates().await;
        Ok(database)
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        // Candidate columns are nullable: documents may omit any field.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candidates (
                id TEXT PRIMARY KEY,
                name TEXT,
                age INTEGER,
                total_votes INTEGER,
                image_url TEXT
            );
            "#,
        )
        .execute(pool)
        .await?;

        // No uniqueness on user_id: duplicates are possible with sequential casts.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS votes (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                vote_choice TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_votes_user_id ON votes (user_id);")
            .execute(pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                uid TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                secret_digest TEXT NOT NULL,
                salt TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn publish_candidates(&self) {
        let _guard = self.publish_lock.lock().await;
        match self.candidates().await {
            Ok(documents) => self.snapshots.publish(documents),
            Err(e) => {
                warn!("Failed to load candidate snapshot: {}", e);
                self.snapshots.publish_error(e.to_string());
            }
        }
    }
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .map_err(|e| VoteError::Corrupt(format!("Failed to parse {}: {}", field, e)))?
        .with_timezone(&Utc))
}

fn ballot_from_row(row: &SqliteRow) -> Result<Ballot> {
    Ok(Ballot {
        id: row.get::<String, _>("id"),
        voter_id: row.get::<String, _>("user_id"),
        candidate_id: row.get::<String, _>("vote_choice"),
        cast_at: parse_timestamp("timestamp", &row.get::<String, _>("timestamp"))?,
    })
}

#[async_trait]
impl DocumentStore for Database {
    async fn candidates(&self) -> Result<Vec<CandidateDocument>> {
        let candidates = sqlx::query(
            r#"
            SELECT id, name, age, total_votes, image_url
            FROM candidates
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| CandidateDocument {
            id: row.get::<String, _>("id"),
            name: row.get::<Option<String>, _>("name"),
            age: row.get::<Option<i64>, _>("age"),
            total_votes: row.get::<Option<i64>, _>("total_votes"),
            image_url: row.get::<Option<String>, _>("image_url"),
        })
        .collect();

        Ok(candidates)
    }

    fn subscribe_candidates(&self) -> CandidateSubscription {
        self.snapshots.subscribe()
    }

    async fn put_candidate(&self, document: &CandidateDocument) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO candidates (id, name, age, total_votes, image_url)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id)
            DO UPDATE SET name = excluded.name, age = excluded.age,
                          total_votes = excluded.total_votes, image_url = excluded.image_url
            "#,
        )
        .bind(&document.id)
        .bind(&document.name)
        .bind(document.age)
        .bind(document.total_votes)
        .bind(&document.image_url)
        .execute(&self.pool)
        .await?;

        self.publish_candidates().await;
        Ok(())
    }

    async fn increment_votes(&self, candidate_id: &str, by: u64) -> Result<()> {
        let by = i64::try_from(by).map_err(|_| {
            VoteError::Store(format!("Vote increment {} is out of range", by))
        })?;
        let result = sqlx::query(
            r#"
            UPDATE candidates
            SET total_votes = COALESCE(total_votes, 0) + ?
            WHERE id = ?
            "#,
        )
        .bind(by)
        .bind(candidate_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(VoteError::UnknownCandidate(candidate_id.to_string()));
        }

        self.publish_candidates().await;
        Ok(())
    }

    async fn ballots_for_voter(&self, voter_id: &str) -> Result<Vec<Ballot>> {
        sqlx::query(
            r#"
            SELECT id, user_id, vote_choice, timestamp
            FROM votes
            WHERE user_id = ?
            "#,
        )
        .bind(voter_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| ballot_from_row(&row))
        .collect()
    }

    async fn ballots(&self) -> Result<Vec<Ballot>> {
        sqlx::query(
            r#"
            SELECT id, user_id, vote_choice, timestamp
            FROM votes
            ORDER BY timestamp
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| ballot_from_row(&row))
        .collect()
    }

    async fn insert_ballot(&self, ballot: NewBallot) -> Result<Ballot> {
        let ballot = ballot.into_ballot();
        sqlx::query(
            r#"
            INSERT INTO votes (id, user_id, vote_choice, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&ballot.id)
        .bind(&ballot.voter_id)
        .bind(&ballot.candidate_id)
        .bind(ballot.cast_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!("Inserted ballot {} for voter {}", ballot.id, ballot.voter_id);
        Ok(ballot)
    }

    async fn cast_ballot(&self, ballot: NewBallot) -> Result<Ballot> {
        let ballot = ballot.into_ballot();
        let mut txn = self.pool.begin().await?;

        // Writing first takes the write lock, so the existence check cannot race.
        let inserted = sqlx::query(
            r#"
            INSERT INTO votes (id, user_id, vote_choice, timestamp)
            SELECT ?, ?, ?, ?
            WHERE NOT EXISTS (SELECT 1 FROM votes WHERE user_id = ?)
            "#,
        )
        .bind(&ballot.id)
        .bind(&ballot.voter_id)
        .bind(&ballot.candidate_id)
        .bind(ballot.cast_at.to_rfc3339())
        .bind(&ballot.voter_id)
        .execute(&mut *txn)
        .await?;

        if inserted.rows_affected() == 0 {
            txn.rollback().await?;
            return Err(VoteError::AlreadyVoted {
                voter_id: ballot.voter_id,
            });
        }

        let updated = sqlx::query(
            r#"
            UPDATE candidates
            SET total_votes = COALESCE(total_votes, 0) + 1
            WHERE id = ?
            "#,
        )
        .bind(&ballot.candidate_id)
        .execute(&mut *txn)
        .await?;

        if updated.rows_affected() == 0 {
            txn.rollback().await?;
            return Err(VoteError::UnknownCandidate(ballot.candidate_id));
        }

        txn.commit().await?;
        debug!("Cast ballot {} for voter {}", ballot.id, ballot.voter_id);

        self.publish_candidates().await;
        Ok(ballot)
    }
}

#[async_trait]
impl AccountStore for Database {
    async fn find_account(&self, email: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT uid, email, secret_digest, salt, created_at
            FROM accounts
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Account {
            uid: row.get::<String, _>("uid"),
            email: row.get::<String, _>("email"),
            secret_digest: row.get::<String, _>("secret_digest"),
            salt: row.get::<String, _>("salt"),
            created_at: parse_timestamp("created_at", &row.get::<String, _>("created_at"))?,
        }))
    }

    async fn create_account(&self, account: &Account) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (uid, email, secret_digest, salt, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(email) DO NOTHING
            "#,
        )
        .bind(&account.uid)
        .bind(&account.email)
        .bind(&account.secret_digest)
        .bind(&account.salt)
        .bind(account.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(VoteError::EmailInUse(account.email.clone()));
        }
        Ok(())
    }
}
