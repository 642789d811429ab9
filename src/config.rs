use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, VoteError};
use crate::models::CandidateDocument;
use crate::voting::CastStrategy;

const DEFAULT_DATABASE_URL: &str = "sqlite:ballot_box.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_TALLY_INTERVAL_SECONDS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub cast_strategy: CastStrategy,
    pub tally_interval: Duration,
    /// JSON array of candidate documents to upsert at startup.
    pub candidates_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(value) => parse_number("DATABASE_MAX_CONNECTIONS", &value)?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let cast_strategy = match lookup("CAST_STRATEGY") {
            Some(value) => value.parse()?,
            None => CastStrategy::default(),
        };

        let tally_interval = match lookup("TALLY_INTERVAL_SECONDS") {
            Some(value) => parse_number("TALLY_INTERVAL_SECONDS", &value)?,
            None => DEFAULT_TALLY_INTERVAL_SECONDS,
        };
        if tally_interval == 0 {
            return Err(VoteError::Config(
                "TALLY_INTERVAL_SECONDS must be positive".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            max_connections,
            cast_strategy,
            tally_interval: Duration::from_secs(tally_interval),
            candidates_file: lookup("CANDIDATES_FILE")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| VoteError::Config(format!("{} is not a valid number: {}", key, value)))
}

pub fn load_candidates(path: &Path) -> Result<Vec<CandidateDocument>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        VoteError::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&contents)
        .map_err(|e| VoteError::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite:ballot_box.db");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.cast_strategy, CastStrategy::Transactional);
        assert_eq!(config.tally_interval, Duration::from_secs(60));
        assert_eq!(config.candidates_file, None);
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("DATABASE_MAX_CONNECTIONS", "2"),
            ("CAST_STRATEGY", "sequential"),
            ("TALLY_INTERVAL_SECONDS", "5"),
            ("CANDIDATES_FILE", "candidates.json"),
        ])
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.cast_strategy, CastStrategy::Sequential);
        assert_eq!(config.tally_interval, Duration::from_secs(5));
        assert_eq!(config.candidates_file, Some(PathBuf::from("candidates.json")));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config(&[("CAST_STRATEGY", "eventually")]).is_err());
        assert!(config(&[("TALLY_INTERVAL_SECONDS", "0")]).is_err());
        assert!(config(&[("DATABASE_MAX_CONNECTIONS", "many")]).is_err());
    }

    #[test]
    fn candidates_file_is_a_json_array_of_documents() {
        let path = env::temp_dir().join(format!("candidates-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"[{"id":"c1","name":"Alice","age":30,"total-votes":5},{"id":"c2"}]"#,
        )
        .unwrap();

        let documents = load_candidates(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].total_votes, Some(5));
        assert_eq!(documents[1].name, None);
        assert!(load_candidates(&path).is_err());
    }
}
