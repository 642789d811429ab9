use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use tokio::time::interval;

use crate::error::Result;
use crate::models::Candidate;
use crate::store::DocumentStore;
use crate::voting::{build_report, TallyReport};

/// Tally the store once.
pub async fn report_once<S: DocumentStore + ?Sized>(store: &S) -> Result<TallyReport> {
    let candidates: Vec<Candidate> = store
        .candidates()
        .await?
        .iter()
        .map(Candidate::from)
        .collect();
    let ballots = store.ballots().await?;
    Ok(build_report(&candidates, &ballots))
}

pub async fn report_tallies_task<S: DocumentStore + ?Sized>(store: Arc<S>, every: Duration) {
    info!("Starting tally reporter, every {}s", every.as_secs());
    let mut interval = interval(every);

    loop {
        interval.tick().await;
        info!("Tallying votes at {}", Utc::now().to_rfc3339());

        match report_once(store.as_ref()).await {
            Ok(report) => {
                info!("Standings:\n{}", report.summary);
                for finding in &report.findings {
                    match serde_json::to_string(finding) {
                        Ok(json) => warn!("Tally finding: {}", json),
                        Err(e) => warn!("Tally finding {:?} (unserializable: {})", finding, e),
                    }
                }
            }
            Err(e) => {
                error!("Failed to tally votes: {}", e);
            }
        }
    }
}
