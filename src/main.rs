use std::sync::Arc;

use ballot_box::config::{self, Config};
use ballot_box::db::Database;
use ballot_box::store::DocumentStore;
use ballot_box::tasks;
use log::{error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };
    info!("Cast strategy: {}", config.cast_strategy);

    let database = match Database::connect(&config.database_url, config.max_connections).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };

    if let Some(path) = &config.candidates_file {
        match config::load_candidates(path) {
            Ok(documents) => {
                for document in &documents {
                    if let Err(e) = database.put_candidate(document).await {
                        warn!("Failed to seed candidate {}: {}", document.id, e);
                    }
                }
                info!("Seeded {} candidate(s) from {}", documents.len(), path.display());
            }
            Err(e) => {
                error!("{}", e);
                return;
            }
        }
    }

    let reporter = tokio::spawn(tasks::tally_reporter::report_tallies_task(
        Arc::clone(&database),
        config.tally_interval,
    ));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
    reporter.abort();
}
