pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod session;
pub mod store;
pub mod tasks;
pub mod voting;

pub use error::{Result, VoteError};
