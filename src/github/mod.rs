// GitHub API module.
// Provides client and types for interacting with the GitHub REST API.

pub mod client;
pub mod releases;
pub mod types;

pub use client::GitHubClient;
pub use releases::FetchOutcome;
pub use types::{RateLimit, Release};
