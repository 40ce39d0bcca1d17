pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{begin, commit, connect, connect_with_settings, DbPool, DbTransaction};
pub use fixtures::{DemoDirectory, SeedResult, VerificationResult};
pub use repositories::RepositoryError;
