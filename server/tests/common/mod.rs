#![allow(dead_code, unused_imports)]

pub mod mock_jwt;
pub mod test_database;
pub mod test_server;

pub use mock_jwt::MockJwtVerifier;
pub use test_database::TestDatabase;
pub use test_server::TestServer;

/// Returns early from a test when no database is configured
#[macro_export]
macro_rules! require_database {
    () => {
        if std::env::var("DATABASE_URL").is_err() {
            eprintln!("Skipping test: DATABASE_URL not set");
            return Ok(());
        }
    };
}
