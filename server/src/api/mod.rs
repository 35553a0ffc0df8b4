pub mod auth;
pub mod friends;
pub mod jwt;
pub mod layouts;
pub mod leaderboard;
pub mod levels;
pub mod middleware;
pub mod personal_records;
pub mod submissions;
