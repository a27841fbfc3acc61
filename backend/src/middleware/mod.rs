pub mod auth;
pub mod client;
pub mod rate_limit;
pub mod role;
pub mod security;
