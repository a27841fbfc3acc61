pub mod audit;
pub mod auth;
pub mod fingerprint;
pub mod lockout;
pub mod metrics;
pub mod password;
pub mod tokens;
