use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

lazy_static! {
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "auth_logins_total",
        "Login attempts by outcome",
        &["status"]
    ).unwrap();

    pub static ref REFRESHES_COUNTER: CounterVec = register_counter_vec!(
        "auth_refreshes_total",
        "Refresh-token exchanges by outcome",
        &["status"]
    ).unwrap();
}

/// Outcome label for a login or refresh result.
pub fn outcome_label<T>(result: &Result<T, crate::errors::AuthError>) -> &'static str {
    use crate::errors::AuthError;
    match result {
        Ok(_) => "success",
        Err(AuthError::InvalidCredentials) => "invalid_credentials",
        Err(AuthError::AccountLocked) => "locked",
        Err(AuthError::AccountInactive) => "inactive",
        Err(AuthError::InvalidToken) => "invalid_token",
        Err(AuthError::TokenRevoked) => "revoked",
        Err(_) => "error",
    }
}
