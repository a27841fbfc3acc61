use sha2::{Digest, Sha256};

/// Hex SHA-256 of a raw refresh token. This is the only form in which refresh
/// tokens are stored or looked up.
pub fn fingerprint(raw_token: &str) -> String {
    hex::encode(Sha256::digest(raw_token.as_bytes()))
}
