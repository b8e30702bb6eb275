/// Payment token minting
///
/// A payment token is the capability that lets an unauthenticated student
/// complete enrollment for one enquiry. 32 bytes from the OS RNG, hex encoded.

use crate::accounts::credentials::random_token;

const TOKEN_BYTES: usize = 32;

pub fn mint_payment_token() -> String {
    random_token(TOKEN_BYTES)
}

/// Cheap shape check so junk never reaches the database
pub fn is_well_formed(token: &str) -> bool {
    token.len() == TOKEN_BYTES * 2 && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// First characters only, for logs
pub fn token_prefix(token: &str) -> &str {
    token.get(..8).unwrap_or(token)
}
