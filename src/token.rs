//! Push-signature token codec.
//!
//! Mints and validates the short-lived signed tokens carried in the
//! `Grip-Sig` header. A freshly minted token claims the configured issuer
//! and expires one hour out; validation checks the HMAC signature and the
//! expiry claim and treats every malformed input as invalid rather than
//! an error.
//!
//! Tokens are HS256 JWTs with claims `{iss, exp}`. Nothing downstream
//! inspects the format; any consumer only needs `validate_token` to agree
//! with `make_token`.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::constants::SIG_TOKEN_LIFETIME_SECS;

#[derive(Debug, Serialize, Deserialize)]
struct SigClaims {
    iss: String,
    exp: u64,
}

/// Mint a signed push-signature token for the given issuer.
///
/// Returns None if signing fails (e.g. an empty key is still a valid HMAC
/// key, so in practice this only fails on serialization problems).
pub fn make_token(iss: &str, key: &[u8]) -> Option<String> {
    let claims = SigClaims {
        iss: iss.to_string(),
        exp: jsonwebtoken::get_current_timestamp() + SIG_TOKEN_LIFETIME_SECS,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(key),
    )
    .ok()
}

/// Check a push-signature token against a key.
///
/// True iff the signature verifies, the claim set is a JSON object, and
/// its `exp` claim is a positive integer strictly greater than the
/// current UTC second. Any parse failure is false.
pub fn validate_token(token: &str, key: &[u8]) -> bool {
    fn checked(token: &str, key: &[u8]) -> Option<bool> {
        // expiry is checked by hand below, against the exact
        // strictly-greater-than-now rule
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data =
            decode::<serde_json::Value>(token, &DecodingKey::from_secret(key), &validation).ok()?;
        let claims = data.claims.as_object()?;
        let exp = claims.get("exp")?.as_u64()?;

        Some(exp > 0 && exp > jsonwebtoken::get_current_timestamp())
    }

    checked(token, key).unwrap_or(false)
}
