use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bearer token payload. Tokens are minted by the identity service that
/// shares `JWT_SECRET`; this service only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // trainee id
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
}
