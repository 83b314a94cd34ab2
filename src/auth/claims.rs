use serde::{Deserialize, Serialize};

/// Payload of an identity-provider session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,         // provider subject id
    pub exp: usize,          // expires at (unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<usize>,  // issued at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>, // issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>, // provider session id
}
