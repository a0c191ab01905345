use std::fmt;

use chrono::{DateTime, Utc};

/// Temporary credentials for the account that owns a log bucket.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountCredentials {
    pub role_identifier: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("role_identifier", &self.role_identifier)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .field("expiration", &self.expiration)
            .finish()
    }
}

pub trait RoleProvider: Send + Sync {
    fn assume(&self, role_identifier: &str) -> Result<AccountCredentials, String>;
}
