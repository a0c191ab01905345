use chrono::{DateTime, Utc};
use tokio::runtime::Handle;

use crate::adapters::credentials::{AccountCredentials, RoleProvider};

pub struct StsRoleProvider {
    client: aws_sdk_sts::Client,
    runtime: Handle,
}

impl StsRoleProvider {
    pub fn new(client: aws_sdk_sts::Client, runtime: Handle) -> Self {
        Self { client, runtime }
    }
}

fn session_name(now: DateTime<Utc>) -> String {
    format!("log-rollup-{}", now.timestamp())
}

impl RoleProvider for StsRoleProvider {
    fn assume(&self, role_identifier: &str) -> Result<AccountCredentials, String> {
        let client = self.client.clone();
        let role = role_identifier.to_string();

        tokio::task::block_in_place(|| {
            self.runtime.block_on(async move {
                let output = client
                    .assume_role()
                    .role_arn(&role)
                    .role_session_name(session_name(Utc::now()))
                    .send()
                    .await
                    .map_err(|error| format!("assume_role failed: {error}"))?;
                let credentials = output
                    .credentials()
                    .ok_or_else(|| "assume_role returned no credentials".to_string())?;
                let expiration = credentials.expiration();

                Ok(AccountCredentials {
                    role_identifier: role,
                    access_key_id: credentials.access_key_id().to_string(),
                    secret_access_key: credentials.secret_access_key().to_string(),
                    session_token: Some(credentials.session_token().to_string()),
                    expiration: DateTime::<Utc>::from_timestamp(
                        expiration.secs(),
                        expiration.subsec_nanos(),
                    ),
                })
            })
        })
    }
}
