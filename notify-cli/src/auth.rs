//! Auth provider backed by CLI flags and the environment.

use async_trait::async_trait;
use notify_center::{AuthProvider, Identity};

/// Environment variable holding the bearer token.
pub const ACCESS_TOKEN_ENV: &str = "NOTIFY_ACCESS_TOKEN";

pub struct CliAuth {
    token: Option<String>,
    identity: Identity,
}

impl CliAuth {
    pub fn new(token: Option<String>, user_id: String, roles: Vec<String>) -> Self {
        let identity = roles
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .fold(Identity::new(user_id), Identity::with_role);
        Self { token, identity }
    }
}

#[async_trait]
impl AuthProvider for CliAuth {
    async fn access_token(&self) -> Option<String> {
        // Re-read so a token rotated in the environment file is picked up.
        self.token
            .clone()
            .or_else(|| std::env::var(ACCESS_TOKEN_ENV).ok())
            .filter(|t| !t.trim().is_empty())
    }

    fn identity(&self) -> Option<Identity> {
        Some(self.identity.clone())
    }
}
