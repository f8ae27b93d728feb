use core::fmt::{self, Debug, Formatter};

use serde::{Deserialize, Serialize};

use super::{ProjectId, SenderId};

/// SMTP password (or app token) for a sender. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// The mailbox a campaign sends from, along with how to reach its
/// submission server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: SenderId,
    pub project_id: ProjectId,
    pub email_address: String,
    pub host: String,
    pub port: u16,
    /// Negotiate STARTTLS before authenticating
    pub tls: bool,
    pub credential: Credential,
}
