use serde::{Deserialize, Serialize};

use super::{ContactId, ProjectId};

/// A recipient within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub project_id: ProjectId,
    pub email_address: String,
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub company: String,
    /// Project-wide opt out recorded on the contact itself.
    #[serde(default)]
    pub unsubscribed: bool,
}

impl Contact {
    /// The alias to greet the contact with, falling back to their name when
    /// no alias (or an empty one) is on record.
    pub fn display_alias(&self) -> &str {
        match self.alias.as_deref() {
            Some(alias) if !alias.trim().is_empty() => alias,
            _ => &self.name,
        }
    }
}
