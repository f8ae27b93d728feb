//! `{token}` substitution for subjects and bodies, plus the tracking and
//! unsubscribe links embedded in every message.

use drip_common::{CampaignContactId, Contact};
use serde::Deserialize;

/// Values available to a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    values: Vec<(&'static str, String)>,
}

impl Bindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `token`, replacing any earlier value.
    #[must_use]
    pub fn with(mut self, token: &'static str, value: impl Into<String>) -> Self {
        let value = value.into();
        if let Some(slot) = self.values.iter_mut().find(|(name, _)| *name == token) {
            slot.1 = value;
        } else {
            self.values.push((token, value));
        }
        self
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| *name == token)
            .map(|(_, value)| value.as_str())
    }

    /// The bindings for one send: `_id`, `name`, `alias`, `company`,
    /// `email_address` and `unsubscribe_url`.
    #[must_use]
    pub fn for_contact(id: &CampaignContactId, contact: &Contact, unsubscribe_url: String) -> Self {
        Self::new()
            .with("_id", id.as_str())
            .with("name", contact.name.as_str())
            .with("alias", contact.display_alias())
            .with("company", contact.company.as_str())
            .with("email_address", contact.email_address.as_str())
            .with("unsubscribe_url", unsubscribe_url)
    }
}

/// Replaces every `{token}` that has a binding with its value.
///
/// Substitution is a single left-to-right pass: unbound tokens and stray
/// braces are copied through verbatim and substituted values are never
/// scanned again. No escaping is applied.
pub fn render(template: &str, bindings: &Bindings) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let Some(close) = after.find(['{', '}']) else {
            out.push_str(&rest[open..]);
            return out;
        };

        if after.as_bytes()[close] == b'{' {
            // `{ ... {` : the first brace cannot open a token
            out.push('{');
            rest = after;
            continue;
        }

        let token = &after[..close];
        match bindings.get(token) {
            Some(value) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(token);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

/// Public endpoints of the tracking and unsubscribe collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Links {
    /// Prefix the campaign-contact id is appended to, verbatim, to form the
    /// tracking pixel URL.
    #[serde(default = "defaults::tracking_url")]
    pub tracking_url: String,

    /// Base of the unsubscribe service. Messages link to `{base}/{id}` in
    /// the body and `{base}/oneclick/{id}` in `List-Unsubscribe`.
    #[serde(default = "defaults::unsubscribe_url")]
    pub unsubscribe_url: String,
}

impl Default for Links {
    fn default() -> Self {
        Self {
            tracking_url: defaults::tracking_url(),
            unsubscribe_url: defaults::unsubscribe_url(),
        }
    }
}

impl Links {
    pub fn tracking(&self, id: &CampaignContactId) -> String {
        format!("{}{id}", self.tracking_url)
    }

    pub fn unsubscribe(&self, id: &CampaignContactId) -> String {
        format!("{}/{id}", self.unsubscribe_url.trim_end_matches('/'))
    }

    pub fn one_click(&self, id: &CampaignContactId) -> String {
        format!("{}/oneclick/{id}", self.unsubscribe_url.trim_end_matches('/'))
    }

    /// Value of the `List-Unsubscribe` header.
    pub fn list_unsubscribe_header(&self, id: &CampaignContactId) -> String {
        format!("<{}>", self.one_click(id))
    }
}

/// Renders a body template and prepends the tracking pixel.
pub fn render_body(template: &str, bindings: &Bindings, tracking_url: &str) -> String {
    format!("<img src=\"{tracking_url}\">{}", render(template, bindings))
}

mod defaults {
    pub fn tracking_url() -> String {
        "http://localhost:8080/track/".to_string()
    }

    pub fn unsubscribe_url() -> String {
        "http://localhost:8080/unsubscribe".to_string()
    }
}
