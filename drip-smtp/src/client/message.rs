//! MIME message assembly for campaign mail.

use core::fmt::Write;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use ulid::Ulid;

use super::error::{ClientError, Result};

/// Encoded lines are wrapped at this width (RFC 2045 section 6.8).
const BASE64_LINE_LENGTH: usize = 76;

/// Largest raw chunk that still fits a 75 character RFC 2047 encoded-word.
const ENCODED_WORD_CHUNK: usize = 45;

/// Builds a `multipart/mixed` message with a single base64 encoded HTML part.
///
/// ```
/// use drip_smtp::client::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from("team@example.com")
///     .to("ann@example.com")
///     .subject("Hello")
///     .header("List-Unsubscribe", "<https://example.com/unsubscribe/oneclick/1>")
///     .html("<p>Hi</p>")
///     .build()
///     .unwrap();
///
/// assert!(message.contains("List-Unsubscribe: <https://example.com/unsubscribe/oneclick/1>\r\n"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Option<String>,
    subject: Option<String>,
    headers: Vec<(String, String)>,
    html: Option<String>,
    date: Option<DateTime<Utc>>,
    message_id: Option<String>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to = Some(address.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Adds a header after the standard ones. Headers keep insertion order.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    /// Overrides the `Date` header, which otherwise is the build time.
    #[must_use]
    pub const fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Overrides the generated `Message-ID` (without angle brackets).
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// # Errors
    ///
    /// Returns [`ClientError::BuilderError`] if the sender, recipient or body
    /// is missing, or if any header value contains a line break.
    pub fn build(self) -> Result<String> {
        let from = self
            .from
            .ok_or_else(|| ClientError::BuilderError("Missing From address".to_string()))?;
        let to = self
            .to
            .ok_or_else(|| ClientError::BuilderError("Missing To address".to_string()))?;
        let html = self
            .html
            .ok_or_else(|| ClientError::BuilderError("Missing HTML body".to_string()))?;

        let message_id = self.message_id.unwrap_or_else(|| {
            let domain = from.rsplit_once('@').map_or("localhost", |(_, domain)| domain);
            format!("{}@{domain}", Ulid::new())
        });
        let boundary = format!("drip-{}", Ulid::new());
        let date = self.date.unwrap_or_else(Utc::now);

        let mut message = String::with_capacity(html.len() * 4 / 3 + 1024);

        write_header(&mut message, "Date", &date.to_rfc2822())?;
        write_header(&mut message, "From", &from)?;
        write_header(&mut message, "To", &to)?;
        if let Some(subject) = &self.subject {
            if subject.contains(['\r', '\n']) {
                return Err(ClientError::BuilderError(
                    "Subject contains a line break".to_string(),
                ));
            }
            write_header(&mut message, "Subject", &encode_header_value(subject))?;
        }
        write_header(&mut message, "Message-ID", &format!("<{message_id}>"))?;
        write_header(&mut message, "MIME-Version", "1.0")?;
        for (name, value) in &self.headers {
            write_header(&mut message, name, value)?;
        }
        write_header(
            &mut message,
            "Content-Type",
            &format!("multipart/mixed; boundary=\"{boundary}\""),
        )?;

        write!(message, "\r\n--{boundary}\r\n")?;
        message.push_str("Content-Type: text/html; charset=\"utf-8\"\r\n");
        message.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
        push_wrapped_base64(&mut message, html.as_bytes());
        write!(message, "--{boundary}--\r\n")?;

        Ok(message)
    }
}

fn write_header(message: &mut String, name: &str, value: &str) -> Result<()> {
    if name.contains(['\r', '\n', ':']) || value.contains(['\r', '\n']) {
        return Err(ClientError::BuilderError(format!(
            "Header '{}' contains a line break",
            name.escape_debug()
        )));
    }

    write!(message, "{name}: {value}\r\n")?;
    Ok(())
}

fn push_wrapped_base64(message: &mut String, data: &[u8]) {
    let encoded = STANDARD.encode(data);

    // Base64 output is ASCII, so byte offsets are char boundaries.
    let mut rest = encoded.as_str();
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(rest.len().min(BASE64_LINE_LENGTH));
        message.push_str(line);
        message.push_str("\r\n");
        rest = tail;
    }
}

/// Returns `value` unchanged if it is printable ASCII, otherwise as a folded
/// sequence of RFC 2047 base64 encoded-words.
fn encode_header_value(value: &str) -> String {
    if value.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        return value.to_string();
    }

    let mut words = Vec::new();
    let mut start = 0;
    let mut end = 0;

    for (idx, ch) in value.char_indices() {
        let next = idx + ch.len_utf8();
        if next - start > ENCODED_WORD_CHUNK && end > start {
            words.push(format!("=?utf-8?B?{}?=", STANDARD.encode(&value[start..end])));
            start = end;
        }
        end = next;
    }
    if end > start {
        words.push(format!("=?utf-8?B?{}?=", STANDARD.encode(&value[start..end])));
    }

    words.join("\r\n ")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn builder() -> MessageBuilder {
        MessageBuilder::new()
            .from("team@example.com")
            .to("ann@example.com")
            .subject("Hello Ann")
            .date(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
            .message_id("fixed@example.com")
            .html("<p>Hi</p>")
    }

    #[test]
    fn test_headers_in_order() {
        let message = builder()
            .header("List-Unsubscribe", "<https://u.example.com/oneclick/1>")
            .header("List-Unsubscribe-Post", "List-Unsubscribe=One-Click")
            .build()
            .unwrap();

        let (headers, _) = message.split_once("\r\n\r\n").unwrap();
        let names: Vec<&str> = headers
            .split("\r\n")
            .filter_map(|line| line.split_once(':').map(|(name, _)| name))
            .collect();

        assert_eq!(
            names,
            vec![
                "Date",
                "From",
                "To",
                "Subject",
                "Message-ID",
                "MIME-Version",
                "List-Unsubscribe",
                "List-Unsubscribe-Post",
                "Content-Type",
            ]
        );
        assert!(headers.contains("Date: Fri, "));
        assert!(headers.contains("Mar 2024 12:00:00 +0000"));
        assert!(headers.contains("Message-ID: <fixed@example.com>"));
    }

    #[test]
    fn test_html_part_is_base64() {
        let message = builder().build().unwrap();

        assert!(message.contains("Content-Type: text/html; charset=\"utf-8\"\r\n"));
        assert!(message.contains("Content-Transfer-Encoding: base64\r\n\r\n"));
        assert!(message.contains(&STANDARD.encode("<p>Hi</p>")));
        assert!(message.ends_with("--\r\n"));
    }

    #[test]
    fn test_long_body_is_wrapped() {
        let message = builder().html("x".repeat(500)).build().unwrap();
        let (_, body) = message.split_once("base64\r\n\r\n").unwrap();

        for line in body.split("\r\n") {
            assert!(line.len() <= BASE64_LINE_LENGTH, "line too long: {line}");
        }
    }

    #[test]
    fn test_non_ascii_subject_is_encoded() {
        assert_eq!(encode_header_value("Hello"), "Hello");
        assert_eq!(encode_header_value("Grüße"), "=?utf-8?B?R3LDvMOfZQ==?=");

        let long = "ü".repeat(60);
        let encoded = encode_header_value(&long);
        for word in encoded.split("\r\n ") {
            assert!(word.len() <= 75, "encoded word too long: {word}");
        }
        assert_eq!(encoded.split("\r\n ").count(), 3);
    }

    #[test]
    fn test_missing_fields() {
        assert!(MessageBuilder::new().to("a@b").html("x").build().is_err());
        assert!(MessageBuilder::new().from("a@b").html("x").build().is_err());
        assert!(MessageBuilder::new().from("a@b").to("c@d").build().is_err());
    }

    #[test]
    fn test_header_injection_rejected() {
        let result = builder().subject("Hi\r\nBcc: someone@example.com").build();
        assert!(matches!(result, Err(ClientError::BuilderError(_))));
    }
}
