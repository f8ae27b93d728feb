//! SMTP reply parsing.

use super::error::{ClientError, Result};

/// One line of a (possibly multi-line) SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    /// `false` for `250-...` continuation lines
    pub is_last: bool,
    pub message: String,
}

impl ResponseLine {
    /// Parses a single reply line with its line terminator already removed.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ParseError`] if the line does not start with a
    /// three digit code followed by a space, a dash, or nothing at all.
    pub fn parse(line: &str) -> Result<Self> {
        let Some(code) = line.get(..3) else {
            return Err(ClientError::ParseError(format!(
                "Response line too short: '{line}'"
            )));
        };

        if !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ClientError::ParseError(format!(
                "Invalid status code: '{code}'"
            )));
        }

        let code = code
            .parse::<u16>()
            .map_err(|e| ClientError::ParseError(format!("Invalid status code '{code}': {e}")))?;

        let rest = &line[3..];
        let (is_last, message) = match rest.as_bytes().first() {
            None => (true, ""),
            Some(b' ') => (true, &rest[1..]),
            Some(b'-') => (false, &rest[1..]),
            Some(other) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{}'",
                    char::from(*other)
                )));
            }
        };

        Ok(Self {
            code,
            is_last,
            message: message.to_string(),
        })
    }
}

/// A complete SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All reply text joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx: the server is waiting for more input (DATA body, AUTH challenge).
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    pub const fn is_temporary_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// Looks for a complete reply at the start of `buffer`.
    ///
    /// Returns the reply and the number of bytes it occupied, or `None` when
    /// more data is needed. Lines may end in CRLF or a bare LF.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ParseError`] if a line is malformed or the lines
    /// of a multi-line reply disagree on the status code.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(newline) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + newline];
            consumed += newline + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let line = ResponseLine::parse(std::str::from_utf8(raw)?)?;

            match code {
                Some(expected) if expected != line.code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {expected}, got {}",
                        line.code
                    )));
                }
                Some(_) => {}
                None => code = Some(line.code),
            }

            lines.push(line.message);

            if line.is_last {
                return Ok(code.map(|code| (Self::new(code, lines), consumed)));
            }
        }

        Ok(None)
    }
}
