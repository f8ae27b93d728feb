//! Outbound SMTP for drip.
//!
//! [`client::SmtpClient`] speaks the submission side of SMTP (EHLO,
//! STARTTLS, AUTH, MAIL/RCPT/DATA, QUIT) over plain TCP or rustls, and
//! [`client::MessageBuilder`] produces the MIME document that is sent.

pub mod client;
