//! SMTP submission client.
//!
//! ```no_run
//! use drip_smtp::client::{MessageBuilder, SmtpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = SmtpClient::connect("smtp.example.com:587", "smtp.example.com").await?;
//! client.read_greeting().await?;
//! client.ehlo("drip.localhost").await?;
//! client.starttls().await?;
//! client.ehlo("drip.localhost").await?;
//! client.authenticate("team@example.com", "secret").await?;
//!
//! let message = MessageBuilder::new()
//!     .from("team@example.com")
//!     .to("ann@example.com")
//!     .subject("Hello")
//!     .html("<p>Hello Ann</p>")
//!     .build()?;
//!
//! client.mail_from("team@example.com").await?;
//! client.rcpt_to("ann@example.com").await?;
//! client.data().await?;
//! client.send_data(&message).await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod message;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use message::MessageBuilder;
pub use response::{Response, ResponseLine};
pub use smtp_client::{AuthMechanism, SmtpClient};
