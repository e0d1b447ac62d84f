pub mod client;

pub use client::{AuthMechanism, Capabilities, ClientError, Response, SmtpClient};
