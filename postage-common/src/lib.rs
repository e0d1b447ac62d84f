//! Types shared across the postage crates: the error surface, address
//! parsing, session configuration and logging.

pub mod address;
pub mod config;
pub mod error;
pub mod logging;

pub use address::{AddressError, Mailbox, parse_address_list};
pub use config::{ConfigError, Credentials, Properties, Protocol, TlsPolicy, TransportSettings};
pub use error::{MailError, Result, check_argument, is_blank};
pub use tracing;
