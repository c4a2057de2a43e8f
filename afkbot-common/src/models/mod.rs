pub mod account;
pub mod chat;
pub mod connection;
pub mod settings;

pub use account::{Account, CredentialKind};
pub use chat::{ChatDirection, ChatRecord};
pub use connection::{ConnectionSnapshot, ConnectionState, HandshakeFailure, HandshakeFailureKind};
pub use settings::{ServerSettings, TimedMessage};
