//! Client orchestration.
//!
//! A [`Client`] ties a reactor, the [`ConnectionRegistry`] that validates
//! handshakes and routes messages to torrents, and the periodic control loop
//! together. Peer discovery is left to an [`Announcer`].

mod announce;
mod error;
mod registry;
mod schedule;
mod session;

pub use announce::{Announcer, NoopAnnouncer};
pub use error::ClientError;
pub use registry::ConnectionRegistry;
pub use schedule::{ControlSchedule, Tick};
pub use session::Client;
