//! Non-blocking connection multiplexing.
//!
//! [`Reactor`] owns every peer socket. Callers talk to it through
//! [`Transport`] (queue a payload, close a connection) and
//! [`Reactor::connect`]; it talks back through [`ReactorListener`].

mod error;
mod listener;
mod reactor;
mod worker;

pub use error::NetError;
pub use listener::{ConnectionId, ReactorListener, Transport};
pub use reactor::Reactor;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;
