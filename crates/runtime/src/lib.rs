//! Runtime plumbing for driving a Playwright driver process: discovery,
//! process lifecycle, stdio framing, and the protocol connection with its
//! object registry.

pub mod channel;
pub mod channel_owner;
pub mod connection;
pub mod driver;
pub mod error;
pub mod object_store;
pub mod server;
pub mod transport;

pub use channel::Channel;
pub use channel_owner::{ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection};
pub use connection::{Connection, ConnectionLike, ObjectFactory};
pub use error::{Error, Result};
pub use server::DriverProcess;
pub use transport::{PipeTransport, TransportParts};
