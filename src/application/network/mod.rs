//! Transport plumbing: the connection abstraction, the wire framing and
//! handshake, and the per-connection job ownership index.

pub mod connection;
pub mod framing;
pub mod owner_index;

pub use connection::Connection;
pub use connection::ConnectionClosedError;
pub use connection::ConnectionId;
pub use connection::ConnectionLink;
pub use connection::ConnectionPhase;
pub use owner_index::DuplicateOwnershipError;
pub use owner_index::OwnerIndex;
