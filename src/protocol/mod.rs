//! Messages exchanged between a Caller and a Runner.

mod handshake_data;
mod message;

pub use handshake_data::HandshakeData;
pub use handshake_data::Role;
pub use message::TaskMessage;
pub use message::MAGIC_STRING_REQUEST;
pub use message::MAGIC_STRING_RESPONSE;
