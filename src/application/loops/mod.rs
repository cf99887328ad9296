pub mod connect_to_peers;
pub mod connection_loop;
