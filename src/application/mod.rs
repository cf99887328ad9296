pub mod config;
pub mod execution;
pub mod job_queue;
pub mod locks;
pub mod loops;
pub mod network;
pub mod roles;
