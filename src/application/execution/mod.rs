//! Runner-side execution of jobs, and the progress relay both sides use.

mod adapter;
pub mod relay;
mod work;

pub use adapter::execute;
pub use adapter::ExecutionOwners;
pub use adapter::ExecutionTicket;
pub use relay::relay_report;
pub use relay::Delivery;
pub use relay::ProgressReporter;
pub use work::ConstantWork;
pub use work::Work;
pub use work::WorkResult;
