//! Provides a simplified lock type for sharing data between tasks

mod atomic_mutex;

pub use atomic_mutex::AtomicMutex;
