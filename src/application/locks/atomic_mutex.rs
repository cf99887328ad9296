use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

/// An `Arc<Mutex<T>>` wrapper to make data thread-safe and easy to work with.
///
/// Access is closure-scoped, so a guard can never be held across an
/// `.await`.  Each call is one indivisible step with respect to every other
/// call on a clone of the same `AtomicMutex`.
///
/// # Examples
/// ```
/// # use remote_tasks::application::locks::AtomicMutex;
/// struct Car {
///     year: u16,
/// };
/// let atomic_car = AtomicMutex::from(Car{year: 2016});
/// atomic_car.lock(|c| {println!("year: {}", c.year)});
/// atomic_car.lock_mut(|c| {c.year = 2023});
/// assert_eq!(2023, atomic_car.lock(|c| c.year));
/// ```
///
/// A name can be provided, which shows up in trace logs of lock
/// acquisitions.
#[derive(Debug)]
pub struct AtomicMutex<T> {
    inner: Arc<Mutex<T>>,
    name: Option<String>,
}

impl<T: Default> Default for AtomicMutex<T> {
    fn default() -> Self {
        Self {
            inner: Default::default(),
            name: None,
        }
    }
}

impl<T> From<T> for AtomicMutex<T> {
    #[inline]
    fn from(t: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(t)),
            name: None,
        }
    }
}

impl<T> From<(T, &str)> for AtomicMutex<T> {
    /// Create from a value and a name.
    #[inline]
    fn from(v: (T, &str)) -> Self {
        Self {
            inner: Arc::new(Mutex::new(v.0)),
            name: Some(v.1.to_owned()),
        }
    }
}

impl<T> Clone for AtomicMutex<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            name: self.name.clone(),
        }
    }
}

impl<T> AtomicMutex<T> {
    /// Acquire lock and return a `MutexGuard`
    ///
    /// A poisoned lock is recovered: every mutation of the guarded data is a
    /// single closure, so a panic cannot leave it half-updated by a caller of
    /// [Self::lock_mut].
    pub fn lock_guard(&self) -> MutexGuard<'_, T> {
        if let Some(name) = &self.name {
            tracing::trace!("acquiring lock `{name}`");
        }
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Immutably access the data of type `T` in a closure and possibly return a result of type `R`
    pub fn lock<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let guard = self.lock_guard();
        f(&guard)
    }

    /// Mutably access the data of type `T` in a closure and possibly return a result of type `R`
    pub fn lock_mut<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut guard = self.lock_guard();
        f(&mut guard)
    }

    /// true if both refer to the same underlying data.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
