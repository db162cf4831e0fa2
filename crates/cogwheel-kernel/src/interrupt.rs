//! [`InterruptSignal`] – shared level-triggered cancellation flag.
//!
//! A command owns a private signal; a command group re-binds every descendant
//! to the group's signal so one `set` reaches the whole tree.  Clones share
//! the same flag, so the handle can be passed to another thread (e.g. a Ctrl-C
//! handler) and raised from there.
//!
//! The issuer only ever sets the flag.  Clearing is reserved for the
//! scheduler, which does it when a top-level command starts and when a
//! suspended persistent command resumes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable handle to a shared interrupt flag.
///
/// # Example
///
/// ```
/// use cogwheel_kernel::InterruptSignal;
///
/// let signal = InterruptSignal::new();
/// let issuer = signal.clone();
///
/// issuer.set();
/// issuer.set(); // idempotent
/// assert!(signal.is_set());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InterruptSignal {
    flag: Arc<AtomicBool>,
}

impl InterruptSignal {
    /// Create a new, cleared signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal.  Raising an already-raised signal has no effect.
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Observe the signal without changing it.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Lower the signal.  Only scheduler code calls this.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// `true` when both handles refer to the same underlying flag.
    pub fn same_as(&self, other: &InterruptSignal) -> bool {
        Arc::ptr_eq(&self.flag, &other.flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_signal_is_clear() {
        assert!(!InterruptSignal::new().is_set());
    }

    #[test]
    fn clones_share_the_flag() {
        let a = InterruptSignal::new();
        let b = a.clone();
        b.set();
        assert!(a.is_set());
        assert!(a.same_as(&b));
        a.clear();
        assert!(!b.is_set());
    }

    #[test]
    fn set_twice_equals_set_once() {
        let once = InterruptSignal::new();
        once.set();
        let twice = InterruptSignal::new();
        twice.set();
        twice.set();
        assert_eq!(once.is_set(), twice.is_set());
    }

    #[test]
    fn independent_signals_are_distinct() {
        let a = InterruptSignal::new();
        let b = InterruptSignal::new();
        a.set();
        assert!(!b.is_set());
        assert!(!a.same_as(&b));
    }

    #[test]
    fn raised_from_another_thread() {
        let signal = InterruptSignal::new();
        let issuer = signal.clone();
        std::thread::spawn(move || issuer.set()).join().unwrap();
        assert!(signal.is_set());
    }
}
