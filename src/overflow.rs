//! Overflow accounting: ad-hoc connections allowed beyond the fixed pool

/// Tracks how many ad-hoc connections may still be created.
///
/// Not synchronized on its own; it lives inside the pool state and is only
/// touched under the state lock.
///
/// # Examples
///
/// ```
/// use elastic_connpool::OverflowController;
///
/// let mut overflow = OverflowController::new(1);
/// assert!(overflow.try_take());
/// assert!(!overflow.try_take());
///
/// overflow.give();
/// assert_eq!(overflow.remaining(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverflowController {
    remaining: usize,
    ceiling: usize,
}

impl OverflowController {
    /// Create a controller with all `ceiling` slots free
    pub fn new(ceiling: usize) -> Self {
        Self {
            remaining: ceiling,
            ceiling,
        }
    }

    /// Take one slot if any is left
    pub fn try_take(&mut self) -> bool {
        if self.remaining > 0 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }

    /// Return a slot taken by a successful [`try_take`](Self::try_take)
    pub fn give(&mut self) {
        debug_assert!(
            self.remaining < self.ceiling,
            "overflow slot returned without a matching take"
        );
        if self.remaining < self.ceiling {
            self.remaining += 1;
        } else {
            tracing::warn!(
                ceiling = self.ceiling,
                "overflow slot returned without a matching take, ignoring"
            );
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Slots currently taken by live overflow connections
    pub fn in_use(&self) -> usize {
        self.ceiling - self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_take_until_exhausted() {
        let mut overflow = OverflowController::new(2);

        assert!(overflow.try_take());
        assert!(overflow.try_take());
        assert!(!overflow.try_take());
        assert!(overflow.is_exhausted());
        assert_eq!(overflow.in_use(), 2);
    }

    #[test]
    fn test_zero_ceiling_never_hands_out() {
        let mut overflow = OverflowController::new(0);
        assert!(!overflow.try_take());
        assert_eq!(overflow.remaining(), 0);
    }

    #[test]
    fn test_conservation_under_concurrent_stress() {
        const CEILING: usize = 8;
        let overflow = Arc::new(Mutex::new(OverflowController::new(CEILING)));
        let outstanding = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let overflow = Arc::clone(&overflow);
                let outstanding = Arc::clone(&outstanding);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        let taken = {
                            let mut guard = overflow.lock();
                            let taken = guard.try_take();
                            if taken {
                                outstanding.fetch_add(1, Ordering::SeqCst);
                            }
                            let live = outstanding.load(Ordering::SeqCst);
                            assert_eq!(guard.remaining() + live, CEILING);
                            taken
                        };

                        if taken {
                            let mut guard = overflow.lock();
                            outstanding.fetch_sub(1, Ordering::SeqCst);
                            guard.give();
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let guard = overflow.lock();
        assert_eq!(guard.remaining(), CEILING);
        assert_eq!(outstanding.load(Ordering::SeqCst), 0);
    }
}
