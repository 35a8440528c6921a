//! Grace-period domain backing the deferred reclamation channel.

use seize::{Collector, LocalGuard};

pub use seize::Guard;

/// Shared RCU domain; one per store, shared by every thread context.
///
/// Readers pin the domain for the duration of a read section and load shared
/// pointers through the returned guard. Blocks retired into the domain are
/// recycled only after every guard that could have observed them is dropped.
/// Dropping the domain reclaims everything still retired.
pub struct RcuDomain {
    collector: Collector,
}

impl Default for RcuDomain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RcuDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcuDomain").finish_non_exhaustive()
    }
}

impl RcuDomain {
    /// Create a new domain.
    pub fn new() -> Self {
        Self { collector: Collector::new() }
    }

    /// Enter a read section.
    #[inline]
    pub fn pin(&self) -> LocalGuard<'_> {
        self.collector.enter()
    }

    /// Retire `ptr`, running `reclaim` once no reader can observe it.
    ///
    /// # Safety
    /// `ptr` must be valid for `reclaim` and unreachable for new readers.
    pub(crate) unsafe fn retire<T>(&self, ptr: *mut T, reclaim: unsafe fn(*mut T, &Collector)) {
        self.collector.retire(ptr, reclaim);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

    static DROPS: AtomicUsize = AtomicUsize::new(0);

    unsafe fn count_drop(ptr: *mut u64, _: &Collector) {
        drop(Box::from_raw(ptr));
        DROPS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn drop_reclaims_retired() {
        let domain = RcuDomain::new();
        let slot = AtomicPtr::new(Box::into_raw(Box::new(7u64)));
        {
            let guard = domain.pin();
            let p = guard.protect(&slot, Ordering::Acquire);
            assert_eq!(unsafe { *p }, 7);
            let old = slot.swap(std::ptr::null_mut(), Ordering::AcqRel);
            unsafe { domain.retire(old, count_drop) };
            // Still readable inside the section that observed it.
            assert_eq!(unsafe { *p }, 7);
        }
        drop(domain);
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    }
}
