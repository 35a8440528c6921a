use std::alloc::{self, Layout};
use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use seize::{Collector, LocalGuard};
use tracing::{trace, warn};

use crate::{AllocError, MemStats, MemTag, RcuDomain, ThreadConfig, ThreadContext, ALLOC_ALIGN};

const POISON: u8 = 0xA5;

/// A block waiting for its grace period.
struct Limbo {
    ptr: NonNull<u8>,
    size: usize,
    tag: MemTag,
    stats: Arc<MemStats>,
}

// SAFETY: the block is unreachable once retired; only the reclaimer touches it.
unsafe impl Send for Limbo {}

unsafe fn reclaim_limbo(limbo: *mut Limbo, _: &Collector) {
    let limbo = Box::from_raw(limbo);
    // Layout was validated when the block was allocated.
    let layout = Layout::from_size_align_unchecked(limbo.size, ALLOC_ALIGN);
    alloc::dealloc(limbo.ptr.as_ptr(), layout);
    limbo.stats.record_reclaim(limbo.tag, limbo.size);
}

/// Per-thread context over the global allocator.
///
/// Not `Sync`: each thread builds its own from the shared domain and stats.
pub struct ThreadInfo {
    domain: Arc<RcuDomain>,
    stats: Arc<MemStats>,
    config: ThreadConfig,
    _not_sync: PhantomData<Cell<()>>,
}

impl ThreadInfo {
    /// Create a context with its own accounting.
    pub fn new(domain: Arc<RcuDomain>, config: ThreadConfig) -> Self {
        Self::with_stats(domain, config, Arc::new(MemStats::new()))
    }

    /// Create a context sharing `stats` with other threads.
    pub fn with_stats(domain: Arc<RcuDomain>, config: ThreadConfig, stats: Arc<MemStats>) -> Self {
        Self { domain, stats, config, _not_sync: PhantomData }
    }

    /// Shared accounting.
    pub fn stats(&self) -> &Arc<MemStats> {
        &self.stats
    }

    /// Shared RCU domain.
    pub fn domain(&self) -> &Arc<RcuDomain> {
        &self.domain
    }

    /// Enter a read section on the shared domain.
    pub fn pin(&self) -> LocalGuard<'_> {
        self.domain.pin()
    }

    fn layout(size: usize) -> Result<Layout, AllocError> {
        if size == 0 {
            return Err(AllocError::ZeroSize);
        }
        Layout::from_size_align(size, ALLOC_ALIGN).map_err(|_| AllocError::Layout { size })
    }

    fn check_limit(&self, size: usize, tag: MemTag) -> Result<(), AllocError> {
        let Some(limit) = self.config.alloc_limit else {
            return Ok(());
        };
        if tag != MemTag::Value {
            return Ok(());
        }
        let live = self.stats.live_bytes(tag) as usize;
        if live + size > limit {
            warn!(size, limit, live, "allocation limit reached");
            return Err(AllocError::LimitExceeded { size, limit, live });
        }
        Ok(())
    }
}

impl ThreadContext for ThreadInfo {
    fn allocate(&self, size: usize, tag: MemTag) -> Result<NonNull<u8>, AllocError> {
        let layout = Self::layout(size)?;
        self.check_limit(size, tag)?;
        // SAFETY: layout has non-zero size.
        let ptr = NonNull::new(unsafe { alloc::alloc(layout) }).ok_or(AllocError::OutOfMemory { size })?;
        self.stats.record_alloc(tag, size);
        trace!(size, ?tag, "allocate");
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, tag: MemTag) {
        trace!(size, ?tag, "deallocate");
        if self.config.poison_freed {
            ptr::write_bytes(ptr.as_ptr(), POISON, size);
        }
        let layout = Layout::from_size_align_unchecked(size, ALLOC_ALIGN);
        alloc::dealloc(ptr.as_ptr(), layout);
        self.stats.record_free(tag, size);
    }

    unsafe fn deallocate_rcu(&self, ptr: NonNull<u8>, size: usize, tag: MemTag) {
        trace!(size, ?tag, "deallocate_rcu");
        self.stats.record_retire(tag, size);
        let limbo = Box::new(Limbo { ptr, size, tag, stats: Arc::clone(&self.stats) });
        self.domain.retire(Box::into_raw(limbo), reclaim_limbo);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(config: ThreadConfig) -> ThreadInfo {
        ThreadInfo::new(Arc::new(RcuDomain::new()), config)
    }

    #[test]
    fn allocate_and_free_immediately() {
        let ti = context(ThreadConfig { poison_freed: true, ..Default::default() });
        let p = ti.allocate(24, MemTag::Value).unwrap();
        assert_eq!(p.as_ptr() as usize % ALLOC_ALIGN, 0);
        unsafe { ti.deallocate(p, 24, MemTag::Value) };
        let snap = ti.stats().snapshot(MemTag::Value);
        assert_eq!(snap.allocated_bytes, 24);
        assert_eq!(snap.freed_bytes, 24);
        assert_eq!(snap.live_bytes(), 0);
    }

    #[test]
    fn zero_size_rejected() {
        let ti = context(ThreadConfig::default());
        assert_eq!(ti.allocate(0, MemTag::Value), Err(AllocError::ZeroSize));
    }

    #[test]
    fn limit_applies_to_value_tag_only() {
        let ti = context(ThreadConfig::with_limit(32));
        let a = ti.allocate(24, MemTag::Value).unwrap();
        let err = ti.allocate(16, MemTag::Value).unwrap_err();
        assert_eq!(err, AllocError::LimitExceeded { size: 16, limit: 32, live: 24 });
        let n = ti.allocate(64, MemTag::Node).unwrap();
        unsafe {
            ti.deallocate(a, 24, MemTag::Value);
            ti.deallocate(n, 64, MemTag::Node);
        }
        assert!(ti.allocate(32, MemTag::Value).map(|p| unsafe { ti.deallocate(p, 32, MemTag::Value) }).is_ok());
    }

    #[test]
    fn deferred_free_waits_for_pinned_reader() {
        use std::sync::mpsc;
        use std::thread;

        const BLOCKS: usize = 10_000;
        let domain = Arc::new(RcuDomain::new());
        let ti = ThreadInfo::new(Arc::clone(&domain), ThreadConfig::default());
        let retire_many = |ti: &ThreadInfo| {
            for _ in 0..BLOCKS {
                let p = ti.allocate(16, MemTag::Value).unwrap();
                unsafe { ti.deallocate_rcu(p, 16, MemTag::Value) };
            }
        };

        let (pinned_tx, pinned_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let reader = {
            let domain = Arc::clone(&domain);
            thread::spawn(move || {
                let _guard = domain.pin();
                pinned_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
        };
        pinned_rx.recv().unwrap();

        retire_many(&ti);
        let snap = ti.stats().snapshot(MemTag::Value);
        assert_eq!(snap.retired_bytes, (BLOCKS * 16) as u64);
        assert_eq!(snap.reclaimed_bytes, 0, "reclaimed while a reader was pinned");

        release_tx.send(()).unwrap();
        reader.join().unwrap();
        retire_many(&ti);
        assert!(ti.stats().snapshot(MemTag::Value).reclaimed_bytes > 0);
    }

    #[test]
    fn deferred_free_reclaimed_after_domain_drop() {
        let domain = Arc::new(RcuDomain::new());
        let stats = Arc::new(MemStats::new());
        {
            let ti = ThreadInfo::with_stats(Arc::clone(&domain), ThreadConfig::default(), Arc::clone(&stats));
            let p = ti.allocate(40, MemTag::Value).unwrap();
            unsafe { ti.deallocate_rcu(p, 40, MemTag::Value) };
            assert_eq!(stats.snapshot(MemTag::Value).retired_bytes, 40);
        }
        drop(domain);
        let snap = stats.snapshot(MemTag::Value);
        assert_eq!(snap.reclaimed_bytes, 40);
        assert_eq!(snap.allocated_bytes, snap.freed_bytes + snap.reclaimed_bytes);
    }
}
