//! Per-thread stack cache and delayed-release queue (§4.1, §5 "Resource
//! policies"). Both lists are singly-linked through [`Gstack::next`] so
//! no secondary allocation is needed to manage them.

use super::StackHandle;
use crate::config;
use std::cell::{Cell, RefCell};

struct ThreadCache {
    free: Cell<Option<StackHandle>>,
    free_len: Cell<usize>,
    delayed: Cell<Option<StackHandle>>,
}

impl ThreadCache {
    const fn new() -> ThreadCache {
        ThreadCache {
            free: Cell::new(None),
            free_len: Cell::new(0),
            delayed: Cell::new(None),
        }
    }
}

thread_local! {
    // RefCell isn't strictly needed since every field is already a Cell,
    // but the Drop impl below needs a place to hang the drain-on-exit
    // behaviour off of.
    static CACHE: RefCell<ThreadCache> = const { RefCell::new(ThreadCache::new()) };
    static DRAIN_ON_EXIT: DrainGuard = const { DrainGuard };
}

/// Dropped when the owning thread exits; its only job is to force the
/// `CACHE` thread-local's destructor to actually run the drain instead of
/// just deallocating the list nodes.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        clear(super::release_now);
    }
}

fn touch_drain_guard() {
    DRAIN_ON_EXIT.with(|_| {});
}

pub(super) fn take() -> Option<StackHandle> {
    touch_drain_guard();
    CACHE.with(|c| {
        let c = c.borrow();
        let head = c.free.get()?;
        let next = head.as_ref().next.get();
        c.free.set(next);
        c.free_len.set(c.free_len.get().saturating_sub(1));
        head.as_ref().next.set(None);
        Some(head)
    })
}

/// Offers `handle` to the cache; returns `true` if accepted (caller must
/// not release it), `false` if the cache is already at
/// `stack_cache_count` (caller should release it to the OS instead).
pub(super) fn offer(handle: StackHandle) -> bool {
    touch_drain_guard();
    CACHE.with(|c| {
        let c = c.borrow();
        if c.free_len.get() >= config::get().stack_cache_count {
            return false;
        }
        handle.as_ref().next.set(c.free.get());
        c.free.set(Some(handle));
        c.free_len.set(c.free_len.get() + 1);
        true
    })
}

pub(super) fn delay(handle: StackHandle) {
    touch_drain_guard();
    CACHE.with(|c| {
        let c = c.borrow();
        handle.as_ref().next.set(c.delayed.get());
        c.delayed.set(Some(handle));
    });
}

pub(super) fn drain_delayed_into(mut release: impl FnMut(StackHandle)) {
    CACHE.with(|c| {
        let mut head = c.borrow().delayed.take();
        while let Some(h) = head {
            let next = h.as_ref().next.get();
            release(h);
            head = next;
        }
    });
}

pub(super) fn clear(mut release: impl FnMut(StackHandle)) {
    CACHE.with(|c| {
        let c = c.borrow();
        let mut head = c.free.take();
        c.free_len.set(0);
        while let Some(h) = head {
            let next = h.as_ref().next.get();
            release(h);
            head = next;
        }
        let mut head = c.delayed.take();
        while let Some(h) = head {
            let next = h.as_ref().next.get();
            release(h);
            head = next;
        }
    });
}
