//! GSTACK — the growable-stack allocator (§4.1).
//!
//! Hands out large, page-aligned, guard-flanked stack regions and carves a
//! small `extra` area out of their base so a caller (PROMPT) can co-locate
//! its own header without a second allocation. Saves and restores are
//! *position-dependent*: a restored slice is written back to the exact
//! virtual addresses it was copied from, which is what lets captured
//! pointers into a resumed stack stay valid (§4.1 "Key properties").
//!
//! Per `SPEC_FULL.md`, the reservation/commit strategy is deliberately the
//! simplest one that satisfies this contract: one up-front mapping per
//! stack, relying on the OS's own lazy physical-page backing rather than a
//! guard-page-fault-driven incremental committer. That backend is named in
//! §1 as an out-of-scope collaborator; this module is "an allocator
//! producing growable stacks of known size", nothing more.

mod cache;
#[cfg(unix)]
#[path = "unix.rs"]
mod imp;
#[cfg(windows)]
#[path = "windows.rs"]
mod imp;

use crate::config;
use crate::diagnostics;
use std::cell::Cell;
use std::ptr::NonNull;

/// Bookkeeping for one growable stack. Allocated on the heap, *separate*
/// from the mmap'd region it describes (§4.1 mirrors the original's
/// comment: "For security we allocate this separately from the actual
/// stack.").
pub(crate) struct Gstack {
    /// Full reserved region, including both guard gaps.
    full: *mut u8,
    full_size: usize,
    /// Usable region inside `full` (excludes both gaps). The stack's
    /// initial (highest) stack pointer is `usable + usable_size`; it grows
    /// towards `usable`.
    usable: *mut u8,
    usable_size: usize,
    /// Bytes of `usable`, from its base, reserved for the caller's `extra`
    /// header.
    extra_size: usize,
    /// Current estimated committed length from `usable`'s base, for
    /// diagnostics only (see `stack_use_overcommit`).
    committed: Cell<usize>,
    /// Intrusive link used by the per-thread cache and the delayed-release
    /// queue; never both at once.
    next: Cell<Option<StackHandle>>,
}

/// An owning handle to a [`Gstack`]. Cheap to copy (it's a pointer); the
/// crate's invariants ensure at most one logical owner walks it at a time
/// except while it sits in the free-list/cache, which is single-threaded by
/// construction (gstacks never cross threads, §5).
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct StackHandle(NonNull<Gstack>);

impl StackHandle {
    fn as_ref(&self) -> &Gstack {
        unsafe { self.0.as_ref() }
    }

    /// The stack's initial (highest) stack pointer — the value execution
    /// starts with before anything is pushed.
    pub(crate) fn initial_sp(&self) -> *mut u8 {
        let g = self.as_ref();
        unsafe { g.usable.add(g.usable_size) }
    }

    /// Lowest legal address for this stack's live data (the end of the
    /// extra area; below this is the lower guard page).
    pub(crate) fn floor(&self) -> *mut u8 {
        let g = self.as_ref();
        unsafe { g.usable.add(g.extra_size) }
    }

    /// True iff `sp` lies within `[floor(), initial_sp()]`, the bound §8
    /// property 8 requires of every resume point.
    pub(crate) fn contains_sp(&self, sp: *mut u8) -> bool {
        (self.floor() as usize..=self.initial_sp() as usize).contains(&(sp as usize))
    }
}

/// A byte-exact copy of a contiguous, currently-live span of a growable
/// stack, plus the address it must be written back to (§3 "Saved stack
/// slice").
pub(crate) struct SavedSlice {
    handle: StackHandle,
    /// Original (and, on restore, destination) address of the slice.
    addr: *mut u8,
    data: Box<[u8]>,
}

impl SavedSlice {
    pub(crate) fn handle(&self) -> StackHandle {
        self.handle
    }
}

// SavedSlice and StackHandle point at raw, thread-affine memory; they are
// never sent across threads (§5 "Thread affinity"), so no Send/Sync impls.

/// GSTACK `alloc`: obtain a stack region of the configured total size, with
/// `extra_bytes` carved out for the caller's own header. Returns the handle
/// and a pointer to the extra area.
pub(crate) fn alloc(extra_bytes: usize) -> (StackHandle, *mut u8) {
    if let Some(handle) = cache::take() {
        let extra_ptr = handle.as_ref().usable;
        debug_assert!(handle.as_ref().extra_size >= extra_bytes);
        diagnostics::trace("gstack: reused cached stack");
        return (handle, extra_ptr);
    }

    let cfg = config::get();
    let page = imp::page_size();
    let gap = round_up(cfg.stack_gap_bytes.max(page), page);
    let extra_size = round_up(extra_bytes, 16);
    let usable_size = round_up(cfg.stack_total_bytes, page);
    let full_size = usable_size + 2 * gap;

    let full = imp::reserve(full_size);
    if full.is_null() {
        diagnostics::fatal("gstack: failed to reserve stack region (out of memory)");
    }
    let usable = unsafe { full.add(gap) };

    let initial_commit = if cfg.stack_use_overcommit {
        // Under overcommit the whole reservation is already addressable —
        // only the caller's own `extra` header needs to be touched up
        // front, matching §4.1 "committed memory grows on demand". The
        // rest of the stack stays lazily backed until the guest actually
        // pushes into it.
        round_up(extra_size, page).min(usable_size)
    } else {
        round_up(cfg.stack_initial_commit_bytes.max(extra_size), page)
            .min(usable_size)
    };
    imp::commit(usable, initial_commit, cfg.stack_use_overcommit);
    imp::protect_guard(full, gap);
    imp::protect_guard(unsafe { full.add(gap + usable_size) }, gap);

    let meta = Box::new(Gstack {
        full,
        full_size,
        usable,
        usable_size,
        extra_size,
        committed: Cell::new(initial_commit),
        next: Cell::new(None),
    });
    let handle = StackHandle(NonNull::new(Box::into_raw(meta)).unwrap());
    diagnostics::trace("gstack: allocated fresh stack");
    (handle, usable)
}

/// GSTACK `free`: return a stack to the per-thread cache, or release it
/// back to the OS. `delay` defers the OS release (never the cache
/// insertion, which is always safe) until `drain_delayed` is next called —
/// used while an exception is still unwinding across the stack (§4.1).
pub(crate) fn free(handle: StackHandle, delay: bool) {
    if delay {
        cache::delay(handle);
        return;
    }
    if config::get().gpool_enable && cache::offer(handle) {
        diagnostics::trace("gstack: released stack to cache");
        return;
    }
    release_now(handle);
}

pub(crate) fn release_now(handle: StackHandle) {
    let g = handle.as_ref();
    imp::release(g.full, g.full_size);
    // SAFETY: handle uniquely owned the `Gstack` at this point; nothing
    // else can reference it once unmapped.
    unsafe { drop(Box::from_raw(handle.0.as_ptr())) };
}

/// Flushes both the delayed-release queue and, if the cache has grown past
/// its configured size, the oldest cached stacks. Called at every
/// entry/resume boundary (§5 "Resource policies").
pub(crate) fn drain_delayed() {
    cache::drain_delayed_into(release_now);
}

/// Drains the entire per-thread cache. Called on thread exit (§4.1).
pub(crate) fn clear_cache() {
    cache::clear(release_now);
}

/// GSTACK `save`: copy the live portion of `handle`'s stack, from `sp` up
/// to the stack's initial (highest) stack pointer, into a fresh buffer.
pub(crate) fn save(handle: StackHandle, sp: *mut u8) -> SavedSlice {
    debug_assert!(handle.contains_sp(sp));
    let top = handle.initial_sp();
    let len = top as usize - sp as usize;
    let mut data = vec![0u8; len].into_boxed_slice();
    unsafe { std::ptr::copy_nonoverlapping(sp, data.as_mut_ptr(), len) };
    diagnostics::trace("gstack: saved live stack slice");
    SavedSlice {
        handle,
        addr: sp,
        data,
    }
}

/// GSTACK `restore`: write a saved slice back to the exact address range it
/// was copied from.
pub(crate) fn restore(slice: &SavedSlice) {
    unsafe {
        std::ptr::copy_nonoverlapping(slice.data.as_ptr(), slice.addr, slice.data.len());
    }
    diagnostics::trace("gstack: restored live stack slice");
}

/// GSTACK `current`: the stack handle of the prompt currently executing on
/// this thread, maintained by `prompt::link`/`prompt::unlink` (this mirrors
/// a layering quirk in the original implementation, where
/// `mp_gstack_current` is actually defined in `mprompt.c` alongside the
/// prompt chain rather than in the gstack module proper).
thread_local! {
    static CURRENT: Cell<Option<StackHandle>> = const { Cell::new(None) };
}

pub(crate) fn current() -> Option<StackHandle> {
    CURRENT.with(|c| c.get())
}

pub(crate) fn set_current(handle: Option<StackHandle>) {
    CURRENT.with(|c| c.set(handle));
}

fn round_up(v: usize, align: usize) -> usize {
    (v + (align - 1)) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::round_up;

    #[test]
    fn round_up_passes_already_aligned_values_through() {
        assert_eq!(round_up(0, 16), 0);
        assert_eq!(round_up(16, 16), 16);
        assert_eq!(round_up(4096, 4096), 4096);
    }

    #[test]
    fn round_up_rounds_toward_the_next_multiple() {
        assert_eq!(round_up(1, 16), 16);
        assert_eq!(round_up(17, 16), 32);
        assert_eq!(round_up(1, 4096), 4096);
        assert_eq!(round_up(4097, 4096), 8192);
    }
}
