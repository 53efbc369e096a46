//! Unix backend for GSTACK: a single `mmap` reservation per stack, guard
//! pages carved out with `mprotect(PROT_NONE)`. Grounded on the
//! `CustomStackCreator` pattern in the teacher's own
//! `tests/all/stack_creator.rs` (page-aligned `mmap`, a guard page via
//! `rustix::mm::mprotect`; `mmap(MAP_ANONYMOUS)` itself already hands back
//! zeroed memory, so there is no separate zero-fill step).

use crate::diagnostics;
use rustix::mm::{MapFlags, MprotectFlags, ProtFlags};
use std::ptr;

pub(super) fn page_size() -> usize {
    rustix::param::page_size()
}

/// Reserve `size` bytes of address space, usable immediately (backed
/// lazily by the OS — see `SPEC_FULL.md`'s note on `stack_use_overcommit`).
pub(super) fn reserve(size: usize) -> *mut u8 {
    let flags = MapFlags::PRIVATE | MapFlags::NORESERVE;
    unsafe {
        match rustix::mm::mmap_anonymous(ptr::null_mut(), size, ProtFlags::READ | ProtFlags::WRITE, flags)
        {
            Ok(ptr) => ptr.cast(),
            Err(err) => {
                diagnostics::trace(&format!("gstack: mmap failed: {err}"));
                ptr::null_mut()
            }
        }
    }
}

/// No-op on Unix: `reserve`'s `mmap(MAP_ANONYMOUS)` already hands back
/// read/write, zero-filled pages for the whole region, and the kernel
/// backs them with physical memory lazily on first touch regardless of
/// whether this function runs. `overcommit` is accepted only for parity
/// with the `windows` backend, which genuinely distinguishes the two
/// paths.
pub(super) fn commit(_ptr: *mut u8, _len: usize, _overcommit: bool) {}

pub(super) fn protect_guard(ptr: *mut u8, len: usize) {
    if len == 0 {
        return;
    }
    unsafe {
        if let Err(err) = rustix::mm::mprotect(ptr.cast(), len, MprotectFlags::empty()) {
            diagnostics::trace(&format!("gstack: mprotect(guard) failed: {err}"));
        }
    }
}

pub(super) fn release(ptr: *mut u8, size: usize) {
    unsafe {
        let _ = rustix::mm::munmap(ptr.cast(), size);
    }
}
