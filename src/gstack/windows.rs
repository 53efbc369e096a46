//! Windows backend for GSTACK: `VirtualAlloc(MEM_RESERVE)` followed by
//! committing only as many bytes as `mod.rs` asks for (just the caller's
//! `extra` header under `stack_use_overcommit`, a larger
//! `stack_initial_commit_bytes` slice otherwise), and
//! `VirtualProtect(PAGE_NOACCESS)` for the guard regions. Unlike Unix,
//! Windows genuinely distinguishes reserved from committed memory, so the
//! `len` chosen by `mod.rs` has real effect here (see `SPEC_FULL.md`).

use crate::diagnostics;
use std::ffi::c_void;
use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, VirtualProtect, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE,
    PAGE_NOACCESS, PAGE_READWRITE,
};

pub(super) fn page_size() -> usize {
    use windows_sys::Win32::System::SystemInformation::GetSystemInfo;
    use windows_sys::Win32::System::SystemInformation::SYSTEM_INFO;
    unsafe {
        let mut info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut info);
        info.dwPageSize as usize
    }
}

pub(super) fn reserve(size: usize) -> *mut u8 {
    unsafe { VirtualAlloc(std::ptr::null(), size, MEM_RESERVE, PAGE_READWRITE).cast() }
}

pub(super) fn commit(ptr: *mut u8, len: usize, _overcommit: bool) {
    unsafe {
        let region = VirtualAlloc(ptr.cast::<c_void>(), len, MEM_COMMIT, PAGE_READWRITE);
        if region.is_null() {
            diagnostics::trace("gstack: VirtualAlloc(MEM_COMMIT) failed");
        } else {
            std::ptr::write_bytes(ptr, 0, len);
        }
    }
}

pub(super) fn protect_guard(ptr: *mut u8, len: usize) {
    if len == 0 {
        return;
    }
    unsafe {
        // The guard region must be committed before VirtualProtect can mark
        // it PAGE_NOACCESS.
        if VirtualAlloc(ptr.cast::<c_void>(), len, MEM_COMMIT, PAGE_READWRITE).is_null() {
            diagnostics::trace("gstack: VirtualAlloc(guard commit) failed");
            return;
        }
        let mut old_protect = 0u32;
        if VirtualProtect(ptr.cast(), len, PAGE_NOACCESS, &mut old_protect) == 0 {
            diagnostics::trace("gstack: VirtualProtect(guard) failed");
        }
    }
}

pub(super) fn release(ptr: *mut u8, _size: usize) {
    unsafe {
        let _ = VirtualFree(ptr.cast::<c_void>(), 0, MEM_RELEASE);
    }
}
