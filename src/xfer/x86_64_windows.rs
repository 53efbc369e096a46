//! x86_64 Windows (win64) backend for XFER.
//!
//! Same minimal setjmp/longjmp structure as `x86_64_unix.rs`, adjusted for
//! the win64 calling convention: arguments in `rcx`/`rdx`/`r8`, and a wider
//! callee-saved set (`rbx`, `rbp`, `rdi`, `rsi`, `r12`-`r15`). `bootstrap`
//! additionally reserves the 32-byte shadow space win64 requires of every
//! call site, following the stack layout documented in
//! `examples/other_examples/...k23__libs-fiber-src-arch-x86_64_windows.rs.rs`.
//!
//! Known simplification (see `SPEC_FULL.md`): the non-volatile XMM
//! registers (`xmm6`-`xmm15`) are not preserved across a context switch.
//! This is safe for this crate's own code, which never uses them across a
//! `yield`/`resume` boundary, but a host entry function that relies on
//! SSE state surviving a suspension would need this extended. No call site
//! in this crate does.

use core::arch::naked_asm;

#[repr(C)]
pub(crate) struct JmpBuf {
    rbx: usize,
    rbp: usize,
    rdi: usize,
    rsi: usize,
    r12: usize,
    r13: usize,
    r14: usize,
    r15: usize,
    sp: usize,
    ip: usize,
}

impl JmpBuf {
    pub(crate) const fn uninit() -> JmpBuf {
        JmpBuf {
            rbx: 0,
            rbp: 0,
            rdi: 0,
            rsi: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            sp: 0,
            ip: 0,
        }
    }

    pub(crate) fn ip(&self) -> usize {
        self.ip
    }

    pub(crate) fn sp(&self) -> usize {
        self.sp
    }
}

#[unsafe(naked)]
unsafe extern "win64" fn save_context_raw(_buf: *mut JmpBuf) -> u64 {
    naked_asm!(
        "mov [rcx + 0], rbx",
        "mov [rcx + 8], rbp",
        "mov [rcx + 16], rdi",
        "mov [rcx + 24], rsi",
        "mov [rcx + 32], r12",
        "mov [rcx + 40], r13",
        "mov [rcx + 48], r14",
        "mov [rcx + 56], r15",
        "lea rax, [rsp + 8]",
        "mov [rcx + 64], rax",
        "mov rax, [rsp]",
        "mov [rcx + 72], rax",
        "xor eax, eax",
        "ret",
    )
}

#[unsafe(naked)]
unsafe extern "win64" fn jump_raw(_buf: *const JmpBuf) -> ! {
    naked_asm!(
        "mov rbx, [rcx + 0]",
        "mov rbp, [rcx + 8]",
        "mov rdi, [rcx + 16]",
        "mov rsi, [rcx + 24]",
        "mov r12, [rcx + 32]",
        "mov r13, [rcx + 40]",
        "mov r14, [rcx + 48]",
        "mov r15, [rcx + 56]",
        "mov rsp, [rcx + 64]",
        "mov r11, [rcx + 72]",
        "mov eax, 1",
        "jmp r11",
    )
}

#[unsafe(naked)]
unsafe extern "win64" fn bootstrap_raw(
    _sp: *mut u8,
    _entry: unsafe extern "C" fn(*mut u8) -> !,
    _arg: *mut u8,
) -> ! {
    naked_asm!(
        "mov rsp, rcx",
        "and rsp, -16",
        "sub rsp, 32",
        "mov rcx, r8",
        "call rdx",
        "ud2",
    )
}

#[inline(always)]
pub(super) unsafe fn save_context(buf: &mut JmpBuf) -> bool {
    unsafe { save_context_raw(buf as *mut JmpBuf) != 0 }
}

#[inline(always)]
pub(super) unsafe fn jump(buf: &JmpBuf) -> ! {
    unsafe { jump_raw(buf as *const JmpBuf) }
}

#[inline(always)]
pub(super) unsafe fn bootstrap(sp: *mut u8, entry: unsafe extern "C" fn(*mut u8) -> !, arg: *mut u8) -> ! {
    unsafe { bootstrap_raw(sp, entry, arg) }
}
