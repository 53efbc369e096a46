//! XFER — the guarded control-transfer primitive (§4.2).
//!
//! Three operations, all `unsafe` and all confined to this module (per
//! Design Notes: "the single place where the chosen language's safety model
//! must be suspended"): `save_context`, `jump`, and `bootstrap`. Everything
//! above this module (PROMPT, RESUME) only ever calls the *checked*
//! wrapper, [`checked_jump`], never the raw per-architecture `jump`
//! directly, so the "only two legitimate jump targets" property in §4.2 is
//! enforced in exactly one place.

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", unix))] {
        #[path = "x86_64_unix.rs"]
        mod arch;
    } else if #[cfg(all(target_arch = "x86_64", windows))] {
        #[path = "x86_64_windows.rs"]
        mod arch;
    } else if #[cfg(target_arch = "aarch64")] {
        #[path = "aarch64.rs"]
        mod arch;
    } else {
        compile_error!(
            "mprompt's guarded context switch is only implemented for x86_64 (unix or windows) and aarch64; \
             see SPEC_FULL.md's \"Architecture coverage\" note"
        );
    }
}

pub(crate) use arch::JmpBuf;

use crate::diagnostics;
use std::sync::OnceLock;

/// A label captured lazily the first time its call site executes, exactly
/// like the original's `mp_return_label`/`mp_resume_label` (§4.2
/// "Guarding"). Stored already-guarded.
pub(crate) struct Label(OnceLock<usize>);

impl Label {
    pub(crate) const fn new() -> Label {
        Label(OnceLock::new())
    }

    /// Records `ip` (unguarded) as this label's value if it hasn't been set
    /// yet, and returns the guarded value either way. All call sites must
    /// in fact produce the same `ip` every time, since `save_context`'s
    /// call site is fixed in source — this just avoids assuming which
    /// invocation happens to run first.
    pub(crate) fn record_and_get(&self, ip: usize) -> usize {
        *self.0.get_or_init(|| guard(ip))
    }

    fn get(&self) -> Option<usize> {
        self.0.get().copied()
    }
}

/// The only two legitimate jump targets in the whole system (§4.2).
pub(crate) static RETURN_LABEL: Label = Label::new();
pub(crate) static RESUME_LABEL: Label = Label::new();

fn process_secret() -> usize {
    static SECRET: OnceLock<usize> = OnceLock::new();
    *SECRET.get_or_init(|| {
        use std::collections::hash_map::RandomState;
        use std::hash::{BuildHasher, Hasher};
        // `RandomState::new()` is seeded from the OS CSPRNG; hashing a
        // stack address folds in a little more per-call entropy, though a
        // single process-wide secret only needs to be unpredictable once.
        let mut hasher = RandomState::new().build_hasher();
        let sentinel = 0u8;
        hasher.write_usize(&sentinel as *const u8 as usize);
        hasher.finish() as usize
    })
}

/// Applies the process-scoped reversible transformation described in §4.2.
/// Self-inverse, so the same function serves as both `guard` and `unguard`.
pub(crate) fn guard(addr: usize) -> usize {
    addr ^ process_secret()
}

pub(crate) fn unguard(addr: usize) -> usize {
    guard(addr)
}

/// Saves the current context into `buf`. Returns `false` on the initial,
/// direct call; returns `true` when control re-enters via a matching
/// [`checked_jump`].
///
/// # Safety
/// `buf` must remain valid (and must not move) for as long as any `jump`
/// might target it.
#[inline(always)]
pub(crate) unsafe fn save_context(buf: &mut JmpBuf) -> bool {
    unsafe { arch::save_context(buf) }
}

/// Transfers control to the context saved in `buf`, after verifying that
/// `buf` actually holds the expected (guarded) instruction pointer and
/// stack pointer. A mismatch is an *integrity* violation (§7): logged and
/// the process aborts, it never propagates as a normal error.
///
/// # Safety
/// `buf` must have been populated by a previous, still-valid
/// [`save_context`] whose stack frame has not been unwound.
pub(crate) unsafe fn checked_jump(expected_label: &Label, expected_sp: usize, buf: &JmpBuf) -> ! {
    let expected_ip = match expected_label.get() {
        Some(ip) => ip,
        None => diagnostics::fatal("potential stack corruption: jump target label was never established"),
    };
    let actual_ip = buf.ip();
    let actual_sp = buf.sp();
    if unguard(expected_ip) != actual_ip {
        diagnostics::fatal(&format!(
            "potential stack corruption detected: expected ip {:#x}, but found {:#x}",
            unguard(expected_ip),
            actual_ip
        ));
    }
    if unguard(expected_sp) != actual_sp {
        diagnostics::fatal(&format!(
            "potential stack corruption detected: expected sp {:#x}, but found {:#x}",
            unguard(expected_sp),
            actual_sp
        ));
    }
    unsafe { arch::jump(buf) }
}

/// Switches onto `sp` (the top of a freshly allocated, never-yet-entered
/// stack) and calls `entry(arg)`. `entry` must never return normally — the
/// entry trampoline in `prompt.rs` always ends in a `checked_jump`.
///
/// # Safety
/// `sp` must be the top of stack memory that is mapped, writable, and not
/// concurrently in use.
pub(crate) unsafe fn bootstrap(sp: *mut u8, entry: unsafe extern "C" fn(*mut u8) -> !, arg: *mut u8) -> ! {
    unsafe { arch::bootstrap(sp, entry, arg) }
}

#[cfg(test)]
mod tests {
    use super::{guard, unguard};

    #[test]
    fn guard_is_its_own_inverse() {
        for addr in [0usize, 1, 0x7fff_0000, usize::MAX] {
            assert_eq!(unguard(guard(addr)), addr);
        }
    }

    #[test]
    fn guard_is_stable_within_a_process() {
        let addr = 0x1234_5678usize;
        assert_eq!(guard(addr), guard(addr));
    }
}
