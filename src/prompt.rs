//! PROMPT — prompt lifecycle and chain (§4.3).
//!
//! Owns the per-thread active chain (`CURRENT_TOP`, mirroring the
//! original's thread-local `_mp_prompt_top`), the link/unlink pair that
//! moves a prompt between the active and suspended states, and the
//! entry/yield/return dispatch built on top of [`crate::xfer`].
//!
//! A [`PromptInner`] is never heap-allocated on its own: it is written into
//! the `extra` area [`crate::gstack::alloc`] carves out of the growable
//! stack's own base, exactly as the original co-locates `mp_prompt_t` at
//! the base of its `mp_gstack_t` (§3 "Prompt" — "stack: handle to the
//! growable stack owning this prompt's frames").

use crate::diagnostics;
use crate::gstack::{self, StackHandle};
use crate::xfer::{self, JmpBuf};
use crate::BoxAny;
use crate::resume::Resumption;
use std::cell::Cell;
use std::panic::AssertUnwindSafe;
use std::ptr::NonNull;

pub(crate) type EntryFun = Box<dyn FnOnce(Prompt, BoxAny) -> BoxAny>;
pub(crate) type YieldFun = Box<dyn FnOnce(Resumption, BoxAny) -> BoxAny>;

/// A return point (§3): allocated as a local on the *parent's* stack by
/// whichever of `enter_prompt`/`resume_value`/`resume_tail_into` most
/// recently activated a prompt. Lives exactly as long as that call's own
/// stack frame — which, thanks to the setjmp/longjmp discipline in
/// `xfer`, is exactly as long as needed: the frame never actually returns
/// until the matching jump lands back in it.
pub(crate) struct ReturnPoint {
    jmp: JmpBuf,
    kind: Cell<Option<ReturnKind>>,
}

impl ReturnPoint {
    fn new() -> ReturnPoint {
        ReturnPoint { jmp: JmpBuf::uninit(), kind: Cell::new(None) }
    }
}

pub(crate) enum ReturnKind {
    Return(BoxAny),
    Exception(Box<dyn std::any::Any + Send>),
    Yield(YieldFun, BoxAny),
}

/// A resume point (§3): allocated as a local on the *prompt's own* stack,
/// inside `yield_raw`.
pub(crate) struct ResumePoint {
    jmp: JmpBuf,
    result: Cell<Option<BoxAny>>,
}

/// The prompt header (§3 "Prompt"). Embedded at the base of its own
/// growable stack; never moved.
pub(crate) struct PromptInner {
    parent: Cell<Option<NonNull<PromptInner>>>,
    top: Cell<Option<NonNull<PromptInner>>>,
    refcount: Cell<isize>,
    pub(crate) stack: StackHandle,
    return_point: Cell<Option<NonNull<ReturnPoint>>>,
    resume_point: Cell<Option<NonNull<ResumePoint>>>,
    /// Guarded expected stack pointer for the *next* permitted control
    /// transfer into this prompt (§3 `guarded_sp`).
    guarded_sp: Cell<usize>,
}

/// A non-owning, `Copy` handle to a prompt (§3, §6). Valid for as long as
/// the referenced prompt is active or held alive by some resumption; this
/// crate does not attach a `Drop` impl to `Prompt` itself — a freshly
/// [`create`]d prompt that is never entered and never explicitly dropped
/// is a resource leak, exactly as a raw `mp_prompt_t*` would be if never
/// passed to `mp_prompt_enter` or `mp_resume_drop` (see `DESIGN.md`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Prompt(pub(crate) NonNull<PromptInner>);

thread_local! {
    static CURRENT_TOP: Cell<Option<NonNull<PromptInner>>> = const { Cell::new(None) };
}

fn top() -> Option<NonNull<PromptInner>> {
    CURRENT_TOP.with(|c| c.get())
}

fn set_top(p: Option<NonNull<PromptInner>>) {
    CURRENT_TOP.with(|c| c.set(p));
}

fn is_active(p: NonNull<PromptInner>) -> bool {
    unsafe { p.as_ref().top.get().is_none() }
}

/// PROMPT `top`: the innermost active prompt on this thread, if any.
pub fn prompt_top() -> Option<Prompt> {
    top().map(Prompt)
}

/// PROMPT `parent`: with `p = None` (the C API's `NULL`), returns the top
/// of the chain; otherwise the given prompt's parent.
pub fn prompt_parent(p: Option<Prompt>) -> Option<Prompt> {
    match p {
        None => prompt_top(),
        Some(Prompt(p)) => unsafe { p.as_ref().parent.get() }.map(Prompt),
    }
}

pub(crate) fn is_ancestor(p: NonNull<PromptInner>) -> bool {
    let mut q = None;
    loop {
        q = match q {
            None => top(),
            Some(q) => unsafe { q.as_ref().parent.get() },
        };
        match q {
            None => return false,
            Some(q) if q == p => return true,
            Some(_) => continue,
        }
    }
}

/// PROMPT `create`: a fresh, suspended, "pre-initial" prompt (§3
/// "Creation").
pub fn create() -> Prompt {
    let (stack, extra) = gstack::alloc(std::mem::size_of::<PromptInner>());
    let ptr = extra.cast::<PromptInner>();
    unsafe {
        ptr.write(PromptInner {
            parent: Cell::new(None),
            top: Cell::new(None),
            refcount: Cell::new(1),
            stack,
            return_point: Cell::new(None),
            resume_point: Cell::new(None),
            guarded_sp: Cell::new(0),
        });
        let nn = NonNull::new_unchecked(ptr);
        // A fresh prompt heads a (trivial, one-element) suspended chain of
        // itself, matching the original's `p->top = p`.
        nn.as_ref().top.set(Some(nn));
        diagnostics::trace("prompt: created");
        Prompt(nn)
    }
}

/// Link: `p` (suspended) becomes active, publishing `ret` as its return
/// point. Returns `p`'s resume point (`None` for a pre-initial prompt) and
/// the guarded sp to use for the jump this call enables (§4.3 "Link").
unsafe fn link(p: NonNull<PromptInner>, ret: NonNull<ReturnPoint>) -> (Option<NonNull<ResumePoint>>, usize) {
    let pr = unsafe { p.as_ref() };
    debug_assert!(!is_active(p));
    let out_sp = pr.guarded_sp.get();
    pr.parent.set(top());
    set_top(pr.top.get());
    pr.top.set(None);
    pr.return_point.set(Some(ret));
    pr.guarded_sp.set(xfer::guard(unsafe { ret.as_ref() }.jmp.sp()));
    gstack::set_current(Some(pr.stack));
    debug_assert!(is_active(p));
    diagnostics::trace("prompt: link");
    (pr.resume_point.get(), out_sp)
}

/// Unlink: active `p` becomes suspended. Returns its return point and the
/// guarded sp to use for the jump this call enables (§4.3 "Unlink").
unsafe fn unlink(p: NonNull<PromptInner>, res: Option<NonNull<ResumePoint>>) -> (NonNull<ReturnPoint>, usize) {
    let pr = unsafe { p.as_ref() };
    debug_assert!(is_active(p));
    debug_assert!(is_ancestor(p));
    let out_sp = pr.guarded_sp.get();
    pr.top.set(top());
    set_top(pr.parent.get());
    pr.parent.set(None);
    pr.resume_point.set(res);
    if let Some(res) = res {
        pr.guarded_sp.set(xfer::guard(unsafe { res.as_ref() }.jmp.sp()));
    }
    gstack::set_current(top().map(|t| unsafe { t.as_ref() }.stack));
    debug_assert!(!is_active(p));
    diagnostics::trace("prompt: unlink");
    (pr.return_point.get().expect("unlinking a prompt with no return point"), out_sp)
}

pub(crate) unsafe fn prompt_dup(p: NonNull<PromptInner>) -> NonNull<PromptInner> {
    let pr = unsafe { p.as_ref() };
    pr.refcount.set(pr.refcount.get() + 1);
    p
}

// The accessors below exist so `resume.rs` can walk a suspended chain
// (§4.4 "Save chain"/"Restore chain") without reaching into `PromptInner`'s
// private fields directly — Rust's module privacy only opens those up to
// `prompt.rs` and its own descendants.

pub(crate) unsafe fn refcount(p: NonNull<PromptInner>) -> isize {
    unsafe { p.as_ref() }.refcount.get()
}

pub(crate) unsafe fn chain_top(p: NonNull<PromptInner>) -> NonNull<PromptInner> {
    unsafe { p.as_ref() }.top.get().expect("chain_top called on an active (non-suspended) prompt")
}

pub(crate) unsafe fn chain_parent(p: NonNull<PromptInner>) -> Option<NonNull<PromptInner>> {
    unsafe { p.as_ref() }.parent.get()
}

pub(crate) unsafe fn stack_of(p: NonNull<PromptInner>) -> StackHandle {
    unsafe { p.as_ref() }.stack
}

/// The stack pointer a suspended chain's innermost prompt will resume at.
pub(crate) unsafe fn resume_sp(p: NonNull<PromptInner>) -> *mut u8 {
    let res = unsafe { p.as_ref() }
        .resume_point
        .get()
        .expect("resume_sp called on a prompt with no resume point");
    unsafe { res.as_ref() }.jmp.sp() as *mut u8
}

/// The resume point a prompt carries right now. Used by `resume.rs` to
/// remember a multi-shot resumption's original target across however many
/// times it gets resumed (see [`reset_resume_point`]).
pub(crate) unsafe fn resume_point_of(p: NonNull<PromptInner>) -> NonNull<ResumePoint> {
    unsafe { p.as_ref() }
        .resume_point
        .get()
        .expect("resume_point_of called on a prompt with no resume point")
}

/// Re-arms `p`'s resume point and the guard protecting it (§4.4 "Restore
/// chain"). A multi-shot resumption's chain restore only copies stack bytes
/// back into place; it never touches `PromptInner` fields living outside
/// that byte range. But a run that reaches a real return unlinks `p` with
/// `resume_point = None` exactly as a never-to-be-resumed-again prompt would
/// — so every resume after the first needs this to put `p` back into the
/// same "freshly yielded" state the first resume found it in, independent of
/// however many real returns happened in between.
pub(crate) unsafe fn reset_resume_point(p: NonNull<PromptInner>, res: NonNull<ResumePoint>) {
    let pr = unsafe { p.as_ref() };
    pr.resume_point.set(Some(res));
    pr.guarded_sp.set(xfer::guard(unsafe { res.as_ref() }.jmp.sp()));
}

/// The stack pointer a suspended chain member's child will jump back to
/// when that member is eventually resumed (§4.4: "the `sp` boundary for
/// each prompt's slice is its child's return point").
pub(crate) unsafe fn return_sp(p: NonNull<PromptInner>) -> *mut u8 {
    let ret = unsafe { p.as_ref() }
        .return_point
        .get()
        .expect("return_sp called on a prompt with no return point");
    unsafe { ret.as_ref() }.jmp.sp() as *mut u8
}

/// Frees `p` and every prompt in its captured chain (§3 invariant 4, §4.3
/// "Destruction").
unsafe fn prompt_free(p: NonNull<PromptInner>, delay: bool) {
    debug_assert!(!is_active(p));
    let mut cur = unsafe { p.as_ref() }.top.get();
    while let Some(q) = cur {
        let qr = unsafe { q.as_ref() };
        debug_assert_eq!(qr.refcount.get(), 0);
        let parent = qr.parent.get();
        gstack::free(qr.stack, delay);
        if let Some(parent) = parent {
            let pr = unsafe { parent.as_ref() };
            debug_assert_eq!(pr.refcount.get(), 1);
            pr.refcount.set(pr.refcount.get() - 1);
        }
        cur = parent;
    }
    diagnostics::trace("prompt: freed");
}

pub(crate) unsafe fn prompt_drop(p: NonNull<PromptInner>, delay: bool) {
    let pr = unsafe { p.as_ref() };
    let rc = pr.refcount.get();
    pr.refcount.set(rc - 1);
    if rc <= 1 {
        unsafe { prompt_free(p, delay) };
    }
}

/// PROMPT `enter` (initial entry, §4.3). Equivalent to
/// `resume_value`/`resume_tail_into` except that the very first activation
/// of a prompt bootstraps onto a fresh stack rather than jumping to an
/// existing resume point.
pub fn enter(
    Prompt(p): Prompt,
    fun: impl FnOnce(Prompt, BoxAny) -> BoxAny + 'static,
    arg: BoxAny,
) -> BoxAny {
    debug_assert!(!is_active(p));
    debug_assert!(unsafe { p.as_ref() }.resume_point.get().is_none());
    transfer(p, TransferInput::Entry(Box::new(fun), arg))
}

/// §6 `prompt(fun, arg)`: `enter(create(), fun, arg)`.
pub fn prompt(fun: impl FnOnce(Prompt, BoxAny) -> BoxAny + 'static, arg: BoxAny) -> BoxAny {
    enter(create(), fun, arg)
}

pub(crate) fn resume_value(p: NonNull<PromptInner>, arg: BoxAny) -> BoxAny {
    transfer(p, TransferInput::Resume(arg))
}

enum TransferInput {
    Entry(EntryFun, BoxAny),
    Resume(BoxAny),
}

/// The shared core of `enter`/`resume`: save a return point, link the
/// prompt, and either jump to its resume point or bootstrap its entry
/// trampoline (§4.3 "Entry (initial)").
fn transfer(p: NonNull<PromptInner>, input: TransferInput) -> BoxAny {
    let mut ret = ReturnPoint::new();
    if unsafe { xfer::save_context(&mut ret.jmp) } {
        gstack::drain_delayed();
        return dispatch_return(p, &ret);
    }
    xfer::RETURN_LABEL.record_and_get(ret.jmp.ip());
    let ret_ptr = NonNull::from(&ret);
    let (resume_point, expected_sp) = unsafe { link(p, ret_ptr) };
    match (resume_point, input) {
        (Some(res_ptr), TransferInput::Resume(arg)) => unsafe {
            res_ptr.as_ref().result.set(Some(arg));
            xfer::checked_jump(&xfer::RESUME_LABEL, expected_sp, &res_ptr.as_ref().jmp)
        },
        (None, TransferInput::Entry(fun, arg)) => unsafe {
            let env = Box::new(EntryEnv { prompt: p, fun, arg });
            let env_ptr: *mut EntryEnv = Box::into_raw(env);
            xfer::bootstrap(p.as_ref().stack.initial_sp(), entry_trampoline, env_ptr.cast())
        },
        _ => diagnostics::fatal("mprompt: internal invariant violated — resume target/kind mismatch"),
    }
}

/// Resume by reusing `p`'s *current* return point instead of saving a fresh
/// one of our own (§4.4 "Tail resume"). Sound only when called from within
/// the dynamic extent that most recently linked `p` — directly from a
/// yield handler, or tail-chained from one — since that is what keeps
/// `p.return_point` pointing at a frame that is still alive (see
/// `DESIGN.md`'s resolution of the tail-resume open question). This is
/// what keeps a loop of tail-resumes from growing the resuming side's
/// stack: no `save_context` of our own is taken, so no new jump target
/// needs to stay alive.
///
/// Never returns to its caller through the normal call-return path:
/// control always leaves via `checked_jump`.
pub(crate) fn resume_tail_into(p: NonNull<PromptInner>, arg: BoxAny) -> ! {
    let ret = unsafe { p.as_ref() }
        .return_point
        .get()
        .unwrap_or_else(|| diagnostics::fatal("mprompt: resume_tail target has no return point"));
    let (resume_point, expected_sp) = unsafe { link(p, ret) };
    match resume_point {
        Some(res_ptr) => unsafe {
            res_ptr.as_ref().result.set(Some(arg));
            xfer::checked_jump(&xfer::RESUME_LABEL, expected_sp, &res_ptr.as_ref().jmp)
        },
        None => diagnostics::fatal("mprompt: resume_tail target has no resume point"),
    }
}

struct EntryEnv {
    prompt: NonNull<PromptInner>,
    fun: EntryFun,
    arg: BoxAny,
}

unsafe extern "C" fn entry_trampoline(envp: *mut u8) -> ! {
    let env = unsafe { Box::from_raw(envp.cast::<EntryEnv>()) };
    let EntryEnv { prompt, fun, arg } = *env;
    gstack::set_current(Some(unsafe { prompt.as_ref() }.stack));
    diagnostics::trace("prompt: entry trampoline running user function");

    let result = std::panic::catch_unwind(AssertUnwindSafe(|| fun(Prompt(prompt), arg)));

    let kind = match result {
        Ok(value) => ReturnKind::Return(value),
        Err(payload) => {
            diagnostics::trace("prompt: user function panicked, propagating across boundary");
            ReturnKind::Exception(payload)
        }
    };
    let (ret, expected_sp) = unsafe { unlink(prompt, None) };
    unsafe { ret.as_ref() }.kind.set(Some(kind));
    unsafe { xfer::checked_jump(&xfer::RETURN_LABEL, expected_sp, &ret.as_ref().jmp) }
}

/// PROMPT `yield` (§4.3 "Yield").
pub fn yield_(
    Prompt(p): Prompt,
    fun: impl FnOnce(Resumption, BoxAny) -> BoxAny + 'static,
    arg: BoxAny,
) -> BoxAny {
    if !is_ancestor(p) {
        diagnostics::warn_usage("mprompt::yield_: target prompt is not an ancestor of the active chain");
        panic!("mprompt: yield target prompt is not an ancestor of the active chain");
    }
    yield_raw(p, Box::new(fun), arg)
}

fn yield_raw(p: NonNull<PromptInner>, fun: YieldFun, arg: BoxAny) -> BoxAny {
    let mut res = ResumePoint { jmp: JmpBuf::uninit(), result: Cell::new(None) };
    if unsafe { xfer::save_context(&mut res.jmp) } {
        debug_assert!(is_active(p));
        debug_assert!(is_ancestor(p));
        diagnostics::trace("prompt: resumed from yield");
        return res.result.take().expect("a resume always supplies a result before jumping back");
    }
    xfer::RESUME_LABEL.record_and_get(res.jmp.ip());
    let res_ptr = NonNull::from(&res);
    let (ret, expected_sp) = unsafe { unlink(p, Some(res_ptr)) };
    unsafe { ret.as_ref() }.kind.set(Some(ReturnKind::Yield(fun, arg)));
    diagnostics::trace("prompt: yielding");
    unsafe { xfer::checked_jump(&xfer::RETURN_LABEL, expected_sp, &ret.as_ref().jmp) }
}

/// Consults `ret.kind` and produces the value of the corresponding
/// `enter`/`resume` call (§4.3 "Return dispatch").
fn dispatch_return(p: NonNull<PromptInner>, ret: &ReturnPoint) -> BoxAny {
    match ret.kind.take().expect("a return point always carries a kind when jumped to") {
        ReturnKind::Return(value) => {
            unsafe { prompt_drop(p, false) };
            value
        }
        ReturnKind::Exception(payload) => {
            unsafe { prompt_drop(p, true) };
            std::panic::resume_unwind(payload)
        }
        ReturnKind::Yield(fun, arg) => {
            let resumption = Resumption::once(p);
            fun(resumption, arg)
        }
    }
}
