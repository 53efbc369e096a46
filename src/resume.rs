//! RESUME — once- and multi-shot resumption objects (§4.4).
//!
//! A [`Resumption`] is a plain two-variant enum rather than the original's
//! tagged pointer: §4.4's Design Notes call the tag-bit trick "an
//! implementation choice, not a contract" and endorse a sum type for a
//! statically typed reimplementation. `Once` costs nothing beyond the bare
//! prompt pointer it already needed to keep around; `Multi` points at a
//! heap-allocated [`MultiResume`] that adds the bookkeeping multi-shot
//! reuse requires (refcount, resume count, and a lazily captured pristine
//! stack-chain save).
//!
//! Every operation that the spec's C-style API shows consuming a handle
//! (`resume`, `resume_tail`, `resume_drop`) takes `self` by value here;
//! `dup` borrows and returns an additional, independently owned handle,
//! matching `mp_resume_dup`'s "bump the refcount, hand back a second
//! reference" behavior.

use crate::diagnostics;
use crate::gstack::{self, SavedSlice};
use crate::prompt::{self, PromptInner};
use crate::{BoxAny, Error, Result};
use std::cell::Cell;
use std::ptr::NonNull;

pub struct Resumption(Repr);

enum Repr {
    Once(NonNull<PromptInner>),
    Multi(NonNull<MultiResume>),
}

struct MultiResume {
    refcount: Cell<isize>,
    resume_count: Cell<u64>,
    prompt: NonNull<PromptInner>,
    /// The resume point `prompt` carried at the instant this resumption was
    /// created, i.e. the original yield. A chain restore only copies stack
    /// bytes back into place; it has no way to undo `prompt`'s own
    /// `resume_point`/guard fields getting cleared when a run reaches a real
    /// return (every run after the first does exactly that, since each
    /// resumed run re-enters the same dynamic extent a first-time entry
    /// would). Re-armed via [`prompt::reset_resume_point`] before every
    /// resume, first included.
    origin_resume_point: NonNull<prompt::ResumePoint>,
    /// The pristine stack-chain capture, taken lazily the first time this
    /// resumption is actually shared (§4.4 "Lazy save"). `None` until then;
    /// once populated, restored before *every* subsequent resume.
    save: Cell<Option<NonNull<SaveNode>>>,
}

/// One entry of the saved chain, root-first (§4.4 "Save chain").
struct SaveNode {
    next: Option<NonNull<SaveNode>>,
    prompt: NonNull<PromptInner>,
    slice: SavedSlice,
}

impl Resumption {
    pub(crate) fn once(p: NonNull<PromptInner>) -> Resumption {
        Resumption(Repr::Once(p))
    }

    /// RESUME `dup` (§4.4): only sensible for a multi-shot resumption — a
    /// once-resumption is meant to be used exactly once.
    pub fn dup(&self) -> Result<Resumption> {
        match self.0 {
            Repr::Once(_) => {
                diagnostics::warn_usage("resume_dup called on a once-resumption");
                Err(Error::NotMulti)
            }
            Repr::Multi(r) => {
                let mr = unsafe { r.as_ref() };
                mr.refcount.set(mr.refcount.get() + 1);
                Ok(Resumption(Repr::Multi(r)))
            }
        }
    }

    /// RESUME `resume_multi` (§4.4): promotes a once-resumption in place.
    /// Idempotent on an already-multi resumption.
    pub fn to_multi(self) -> Resumption {
        match self.0 {
            Repr::Multi(_) => self,
            Repr::Once(p) => {
                let boxed = Box::new(MultiResume {
                    refcount: Cell::new(1),
                    resume_count: Cell::new(0),
                    prompt: p,
                    origin_resume_point: unsafe { prompt::resume_point_of(p) },
                    save: Cell::new(None),
                });
                Resumption(Repr::Multi(NonNull::new(Box::into_raw(boxed)).unwrap()))
            }
        }
    }

    /// RESUME `resume_count` (§4.4): the number of times this resumption
    /// (shared across every handle dup'd from it) has actually been
    /// resumed so far. Always 0 for a once-resumption, which can only ever
    /// be used a single time.
    pub fn resume_count(&self) -> u64 {
        match self.0 {
            Repr::Once(_) => 0,
            Repr::Multi(r) => unsafe { r.as_ref() }.resume_count.get(),
        }
    }

    /// RESUME `resume_should_unwind` (§4.4): a hint that this is the last
    /// outstanding handle to a resumption that has never been used — the
    /// common "the effect handler is itself unwinding, drop the captured
    /// continuation" case, where a host language might prefer to run the
    /// continuation purely to unwind it rather than actually resume it.
    pub fn should_unwind(&self) -> bool {
        match self.0 {
            Repr::Once(_) => false,
            Repr::Multi(r) => {
                let mr = unsafe { r.as_ref() };
                mr.refcount.get() == 1 && mr.resume_count.get() == 0
            }
        }
    }

    /// RESUME `resume_drop` (§4.4): release a handle without resuming it.
    pub fn drop_resumption(self) {
        match self.0 {
            Repr::Once(p) => unsafe { prompt::prompt_drop(p, false) },
            Repr::Multi(r) => unsafe { multi_drop(r) },
        }
    }

    /// RESUME `resume` (§4.4).
    pub fn resume(self, arg: BoxAny) -> BoxAny {
        match self.0 {
            Repr::Once(p) => {
                debug_assert_eq!(unsafe { prompt::refcount(p) }, 1, "a once-resumption must own its prompt uniquely");
                prompt::resume_value(p, arg)
            }
            Repr::Multi(r) => {
                let mr = unsafe { r.as_ref() };
                mr.resume_count.set(mr.resume_count.get() + 1);
                let p = unsafe { get_pristine_prompt(r) };
                prompt::resume_value(p, arg)
            }
        }
    }

    /// RESUME `resume_tail` (§4.4 "Tail resume"). See
    /// [`prompt::resume_tail_into`] for the soundness precondition this
    /// relies on: only call this directly within (or tail-chained from)
    /// the dynamic extent that produced the resumption.
    pub fn resume_tail(self, arg: BoxAny) -> ! {
        match self.0 {
            Repr::Once(p) => prompt::resume_tail_into(p, arg),
            Repr::Multi(r) => {
                let mr = unsafe { r.as_ref() };
                mr.resume_count.set(mr.resume_count.get() + 1);
                let p = unsafe { get_pristine_prompt(r) };
                prompt::resume_tail_into(p, arg)
            }
        }
    }
}

/// Restores the pristine save (if one exists and is needed) or lazily
/// takes one now, then hands back a freshly `dup`'d prompt reference for
/// this particular run, dropping `r`'s own reference in the process
/// (mirroring `mp_resume_get_prompt`).
unsafe fn get_pristine_prompt(r: NonNull<MultiResume>) -> NonNull<PromptInner> {
    let mr = unsafe { r.as_ref() };
    let p = mr.prompt;
    match mr.save.get() {
        Some(save) => unsafe { restore_chain(save) },
        None => {
            if mr.refcount.get() > 1 || unsafe { prompt::refcount(p) } > 1 {
                mr.save.set(Some(unsafe { save_chain(p) }));
            }
        }
    }
    unsafe { prompt::reset_resume_point(p, mr.origin_resume_point) };
    let dup = unsafe { prompt::prompt_dup(p) };
    unsafe { multi_drop(r) };
    dup
}

/// §4.4 "Save chain": walk `head`'s captured chain innermost-first,
/// building a root-first (outermost-first) linked list of saved slices.
unsafe fn save_chain(head: NonNull<PromptInner>) -> NonNull<SaveNode> {
    let mut sp = unsafe { prompt::resume_sp(head) };
    let mut cur = unsafe { prompt::chain_top(head) };
    let mut list: Option<NonNull<SaveNode>> = None;
    loop {
        let stack = unsafe { prompt::stack_of(cur) };
        let slice = gstack::save(stack, sp);
        let dup = unsafe { prompt::prompt_dup(cur) };
        let node = Box::new(SaveNode { next: list, prompt: dup, slice });
        list = Some(NonNull::new(Box::into_raw(node)).unwrap());
        match unsafe { prompt::chain_parent(cur) } {
            None => break,
            Some(parent) => {
                sp = unsafe { prompt::return_sp(cur) };
                cur = parent;
            }
        }
    }
    diagnostics::trace("resume: captured pristine stack chain");
    list.expect("a chain always has at least one member")
}

unsafe fn restore_chain(save: NonNull<SaveNode>) {
    let mut node = Some(save);
    while let Some(n) = node {
        let nr = unsafe { n.as_ref() };
        gstack::restore(&nr.slice);
        node = nr.next;
    }
    diagnostics::trace("resume: restored pristine stack chain");
}

unsafe fn multi_drop(r: NonNull<MultiResume>) {
    let mr = unsafe { r.as_ref() };
    let rc = mr.refcount.get();
    mr.refcount.set(rc - 1);
    if rc > 1 {
        return;
    }
    let mut node = mr.save.get();
    while let Some(n) = node {
        let owned = unsafe { Box::from_raw(n.as_ptr()) };
        unsafe { prompt::prompt_drop(owned.prompt, false) };
        node = owned.next;
    }
    unsafe { prompt::prompt_drop(mr.prompt, false) };
    drop(unsafe { Box::from_raw(r.as_ptr()) });
}
