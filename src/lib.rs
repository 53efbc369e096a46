//! Multi-prompt delimited control: growable stacks, guarded context
//! switches, and multi-shot resumptions.
//!
//! This crate provides the low-level primitive described in `SPEC_FULL.md`:
//! a program may [`create`] a prompt (a scoped computation bound to its own
//! growable stack), [`enter`] it to run a function on that stack,
//! [`yield_`] from any descendant frame up to a named ancestor prompt
//! (capturing the intervening stack segments as a first-class
//! [`Resumption`]), and later resume that resumption zero, one, or multiple
//! times. It is a substrate for effect handlers, algebraic effects,
//! generators, and async schedulers — none of which this crate itself
//! implements; see the module-level docs on [`prompt`] and [`resume`] for
//! the lifecycle and data model (§3, §4.3, §4.4 of `SPEC_FULL.md`).
//!
//! # Layout
//!
//! - [`gstack`] — the growable-stack allocator (GSTACK, §4.1): reserve,
//!   commit, guard, save, and restore stack regions.
//! - [`xfer`] — the guarded control-transfer primitive (XFER, §4.2): the
//!   only place in the crate that does a raw context switch.
//! - [`prompt`] — the prompt lifecycle and active chain (PROMPT, §4.3).
//! - [`resume`] — once- and multi-shot resumption objects (RESUME, §4.4).
//! - [`backtrace`] — stitches a single logical backtrace across prompt
//!   boundaries (§6 `backtrace`).
//!
//! # Safety and thread affinity
//!
//! A [`Prompt`] and every [`Resumption`] referencing it are pinned to the
//! thread that created the prompt (§5 "Thread affinity"); moving either
//! across threads is undefined behaviour, and the crate's public types are
//! therefore deliberately not `Send`/`Sync`.
//!
//! # Fatal errors
//!
//! Two of the four error kinds in §7 — *integrity* violations (a guarded
//! jump landed somewhere other than the two legitimate targets) and
//! unrecoverable *allocation* failure — are not represented as `Result`s at
//! all. They log through `tracing` and the configured
//! [`Config::error_handler`], then abort the process, exactly as the design
//! specifies. Only *usage* errors (see [`Error`]) are returned to the
//! caller; host panics that escape a prompt's entry function are
//! re-raised via [`std::panic::resume_unwind`] on the far side of the
//! boundary rather than converted into an `Error` variant, since they are
//! not this crate's own errors to classify.

mod config;
mod diagnostics;
mod error;
mod gstack;
pub mod prompt;
pub mod resume;
mod xfer;

#[path = "backtrace.rs"]
mod stitch;

pub use config::{init, Config, DiagnosticHandler};
pub use error::{Error, Result};
pub use prompt::{create, enter, prompt, prompt_parent, prompt_top, yield_, Prompt};
pub use resume::Resumption;
pub use stitch::backtrace;

/// The type erased argument/result value threaded through every prompt
/// boundary (`enter`, `yield_`, `resume`, ...).
///
/// §6 describes these as untyped `arg`/`value` parameters — the natural
/// rendering of a C `void*` payload in Rust without reintroducing one of
/// the host scheduling abstractions (async, generators) this crate exists
/// to provide a substrate *for*. Callers that want a typed API build it on
/// top, by downcasting on the way out and boxing on the way in, exactly as
/// [`backtrace`] does internally to carry its accumulator across a
/// `yield_`/`resume_tail` boundary.
pub type BoxAny = Box<dyn std::any::Any>;

/// Releases every stack this thread has cached, and flushes any
/// delayed-release entries. Called automatically when a thread exits (§4.1
/// "a per-thread cache amortises allocation; on thread exit it is
/// drained."); exposed here as well for hosts that want to reclaim memory
/// without waiting for thread teardown, e.g. a long-lived worker thread
/// between batches of prompt-heavy work.
pub fn drain_stack_cache() {
    gstack::clear_cache();
}
