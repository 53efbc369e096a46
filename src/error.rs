//! Error kinds for the recoverable (non-fatal) half of the runtime.
//!
//! Per the design, errors come in four flavors: *integrity* and
//! *allocation* failures are fatal and never reach this type (they log
//! through [`crate::config::error_handler`] and abort the process, see
//! [`crate::fatal`]); *usage* errors are the ones a caller can observe and
//! recover from, represented here; *propagated* host panics are carried out
//! of band as a [`std::any::Any`] payload rather than through this enum,
//! since they are not this crate's own errors to classify.

use thiserror::Error;

/// Recoverable usage errors.
///
/// These never indicate stack corruption or a lost allocation; they mean a
/// caller used the API in a way that §7 of the design classifies as a
/// *usage* error. The offending call returns this error instead of
/// aborting.
///
/// A `yield_` call that targets a non-ancestor prompt is a usage error too
/// (§7), but `yield_`'s signature has no slot for a sentinel value of the
/// caller's own result type to return in its place, so that case is raised
/// as a panic at the call site instead of a variant here (see
/// `prompt::yield_`).
#[derive(Debug, Error)]
pub enum Error {
    /// `resume_dup` was called on a once-resumption. Once-resumptions are
    /// not reference-counted; promote with [`crate::Resumption::to_multi`]
    /// first.
    #[error("cannot dup a once-resumption; call to_multi first")]
    NotMulti,

    /// `init` was called a second time in this process.
    #[error("mprompt::init was already called in this process")]
    AlreadyInitialized,
}

pub type Result<T> = std::result::Result<T, Error>;
