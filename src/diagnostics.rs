//! Logging and fatal-abort plumbing shared by every component.
//!
//! Every control transfer and lifecycle transition logs through `tracing`
//! at an appropriate level; in addition, the process-wide
//! `output_handler`/`error_handler` hooks from [`crate::config::Config`] are
//! invoked so a host that wants diagnostics outside of `tracing`'s
//! subscriber machinery still gets them (this mirrors the original's
//! `mp_trace_message`/`mp_error_message`/`mp_fatal_message` trio).

use crate::config;

/// Routine, high-frequency diagnostics (link/unlink, save/restore). Always a
/// `tracing::trace!` event; only reaches `output_handler` as well, never
/// `error_handler`.
pub(crate) fn trace(msg: &str) {
    tracing::trace!("{msg}");
    if let Some(handler) = config::get().output_handler {
        handler(msg);
    }
}

/// A *usage*-class error (§7): recoverable, surfaced to the caller as an
/// `Err`, but still worth a `tracing::warn!` and the registered error
/// handler so a host can notice a misuse pattern in production.
pub(crate) fn warn_usage(msg: &str) {
    tracing::warn!("{msg}");
    if let Some(handler) = config::get().error_handler {
        handler(msg);
    }
}

/// Logs a fatal diagnostic and aborts the process. Used for *integrity*
/// violations (guarded jump target mismatch, invariant breach in debug
/// builds) and, absent an escape hatch, *allocation* failure (§7). Never
/// returns.
#[cold]
pub(crate) fn fatal(msg: &str) -> ! {
    tracing::error!("{msg}");
    if let Some(handler) = config::get().error_handler {
        handler(msg);
    }
    std::process::abort();
}
