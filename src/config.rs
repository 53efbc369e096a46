//! Process-wide configuration (§6).
//!
//! `Config` is read once, at [`crate::init`], and never mutated afterwards —
//! it is one of the two kinds of mutable-at-most-once global state called
//! out in §5 ("Shared resources"), the other being the guarded jump labels
//! in [`crate::xfer`].

use std::sync::OnceLock;

/// A diagnostic hook invoked on the `tracing` "error" path before a fatal
/// abort, and on recoverable usage errors.
///
/// Matches the shape of `output_handler`/`error_handler` in §6: a plain
/// `fn` pointer rather than a boxed closure, since these are process-wide
/// and installed at most once.
pub type DiagnosticHandler = fn(&str);

/// Process-wide configuration, enumerated per §6 "Configuration options".
#[derive(Debug, Clone)]
pub struct Config {
    /// Reserved size per stack, in bytes. Rounded up to the platform page
    /// size. Default: 8 MiB, matching common default stack sizes for
    /// growable-stack runtimes in this space.
    pub stack_total_bytes: usize,

    /// Bytes committed up front when a stack is first allocated. Only
    /// meaningful when `stack_use_overcommit` is `false`; with overcommit
    /// enabled the whole region is addressable immediately and the OS pages
    /// it in lazily regardless of this value. Default: one page.
    pub stack_initial_commit_bytes: usize,

    /// Size of each of the two guard regions flanking a stack. Default: one
    /// page (4 KiB on most platforms this crate targets).
    pub stack_gap_bytes: usize,

    /// Number of released stacks kept in the per-thread cache before
    /// further releases go back to the OS. Default: 4.
    pub stack_cache_count: usize,

    /// When `true` (the default), rely on the OS's own lazy physical-page
    /// backing of a single up-front reservation (`MAP_NORESERVE` on Unix, a
    /// single `MEM_RESERVE` on Windows). When `false`, only
    /// `stack_initial_commit_bytes` is committed at allocation time; this
    /// crate does not grow the commitment afterwards (see `SPEC_FULL.md`
    /// "Deliberate implementation scoping" — the guard-page-fault-driven
    /// incremental committer is an explicitly out-of-scope collaborator).
    pub stack_use_overcommit: bool,

    /// Enables pooling of stack reservations across distinct size classes.
    /// This crate only ever allocates one size class (`stack_total_bytes`),
    /// so this flag only gates whether freed stacks are cached at all.
    pub gpool_enable: bool,

    /// Invoked with informational/trace-level diagnostics. Defaults to
    /// routing through `tracing::debug!`.
    pub output_handler: Option<DiagnosticHandler>,

    /// Invoked with warnings and the final message before a fatal abort.
    /// Defaults to routing through `tracing::error!`.
    pub error_handler: Option<DiagnosticHandler>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            stack_total_bytes: 8 * 1024 * 1024,
            stack_initial_commit_bytes: 4096,
            stack_gap_bytes: 4096,
            stack_cache_count: 4,
            stack_use_overcommit: true,
            gpool_enable: true,
            output_handler: None,
            error_handler: None,
        }
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Process-wide initialisation (§6 `init`). Idempotent per process: a
/// second call is a usage error — logged, left without effect on the
/// already-active configuration, and reported back to the caller rather
/// than silently re-initialising (see `SPEC_FULL.md`).
pub fn init(config: Config) -> crate::Result<()> {
    if CONFIG.set(config).is_err() {
        crate::diagnostics::warn_usage("mprompt::init called more than once; ignoring");
        return Err(crate::Error::AlreadyInitialized);
    }
    Ok(())
}

/// The active configuration, initialising with defaults on first access if
/// `init` was never called explicitly.
pub(crate) fn get() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}
