//! Cross-prompt backtrace stitching (§6 `backtrace`).
//!
//! A stock unwinder cannot walk from one prompt's growable stack into its
//! parent's — they are independent allocations with no linked unwind info
//! between them (see `SPEC_FULL.md`). Capturing the *raw* frames of a single
//! native call stack is delegated to the `backtrace` crate, treated here as
//! exactly the kind of opaque "platform backtrace helper" §1 names as an
//! out-of-scope collaborator; what this module actually implements is the
//! in-scope part, the stitching: capture the current segment, and if an
//! ancestor prompt exists, `yield_` to it with a continuation that captures
//! *its* segment in turn, recursing until the outermost prompt is reached,
//! then `resume_tail`-ing back down with the concatenated result.

use crate::prompt::{self};
use crate::BoxAny;

/// Safety margin against a segment whose unwind info never terminates
/// (an unlikely but cheap-to-guard-against possibility, since frames are
/// also bounded by the stack's own address range via [`gstack::current`]).
const MAX_FRAMES_PER_SEGMENT: usize = 256;

/// Appends instruction pointers for the currently executing stack segment,
/// stopping at `limit` total frames or at the boundary of the current
/// prompt's own growable stack — whichever comes first. The latter is what
/// keeps this from wandering into a parent prompt's unrelated frames (or a
/// guard page) on architectures where the unwinder doesn't otherwise notice
/// the stack switch.
fn capture_current_segment(out: &mut Vec<usize>, limit: usize) {
    let handle = crate::gstack::current();
    let mut frames_this_segment = 0usize;
    unsafe {
        ::backtrace::trace(|frame| {
            if let Some(h) = handle {
                if !h.contains_sp(frame.sp().cast::<u8>()) {
                    return false;
                }
            }
            out.push(frame.ip() as usize);
            frames_this_segment += 1;
            out.len() < limit && frames_this_segment < MAX_FRAMES_PER_SEGMENT
        });
    }
}

/// Recursive core of `backtrace`: capture this segment, then — if there is
/// an ancestor prompt — yield to it, capture its segment inside the yield
/// handler (now running on the ancestor's own stack), recurse, and
/// `resume_tail` the fully stitched list back down.
fn walk(mut out: Vec<usize>, limit: usize) -> Vec<usize> {
    capture_current_segment(&mut out, limit);
    if out.len() >= limit {
        return out;
    }
    match prompt::prompt_top() {
        None => out,
        Some(p) => {
            let carried: BoxAny = Box::new(out);
            let result = prompt::yield_(
                p,
                move |resumption, arg| {
                    let out = *arg.downcast::<Vec<usize>>().expect("backtrace carries a Vec<usize>");
                    let stitched = walk(out, limit);
                    resumption.resume_tail(Box::new(stitched))
                },
                carried,
            );
            *result.downcast::<Vec<usize>>().expect("backtrace resume carries a Vec<usize>")
        }
    }
}

/// §6 `backtrace(buf, len) -> int`. Fills `buf` with instruction pointers
/// from the active chain, innermost frame first, stitched across every
/// prompt boundary between the caller and the outermost prompt on this
/// thread (or just the current native stack, if the caller isn't running
/// inside any prompt at all). Returns the number of entries written.
pub fn backtrace(buf: &mut [usize]) -> usize {
    let out = walk(Vec::new(), buf.len());
    let n = out.len().min(buf.len());
    buf[..n].copy_from_slice(&out[..n]);
    n
}
