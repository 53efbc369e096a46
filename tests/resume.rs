//! Resumption object scenarios: once vs. multi-shot, duplication, tail
//! resume, and the observability helpers (§8).

use mprompt::{prompt, yield_, BoxAny, Error};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn resume_dup_on_a_once_resumption_is_a_usage_error() {
    // §8 "Boundary behaviours": resume_dup on a once-resumption returns an
    // error sentinel and does not mutate state (the handle is still usable
    // for a normal `resume` afterwards).
    let result = prompt(
        |p, arg| {
            yield_(
                p,
                |resumption, arg| {
                    assert!(matches!(resumption.dup(), Err(Error::NotMulti)));
                    resumption.resume(arg)
                },
                arg,
            )
        },
        Box::new(7i32) as BoxAny,
    );
    assert_eq!(*result.downcast::<i32>().unwrap(), 7);
}

#[test]
fn should_unwind_reflects_sole_unused_ownership() {
    let result = prompt(
        |p, arg| {
            yield_(
                p,
                |resumption, arg| {
                    // A once-resumption is never reported as unwind-worthy;
                    // it's meant to always be resumed or explicitly dropped.
                    assert!(!resumption.should_unwind());

                    let multi = resumption.to_multi();
                    assert!(multi.should_unwind(), "sole, never-resumed multi handle");

                    let dup = multi.dup().expect("a multi-resumption can be dup'd");
                    assert!(!multi.should_unwind(), "no longer the sole handle");

                    dup.drop_resumption();
                    assert!(multi.should_unwind(), "sole handle again after the dup was dropped");

                    multi.resume(arg)
                },
                arg,
            )
        },
        Box::new(5i32) as BoxAny,
    );
    assert_eq!(*result.downcast::<i32>().unwrap(), 5);
}

#[test]
fn to_multi_is_referentially_idempotent() {
    let result = prompt(
        |p, arg| {
            yield_(
                p,
                |resumption, arg| {
                    let once_count = resumption.resume_count();
                    assert_eq!(once_count, 0);
                    let multi = resumption.to_multi();
                    let still_multi = multi.to_multi();
                    still_multi.resume(arg)
                },
                arg,
            )
        },
        Box::new(3i32) as BoxAny,
    );
    assert_eq!(*result.downcast::<i32>().unwrap(), 3);
}

#[test]
fn resume_tail_produces_the_same_value_as_resume() {
    // §8 round-trip: resume_tail on a resumption not yet consumed produces
    // the same final value as resume.
    let via_resume = prompt(
        |p, arg| yield_(p, |resumption, v| resumption.resume(v), arg),
        Box::new(11i32) as BoxAny,
    );
    let via_resume_tail = prompt(
        |p, arg| yield_(p, |resumption, v| resumption.resume_tail(v), arg),
        Box::new(11i32) as BoxAny,
    );
    assert_eq!(*via_resume.downcast::<i32>().unwrap(), 11);
    assert_eq!(*via_resume_tail.downcast::<i32>().unwrap(), 11);
}

#[test]
fn tail_resume_loop_survives_many_iterations() {
    // §8 scenario 5, shrunk from 10^6 to a size a test suite can run
    // quickly: a chain of resume_tail calls must not grow the resuming
    // side's native stack, so a large iteration count should run in
    // bounded, small memory rather than overflow.
    const ITERS: i64 = 50_000;

    fn step(p: mprompt::Prompt, n: i64) -> BoxAny {
        yield_(
            p,
            move |resumption, arg| {
                let n = *arg.downcast::<i64>().unwrap();
                if n >= ITERS {
                    resumption.resume(Box::new(n) as BoxAny)
                } else {
                    resumption.resume_tail(Box::new(n + 1) as BoxAny)
                }
            },
            Box::new(n) as BoxAny,
        )
    }

    let result = prompt(
        |p, arg| {
            let mut n = *arg.downcast::<i64>().unwrap();
            while n < ITERS {
                n = *step(p, n).downcast::<i64>().unwrap();
            }
            Box::new(n) as BoxAny
        },
        Box::new(0i64) as BoxAny,
    );
    assert_eq!(*result.downcast::<i64>().unwrap(), ITERS);
}

#[test]
fn multi_shot_resumption_runs_independently_three_times() {
    // §8 scenario 4: capture a resumption at a yield returning an integer
    // supplied by the resume argument; resume it three times, collecting
    // three independent body return values; resume_count reaches 3.
    let stash: Rc<RefCell<Vec<mprompt::Resumption>>> = Rc::new(RefCell::new(Vec::new()));
    let stash_for_handler = stash.clone();

    let first = prompt(
        move |p, arg| {
            let mut local = 100i32;
            let resumed = yield_(
                p,
                move |resumption, first_arg| {
                    let multi = resumption.to_multi();
                    stash_for_handler.borrow_mut().push(multi.dup().unwrap());
                    stash_for_handler.borrow_mut().push(multi.dup().unwrap());
                    multi.resume(first_arg)
                },
                arg,
            );
            local += *resumed.downcast::<i32>().unwrap();
            Box::new(local) as BoxAny
        },
        Box::new(1i32) as BoxAny,
    );
    assert_eq!(*first.downcast::<i32>().unwrap(), 101, "run #1 (inline) sees only its own local state");

    let mut handles = stash.borrow_mut();
    let third_handle = handles.pop().unwrap();
    let second_handle = handles.pop().unwrap();
    drop(handles);

    assert_eq!(second_handle.resume_count(), 1);

    let third = third_handle.resume(Box::new(3i32) as BoxAny);
    assert_eq!(*third.downcast::<i32>().unwrap(), 103, "run #3 starts from the same pristine local state as run #1");

    assert_eq!(second_handle.resume_count(), 2);
    let second = second_handle.resume(Box::new(2i32) as BoxAny);
    assert_eq!(*second.downcast::<i32>().unwrap(), 102, "run #2 is independent of run #3's mutation order");
}
