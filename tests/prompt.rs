//! End-to-end prompt lifecycle scenarios (§8 "End-to-end scenarios").

use mprompt::{prompt, prompt_parent, prompt_top, yield_, BoxAny};

#[test]
fn identity_prompt_returns_its_argument_unchanged() {
    let result = prompt(|_p, arg| arg, Box::new(42i32) as BoxAny);
    assert_eq!(*result.downcast::<i32>().unwrap(), 42);
}

#[test]
fn yield_with_identity_continuation_returns_the_resume_argument() {
    // prompt(p -> yield(p, identity, v)) == v (§8 "Boundary behaviours").
    let result = prompt(
        |p, arg| yield_(p, |resumption, v| resumption.resume(v), arg),
        Box::new(99i32) as BoxAny,
    );
    assert_eq!(*result.downcast::<i32>().unwrap(), 99);
}

#[test]
fn single_yield_resume_plus_one_then_doubles() {
    // §8 scenario 2: x = yield(p, k -> resume(k, v+1), 10); return x*2 == 22.
    let result = prompt(
        |p, arg| {
            let x = *arg.downcast::<i32>().unwrap();
            let resumed = yield_(
                p,
                |resumption, v| {
                    let v = *v.downcast::<i32>().unwrap();
                    resumption.resume(Box::new(v + 1) as BoxAny)
                },
                Box::new(x) as BoxAny,
            );
            let x = *resumed.downcast::<i32>().unwrap();
            Box::new(x * 2) as BoxAny
        },
        Box::new(10i32) as BoxAny,
    );
    assert_eq!(*result.downcast::<i32>().unwrap(), 22);
}

#[test]
fn panic_inside_the_entry_function_propagates_to_the_caller() {
    // §8 scenario 3: the outer `prompt` call observes a rethrow of the
    // host exception raised inside the user function.
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        prompt(|_p, _arg| panic!("boom"), Box::new(()) as BoxAny)
    }));
    let err = outcome.expect_err("a panic inside the entry function must propagate out");
    let message = err
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| err.downcast_ref::<String>().map(String::as_str))
        .unwrap_or_default();
    assert_eq!(message, "boom");
}

#[test]
fn a_prompt_can_still_be_entered_after_a_sibling_panicked() {
    // The panicking prompt's stack must actually be released (not leave the
    // allocator or the thread-local chain in a corrupted state).
    let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        prompt(|_p, _arg| panic!("first one"), Box::new(()) as BoxAny)
    }));
    let result = prompt(|_p, arg| arg, Box::new(7i32) as BoxAny);
    assert_eq!(*result.downcast::<i32>().unwrap(), 7);
}

#[test]
#[should_panic(expected = "ancestor")]
fn yielding_to_a_non_ancestor_prompt_is_a_usage_error() {
    let unrelated = mprompt::create();
    prompt(
        move |_p, arg| yield_(unrelated, |resumption, v| resumption.resume(v), arg),
        Box::new(()) as BoxAny,
    );
}

#[test]
fn nested_prompts_maintain_a_correct_parent_chain() {
    // Three prompts deep; from the innermost frame, walking `prompt_parent`
    // must reach every ancestor in order and terminate at `None`.
    let result = prompt(
        |outer, arg| {
            let outer_top = prompt_top().expect("outer is active");
            assert_eq!(outer_top, outer);
            assert!(prompt_parent(Some(outer)).is_none());

            prompt(
                move |middle, arg| {
                    assert_eq!(prompt_top(), Some(middle));
                    assert_eq!(prompt_parent(Some(middle)), Some(outer));

                    prompt(
                        move |inner, arg| {
                            assert_eq!(prompt_top(), Some(inner));
                            assert_eq!(prompt_parent(Some(inner)), Some(middle));
                            assert_eq!(prompt_parent(prompt_parent(Some(inner))), Some(outer));
                            arg
                        },
                        arg,
                    )
                },
                arg,
            )
        },
        Box::new(5i32) as BoxAny,
    );
    assert_eq!(*result.downcast::<i32>().unwrap(), 5);
    // Once every prompt above has returned, the chain is empty again.
    assert!(prompt_top().is_none());
}
