//! Structural properties of the step stream: balanced stack events,
//! schedule/dequeue/execute pairing, monotonic virtual time, and the
//! mode-specific drain rules.

use std::collections::HashSet;

use loopscope::{run, ExecutionStep, RunMode, StepPayload};
use proptest::prelude::*;

/// Every PUSH_STACK has a matching POP_STACK, pops never outnumber
/// pushes at any prefix, and frames unwind LIFO.
fn assert_balanced_stack(steps: &[ExecutionStep]) {
    let mut open: Vec<u64> = Vec::new();
    for step in steps {
        match &step.payload {
            StepPayload::PushStack { id, .. } => open.push(*id),
            StepPayload::PopStack { id } => {
                let top = open.pop().unwrap_or_else(|| {
                    panic!("POP_STACK {id} with no open frame");
                });
                assert_eq!(top, *id, "frames must unwind LIFO");
            }
            _ => {}
        }
    }
    assert!(open.is_empty(), "unclosed frames: {open:?}");
}

/// Dequeues only reference scheduled ids, executes follow their dequeue,
/// and nothing is dequeued twice.
fn assert_queue_pairing(steps: &[ExecutionStep]) {
    let mut scheduled_micro = HashSet::new();
    let mut dequeued_micro = HashSet::new();
    let mut scheduled_macro = HashSet::new();
    let mut dequeued_macro = HashSet::new();
    for step in steps {
        match &step.payload {
            StepPayload::ScheduleMicrotask { id: Some(id), .. } => {
                assert!(scheduled_micro.insert(*id), "microtask {id} scheduled twice");
            }
            StepPayload::DequeueMicrotask { id, .. } => {
                assert!(
                    scheduled_micro.contains(id),
                    "microtask {id} dequeued but never scheduled"
                );
                assert!(dequeued_micro.insert(*id), "microtask {id} dequeued twice");
            }
            StepPayload::ExecuteMicrotask { id, .. } => {
                assert!(
                    dequeued_micro.contains(id),
                    "microtask {id} executed before its dequeue"
                );
            }
            StepPayload::ScheduleMacrotask { id, .. } => {
                assert!(scheduled_macro.insert(*id), "macrotask {id} scheduled twice");
            }
            StepPayload::DequeueMacrotask { id, .. } => {
                assert!(
                    scheduled_macro.contains(id),
                    "macrotask {id} dequeued but never scheduled"
                );
                assert!(dequeued_macro.insert(*id), "macrotask {id} dequeued twice");
            }
            StepPayload::ExecuteMacrotask { id, .. } => {
                assert!(
                    dequeued_macro.contains(id),
                    "macrotask {id} executed before its dequeue"
                );
            }
            _ => {}
        }
    }
}

fn assert_monotonic_time(steps: &[ExecutionStep]) {
    let mut last = 0u64;
    for step in steps {
        assert!(
            step.timestamp_ms >= last,
            "virtual time went backwards: {} after {}",
            step.timestamp_ms,
            last
        );
        last = step.timestamp_ms;
    }
}

/// For await-free programs the event-derived microtask queue is exact:
/// no macrotask may execute while it is non-empty.
fn assert_no_macrotask_during_pending_microtasks(steps: &[ExecutionStep]) {
    let mut pending: HashSet<u64> = HashSet::new();
    for step in steps {
        match &step.payload {
            StepPayload::ScheduleMicrotask { id: Some(id), .. } => {
                pending.insert(*id);
            }
            StepPayload::DequeueMicrotask { id, .. } => {
                pending.remove(id);
            }
            StepPayload::ExecuteMacrotask { id, .. } => {
                assert!(
                    pending.is_empty(),
                    "macrotask {id} executed with microtasks pending: {pending:?}"
                );
            }
            _ => {}
        }
    }
}

fn assert_all_invariants(steps: &[ExecutionStep]) {
    assert_balanced_stack(steps);
    assert_queue_pairing(steps);
    assert_monotonic_time(steps);
}

const MIXED_WORKLOAD: &str = r#"
    console.log("sync");
    const id = setTimeout(() => console.log("never"), 40);
    setTimeout(() => {
        console.log("timer");
        Promise.resolve().then(() => console.log("timer-micro"));
    }, 10);
    clearTimeout(id);
    Promise.resolve(2).then(v => console.log("then", v));
    queueMicrotask(() => console.log("qm"));
"#;

#[test]
fn mixed_workload_invariants_browser() {
    let outcome = run(MIXED_WORKLOAD, RunMode::Browser);
    assert!(outcome.errors.is_empty());
    assert_all_invariants(&outcome.steps);
    assert_no_macrotask_during_pending_microtasks(&outcome.steps);
}

#[test]
fn mixed_workload_invariants_node() {
    let outcome = run(MIXED_WORKLOAD, RunMode::Node);
    assert!(outcome.errors.is_empty());
    assert_all_invariants(&outcome.steps);
    assert_no_macrotask_during_pending_microtasks(&outcome.steps);
}

#[test]
fn async_await_trace_stays_balanced() {
    let source = r#"
        async function work() {
            console.log("a");
            await new Promise(r => setTimeout(r, 5));
            console.log("b");
            await Promise.resolve();
            console.log("c");
        }
        work();
    "#;
    for mode in [RunMode::Browser, RunMode::Node] {
        let outcome = run(source, mode);
        assert!(outcome.errors.is_empty());
        assert_all_invariants(&outcome.steps);
    }
}

#[test]
fn nested_await_trace_stays_balanced() {
    let source = r#"
        async function work() {
            try {
                if (true) {
                    await Promise.resolve();
                }
                let i = 0;
                while (i < 2) {
                    await new Promise(r => setTimeout(r, 5));
                    i = i + 1;
                }
            } finally {
                console.log("fin");
            }
            console.log("done");
        }
        work();
    "#;
    for mode in [RunMode::Browser, RunMode::Node] {
        let outcome = run(source, mode);
        assert!(outcome.errors.is_empty(), "errors: {:?}", outcome.errors);
        assert_all_invariants(&outcome.steps);
        let lines: Vec<&str> = outcome
            .console
            .iter()
            .map(|entry| entry.message.as_str())
            .collect();
        assert_eq!(lines, vec!["fin", "done"]);
    }
}

#[test]
fn cleared_timer_never_resolves() {
    let source = r#"
        const id = setTimeout(() => console.log("x"), 50);
        clearTimeout(id);
    "#;
    let outcome = run(source, RunMode::Browser);
    assert!(outcome
        .steps
        .iter()
        .any(|s| matches!(s.payload, StepPayload::RegisterWebApi { .. })));
    assert!(!outcome
        .steps
        .iter()
        .any(|s| matches!(s.payload, StepPayload::ResolveWebApi { .. })));
    assert!(!outcome
        .steps
        .iter()
        .any(|s| matches!(s.payload, StepPayload::ExecuteMacrotask { .. })));
    assert!(outcome.console.is_empty());
}

#[test]
fn errors_keep_the_stack_balanced() {
    let source = r#"
        function boom() { throw "kapow"; }
        setTimeout(() => boom(), 0);
        boom();
        console.log("unreached");
    "#;
    let outcome = run(source, RunMode::Browser);
    assert_eq!(outcome.errors.len(), 2);
    assert_balanced_stack(&outcome.steps);
}

#[test]
fn parse_error_yields_single_console_error_step() {
    let outcome = run("let = ;", RunMode::Browser);
    assert_eq!(outcome.steps.len(), 1);
    assert!(matches!(
        outcome.steps[0].payload,
        StepPayload::ConsoleError { .. }
    ));
    assert_eq!(outcome.errors.len(), 1);
}

#[test]
fn loop_guard_surfaces_a_range_error() {
    let outcome = run("while (true) { }", RunMode::Browser);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].to_string().starts_with("RangeError"));
    assert_balanced_stack(&outcome.steps);
}

#[test]
fn microtask_flood_overflow_returns_partial_trace() {
    let source = r#"
        function again() { queueMicrotask(again); }
        queueMicrotask(again);
    "#;
    let outcome = run(source, RunMode::Browser);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0]
        .to_string()
        .starts_with("Scheduler overflow"));
    assert!(!outcome.steps.is_empty());
    assert_balanced_stack(&outcome.steps);
    assert_monotonic_time(&outcome.steps);
}

// ----- randomized programs, assembled from a snippet pool -----

const SNIPPETS: &[&str] = &[
    "console.log('s');",
    "setTimeout(() => console.log('t1'), 0);",
    "setTimeout(() => console.log('t2'), 20);",
    "Promise.resolve().then(() => console.log('p'));",
    "queueMicrotask(() => console.log('q'));",
    "new Promise(r => { console.log('exec'); r(); }).then(() => console.log('settled'));",
    "const c = setTimeout(() => console.log('cleared'), 30); clearTimeout(c);",
    "Promise.reject('r').catch(e => console.log('caught', e));",
    "for (let i = 0; i < 3; i = i + 1) { console.log('i', i); }",
];

const ASYNC_SNIPPETS: &[&str] = &[
    "async function a1() { await Promise.resolve(); console.log('a1'); } a1();",
    "async function a2() { const v = await Promise.resolve(9); console.log('a2', v); } a2();",
    "async function a3() { try { await Promise.resolve(); } finally { console.log('a3f'); } console.log('a3'); } a3();",
    "async function a4() { if (true) { await Promise.resolve(); } console.log('a4'); } a4();",
];

fn program_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec(0..SNIPPETS.len(), 1..6)
        .prop_map(|picks| {
            picks
                .into_iter()
                .map(|i| SNIPPETS[i])
                .collect::<Vec<_>>()
                .join("\n")
        })
}

fn async_program_strategy() -> impl Strategy<Value = String> {
    (
        proptest::collection::vec(0..SNIPPETS.len(), 0..4),
        proptest::collection::vec(0..ASYNC_SNIPPETS.len(), 1..3),
    )
        .prop_map(|(sync, asyncs)| {
            let mut parts: Vec<&str> = sync.into_iter().map(|i| SNIPPETS[i]).collect();
            parts.extend(asyncs.into_iter().map(|i| ASYNC_SNIPPETS[i]));
            parts.join("\n")
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn random_programs_uphold_trace_invariants(source in program_strategy()) {
        for mode in [RunMode::Browser, RunMode::Node] {
            let outcome = run(&source, mode);
            prop_assert!(outcome.errors.is_empty(), "errors in {source}: {:?}", outcome.errors);
            assert_all_invariants(&outcome.steps);
            assert_no_macrotask_during_pending_microtasks(&outcome.steps);
        }
    }

    #[test]
    fn random_programs_are_deterministic(source in program_strategy()) {
        let first = run(&source, RunMode::Browser);
        let second = run(&source, RunMode::Browser);
        prop_assert_eq!(first.steps, second.steps);
    }

    #[test]
    fn random_async_programs_stay_balanced(source in async_program_strategy()) {
        for mode in [RunMode::Browser, RunMode::Node] {
            let outcome = run(&source, mode);
            prop_assert!(outcome.errors.is_empty(), "errors in {source}: {:?}", outcome.errors);
            assert_balanced_stack(&outcome.steps);
            assert_queue_pairing(&outcome.steps);
            assert_monotonic_time(&outcome.steps);
        }
    }
}
