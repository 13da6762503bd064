//! End-to-end interleaving scenarios: the console stream of each program
//! must match what the real platform prints, in order.

use loopscope::{run, ConsoleLevel, RunMode};

fn logs(source: &str, mode: RunMode) -> Vec<String> {
    let outcome = run(source, mode);
    assert!(
        outcome.errors.is_empty(),
        "unexpected errors: {:?}",
        outcome.errors
    );
    outcome
        .console
        .iter()
        .filter(|entry| entry.level == ConsoleLevel::Log)
        .map(|entry| entry.message.clone())
        .collect()
}

#[test]
fn sync_then_microtask_then_macrotask() {
    let source = r#"
        console.log("A");
        setTimeout(() => console.log("B"), 0);
        Promise.resolve().then(() => console.log("C"));
        console.log("D");
    "#;
    assert_eq!(logs(source, RunMode::Browser), vec!["A", "D", "C", "B"]);
}

#[test]
fn promise_executor_runs_synchronously() {
    let source = r#"
        new Promise(r => {
            console.log("B");
            r();
            console.log("C");
        }).then(() => console.log("D"));
        console.log("A");
        console.log("E");
    "#;
    assert_eq!(logs(source, RunMode::Browser), vec!["B", "C", "A", "E", "D"]);
}

#[test]
fn await_yields_even_on_a_settled_promise() {
    let source = r#"
        async function f() {
            console.log("s");
            await Promise.resolve();
            console.log("e");
        }
        console.log("1");
        f();
        console.log("2");
    "#;
    assert_eq!(logs(source, RunMode::Browser), vec!["1", "s", "2", "e"]);
}

#[test]
fn microtask_flood_completes_before_the_timer() {
    let source = r#"
        let n = 0;
        function tick() {
            n = n + 1;
            console.log("micro" + n);
            if (n < 3) {
                queueMicrotask(tick);
            }
        }
        queueMicrotask(tick);
        setTimeout(() => console.log("timeout"), 0);
    "#;
    assert_eq!(
        logs(source, RunMode::Browser),
        vec!["micro1", "micro2", "micro3", "timeout"]
    );
}

#[test]
fn node_timer_phase_precedes_check_phase() {
    let source = r#"
        setTimeout(() => console.log("T"), 0);
        setImmediate(() => console.log("I"));
    "#;
    assert_eq!(logs(source, RunMode::Node), vec!["T", "I"]);
}

#[test]
fn node_next_tick_precedes_promise_microtasks() {
    let source = r#"
        process.nextTick(() => console.log("N"));
        Promise.resolve().then(() => console.log("P"));
    "#;
    assert_eq!(logs(source, RunMode::Node), vec!["N", "P"]);
}

// ----- laws -----

#[test]
fn same_source_same_mode_is_byte_identical() {
    let source = r#"
        console.log("A", Math.random());
        setTimeout(() => console.log("B", Math.random()), 5);
        Promise.resolve(1).then(v => console.log("C", v));
        queueMicrotask(() => console.log("Q"));
    "#;
    let first = run(source, RunMode::Browser);
    let second = run(source, RunMode::Browser);
    assert_eq!(first.steps, second.steps);
    assert_eq!(first.console, second.console);

    let first = run(source, RunMode::Node);
    let second = run(source, RunMode::Node);
    assert_eq!(first.steps, second.steps);
}

#[test]
fn microtasks_outrank_zero_delay_timers() {
    let source = r#"
        Promise.resolve().then(() => console.log("a"));
        setTimeout(() => console.log("b"), 0);
    "#;
    assert_eq!(logs(source, RunMode::Browser), vec!["a", "b"]);
}

#[test]
fn next_tick_outranks_ordinary_microtasks_in_order() {
    let source = r#"
        Promise.resolve().then(() => console.log("a"));
        process.nextTick(() => console.log("b1"));
        process.nextTick(() => console.log("b2"));
    "#;
    // FIFO among nextTicks, all of them before promise reactions.
    assert_eq!(logs(source, RunMode::Node), vec!["b1", "b2", "a"]);
}

// ----- broader interleavings in the same style -----

#[test]
fn await_of_a_timer_backed_promise() {
    let source = r#"
        async function f() {
            console.log("start");
            await new Promise(resolve => setTimeout(resolve, 100));
            console.log("end");
        }
        f();
        console.log("after");
    "#;
    assert_eq!(
        logs(source, RunMode::Browser),
        vec!["start", "after", "end"]
    );
}

#[test]
fn await_binds_the_resolved_value() {
    let source = r#"
        async function f() {
            const x = await Promise.resolve(41);
            console.log(x + 1);
        }
        f();
    "#;
    assert_eq!(logs(source, RunMode::Browser), vec!["42"]);
}

#[test]
fn async_function_result_is_a_promise_of_its_return() {
    let source = r#"
        async function f() {
            return await Promise.resolve(7);
        }
        f().then(v => console.log("got", v));
        console.log("sync");
    "#;
    assert_eq!(logs(source, RunMode::Browser), vec!["sync", "got 7"]);
}

#[test]
fn finally_runs_after_an_awaited_try_block() {
    let source = r#"
        async function f() {
            try {
                await Promise.resolve(1);
            } finally {
                console.log("fin");
            }
            console.log("done");
        }
        f();
        console.log("sync");
    "#;
    assert_eq!(logs(source, RunMode::Browser), vec!["sync", "fin", "done"]);
}

#[test]
fn statements_after_an_awaited_if_still_run() {
    let source = r#"
        async function f() {
            if (true) {
                await Promise.resolve();
                console.log("inner");
            }
            console.log("after");
        }
        f().then(() => console.log("settled"));
        console.log("sync");
    "#;
    // The promise must not settle until the statements after the `if`
    // have run.
    assert_eq!(
        logs(source, RunMode::Browser),
        vec!["sync", "inner", "after", "settled"]
    );
}

#[test]
fn catch_and_finally_run_when_the_awaited_promise_rejects_later() {
    let source = r#"
        async function f() {
            try {
                await new Promise((resolve, reject) => setTimeout(() => reject("bad"), 5));
                console.log("not-reached");
            } catch (e) {
                console.log("caught", e);
            } finally {
                console.log("fin");
            }
            console.log("done");
        }
        f();
        console.log("sync");
    "#;
    assert_eq!(
        logs(source, RunMode::Browser),
        vec!["sync", "caught bad", "fin", "done"]
    );
}

#[test]
fn return_await_flows_through_finally_before_settling() {
    let source = r#"
        async function f() {
            try {
                return await Promise.resolve("value");
            } finally {
                console.log("fin");
            }
        }
        f().then(v => console.log("got", v));
    "#;
    assert_eq!(logs(source, RunMode::Browser), vec!["fin", "got value"]);
}

#[test]
fn while_loop_resumes_across_awaits() {
    let source = r#"
        async function f() {
            let i = 0;
            while (i < 3) {
                await Promise.resolve();
                i = i + 1;
                console.log("loop", i);
            }
            console.log("end");
        }
        f();
        console.log("sync");
    "#;
    assert_eq!(
        logs(source, RunMode::Browser),
        vec!["sync", "loop 1", "loop 2", "loop 3", "end"]
    );
}

#[test]
fn for_loop_runs_its_update_after_an_awaited_body() {
    let source = r#"
        async function f() {
            for (let i = 0; i < 2; i = i + 1) {
                await Promise.resolve();
                console.log("i", i);
            }
            console.log("end");
        }
        f();
    "#;
    assert_eq!(logs(source, RunMode::Browser), vec!["i 0", "i 1", "end"]);
}

#[test]
fn then_chains_settle_in_registration_order() {
    let source = r#"
        Promise.resolve(1)
            .then(v => { console.log("one", v); return v + 1; })
            .then(v => { console.log("two", v); return v + 1; })
            .then(v => console.log("three", v));
    "#;
    assert_eq!(
        logs(source, RunMode::Browser),
        vec!["one 1", "two 2", "three 3"]
    );
}

#[test]
fn catch_routes_rejections_and_recovers() {
    let source = r#"
        Promise.reject("boom")
            .catch(e => { console.log("caught", e); return "ok"; })
            .then(v => console.log("then", v));
    "#;
    assert_eq!(
        logs(source, RunMode::Browser),
        vec!["caught boom", "then ok"]
    );
}

#[test]
fn finally_runs_on_both_outcomes_and_forwards() {
    let source = r#"
        Promise.resolve("v").finally(() => console.log("f1")).then(v => console.log(v));
        Promise.reject("r").finally(() => console.log("f2")).catch(e => console.log(e));
    "#;
    assert_eq!(
        logs(source, RunMode::Browser),
        vec!["f1", "f2", "v", "r"]
    );
}

#[test]
fn promise_all_collects_in_input_order() {
    let source = r#"
        const slow = new Promise(r => setTimeout(() => r("slow"), 50));
        Promise.all([slow, Promise.resolve("fast"), 3])
            .then(vs => console.log(vs.join("|")));
    "#;
    assert_eq!(logs(source, RunMode::Browser), vec!["slow|fast|3"]);
}

#[test]
fn promise_race_takes_the_first_settlement() {
    let source = r#"
        const slow = new Promise(r => setTimeout(() => r("slow"), 50));
        Promise.race([slow, Promise.resolve("fast")])
            .then(v => console.log(v));
    "#;
    assert_eq!(logs(source, RunMode::Browser), vec!["fast"]);
}

#[test]
fn timers_fire_in_delay_order_not_registration_order() {
    let source = r#"
        setTimeout(() => console.log("late"), 100);
        setTimeout(() => console.log("early"), 10);
    "#;
    assert_eq!(logs(source, RunMode::Browser), vec!["early", "late"]);
}

#[test]
fn interval_reschedules_until_cleared() {
    let source = r#"
        let count = 0;
        const id = setInterval(() => {
            count = count + 1;
            console.log("tick" + count);
            if (count === 3) {
                clearInterval(id);
            }
        }, 10);
    "#;
    assert_eq!(
        logs(source, RunMode::Browser),
        vec!["tick1", "tick2", "tick3"]
    );
}

#[test]
fn cleared_timeout_never_fires() {
    let source = r#"
        const id = setTimeout(() => console.log("never"), 10);
        clearTimeout(id);
        console.log("done");
    "#;
    assert_eq!(logs(source, RunMode::Browser), vec!["done"]);
}

#[test]
fn raf_is_a_macrotask_in_browser_mode() {
    let source = r#"
        requestAnimationFrame(() => console.log("frame"));
        Promise.resolve().then(() => console.log("micro"));
    "#;
    assert_eq!(logs(source, RunMode::Browser), vec!["micro", "frame"]);
}

#[test]
fn node_drains_microtasks_between_phases() {
    let source = r#"
        setTimeout(() => {
            console.log("timer");
            Promise.resolve().then(() => console.log("timer-micro"));
        }, 0);
        setImmediate(() => console.log("immediate"));
    "#;
    assert_eq!(
        logs(source, RunMode::Node),
        vec!["timer", "timer-micro", "immediate"]
    );
}

#[test]
fn then_registered_mid_drain_runs_in_the_same_drain() {
    let source = r#"
        Promise.resolve().then(() => {
            console.log("first");
            Promise.resolve().then(() => console.log("second"));
        });
        setTimeout(() => console.log("timer"), 0);
    "#;
    assert_eq!(
        logs(source, RunMode::Browser),
        vec!["first", "second", "timer"]
    );
}

#[test]
fn virtual_clock_is_visible_to_date_now() {
    let source = r#"
        setTimeout(() => console.log("at", Date.now()), 25);
        console.log("at", Date.now());
    "#;
    assert_eq!(logs(source, RunMode::Browser), vec!["at 0", "at 25"]);
}
