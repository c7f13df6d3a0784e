mod common;

use common::*;
use jvmcheck::demos::Demo;
use jvmcheck::jvm::class_graph::*;
use jvmcheck::jvm::code::*;
use jvmcheck::jvm::*;
use jvmcheck::search::{Search, SearchReport, Violation};
use jvmcheck::vm::scheduler::ids;
use jvmcheck::vm::*;

use Instruction::*;

/// Build a demo in a fresh class graph and hand its search report to `inspect`
fn check_demo(demo: Demo, settings: Settings, inspect: impl FnOnce(&SearchReport)) {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let main = demo.build(&class_graph, &java).unwrap();
    let (report, _) = check(java, settings, main);
    inspect(&report);
}

fn uncaught<'a, 'g>(violation: &'a Violation<'g>) -> (&'a str, Option<&'a str>) {
    match &violation.property {
        Property::UncaughtException { class, message, .. } => {
            (class.0.name.as_str(), message.as_deref())
        }
        other => panic!("expected an uncaught exception, found {}", other),
    }
}

#[test]
fn lost_update_is_found() {
    check_demo(Demo::LostUpdate, Settings::new(), |report| {
        assert_eq!(report.violations.len(), 1);

        let violation = &report.violations[0];
        assert_eq!(
            uncaught(violation),
            ("java/lang/AssertionError", Some("lost update"))
        );
        assert!(violation
            .trace
            .iter()
            .any(|record| matches!(record.choice, Choice::Thread(_))));
    });
}

#[test]
fn synchronized_counter_is_clean() {
    check_demo(Demo::SynchronizedCounter, Settings::new(), |report| {
        assert!(report.is_clean(), "{:?}", report.violations);
        assert!(report.statistics.end_states > 1);
    });
}

#[test]
fn opposite_lock_orders_deadlock() {
    check_demo(Demo::Deadlock, Settings::new(), |report| {
        match &report.violations[..] {
            [Violation {
                property: Property::Deadlock { threads },
                trace,
            }] => {
                assert!(threads.len() >= 2, "{:?}", threads);
                assert!(!trace.is_empty());
            }
            other => panic!("unexpected violations {:?}", other),
        }
    });
}

#[test]
fn array_store_is_checked() {
    check_demo(Demo::ArrayStore, Settings::new(), |report| {
        assert_eq!(report.violations.len(), 1);
        let (class, _) = uncaught(&report.violations[0]);
        assert_eq!(class, "java/lang/ArrayStoreException");
    });
}

#[test]
fn static_initializer_runs_once() {
    check_demo(Demo::ClinitRace, Settings::new(), |report| {
        assert!(report.is_clean(), "{:?}", report.violations);
    });
}

#[test]
fn nondeterministic_division_by_zero() {
    check_demo(Demo::Nondeterminism, Settings::new(), |report| {
        assert_eq!(report.violations.len(), 1);

        let violation = &report.violations[0];
        assert_eq!(
            uncaught(violation),
            ("java/lang/ArithmeticException", Some("/ by zero"))
        );
        let choices: Vec<Choice> = violation
            .trace
            .iter()
            .map(|record| record.choice)
            .filter(|choice| !matches!(choice, Choice::Thread(_)))
            .collect();
        assert_eq!(choices, vec![Choice::Int(3), Choice::Boolean(true)]);

        // x = 0, 1, 2 each succeed both ways, and x = 3 succeeds unnegated
        assert_eq!(report.statistics.end_states, 7);
    });
}

#[test]
fn demos_match_their_expectations() {
    for demo in Demo::ALL {
        assert_eq!(Demo::from_name(demo.name()), Some(demo));
        check_demo(demo, Settings::new(), |report| {
            assert_eq!(
                demo.expects_violation(),
                !report.is_clean(),
                "{}: {:?}",
                demo.name(),
                report.violations
            );
        });
    }
}

#[test]
fn all_violations_keeps_searching() {
    let mut first = (0, 0);
    check_demo(Demo::LostUpdate, Settings::new(), |report| {
        first = (report.violations.len(), report.statistics.end_states);
    });

    let mut settings = Settings::new();
    settings.stop_on_first_violation = false;
    check_demo(Demo::LostUpdate, settings, |report| {
        assert!(report.violations.len() > first.0);
        assert!(report.statistics.end_states > first.1);
    });
}

/// Two threads incrementing a static counter with the given body wrapped around the increment
fn two_incrementers<'g>(
    class_graph: &ClassGraph<'g>,
    java: &JavaLibrary<'g>,
    name: &str,
    wrap: impl Fn(Vec<Instruction<'g>>) -> Vec<Instruction<'g>>,
) -> (MethodId<'g>, FieldId<'g>) {
    let class = class(class_graph, java, name);
    let count = static_field(class_graph, class, "count", FieldType::int());
    let increment = vec![GetStatic(count), IConst1, IAdd, PutStatic(count)];
    let mut run = wrap(increment);
    run.push(Return);
    let incrementer = runnable(class_graph, java, &format!("{}$Incrementer", name), run);

    let main = static_method(class_graph, class, "main", vec![], None);
    let mut instructions = start_thread(java, incrementer);
    instructions.extend(start_thread(java, incrementer));
    instructions.push(Return);
    install(main, instructions);
    (main, count)
}

#[test]
fn unsynchronized_increments_can_be_lost() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let (main, count) = two_incrementers(&class_graph, &java, "Racy", |body| body);

    let (report, end_states) = check(java, Settings::new(), main);
    assert!(report.is_clean());
    let counts: Vec<Value> = end_states
        .iter()
        .map(|state| static_value(state, count))
        .collect();
    assert!(counts.contains(&Value::Int(1)));
    assert!(counts.contains(&Value::Int(2)));
}

#[test]
fn locked_increments_are_never_lost() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();

    let lock_holder = class(&class_graph, &java, "LockHolder");
    let lock = static_field(
        &class_graph,
        lock_holder,
        "lock",
        FieldType::object(java.classes.lang.object),
    );
    let (main, count) = two_incrementers(&class_graph, &java, "Locked", |body| {
        let mut run = vec![GetStatic(lock), MonitorEnter];
        run.extend(body);
        run.extend([GetStatic(lock), MonitorExit]);
        run
    });

    let init_lock = static_method(&class_graph, lock_holder, "main", vec![], None);
    let instructions = vec![
        New(java.classes.lang.object),
        Dup,
        Invoke(InvokeType::Special, java.members.lang.object.init),
        PutStatic(lock),
        Invoke(InvokeType::Static, main),
        Return,
    ];
    install(init_lock, instructions);

    let (report, end_states) = check(java, Settings::new(), init_lock);
    assert!(report.is_clean(), "{:?}", report.violations);
    assert!(end_states.len() > 1);
    for state in &end_states {
        assert_eq!(static_value(state, count), Value::Int(2));
    }
}

#[test]
fn atomic_sections_are_not_interleaved() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let verify = java.members.verify;
    let (main, count) = two_incrementers(&class_graph, &java, "Atomic", |body| {
        let mut run = vec![Invoke(InvokeType::Static, verify.begin_atomic)];
        run.extend(body);
        run.push(Invoke(InvokeType::Static, verify.end_atomic));
        run
    });

    let (report, end_states) = check(java, Settings::new(), main);
    assert!(report.is_clean(), "{:?}", report.violations);
    assert!(!end_states.is_empty());
    for state in &end_states {
        assert_eq!(static_value(state, count), Value::Int(2));
    }
}

#[test]
fn initializer_runs_once_per_path() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();

    let loaded = class(&class_graph, &java, "Loaded");
    let loads = static_field(&class_graph, loaded, "loads", FieldType::int());
    let clinit = class_graph.add_method(MethodData::new(
        loaded,
        UnqualifiedName::CLINIT,
        MethodDescriptor {
            parameters: vec![],
            return_type: None,
        },
        MethodAccessFlags::STATIC,
    ));
    install(
        clinit,
        vec![GetStatic(loads), IConst1, IAdd, PutStatic(loads), Return],
    );

    let touch = runnable(
        &class_graph,
        &java,
        "Loaded$Toucher",
        vec![GetStatic(loads), Pop, Return],
    );
    let class = class(&class_graph, &java, "Race");
    let main = static_method(&class_graph, class, "main", vec![], None);
    let mut instructions = start_thread(&java, touch);
    instructions.extend(start_thread(&java, touch));
    instructions.push(Return);
    install(main, instructions);

    let (report, end_states) = check(java, Settings::new(), main);
    assert!(report.is_clean(), "{:?}", report.violations);
    assert!(end_states.len() > 1);
    for state in &end_states {
        assert_eq!(static_value(state, loads), Value::Int(1));
    }
}

#[test]
fn boolean_choice_order_can_be_flipped() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let verify = java.members.verify;

    let mut results = vec![];
    for (name, false_first) in [("FalseFirst", IConst1), ("TrueFirst", IConst0)] {
        let class = class(&class_graph, &java, name);
        let flag = static_field(&class_graph, class, "flag", FieldType::boolean());
        let main = static_method(&class_graph, class, "main", vec![], None);
        install(
            main,
            vec![
                false_first,
                Invoke(InvokeType::Static, verify.get_boolean_flag),
                PutStatic(flag),
                Return,
            ],
        );
        results.push((main, flag));
    }

    let expected = [
        [Value::Int(0), Value::Int(1)],
        [Value::Int(1), Value::Int(0)],
    ];
    for ((main, flag), expected) in results.into_iter().zip(expected) {
        let (report, end_states) = check(java, Settings::new(), main);
        assert!(report.is_clean());
        let flags: Vec<Value> = end_states
            .iter()
            .map(|state| static_value(state, flag))
            .collect();
        assert_eq!(flags, expected);
    }
}

#[test]
fn empty_int_range_is_rejected() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let verify = java.members.verify;

    let class = class(&class_graph, &java, "EmptyRange");
    let main = static_method(&class_graph, class, "main", vec![], None);
    install(
        main,
        vec![
            IConst3,
            IConst1,
            Invoke(InvokeType::Static, verify.get_int),
            Pop,
            Return,
        ],
    );

    let (report, end_states) = check(java, Settings::new(), main);
    assert!(end_states.is_empty());
    assert_eq!(report.violations.len(), 1);
    let (class, message) = uncaught(&report.violations[0]);
    assert_eq!(class, "java/lang/IllegalArgumentException");
    assert_eq!(message, Some("min 3 is greater than max 1"));
}

/// Threads blocking in `lock.wait()` until `main` calls `wake` on the lock
///
/// Each waiter counts itself in `woken` once it gets the lock back.
fn waiters_and_waker<'g>(
    class_graph: &ClassGraph<'g>,
    java: &JavaLibrary<'g>,
    name: &str,
    waiters: usize,
    wake: MethodId<'g>,
) -> (MethodId<'g>, FieldId<'g>, FieldId<'g>) {
    let object = &java.members.lang.object;
    let class = class(class_graph, java, name);
    let lock = static_field(
        class_graph,
        class,
        "lock",
        FieldType::object(java.classes.lang.object),
    );
    let woken = static_field(class_graph, class, "woken", FieldType::int());

    let waiter = runnable(
        class_graph,
        java,
        &format!("{}$Waiter", name),
        vec![
            GetStatic(lock),
            AStore(1),
            ALoad(1),
            MonitorEnter,
            ALoad(1),
            Invoke(object.wait.0.infer_invoke_type(), object.wait),
            GetStatic(woken),
            IConst1,
            IAdd,
            PutStatic(woken),
            ALoad(1),
            MonitorExit,
            Return,
        ],
    );

    let main = static_method(class_graph, class, "main", vec![], None);
    let mut instructions = vec![
        New(java.classes.lang.object),
        Dup,
        Invoke(InvokeType::Special, object.init),
        PutStatic(lock),
    ];
    for _ in 0..waiters {
        instructions.extend(start_thread(java, waiter));
    }
    instructions.extend([
        GetStatic(lock),
        AStore(0),
        ALoad(0),
        MonitorEnter,
        ALoad(0),
        Invoke(wake.0.infer_invoke_type(), wake),
        ALoad(0),
        MonitorExit,
        Return,
    ]);
    install(main, instructions);
    (main, lock, woken)
}

/// Keep searching past violations, with no field access choices on the test classes
fn exhaustive() -> Settings {
    let mut settings = Settings::new();
    settings.stop_on_first_violation = false;
    settings.never_break_on_types = vec![String::from("test/*")];
    settings
}

#[test]
fn notify_hands_the_lock_back_to_the_waiter() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let notify = java.members.lang.object.notify;
    let (main, lock, woken) = waiters_and_waker(&class_graph, &java, "Handoff", 1, notify);

    let (report, end_states) = check(java, exhaustive(), main);

    // Notifying before the waiter got to `wait` leaves it waiting forever
    assert!(!report.violations.is_empty());
    for violation in &report.violations {
        match &violation.property {
            Property::Deadlock { threads } => assert_eq!(threads.len(), 1),
            other => panic!("unexpected violation {}", other),
        }
    }

    assert!(!end_states.is_empty());
    for state in &end_states {
        assert_eq!(static_value(state, woken), Value::Int(1));
        let object = static_value(state, lock).as_reference().unwrap().unwrap();
        assert_eq!(state.heap.get(object).unwrap().monitor, Monitor::default());
        assert!(state.threads().all(|thread| thread.locked_objects.is_empty()));
    }
}

#[test]
fn one_notify_leaves_a_waiter_behind() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let notify = java.members.lang.object.notify;
    let (main, _, _) = waiters_and_waker(&class_graph, &java, "SingleNotify", 2, notify);

    let (report, end_states) = check(java, exhaustive(), main);
    assert!(end_states.is_empty());
    assert!(!report.violations.is_empty());
    assert!(report
        .violations
        .iter()
        .all(|violation| matches!(violation.property, Property::Deadlock { .. })));

    // With both threads waiting, either one may be the one woken up
    let picks: Vec<&ChoiceRecord> = report
        .violations
        .iter()
        .flat_map(|violation| &violation.trace)
        .filter(|record| record.id == ids::NOTIFY_WAITER)
        .collect();
    assert!(picks.iter().any(|record| record.index == 0));
    assert!(picks.iter().any(|record| record.index == 1));
}

#[test]
fn notify_all_wakes_every_waiter() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let notify_all = java.members.lang.object.notify_all;
    let (main, lock, woken) = waiters_and_waker(&class_graph, &java, "Broadcast", 2, notify_all);

    let (report, end_states) = check(java, exhaustive(), main);
    assert!(report
        .violations
        .iter()
        .all(|violation| matches!(violation.property, Property::Deadlock { .. })));

    assert!(!end_states.is_empty());
    for state in &end_states {
        assert_eq!(static_value(state, woken), Value::Int(2));
        let object = static_value(state, lock).as_reference().unwrap().unwrap();
        assert_eq!(state.heap.get(object).unwrap().monitor, Monitor::default());
    }
}

/// `main` starting a thread which sets `value`, then copying `value` into `seen`
fn start_then_read<'g>(
    class_graph: &ClassGraph<'g>,
    java: &JavaLibrary<'g>,
    name: &str,
    join: bool,
) -> (MethodId<'g>, FieldId<'g>) {
    let thread = &java.members.lang.thread;
    let class = class(class_graph, java, name);
    let value = static_field(class_graph, class, "value", FieldType::int());
    let seen = static_field(class_graph, class, "seen", FieldType::int());
    let worker = runnable(
        class_graph,
        java,
        &format!("{}$Worker", name),
        vec![IConst1, PutStatic(value), Return],
    );

    let main = static_method(class_graph, class, "main", vec![], None);
    let mut instructions = vec![
        New(java.classes.lang.thread),
        Dup,
        New(worker.0.class),
        Dup,
        Invoke(InvokeType::Special, worker),
        Invoke(InvokeType::Special, thread.init_runnable),
        AStore(0),
        ALoad(0),
        Invoke(thread.start.0.infer_invoke_type(), thread.start),
    ];
    if join {
        instructions.extend([
            ALoad(0),
            Invoke(thread.join.0.infer_invoke_type(), thread.join),
        ]);
    }
    instructions.extend([GetStatic(value), PutStatic(seen), Return]);
    install(main, instructions);
    (main, seen)
}

#[test]
fn join_waits_for_the_thread_to_finish() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let (racy, racy_seen) = start_then_read(&class_graph, &java, "NoJoin", false);
    let (joined, joined_seen) = start_then_read(&class_graph, &java, "Join", true);

    let (report, end_states) = check(java, Settings::new(), racy);
    assert!(report.is_clean());
    let seen: Vec<Value> = end_states
        .iter()
        .map(|state| static_value(state, racy_seen))
        .collect();
    assert!(seen.contains(&Value::Int(0)));
    assert!(seen.contains(&Value::Int(1)));

    let (report, end_states) = check(java, Settings::new(), joined);
    assert!(report.is_clean(), "{:?}", report.violations);
    assert!(!end_states.is_empty());
    for state in &end_states {
        assert_eq!(static_value(state, joined_seen), Value::Int(1));
    }
}

#[test]
fn attributes_follow_values_through_the_heap() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();

    let holder = class(&class_graph, &java, "Tainted$Holder");
    let held = instance_field(&class_graph, holder, "held", FieldType::int());
    let class = class(&class_graph, &java, "Tainted");
    let stored = static_field(&class_graph, class, "stored", FieldType::int());
    let copied = static_field(&class_graph, class, "copied", FieldType::int());
    let clean = static_field(&class_graph, class, "clean", FieldType::int());

    // local 0 -> static -> local 1 -> instance field -> local 3 -> array element -> static
    let main = static_method(&class_graph, class, "main", vec![FieldType::int()], None);
    install(
        main,
        vec![
            ILoad(0),
            PutStatic(stored),
            GetStatic(stored),
            IStore(1),
            New(holder),
            Dup,
            Invoke(InvokeType::Special, java.members.lang.object.init),
            AStore(2),
            ALoad(2),
            ILoad(1),
            PutField(held),
            ALoad(2),
            GetField(held),
            IStore(3),
            IConst1,
            NewArray(BaseType::Int),
            AStore(4),
            ALoad(4),
            IConst0,
            ILoad(3),
            IAStore,
            ALoad(4),
            IConst0,
            IALoad,
            PutStatic(copied),
            IConst5,
            PutStatic(clean),
            Return,
        ],
    );

    let tainted = Attr::new("tainted");
    let mut vm = Vm::new(java, Settings::new());
    let thread = vm.start(main).unwrap();
    vm.state.thread_mut(thread).unwrap().stack[0]
        .store(0, Slot::with_attr(Value::Int(5), Some(tainted.clone())))
        .unwrap();

    let mut end_states = vec![];
    let report = Search::new(&mut vm)
        .on_end_state(|state, _| end_states.push(state.clone()))
        .run()
        .unwrap();
    assert!(report.is_clean(), "{:?}", report.violations);
    assert_eq!(end_states.len(), 1);

    let state = &end_states[0];
    let statics = state.heap.statics(class).unwrap();
    let statics = state.heap.get(statics).unwrap();
    let slot = |field| statics.field(field).unwrap().clone();
    assert_eq!(slot(stored), Slot::with_attr(Value::Int(5), Some(tainted.clone())));
    assert_eq!(slot(copied), Slot::with_attr(Value::Int(5), Some(tainted)));
    assert_eq!(slot(clean), Slot::new(Value::Int(5)));
}

/// Ids of the choice generators along every path to an end state
fn end_state_paths<'g>(
    java: JavaLibrary<'g>,
    settings: Settings,
    main: MethodId<'g>,
) -> Vec<Vec<&'static str>> {
    let mut vm = Vm::new(java, settings);
    vm.start(main).unwrap();
    let mut paths = vec![];
    let report = Search::new(&mut vm)
        .on_end_state(|_, path| paths.push(path.iter().map(|record| record.id).collect()))
        .run()
        .unwrap();
    assert!(report.is_clean(), "{:?}", report.violations);
    paths
}

#[test]
fn long_transitions_are_broken_up() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();

    let class = class(&class_graph, &java, "Busy");
    let main = static_method(&class_graph, class, "main", vec![], None);
    let mut instructions = vec![Nop; 25];
    instructions.push(Return);
    install(main, instructions);

    let breaks = |settings| {
        let paths = end_state_paths(java, settings, main);
        assert_eq!(paths.len(), 1);
        paths[0]
            .iter()
            .filter(|id| **id == ids::MAX_TRANSITION_LENGTH)
            .count()
    };

    let mut settings = Settings::new();
    settings.break_single_choice = true;
    assert_eq!(breaks(settings.clone()), 0);

    settings.max_transition_length = 10;
    assert!(breaks(settings.clone()) >= 2);

    // A lone thread is never rescheduled unless single choices are kept
    settings.break_single_choice = false;
    assert_eq!(breaks(settings), 0);
}

#[test]
fn storing_a_new_object_into_a_static_exposes_it() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();

    let class = class(&class_graph, &java, "Publish");
    let published = static_field(
        &class_graph,
        class,
        "published",
        FieldType::object(java.classes.lang.object),
    );
    let reader = runnable(
        &class_graph,
        &java,
        "Publish$Reader",
        vec![GetStatic(published), Pop, Return],
    );
    let main = static_method(&class_graph, class, "main", vec![], None);
    let mut instructions = start_thread(&java, reader);
    instructions.extend([
        New(java.classes.lang.object),
        Dup,
        Invoke(InvokeType::Special, java.members.lang.object.init),
        PutStatic(published),
        Return,
    ]);
    install(main, instructions);

    let exposures = |settings| {
        end_state_paths(java, settings, main)
            .iter()
            .filter(|path| path.contains(&ids::EXPOSE))
            .count()
    };
    assert!(exposures(Settings::new()) > 0);

    let mut settings = Settings::new();
    settings.break_on_exposure = false;
    assert_eq!(exposures(settings), 0);
}

/// Class and message of the one uncaught exception reachable from `main`
fn single_fault<'g>(
    java: JavaLibrary<'g>,
    settings: Settings,
    main: MethodId<'g>,
) -> (String, Option<String>) {
    let (report, end_states) = check(java, settings, main);
    assert!(end_states.is_empty());
    assert_eq!(report.violations.len(), 1, "{:?}", report.violations);
    let (class, message) = uncaught(&report.violations[0]);
    (class.to_owned(), message.map(str::to_owned))
}

#[test]
fn unbounded_recursion_overflows_the_stack() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();

    let class = class(&class_graph, &java, "Recursion");
    let recurse = static_method(&class_graph, class, "recurse", vec![], None);
    install(recurse, vec![Invoke(InvokeType::Static, recurse), Return]);
    let main = static_method(&class_graph, class, "main", vec![], None);
    install(main, vec![Invoke(InvokeType::Static, recurse), Return]);

    let mut settings = Settings::new();
    settings.max_stack_depth = 16;
    assert_eq!(
        single_fault(java, settings, main),
        (String::from("java/lang/StackOverflowError"), None)
    );
}

#[test]
fn allocations_past_the_limits_run_out_of_memory() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();

    let class = class(&class_graph, &java, "Hog");
    let huge_array = static_method(&class_graph, class, "hugeArray", vec![], None);
    install(
        huge_array,
        vec![
            Ldc(ConstantData::Integer(i32::MAX)),
            NewArray(BaseType::Long),
            Pop,
            Return,
        ],
    );

    // while (true) { new Object(); }
    let many_objects = static_method(&class_graph, class, "manyObjects", vec![], None);
    let mut code = CodeBuilder::new(many_objects);
    let top = code.fresh_label();
    code.place_label(top).unwrap();
    code.push_instruction(New(java.classes.lang.object)).unwrap();
    code.push_instruction(Pop).unwrap();
    code.push_branch_instruction(BranchInstruction::Goto(top))
        .unwrap();
    code.install().unwrap();

    let out_of_memory = (String::from("java/lang/OutOfMemoryError"), None);
    assert_eq!(single_fault(java, Settings::new(), huge_array), out_of_memory);

    let mut settings = Settings::new();
    settings.max_heap_objects = 200;
    assert_eq!(single_fault(java, settings, many_objects), out_of_memory);
}

#[test]
fn negative_array_sizes_are_rejected() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();

    let class = class(&class_graph, &java, "Negative");
    let main = static_method(&class_graph, class, "main", vec![], None);
    install(main, vec![IConstM1, NewArray(BaseType::Int), Pop, Return]);

    assert_eq!(
        single_fault(java, Settings::new(), main),
        (
            String::from("java/lang/NegativeArraySizeException"),
            Some(String::from("-1"))
        )
    );
}

#[test]
fn bad_casts_throw() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();

    let class = class(&class_graph, &java, "Cast");
    let main = static_method(&class_graph, class, "main", vec![], None);
    install(
        main,
        vec![
            New(java.classes.lang.object),
            Dup,
            Invoke(InvokeType::Special, java.members.lang.object.init),
            CheckCast(RefType::Object(java.classes.lang.string)),
            Pop,
            Return,
        ],
    );

    assert_eq!(
        single_fault(java, Settings::new(), main),
        (
            String::from("java/lang/ClassCastException"),
            Some(String::from(
                "class java.lang.Object cannot be cast to class java.lang.String"
            ))
        )
    );
}

/// `main` calling `method` on a fresh instance of `receiver`
fn call_on_object<'g>(
    class_graph: &ClassGraph<'g>,
    java: &JavaLibrary<'g>,
    name: &str,
    receiver: ClassId<'g>,
    method: MethodId<'g>,
) -> MethodId<'g> {
    let class = class(class_graph, java, name);
    let main = static_method(class_graph, class, "main", vec![], None);
    install(
        main,
        vec![
            New(receiver),
            Dup,
            Invoke(InvokeType::Special, java.members.lang.object.init),
            Invoke(method.0.infer_invoke_type(), method),
            Return,
        ],
    );
    main
}

#[test]
fn unresolvable_calls_throw_linkage_errors() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let object = java.classes.lang.object;

    // A method the receiver's class does not have at all
    let elsewhere = class(&class_graph, &java, "Elsewhere");
    let greet = instance_method(&class_graph, elsewhere, "greet", None, MethodAccessFlags::empty());
    install(greet, vec![Return]);
    let missing = call_on_object(&class_graph, &java, "Missing", object, greet);

    // A receiver whose class never implemented an abstract method
    let shape = class(&class_graph, &java, "Shape");
    let draw = instance_method(
        &class_graph,
        shape,
        "draw",
        None,
        MethodAccessFlags::ABSTRACT,
    );
    let abstract_call = call_on_object(&class_graph, &java, "Unimplemented", shape, draw);

    // An interface call on an object which does not implement the interface
    let run = java.members.lang.runnable.run;
    let not_runnable = call_on_object(&class_graph, &java, "NotRunnable", object, run);

    let expected = [
        (missing, "java/lang/NoSuchMethodError"),
        (abstract_call, "java/lang/AbstractMethodError"),
        (not_runnable, "java/lang/IncompatibleClassChangeError"),
    ];
    for (main, error) in expected {
        let (class, _) = single_fault(java, Settings::new(), main);
        assert_eq!(class, error);
    }
}
