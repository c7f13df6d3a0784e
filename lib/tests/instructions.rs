mod common;

use common::*;
use jvmcheck::jvm::class_graph::*;
use jvmcheck::jvm::code::*;
use jvmcheck::jvm::*;
use jvmcheck::search::{Search, Violation};
use jvmcheck::vm::scheduler::ids;
use jvmcheck::vm::*;
use std::cell::Cell;
use std::rc::Rc;

use Instruction::*;

/// Checks that every completed instruction changes the operand stack by its documented amount
struct StackDeltas {
    before: Option<(usize, usize)>,
    checked: Rc<Cell<usize>>,
}

impl<'g> VmListener<'g> for StackDeltas {
    fn executing_instruction(
        &mut self,
        state: &VmState<'g>,
        thread: ThreadId,
        _instruction: &Instruction<'g>,
    ) {
        let info = state.thread(thread).unwrap();
        self.before = Some((info.stack.len(), info.top_frame().unwrap().operand_depth()));
    }

    fn instruction_executed(
        &mut self,
        state: &VmState<'g>,
        thread: ThreadId,
        instruction: &Instruction<'g>,
    ) {
        let (frames, depth) = self.before.take().unwrap();
        let info = state.thread(thread).unwrap();
        if let (Some(delta), true) = (instruction.stack_delta(), info.stack.len() == frames) {
            let after = info.top_frame().unwrap().operand_depth();
            assert_eq!(
                after as isize - depth as isize,
                delta,
                "stack delta of {:?}",
                instruction
            );
            self.checked.set(self.checked.get() + 1);
        }
    }
}

#[test]
fn stack_discipline() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();

    let class = class(&class_graph, &java, "Stack");
    let int_result = static_field(&class_graph, class, "intResult", FieldType::int());
    let long_result = static_field(&class_graph, class, "longResult", FieldType::long());
    let main = static_method(&class_graph, class, "main", vec![], None);

    let mut code = CodeBuilder::new(main);
    let skip = code.fresh_label();
    for instruction in [
        IConst5,
        IConst3,
        IAdd,
        I2L,
        LConst1,
        LAdd,
        L2D,
        DConst1,
        DAdd,
        D2F,
        FConst2,
        FMul,
        F2I,
        IConst2,
        ISh(ShiftType::Left),
        BiPush(7),
        IRem,
        INeg,
        IStore(0),
        IInc(0, 10),
        ILoad(0),
        Dup,
        IMul,
        IStore(1),
        Ldc(ConstantData::Long(1 << 40)),
        Dup2,
        LAdd,
        LStore(2),
        IConst3,
        NewArray(BaseType::Int),
        AStore(4),
        ALoad(4),
        IConst1,
        ILoad(1),
        IAStore,
        ALoad(4),
        IConst1,
        IALoad,
        ALoad(4),
        ArrayLength,
        ISub,
        IConst1,
        IConst2,
        DupX1,
        Pop,
        Swap,
        Pop,
        IAdd,
        DConst0,
        DConst1,
        DCmp(CompareMode::G),
        IAdd,
    ] {
        code.push_instruction(instruction).unwrap();
    }
    code.push_instruction(Dup).unwrap();
    code.push_branch_instruction(BranchInstruction::If(OrdComparison::LT, skip))
        .unwrap();
    code.push_instruction(PutStatic(int_result)).unwrap();
    code.push_instruction(LLoad(2)).unwrap();
    code.push_instruction(PutStatic(long_result)).unwrap();
    code.push_instruction(Return).unwrap();
    code.place_label(skip).unwrap();
    code.push_instruction(Pop).unwrap();
    code.push_instruction(Return).unwrap();
    code.install().unwrap();

    let checked = Rc::new(Cell::new(0));
    let mut vm = Vm::new(java, Settings::new());
    vm.add_listener(Box::new(StackDeltas {
        before: None,
        checked: checked.clone(),
    }));
    vm.start(main).unwrap();

    let mut end_states = vec![];
    let report = Search::new(&mut vm)
        .on_end_state(|state, _| end_states.push(state.clone()))
        .run()
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(end_states.len(), 1);

    // ((5 + 3 + 1 + 1.0) * 2 << 2) % 7 = 3, so x = -3 + 10 = 7 and 7 * 7 - 3 + 1 - 1 = 46
    assert_eq!(static_value(&end_states[0], int_result), Value::Int(46));
    assert_eq!(static_value(&end_states[0], long_result), Value::Long(1 << 41));
    assert!(checked.get() >= 50);
}

/// `main` that stores the result of the given code into a static field
fn compute<'g>(
    class_graph: &ClassGraph<'g>,
    java: &JavaLibrary<'g>,
    name: &str,
    result_type: FieldType<ClassId<'g>>,
    mut instructions: Vec<Instruction<'g>>,
) -> (MethodId<'g>, FieldId<'g>) {
    let class = class(class_graph, java, name);
    let result = static_field(class_graph, class, "result", result_type);
    let main = static_method(class_graph, class, "main", vec![], None);
    instructions.push(PutStatic(result));
    instructions.push(Return);
    install(main, instructions);
    (main, result)
}

fn computed_value<'g>(
    java: JavaLibrary<'g>,
    main: MethodId<'g>,
    result: FieldId<'g>,
) -> Value {
    let (report, end_states) = check(java, Settings::new(), main);
    assert!(report.is_clean(), "{:?}", report.violations);
    assert_eq!(end_states.len(), 1);
    static_value(&end_states[0], result)
}

#[test]
fn long_division_overflow_wraps() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let (main, result) = compute(
        &class_graph,
        &java,
        "LongOverflow",
        FieldType::long(),
        vec![
            Ldc(ConstantData::Long(i64::MIN)),
            Ldc(ConstantData::Long(-1)),
            LDiv,
        ],
    );
    assert_eq!(computed_value(java, main, result), Value::Long(i64::MIN));
}

#[test]
fn int_remainder_overflow_is_zero() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let (main, result) = compute(
        &class_graph,
        &java,
        "IntOverflow",
        FieldType::int(),
        vec![Ldc(ConstantData::Integer(i32::MIN)), IConstM1, IRem],
    );
    assert_eq!(computed_value(java, main, result), Value::Int(0));
}

#[test]
fn float_division_by_zero_is_ieee() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let (main, result) = compute(
        &class_graph,
        &java,
        "FloatDivide",
        FieldType::float(),
        vec![FConst1, FConst0, FDiv],
    );
    assert_eq!(
        computed_value(java, main, result),
        Value::Float(f32::INFINITY)
    );
}

#[test]
fn nan_comparisons() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let nan_double = || vec![DConst0, DConst0, DDiv, DConst1];
    let nan_float = || vec![FConst0, FConst0, FDiv, FConst1];

    let cases = [
        ("DCmpG", nan_double(), DCmp(CompareMode::G), 1),
        ("DCmpL", nan_double(), DCmp(CompareMode::L), -1),
        ("FCmpG", nan_float(), FCmp(CompareMode::G), 1),
        ("FCmpL", nan_float(), FCmp(CompareMode::L), -1),
    ];
    let mut programs = vec![];
    for (name, mut instructions, compare, expected) in cases {
        instructions.push(compare);
        let (main, result) = compute(&class_graph, &java, name, FieldType::int(), instructions);
        programs.push((main, result, expected));
    }
    for (main, result, expected) in programs {
        assert_eq!(computed_value(java, main, result), Value::Int(expected));
    }
}

#[test]
fn integer_division_by_zero_throws() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let arithmetic_exception = java.classes.lang.arithmetic_exception;
    let (main, _) = compute(
        &class_graph,
        &java,
        "LongDivide",
        FieldType::long(),
        vec![LConst1, LConst0, LDiv],
    );

    let (report, end_states) = check(java, Settings::new(), main);
    assert!(end_states.is_empty());
    match &report.violations[..] {
        [Violation {
            property: Property::UncaughtException { class, message, .. },
            ..
        }] => {
            assert_eq!(*class, arithmetic_exception);
            assert_eq!(message.as_deref(), Some("/ by zero"));
        }
        other => panic!("unexpected violations {:?}", other),
    }
}

/// ```java,ignore
/// int[] a = new int[3];
/// a[2] = 7;
/// try { a[index] = 9; } catch (ArrayIndexOutOfBoundsException e) { caught = 1; }
/// ```
fn out_of_bounds_store<'g>(
    class_graph: &ClassGraph<'g>,
    java: &JavaLibrary<'g>,
    name: &str,
    index: i8,
) -> (MethodId<'g>, FieldId<'g>, FieldId<'g>) {
    let class = class(class_graph, java, name);
    let array = static_field(
        class_graph,
        class,
        "array",
        FieldType::array(FieldType::int()),
    );
    let caught = static_field(class_graph, class, "caught", FieldType::int());
    let main = static_method(class_graph, class, "main", vec![], None);

    let mut code = CodeBuilder::new(main);
    let start = code.fresh_label();
    let end = code.fresh_label();
    let handler = code.fresh_label();
    for instruction in [
        IConst3,
        NewArray(BaseType::Int),
        Dup,
        PutStatic(array),
        IConst2,
        BiPush(7),
        IAStore,
    ] {
        code.push_instruction(instruction).unwrap();
    }
    code.place_label(start).unwrap();
    for instruction in [GetStatic(array), BiPush(index), BiPush(9), IAStore] {
        code.push_instruction(instruction).unwrap();
    }
    code.place_label(end).unwrap();
    code.push_instruction(Return).unwrap();
    code.place_label(handler).unwrap();
    for instruction in [Pop, IConst1, PutStatic(caught), Return] {
        code.push_instruction(instruction).unwrap();
    }
    code.add_exception_handler(
        start,
        end,
        handler,
        Some(java.classes.lang.array_index_out_of_bounds_exception),
    );
    code.install().unwrap();
    (main, array, caught)
}

fn int_array<'g>(state: &VmState<'g>, array: FieldId<'g>) -> Vec<Value> {
    let reference = static_value(state, array).as_reference().unwrap().unwrap();
    state
        .heap
        .get(reference)
        .unwrap()
        .array_elements(reference)
        .unwrap()
        .iter()
        .map(|slot| slot.value)
        .collect()
}

#[test]
fn array_bounds() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();

    for index in [-1, 0, 2, 3, 5] {
        let name = format!("Bounds{}", index + 1);
        let (main, array, caught) = out_of_bounds_store(&class_graph, &java, &name, index);
        let (report, end_states) = check(java, Settings::new(), main);
        assert!(report.is_clean());
        let state = &end_states[0];

        let in_bounds = (0..3).contains(&index);
        let mut expected = vec![Value::Int(0), Value::Int(0), Value::Int(7)];
        if in_bounds {
            expected[index as usize] = Value::Int(9);
        }
        assert_eq!(int_array(state, array), expected, "a[{}] = 9", index);
        assert_eq!(
            static_value(state, caught),
            Value::Int(i32::from(!in_bounds)),
            "a[{}] = 9",
            index
        );
    }
}

#[test]
fn covariant_array_stores() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let string = java.classes.lang.string;

    // Object[] a = new String[2]; a[0] = "s"; a[1] = null;
    let (main, array) = compute(
        &class_graph,
        &java,
        "CovariantStore",
        FieldType::array(FieldType::object(java.classes.lang.object)),
        vec![
            IConst2,
            ANewArray(RefType::Object(string)),
            Dup,
            IConst0,
            Ldc(ConstantData::String("s".into())),
            AAStore,
            Dup,
            IConst1,
            AConstNull,
            AAStore,
        ],
    );
    let (report, end_states) = check(java, Settings::new(), main);
    assert!(report.is_clean());

    let state = &end_states[0];
    let reference = static_value(state, array).as_reference().unwrap().unwrap();
    let elements = state.heap.get(reference).unwrap().array_elements(reference).unwrap();
    let first = elements[0].value.as_reference().unwrap().unwrap();
    assert_eq!(
        state.heap.get(first).unwrap().string_value().map(|s| &**s),
        Some("s")
    );
    assert_eq!(elements[1].value, Value::Null);
}

#[test]
fn exceptions_unwind_to_the_caller() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let runtime_exception = java.classes.lang.runtime_exception;
    let constructors = ThrowableConstructors::lookup(&java.classes, runtime_exception).unwrap();
    let get_message = java.members.lang.throwable.get_message;

    let class = class(&class_graph, &java, "Unwind");
    let message = static_field(
        &class_graph,
        class,
        "message",
        FieldType::object(java.classes.lang.string),
    );
    let thrower = static_method(&class_graph, class, "thrower", vec![], Some(FieldType::int()));
    install(
        thrower,
        vec![
            New(runtime_exception),
            Dup,
            Ldc(ConstantData::String("boom".into())),
            Invoke(InvokeType::Special, constructors.init_message),
            AThrow,
        ],
    );

    // try { thrower(); } catch (RuntimeException e) { message = e.getMessage(); }
    let main = static_method(&class_graph, class, "main", vec![], None);
    let mut code = CodeBuilder::new(main);
    let start = code.fresh_label();
    let end = code.fresh_label();
    let handler = code.fresh_label();
    code.place_label(start).unwrap();
    code.push_instruction(Invoke(InvokeType::Static, thrower)).unwrap();
    code.push_instruction(Pop).unwrap();
    code.place_label(end).unwrap();
    code.push_instruction(Return).unwrap();
    code.place_label(handler).unwrap();
    code.push_instruction(Invoke(get_message.0.infer_invoke_type(), get_message))
        .unwrap();
    code.push_instruction(PutStatic(message)).unwrap();
    code.push_instruction(Return).unwrap();
    code.add_exception_handler(start, end, handler, Some(runtime_exception));
    code.install().unwrap();

    let (report, end_states) = check(java, Settings::new(), main);
    assert!(report.is_clean());
    let state = &end_states[0];
    let string = static_value(state, message).as_reference().unwrap().unwrap();
    assert_eq!(
        state.heap.get(string).unwrap().string_value().map(|s| &**s),
        Some("boom")
    );
}

/// Asserts that the lock is completely free whenever a lock release choice is registered
struct ReleaseWatcher<'g> {
    lock: FieldId<'g>,
    releases: Rc<Cell<usize>>,
}

impl<'g> VmListener<'g> for ReleaseWatcher<'g> {
    fn choice_generator_registered(&mut self, state: &VmState<'g>, cg: &dyn ChoiceGenerator) {
        if cg.id() != ids::RELEASE {
            return;
        }
        let lock = static_value(state, self.lock).as_reference().unwrap().unwrap();
        let monitor = state.heap.get(lock).unwrap().monitor;
        assert_eq!(monitor, Monitor::default());
        self.releases.set(self.releases.get() + 1);
    }
}

#[test]
fn recursive_locks_release_once() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();

    let class = class(&class_graph, &java, "Recursive");
    let lock = static_field(
        &class_graph,
        class,
        "lock",
        FieldType::object(java.classes.lang.object),
    );

    let mut run = vec![];
    for _ in 0..3 {
        run.extend([GetStatic(lock), MonitorEnter]);
    }
    for _ in 0..3 {
        run.extend([GetStatic(lock), MonitorExit]);
    }
    run.push(Return);
    let nested = runnable(&class_graph, &java, "Recursive$Nested", run);

    let main = static_method(&class_graph, class, "main", vec![], None);
    let mut instructions = vec![
        New(java.classes.lang.object),
        Dup,
        Invoke(InvokeType::Special, java.members.lang.object.init),
        PutStatic(lock),
    ];
    instructions.extend(start_thread(&java, nested));
    instructions.extend([
        GetStatic(lock),
        MonitorEnter,
        GetStatic(lock),
        MonitorExit,
        Return,
    ]);
    install(main, instructions);

    let releases = Rc::new(Cell::new(0));
    let mut vm = Vm::new(java, Settings::new());
    vm.add_listener(Box::new(ReleaseWatcher {
        lock,
        releases: releases.clone(),
    }));
    vm.start(main).unwrap();

    let mut end_states = vec![];
    let report = Search::new(&mut vm)
        .on_end_state(|state, _| end_states.push(state.clone()))
        .run()
        .unwrap();
    assert!(report.is_clean());
    assert!(releases.get() > 0);
    assert!(end_states.len() > 1);
    for state in &end_states {
        let object = static_value(state, lock).as_reference().unwrap().unwrap();
        assert_eq!(state.heap.get(object).unwrap().monitor, Monitor::default());
        assert!(state.threads().all(|thread| thread.locked_objects.is_empty()));
    }
}

/// Subclass of `superclass` with a constructor chaining to the superclass constructor
fn subclass<'g>(
    class_graph: &ClassGraph<'g>,
    name: &str,
    superclass: ClassId<'g>,
    super_init: MethodId<'g>,
) -> (ClassId<'g>, MethodId<'g>) {
    let class = class_graph.add_class(ClassData::new(
        BinaryName::from_string(format!("test/{}", name)).unwrap(),
        superclass,
        ClassAccessFlags::PUBLIC,
    ));
    let init = class_graph.add_method(MethodData::new(
        class,
        UnqualifiedName::INIT,
        MethodDescriptor {
            parameters: vec![],
            return_type: None,
        },
        MethodAccessFlags::PUBLIC,
    ));
    install(
        init,
        vec![ALoad(0), Invoke(InvokeType::Special, super_init), Return],
    );
    (class, init)
}

#[test]
fn super_calls_skip_to_the_closest_override() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let object = &java.members.lang.object;

    // class Grand { int value() { return 1; } }
    // class Mid extends Grand { int value() { return 2; } }
    // class Leaf extends Mid { int superValue() { return super.value(); } }
    // where `Leaf.superValue` was compiled against `Grand.value`
    let (grand, grand_init) =
        subclass(&class_graph, "Grand", java.classes.lang.object, object.init);
    let (mid, mid_init) = subclass(&class_graph, "Mid", grand, grand_init);
    let (leaf, leaf_init) = subclass(&class_graph, "Leaf", mid, mid_init);
    let value = |class, constant| {
        let method = instance_method(
            &class_graph,
            class,
            "value",
            Some(FieldType::int()),
            MethodAccessFlags::empty(),
        );
        install(method, vec![constant, IReturn]);
        method
    };
    let grand_value = value(grand, IConst1);
    value(mid, IConst2);
    let super_value = instance_method(
        &class_graph,
        leaf,
        "superValue",
        Some(FieldType::int()),
        MethodAccessFlags::empty(),
    );
    install(
        super_value,
        vec![ALoad(0), Invoke(InvokeType::Special, grand_value), IReturn],
    );

    let (main, result) = compute(
        &class_graph,
        &java,
        "SuperCall",
        FieldType::int(),
        vec![
            New(leaf),
            Dup,
            Invoke(InvokeType::Special, leaf_init),
            Invoke(InvokeType::Virtual, super_value),
        ],
    );
    assert_eq!(computed_value(java, main, result), Value::Int(2));
}
