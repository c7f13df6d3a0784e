//! Helpers for building small programs directly in a class graph

#![allow(dead_code)]

use jvmcheck::jvm::class_graph::*;
use jvmcheck::jvm::code::{CodeBuilder, Instruction, InvokeType};
use jvmcheck::jvm::*;
use jvmcheck::search::{Search, SearchReport};
use jvmcheck::vm::{Settings, Value, Vm, VmState};

pub fn class<'g>(class_graph: &ClassGraph<'g>, java: &JavaLibrary<'g>, name: &str) -> ClassId<'g> {
    class_graph.add_class(ClassData::new(
        BinaryName::from_string(format!("test/{}", name)).unwrap(),
        java.classes.lang.object,
        ClassAccessFlags::PUBLIC,
    ))
}

pub fn static_method<'g>(
    class_graph: &ClassGraph<'g>,
    class: ClassId<'g>,
    name: &str,
    parameters: Vec<FieldType<ClassId<'g>>>,
    return_type: Option<FieldType<ClassId<'g>>>,
) -> MethodId<'g> {
    class_graph.add_method(MethodData::new(
        class,
        UnqualifiedName::from_string(String::from(name)).unwrap(),
        MethodDescriptor {
            parameters,
            return_type,
        },
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
    ))
}

/// Public instance method taking no arguments
pub fn instance_method<'g>(
    class_graph: &ClassGraph<'g>,
    class: ClassId<'g>,
    name: &str,
    return_type: Option<FieldType<ClassId<'g>>>,
    extra_flags: MethodAccessFlags,
) -> MethodId<'g> {
    class_graph.add_method(MethodData::new(
        class,
        UnqualifiedName::from_string(String::from(name)).unwrap(),
        MethodDescriptor {
            parameters: vec![],
            return_type,
        },
        MethodAccessFlags::PUBLIC | extra_flags,
    ))
}

pub fn static_field<'g>(
    class_graph: &ClassGraph<'g>,
    class: ClassId<'g>,
    name: &str,
    descriptor: FieldType<ClassId<'g>>,
) -> FieldId<'g> {
    class_graph.add_field(FieldData {
        class,
        name: UnqualifiedName::from_string(String::from(name)).unwrap(),
        descriptor,
        access_flags: FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC,
    })
}

pub fn instance_field<'g>(
    class_graph: &ClassGraph<'g>,
    class: ClassId<'g>,
    name: &str,
    descriptor: FieldType<ClassId<'g>>,
) -> FieldId<'g> {
    class_graph.add_field(FieldData {
        class,
        name: UnqualifiedName::from_string(String::from(name)).unwrap(),
        descriptor,
        access_flags: FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL,
    })
}

/// Give a method a body of straight-line code
pub fn install<'g>(method: MethodId<'g>, instructions: Vec<Instruction<'g>>) {
    let mut code = CodeBuilder::new(method);
    for instruction in instructions {
        code.push_instruction(instruction).unwrap();
    }
    code.install().unwrap();
}

/// `Runnable` class with the given `run` body, returning its no-argument constructor
pub fn runnable<'g>(
    class_graph: &ClassGraph<'g>,
    java: &JavaLibrary<'g>,
    name: &str,
    run: Vec<Instruction<'g>>,
) -> MethodId<'g> {
    let class = class(class_graph, java, name);
    class.0.interfaces.push(java.classes.lang.runnable);

    let no_args = || MethodDescriptor {
        parameters: vec![],
        return_type: None,
    };
    let init = class_graph.add_method(MethodData::new(
        class,
        UnqualifiedName::INIT,
        no_args(),
        MethodAccessFlags::PUBLIC,
    ));
    install(
        init,
        vec![
            Instruction::ALoad(0),
            Instruction::Invoke(InvokeType::Special, java.members.lang.object.init),
            Instruction::Return,
        ],
    );
    let run_method = class_graph.add_method(MethodData::new(
        class,
        UnqualifiedName::RUN,
        no_args(),
        MethodAccessFlags::PUBLIC,
    ));
    install(run_method, run);
    init
}

/// Instructions for `new Thread(new R()).start()`, where `runnable_init` constructs `R`
pub fn start_thread<'g>(
    java: &JavaLibrary<'g>,
    runnable_init: MethodId<'g>,
) -> Vec<Instruction<'g>> {
    let thread = &java.members.lang.thread;
    vec![
        Instruction::New(java.classes.lang.thread),
        Instruction::Dup,
        Instruction::New(runnable_init.0.class),
        Instruction::Dup,
        Instruction::Invoke(InvokeType::Special, runnable_init),
        Instruction::Invoke(InvokeType::Special, thread.init_runnable),
        Instruction::Invoke(thread.start.0.infer_invoke_type(), thread.start),
    ]
}

/// Run the whole search from `main`, keeping a copy of every end state
pub fn check<'g>(
    java: JavaLibrary<'g>,
    settings: Settings,
    main: MethodId<'g>,
) -> (SearchReport<'g>, Vec<VmState<'g>>) {
    let mut vm = Vm::new(java, settings);
    vm.start(main).unwrap();
    let mut end_states = vec![];
    let report = Search::new(&mut vm)
        .on_end_state(|state, _| end_states.push(state.clone()))
        .run()
        .unwrap();
    (report, end_states)
}

/// Value of a static field in some state
pub fn static_value<'g>(state: &VmState<'g>, field: FieldId<'g>) -> Value {
    let statics = state.heap.statics(field.0.class).unwrap();
    state.heap.get(statics).unwrap().field(field).unwrap().value
}
