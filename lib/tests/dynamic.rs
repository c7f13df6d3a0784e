mod common;

use common::*;
use jvmcheck::jvm::class_graph::*;
use jvmcheck::jvm::code::*;
use jvmcheck::jvm::*;
use jvmcheck::vm::*;

use Instruction::*;

/// Contents of the string a static field points to
fn static_string<'g>(state: &VmState<'g>, field: FieldId<'g>) -> Option<String> {
    let reference = static_value(state, field).as_reference().unwrap()?;
    let string = state.heap.get(reference).unwrap().string_value()?;
    Some(string.to_string())
}

/// Record method call site, taking the record itself as the first parameter
fn object_method<'g>(
    class_graph: &ClassGraph<'g>,
    bootstrap: BootstrapMethodId<'g>,
    name: UnqualifiedName,
    parameters: Vec<FieldType<ClassId<'g>>>,
    return_type: FieldType<ClassId<'g>>,
) -> InvokeDynamicId<'g> {
    class_graph.add_invoke_dynamic(InvokeDynamicData {
        name,
        descriptor: MethodDescriptor {
            parameters,
            return_type: Some(return_type),
        },
        bootstrap,
    })
}

/// ```java,ignore
/// record Point(int x, String name) { }
///
/// class Records {
///     static boolean same, different;
///     static int hash;
///     static String rendered;
///
///     public static void main() {
///         Point p = new Point(1, "a");
///         same = p.equals(new Point(1, "a"));
///         different = p.equals(new Point(2, "a"));
///         hash = p.hashCode();
///         rendered = p.toString();
///     }
/// }
/// ```
#[test]
fn record_methods() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let string = java.classes.lang.string;

    let point = class_graph.add_class(ClassData::new(
        BinaryName::from_string(String::from("test/Records$Point")).unwrap(),
        java.classes.lang.record,
        ClassAccessFlags::FINAL,
    ));
    let x = instance_field(&class_graph, point, "x", FieldType::int());
    let name = instance_field(&class_graph, point, "name", FieldType::object(string));
    let init = class_graph.add_method(MethodData::new(
        point,
        UnqualifiedName::INIT,
        MethodDescriptor {
            parameters: vec![FieldType::int(), FieldType::object(string)],
            return_type: None,
        },
        MethodAccessFlags::PUBLIC,
    ));
    install(
        init,
        vec![
            ALoad(0),
            Invoke(InvokeType::Special, java.members.lang.record.init),
            ALoad(0),
            ILoad(1),
            PutField(x),
            ALoad(0),
            ALoad(2),
            PutField(name),
            Return,
        ],
    );

    let object_methods = class_graph.add_bootstrap_method(BootstrapMethodData {
        method: java.members.lang.runtime.object_methods_bootstrap,
        arguments: vec![
            ConstantData::Class(RefType::Object(point)),
            ConstantData::String("x;name".into()),
            ConstantData::FieldGetterHandle(x),
            ConstantData::FieldGetterHandle(name),
        ],
    });
    let receiver = FieldType::object(point);
    let equals = object_method(
        &class_graph,
        object_methods,
        UnqualifiedName::EQUALS,
        vec![receiver, FieldType::object(java.classes.lang.object)],
        FieldType::boolean(),
    );
    let hash_code = object_method(
        &class_graph,
        object_methods,
        UnqualifiedName::HASHCODE,
        vec![receiver],
        FieldType::int(),
    );
    let to_string = object_method(
        &class_graph,
        object_methods,
        UnqualifiedName::TOSTRING,
        vec![receiver],
        FieldType::object(string),
    );

    let class = class(&class_graph, &java, "Records");
    let same = static_field(&class_graph, class, "same", FieldType::boolean());
    let different = static_field(&class_graph, class, "different", FieldType::boolean());
    let hash = static_field(&class_graph, class, "hash", FieldType::int());
    let rendered = static_field(&class_graph, class, "rendered", FieldType::object(string));

    let new_point = |x| {
        vec![
            New(point),
            Dup,
            x,
            Ldc(ConstantData::String("a".into())),
            Invoke(InvokeType::Special, init),
        ]
    };
    let mut instructions = new_point(IConst1);
    instructions.push(AStore(0));
    instructions.push(ALoad(0));
    instructions.extend(new_point(IConst1));
    instructions.extend([InvokeDynamic(equals), PutStatic(same), ALoad(0)]);
    instructions.extend(new_point(IConst2));
    instructions.extend([
        InvokeDynamic(equals),
        PutStatic(different),
        ALoad(0),
        InvokeDynamic(hash_code),
        PutStatic(hash),
        ALoad(0),
        InvokeDynamic(to_string),
        PutStatic(rendered),
        Return,
    ]);
    let main = static_method(&class_graph, class, "main", vec![], None);
    install(main, instructions);

    let (report, end_states) = check(java, Settings::new(), main);
    assert!(report.is_clean(), "{:?}", report.violations);
    let state = &end_states[0];
    assert_eq!(static_value(state, same), Value::Int(1));
    assert_eq!(static_value(state, different), Value::Int(0));
    assert_eq!(static_value(state, hash), Value::Int(31 + 97));
    assert_eq!(
        static_string(state, rendered).as_deref(),
        Some("Point[x=1, name=a]")
    );
}

/// ```java,ignore
/// class Lambdas {
///     static int total;
///
///     public static void main() {
///         int step = 5;
///         Runnable add = () -> total += step;
///         add.run();
///         add.run();
///     }
/// }
/// ```
#[test]
fn lambdas_capture_values() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let run = java.members.lang.runnable.run;

    let class = class(&class_graph, &java, "Lambdas");
    let total = static_field(&class_graph, class, "total", FieldType::int());
    let body = static_method(
        &class_graph,
        class,
        "lambda$main$0",
        vec![FieldType::int()],
        None,
    );
    install(
        body,
        vec![GetStatic(total), ILoad(0), IAdd, PutStatic(total), Return],
    );

    let no_args = MethodDescriptor {
        parameters: vec![],
        return_type: None,
    };
    let metafactory = class_graph.add_bootstrap_method(BootstrapMethodData {
        method: java.members.lang.invoke.metafactory,
        arguments: vec![
            ConstantData::MethodType(no_args.clone()),
            ConstantData::MethodHandle(body),
            ConstantData::MethodType(no_args),
        ],
    });
    let make_runnable = class_graph.add_invoke_dynamic(InvokeDynamicData {
        name: UnqualifiedName::RUN,
        descriptor: MethodDescriptor {
            parameters: vec![FieldType::int()],
            return_type: Some(FieldType::object(java.classes.lang.runnable)),
        },
        bootstrap: metafactory,
    });

    let main = static_method(&class_graph, class, "main", vec![], None);
    install(
        main,
        vec![
            BiPush(5),
            InvokeDynamic(make_runnable),
            AStore(0),
            ALoad(0),
            Invoke(run.0.infer_invoke_type(), run),
            ALoad(0),
            Invoke(run.0.infer_invoke_type(), run),
            Return,
        ],
    );

    let (report, end_states) = check(java, Settings::new(), main);
    assert!(report.is_clean(), "{:?}", report.violations);
    assert_eq!(static_value(&end_states[0], total), Value::Int(10));
}

/// A lambda handed to a thread runs in that thread
#[test]
fn lambdas_run_in_threads() {
    let arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&arenas);
    let java = class_graph.insert_java_library_types().unwrap();
    let thread = java.members.lang.thread;

    let class = class(&class_graph, &java, "ThreadLambda");
    let ran = static_field(&class_graph, class, "ran", FieldType::int());
    let body = static_method(&class_graph, class, "lambda$main$0", vec![], None);
    install(body, vec![IConst1, PutStatic(ran), Return]);

    let no_args = MethodDescriptor {
        parameters: vec![],
        return_type: None,
    };
    let metafactory = class_graph.add_bootstrap_method(BootstrapMethodData {
        method: java.members.lang.invoke.metafactory,
        arguments: vec![
            ConstantData::MethodType(no_args.clone()),
            ConstantData::MethodHandle(body),
            ConstantData::MethodType(no_args),
        ],
    });
    let make_runnable = class_graph.add_invoke_dynamic(InvokeDynamicData {
        name: UnqualifiedName::RUN,
        descriptor: MethodDescriptor {
            parameters: vec![],
            return_type: Some(FieldType::object(java.classes.lang.runnable)),
        },
        bootstrap: metafactory,
    });

    let main = static_method(&class_graph, class, "main", vec![], None);
    install(
        main,
        vec![
            New(java.classes.lang.thread),
            Dup,
            InvokeDynamic(make_runnable),
            Invoke(InvokeType::Special, thread.init_runnable),
            Invoke(thread.start.0.infer_invoke_type(), thread.start),
            Return,
        ],
    );

    let (report, end_states) = check(java, Settings::new(), main);
    assert!(report.is_clean(), "{:?}", report.violations);
    assert!(!end_states.is_empty());
    for state in &end_states {
        assert_eq!(static_value(state, ran), Value::Int(1));
    }
}
