use super::{
    ClassGraph, ClassId, FieldAccessFlags, FieldData, FieldId, FieldType, MethodAccessFlags,
    MethodData, MethodDescriptor, MethodId, UnqualifiedName,
};

use super::java_classes::JavaClasses;

/// Members of the classes the checker knows about without being told
#[derive(Copy, Clone)]
pub struct JavaMembers<'g> {
    pub lang: LangMembers<'g>,
    pub verify: VerifyMembers<'g>,
}

/// Members of classes inside `java.lang.*`
#[derive(Copy, Clone)]
pub struct LangMembers<'g> {
    pub object: ObjectMembers<'g>,
    pub string: StringMembers<'g>,
    pub runnable: RunnableMembers<'g>,
    pub thread: ThreadMembers<'g>,
    pub record: RecordMembers<'g>,
    pub number: NumberMembers<'g>,
    pub integer: IntegerMembers<'g>,
    pub throwable: ThrowableMembers<'g>,
    pub invoke: InvokeMembers<'g>,
    pub runtime: RuntimeMembers<'g>,
}

/// Members of `java.lang.Object`
#[derive(Copy, Clone)]
pub struct ObjectMembers<'g> {
    pub init: MethodId<'g>,
    pub equals: MethodId<'g>,
    pub hash_code: MethodId<'g>,
    pub get_class: MethodId<'g>,
    pub wait: MethodId<'g>,
    pub notify: MethodId<'g>,
    pub notify_all: MethodId<'g>,
}

/// Members of `java.lang.String`
#[derive(Copy, Clone)]
pub struct StringMembers<'g> {
    pub length: MethodId<'g>,
    pub equals: MethodId<'g>,
    pub hash_code: MethodId<'g>,
}

/// Members of `java.lang.Runnable`
#[derive(Copy, Clone)]
pub struct RunnableMembers<'g> {
    pub run: MethodId<'g>,
}

/// Members of `java.lang.Thread`
#[derive(Copy, Clone)]
pub struct ThreadMembers<'g> {
    pub init: MethodId<'g>,
    pub init_runnable: MethodId<'g>,
    pub run: MethodId<'g>,
    pub start: MethodId<'g>,
    pub join: MethodId<'g>,
    pub is_alive: MethodId<'g>,
    pub yield_: MethodId<'g>,
    pub current_thread: MethodId<'g>,
    pub target: FieldId<'g>,
}

/// Members of `java.lang.Record`
#[derive(Copy, Clone)]
pub struct RecordMembers<'g> {
    pub init: MethodId<'g>,
}

/// Members of `java.lang.Number`
#[derive(Copy, Clone)]
pub struct NumberMembers<'g> {
    pub init: MethodId<'g>,
}

/// Members of `java.lang.Integer`
#[derive(Copy, Clone)]
pub struct IntegerMembers<'g> {
    pub init: MethodId<'g>,
    pub value_of: MethodId<'g>,
    pub int_value: MethodId<'g>,
    pub value: FieldId<'g>,
}

/// Members of `java.lang.Throwable`
#[derive(Copy, Clone)]
pub struct ThrowableMembers<'g> {
    pub init: MethodId<'g>,
    pub init_message: MethodId<'g>,
    pub get_message: MethodId<'g>,
    pub detail_message: FieldId<'g>,
}

/// Members of classes inside `java.lang.invoke.*`
#[derive(Copy, Clone)]
pub struct InvokeMembers<'g> {
    pub metafactory: MethodId<'g>,
}

/// Members of classes inside `java.lang.runtime.*`
#[derive(Copy, Clone)]
pub struct RuntimeMembers<'g> {
    pub object_methods_bootstrap: MethodId<'g>,
}

/// Members of `gov.nasa.jpf.vm.Verify`
#[derive(Copy, Clone)]
pub struct VerifyMembers<'g> {
    pub get_boolean: MethodId<'g>,
    pub get_boolean_flag: MethodId<'g>,
    pub get_int: MethodId<'g>,
    pub begin_atomic: MethodId<'g>,
    pub end_atomic: MethodId<'g>,
}

/// Constructors every throwable class gets: `<init>()` and `<init>(String)`
#[derive(Copy, Clone)]
pub struct ThrowableConstructors<'g> {
    pub init: MethodId<'g>,
    pub init_message: MethodId<'g>,
}

impl<'g> JavaMembers<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        classes: &JavaClasses<'g>,
    ) -> JavaMembers<'g> {
        let lang = LangMembers::add_to_graph(class_graph, classes);
        let verify = VerifyMembers::add_to_graph(class_graph, classes);
        JavaMembers { lang, verify }
    }
}

impl<'g> LangMembers<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        classes: &JavaClasses<'g>,
    ) -> LangMembers<'g> {
        let object = ObjectMembers::add_to_graph(class_graph, classes);
        let string = StringMembers::add_to_graph(class_graph, classes);
        let runnable = RunnableMembers::add_to_graph(class_graph, classes);
        let thread = ThreadMembers::add_to_graph(class_graph, classes);
        let record = RecordMembers {
            init: add_constructor(class_graph, classes.lang.record, vec![]),
        };
        let number = NumberMembers {
            init: add_constructor(class_graph, classes.lang.number, vec![]),
        };
        let integer = IntegerMembers::add_to_graph(class_graph, classes);
        let throwable = ThrowableMembers::add_to_graph(class_graph, classes);
        let invoke = InvokeMembers {
            metafactory: add_bootstrap(
                class_graph,
                classes.lang.invoke.lambda_metafactory,
                UnqualifiedName::METAFACTORY,
                classes,
            ),
        };
        let runtime = RuntimeMembers {
            object_methods_bootstrap: add_bootstrap(
                class_graph,
                classes.lang.runtime.object_methods,
                UnqualifiedName::BOOTSTRAP,
                classes,
            ),
        };

        LangMembers {
            object,
            string,
            runnable,
            thread,
            record,
            number,
            integer,
            throwable,
            invoke,
            runtime,
        }
    }
}

impl<'g> ObjectMembers<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        classes: &JavaClasses<'g>,
    ) -> ObjectMembers<'g> {
        let class = classes.lang.object;
        let add_native = |name: UnqualifiedName,
                          return_type: Option<FieldType<ClassId<'g>>>|
         -> MethodId<'g> {
            class_graph.add_method(MethodData::new(
                class,
                name,
                MethodDescriptor {
                    parameters: vec![],
                    return_type,
                },
                MethodAccessFlags::PUBLIC | MethodAccessFlags::FINAL | MethodAccessFlags::NATIVE,
            ))
        };

        let init = add_constructor(class_graph, class, vec![]);
        let equals = class_graph.add_method(MethodData::new(
            class,
            UnqualifiedName::EQUALS,
            MethodDescriptor {
                parameters: vec![FieldType::object(class)],
                return_type: Some(FieldType::boolean()),
            },
            MethodAccessFlags::PUBLIC,
        ));
        let hash_code = class_graph.add_method(MethodData::new(
            class,
            UnqualifiedName::HASHCODE,
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::int()),
            },
            MethodAccessFlags::PUBLIC | MethodAccessFlags::NATIVE,
        ));
        let get_class = add_native(
            UnqualifiedName::GETCLASS,
            Some(FieldType::object(classes.lang.class)),
        );
        let wait = add_native(UnqualifiedName::WAIT, None);
        let notify = add_native(UnqualifiedName::NOTIFY, None);
        let notify_all = add_native(UnqualifiedName::NOTIFYALL, None);

        ObjectMembers {
            init,
            equals,
            hash_code,
            get_class,
            wait,
            notify,
            notify_all,
        }
    }
}

impl<'g> StringMembers<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        classes: &JavaClasses<'g>,
    ) -> StringMembers<'g> {
        let class = classes.lang.string;
        let add_native = |name: UnqualifiedName,
                          parameters: Vec<FieldType<ClassId<'g>>>,
                          return_type: FieldType<ClassId<'g>>|
         -> MethodId<'g> {
            class_graph.add_method(MethodData::new(
                class,
                name,
                MethodDescriptor {
                    parameters,
                    return_type: Some(return_type),
                },
                MethodAccessFlags::PUBLIC | MethodAccessFlags::NATIVE,
            ))
        };

        let length = add_native(UnqualifiedName::LENGTH, vec![], FieldType::int());
        let equals = add_native(
            UnqualifiedName::EQUALS,
            vec![FieldType::object(classes.lang.object)],
            FieldType::boolean(),
        );
        let hash_code = add_native(UnqualifiedName::HASHCODE, vec![], FieldType::int());

        StringMembers {
            length,
            equals,
            hash_code,
        }
    }
}

impl<'g> RunnableMembers<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        classes: &JavaClasses<'g>,
    ) -> RunnableMembers<'g> {
        let run = class_graph.add_method(MethodData::new(
            classes.lang.runnable,
            UnqualifiedName::RUN,
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        ));
        RunnableMembers { run }
    }
}

impl<'g> ThreadMembers<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        classes: &JavaClasses<'g>,
    ) -> ThreadMembers<'g> {
        let class = classes.lang.thread;

        let init = add_constructor(class_graph, class, vec![]);
        let init_runnable = add_constructor(
            class_graph,
            class,
            vec![FieldType::object(classes.lang.runnable)],
        );
        let run = class_graph.add_method(MethodData::new(
            class,
            UnqualifiedName::RUN,
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            MethodAccessFlags::PUBLIC,
        ));

        let add_native = |name: UnqualifiedName,
                          return_type: Option<FieldType<ClassId<'g>>>,
                          is_static: bool|
         -> MethodId<'g> {
            let mut access_flags = MethodAccessFlags::PUBLIC | MethodAccessFlags::NATIVE;
            if is_static {
                access_flags |= MethodAccessFlags::STATIC;
            }
            class_graph.add_method(MethodData::new(
                class,
                name,
                MethodDescriptor {
                    parameters: vec![],
                    return_type,
                },
                access_flags,
            ))
        };
        let start = add_native(UnqualifiedName::START, None, false);
        let join = add_native(UnqualifiedName::JOIN, None, false);
        let is_alive = add_native(UnqualifiedName::ISALIVE, Some(FieldType::boolean()), false);
        let yield_ = add_native(UnqualifiedName::YIELD, None, true);
        let current_thread = add_native(
            UnqualifiedName::CURRENTTHREAD,
            Some(FieldType::object(class)),
            true,
        );

        let target = class_graph.add_field(FieldData {
            class,
            name: UnqualifiedName::TARGET,
            descriptor: FieldType::object(classes.lang.runnable),
            access_flags: FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL,
        });

        ThreadMembers {
            init,
            init_runnable,
            run,
            start,
            join,
            is_alive,
            yield_,
            current_thread,
            target,
        }
    }
}

impl<'g> IntegerMembers<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        classes: &JavaClasses<'g>,
    ) -> IntegerMembers<'g> {
        let class = classes.lang.integer;

        let init = add_constructor(class_graph, class, vec![FieldType::int()]);
        let value_of = class_graph.add_method(MethodData::new(
            class,
            UnqualifiedName::VALUEOF,
            MethodDescriptor {
                parameters: vec![FieldType::int()],
                return_type: Some(FieldType::object(class)),
            },
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        ));
        let int_value = class_graph.add_method(MethodData::new(
            class,
            UnqualifiedName::INTVALUE,
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::int()),
            },
            MethodAccessFlags::PUBLIC,
        ));
        let value = class_graph.add_field(FieldData {
            class,
            name: UnqualifiedName::VALUE,
            descriptor: FieldType::int(),
            access_flags: FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL,
        });

        IntegerMembers {
            init,
            value_of,
            int_value,
            value,
        }
    }
}

impl<'g> ThrowableMembers<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        classes: &JavaClasses<'g>,
    ) -> ThrowableMembers<'g> {
        let class = classes.lang.throwable;
        let string = FieldType::object(classes.lang.string);

        let detail_message = class_graph.add_field(FieldData {
            class,
            name: UnqualifiedName::DETAILMESSAGE,
            descriptor: string,
            access_flags: FieldAccessFlags::PRIVATE,
        });
        let get_message = class_graph.add_method(MethodData::new(
            class,
            UnqualifiedName::GETMESSAGE,
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(string),
            },
            MethodAccessFlags::PUBLIC,
        ));

        // Every throwable gets the two usual constructors (`add_method` deduplicates, so asking
        // again for `Throwable`'s own constructors returns the existing ones)
        for throwable in classes.lang.throwables() {
            ThrowableConstructors::add_to_graph(class_graph, classes, throwable);
        }
        let ThrowableConstructors { init, init_message } =
            ThrowableConstructors::add_to_graph(class_graph, classes, class);

        ThrowableMembers {
            init,
            init_message,
            get_message,
            detail_message,
        }
    }
}

impl<'g> ThrowableConstructors<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        classes: &JavaClasses<'g>,
        class: ClassId<'g>,
    ) -> ThrowableConstructors<'g> {
        ThrowableConstructors {
            init: add_constructor(class_graph, class, vec![]),
            init_message: add_constructor(
                class_graph,
                class,
                vec![FieldType::object(classes.lang.string)],
            ),
        }
    }

    /// Look up the constructors on a throwable class
    pub fn lookup(
        classes: &JavaClasses<'g>,
        class: ClassId<'g>,
    ) -> Option<ThrowableConstructors<'g>> {
        let no_args = MethodDescriptor {
            parameters: vec![],
            return_type: None,
        };
        let message = MethodDescriptor {
            parameters: vec![FieldType::object(classes.lang.string)],
            return_type: None,
        };
        Some(ThrowableConstructors {
            init: class.declared_method(&UnqualifiedName::INIT, &no_args)?,
            init_message: class.declared_method(&UnqualifiedName::INIT, &message)?,
        })
    }
}

impl<'g> VerifyMembers<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        classes: &JavaClasses<'g>,
    ) -> VerifyMembers<'g> {
        let class = classes.verify;
        let add_static_native = |name: UnqualifiedName,
                                 parameters: Vec<FieldType<ClassId<'g>>>,
                                 return_type: Option<FieldType<ClassId<'g>>>|
         -> MethodId<'g> {
            class_graph.add_method(MethodData::new(
                class,
                name,
                MethodDescriptor {
                    parameters,
                    return_type,
                },
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC | MethodAccessFlags::NATIVE,
            ))
        };

        let get_boolean = add_static_native(
            UnqualifiedName::GETBOOLEAN,
            vec![],
            Some(FieldType::boolean()),
        );
        let get_boolean_flag = add_static_native(
            UnqualifiedName::GETBOOLEAN,
            vec![FieldType::boolean()],
            Some(FieldType::boolean()),
        );
        let get_int = add_static_native(
            UnqualifiedName::GETINT,
            vec![FieldType::int(), FieldType::int()],
            Some(FieldType::int()),
        );
        let begin_atomic = add_static_native(UnqualifiedName::BEGINATOMIC, vec![], None);
        let end_atomic = add_static_native(UnqualifiedName::ENDATOMIC, vec![], None);

        VerifyMembers {
            get_boolean,
            get_boolean_flag,
            get_int,
            begin_atomic,
            end_atomic,
        }
    }
}

fn add_constructor<'g>(
    class_graph: &ClassGraph<'g>,
    class: ClassId<'g>,
    parameters: Vec<FieldType<ClassId<'g>>>,
) -> MethodId<'g> {
    class_graph.add_method(MethodData::new(
        class,
        UnqualifiedName::INIT,
        MethodDescriptor {
            parameters,
            return_type: None,
        },
        MethodAccessFlags::PUBLIC,
    ))
}

/// Bootstrap methods are never interpreted: `invokedynamic` recognizes them by identity and reads
/// the static arguments straight out of the call site.
fn add_bootstrap<'g>(
    class_graph: &ClassGraph<'g>,
    class: ClassId<'g>,
    name: UnqualifiedName,
    classes: &JavaClasses<'g>,
) -> MethodId<'g> {
    class_graph.add_method(MethodData::new(
        class,
        name,
        MethodDescriptor {
            parameters: vec![],
            return_type: Some(FieldType::object(classes.lang.object)),
        },
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC | MethodAccessFlags::NATIVE,
    ))
}
