use super::{BinaryName, ClassAccessFlags, ClassData, ClassGraph, ClassId};
use crate::jvm::Name;
use elsa::FrozenVec;

/// Classes the checker knows about without being told
#[derive(Copy, Clone)]
pub struct JavaClasses<'g> {
    pub lang: LangClasses<'g>,
    pub io: IoClasses<'g>,

    /// `gov.nasa.jpf.vm.Verify`, the API programs use to ask for nondeterministic values
    pub verify: ClassId<'g>,
}

/// Classes inside `java.lang.*`
#[derive(Copy, Clone)]
pub struct LangClasses<'g> {
    pub object: ClassId<'g>,
    pub string: ClassId<'g>,
    pub class: ClassId<'g>,
    pub cloneable: ClassId<'g>,
    pub runnable: ClassId<'g>,
    pub thread: ClassId<'g>,
    pub record: ClassId<'g>,
    pub number: ClassId<'g>,
    pub integer: ClassId<'g>,
    pub invoke: InvokeClasses<'g>,
    pub runtime: RuntimeClasses<'g>,
    pub throwable: ClassId<'g>,
    pub exception: ClassId<'g>,
    pub runtime_exception: ClassId<'g>,
    pub error: ClassId<'g>,
    pub null_pointer_exception: ClassId<'g>,
    pub index_out_of_bounds_exception: ClassId<'g>,
    pub array_index_out_of_bounds_exception: ClassId<'g>,
    pub array_store_exception: ClassId<'g>,
    pub class_cast_exception: ClassId<'g>,
    pub arithmetic_exception: ClassId<'g>,
    pub negative_array_size_exception: ClassId<'g>,
    pub illegal_argument_exception: ClassId<'g>,
    pub illegal_monitor_state_exception: ClassId<'g>,
    pub illegal_thread_state_exception: ClassId<'g>,
    pub interrupted_exception: ClassId<'g>,
    pub assertion_error: ClassId<'g>,
    pub virtual_machine_error: ClassId<'g>,
    pub out_of_memory_error: ClassId<'g>,
    pub stack_overflow_error: ClassId<'g>,
    pub linkage_error: ClassId<'g>,
    pub no_class_def_found_error: ClassId<'g>,
    pub incompatible_class_change_error: ClassId<'g>,
    pub no_such_field_error: ClassId<'g>,
    pub no_such_method_error: ClassId<'g>,
    pub abstract_method_error: ClassId<'g>,
}

/// Classes inside `java.lang.invoke.*`
#[derive(Copy, Clone)]
pub struct InvokeClasses<'g> {
    pub lambda_metafactory: ClassId<'g>,
}

/// Classes inside `java.lang.runtime.*`
#[derive(Copy, Clone)]
pub struct RuntimeClasses<'g> {
    pub object_methods: ClassId<'g>,
}

/// Classes inside `java.io.*`
#[derive(Copy, Clone)]
pub struct IoClasses<'g> {
    pub serializable: ClassId<'g>,
}

impl<'g> JavaClasses<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>) -> JavaClasses<'g> {
        let object = class_graph.add_class(ClassData {
            name: BinaryName::OBJECT,
            superclass: None,
            interfaces: FrozenVec::new(),
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
            record_components: FrozenVec::new(),
        });
        let io = IoClasses::add_to_graph(class_graph, object);
        let lang = LangClasses::add_to_graph(class_graph, object, &io);
        let verify = class_graph.add_class(ClassData::new(
            BinaryName::VERIFY,
            object,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        ));

        JavaClasses { lang, io, verify }
    }

    /// Every class in the library, in no particular order
    pub fn all(&self) -> Vec<ClassId<'g>> {
        let lang = &self.lang;
        vec![
            lang.object,
            lang.string,
            lang.class,
            lang.cloneable,
            lang.runnable,
            lang.thread,
            lang.record,
            lang.number,
            lang.integer,
            lang.invoke.lambda_metafactory,
            lang.runtime.object_methods,
            self.io.serializable,
            self.verify,
        ]
        .into_iter()
        .chain(lang.throwables())
        .collect()
    }
}

impl<'g> IoClasses<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>, object: ClassId<'g>) -> IoClasses<'g> {
        let serializable = class_graph.add_class(ClassData::new(
            BinaryName::SERIALIZABLE,
            object,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
        ));
        IoClasses { serializable }
    }
}

impl<'g> LangClasses<'g> {
    pub fn add_to_graph(
        class_graph: &ClassGraph<'g>,
        object: ClassId<'g>,
        io: &IoClasses<'g>,
    ) -> LangClasses<'g> {
        let interface = ClassAccessFlags::PUBLIC
            | ClassAccessFlags::INTERFACE
            | ClassAccessFlags::ABSTRACT;
        let final_class =
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER | ClassAccessFlags::FINAL;
        let open_class = ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER;

        let add = |name: BinaryName, superclass: ClassId<'g>, flags: ClassAccessFlags| {
            class_graph.add_class(ClassData::new(name, superclass, flags))
        };

        let cloneable = add(BinaryName::CLONEABLE, object, interface);
        let runnable = add(BinaryName::RUNNABLE, object, interface);
        let string = add(BinaryName::STRING, object, final_class);
        string.0.interfaces.push(io.serializable);
        let class = add(BinaryName::CLASS, object, final_class);
        class.0.interfaces.push(io.serializable);
        let thread = add(BinaryName::THREAD, object, open_class);
        thread.0.interfaces.push(runnable);
        let record = add(
            BinaryName::RECORD,
            object,
            open_class | ClassAccessFlags::ABSTRACT,
        );
        let number = add(
            BinaryName::NUMBER,
            object,
            open_class | ClassAccessFlags::ABSTRACT,
        );
        number.0.interfaces.push(io.serializable);
        let integer = add(BinaryName::INTEGER, number, final_class);
        let invoke = InvokeClasses {
            lambda_metafactory: add(BinaryName::LAMBDAMETAFACTORY, object, final_class),
        };
        let runtime = RuntimeClasses {
            object_methods: add(BinaryName::OBJECTMETHODS, object, final_class),
        };

        let throwable = add(BinaryName::THROWABLE, object, open_class);
        throwable.0.interfaces.push(io.serializable);
        let exception = add(BinaryName::EXCEPTION, throwable, open_class);
        let runtime_exception = add(BinaryName::RUNTIMEEXCEPTION, exception, open_class);
        let error = add(BinaryName::ERROR, throwable, open_class);

        let null_pointer_exception =
            add(BinaryName::NULLPOINTEREXCEPTION, runtime_exception, open_class);
        let index_out_of_bounds_exception = add(
            BinaryName::INDEXOUTOFBOUNDSEXCEPTION,
            runtime_exception,
            open_class,
        );
        let array_index_out_of_bounds_exception = add(
            BinaryName::ARRAYINDEXOUTOFBOUNDSEXCEPTION,
            index_out_of_bounds_exception,
            open_class,
        );
        let array_store_exception =
            add(BinaryName::ARRAYSTOREEXCEPTION, runtime_exception, open_class);
        let class_cast_exception =
            add(BinaryName::CLASSCASTEXCEPTION, runtime_exception, open_class);
        let arithmetic_exception =
            add(BinaryName::ARITHMETICEXCEPTION, runtime_exception, open_class);
        let negative_array_size_exception = add(
            BinaryName::NEGATIVEARRAYSIZEEXCEPTION,
            runtime_exception,
            open_class,
        );
        let illegal_argument_exception = add(
            BinaryName::ILLEGALARGUMENTEXCEPTION,
            runtime_exception,
            open_class,
        );
        let illegal_monitor_state_exception = add(
            BinaryName::ILLEGALMONITORSTATEEXCEPTION,
            runtime_exception,
            open_class,
        );
        let illegal_thread_state_exception = add(
            BinaryName::ILLEGALTHREADSTATEEXCEPTION,
            illegal_argument_exception,
            open_class,
        );
        let interrupted_exception = add(BinaryName::INTERRUPTEDEXCEPTION, exception, open_class);

        let assertion_error = add(BinaryName::ASSERTIONERROR, error, open_class);
        let virtual_machine_error = add(
            BinaryName::VIRTUALMACHINEERROR,
            error,
            open_class | ClassAccessFlags::ABSTRACT,
        );
        let out_of_memory_error =
            add(BinaryName::OUTOFMEMORYERROR, virtual_machine_error, open_class);
        let stack_overflow_error =
            add(BinaryName::STACKOVERFLOWERROR, virtual_machine_error, open_class);
        let linkage_error = add(BinaryName::LINKAGEERROR, error, open_class);
        let no_class_def_found_error =
            add(BinaryName::NOCLASSDEFFOUNDERROR, linkage_error, open_class);
        let incompatible_class_change_error = add(
            BinaryName::INCOMPATIBLECLASSCHANGEERROR,
            linkage_error,
            open_class,
        );
        let no_such_field_error = add(
            BinaryName::NOSUCHFIELDERROR,
            incompatible_class_change_error,
            open_class,
        );
        let no_such_method_error = add(
            BinaryName::NOSUCHMETHODERROR,
            incompatible_class_change_error,
            open_class,
        );
        let abstract_method_error = add(
            BinaryName::ABSTRACTMETHODERROR,
            incompatible_class_change_error,
            open_class,
        );

        LangClasses {
            object,
            string,
            class,
            cloneable,
            runnable,
            thread,
            record,
            number,
            integer,
            invoke,
            runtime,
            throwable,
            exception,
            runtime_exception,
            error,
            null_pointer_exception,
            index_out_of_bounds_exception,
            array_index_out_of_bounds_exception,
            array_store_exception,
            class_cast_exception,
            arithmetic_exception,
            negative_array_size_exception,
            illegal_argument_exception,
            illegal_monitor_state_exception,
            illegal_thread_state_exception,
            interrupted_exception,
            assertion_error,
            virtual_machine_error,
            out_of_memory_error,
            stack_overflow_error,
            linkage_error,
            no_class_def_found_error,
            incompatible_class_change_error,
            no_such_field_error,
            no_such_method_error,
            abstract_method_error,
        }
    }

    /// `java.lang.Throwable` and all of its subclasses, superclasses before subclasses
    pub fn throwables(&self) -> Vec<ClassId<'g>> {
        vec![
            self.throwable,
            self.exception,
            self.runtime_exception,
            self.error,
            self.null_pointer_exception,
            self.index_out_of_bounds_exception,
            self.array_index_out_of_bounds_exception,
            self.array_store_exception,
            self.class_cast_exception,
            self.arithmetic_exception,
            self.negative_array_size_exception,
            self.illegal_argument_exception,
            self.illegal_monitor_state_exception,
            self.illegal_thread_state_exception,
            self.interrupted_exception,
            self.assertion_error,
            self.virtual_machine_error,
            self.out_of_memory_error,
            self.stack_overflow_error,
            self.linkage_error,
            self.no_class_def_found_error,
            self.incompatible_class_change_error,
            self.no_such_field_error,
            self.no_such_method_error,
            self.abstract_method_error,
        ]
    }
}

#[cfg(test)]
mod test {
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas};
    use crate::jvm::{BinaryName, Name};

    #[test]
    fn library_classes_are_registered() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types().unwrap();

        for class in java.classes.all() {
            assert_eq!(
                class_graph.lookup_class(&class.0.name),
                Some(class),
                "{} should be registered",
                class.0.name.as_str()
            );
        }
        assert!(class_graph.lookup_class(&BinaryName::VERIFY).is_some());
    }

    #[test]
    fn throwable_hierarchy() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types().unwrap();
        let lang = &java.classes.lang;

        for class in lang.throwables() {
            assert!(class.is_throwable(), "{:?}", class);
        }
        assert!(lang
            .array_index_out_of_bounds_exception
            .is_subclass_of(lang.index_out_of_bounds_exception));
        assert!(lang
            .abstract_method_error
            .is_subclass_of(lang.incompatible_class_change_error));
        assert!(!lang.thread.is_throwable());
    }
}
