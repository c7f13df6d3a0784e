use super::Throw;
use crate::jvm::class_graph::Assignable;
use crate::vm::{
    ElementFlags, Error, FrameKind, InitStatus, ObjRef, Property, Slot, ThreadId, Value, Vm,
};
use std::rc::Rc;

impl<'g> Vm<'g> {
    /// Get the heap object for an exception, allocating it if the interpreter is the one throwing
    ///
    /// Allocation is forced: running out of heap must still produce an `OutOfMemoryError`. The
    /// message is best effort though.
    fn materialize(&mut self, thread: ThreadId, throw: Throw<'g>) -> Result<ObjRef, Error> {
        let (class, message) = match throw {
            Throw::Existing(exception) => return Ok(exception),
            Throw::New { class, message } => (class, message),
        };

        let exception = self
            .state
            .heap
            .new_object(class, thread, true)
            .ok_or(Error::HeapOverflow)?;
        let message = message.and_then(|message| {
            self.state
                .heap
                .new_string(self.java.classes.lang.string, Rc::from(message), thread)
        });

        let element = self.state.heap.get_mut(exception)?;
        if let Some(message) = message {
            element.set_field(
                self.java.members.lang.throwable.detail_message,
                Slot::new(Value::Ref(message)),
            );
        }
        element.flags.insert(ElementFlags::CONSTRUCTED);
        Ok(exception)
    }

    /// Message of an exception object, if it has a string one
    fn exception_message(&self, exception: ObjRef) -> Option<String> {
        let detail = self
            .state
            .heap
            .get(exception)
            .ok()?
            .field(self.java.members.lang.throwable.detail_message)?
            .value;
        match detail {
            Value::Ref(message) => self
                .state
                .heap
                .get(message)
                .ok()?
                .string_value()
                .map(|string| string.to_string()),
            _ => None,
        }
    }

    /// Throw an exception in a thread, unwinding frames until a handler catches it
    ///
    /// Frames being unwound release the lock of their `synchronized` method. An exception escaping
    /// a static initializer leaves the class in the erroneous state. If no frame catches the
    /// exception, the thread dies (releasing every lock it holds) and the uncaught exception is
    /// returned as a violated property.
    pub(crate) fn raise(
        &mut self,
        thread: ThreadId,
        throw: Throw<'g>,
    ) -> Result<Option<Property<'g>>, Error> {
        let exception = self.materialize(thread, throw)?;
        let class = self
            .state
            .heap
            .get(exception)?
            .class()
            .ok_or(Error::UnexpectedElement {
                reference: exception,
                expected: "exception object",
            })?;
        log::debug!("thread {} throws {:?}", thread, class);
        for listener in &mut self.listeners {
            listener.exception_thrown(&self.state, thread, exception);
        }

        loop {
            let info = self.state.thread_mut(thread)?;
            let frame = match info.stack.last_mut() {
                Some(frame) => frame,
                None => break,
            };

            let pc = frame.pc;
            let code = frame.code;
            let handler = code.exception_table.iter().find(|handler| {
                handler.covers(pc)
                    && handler
                        .catch_type
                        .map_or(true, |catch_type| class.is_assignable(&catch_type))
            });
            if let Some(handler) = handler {
                log::debug!("caught by {:?} at {}", frame.method.0, handler.handler);
                frame.pc = handler.handler;
                frame.clear_operands();
                frame.push_value(Value::Ref(exception));
                return Ok(None);
            }

            let kind = frame.kind;
            let sync_lock = frame.sync_lock;
            info.stack.pop();

            if let Some(lock) = sync_lock {
                self.release_all(thread, lock)?;
            }
            if let FrameKind::ClassInit(class) = kind {
                self.finish_class_initializer(thread, class, InitStatus::Erroneous)?;
            }
        }

        // No termination choice: the violation ends the path
        let thread_name = self.state.thread(thread)?.name.clone();
        self.thread_died(thread)?;

        Ok(Some(Property::UncaughtException {
            thread,
            thread_name,
            class,
            message: self.exception_message(exception),
        }))
    }
}

#[cfg(test)]
mod test {
    use crate::jvm::class_graph::*;
    use crate::jvm::code::{CodeBuilder, Instruction::*};
    use crate::jvm::*;
    use crate::vm::*;

    #[test]
    fn handler_catches_subclass() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types().unwrap();

        let class = class_graph.add_class(ClassData::new(
            BinaryName::from_string(String::from("demo/Catch")).unwrap(),
            java.classes.lang.object,
            ClassAccessFlags::PUBLIC,
        ));
        let main = class_graph.add_method(MethodData::new(
            class,
            UnqualifiedName::from_string(String::from("main")).unwrap(),
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        ));

        // try { 1 / 0 } catch (RuntimeException e) { }
        let mut code = CodeBuilder::new(main);
        let start = code.fresh_label();
        let end = code.fresh_label();
        let handler = code.fresh_label();
        code.place_label(start).unwrap();
        code.push_instruction(IConst1).unwrap();
        code.push_instruction(IConst0).unwrap();
        code.push_instruction(IDiv).unwrap();
        code.push_instruction(Pop).unwrap();
        code.place_label(end).unwrap();
        code.push_instruction(Return).unwrap();
        code.place_label(handler).unwrap();
        code.push_instruction(Pop).unwrap();
        code.push_instruction(Return).unwrap();
        code.add_exception_handler(start, end, handler, Some(java.classes.lang.runtime_exception));
        code.install().unwrap();

        let mut vm = Vm::new(java, Settings::new());
        vm.start(main).unwrap();
        assert!(matches!(
            vm.run_transition().unwrap(),
            TransitionOutcome::EndState
        ));
    }

    #[test]
    fn uncaught_exception_kills_the_thread() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types().unwrap();
        let arithmetic_exception = java.classes.lang.arithmetic_exception;

        let class = class_graph.add_class(ClassData::new(
            BinaryName::from_string(String::from("demo/Divide")).unwrap(),
            java.classes.lang.object,
            ClassAccessFlags::PUBLIC,
        ));
        let main = class_graph.add_method(MethodData::new(
            class,
            UnqualifiedName::from_string(String::from("main")).unwrap(),
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        ));
        let mut code = CodeBuilder::new(main);
        for insn in [IConst1, IConst0, IDiv, Pop, Return] {
            code.push_instruction(insn).unwrap();
        }
        code.install().unwrap();

        let mut vm = Vm::new(java, Settings::new());
        let thread = vm.start(main).unwrap();
        match vm.run_transition().unwrap() {
            TransitionOutcome::Violation(Property::UncaughtException {
                thread: dead,
                class,
                message,
                ..
            }) => {
                assert_eq!(dead, thread);
                assert_eq!(class, arithmetic_exception);
                assert_eq!(message.as_deref(), Some("/ by zero"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(vm.state.thread(thread).unwrap().state, ThreadState::Terminated);
    }

    /// ```java,ignore
    /// synchronized (lock) { int x = 1 / 0; }
    /// ```
    #[test]
    fn dying_thread_releases_its_monitors() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types().unwrap();
        let object_class = java.classes.lang.object;

        let class = class_graph.add_class(ClassData::new(
            BinaryName::from_string(String::from("demo/DieLocked")).unwrap(),
            java.classes.lang.object,
            ClassAccessFlags::PUBLIC,
        ));
        let main = class_graph.add_method(MethodData::new(
            class,
            UnqualifiedName::from_string(String::from("main")).unwrap(),
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        ));
        let mut code = CodeBuilder::new(main);
        for insn in [ALoad(0), MonitorEnter, IConst1, IConst0, IDiv, Pop, Return] {
            code.push_instruction(insn).unwrap();
        }
        code.install().unwrap();

        let mut vm = Vm::new(java, Settings::new());
        let thread = vm.start(main).unwrap();
        let lock = vm
            .state
            .heap
            .new_object(object_class, thread, false)
            .unwrap();
        vm.state
            .thread_mut(thread)
            .unwrap()
            .top_frame_mut()
            .unwrap()
            .store(0, Slot::new(Value::Ref(lock)))
            .unwrap();
        let thread_object = vm.state.thread(thread).unwrap().object;
        let contender = vm.state.add_thread(|id| {
            let mut info = ThreadInfo::new(id, String::from("contender"), thread_object);
            info.state = ThreadState::Blocked;
            info.lock_ref = Some(lock);
            info
        });

        loop {
            match vm.run_transition().unwrap() {
                TransitionOutcome::ChoicePoint(mut cg) => {
                    cg.advance();
                    vm.apply_choice(&*cg).unwrap();
                }
                TransitionOutcome::Violation(Property::UncaughtException { .. }) => break,
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        let dead = vm.state.thread(thread).unwrap();
        assert_eq!(dead.state, ThreadState::Terminated);
        assert!(dead.locked_objects.is_empty());
        assert_eq!(vm.state.heap.get(lock).unwrap().monitor.owner, None);
        assert_eq!(vm.state.heap.get(lock).unwrap().monitor.count, 0);
        assert_eq!(
            vm.state.thread(contender).unwrap().state,
            ThreadState::Unblocked
        );
        assert!(vm.state.is_runnable(contender));
    }
}
