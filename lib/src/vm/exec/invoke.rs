use super::{ExecResult, Throw};
use crate::jvm::class_graph::{Assignable, ClassId, MethodId};
use crate::jvm::code::InvokeType;
use crate::jvm::UnqualifiedName;
use crate::vm::{ElementKind, Error, FrameKind, ObjRef, Slot, StackFrame, ThreadId, Value, Vm};

/// Where a call ends up, once the receiver has been looked at
enum Target<'g> {
    Method(MethodId<'g>),

    /// Call to the single abstract method of a function object
    Function {
        implementation: MethodId<'g>,
        captured: Vec<Slot>,
    },
}

impl<'g> Vm<'g> {
    pub(super) fn execute_invoke(
        &mut self,
        thread: ThreadId,
        invoke_type: InvokeType,
        method: MethodId<'g>,
    ) -> Result<ExecResult<'g>, Error> {
        let stack_entries = method.0.argument_entries();

        if let InvokeType::Static = invoke_type {
            if let Some(result) = self.ensure_initialized(thread, method.0.class)? {
                return Ok(result);
            }
            let arguments = self.frame(thread)?.top_entries(stack_entries)?;
            return self.invoke_method(thread, method, stack_entries, arguments);
        }

        let receiver = match self
            .frame(thread)?
            .peek_words(method.0.argument_words())?
            .value
            .as_reference()?
        {
            Some(receiver) => receiver,
            None => {
                return Ok(self.null_pointer(format!(
                    "Cannot invoke \"{}\" because value is null",
                    method.0.name
                )))
            }
        };

        let target = match invoke_type {
            InvokeType::Special => match self.special_target(thread, method)? {
                target if target.0.is_abstract() => {
                    return Ok(ExecResult::Fault(Throw::with_message(
                        self.java.classes.lang.abstract_method_error,
                        format!("{:?}", target.0),
                    )))
                }
                target => Target::Method(target),
            },
            _ => match self.dispatch(thread, receiver, invoke_type, method)? {
                Ok(target) => target,
                Err(fault) => return Ok(fault),
            },
        };

        let mut arguments = self.frame(thread)?.top_entries(stack_entries)?;
        match target {
            Target::Method(target) => self.invoke_method(thread, target, stack_entries, arguments),
            Target::Function {
                implementation,
                mut captured,
            } => {
                // The function object itself is not an argument of the implementation
                arguments.remove(0);
                captured.extend(arguments);
                self.invoke_function(thread, implementation, stack_entries, captured)
            }
        }
    }

    /// Bind the method an `invokespecial` runs
    ///
    /// Constructors and private methods are called exactly. A `super.m()` call named after a
    /// superclass of the caller is looked up starting at the caller's direct superclass, so an
    /// override sitting between the two classes wins.
    fn special_target(
        &self,
        thread: ThreadId,
        method: MethodId<'g>,
    ) -> Result<MethodId<'g>, Error> {
        if method.0.name == UnqualifiedName::INIT {
            return Ok(method);
        }
        let caller = self.frame(thread)?.method.0.class;
        let named = method.0.class;
        let start = match caller.0.superclass {
            Some(superclass)
                if !named.0.is_interface() && caller != named && caller.is_subclass_of(named) =>
            {
                superclass
            }
            _ => named,
        };
        Ok(start
            .resolve_method(&method.0.name, &method.0.descriptor)
            .unwrap_or(method))
    }

    /// Find the method a virtual or interface call runs for the given receiver
    fn dispatch(
        &mut self,
        thread: ThreadId,
        receiver: ObjRef,
        invoke_type: InvokeType,
        method: MethodId<'g>,
    ) -> Result<Result<Target<'g>, ExecResult<'g>>, Error> {
        let element = self.state.heap.get(receiver)?;
        if let ElementKind::Function(function) = &element.kind {
            if function.name == method.0.name {
                return Ok(Ok(Target::Function {
                    implementation: function.implementation,
                    captured: function.captured.clone(),
                }));
            }
        }

        // Arrays only have the methods of `Object`
        let class = element.class().unwrap_or(self.java.classes.lang.object);
        if let InvokeType::Interface(_) = invoke_type {
            if !class.is_assignable(&method.0.class) {
                return Ok(Err(ExecResult::Fault(Throw::with_message(
                    self.java.classes.lang.incompatible_class_change_error,
                    format!(
                        "Class {} does not implement the requested interface {}",
                        class.0.name, method.0.class.0.name
                    ),
                ))));
            }
        }

        let frame = self.frame(thread)?;
        let call_site = (frame.method, frame.pc);
        let selected = match self.transients.dispatch.get(&call_site) {
            Some((cached_class, cached)) if *cached_class == class => Some(*cached),
            _ => class.select_method(method),
        };
        match selected {
            None => Ok(Err(ExecResult::Fault(Throw::with_message(
                self.java.classes.lang.no_such_method_error,
                format!("{:?}", method.0),
            )))),
            Some(selected) if selected.0.is_abstract() => {
                Ok(Err(ExecResult::Fault(Throw::with_message(
                    self.java.classes.lang.abstract_method_error,
                    format!("{:?}", selected.0),
                ))))
            }
            Some(selected) => {
                self.transients
                    .dispatch
                    .insert(call_site, (class, selected));
                Ok(Ok(Target::Method(selected)))
            }
        }
    }

    /// Call the implementation behind a function object
    ///
    /// Static implementations get the captured values followed by the call arguments. Instance
    /// implementations take their receiver from the first of those, and get dispatched on it.
    fn invoke_function(
        &mut self,
        thread: ThreadId,
        implementation: MethodId<'g>,
        stack_entries: usize,
        arguments: Vec<Slot>,
    ) -> Result<ExecResult<'g>, Error> {
        if implementation.0.is_init() || implementation.0.is_native() {
            return Err(Error::UnsupportedNative(format!(
                "function object calling {:?}",
                implementation.0
            )));
        }
        if implementation.0.is_static() {
            if let Some(result) = self.ensure_initialized(thread, implementation.0.class)? {
                return Ok(result);
            }
            return self.invoke_method(thread, implementation, stack_entries, arguments);
        }

        let receiver = match arguments.first().map(|slot| slot.value) {
            Some(Value::Ref(receiver)) => receiver,
            _ => {
                return Ok(self.null_pointer(format!(
                    "Cannot invoke \"{}\" because value is null",
                    implementation.0.name
                )))
            }
        };
        let class = self
            .state
            .heap
            .get(receiver)?
            .class()
            .unwrap_or(self.java.classes.lang.object);
        match class.select_method(implementation) {
            Some(selected) if !selected.0.is_abstract() => {
                self.invoke_method(thread, selected, stack_entries, arguments)
            }
            _ => Ok(ExecResult::Fault(Throw::with_message(
                self.java.classes.lang.abstract_method_error,
                format!("{:?}", implementation.0),
            ))),
        }
    }

    /// Push a frame for a resolved method
    ///
    /// The caller's `stack_entries` top operand entries stay where they are until the call
    /// returns. Native methods run right away as intrinsics. Synchronized methods take their
    /// lock (the receiver, or the class object for static methods) before the frame is pushed,
    /// which may block or be a scheduling point.
    pub(super) fn invoke_method(
        &mut self,
        thread: ThreadId,
        target: MethodId<'g>,
        stack_entries: usize,
        arguments: Vec<Slot>,
    ) -> Result<ExecResult<'g>, Error> {
        if target.0.is_native() {
            return self.execute_intrinsic(thread, target);
        }
        if target.0.is_abstract() {
            return Ok(ExecResult::Fault(Throw::with_message(
                self.java.classes.lang.abstract_method_error,
                format!("{:?}", target.0),
            )));
        }
        let body = target
            .body()
            .ok_or_else(|| Error::MissingCode(format!("{:?}", target.0)))?;

        if self.state.thread(thread)?.stack.len() >= self.settings.max_stack_depth {
            return Ok(ExecResult::Fault(Throw::new(
                self.java.classes.lang.stack_overflow_error,
            )));
        }

        let sync_lock = if target.0.is_synchronized() {
            let lock = self.method_lock(thread, target, &arguments)?;
            if !self.state.heap.get(lock)?.monitor.can_lock(thread) {
                return self.block_on(thread, lock);
            }
            if let Some(cg) = self
                .scheduler
                .sync
                .sets_lock_acquisition_cg(&self.state, thread, lock)?
            {
                return Ok(ExecResult::Suspend(cg));
            }
            self.lock(thread, lock, 1)?;
            Some(lock)
        } else {
            None
        };

        let mut frame = StackFrame::new(target, body, FrameKind::Normal);
        frame.set_arguments(arguments)?;
        frame.sync_lock = sync_lock;
        frame.caller_args = stack_entries;
        self.state.thread_mut(thread)?.stack.push(frame);
        Ok(ExecResult::Continue(0))
    }

    /// Object whose monitor a `synchronized` method holds
    fn method_lock(
        &mut self,
        thread: ThreadId,
        method: MethodId<'g>,
        arguments: &[Slot],
    ) -> Result<ObjRef, Error> {
        if method.0.is_static() {
            return self.class_object_of(thread, method.0.class);
        }
        match arguments.first().map(|slot| slot.value) {
            Some(Value::Ref(receiver)) => Ok(receiver),
            Some(found) => Err(Error::TypeMismatch {
                expected: "receiver",
                found,
            }),
            None => Err(Error::EmptyOperandStack),
        }
    }

    pub(super) fn class_object_of(
        &mut self,
        thread: ThreadId,
        class: ClassId<'g>,
    ) -> Result<ObjRef, Error> {
        let class_class = self.java.classes.lang.class;
        self.state
            .heap
            .class_object(class, class_class, thread)
            .ok_or(Error::HeapOverflow)
    }
}
