use super::{ExecResult, Throw};
use crate::jvm::class_graph::ClassId;
use crate::jvm::Name;
use crate::vm::{Error, FrameKind, InitStatus, ObjRef, StackFrame, ThreadId, ThreadState, Vm};

impl<'g> Vm<'g> {
    /// Make sure a class (and its superclasses) are initialized before the current instruction
    /// uses it
    ///
    /// Returns `None` if the class is ready. Otherwise, the returned result ends the current
    /// instruction: either a `<clinit>` frame got pushed (and the instruction re-executes once
    /// it returns), the thread blocked because another thread is initializing the class, or the
    /// class is unusable because its initializer failed.
    pub(crate) fn ensure_initialized(
        &mut self,
        thread: ThreadId,
        class: ClassId<'g>,
    ) -> Result<Option<ExecResult<'g>>, Error> {
        let class_class = self.java.classes.lang.class;
        let mut chain: Vec<ClassId<'g>> = class.superclasses().collect();
        chain.reverse();

        for class in chain {
            let class_object = self
                .state
                .heap
                .class_object(class, class_class, thread)
                .ok_or(Error::HeapOverflow)?;
            let status = self
                .state
                .heap
                .get(class_object)?
                .init_status()
                .ok_or(Error::UnexpectedElement {
                    reference: class_object,
                    expected: "class object",
                })?;

            match status {
                InitStatus::Initialized => (),
                InitStatus::Initializing(initializer) if initializer == thread => (),
                InitStatus::Initializing(_) => return self.block_on(thread, class_object).map(Some),
                InitStatus::Erroneous => {
                    return Ok(Some(ExecResult::Fault(Throw::with_message(
                        self.java.classes.lang.no_class_def_found_error,
                        format!(
                            "Could not initialize class {}",
                            class.0.name.as_str().replace('/', ".")
                        ),
                    ))))
                }
                InitStatus::NotInitialized => match class.class_initializer() {
                    None => self
                        .state
                        .heap
                        .get_mut(class_object)?
                        .set_init_status(InitStatus::Initialized),
                    Some(clinit) => {
                        return self
                            .run_class_initializer(thread, class, clinit, class_object)
                            .map(Some)
                    }
                },
            }
        }
        Ok(None)
    }

    /// Push a frame for `<clinit>`, holding the class object's lock while it runs
    fn run_class_initializer(
        &mut self,
        thread: ThreadId,
        class: ClassId<'g>,
        clinit: crate::jvm::class_graph::MethodId<'g>,
        class_object: ObjRef,
    ) -> Result<ExecResult<'g>, Error> {
        if !self.state.heap.get(class_object)?.monitor.can_lock(thread) {
            return self.block_on(thread, class_object);
        }
        let body = clinit
            .body()
            .ok_or_else(|| Error::MissingCode(format!("{:?}", clinit.0)))?;

        log::debug!("initializing {:?} in thread {}", class, thread);
        self.state
            .heap
            .get_mut(class_object)?
            .set_init_status(InitStatus::Initializing(thread));
        self.lock(thread, class_object, 1)?;
        self.state
            .thread_mut(thread)?
            .stack
            .push(StackFrame::new(clinit, body, FrameKind::ClassInit(class)));
        Ok(ExecResult::Continue(0))
    }

    /// Mark the end of a `<clinit>` run (successful or not), releasing the class object
    pub(super) fn finish_class_initializer(
        &mut self,
        thread: ThreadId,
        class: ClassId<'g>,
        status: InitStatus,
    ) -> Result<(), Error> {
        let class_object = self
            .state
            .heap
            .statics(class)
            .ok_or(Error::UnexpectedElement {
                reference: ObjRef(u32::MAX),
                expected: "class object",
            })?;
        self.state
            .heap
            .get_mut(class_object)?
            .set_init_status(status);
        self.release_all(thread, class_object)?;

        // Threads blocked on the initialization itself go back to checking the status
        for other in self.state.threads_on_lock(class_object, ThreadState::Blocked) {
            self.state.thread_mut(other)?.state = ThreadState::Unblocked;
        }
        Ok(())
    }
}
