use super::monitors::Unlock;
use super::ExecResult;
use crate::vm::{ElementFlags, Error, FrameKind, InitStatus, Slot, ThreadId, ThreadState, Value, Vm};

impl<'g> Vm<'g> {
    /// Return from the top frame, handing the value (if any) to the caller
    ///
    /// The arguments stay on the caller's operand stack for the whole call, so they are only
    /// dropped here. Returning from a `<clinit>` frame doesn't advance the caller, since the
    /// caller's instruction was waiting for the class to be initialized and must run again.
    pub(super) fn execute_return(
        &mut self,
        thread: ThreadId,
        has_value: bool,
    ) -> Result<ExecResult<'g>, Error> {
        let frame = self.frame(thread)?;
        let method = frame.method;
        let kind = frame.kind;
        let sync_lock = frame.sync_lock;
        let value = match (has_value, &method.0.descriptor.return_type) {
            (true, Some(return_type)) => {
                let slot = frame.peek(0)?;
                Some(Slot::with_attr(
                    slot.value.narrow_to(return_type),
                    slot.attr.clone(),
                ))
            }
            (true, None) => return Err(Error::UnexpectedInstruction(format!("{:?}", method.0))),
            (false, _) => None,
        };
        let receiver = match (method.0.is_init(), frame.load(0)) {
            (true, Ok(slot)) => slot.value.as_reference()?,
            _ => None,
        };

        // The lock was already released before the choice point
        if let (Some(lock), false) = (sync_lock, self.is_resuming(thread)?) {
            match self.unlock(thread, lock)? {
                Unlock::NotOwner => return Ok(self.illegal_monitor_state()),
                Unlock::Held => (),
                Unlock::Released { did_unblock } => {
                    if let Some(cg) = self.scheduler.sync.sets_lock_release_cg(
                        &self.state,
                        thread,
                        lock,
                        did_unblock,
                    )? {
                        return Ok(ExecResult::Suspend(cg));
                    }
                }
            }
        }

        let info = self.state.thread_mut(thread)?;
        let returned = info.stack.pop().ok_or(Error::MissingFrame(thread))?;

        // The object is fully built once the constructor of its exact class returns
        if let Some(object) = receiver {
            let element = self.state.heap.get_mut(object)?;
            if element.class() == Some(method.0.class) {
                element.flags.insert(ElementFlags::CONSTRUCTED);
            }
        }

        if let FrameKind::ClassInit(class) = kind {
            self.finish_class_initializer(thread, class, InitStatus::Initialized)?;
            log::debug!("initialized {:?}", class);
            let caller = self.frame(thread)?;
            return Ok(ExecResult::Continue(caller.pc));
        }

        let info = self.state.thread_mut(thread)?;
        match info.stack.last_mut() {
            Some(caller) => {
                caller.drop_entries(returned.caller_args)?;
                if let Some(value) = value {
                    caller.push(value);
                }
                Ok(ExecResult::Continue(caller.pc + 1))
            }
            None => self.terminate(thread),
        }
    }

    /// Mark a thread as dead, whether it returned from its last frame or threw out of it
    ///
    /// Anything still locked (eg. by unbalanced `monitorenter`s) is released, so threads blocked
    /// on those locks can compete for them again.
    pub(super) fn thread_died(&mut self, thread: ThreadId) -> Result<(), Error> {
        let info = self.state.thread_mut(thread)?;
        info.state = ThreadState::Terminated;
        log::info!("thread {} ({}) terminated", thread, info.name);

        let locked = info.locked_objects.clone();
        for lock in locked {
            self.release_all(thread, lock)?;
        }

        for listener in &mut self.listeners {
            listener.thread_terminated(&self.state, thread);
        }
        Ok(())
    }

    /// The last frame of a thread returned
    fn terminate(&mut self, thread: ThreadId) -> Result<ExecResult<'g>, Error> {
        self.thread_died(thread)?;
        match self.scheduler.sync.sets_termination_cg(&self.state, thread)? {
            Some(cg) => Ok(ExecResult::Suspend(cg)),
            None => Ok(ExecResult::Continue(0)),
        }
    }
}
