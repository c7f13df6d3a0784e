use super::{ExecResult, Throw};
use crate::vm::scheduler::ids;
use crate::vm::{Error, ObjRef, ThreadId, ThreadState, Vm};

/// Outcome of releasing one level of a lock
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Unlock {
    /// The thread doesn't own the lock
    NotOwner,

    /// The lock is still held (it was entered recursively)
    Held,

    /// The lock is now free
    Released {
        /// Some blocked or notified thread can now compete for the lock
        did_unblock: bool,
    },
}

impl<'g> Vm<'g> {
    /// Take a lock, `count` levels deep (the lock must be free or already held by the thread)
    ///
    /// Threads that were unblocked by the last release but didn't get to run yet are blocked
    /// again, so the next release still counts as unblocking them.
    pub(super) fn lock(&mut self, thread: ThreadId, lock: ObjRef, count: u32) -> Result<(), Error> {
        let monitor = &mut self.state.heap.get_mut(lock)?.monitor;
        monitor.owner = Some(thread);
        monitor.count += count;
        self.state.thread_mut(thread)?.add_locked_object(lock);

        for contender in self.state.threads_on_lock(lock, ThreadState::Unblocked) {
            if contender != thread {
                self.state.thread_mut(contender)?.state = ThreadState::Blocked;
            }
        }
        Ok(())
    }

    /// Release one level of a lock
    pub(super) fn unlock(&mut self, thread: ThreadId, lock: ObjRef) -> Result<Unlock, Error> {
        let monitor = &mut self.state.heap.get_mut(lock)?.monitor;
        if monitor.owner != Some(thread) {
            return Ok(Unlock::NotOwner);
        }
        monitor.count = monitor.count.saturating_sub(1);
        if monitor.count > 0 {
            return Ok(Unlock::Held);
        }
        let did_unblock = self.release(thread, lock)?;
        Ok(Unlock::Released { did_unblock })
    }

    /// Release a lock entirely, returning the count it was held with
    pub(super) fn release_all(&mut self, thread: ThreadId, lock: ObjRef) -> Result<u32, Error> {
        let monitor = &mut self.state.heap.get_mut(lock)?.monitor;
        if monitor.owner != Some(thread) {
            return Ok(0);
        }
        let count = monitor.count;
        monitor.count = 0;
        self.release(thread, lock)?;
        Ok(count)
    }

    /// Mark a lock as free, unblocking the threads waiting to acquire it
    fn release(&mut self, thread: ThreadId, lock: ObjRef) -> Result<bool, Error> {
        self.state.heap.get_mut(lock)?.monitor.owner = None;
        self.state.thread_mut(thread)?.remove_locked_object(lock);

        let blocked = self.state.threads_on_lock(lock, ThreadState::Blocked);
        let notified = self.state.threads_on_lock(lock, ThreadState::Notified);
        for other in &blocked {
            self.state.thread_mut(*other)?.state = ThreadState::Unblocked;
        }
        Ok(!blocked.is_empty() || !notified.is_empty())
    }

    /// Block the thread on a lock held by another thread
    ///
    /// Blocking always ends the transition, so the scheduler must come up with a choice.
    pub(super) fn block_on(
        &mut self,
        thread: ThreadId,
        lock: ObjRef,
    ) -> Result<ExecResult<'g>, Error> {
        let info = self.state.thread_mut(thread)?;
        info.state = ThreadState::Blocked;
        info.lock_ref = Some(lock);
        log::debug!("{} blocks on {}", thread, lock);
        let cg = self
            .scheduler
            .sync
            .sets_blocked_thread_cg(&self.state, thread, lock)?
            .ok_or(Error::MissingChoiceGenerator(ids::BLOCK))?;
        Ok(ExecResult::Suspend(cg))
    }

    pub(super) fn illegal_monitor_state(&self) -> ExecResult<'g> {
        ExecResult::Fault(Throw::with_message(
            self.java.classes.lang.illegal_monitor_state_exception,
            "current thread is not owner",
        ))
    }

    pub(super) fn execute_monitor_enter(
        &mut self,
        thread: ThreadId,
    ) -> Result<ExecResult<'g>, Error> {
        let lock = match self.frame(thread)?.peek_reference(0)? {
            Some(lock) => lock,
            None => {
                let message = "Cannot enter synchronized block because it is null";
                return Ok(self.null_pointer(message));
            }
        };
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
        let frame = self.frame_mut(thread)?;
        frame.pop()?;
        Ok(ExecResult::Continue(frame.pc + 1))
    }

    pub(super) fn execute_monitor_exit(
        &mut self,
        thread: ThreadId,
    ) -> Result<ExecResult<'g>, Error> {
        let lock = match self.frame(thread)?.peek_reference(0)? {
            Some(lock) => lock,
            None => {
                let message = "Cannot exit synchronized block because it is null";
                return Ok(self.null_pointer(message));
            }
        };

        // The lock was already released before the choice point
        if !self.is_resuming(thread)? {
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

        let frame = self.frame_mut(thread)?;
        frame.pop()?;
        Ok(ExecResult::Continue(frame.pc + 1))
    }
}
