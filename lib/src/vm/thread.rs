use super::{Error, ObjRef, StackFrame, ThreadId};

/// Scheduling state of a guest thread
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ThreadState {
    Runnable,

    /// Waiting to acquire `lock_ref`, which is held by another thread
    Blocked,

    /// The lock it was blocked on got released (runnable if it can take the lock)
    Unblocked,

    /// Inside `Object.wait` on `lock_ref`
    Waiting,

    /// Woken up by a `notify` (runnable if it can re-acquire the lock)
    Notified,

    /// Inside `Thread.join` on the given thread
    Joining(ThreadId),

    Terminated,
}

/// One guest thread
#[derive(Clone, Debug)]
pub struct ThreadInfo<'g> {
    pub id: ThreadId,
    pub name: String,

    /// `java/lang/Thread` object
    pub object: ObjRef,

    pub state: ThreadState,
    pub stack: Vec<StackFrame<'g>>,

    /// The next instruction is the first one of the transition
    pub first_step: bool,

    /// The next instruction is being re-executed after it registered a choice generator
    pub resuming: bool,

    /// Object the thread is blocked or waiting on
    pub lock_ref: Option<ObjRef>,

    /// Lock count to restore once a waiting thread re-acquires its lock
    pub saved_lock_count: u32,

    /// Objects currently locked, in acquisition order
    pub locked_objects: Vec<ObjRef>,
}

impl<'g> ThreadInfo<'g> {
    pub fn new(id: ThreadId, name: String, object: ObjRef) -> ThreadInfo<'g> {
        ThreadInfo {
            id,
            name,
            object,
            state: ThreadState::Runnable,
            stack: vec![],
            first_step: true,
            resuming: false,
            lock_ref: None,
            saved_lock_count: 0,
            locked_objects: vec![],
        }
    }

    pub fn top_frame(&self) -> Result<&StackFrame<'g>, Error> {
        self.stack.last().ok_or(Error::MissingFrame(self.id))
    }

    pub fn top_frame_mut(&mut self) -> Result<&mut StackFrame<'g>, Error> {
        self.stack.last_mut().ok_or(Error::MissingFrame(self.id))
    }

    pub fn is_alive(&self) -> bool {
        self.state != ThreadState::Terminated
    }

    /// Record that a lock was acquired for the first time
    pub fn add_locked_object(&mut self, reference: ObjRef) {
        if !self.locked_objects.contains(&reference) {
            self.locked_objects.push(reference);
        }
    }

    pub fn remove_locked_object(&mut self, reference: ObjRef) {
        self.locked_objects.retain(|locked| *locked != reference);
    }
}
