use super::{Error, Heap, ObjRef, ThreadId, ThreadInfo, ThreadState};
use std::rc::Rc;

/// Complete state of the program being checked
///
/// This is what the search saves before exploring a choice and restores when backtracking.
/// Cloning it is cheap since both heap elements and threads are reference counted and only
/// copied when modified.
#[derive(Clone, Debug)]
pub struct VmState<'g> {
    pub heap: Heap<'g>,
    threads: Vec<Rc<ThreadInfo<'g>>>,

    /// Thread currently executing
    pub current: ThreadId,

    /// Nesting depth of `Verify.beginAtomic` sections (non-blocking choices are suppressed
    /// while this is positive)
    pub atomic_level: u32,
}

impl<'g> VmState<'g> {
    pub fn new(heap: Heap<'g>) -> VmState<'g> {
        VmState {
            heap,
            threads: vec![],
            current: ThreadId(0),
            atomic_level: 0,
        }
    }

    pub fn thread(&self, id: ThreadId) -> Result<&ThreadInfo<'g>, Error> {
        self.threads
            .get(id.0)
            .map(|thread| &**thread)
            .ok_or(Error::UnknownThread(id))
    }

    pub fn thread_mut(&mut self, id: ThreadId) -> Result<&mut ThreadInfo<'g>, Error> {
        self.threads
            .get_mut(id.0)
            .map(Rc::make_mut)
            .ok_or(Error::UnknownThread(id))
    }

    /// Register a new thread, assigning it the next identifier
    pub fn add_thread(&mut self, build: impl FnOnce(ThreadId) -> ThreadInfo<'g>) -> ThreadId {
        let id = ThreadId(self.threads.len());
        self.threads.push(Rc::new(build(id)));
        id
    }

    pub fn threads(&self) -> impl Iterator<Item = &ThreadInfo<'g>> {
        self.threads.iter().map(|thread| &**thread)
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic_level > 0
    }

    /// Can the thread be scheduled right now?
    pub fn is_runnable(&self, id: ThreadId) -> bool {
        let thread = match self.thread(id) {
            Ok(thread) => thread,
            Err(_) => return false,
        };
        match thread.state {
            ThreadState::Runnable => !thread.stack.is_empty(),
            ThreadState::Unblocked | ThreadState::Notified => match thread.lock_ref {
                None => true,
                Some(lock) => self
                    .heap
                    .get(lock)
                    .map_or(false, |element| element.monitor.can_lock(id)),
            },
            ThreadState::Joining(other) => self
                .thread(other)
                .map_or(true, |other| !other.is_alive()),
            ThreadState::Blocked | ThreadState::Waiting | ThreadState::Terminated => false,
        }
    }

    pub fn runnable_threads(&self) -> Vec<ThreadId> {
        self.threads()
            .map(|thread| thread.id)
            .filter(|id| self.is_runnable(*id))
            .collect()
    }

    /// Are there runnable threads besides the given one?
    pub fn has_other_runnables(&self, id: ThreadId) -> bool {
        self.threads()
            .any(|thread| thread.id != id && self.is_runnable(thread.id))
    }

    pub fn live_threads(&self) -> Vec<ThreadId> {
        self.threads()
            .filter(|thread| thread.is_alive())
            .map(|thread| thread.id)
            .collect()
    }

    pub fn all_terminated(&self) -> bool {
        self.threads().all(|thread| !thread.is_alive())
    }

    /// Thread started from a `java/lang/Thread` object
    pub fn thread_for_object(&self, object: ObjRef) -> Option<ThreadId> {
        self.threads()
            .find(|thread| thread.object == object)
            .map(|thread| thread.id)
    }

    /// Threads in the given state with respect to a lock
    pub fn threads_on_lock(&self, lock: ObjRef, state: ThreadState) -> Vec<ThreadId> {
        self.threads()
            .filter(|thread| thread.state == state && thread.lock_ref == Some(lock))
            .map(|thread| thread.id)
            .collect()
    }
}
