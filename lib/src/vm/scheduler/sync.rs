use super::ids;
use crate::vm::{ChoiceGenerator, Error, ObjRef, Settings, ThreadChoiceFromSet, ThreadId, VmState};
use std::fmt::Debug;

/// Decides on scheduling points caused by synchronization and thread lifecycle events
///
/// There are two kinds of choice points:
///
///   - blocking ones, where the current thread can't continue (it is blocked on a lock, waiting,
///     joining, or terminated): these must break the transition, even in atomic sections
///
///   - non-blocking ones, which are only interesting because some other thread might want to get
///     in first: these are skipped on the first step of a transition and in atomic sections
pub trait SyncPolicy: Debug {
    /// Choice of thread to start the program with
    fn root_cg(&self, state: &VmState) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    /// The thread is about to acquire a free (or already owned) lock
    fn sets_lock_acquisition_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        lock: ObjRef,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    /// The thread just blocked trying to acquire a lock held by another thread
    fn sets_blocked_thread_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        lock: ObjRef,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    /// The thread released a lock for good (`did_unblock` if that woke up other threads)
    fn sets_lock_release_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        lock: ObjRef,
        did_unblock: bool,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    fn sets_wait_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    fn sets_notify_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        did_notify: bool,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    fn sets_notify_all_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        did_notify: bool,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    fn sets_start_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        started: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    fn sets_yield_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    /// The thread is now waiting for `joined` to terminate
    fn sets_join_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        joined: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    /// The thread just terminated
    fn sets_termination_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    /// Called before the atomic section is entered
    fn sets_begin_atomic_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    /// Called after the atomic section is left
    fn sets_end_atomic_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    /// Any other voluntary scheduling point
    fn sets_reschedule_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        reason: &'static str,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;
}

/// Every runnable thread is a choice at every scheduling point
#[derive(Debug)]
pub struct AllRunnablesSyncPolicy {
    break_single_choice: bool,
    break_lock_release: bool,
    break_notify: bool,
    break_start: bool,
    break_yield: bool,
}

impl AllRunnablesSyncPolicy {
    pub fn new(settings: &Settings) -> AllRunnablesSyncPolicy {
        AllRunnablesSyncPolicy {
            break_single_choice: settings.break_single_choice,
            break_lock_release: settings.break_lock_release,
            break_notify: settings.break_notify,
            break_start: settings.break_start,
            break_yield: settings.break_yield,
        }
    }

    fn runnable_cg(
        &self,
        id: &'static str,
        state: &VmState,
        thread: ThreadId,
    ) -> Option<Box<dyn ChoiceGenerator>> {
        let choices = state.runnable_threads();
        if choices.is_empty() {
            return None;
        }
        if choices == [thread] && !self.break_single_choice {
            return None;
        }
        log::info!("{} CG in thread {} over {:?}", id, thread, choices);
        Some(Box::new(ThreadChoiceFromSet::new(id, choices, true)))
    }

    fn non_blocking_cg(
        &self,
        id: &'static str,
        state: &VmState,
        thread: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        if state.thread(thread)?.first_step || state.is_atomic() {
            return Ok(None);
        }
        Ok(self.runnable_cg(id, state, thread))
    }

    /// If nobody can run but threads are still alive, the empty choice signals a deadlock
    fn blocking_cg(
        &self,
        id: &'static str,
        state: &VmState,
        thread: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        if let Some(cg) = self.runnable_cg(id, state, thread) {
            return Ok(Some(cg));
        }
        if state.live_threads().is_empty() {
            return Ok(None);
        }
        log::info!("no runnable threads left after {} in thread {}", id, thread);
        Ok(Some(Box::new(ThreadChoiceFromSet::new(
            ids::BLOCKED_NO_CHOICE,
            vec![],
            true,
        ))))
    }
}

impl SyncPolicy for AllRunnablesSyncPolicy {
    fn root_cg(&self, state: &VmState) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        let choices = state.runnable_threads();
        Ok(Some(Box::new(ThreadChoiceFromSet::new(
            ids::ROOT,
            choices,
            true,
        ))))
    }

    fn sets_lock_acquisition_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        _lock: ObjRef,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        self.non_blocking_cg(ids::LOCK, state, thread)
    }

    fn sets_blocked_thread_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        _lock: ObjRef,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        self.blocking_cg(ids::BLOCK, state, thread)
    }

    fn sets_lock_release_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        _lock: ObjRef,
        did_unblock: bool,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        if self.break_lock_release && did_unblock {
            self.non_blocking_cg(ids::RELEASE, state, thread)
        } else {
            Ok(None)
        }
    }

    fn sets_wait_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        self.blocking_cg(ids::WAIT, state, thread)
    }

    fn sets_notify_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        did_notify: bool,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        if self.break_notify && did_notify {
            self.non_blocking_cg(ids::NOTIFY, state, thread)
        } else {
            Ok(None)
        }
    }

    fn sets_notify_all_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        did_notify: bool,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        if self.break_notify && did_notify {
            self.non_blocking_cg(ids::NOTIFYALL, state, thread)
        } else {
            Ok(None)
        }
    }

    fn sets_start_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        _started: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        if self.break_start {
            self.non_blocking_cg(ids::START, state, thread)
        } else {
            Ok(None)
        }
    }

    fn sets_yield_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        if self.break_yield {
            self.non_blocking_cg(ids::YIELD, state, thread)
        } else {
            Ok(None)
        }
    }

    fn sets_join_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        _joined: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        self.blocking_cg(ids::JOIN, state, thread)
    }

    fn sets_termination_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        self.blocking_cg(ids::TERMINATE, state, thread)
    }

    fn sets_begin_atomic_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        self.non_blocking_cg(ids::BEGIN_ATOMIC, state, thread)
    }

    fn sets_end_atomic_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        self.non_blocking_cg(ids::END_ATOMIC, state, thread)
    }

    fn sets_reschedule_cg(
        &self,
        state: &VmState,
        thread: ThreadId,
        reason: &'static str,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        self.non_blocking_cg(reason, state, thread)
    }
}
