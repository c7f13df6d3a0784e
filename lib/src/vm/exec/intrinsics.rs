//! Built-in implementations of native library methods
//!
//! Intrinsics run in place of a frame: they find their arguments on the caller's operand stack,
//! and pop them (pushing the result, if any) when they complete. Like instructions, intrinsics
//! which register a choice generator leave the stack untouched and run again afterwards.

use super::{ExecResult, Throw};
use crate::jvm::class_graph::{JavaLibrary, MethodId};
use crate::vm::scheduler::ids;
use crate::vm::{
    BooleanChoiceGenerator, Choice, Error, FrameKind, IntIntervalGenerator, ObjRef, Slot,
    StackFrame, ThreadChoiceFromSet, ThreadId, ThreadInfo, ThreadState, Value, Vm,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Intrinsic {
    ObjectHashCode,
    ObjectGetClass,
    ObjectWait,
    ObjectNotify,
    ObjectNotifyAll,
    StringLength,
    StringEquals,
    StringHashCode,
    ThreadStart,
    ThreadJoin,
    ThreadIsAlive,
    ThreadYield,
    ThreadCurrentThread,
    VerifyGetBoolean,
    VerifyGetBooleanFlag,
    VerifyGetInt,
    VerifyBeginAtomic,
    VerifyEndAtomic,
}

impl Intrinsic {
    fn lookup<'g>(java: &JavaLibrary<'g>, method: MethodId<'g>) -> Option<Intrinsic> {
        let lang = &java.members.lang;
        let verify = &java.members.verify;
        let table = [
            (lang.object.hash_code, Intrinsic::ObjectHashCode),
            (lang.object.get_class, Intrinsic::ObjectGetClass),
            (lang.object.wait, Intrinsic::ObjectWait),
            (lang.object.notify, Intrinsic::ObjectNotify),
            (lang.object.notify_all, Intrinsic::ObjectNotifyAll),
            (lang.string.length, Intrinsic::StringLength),
            (lang.string.equals, Intrinsic::StringEquals),
            (lang.string.hash_code, Intrinsic::StringHashCode),
            (lang.thread.start, Intrinsic::ThreadStart),
            (lang.thread.join, Intrinsic::ThreadJoin),
            (lang.thread.is_alive, Intrinsic::ThreadIsAlive),
            (lang.thread.yield_, Intrinsic::ThreadYield),
            (lang.thread.current_thread, Intrinsic::ThreadCurrentThread),
            (verify.get_boolean, Intrinsic::VerifyGetBoolean),
            (verify.get_boolean_flag, Intrinsic::VerifyGetBooleanFlag),
            (verify.get_int, Intrinsic::VerifyGetInt),
            (verify.begin_atomic, Intrinsic::VerifyBeginAtomic),
            (verify.end_atomic, Intrinsic::VerifyEndAtomic),
        ];
        table
            .iter()
            .find(|(candidate, _)| *candidate == method)
            .map(|(_, intrinsic)| *intrinsic)
    }
}

/// Java's `String.hashCode`, over UTF-16 code units
pub fn string_hash(value: &str) -> i32 {
    value
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

impl<'g> Vm<'g> {
    pub(super) fn execute_intrinsic(
        &mut self,
        thread: ThreadId,
        method: MethodId<'g>,
    ) -> Result<ExecResult<'g>, Error> {
        let intrinsic = Intrinsic::lookup(&self.java, method)
            .ok_or_else(|| Error::UnsupportedNative(format!("{:?}", method.0)))?;
        log::trace!("intrinsic {:?} in thread {}", intrinsic, thread);

        match intrinsic {
            Intrinsic::ObjectHashCode => {
                let object = self.receiver(thread, 0)?;
                self.finish(thread, 1, Some(Value::Int(object.0 as i32)))
            }
            Intrinsic::ObjectGetClass => {
                let object = self.receiver(thread, 0)?;
                let class = self
                    .state
                    .heap
                    .get(object)?
                    .class()
                    .unwrap_or(self.java.classes.lang.object);
                let class_object = self.class_object_of(thread, class)?;
                self.finish(thread, 1, Some(Value::Ref(class_object)))
            }
            Intrinsic::ObjectWait => self.object_wait(thread),
            Intrinsic::ObjectNotify => self.object_notify(thread),
            Intrinsic::ObjectNotifyAll => self.object_notify_all(thread),

            Intrinsic::StringLength => {
                let string = self.receiver(thread, 0)?;
                let length = self.string(string)?.encode_utf16().count();
                self.finish(thread, 1, Some(Value::Int(length as i32)))
            }
            Intrinsic::StringEquals => {
                let string = self.receiver(thread, 1)?;
                let other = self.frame(thread)?.peek_reference(0)?;
                let equal = match other {
                    Some(other) => match self.state.heap.get(other)?.string_value() {
                        Some(other) => **other == *self.string(string)?,
                        None => false,
                    },
                    None => false,
                };
                self.finish(thread, 2, Some(Value::Int(i32::from(equal))))
            }
            Intrinsic::StringHashCode => {
                let string = self.receiver(thread, 0)?;
                let hash = string_hash(self.string(string)?);
                self.finish(thread, 1, Some(Value::Int(hash)))
            }

            Intrinsic::ThreadStart => self.thread_start(thread),
            Intrinsic::ThreadJoin => self.thread_join(thread),
            Intrinsic::ThreadIsAlive => {
                let object = self.receiver(thread, 0)?;
                let alive = match self.state.thread_for_object(object) {
                    Some(other) => self.state.thread(other)?.is_alive(),
                    None => false,
                };
                self.finish(thread, 1, Some(Value::Int(i32::from(alive))))
            }
            Intrinsic::ThreadYield => {
                if !self.is_resuming(thread)? {
                    if let Some(cg) = self.scheduler.sync.sets_yield_cg(&self.state, thread)? {
                        return Ok(ExecResult::Suspend(cg));
                    }
                }
                self.finish(thread, 0, None)
            }
            Intrinsic::ThreadCurrentThread => {
                let object = self.state.thread(thread)?.object;
                self.finish(thread, 0, Some(Value::Ref(object)))
            }

            Intrinsic::VerifyGetBoolean => self.verify_get_boolean(thread, false),
            Intrinsic::VerifyGetBooleanFlag => self.verify_get_boolean(thread, true),
            Intrinsic::VerifyGetInt => self.verify_get_int(thread),
            Intrinsic::VerifyBeginAtomic => {
                if !self.is_resuming(thread)? {
                    let cg = self
                        .scheduler
                        .sync
                        .sets_begin_atomic_cg(&self.state, thread)?;
                    if let Some(cg) = cg {
                        return Ok(ExecResult::Suspend(cg));
                    }
                }
                self.state.atomic_level += 1;
                self.finish(thread, 0, None)
            }
            Intrinsic::VerifyEndAtomic => {
                if !self.is_resuming(thread)? {
                    self.state.atomic_level = self.state.atomic_level.saturating_sub(1);
                    if let Some(cg) = self.scheduler.sync.sets_end_atomic_cg(&self.state, thread)? {
                        return Ok(ExecResult::Suspend(cg));
                    }
                }
                self.finish(thread, 0, None)
            }
        }
    }

    /// Pop the arguments of an intrinsic and push its result
    fn finish(
        &mut self,
        thread: ThreadId,
        popped: usize,
        result: Option<Value>,
    ) -> Result<ExecResult<'g>, Error> {
        let frame = self.frame_mut(thread)?;
        frame.drop_entries(popped)?;
        if let Some(result) = result {
            frame.push(Slot::new(result));
        }
        Ok(ExecResult::Continue(frame.pc + 1))
    }

    /// Non-null reference `depth` entries down the stack (calls have already checked for `null`)
    fn receiver(&self, thread: ThreadId, depth: usize) -> Result<ObjRef, Error> {
        match self.frame(thread)?.peek(depth)?.value {
            Value::Ref(object) => Ok(object),
            found => Err(Error::TypeMismatch {
                expected: "receiver",
                found,
            }),
        }
    }

    fn string(&self, string: ObjRef) -> Result<&str, Error> {
        self.state
            .heap
            .get(string)?
            .string_value()
            .map(|value| &**value)
            .ok_or(Error::UnexpectedElement {
                reference: string,
                expected: "string",
            })
    }

    /// `Thread.start`: create a new thread running the `run` method of the receiver
    fn thread_start(&mut self, thread: ThreadId) -> Result<ExecResult<'g>, Error> {
        let object = self.receiver(thread, 0)?;
        let existing = self.state.thread_for_object(object);

        // Started before the choice point
        if self.is_resuming(thread)? && existing.is_some() {
            return self.finish(thread, 1, None);
        }
        if existing.is_some() {
            return Ok(ExecResult::Fault(Throw::new(
                self.java.classes.lang.illegal_thread_state_exception,
            )));
        }

        let class = self
            .state
            .heap
            .get(object)?
            .class()
            .unwrap_or(self.java.classes.lang.thread);
        let run = class
            .select_method(self.java.members.lang.thread.run)
            .ok_or_else(|| Error::MissingCode(format!("run method of {:?}", class)))?;
        let body = run
            .body()
            .ok_or_else(|| Error::MissingCode(format!("{:?}", run.0)))?;
        let mut frame = StackFrame::new(run, body, FrameKind::Normal);
        frame.set_arguments(vec![Slot::new(Value::Ref(object))])?;

        let started = self.state.add_thread(|id| {
            let name = format!("Thread-{}", id.0.saturating_sub(1));
            let mut info = ThreadInfo::new(id, name, object);
            info.stack.push(frame);
            info
        });
        self.state
            .heap
            .get_mut(object)?
            .referencing_threads
            .insert(started);
        log::info!("thread {} started thread {}", thread, started);

        match self
            .scheduler
            .sync
            .sets_start_cg(&self.state, thread, started)?
        {
            Some(cg) => Ok(ExecResult::Suspend(cg)),
            None => self.finish(thread, 1, None),
        }
    }

    /// `Thread.join`: wait until the receiver's thread is dead
    fn thread_join(&mut self, thread: ThreadId) -> Result<ExecResult<'g>, Error> {
        let info = self.state.thread_mut(thread)?;
        if let ThreadState::Joining(_) = info.state {
            info.state = ThreadState::Runnable;
            return self.finish(thread, 1, None);
        }

        let object = self.receiver(thread, 0)?;
        let joined = match self.state.thread_for_object(object) {
            Some(joined) if joined != thread && self.state.thread(joined)?.is_alive() => joined,
            _ => return self.finish(thread, 1, None),
        };

        self.state.thread_mut(thread)?.state = ThreadState::Joining(joined);
        let cg = self
            .scheduler
            .sync
            .sets_join_cg(&self.state, thread, joined)?
            .ok_or(Error::MissingChoiceGenerator(ids::JOIN))?;
        Ok(ExecResult::Suspend(cg))
    }

    /// `Object.wait`: release the lock entirely, then wait for a `notify`
    ///
    /// Once notified and scheduled again, the thread re-acquires the lock as many times as it
    /// held it before.
    fn object_wait(&mut self, thread: ThreadId) -> Result<ExecResult<'g>, Error> {
        let lock = self.receiver(thread, 0)?;

        let info = self.state.thread(thread)?;
        if info.state == ThreadState::Notified {
            let count = info.saved_lock_count;
            self.lock(thread, lock, count)?;
            let info = self.state.thread_mut(thread)?;
            info.state = ThreadState::Runnable;
            info.lock_ref = None;
            info.saved_lock_count = 0;
            return self.finish(thread, 1, None);
        }

        if self.state.heap.get(lock)?.monitor.owner != Some(thread) {
            return Ok(self.illegal_monitor_state());
        }
        let count = self.release_all(thread, lock)?;
        let info = self.state.thread_mut(thread)?;
        info.state = ThreadState::Waiting;
        info.lock_ref = Some(lock);
        info.saved_lock_count = count;
        log::debug!("{} waits on {}", thread, lock);

        let cg = self
            .scheduler
            .sync
            .sets_wait_cg(&self.state, thread)?
            .ok_or(Error::MissingChoiceGenerator(ids::WAIT))?;
        Ok(ExecResult::Suspend(cg))
    }

    /// `Object.notify`: wake up one waiting thread
    ///
    /// With several waiters, which one wakes up is a (non-scheduling) choice of its own.
    fn object_notify(&mut self, thread: ThreadId) -> Result<ExecResult<'g>, Error> {
        let lock = self.receiver(thread, 0)?;
        if self.state.heap.get(lock)?.monitor.owner != Some(thread) {
            return Ok(self.illegal_monitor_state());
        }

        let notified = if self.is_resuming(thread)? {
            match self.current_choice(ids::NOTIFY_WAITER) {
                Ok(Choice::Thread(waiter)) => Some(waiter),
                _ => return self.finish(thread, 1, None),
            }
        } else {
            let waiters = self.state.threads_on_lock(lock, ThreadState::Waiting);
            if waiters.len() > 1 {
                let cg = ThreadChoiceFromSet::new(ids::NOTIFY_WAITER, waiters, false);
                return Ok(ExecResult::Suspend(Box::new(cg)));
            }
            waiters.first().copied()
        };

        if let Some(waiter) = notified {
            log::debug!("{} notifies {}", thread, waiter);
            self.state.thread_mut(waiter)?.state = ThreadState::Notified;
        }
        let cg = self
            .scheduler
            .sync
            .sets_notify_cg(&self.state, thread, notified.is_some())?;
        match cg {
            Some(cg) => Ok(ExecResult::Suspend(cg)),
            None => self.finish(thread, 1, None),
        }
    }

    /// `Object.notifyAll`: wake up every waiting thread
    fn object_notify_all(&mut self, thread: ThreadId) -> Result<ExecResult<'g>, Error> {
        let lock = self.receiver(thread, 0)?;
        if self.state.heap.get(lock)?.monitor.owner != Some(thread) {
            return Ok(self.illegal_monitor_state());
        }
        if self.is_resuming(thread)? {
            return self.finish(thread, 1, None);
        }

        let waiters = self.state.threads_on_lock(lock, ThreadState::Waiting);
        for waiter in &waiters {
            self.state.thread_mut(*waiter)?.state = ThreadState::Notified;
        }
        let cg = self
            .scheduler
            .sync
            .sets_notify_all_cg(&self.state, thread, !waiters.is_empty())?;
        match cg {
            Some(cg) => Ok(ExecResult::Suspend(cg)),
            None => self.finish(thread, 1, None),
        }
    }

    /// `Verify.getBoolean()` and `Verify.getBoolean(boolean falseFirst)`
    fn verify_get_boolean(
        &mut self,
        thread: ThreadId,
        has_flag: bool,
    ) -> Result<ExecResult<'g>, Error> {
        let popped = usize::from(has_flag);
        if self.is_resuming(thread)? {
            return match self.current_choice(ids::VERIFY_GET_BOOLEAN)? {
                Choice::Boolean(value) => {
                    self.finish(thread, popped, Some(Value::Int(i32::from(value))))
                }
                _ => Err(Error::MissingChoice(ids::VERIFY_GET_BOOLEAN)),
            };
        }

        let false_first = !has_flag || self.frame(thread)?.peek_int(0)? != 0;
        let cg = if false_first {
            BooleanChoiceGenerator::new(ids::VERIFY_GET_BOOLEAN)
        } else {
            BooleanChoiceGenerator::true_first(ids::VERIFY_GET_BOOLEAN)
        };
        Ok(ExecResult::Suspend(Box::new(cg)))
    }

    /// `Verify.getInt(int min, int max)`
    fn verify_get_int(&mut self, thread: ThreadId) -> Result<ExecResult<'g>, Error> {
        if self.is_resuming(thread)? {
            return match self.current_choice(ids::VERIFY_GET_INT)? {
                Choice::Int(value) => self.finish(thread, 2, Some(Value::Int(value))),
                _ => Err(Error::MissingChoice(ids::VERIFY_GET_INT)),
            };
        }

        let frame = self.frame(thread)?;
        let max = frame.peek_int(0)?;
        let min = frame.peek_int(1)?;
        if min > max {
            return Ok(ExecResult::Fault(Throw::with_message(
                self.java.classes.lang.illegal_argument_exception,
                format!("min {} is greater than max {}", min, max),
            )));
        }
        let cg = IntIntervalGenerator::new(ids::VERIFY_GET_INT, min, max, 1)?;
        Ok(ExecResult::Suspend(Box::new(cg)))
    }
}
