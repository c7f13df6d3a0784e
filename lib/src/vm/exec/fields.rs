use super::{ExecResult, Throw};
use crate::jvm::class_graph::FieldId;
use crate::vm::{ChoiceGenerator, Error, ObjRef, Slot, ThreadId, Value, Vm};

impl<'g> Vm<'g> {
    /// Scheduling point for reading or writing a field of a possibly shared object or class
    fn shared_field_cg(
        &mut self,
        thread: ThreadId,
        owner: ObjRef,
        field: FieldId<'g>,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        let policy = &self.scheduler.sharedness;
        if field.0.is_static() {
            if !policy.can_have_shared_class_cg(&self.state, thread, owner, field)? {
                return Ok(None);
            }
            policy.update_class_sharedness(&mut self.state, thread, owner, field)?;
            policy.sets_shared_class_cg(&self.state, thread, owner, field)
        } else {
            if !policy.can_have_shared_object_cg(&self.state, thread, owner, field)? {
                return Ok(None);
            }
            policy.update_object_sharedness(&mut self.state, thread, owner, field)?;
            policy.sets_shared_object_cg(&self.state, thread, owner, field)
        }
    }

    fn no_such_field(&self, field: FieldId<'g>) -> ExecResult<'g> {
        ExecResult::Fault(Throw::with_message(
            self.java.classes.lang.no_such_field_error,
            field.0.name.to_string(),
        ))
    }

    /// Read a field out of `owner` onto the stack, replacing the top `popped` entries
    fn read_field(
        &mut self,
        thread: ThreadId,
        owner: ObjRef,
        field: FieldId<'g>,
        popped: usize,
    ) -> Result<ExecResult<'g>, Error> {
        let slot = match self.state.heap.get(owner)?.field(field) {
            Some(slot) => slot.clone(),
            None => return Ok(self.no_such_field(field)),
        };
        if let Some(cg) = self.shared_field_cg(thread, owner, field)? {
            return Ok(ExecResult::Suspend(cg));
        }
        let frame = self.frame_mut(thread)?;
        frame.drop_entries(popped)?;
        frame.push(slot);
        Ok(ExecResult::Continue(frame.pc + 1))
    }

    /// Write the value on top of the stack into a field of `owner`, then pop `popped` entries
    ///
    /// Storing a reference may expose the stored object. That is a second scheduling point, after
    /// the store has happened, so the frame remembers that the store is done and the re-executed
    /// instruction only pops its operands.
    fn write_field(
        &mut self,
        thread: ThreadId,
        owner: ObjRef,
        field: FieldId<'g>,
        popped: usize,
    ) -> Result<ExecResult<'g>, Error> {
        if self.state.heap.get(owner)?.field(field).is_none() {
            return Ok(self.no_such_field(field));
        }

        if !self.frame_mut(thread)?.take_exposure_processed() {
            if let Some(cg) = self.shared_field_cg(thread, owner, field)? {
                return Ok(ExecResult::Suspend(cg));
            }

            let value = self.frame(thread)?.peek(0)?.clone();
            let stored = Slot::with_attr(value.value.narrow_to(&field.0.descriptor), value.attr);
            self.state.heap.get_mut(owner)?.set_field(field, stored);

            if let Value::Ref(exposed) = value.value {
                let policy = &self.scheduler.sharedness;
                let cg = if field.0.is_static() {
                    policy.sets_shared_class_exposure_cg(
                        &mut self.state,
                        thread,
                        owner,
                        field,
                        exposed,
                    )?
                } else {
                    policy.sets_shared_object_exposure_cg(
                        &mut self.state,
                        thread,
                        owner,
                        field,
                        exposed,
                    )?
                };
                if let Some(cg) = cg {
                    self.frame_mut(thread)?.mark_exposure_processed();
                    return Ok(ExecResult::Suspend(cg));
                }
            }
        }

        let frame = self.frame_mut(thread)?;
        frame.drop_entries(popped)?;
        Ok(ExecResult::Continue(frame.pc + 1))
    }

    pub(super) fn execute_get_field(
        &mut self,
        thread: ThreadId,
        field: FieldId<'g>,
    ) -> Result<ExecResult<'g>, Error> {
        match self.frame(thread)?.peek_reference(0)? {
            Some(object) => self.read_field(thread, object, field, 1),
            None => Ok(self.null_pointer(format!(
                "Cannot read field \"{}\" because value is null",
                field.0.name
            ))),
        }
    }

    pub(super) fn execute_put_field(
        &mut self,
        thread: ThreadId,
        field: FieldId<'g>,
    ) -> Result<ExecResult<'g>, Error> {
        match self.frame(thread)?.peek_reference(1)? {
            Some(object) => self.write_field(thread, object, field, 2),
            None => Ok(self.null_pointer(format!(
                "Cannot assign field \"{}\" because value is null",
                field.0.name
            ))),
        }
    }

    /// Class object holding a static field, once its class is initialized
    fn static_owner(
        &mut self,
        thread: ThreadId,
        field: FieldId<'g>,
    ) -> Result<Result<ObjRef, ExecResult<'g>>, Error> {
        let class = field.0.class;
        if let Some(result) = self.ensure_initialized(thread, class)? {
            return Ok(Err(result));
        }
        let class_class = self.java.classes.lang.class;
        self.state
            .heap
            .class_object(class, class_class, thread)
            .map(Ok)
            .ok_or(Error::HeapOverflow)
    }

    pub(super) fn execute_get_static(
        &mut self,
        thread: ThreadId,
        field: FieldId<'g>,
    ) -> Result<ExecResult<'g>, Error> {
        match self.static_owner(thread, field)? {
            Ok(class_object) => self.read_field(thread, class_object, field, 0),
            Err(result) => Ok(result),
        }
    }

    pub(super) fn execute_put_static(
        &mut self,
        thread: ThreadId,
        field: FieldId<'g>,
    ) -> Result<ExecResult<'g>, Error> {
        match self.static_owner(thread, field)? {
            Ok(class_object) => self.write_field(thread, class_object, field, 1),
            Err(result) => Ok(result),
        }
    }
}
