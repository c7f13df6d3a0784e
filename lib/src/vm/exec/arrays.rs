use super::{java_type_name, ExecResult, Throw};
use crate::jvm::class_graph::{Assignable, ClassId};
use crate::jvm::{FieldType, RefType};
use crate::vm::{ChoiceGenerator, Error, ObjRef, Slot, ThreadId, Value, Vm};

impl<'g> Vm<'g> {
    fn shared_array_cg(
        &mut self,
        thread: ThreadId,
        array: ObjRef,
        index: usize,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        let policy = &self.scheduler.sharedness;
        if !policy.can_have_shared_array_cg(&self.state, thread, array, index)? {
            return Ok(None);
        }
        policy.update_array_sharedness(&mut self.state, thread, array, index)?;
        policy.sets_shared_array_cg(&self.state, thread, array, index)
    }

    /// Null and bounds checks common to loads and stores
    fn check_array_access(
        &self,
        array: Option<ObjRef>,
        index: i32,
        loading: bool,
    ) -> Result<Result<(ObjRef, usize), ExecResult<'g>>, Error> {
        let array = match array {
            Some(array) => array,
            None => {
                let message = if loading {
                    "Cannot load from array because it is null"
                } else {
                    "Cannot store to array because it is null"
                };
                return Ok(Err(self.null_pointer(message)));
            }
        };
        let length = self.state.heap.get(array)?.array_length(array)?;
        match usize::try_from(index) {
            Ok(idx) if idx < length => Ok(Ok((array, idx))),
            _ => Ok(Err(ExecResult::Fault(Throw::with_message(
                self.java.classes.lang.array_index_out_of_bounds_exception,
                format!("Index {} out of bounds for length {}", index, length),
            )))),
        }
    }

    pub(super) fn execute_array_load(&mut self, thread: ThreadId) -> Result<ExecResult<'g>, Error> {
        let frame = self.frame(thread)?;
        let index = frame.peek_int(0)?;
        let array = frame.peek_reference(1)?;
        let (array, idx) = match self.check_array_access(array, index, true)? {
            Ok(checked) => checked,
            Err(result) => return Ok(result),
        };

        if let Some(cg) = self.shared_array_cg(thread, array, idx)? {
            return Ok(ExecResult::Suspend(cg));
        }

        let slot = self.state.heap.get(array)?.array_elements(array)?[idx].clone();
        let frame = self.frame_mut(thread)?;
        frame.drop_entries(2)?;
        frame.push(slot);
        Ok(ExecResult::Continue(frame.pc + 1))
    }

    pub(super) fn execute_array_store(
        &mut self,
        thread: ThreadId,
        is_reference: bool,
    ) -> Result<ExecResult<'g>, Error> {
        let frame = self.frame(thread)?;
        let value = frame.peek(0)?.clone();
        let index = frame.peek_int(1)?;
        let array = frame.peek_reference(2)?;
        let (array, idx) = match self.check_array_access(array, index, false)? {
            Ok(checked) => checked,
            Err(result) => return Ok(result),
        };

        let array_type = self.state.heap.get(array)?.ty;
        let component = array_type.component_type().ok_or(Error::UnexpectedElement {
            reference: array,
            expected: "array",
        })?;

        // Covariant arrays: the stored object must fit the runtime component type
        if let (Value::Ref(stored), FieldType::Ref(component_ref)) = (value.value, component) {
            let stored_type = self.state.heap.get(stored)?.ty;
            if !stored_type.is_assignable(&component_ref) {
                return Ok(ExecResult::Fault(Throw::with_message(
                    self.java.classes.lang.array_store_exception,
                    java_type_name(&stored_type),
                )));
            }
        }

        if !self.frame_mut(thread)?.take_exposure_processed() {
            if let Some(cg) = self.shared_array_cg(thread, array, idx)? {
                return Ok(ExecResult::Suspend(cg));
            }

            let stored = Slot::with_attr(value.value.narrow_to(&component), value.attr);
            self.state.heap.get_mut(array)?.array_elements_mut(array)?[idx] = stored;

            if let (true, Value::Ref(exposed)) = (is_reference, value.value) {
                let cg = self.scheduler.sharedness.sets_shared_array_exposure_cg(
                    &mut self.state,
                    thread,
                    array,
                    exposed,
                )?;
                if let Some(cg) = cg {
                    self.frame_mut(thread)?.mark_exposure_processed();
                    return Ok(ExecResult::Suspend(cg));
                }
            }
        }

        let frame = self.frame_mut(thread)?;
        frame.drop_entries(3)?;
        Ok(ExecResult::Continue(frame.pc + 1))
    }

    fn negative_array_size(&self, count: i32) -> ExecResult<'g> {
        ExecResult::Fault(Throw::with_message(
            self.java.classes.lang.negative_array_size_exception,
            count.to_string(),
        ))
    }

    pub(super) fn execute_new_array(
        &mut self,
        thread: ThreadId,
        element_type: FieldType<ClassId<'g>>,
    ) -> Result<ExecResult<'g>, Error> {
        let count = self.frame(thread)?.peek_int(0)?;
        let length = match usize::try_from(count) {
            Ok(length) => length,
            Err(_) => return Ok(self.negative_array_size(count)),
        };
        match self.state.heap.new_array(element_type, length, thread) {
            Some(array) => {
                let frame = self.frame_mut(thread)?;
                frame.pop()?;
                frame.push_value(Value::Ref(array));
                Ok(ExecResult::Continue(frame.pc + 1))
            }
            None => Ok(self.out_of_memory()),
        }
    }

    pub(super) fn execute_multi_new_array(
        &mut self,
        thread: ThreadId,
        array_type: RefType<ClassId<'g>>,
        dimensions: u8,
    ) -> Result<ExecResult<'g>, Error> {
        let counts: Vec<i32> = self
            .frame(thread)?
            .top_entries(usize::from(dimensions))?
            .into_iter()
            .map(|slot| slot.value.as_int())
            .collect::<Result<_, _>>()?;
        let mut lengths = vec![];
        for count in counts {
            match usize::try_from(count) {
                Ok(length) => lengths.push(length),
                Err(_) => return Ok(self.negative_array_size(count)),
            }
        }

        match self.allocate_multi_array(thread, array_type, &lengths)? {
            Some(array) => {
                let frame = self.frame_mut(thread)?;
                frame.drop_entries(usize::from(dimensions))?;
                frame.push_value(Value::Ref(array));
                Ok(ExecResult::Continue(frame.pc + 1))
            }
            None => Ok(self.out_of_memory()),
        }
    }

    /// Allocate nested arrays, the outermost one having length `lengths[0]`
    fn allocate_multi_array(
        &mut self,
        thread: ThreadId,
        array_type: RefType<ClassId<'g>>,
        lengths: &[usize],
    ) -> Result<Option<ObjRef>, Error> {
        let component = array_type
            .component_type()
            .ok_or_else(|| Error::UnexpectedInstruction(format!("{:?}", array_type)))?;
        let (length, inner_lengths) = match lengths.split_first() {
            Some(split) => split,
            None => return Ok(None),
        };
        let array = match self.state.heap.new_array(component, *length, thread) {
            Some(array) => array,
            None => return Ok(None),
        };

        if let (FieldType::Ref(inner_type), false) = (component, inner_lengths.is_empty()) {
            for idx in 0..*length {
                let inner = match self.allocate_multi_array(thread, inner_type, inner_lengths)? {
                    Some(inner) => inner,
                    None => return Ok(None),
                };
                self.state.heap.get_mut(array)?.array_elements_mut(array)?[idx] =
                    Slot::new(Value::Ref(inner));
            }
        }
        Ok(Some(array))
    }

    pub(super) fn execute_array_length(
        &mut self,
        thread: ThreadId,
    ) -> Result<ExecResult<'g>, Error> {
        let array = match self.frame(thread)?.peek_reference(0)? {
            Some(array) => array,
            None => {
                return Ok(self.null_pointer("Cannot read the array length because it is null"))
            }
        };
        let length = self.state.heap.get(array)?.array_length(array)?;
        let frame = self.frame_mut(thread)?;
        frame.pop()?;
        frame.push_value(Value::Int(length as i32));
        Ok(ExecResult::Continue(frame.pc + 1))
    }

    pub(super) fn execute_check_cast(
        &mut self,
        thread: ThreadId,
        target: RefType<ClassId<'g>>,
    ) -> Result<ExecResult<'g>, Error> {
        let frame = self.frame(thread)?;
        let pc = frame.pc;
        if let Some(object) = frame.peek_reference(0)? {
            let object_type = self.state.heap.get(object)?.ty;
            if !object_type.is_assignable(&target) {
                return Ok(ExecResult::Fault(Throw::with_message(
                    self.java.classes.lang.class_cast_exception,
                    format!(
                        "class {} cannot be cast to class {}",
                        java_type_name(&object_type),
                        java_type_name(&target)
                    ),
                )));
            }
        }
        Ok(ExecResult::Continue(pc + 1))
    }

    pub(super) fn execute_instance_of(
        &mut self,
        thread: ThreadId,
        target: RefType<ClassId<'g>>,
    ) -> Result<ExecResult<'g>, Error> {
        let is_instance = match self.frame(thread)?.peek_reference(0)? {
            Some(object) => self.state.heap.get(object)?.ty.is_assignable(&target),
            None => false,
        };
        let frame = self.frame_mut(thread)?;
        frame.pop()?;
        frame.push_value(Value::Int(i32::from(is_instance)));
        Ok(ExecResult::Continue(frame.pc + 1))
    }
}
