//! Executing single instructions
//!
//! [`Vm::execute`] runs the instruction at the program counter of the top frame of a thread. The
//! straight-line instructions (constants, locals, stack shuffling, arithmetic, branches) are
//! handled here. Everything else lives in a submodule per concern, each adding methods to [`Vm`]:
//!
//!   - `fields`, `arrays`: heap accesses, which may be scheduling points
//!   - `invoke`, `returns`: calls, dispatch, and returning from frames
//!   - `monitors`: `monitorenter`/`monitorexit` and the lock helpers
//!   - `class_init`: running static initializers on first use
//!   - `exceptions`: creating and unwinding guest exceptions
//!   - `intrinsics`: built-in implementations of native library methods
//!   - `invokedynamic`: lambdas and record methods

mod arrays;
mod class_init;
mod exceptions;
mod fields;
mod intrinsics;
mod invoke;
mod invokedynamic;
mod monitors;
mod operands;
mod returns;

use super::{ChoiceGenerator, Error, ObjRef, Slot, StackFrame, ThreadId, Value, Vm};
use crate::jvm::class_graph::{ClassId, ConstantData};
use crate::jvm::code::{BranchInstruction, Instruction};
use crate::jvm::{FieldType, Name, RefType, RenderDescriptor};
use crate::util::Width;
use operands::{binary_op, compare_floats, convert, shift, unary_op};

/// What happened when executing one instruction
#[derive(Debug)]
pub enum ExecResult<'g> {
    /// Keep going, with the top frame (which might be a new frame) at this program counter
    Continue(usize),

    /// The instruction registered a choice generator and will be re-executed
    Suspend(Box<dyn ChoiceGenerator>),

    /// The instruction threw a guest exception
    Fault(Throw<'g>),
}

/// Guest exception about to be thrown
#[derive(Clone, Debug, PartialEq)]
pub enum Throw<'g> {
    /// Exception the interpreter creates (eg. a `NullPointerException`)
    New {
        class: ClassId<'g>,
        message: Option<String>,
    },

    /// Exception object thrown by the program
    Existing(ObjRef),
}

impl<'g> Throw<'g> {
    pub fn new(class: ClassId<'g>) -> Throw<'g> {
        Throw::New {
            class,
            message: None,
        }
    }

    pub fn with_message(class: ClassId<'g>, message: impl Into<String>) -> Throw<'g> {
        Throw::New {
            class,
            message: Some(message.into()),
        }
    }
}

/// Java source name of a type (`java.lang.String`, `[I`, ...)
pub fn java_type_name<'g>(ty: &RefType<ClassId<'g>>) -> String {
    match ty {
        RefType::Object(class) => class.0.name.as_str().replace('/', "."),
        array => array.render().replace('/', "."),
    }
}

impl<'g> Vm<'g> {
    pub(super) fn frame(&self, thread: ThreadId) -> Result<&StackFrame<'g>, Error> {
        self.state.thread(thread)?.top_frame()
    }

    pub(super) fn frame_mut(&mut self, thread: ThreadId) -> Result<&mut StackFrame<'g>, Error> {
        self.state.thread_mut(thread)?.top_frame_mut()
    }

    pub(super) fn is_resuming(&self, thread: ThreadId) -> Result<bool, Error> {
        Ok(self.state.thread(thread)?.resuming)
    }

    /// Apply a change to the top frame and move on to the next instruction
    fn step(
        &mut self,
        thread: ThreadId,
        action: impl FnOnce(&mut StackFrame<'g>) -> Result<(), Error>,
    ) -> Result<ExecResult<'g>, Error> {
        let frame = self.frame_mut(thread)?;
        action(frame)?;
        Ok(ExecResult::Continue(frame.pc + 1))
    }

    fn push_constant(&mut self, thread: ThreadId, value: Value) -> Result<ExecResult<'g>, Error> {
        self.step(thread, |frame| {
            frame.push_value(value);
            Ok(())
        })
    }

    /// `OutOfMemoryError` for a failed allocation
    pub(super) fn out_of_memory(&self) -> ExecResult<'g> {
        ExecResult::Fault(Throw::new(self.java.classes.lang.out_of_memory_error))
    }

    pub(super) fn null_pointer(&self, message: impl Into<String>) -> ExecResult<'g> {
        ExecResult::Fault(Throw::with_message(
            self.java.classes.lang.null_pointer_exception,
            message,
        ))
    }

    /// Execute the instruction at the program counter of the thread's top frame
    pub(super) fn execute(&mut self, thread: ThreadId) -> Result<ExecResult<'g>, Error> {
        let instruction: &'g Instruction<'g> = self.frame(thread)?.instruction()?;

        use Instruction::*;
        match instruction {
            Nop => self.step(thread, |_| Ok(())),
            AConstNull => self.push_constant(thread, Value::Null),
            IConstM1 => self.push_constant(thread, Value::Int(-1)),
            IConst0 => self.push_constant(thread, Value::Int(0)),
            IConst1 => self.push_constant(thread, Value::Int(1)),
            IConst2 => self.push_constant(thread, Value::Int(2)),
            IConst3 => self.push_constant(thread, Value::Int(3)),
            IConst4 => self.push_constant(thread, Value::Int(4)),
            IConst5 => self.push_constant(thread, Value::Int(5)),
            LConst0 => self.push_constant(thread, Value::Long(0)),
            LConst1 => self.push_constant(thread, Value::Long(1)),
            FConst0 => self.push_constant(thread, Value::Float(0.0)),
            FConst1 => self.push_constant(thread, Value::Float(1.0)),
            FConst2 => self.push_constant(thread, Value::Float(2.0)),
            DConst0 => self.push_constant(thread, Value::Double(0.0)),
            DConst1 => self.push_constant(thread, Value::Double(1.0)),
            BiPush(b) => self.push_constant(thread, Value::Int(i32::from(*b))),
            SiPush(s) => self.push_constant(thread, Value::Int(i32::from(*s))),
            Ldc(constant) => self.execute_ldc(thread, constant),

            ILoad(idx) | LLoad(idx) | FLoad(idx) | DLoad(idx) | ALoad(idx) => {
                self.step(thread, |frame| {
                    let slot = frame.load(*idx)?;
                    frame.push(slot);
                    Ok(())
                })
            }
            IStore(idx) | LStore(idx) | FStore(idx) | DStore(idx) | AStore(idx) => {
                self.step(thread, |frame| {
                    let slot = frame.pop()?;
                    frame.store(*idx, slot)
                })
            }
            IInc(idx, by) => self.step(thread, |frame| frame.increment(*idx, i32::from(*by))),

            IALoad | LALoad | FALoad | DALoad | AALoad | BALoad | CALoad | SALoad => {
                self.execute_array_load(thread)
            }
            IAStore | LAStore | FAStore | DAStore | AAStore | BAStore | CAStore | SAStore => {
                self.execute_array_store(thread, matches!(instruction, AAStore))
            }

            Pop => self.step(thread, |frame| pop_words(frame, 1).map(drop)),
            Pop2 => self.step(thread, |frame| pop_words(frame, 2).map(drop)),
            Dup => self.step(thread, |frame| dup_words(frame, 1, 0)),
            DupX1 => self.step(thread, |frame| dup_words(frame, 1, 1)),
            DupX2 => self.step(thread, |frame| dup_words(frame, 1, 2)),
            Dup2 => self.step(thread, |frame| dup_words(frame, 2, 0)),
            Dup2X1 => self.step(thread, |frame| dup_words(frame, 2, 1)),
            Dup2X2 => self.step(thread, |frame| dup_words(frame, 2, 2)),
            Swap => self.step(thread, |frame| {
                let top = pop_words(frame, 1)?;
                let below = pop_words(frame, 1)?;
                top.into_iter().chain(below).for_each(|slot| frame.push(slot));
                Ok(())
            }),

            IAdd | LAdd | FAdd | DAdd | ISub | LSub | FSub | DSub | IMul | LMul | FMul | DMul
            | IDiv | LDiv | FDiv | DDiv | IRem | LRem | FRem | DRem | IAnd | LAnd | IOr | LOr
            | IXor | LXor => {
                let frame = self.frame_mut(thread)?;
                let rhs = frame.pop_value()?;
                let lhs = frame.pop_value()?;
                match binary_op(instruction, lhs, rhs)? {
                    Some(result) => self.push_constant(thread, result),
                    None => Ok(ExecResult::Fault(Throw::with_message(
                        self.java.classes.lang.arithmetic_exception,
                        "/ by zero",
                    ))),
                }
            }
            INeg | LNeg | FNeg | DNeg => self.step(thread, |frame| {
                let value = frame.pop_value()?;
                frame.push_value(unary_op(value)?);
                Ok(())
            }),
            ISh(shift_type) | LSh(shift_type) => self.step(thread, |frame| {
                let amount = frame.pop_int()?;
                let value = frame.pop_value()?;
                frame.push_value(shift(*shift_type, value, amount)?);
                Ok(())
            }),
            I2L | I2F | I2D | L2I | L2F | L2D | F2I | F2L | F2D | D2I | D2L | D2F | I2B | I2C
            | I2S => self.step(thread, |frame| {
                let value = frame.pop_value()?;
                frame.push_value(convert(instruction, value)?);
                Ok(())
            }),
            LCmp => self.step(thread, |frame| {
                let rhs = frame.pop_long()?;
                let lhs = frame.pop_long()?;
                frame.push_value(Value::Int(lhs.cmp(&rhs) as i32));
                Ok(())
            }),
            FCmp(mode) => self.step(thread, |frame| {
                let rhs = frame.pop_float()?;
                let lhs = frame.pop_float()?;
                frame.push_value(Value::Int(compare_floats(
                    *mode,
                    f64::from(lhs),
                    f64::from(rhs),
                )));
                Ok(())
            }),
            DCmp(mode) => self.step(thread, |frame| {
                let rhs = frame.pop_double()?;
                let lhs = frame.pop_double()?;
                frame.push_value(Value::Int(compare_floats(*mode, lhs, rhs)));
                Ok(())
            }),

            GetStatic(field) => self.execute_get_static(thread, *field),
            PutStatic(field) => self.execute_put_static(thread, *field),
            GetField(field) => self.execute_get_field(thread, *field),
            PutField(field) => self.execute_put_field(thread, *field),

            Invoke(invoke_type, method) => self.execute_invoke(thread, *invoke_type, *method),
            InvokeDynamic(call_site) => self.execute_invoke_dynamic(thread, *call_site),

            New(class) => self.execute_new(thread, *class),
            NewArray(base_type) => self.execute_new_array(thread, FieldType::Base(*base_type)),
            ANewArray(element_type) => {
                self.execute_new_array(thread, FieldType::Ref(*element_type))
            }
            MultiANewArray(array_type, dimensions) => {
                self.execute_multi_new_array(thread, *array_type, *dimensions)
            }
            ArrayLength => self.execute_array_length(thread),
            CheckCast(ty) => self.execute_check_cast(thread, *ty),
            InstanceOf(ty) => self.execute_instance_of(thread, *ty),
            AThrow => {
                let frame = self.frame_mut(thread)?;
                match frame.pop_reference()? {
                    Some(exception) => Ok(ExecResult::Fault(Throw::Existing(exception))),
                    None => Ok(self.null_pointer("Cannot throw exception because it is null")),
                }
            }

            MonitorEnter => self.execute_monitor_enter(thread),
            MonitorExit => self.execute_monitor_exit(thread),

            IReturn | LReturn | FReturn | DReturn | AReturn => self.execute_return(thread, true),
            Return => self.execute_return(thread, false),

            Branch(branch) => self.execute_branch(thread, branch),
        }
    }

    fn execute_branch(
        &mut self,
        thread: ThreadId,
        branch: &BranchInstruction<usize>,
    ) -> Result<ExecResult<'g>, Error> {
        let frame = self.frame_mut(thread)?;
        let fall_through = frame.pc + 1;

        use BranchInstruction::*;
        let target = match branch {
            If(op, target) => {
                let value = frame.pop_int()?;
                if op.holds(value, 0) {
                    *target
                } else {
                    fall_through
                }
            }
            IfICmp(op, target) => {
                let rhs = frame.pop_int()?;
                let lhs = frame.pop_int()?;
                if op.holds(lhs, rhs) {
                    *target
                } else {
                    fall_through
                }
            }
            IfACmp(op, target) => {
                let rhs = frame.pop_reference()?;
                let lhs = frame.pop_reference()?;
                if op.holds(lhs == rhs) {
                    *target
                } else {
                    fall_through
                }
            }
            IfNull(op, target) => {
                let value = frame.pop_reference()?;
                if op.holds(value.is_none()) {
                    *target
                } else {
                    fall_through
                }
            }
            Goto(target) => *target,
            TableSwitch {
                default,
                low,
                targets,
            } => {
                let key = i64::from(frame.pop_int()?);
                usize::try_from(key - i64::from(*low))
                    .ok()
                    .and_then(|idx| targets.get(idx))
                    .copied()
                    .unwrap_or(*default)
            }
            LookupSwitch { default, targets } => {
                let key = frame.pop_int()?;
                match targets.binary_search_by_key(&key, |(k, _)| *k) {
                    Ok(idx) => targets[idx].1,
                    Err(_) => *default,
                }
            }
        };
        Ok(ExecResult::Continue(target))
    }

    fn execute_ldc(
        &mut self,
        thread: ThreadId,
        constant: &'g ConstantData<'g>,
    ) -> Result<ExecResult<'g>, Error> {
        let value = match constant {
            ConstantData::Integer(i) => Value::Int(*i),
            ConstantData::Long(l) => Value::Long(*l),
            ConstantData::Float(f) => Value::Float(*f),
            ConstantData::Double(d) => Value::Double(*d),
            ConstantData::String(string) => {
                let string_class = self.java.classes.lang.string;
                match self.state.heap.intern_string(string_class, string, thread) {
                    Some(reference) => Value::Ref(reference),
                    None => return Ok(self.out_of_memory()),
                }
            }
            ConstantData::Class(RefType::Object(class)) => {
                let class_class = self.java.classes.lang.class;
                let reference = self
                    .state
                    .heap
                    .class_object(*class, class_class, thread)
                    .ok_or(Error::HeapOverflow)?;
                Value::Ref(reference)
            }
            other => return Err(Error::UnsupportedConstant(format!("{:?}", other))),
        };
        self.push_constant(thread, value)
    }

    fn execute_new(
        &mut self,
        thread: ThreadId,
        class: ClassId<'g>,
    ) -> Result<ExecResult<'g>, Error> {
        if let Some(result) = self.ensure_initialized(thread, class)? {
            return Ok(result);
        }
        match self.state.heap.new_object(class, thread, false) {
            Some(object) => self.push_constant(thread, Value::Ref(object)),
            None => Ok(self.out_of_memory()),
        }
    }
}

/// Pop exactly `words` words off the stack, bottom-most entry first
///
/// Fails if that would split a `long` or `double` in half.
fn pop_words(frame: &mut StackFrame, words: usize) -> Result<Vec<Slot>, Error> {
    let mut popped = vec![];
    let mut total = 0;
    while total < words {
        let slot = frame.pop()?;
        total += slot.width();
        popped.push(slot);
    }
    if total != words {
        let found = popped.last().map_or(Value::Null, |slot| slot.value);
        return Err(Error::TypeMismatch {
            expected: "category 1 value",
            found,
        });
    }
    popped.reverse();
    Ok(popped)
}

/// Duplicate the top `words` words, inserting the copy `skip` words further down
fn dup_words(frame: &mut StackFrame, words: usize, skip: usize) -> Result<(), Error> {
    let top = pop_words(frame, words)?;
    let below = pop_words(frame, skip)?;
    for slot in top.clone().into_iter().chain(below).chain(top) {
        frame.push(slot);
    }
    Ok(())
}
