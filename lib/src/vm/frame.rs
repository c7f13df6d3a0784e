use super::{Error, ObjRef, Slot, Value};
use crate::jvm::class_graph::{ClassId, MethodId};
use crate::jvm::code::{Code, Instruction};
use crate::util::{OffsetVec, Width};

/// Why a frame was pushed
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameKind<'g> {
    /// Regular method call
    Normal,

    /// Direct call to `<clinit>` of the class, made on behalf of the instruction in the caller
    /// frame which needed the class to be initialized (that instruction re-executes after the
    /// initializer returns)
    ClassInit(ClassId<'g>),
}

/// Activation record of one method call
#[derive(Clone, Debug)]
pub struct StackFrame<'g> {
    pub method: MethodId<'g>,
    pub code: &'g Code<'g>,

    /// Index of the current instruction
    pub pc: usize,

    /// Local variables (the second slot of a `long` or `double` is always `None`)
    locals: Vec<Option<Slot>>,

    operands: OffsetVec<Slot>,

    pub kind: FrameKind<'g>,

    /// Lock taken when entering a `synchronized` method
    pub sync_lock: Option<ObjRef>,

    /// Set when a reference store already happened and the instruction is being re-executed
    /// only to get past an exposure choice point
    exposure_processed: bool,

    /// Number of operand entries to remove from the caller frame on return
    pub caller_args: usize,
}

impl<'g> StackFrame<'g> {
    pub fn new(method: MethodId<'g>, code: &'g Code<'g>, kind: FrameKind<'g>) -> StackFrame<'g> {
        StackFrame {
            method,
            code,
            pc: 0,
            locals: vec![None; code.max_locals as usize],
            operands: OffsetVec::new(),
            kind,
            sync_lock: None,
            exposure_processed: false,
            caller_args: 0,
        }
    }

    /// Instruction at the program counter
    pub fn instruction(&self) -> Result<&'g Instruction<'g>, Error> {
        self.code
            .get(self.pc)
            .ok_or(Error::InvalidProgramCounter(self.pc))
    }

    /// Lay out arguments into the first local variables
    pub fn set_arguments(&mut self, arguments: Vec<Slot>) -> Result<(), Error> {
        let mut idx: u16 = 0;
        for argument in arguments {
            let width = argument.width() as u16;
            self.store(idx, argument)?;
            idx += width;
        }
        Ok(())
    }

    pub fn push(&mut self, slot: Slot) {
        self.operands.push(slot);
    }

    pub fn push_value(&mut self, value: Value) {
        self.operands.push(Slot::new(value));
    }

    pub fn pop(&mut self) -> Result<Slot, Error> {
        self.operands.pop().ok_or(Error::EmptyOperandStack)
    }

    pub fn pop_value(&mut self) -> Result<Value, Error> {
        self.pop().map(|slot| slot.value)
    }

    pub fn pop_int(&mut self) -> Result<i32, Error> {
        self.pop_value()?.as_int()
    }

    pub fn pop_long(&mut self) -> Result<i64, Error> {
        self.pop_value()?.as_long()
    }

    pub fn pop_float(&mut self) -> Result<f32, Error> {
        self.pop_value()?.as_float()
    }

    pub fn pop_double(&mut self) -> Result<f64, Error> {
        self.pop_value()?.as_double()
    }

    pub fn pop_reference(&mut self) -> Result<Option<ObjRef>, Error> {
        self.pop_value()?.as_reference()
    }

    /// Entry `depth` entries from the top (`peek(0)` is the top of the stack)
    pub fn peek(&self, depth: usize) -> Result<&Slot, Error> {
        self.operands.peek(depth).ok_or(Error::EmptyOperandStack)
    }

    pub fn peek_mut(&mut self, depth: usize) -> Result<&mut Slot, Error> {
        self.operands.peek_mut(depth).ok_or(Error::EmptyOperandStack)
    }

    pub fn peek_int(&self, depth: usize) -> Result<i32, Error> {
        self.peek(depth)?.value.as_int()
    }

    pub fn peek_reference(&self, depth: usize) -> Result<Option<ObjRef>, Error> {
        self.peek(depth)?.value.as_reference()
    }

    /// Entry starting `words` words below the top of the stack (used to find receivers)
    pub fn peek_words(&self, words: usize) -> Result<&Slot, Error> {
        self.operands
            .peek_words(words)
            .ok_or(Error::EmptyOperandStack)
    }

    /// Copies of the top `count` entries, bottom-most first (the stack is left untouched)
    pub fn top_entries(&self, count: usize) -> Result<Vec<Slot>, Error> {
        (0..count)
            .rev()
            .map(|depth| self.peek(depth).cloned())
            .collect()
    }

    /// Remove the top `count` entries
    pub fn drop_entries(&mut self, count: usize) -> Result<Vec<Slot>, Error> {
        self.operands
            .drain_top(count)
            .ok_or(Error::EmptyOperandStack)
    }

    pub fn clear_operands(&mut self) {
        self.operands.clear();
    }

    /// Number of entries on the operand stack
    pub fn operand_len(&self) -> usize {
        self.operands.len()
    }

    /// Size of the operand stack in words
    pub fn operand_depth(&self) -> usize {
        self.operands.offset_len().0
    }

    pub fn operands(&self) -> impl DoubleEndedIterator<Item = &Slot> {
        self.operands.iter()
    }

    pub fn load(&self, idx: u16) -> Result<Slot, Error> {
        self.locals
            .get(idx as usize)
            .and_then(|slot| slot.clone())
            .ok_or(Error::InvalidLocal(idx))
    }

    /// Store into a local
    ///
    /// A wide value clobbers the next slot too, and a value stored into the second half of a wide
    /// value invalidates that wide value.
    pub fn store(&mut self, idx: u16, slot: Slot) -> Result<(), Error> {
        let idx_usize = idx as usize;
        let width = slot.width();
        if idx_usize + width > self.locals.len() {
            return Err(Error::InvalidLocal(idx));
        }
        if idx_usize > 0 {
            if let Some(previous) = &self.locals[idx_usize - 1] {
                if previous.width() == 2 {
                    self.locals[idx_usize - 1] = None;
                }
            }
        }
        self.locals[idx_usize] = Some(slot);
        if width == 2 {
            self.locals[idx_usize + 1] = None;
        }
        Ok(())
    }

    /// Increment an `int` local in place (keeping its attribute)
    pub fn increment(&mut self, idx: u16, by: i32) -> Result<(), Error> {
        let local = self
            .locals
            .get_mut(idx as usize)
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidLocal(idx))?;
        local.value = Value::Int(local.value.as_int()?.wrapping_add(by));
        Ok(())
    }

    pub fn mark_exposure_processed(&mut self) {
        self.exposure_processed = true;
    }

    /// Check and reset the exposure marker
    pub fn take_exposure_processed(&mut self) -> bool {
        std::mem::take(&mut self.exposure_processed)
    }
}
