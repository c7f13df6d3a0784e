use super::{ObjRef, ThreadId, Value};
use crate::jvm;

/// Host-level failures of the interpreter
///
/// These are never visible to the program being checked: guest exceptions are objects on the heap
/// and get unwound through handler tables. An `Error` means the model checking run itself cannot
/// continue (malformed code, a broken invariant in the interpreter, a missing class, ...).
#[derive(Debug)]
pub enum Error {
    Jvm(jvm::Error),

    /// Tried to pop or peek past the bottom of the operand stack
    EmptyOperandStack,

    /// Operand stack or local variable held a value of the wrong kind
    TypeMismatch {
        expected: &'static str,
        found: Value,
    },

    /// Thread has no frame where one is needed
    MissingFrame(ThreadId),

    UnknownThread(ThreadId),

    /// Reference does not point at a heap element
    UnknownReference(ObjRef),

    /// Local variable slot is out of range or was never written
    InvalidLocal(u16),

    /// Program counter does not point at an instruction
    InvalidProgramCounter(usize),

    /// A method which should have a body doesn't
    MissingCode(String),

    /// A mandatory choice generator (eg. for a blocked thread) was not created
    MissingChoiceGenerator(&'static str),

    /// A re-executed instruction could not find the choice it registered
    MissingChoice(&'static str),

    /// Heap element is not of the expected kind (eg. an array where an object was expected)
    UnexpectedElement {
        reference: ObjRef,
        expected: &'static str,
    },

    /// Instruction handed to a helper which does not implement it (indicates a bug)
    UnexpectedInstruction(String),

    /// Constant cannot be pushed by `ldc`
    UnsupportedConstant(String),

    /// Integer interval choice does not describe a finite, non-empty set
    BadChoiceRange { min: i32, max: i32, delta: i32 },

    /// A native method without a built-in implementation was called
    UnsupportedNative(String),

    /// The interpreter itself could not allocate (even forced allocations failed)
    HeapOverflow,

    /// Method cannot be used to start the program (eg. it is not static)
    InvalidEntryPoint(String),
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::Jvm(err)
    }
}
