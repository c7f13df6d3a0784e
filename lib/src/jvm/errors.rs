use super::code::SynLabel;

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// A descriptor string could not be parsed
    BadDescriptor(String),

    /// A class or member name is not valid
    BadName(String),

    /// Raw bytecode used an opcode which is not part of the instruction set
    UnknownOpcode { opcode: u8, offset: usize },

    /// Raw bytecode ended in the middle of an instruction
    TruncatedCode { offset: usize },

    /// A jump or handler does not land on the start of an instruction
    InvalidJumpTarget { offset: usize, target: i64 },

    /// Operand of an instruction is out of range (eg. `newarray` with a bad type code)
    InvalidOperand { offset: usize, opcode: u8 },

    /// Constant pool index does not refer to the right kind of constant
    MissingConstant(u16),

    MethodCodeNotFinished {
        unplaced_labels: Vec<SynLabel>,
    },

    /// Two instructions claim to have the same label (indicates a bug)
    DuplicateLabel(SynLabel),

    /// Method already has a body
    CodeAlreadySet(String),

    MissingClass(String),
    MissingMember(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
