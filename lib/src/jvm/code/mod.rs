//! Bytecode representation, construction, and decoding
//!
//! ### Structure
//!
//! A method body is a flat sequence of instructions indexed by program counter, together with an
//! exception table. We split up the [list of bytecode instructions][0] into two groups:
//!
//!   - [`Instruction`] for everything, including straight-line instructions
//!   - [`BranchInstruction`] for instructions that may jump, parametrized over the label type
//!
//! ### Getting code
//!
//! Method bodies come either from [`CodeBuilder`], which provides an interface for writing code
//! from top to bottom with symbolic labels, or from [`decode_method_body`], which reads the raw
//! bytes of a `Code` attribute and resolves constant pool indices through a [`ConstantPool`].
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod code;
mod code_builder;
mod factory;
mod instructions;
mod label;

pub use code::*;
pub use code_builder::*;
pub use factory::*;
pub use instructions::*;
pub use label::*;
