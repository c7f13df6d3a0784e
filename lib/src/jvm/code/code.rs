use crate::jvm::class_graph::ClassId;
use crate::jvm::code::Instruction;
use std::fmt;

/// Semantic representation of a method body
///
/// Instructions are addressed by their index in `instructions` (this is also the program counter
/// the interpreter uses), so jump targets and exception ranges are all instruction indices.
pub struct Code<'g> {
    /// Maximum size of locals through the method (in words)
    pub max_locals: u16,

    /// Instructions in the method
    pub instructions: Vec<Instruction<'g>>,

    /// Exception handlers, in priority order
    pub exception_table: Vec<ExceptionHandler<'g>>,
}

/// Entry in the exception table
#[derive(Clone, PartialEq, Eq)]
pub struct ExceptionHandler<'g, Lbl = usize> {
    /// Start of the protected range (inclusive)
    pub start: Lbl,

    /// End of the protected range (exclusive)
    pub end: Lbl,

    /// Where to jump when the handler catches something
    pub handler: Lbl,

    /// Class of exceptions caught (`None` catches everything, like `finally`)
    pub catch_type: Option<ClassId<'g>>,
}

impl<'g, Lbl> ExceptionHandler<'g, Lbl> {
    pub fn map_labels<Lbl2, E>(
        &self,
        mut map_label: impl FnMut(&Lbl) -> Result<Lbl2, E>,
    ) -> Result<ExceptionHandler<'g, Lbl2>, E> {
        Ok(ExceptionHandler {
            start: map_label(&self.start)?,
            end: map_label(&self.end)?,
            handler: map_label(&self.handler)?,
            catch_type: self.catch_type,
        })
    }
}

impl<'g> ExceptionHandler<'g> {
    /// Does the protected range include the given instruction?
    pub fn covers(&self, pc: usize) -> bool {
        self.start <= pc && pc < self.end
    }
}

impl<'g, Lbl: fmt::Debug> fmt::Debug for ExceptionHandler<'g, Lbl> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let catch_type = self
            .catch_type
            .map_or_else(|| String::from("any"), |class| format!("{:?}", class));
        f.write_fmt(format_args!(
            "[{:?}, {:?}) -> {:?} ({})",
            self.start, self.end, self.handler, catch_type
        ))
    }
}

impl<'g> Code<'g> {
    /// Get the instruction at a program counter
    pub fn get(&self, pc: usize) -> Option<&Instruction<'g>> {
        self.instructions.get(pc)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl<'g> fmt::Debug for Code<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "max_locals = {}", self.max_locals)?;
        for (pc, insn) in self.instructions.iter().enumerate() {
            writeln!(f, "{:>4}: {:?}", pc, insn)?;
        }
        for handler in &self.exception_table {
            writeln!(f, "handler {:?}", handler)?;
        }
        Ok(())
    }
}
