use crate::jvm::class_graph::{ClassId, MethodId};
use crate::jvm::code::{
    BranchInstruction, Code, ExceptionHandler, Instruction, LabelSupply, SynLabel,
};
use crate::jvm::Error;
use std::collections::HashMap;
use std::convert::Infallible;

/// This provides a slightly simplified interface for building up method bodies by hand. It does
/// internal bookkeeping to track labels and the size of the local variables.
///
/// Jumps refer to [`SynLabel`]s, which can be placed before or after the instructions jumping to
/// them. When the builder is finished, every label is resolved to the index of the instruction
/// placed right after it.
///
/// ```
/// use jvmcheck::jvm::class_graph::*;
/// use jvmcheck::jvm::code::{CodeBuilder, BranchInstruction, OrdComparison, Instruction::*};
/// use jvmcheck::jvm::*;
///
/// # fn build() -> Result<(), Error> {
/// let arenas = ClassGraphArenas::new();
/// let class_graph = ClassGraph::new(&arenas);
/// let java = class_graph.insert_java_library_types()?;
///
/// // static int abs(int x)
/// let class = class_graph.add_class(ClassData::new(
///     BinaryName::from_string(String::from("demo/Numbers")).unwrap(),
///     java.classes.lang.object,
///     ClassAccessFlags::PUBLIC,
/// ));
/// let abs = class_graph.add_method(MethodData::new(
///     class,
///     UnqualifiedName::from_string(String::from("abs")).unwrap(),
///     MethodDescriptor {
///         parameters: vec![FieldType::int()],
///         return_type: Some(FieldType::int()),
///     },
///     MethodAccessFlags::STATIC,
/// ));
///
/// let mut code = CodeBuilder::new(abs);
/// let positive = code.fresh_label();
/// code.push_instruction(ILoad(0))?;
/// code.push_branch_instruction(BranchInstruction::If(OrdComparison::GE, positive))?;
/// code.push_instruction(ILoad(0))?;
/// code.push_instruction(INeg)?;
/// code.push_instruction(IReturn)?;
/// code.place_label(positive)?;
/// code.push_instruction(ILoad(0))?;
/// code.push_instruction(IReturn)?;
/// code.install()?;
///
/// assert_eq!(abs.body().map(|code| code.instructions.len()), Some(6));
/// # Ok(())
/// # }
/// # build().unwrap();
/// ```
pub struct CodeBuilder<'g> {
    /// Instructions so far (branches still refer to labels)
    instructions: Vec<PendingInstruction<'g>>,

    /// Labels which have been placed, and the index of the instruction they point at
    placed_labels: HashMap<SynLabel, usize>,

    /// Exception handlers, in priority order
    exception_table: Vec<ExceptionHandler<'g, SynLabel>>,

    labels: LabelSupply,

    /// Size of the locals used so far (in words)
    max_locals: u16,

    /// Reference to method data in the class graph
    pub method: MethodId<'g>,
}

enum PendingInstruction<'g> {
    Straight(Instruction<'g>),
    Branch(BranchInstruction<SynLabel>),
}

impl<'g> CodeBuilder<'g> {
    /// Create a builder for a new method
    pub fn new(method: MethodId<'g>) -> Self {
        // The initial local variables are just the parameters (including maybe "this")
        let max_locals = method.0.argument_words() as u16;

        CodeBuilder {
            instructions: vec![],
            placed_labels: HashMap::new(),
            exception_table: vec![],
            labels: LabelSupply::default(),
            max_locals,
            method,
        }
    }

    /// Generate a fresh label
    pub fn fresh_label(&mut self) -> SynLabel {
        self.labels.fresh()
    }

    /// Place a label right before the next instruction to be pushed
    pub fn place_label(&mut self, label: SynLabel) -> Result<(), Error> {
        let next_index = self.instructions.len();
        if self.placed_labels.insert(label, next_index).is_some() {
            return Err(Error::DuplicateLabel(label));
        }
        Ok(())
    }

    /// Push a new straight-line instruction
    pub fn push_instruction(&mut self, insn: Instruction<'g>) -> Result<(), Error> {
        use Instruction::*;

        // Track the highest local variable slot touched
        let touched = match insn {
            ILoad(idx) | FLoad(idx) | ALoad(idx) | IStore(idx) | FStore(idx) | AStore(idx) => {
                Some(u32::from(idx) + 1)
            }
            IInc(idx, _) => Some(u32::from(idx) + 1),
            LLoad(idx) | DLoad(idx) | LStore(idx) | DStore(idx) => Some(u32::from(idx) + 2),
            _ => None,
        };
        if let Some(touched) = touched {
            self.max_locals = self.max_locals.max(touched.min(u32::from(u16::MAX)) as u16);
        }

        self.instructions.push(PendingInstruction::Straight(insn));
        Ok(())
    }

    /// Push a new branch instruction
    pub fn push_branch_instruction(
        &mut self,
        insn: BranchInstruction<SynLabel>,
    ) -> Result<(), Error> {
        self.instructions.push(PendingInstruction::Branch(insn));
        Ok(())
    }

    /// Protect the instructions between `start` (inclusive) and `end` (exclusive)
    ///
    /// Handlers added first take priority.
    pub fn add_exception_handler(
        &mut self,
        start: SynLabel,
        end: SynLabel,
        handler: SynLabel,
        catch_type: Option<ClassId<'g>>,
    ) {
        self.exception_table.push(ExceptionHandler {
            start,
            end,
            handler,
            catch_type,
        });
    }

    /// Turn the builder into the method code
    pub fn result(self) -> Result<Code<'g>, Error> {
        let mut unplaced_labels: Vec<SynLabel> = vec![];
        let placed_labels = &self.placed_labels;
        let mut resolve = |label: &SynLabel| -> Result<usize, Infallible> {
            match placed_labels.get(label) {
                Some(index) => Ok(*index),
                None => {
                    if !unplaced_labels.contains(label) {
                        unplaced_labels.push(*label);
                    }
                    Ok(usize::MAX)
                }
            }
        };

        let mut instructions = Vec::with_capacity(self.instructions.len());
        for insn in self.instructions {
            instructions.push(match insn {
                PendingInstruction::Straight(insn) => insn,
                PendingInstruction::Branch(branch) => match branch.map_labels(&mut resolve) {
                    Ok(resolved) => Instruction::Branch(resolved),
                    Err(never) => match never {},
                },
            });
        }
        let mut exception_table = Vec::with_capacity(self.exception_table.len());
        for handler in &self.exception_table {
            match handler.map_labels(&mut resolve) {
                Ok(resolved) => exception_table.push(resolved),
                Err(never) => match never {},
            }
        }

        if !unplaced_labels.is_empty() {
            return Err(Error::MethodCodeNotFinished { unplaced_labels });
        }

        Ok(Code {
            max_locals: self.max_locals,
            instructions,
            exception_table,
        })
    }

    /// Finish the code and attach it to the method
    pub fn install(self) -> Result<(), Error> {
        let method = self.method;
        let code = self.result()?;
        method.set_code(code)
    }
}
