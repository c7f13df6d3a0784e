//! This module contains the AST of the JVM bytecode the interpreter executes. The representation
//! is slightly different from the usual presentation to make it more convenient to match on:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify
//!
//!   - Some instructions (like the branches) get abstracted into one instruction with a field.
//!     This helps with repetitive pattern matches
//!
//!   - Constant pool indices are already resolved into class graph references
//!
//!   - Jump targets are instruction indices, not byte offsets
//!
//!   - `jsr` and `ret` are omitted (no modern compiler emits them)

use crate::jvm::class_graph::{ClassId, ConstantData, FieldId, InvokeDynamicId, MethodId};
use crate::jvm::{BaseType, RefType};
use std::ops::Not;

/// JVM bytecode instruction
#[derive(Clone, Debug)]
pub enum Instruction<'g> {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(ConstantData<'g>), // covers `ldc`, `ldc_w`, and `ldc2_w`
    ILoad(u16),            // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(FieldId<'g>),
    PutStatic(FieldId<'g>),
    GetField(FieldId<'g>),
    PutField(FieldId<'g>),
    Invoke(InvokeType, MethodId<'g>),
    InvokeDynamic(InvokeDynamicId<'g>),
    New(ClassId<'g>),
    NewArray(BaseType),
    ANewArray(RefType<ClassId<'g>>), // element type
    ArrayLength,
    AThrow,
    CheckCast(RefType<ClassId<'g>>),
    InstanceOf(RefType<ClassId<'g>>),
    MonitorEnter,
    MonitorExit,
    MultiANewArray(RefType<ClassId<'g>>, u8), // array type and number of dimensions to allocate
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    Branch(BranchInstruction<usize>),
}

impl<'g> Instruction<'g> {
    pub fn is_array_load(&self) -> bool {
        use Instruction::*;
        matches!(
            self,
            IALoad | LALoad | FALoad | DALoad | AALoad | BALoad | CALoad | SALoad
        )
    }

    pub fn is_array_store(&self) -> bool {
        use Instruction::*;
        matches!(
            self,
            IAStore | LAStore | FAStore | DAStore | AAStore | BAStore | CAStore | SAStore
        )
    }

    pub fn is_static_field_access(&self) -> bool {
        matches!(self, Instruction::GetStatic(_) | Instruction::PutStatic(_))
    }

    pub fn is_instance_field_access(&self) -> bool {
        matches!(self, Instruction::GetField(_) | Instruction::PutField(_))
    }

    pub fn is_invoke(&self) -> bool {
        matches!(self, Instruction::Invoke(_, _) | Instruction::InvokeDynamic(_))
    }

    pub fn is_return(&self) -> bool {
        use Instruction::*;
        matches!(
            self,
            IReturn | LReturn | FReturn | DReturn | AReturn | Return
        )
    }

    pub fn is_monitor(&self) -> bool {
        matches!(self, Instruction::MonitorEnter | Instruction::MonitorExit)
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Instruction::Branch(_))
    }

    /// Net change in operand stack size (in words) from executing the instruction
    ///
    /// This is `None` for instructions whose effect depends on more than the instruction itself
    /// or which leave the frame (returns, `athrow`, invokes, field accesses with wide values, ...).
    pub fn stack_delta(&self) -> Option<isize> {
        use Instruction::*;
        Some(match self {
            Nop => 0,
            AConstNull | IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 => 1,
            LConst0 | LConst1 | DConst0 | DConst1 => 2,
            FConst0 | FConst1 | FConst2 => 1,
            BiPush(_) | SiPush(_) => 1,
            Ldc(ConstantData::Long(_) | ConstantData::Double(_)) => 2,
            Ldc(_) => 1,
            ILoad(_) | FLoad(_) | ALoad(_) => 1,
            LLoad(_) | DLoad(_) => 2,
            IALoad | FALoad | AALoad | BALoad | CALoad | SALoad => -1,
            LALoad | DALoad => 0,
            IStore(_) | FStore(_) | AStore(_) => -1,
            LStore(_) | DStore(_) => -2,
            IAStore | FAStore | AAStore | BAStore | CAStore | SAStore => -3,
            LAStore | DAStore => -4,
            Pop => -1,
            Pop2 => -2,
            Dup | DupX1 | DupX2 => 1,
            Dup2 | Dup2X1 | Dup2X2 => 2,
            Swap => 0,
            IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor | ISh(_) => -1,
            FAdd | FSub | FMul | FDiv | FRem => -1,
            LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor => -2,
            DAdd | DSub | DMul | DDiv | DRem => -2,
            LSh(_) => -1,
            INeg | LNeg | FNeg | DNeg => 0,
            IInc(_, _) => 0,
            I2L | I2D | F2L | F2D => 1,
            L2I | L2F | D2I | D2F => -1,
            I2F | L2D | F2I | D2L | I2B | I2C | I2S => 0,
            LCmp | DCmp(_) => -3,
            FCmp(_) => -1,
            New(_) => 1,
            NewArray(_) | ANewArray(_) | ArrayLength => 0,
            CheckCast(_) | InstanceOf(_) => 0,
            MonitorEnter | MonitorExit => -1,
            MultiANewArray(_, dimensions) => 1 - *dimensions as isize,
            Branch(branch) => branch.stack_delta(),
            GetStatic(_) | PutStatic(_) | GetField(_) | PutField(_) => return None,
            Invoke(_, _) | InvokeDynamic(_) => return None,
            AThrow | IReturn | LReturn | FReturn | DReturn | AReturn | Return => return None,
        })
    }
}

/// Branching instructions
///
/// The label type is a parameter so that the same instruction can refer to raw byte offsets
/// (while decoding), to synthetic labels (while building), and finally to instruction indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchInstruction<Lbl> {
    If(OrdComparison, Lbl), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl), // covers `if_icmpeq`, `if_icmpne`, `if_icmplt`, ... `if_icmple`
    IfACmp(EqComparison, Lbl),  // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Lbl),  // covers `ifnull`, `ifnonnull`
    Goto(Lbl),                  // covers `goto` and `goto_w`
    TableSwitch {
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: Lbl,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<Lbl>,
    },
    LookupSwitch {
        /// Jump target if there is no corresponding key
        default: Lbl,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, Lbl)>,
    },
}

impl<Lbl> BranchInstruction<Lbl> {
    pub fn map_labels<Lbl2, E>(
        &self,
        mut map_label: impl FnMut(&Lbl) -> Result<Lbl2, E>,
    ) -> Result<BranchInstruction<Lbl2>, E> {
        use BranchInstruction::*;
        Ok(match self {
            If(op, lbl) => If(*op, map_label(lbl)?),
            IfICmp(op, lbl) => IfICmp(*op, map_label(lbl)?),
            IfACmp(op, lbl) => IfACmp(*op, map_label(lbl)?),
            IfNull(op, lbl) => IfNull(*op, map_label(lbl)?),
            Goto(lbl) => Goto(map_label(lbl)?),
            TableSwitch {
                default,
                low,
                targets,
            } => TableSwitch {
                default: map_label(default)?,
                low: *low,
                targets: targets
                    .iter()
                    .map(&mut map_label)
                    .collect::<Result<_, E>>()?,
            },
            LookupSwitch { default, targets } => LookupSwitch {
                default: map_label(default)?,
                targets: targets
                    .iter()
                    .map(|(key, lbl)| Ok((*key, map_label(lbl)?)))
                    .collect::<Result<_, E>>()?,
            },
        })
    }

    /// Every label the branch might jump to
    pub fn jump_targets(&self) -> Vec<&Lbl> {
        use BranchInstruction::*;
        match self {
            If(_, lbl) | IfICmp(_, lbl) | IfACmp(_, lbl) | IfNull(_, lbl) | Goto(lbl) => vec![lbl],
            TableSwitch {
                default, targets, ..
            } => std::iter::once(default).chain(targets.iter()).collect(),
            LookupSwitch { default, targets } => std::iter::once(default)
                .chain(targets.iter().map(|(_, lbl)| lbl))
                .collect(),
        }
    }

    /// Can control continue on to the next instruction?
    pub fn may_fall_through(&self) -> bool {
        use BranchInstruction::*;
        !matches!(self, Goto(_) | TableSwitch { .. } | LookupSwitch { .. })
    }

    pub fn stack_delta(&self) -> isize {
        use BranchInstruction::*;
        match self {
            If(_, _) | IfNull(_, _) | TableSwitch { .. } | LookupSwitch { .. } => -1,
            IfICmp(_, _) | IfACmp(_, _) => -2,
            Goto(_) => 0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl OrdComparison {
    /// Compare against zero (or compare two values)
    pub fn holds<T: PartialOrd>(self, lhs: T, rhs: T) -> bool {
        match self {
            OrdComparison::EQ => lhs == rhs,
            OrdComparison::NE => lhs != rhs,
            OrdComparison::LT => lhs < rhs,
            OrdComparison::LE => lhs <= rhs,
            OrdComparison::GT => lhs > rhs,
            OrdComparison::GE => lhs >= rhs,
        }
    }
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::NE => OrdComparison::EQ,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EqComparison {
    EQ,
    NE,
}

impl EqComparison {
    pub fn holds(self, equal: bool) -> bool {
        match self {
            EqComparison::EQ => equal,
            EqComparison::NE => !equal,
        }
    }
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface(u8), // `count` is of total arguments, where `long`/`double` count for 2
}
