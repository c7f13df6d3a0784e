//! Decoding of raw JVM bytecode into [`Code`]
//!
//! The bytes are the contents of a `Code` attribute. Constant pool indices are resolved through a
//! [`ConstantPool`], which is the seam between the decoder and whatever class loading front end
//! produced the class graph.

use crate::jvm::class_graph::{ClassId, ConstantData, FieldId, InvokeDynamicId, MethodId};
use crate::jvm::code::{
    BranchInstruction, Code, CompareMode, EqComparison, ExceptionHandler, Instruction,
    InvokeType, OrdComparison, ShiftType,
};
use crate::jvm::{BaseType, Error, RefType};
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::Cursor;

/// Resolves constant pool indices into class graph references
pub trait ConstantPool<'g> {
    /// Class (or array) type, as used by `new`, `checkcast`, `anewarray`, ...
    fn class(&self, index: u16) -> Result<RefType<ClassId<'g>>, Error>;

    fn field(&self, index: u16) -> Result<FieldId<'g>, Error>;

    fn method(&self, index: u16) -> Result<MethodId<'g>, Error>;

    fn invoke_dynamic(&self, index: u16) -> Result<InvokeDynamicId<'g>, Error>;

    /// Loadable constant (for `ldc`, `ldc_w`, and `ldc2_w`)
    fn constant(&self, index: u16) -> Result<ConstantData<'g>, Error>;
}

/// Already resolved constant pool entry
#[derive(Clone, Debug)]
pub enum PoolEntry<'g> {
    Class(RefType<ClassId<'g>>),
    Field(FieldId<'g>),
    Method(MethodId<'g>),
    InvokeDynamic(InvokeDynamicId<'g>),
    Constant(ConstantData<'g>),
}

/// Constant pools are 1-indexed, so index `1` is the first element of the vector
impl<'g> ConstantPool<'g> for Vec<PoolEntry<'g>> {
    fn class(&self, index: u16) -> Result<RefType<ClassId<'g>>, Error> {
        match pool_entry(self, index)? {
            PoolEntry::Class(class) => Ok(*class),
            _ => Err(Error::MissingConstant(index)),
        }
    }

    fn field(&self, index: u16) -> Result<FieldId<'g>, Error> {
        match pool_entry(self, index)? {
            PoolEntry::Field(field) => Ok(*field),
            _ => Err(Error::MissingConstant(index)),
        }
    }

    fn method(&self, index: u16) -> Result<MethodId<'g>, Error> {
        match pool_entry(self, index)? {
            PoolEntry::Method(method) => Ok(*method),
            _ => Err(Error::MissingConstant(index)),
        }
    }

    fn invoke_dynamic(&self, index: u16) -> Result<InvokeDynamicId<'g>, Error> {
        match pool_entry(self, index)? {
            PoolEntry::InvokeDynamic(indy) => Ok(*indy),
            _ => Err(Error::MissingConstant(index)),
        }
    }

    fn constant(&self, index: u16) -> Result<ConstantData<'g>, Error> {
        match pool_entry(self, index)? {
            PoolEntry::Constant(constant) => Ok(constant.clone()),
            PoolEntry::Class(class) => Ok(ConstantData::Class(*class)),
            _ => Err(Error::MissingConstant(index)),
        }
    }
}

fn pool_entry<'a, 'g>(pool: &'a [PoolEntry<'g>], index: u16) -> Result<&'a PoolEntry<'g>, Error> {
    (index as usize)
        .checked_sub(1)
        .and_then(|idx| pool.get(idx))
        .ok_or(Error::MissingConstant(index))
}

/// Exception table entry, as it appears in the class file (byte offsets and a pool index)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RawExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,

    /// Zero means "catch everything"
    pub catch_type: u16,
}

/// Decode a method body with no exception handlers
pub fn decode_code<'g>(
    max_locals: u16,
    bytes: &[u8],
    pool: &impl ConstantPool<'g>,
) -> Result<Code<'g>, Error> {
    decode_method_body(max_locals, bytes, &[], pool)
}

/// Decode a method body, converting all byte offsets into instruction indices
pub fn decode_method_body<'g>(
    max_locals: u16,
    bytes: &[u8],
    handlers: &[RawExceptionHandler],
    pool: &impl ConstantPool<'g>,
) -> Result<Code<'g>, Error> {
    let mut reader = Reader {
        cursor: Cursor::new(bytes),
        insn_start: 0,
    };

    // First pass: decode with branches still pointing at absolute byte offsets
    let mut decoded: Vec<(usize, Decoded<'g>)> = vec![];
    while (reader.cursor.position() as usize) < bytes.len() {
        let offset = reader.cursor.position() as usize;
        reader.insn_start = offset;
        decoded.push((offset, reader.decode_one(pool)?));
    }

    // Byte offset to instruction index (the end of the code is valid as an exclusive bound)
    let mut index_of: HashMap<usize, usize> = decoded
        .iter()
        .enumerate()
        .map(|(idx, (offset, _))| (*offset, idx))
        .collect();
    let end_index = decoded.len();

    let mut instructions = Vec::with_capacity(decoded.len());
    for (offset, insn) in decoded {
        instructions.push(match insn {
            Decoded::Straight(insn) => insn,
            Decoded::Branch(branch) => {
                Instruction::Branch(branch.map_labels(|target: &i64| {
                    usize::try_from(*target)
                        .ok()
                        .and_then(|target| index_of.get(&target).copied())
                        .ok_or(Error::InvalidJumpTarget {
                            offset,
                            target: *target,
                        })
                })?)
            }
        });
    }

    index_of.insert(bytes.len(), end_index);
    let mut exception_table = Vec::with_capacity(handlers.len());
    for handler in handlers {
        let catch_type = if handler.catch_type == 0 {
            None
        } else {
            match pool.class(handler.catch_type)? {
                RefType::Object(class) => Some(class),
                _ => return Err(Error::MissingConstant(handler.catch_type)),
            }
        };
        let raw = ExceptionHandler {
            start: handler.start_pc,
            end: handler.end_pc,
            handler: handler.handler_pc,
            catch_type,
        };
        exception_table.push(raw.map_labels(|target: &u16| {
            index_of
                .get(&(*target as usize))
                .copied()
                .ok_or(Error::InvalidJumpTarget {
                    offset: handler.start_pc as usize,
                    target: i64::from(*target),
                })
        })?);
    }

    Ok(Code {
        max_locals,
        instructions,
        exception_table,
    })
}

enum Decoded<'g> {
    Straight(Instruction<'g>),
    Branch(BranchInstruction<i64>),
}

struct Reader<'b> {
    cursor: Cursor<&'b [u8]>,

    /// Offset of the instruction being decoded (for error messages and relative jumps)
    insn_start: usize,
}

impl<'b> Reader<'b> {
    fn truncated(&self) -> Error {
        Error::TruncatedCode {
            offset: self.insn_start,
        }
    }

    fn u8(&mut self) -> Result<u8, Error> {
        self.cursor.read_u8().map_err(|_| self.truncated())
    }

    fn i8(&mut self) -> Result<i8, Error> {
        self.cursor.read_i8().map_err(|_| self.truncated())
    }

    fn u16(&mut self) -> Result<u16, Error> {
        self.cursor
            .read_u16::<BigEndian>()
            .map_err(|_| self.truncated())
    }

    fn i16(&mut self) -> Result<i16, Error> {
        self.cursor
            .read_i16::<BigEndian>()
            .map_err(|_| self.truncated())
    }

    fn i32(&mut self) -> Result<i32, Error> {
        self.cursor
            .read_i32::<BigEndian>()
            .map_err(|_| self.truncated())
    }

    /// Jump target relative to the start of the current instruction
    fn target(&self, relative: i64) -> i64 {
        self.insn_start as i64 + relative
    }

    fn invalid(&self, opcode: u8) -> Error {
        Error::InvalidOperand {
            offset: self.insn_start,
            opcode,
        }
    }

    fn decode_one<'g>(&mut self, pool: &impl ConstantPool<'g>) -> Result<Decoded<'g>, Error> {
        use Instruction::*;

        let opcode = self.u8()?;
        let insn = match opcode {
            0x00 => Nop,
            0x01 => AConstNull,
            0x02 => IConstM1,
            0x03 => IConst0,
            0x04 => IConst1,
            0x05 => IConst2,
            0x06 => IConst3,
            0x07 => IConst4,
            0x08 => IConst5,
            0x09 => LConst0,
            0x0a => LConst1,
            0x0b => FConst0,
            0x0c => FConst1,
            0x0d => FConst2,
            0x0e => DConst0,
            0x0f => DConst1,
            0x10 => BiPush(self.i8()?),
            0x11 => SiPush(self.i16()?),
            0x12 => {
                let index = u16::from(self.u8()?);
                Ldc(pool.constant(index)?)
            }
            0x13 | 0x14 => {
                let index = self.u16()?;
                Ldc(pool.constant(index)?)
            }
            0x15 => ILoad(u16::from(self.u8()?)),
            0x16 => LLoad(u16::from(self.u8()?)),
            0x17 => FLoad(u16::from(self.u8()?)),
            0x18 => DLoad(u16::from(self.u8()?)),
            0x19 => ALoad(u16::from(self.u8()?)),
            0x1a..=0x1d => ILoad(u16::from(opcode - 0x1a)),
            0x1e..=0x21 => LLoad(u16::from(opcode - 0x1e)),
            0x22..=0x25 => FLoad(u16::from(opcode - 0x22)),
            0x26..=0x29 => DLoad(u16::from(opcode - 0x26)),
            0x2a..=0x2d => ALoad(u16::from(opcode - 0x2a)),
            0x2e => IALoad,
            0x2f => LALoad,
            0x30 => FALoad,
            0x31 => DALoad,
            0x32 => AALoad,
            0x33 => BALoad,
            0x34 => CALoad,
            0x35 => SALoad,
            0x36 => IStore(u16::from(self.u8()?)),
            0x37 => LStore(u16::from(self.u8()?)),
            0x38 => FStore(u16::from(self.u8()?)),
            0x39 => DStore(u16::from(self.u8()?)),
            0x3a => AStore(u16::from(self.u8()?)),
            0x3b..=0x3e => IStore(u16::from(opcode - 0x3b)),
            0x3f..=0x42 => LStore(u16::from(opcode - 0x3f)),
            0x43..=0x46 => FStore(u16::from(opcode - 0x43)),
            0x47..=0x4a => DStore(u16::from(opcode - 0x47)),
            0x4b..=0x4e => AStore(u16::from(opcode - 0x4b)),
            0x4f => IAStore,
            0x50 => LAStore,
            0x51 => FAStore,
            0x52 => DAStore,
            0x53 => AAStore,
            0x54 => BAStore,
            0x55 => CAStore,
            0x56 => SAStore,
            0x57 => Pop,
            0x58 => Pop2,
            0x59 => Dup,
            0x5a => DupX1,
            0x5b => DupX2,
            0x5c => Dup2,
            0x5d => Dup2X1,
            0x5e => Dup2X2,
            0x5f => Swap,
            0x60 => IAdd,
            0x61 => LAdd,
            0x62 => FAdd,
            0x63 => DAdd,
            0x64 => ISub,
            0x65 => LSub,
            0x66 => FSub,
            0x67 => DSub,
            0x68 => IMul,
            0x69 => LMul,
            0x6a => FMul,
            0x6b => DMul,
            0x6c => IDiv,
            0x6d => LDiv,
            0x6e => FDiv,
            0x6f => DDiv,
            0x70 => IRem,
            0x71 => LRem,
            0x72 => FRem,
            0x73 => DRem,
            0x74 => INeg,
            0x75 => LNeg,
            0x76 => FNeg,
            0x77 => DNeg,
            0x78 => ISh(ShiftType::Left),
            0x79 => LSh(ShiftType::Left),
            0x7a => ISh(ShiftType::ArithmeticRight),
            0x7b => LSh(ShiftType::ArithmeticRight),
            0x7c => ISh(ShiftType::LogicalRight),
            0x7d => LSh(ShiftType::LogicalRight),
            0x7e => IAnd,
            0x7f => LAnd,
            0x80 => IOr,
            0x81 => LOr,
            0x82 => IXor,
            0x83 => LXor,
            0x84 => {
                let index = u16::from(self.u8()?);
                IInc(index, i16::from(self.i8()?))
            }
            0x85 => I2L,
            0x86 => I2F,
            0x87 => I2D,
            0x88 => L2I,
            0x89 => L2F,
            0x8a => L2D,
            0x8b => F2I,
            0x8c => F2L,
            0x8d => F2D,
            0x8e => D2I,
            0x8f => D2L,
            0x90 => D2F,
            0x91 => I2B,
            0x92 => I2C,
            0x93 => I2S,
            0x94 => LCmp,
            0x95 => FCmp(CompareMode::L),
            0x96 => FCmp(CompareMode::G),
            0x97 => DCmp(CompareMode::L),
            0x98 => DCmp(CompareMode::G),
            0x99..=0xa6 | 0xa7 | 0xc6 | 0xc7 => {
                let relative = i64::from(self.i16()?);
                let target = self.target(relative);
                return Ok(Decoded::Branch(match opcode {
                    0x99 => BranchInstruction::If(OrdComparison::EQ, target),
                    0x9a => BranchInstruction::If(OrdComparison::NE, target),
                    0x9b => BranchInstruction::If(OrdComparison::LT, target),
                    0x9c => BranchInstruction::If(OrdComparison::GE, target),
                    0x9d => BranchInstruction::If(OrdComparison::GT, target),
                    0x9e => BranchInstruction::If(OrdComparison::LE, target),
                    0x9f => BranchInstruction::IfICmp(OrdComparison::EQ, target),
                    0xa0 => BranchInstruction::IfICmp(OrdComparison::NE, target),
                    0xa1 => BranchInstruction::IfICmp(OrdComparison::LT, target),
                    0xa2 => BranchInstruction::IfICmp(OrdComparison::GE, target),
                    0xa3 => BranchInstruction::IfICmp(OrdComparison::GT, target),
                    0xa4 => BranchInstruction::IfICmp(OrdComparison::LE, target),
                    0xa5 => BranchInstruction::IfACmp(EqComparison::EQ, target),
                    0xa6 => BranchInstruction::IfACmp(EqComparison::NE, target),
                    0xc6 => BranchInstruction::IfNull(EqComparison::EQ, target),
                    0xc7 => BranchInstruction::IfNull(EqComparison::NE, target),
                    _ => BranchInstruction::Goto(target),
                }));
            }
            0xc8 => {
                let relative = i64::from(self.i32()?);
                return Ok(Decoded::Branch(BranchInstruction::Goto(
                    self.target(relative),
                )));
            }
            0xaa | 0xab => return self.decode_switch(opcode).map(Decoded::Branch),
            0xac => IReturn,
            0xad => LReturn,
            0xae => FReturn,
            0xaf => DReturn,
            0xb0 => AReturn,
            0xb1 => Return,
            0xb2 => GetStatic(pool.field(self.u16()?)?),
            0xb3 => PutStatic(pool.field(self.u16()?)?),
            0xb4 => GetField(pool.field(self.u16()?)?),
            0xb5 => PutField(pool.field(self.u16()?)?),
            0xb6 => Invoke(InvokeType::Virtual, pool.method(self.u16()?)?),
            0xb7 => Invoke(InvokeType::Special, pool.method(self.u16()?)?),
            0xb8 => Invoke(InvokeType::Static, pool.method(self.u16()?)?),
            0xb9 => {
                let method = pool.method(self.u16()?)?;
                let count = self.u8()?;
                if self.u8()? != 0 {
                    return Err(self.invalid(opcode));
                }
                Invoke(InvokeType::Interface(count), method)
            }
            0xba => {
                let indy = pool.invoke_dynamic(self.u16()?)?;
                if self.u16()? != 0 {
                    return Err(self.invalid(opcode));
                }
                InvokeDynamic(indy)
            }
            0xbb => match pool.class(self.u16()?)? {
                RefType::Object(class) => New(class),
                _ => return Err(self.invalid(opcode)),
            },
            0xbc => {
                let code = self.u8()?;
                NewArray(BaseType::from_array_type_code(code).ok_or_else(|| self.invalid(opcode))?)
            }
            0xbd => ANewArray(pool.class(self.u16()?)?),
            0xbe => ArrayLength,
            0xbf => AThrow,
            0xc0 => CheckCast(pool.class(self.u16()?)?),
            0xc1 => InstanceOf(pool.class(self.u16()?)?),
            0xc2 => MonitorEnter,
            0xc3 => MonitorExit,
            0xc4 => self.decode_wide()?,
            0xc5 => {
                let array_type = pool.class(self.u16()?)?;
                let dimensions = self.u8()?;
                if dimensions == 0 {
                    return Err(self.invalid(opcode));
                }
                MultiANewArray(array_type, dimensions)
            }
            _ => {
                return Err(Error::UnknownOpcode {
                    opcode,
                    offset: self.insn_start,
                })
            }
        };
        Ok(Decoded::Straight(insn))
    }

    fn decode_wide<'g>(&mut self) -> Result<Instruction<'g>, Error> {
        use Instruction::*;

        let opcode = self.u8()?;
        let index = self.u16()?;
        Ok(match opcode {
            0x15 => ILoad(index),
            0x16 => LLoad(index),
            0x17 => FLoad(index),
            0x18 => DLoad(index),
            0x19 => ALoad(index),
            0x36 => IStore(index),
            0x37 => LStore(index),
            0x38 => FStore(index),
            0x39 => DStore(index),
            0x3a => AStore(index),
            0x84 => IInc(index, self.i16()?),
            _ => return Err(self.invalid(0xc4)),
        })
    }

    fn decode_switch(&mut self, opcode: u8) -> Result<BranchInstruction<i64>, Error> {
        // Operands start at the next multiple of four from the start of the code
        let after_opcode = self.insn_start + 1;
        let padding = (4 - after_opcode % 4) % 4;
        for _ in 0..padding {
            self.u8()?;
        }

        let default_relative = i64::from(self.i32()?);
        let default = self.target(default_relative);
        if opcode == 0xaa {
            let low = self.i32()?;
            let high = self.i32()?;
            if high < low {
                return Err(self.invalid(opcode));
            }
            let count = (i64::from(high) - i64::from(low) + 1) as usize;
            let mut targets = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                let relative = i64::from(self.i32()?);
                targets.push(self.target(relative));
            }
            Ok(BranchInstruction::TableSwitch {
                default,
                low,
                targets,
            })
        } else {
            let pairs = self.i32()?;
            if pairs < 0 {
                return Err(self.invalid(opcode));
            }
            let mut targets = Vec::with_capacity((pairs as usize).min(1024));
            for _ in 0..pairs {
                let key = self.i32()?;
                let relative = i64::from(self.i32()?);
                targets.push((key, self.target(relative)));
            }
            Ok(BranchInstruction::LookupSwitch { default, targets })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas};

    #[test]
    fn straight_line_and_branches() {
        let pool: Vec<PoolEntry> = vec![];

        // 0: iload_0
        // 1: ifge +6 (-> 7)
        // 4: iload_0
        // 5: ineg
        // 6: ireturn
        // 7: iload_0
        // 8: ireturn
        let bytes = [0x1a, 0x9c, 0x00, 0x06, 0x1a, 0x74, 0xac, 0x1a, 0xac];
        let code = decode_code(1, &bytes, &pool).unwrap();
        assert_eq!(code.instructions.len(), 7);
        assert!(matches!(
            code.instructions[1],
            Instruction::Branch(BranchInstruction::If(OrdComparison::GE, 5))
        ));
        assert!(matches!(code.instructions[3], Instruction::INeg));
    }

    #[test]
    fn wide_and_iinc() {
        let pool: Vec<PoolEntry> = vec![];
        let bytes = [0xc4, 0x84, 0x01, 0x00, 0xff, 0xfe, 0x84, 0x02, 0x05, 0xb1];
        let code = decode_code(300, &bytes, &pool).unwrap();
        assert!(matches!(code.instructions[0], Instruction::IInc(256, -2)));
        assert!(matches!(code.instructions[1], Instruction::IInc(2, 5)));
        assert!(matches!(code.instructions[2], Instruction::Return));
    }

    #[test]
    fn switch_padding() {
        let pool: Vec<PoolEntry> = vec![];

        // 0: iload_0
        // 1: tableswitch (2 bytes padding) default -> 27, [0 -> 25, 1 -> 26]
        // 24: nop
        // 25: nop
        // 26: nop
        // 27: return
        let mut bytes = vec![0x1a, 0xaa, 0x00, 0x00];
        bytes.extend_from_slice(&26i32.to_be_bytes());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        bytes.extend_from_slice(&1i32.to_be_bytes());
        bytes.extend_from_slice(&24i32.to_be_bytes());
        bytes.extend_from_slice(&25i32.to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0xb1]);
        let code = decode_code(1, &bytes, &pool).unwrap();

        match &code.instructions[1] {
            Instruction::Branch(BranchInstruction::TableSwitch {
                default,
                low,
                targets,
            }) => {
                assert_eq!(*default, 5);
                assert_eq!(*low, 0);
                assert_eq!(targets, &vec![3, 4]);
            }
            other => panic!("expected a tableswitch, got {:?}", other),
        }
    }

    #[test]
    fn bad_code() {
        let pool: Vec<PoolEntry> = vec![];
        assert!(matches!(
            decode_code(0, &[0xa8, 0x00, 0x00], &pool),
            Err(Error::UnknownOpcode { opcode: 0xa8, .. })
        ));
        assert!(matches!(
            decode_code(0, &[0x11, 0x00], &pool),
            Err(Error::TruncatedCode { offset: 0 })
        ));
        assert!(matches!(
            decode_code(0, &[0x00, 0xa7, 0x00, 0x02, 0xb1], &pool),
            Err(Error::InvalidJumpTarget {
                offset: 1,
                target: 3
            })
        ));
        assert!(matches!(
            decode_code(0, &[0xbc, 0x02], &pool),
            Err(Error::InvalidOperand { opcode: 0xbc, .. })
        ));
        assert!(matches!(
            decode_code(0, &[0x12, 0x01], &pool),
            Err(Error::MissingConstant(1))
        ));
    }

    #[test]
    fn pool_references_and_handlers() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types().unwrap();
        let pool = vec![
            PoolEntry::Class(RefType::Object(java.classes.lang.runtime_exception)),
            PoolEntry::Method(java.members.lang.throwable.init),
            PoolEntry::Constant(ConstantData::Long(1 << 40)),
        ];

        // 0: new #1
        // 3: dup
        // 4: invokespecial #2
        // 7: athrow
        // 8: astore_0
        // 9: ldc2_w #3
        // 12: lreturn
        let bytes = [
            0xbb, 0x00, 0x01, 0x59, 0xb7, 0x00, 0x02, 0xbf, 0x4b, 0x14, 0x00, 0x03, 0xad,
        ];
        let handlers = [RawExceptionHandler {
            start_pc: 0,
            end_pc: 8,
            handler_pc: 8,
            catch_type: 1,
        }];
        let code = decode_method_body(2, &bytes, &handlers, &pool).unwrap();
        let runtime_exception = java.classes.lang.runtime_exception;
        assert!(matches!(
            code.instructions[0],
            Instruction::New(class) if class == runtime_exception
        ));
        assert!(matches!(
            code.instructions[2],
            Instruction::Invoke(InvokeType::Special, _)
        ));
        assert!(matches!(
            code.instructions[5],
            Instruction::Ldc(ConstantData::Long(value)) if value == 1 << 40
        ));
        assert_eq!(code.exception_table.len(), 1);
        assert_eq!(code.exception_table[0].start, 0);
        assert_eq!(code.exception_table[0].end, 4);
        assert_eq!(code.exception_table[0].handler, 4);
        assert_eq!(
            code.exception_table[0].catch_type,
            Some(java.classes.lang.runtime_exception)
        );
    }
}
