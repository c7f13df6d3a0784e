//! Arithmetic on operand stack values
//!
//! Integer arithmetic wraps around, shifts only use the low bits of the shift amount, and
//! float-to-integer conversions saturate (with `NaN` going to 0). Rust's `wrapping_*` methods and
//! `as` casts already behave this way.

use crate::jvm::code::{CompareMode, Instruction, ShiftType};
use crate::vm::{Error, Value};

/// Result of a binary arithmetic or bitwise instruction (`None` on integer division by zero)
pub fn binary_op(
    instruction: &Instruction,
    lhs: Value,
    rhs: Value,
) -> Result<Option<Value>, Error> {
    use Instruction::*;
    Ok(Some(match instruction {
        IAdd => Value::Int(lhs.as_int()?.wrapping_add(rhs.as_int()?)),
        ISub => Value::Int(lhs.as_int()?.wrapping_sub(rhs.as_int()?)),
        IMul => Value::Int(lhs.as_int()?.wrapping_mul(rhs.as_int()?)),
        IDiv | IRem => {
            let (lhs, rhs) = (lhs.as_int()?, rhs.as_int()?);
            if rhs == 0 {
                return Ok(None);
            }
            Value::Int(if matches!(instruction, IDiv) {
                lhs.wrapping_div(rhs)
            } else {
                lhs.wrapping_rem(rhs)
            })
        }
        IAnd => Value::Int(lhs.as_int()? & rhs.as_int()?),
        IOr => Value::Int(lhs.as_int()? | rhs.as_int()?),
        IXor => Value::Int(lhs.as_int()? ^ rhs.as_int()?),

        LAdd => Value::Long(lhs.as_long()?.wrapping_add(rhs.as_long()?)),
        LSub => Value::Long(lhs.as_long()?.wrapping_sub(rhs.as_long()?)),
        LMul => Value::Long(lhs.as_long()?.wrapping_mul(rhs.as_long()?)),
        LDiv | LRem => {
            let (lhs, rhs) = (lhs.as_long()?, rhs.as_long()?);
            if rhs == 0 {
                return Ok(None);
            }
            Value::Long(if matches!(instruction, LDiv) {
                lhs.wrapping_div(rhs)
            } else {
                lhs.wrapping_rem(rhs)
            })
        }
        LAnd => Value::Long(lhs.as_long()? & rhs.as_long()?),
        LOr => Value::Long(lhs.as_long()? | rhs.as_long()?),
        LXor => Value::Long(lhs.as_long()? ^ rhs.as_long()?),

        FAdd => Value::Float(lhs.as_float()? + rhs.as_float()?),
        FSub => Value::Float(lhs.as_float()? - rhs.as_float()?),
        FMul => Value::Float(lhs.as_float()? * rhs.as_float()?),
        FDiv => Value::Float(lhs.as_float()? / rhs.as_float()?),
        FRem => Value::Float(lhs.as_float()? % rhs.as_float()?),

        DAdd => Value::Double(lhs.as_double()? + rhs.as_double()?),
        DSub => Value::Double(lhs.as_double()? - rhs.as_double()?),
        DMul => Value::Double(lhs.as_double()? * rhs.as_double()?),
        DDiv => Value::Double(lhs.as_double()? / rhs.as_double()?),
        DRem => Value::Double(lhs.as_double()? % rhs.as_double()?),

        other => return Err(Error::UnexpectedInstruction(format!("{:?}", other))),
    }))
}

/// Negation
pub fn unary_op(value: Value) -> Result<Value, Error> {
    match value {
        Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
        Value::Long(l) => Ok(Value::Long(l.wrapping_neg())),
        Value::Float(f) => Ok(Value::Float(-f)),
        Value::Double(d) => Ok(Value::Double(-d)),
        found => Err(Error::TypeMismatch {
            expected: "number",
            found,
        }),
    }
}

pub fn shift(shift_type: ShiftType, value: Value, amount: i32) -> Result<Value, Error> {
    match value {
        Value::Int(i) => {
            let amount = (amount & 0x1f) as u32;
            Ok(Value::Int(match shift_type {
                ShiftType::Left => i.wrapping_shl(amount),
                ShiftType::ArithmeticRight => i >> amount,
                ShiftType::LogicalRight => ((i as u32) >> amount) as i32,
            }))
        }
        Value::Long(l) => {
            let amount = (amount & 0x3f) as u32;
            Ok(Value::Long(match shift_type {
                ShiftType::Left => l.wrapping_shl(amount),
                ShiftType::ArithmeticRight => l >> amount,
                ShiftType::LogicalRight => ((l as u64) >> amount) as i64,
            }))
        }
        found => Err(Error::TypeMismatch {
            expected: "int or long",
            found,
        }),
    }
}

/// Primitive conversions
pub fn convert(instruction: &Instruction, value: Value) -> Result<Value, Error> {
    use Instruction::*;
    Ok(match instruction {
        I2L => Value::Long(i64::from(value.as_int()?)),
        I2F => Value::Float(value.as_int()? as f32),
        I2D => Value::Double(f64::from(value.as_int()?)),
        I2B => Value::Int(value.as_int()? as i8 as i32),
        I2C => Value::Int(value.as_int()? as u16 as i32),
        I2S => Value::Int(value.as_int()? as i16 as i32),
        L2I => Value::Int(value.as_long()? as i32),
        L2F => Value::Float(value.as_long()? as f32),
        L2D => Value::Double(value.as_long()? as f64),
        F2I => Value::Int(value.as_float()? as i32),
        F2L => Value::Long(value.as_float()? as i64),
        F2D => Value::Double(f64::from(value.as_float()?)),
        D2I => Value::Int(value.as_double()? as i32),
        D2L => Value::Long(value.as_double()? as i64),
        D2F => Value::Float(value.as_double()? as f32),
        other => return Err(Error::UnexpectedInstruction(format!("{:?}", other))),
    })
}

/// `fcmp`/`dcmp`: -1, 0, or 1 (with the mode deciding what `NaN` compares as)
pub fn compare_floats(mode: CompareMode, lhs: f64, rhs: f64) -> i32 {
    match lhs.partial_cmp(&rhs) {
        Some(ordering) => ordering as i32,
        None => match mode {
            CompareMode::L => -1,
            CompareMode::G => 1,
        },
    }
}
