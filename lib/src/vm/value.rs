use super::Error;
use crate::jvm::{BaseType, FieldType};
use crate::util::Width;
use std::fmt;
use std::rc::Rc;

/// Reference to an element on the heap
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ObjRef(pub u32);

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Guest thread identifier (index into the thread list)
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ThreadId(pub usize);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Runtime value
///
/// `boolean`, `byte`, `char`, and `short` are all represented as `Int` (same as on the operand
/// stack of a real JVM). Values are narrowed when they are stored into arrays or fields.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Ref(ObjRef),
    Null,
}

impl Width for Value {
    fn width(&self) -> usize {
        match self {
            Value::Long(_) | Value::Double(_) => 2,
            _ => 1,
        }
    }
}

impl Value {
    /// Initial value of a field or array element of the given type
    pub fn default_for<C>(field_type: &FieldType<C>) -> Value {
        match field_type {
            FieldType::Base(BaseType::Long) => Value::Long(0),
            FieldType::Base(BaseType::Float) => Value::Float(0.0),
            FieldType::Base(BaseType::Double) => Value::Double(0.0),
            FieldType::Base(_) => Value::Int(0),
            FieldType::Ref(_) => Value::Null,
        }
    }

    /// Truncate an `int` to fit into a narrower field or array element
    pub fn narrow_to<C>(self, field_type: &FieldType<C>) -> Value {
        match (self, field_type) {
            (Value::Int(i), FieldType::Base(BaseType::Boolean)) => Value::Int(i & 1),
            (Value::Int(i), FieldType::Base(BaseType::Byte)) => Value::Int(i as i8 as i32),
            (Value::Int(i), FieldType::Base(BaseType::Char)) => Value::Int(i as u16 as i32),
            (Value::Int(i), FieldType::Base(BaseType::Short)) => Value::Int(i as i16 as i32),
            (other, _) => other,
        }
    }

    pub fn from_reference(reference: Option<ObjRef>) -> Value {
        reference.map_or(Value::Null, Value::Ref)
    }

    pub fn as_int(self) -> Result<i32, Error> {
        match self {
            Value::Int(i) => Ok(i),
            found => Err(Error::TypeMismatch {
                expected: "int",
                found,
            }),
        }
    }

    pub fn as_long(self) -> Result<i64, Error> {
        match self {
            Value::Long(l) => Ok(l),
            found => Err(Error::TypeMismatch {
                expected: "long",
                found,
            }),
        }
    }

    pub fn as_float(self) -> Result<f32, Error> {
        match self {
            Value::Float(f) => Ok(f),
            found => Err(Error::TypeMismatch {
                expected: "float",
                found,
            }),
        }
    }

    pub fn as_double(self) -> Result<f64, Error> {
        match self {
            Value::Double(d) => Ok(d),
            found => Err(Error::TypeMismatch {
                expected: "double",
                found,
            }),
        }
    }

    /// Reference, where `null` is `None`
    pub fn as_reference(self) -> Result<Option<ObjRef>, Error> {
        match self {
            Value::Ref(r) => Ok(Some(r)),
            Value::Null => Ok(None),
            found => Err(Error::TypeMismatch {
                expected: "reference",
                found,
            }),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Identity comparison (floats are compared bitwise, so `NaN` is the same as itself)
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(f1), Value::Float(f2)) => f1.to_bits() == f2.to_bits(),
            (Value::Double(d1), Value::Double(d2)) => d1.to_bits() == d2.to_bits(),
            _ => self == other,
        }
    }
}

/// Side-channel attribute attached to a value
///
/// Attributes are opaque to the interpreter: they are just carried along with values as they get
/// copied between locals, operands, fields, and array elements.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Attr(pub Rc<str>);

impl Attr {
    pub fn new(label: &str) -> Attr {
        Attr(Rc::from(label))
    }
}

/// Value along with its attribute
#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
    pub value: Value,
    pub attr: Option<Attr>,
}

impl Slot {
    pub fn new(value: Value) -> Slot {
        Slot { value, attr: None }
    }

    pub fn with_attr(value: Value, attr: Option<Attr>) -> Slot {
        Slot { value, attr }
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Slot {
        Slot::new(value)
    }
}

impl Width for Slot {
    fn width(&self) -> usize {
        self.value.width()
    }
}
