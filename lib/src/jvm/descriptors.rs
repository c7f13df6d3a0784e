//! Field and method types
//!
//! Types are parametrized over the representation of classes: [`BinaryName`] when only names are
//! known and `ClassId` once classes live in the class graph. Long and double values take two
//! words of operand stack (or locals), everything else takes one.

use super::{BinaryName, Name};
use crate::util::{RefId, Width};

/// Render a type in the JVM descriptor syntax (eg. `[Ljava/lang/String;` or `(IJ)V`)
///
/// Used for diagnostics and when naming array classes.
pub trait RenderDescriptor {
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    fn render_to(&self, write_to: &mut String);
}

impl<'g, T: RenderDescriptor> RenderDescriptor for RefId<'g, T> {
    fn render_to(&self, write_to: &mut String) {
        self.0.render_to(write_to)
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

/// `atype` operands of `newarray`, in order starting from 4
const NEWARRAY_TYPES: [BaseType; 8] = [
    BaseType::Boolean,
    BaseType::Char,
    BaseType::Float,
    BaseType::Double,
    BaseType::Byte,
    BaseType::Short,
    BaseType::Int,
    BaseType::Long,
];

impl BaseType {
    /// Decode the `atype` operand of `newarray`
    pub fn from_array_type_code(code: u8) -> Option<BaseType> {
        let index = usize::from(code).checked_sub(4)?;
        NEWARRAY_TYPES.get(index).copied()
    }

    /// Encode as the `atype` operand of `newarray`
    pub fn array_type_code(&self) -> u8 {
        let index = NEWARRAY_TYPES
            .iter()
            .position(|base_type| base_type == self)
            .unwrap_or(0);
        index as u8 + 4
    }

    pub fn descriptor_char(&self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        write_to.push(self.descriptor_char());
    }
}

/// Type of a heap element: an object of some class or an array
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType<Class> {
    Object(Class),
    ObjectArray(ArrayType<Class>),
    PrimitiveArray(ArrayType<BaseType>),
}

/// Array type, stored as its innermost element type and a dimension count
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// `A[]` has 0 additional dimensions, `A[][][]` has 2
    pub additional_dimensions: usize,

    /// `A` for `A[][]`
    pub element_type: T,
}

impl<T> ArrayType<T> {
    /// Array type one dimension shallower, if there is one
    fn shallower(&self) -> Option<ArrayType<T>>
    where
        T: Clone,
    {
        let additional_dimensions = self.additional_dimensions.checked_sub(1)?;
        Some(ArrayType {
            additional_dimensions,
            element_type: self.element_type.clone(),
        })
    }

    fn deeper(self) -> ArrayType<T> {
        ArrayType {
            additional_dimensions: self.additional_dimensions + 1,
            element_type: self.element_type,
        }
    }
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        for _ in 0..=self.additional_dimensions {
            write_to.push('[');
        }
        self.element_type.render_to(write_to);
    }
}

impl<C: RenderDescriptor> RenderDescriptor for RefType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(class) => class.render_to(write_to),
            RefType::PrimitiveArray(array) => array.render_to(write_to),
            RefType::ObjectArray(array) => array.render_to(write_to),
        }
    }
}

impl<C: Clone> RefType<C> {
    /// Type of the elements of an array type (`None` for non-array types)
    ///
    /// This is what `aaload` produces and what `aastore` checks stored values against.
    pub fn component_type(&self) -> Option<FieldType<C>> {
        Some(match self {
            RefType::Object(_) => return None,
            RefType::PrimitiveArray(array) => match array.shallower() {
                None => FieldType::Base(array.element_type),
                Some(inner) => FieldType::Ref(RefType::PrimitiveArray(inner)),
            },
            RefType::ObjectArray(array) => match array.shallower() {
                None => FieldType::object(array.element_type.clone()),
                Some(inner) => FieldType::Ref(RefType::ObjectArray(inner)),
            },
        })
    }

    /// Array type whose elements have the given type
    pub fn array(component: FieldType<C>) -> RefType<C> {
        fn innermost<T>(element_type: T) -> ArrayType<T> {
            ArrayType {
                additional_dimensions: 0,
                element_type,
            }
        }
        match component {
            FieldType::Base(base_type) => RefType::PrimitiveArray(innermost(base_type)),
            FieldType::Ref(RefType::Object(class)) => RefType::ObjectArray(innermost(class)),
            FieldType::Ref(RefType::PrimitiveArray(array)) => {
                RefType::PrimitiveArray(array.deeper())
            }
            FieldType::Ref(RefType::ObjectArray(array)) => RefType::ObjectArray(array.deeper()),
        }
    }
}

impl<C> RefType<C> {
    pub fn is_array(&self) -> bool {
        !matches!(self, RefType::Object(_))
    }
}

/// Type of a field, array element, local variable, or operand stack entry
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<Class> {
    Base(BaseType),
    Ref(RefType<Class>),
}

impl<C> Width for FieldType<C> {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl<C: Clone> FieldType<C> {
    pub fn array(component: FieldType<C>) -> FieldType<C> {
        FieldType::Ref(RefType::array(component))
    }
}

impl<C> FieldType<C> {
    pub const fn object(class: C) -> FieldType<C> {
        FieldType::Ref(RefType::Object(class))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Ref(_))
    }

    pub const fn int() -> FieldType<C> {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType<C> {
        FieldType::Base(BaseType::Long)
    }

    pub const fn float() -> FieldType<C> {
        FieldType::Base(BaseType::Float)
    }

    pub const fn double() -> FieldType<C> {
        FieldType::Base(BaseType::Double)
    }

    pub const fn char() -> FieldType<C> {
        FieldType::Base(BaseType::Char)
    }

    pub const fn short() -> FieldType<C> {
        FieldType::Base(BaseType::Short)
    }

    pub const fn byte() -> FieldType<C> {
        FieldType::Base(BaseType::Byte)
    }

    pub const fn boolean() -> FieldType<C> {
        FieldType::Base(BaseType::Boolean)
    }
}

impl<C: RenderDescriptor> RenderDescriptor for FieldType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(ref_type) => ref_type.render_to(write_to),
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor<Class> {
    pub parameters: Vec<FieldType<Class>>,

    /// `None` for `void`
    pub return_type: Option<FieldType<Class>>,
}

impl<C> MethodDescriptor<C> {
    /// Words of operand stack the arguments take up when calling the method
    ///
    /// This is also the number of local variable slots the arguments occupy in the callee.
    pub fn argument_words(&self, has_receiver: bool) -> usize {
        let parameters: usize = self.parameters.iter().map(Width::width).sum();
        parameters + usize::from(has_receiver)
    }
}

impl<C: RenderDescriptor> RenderDescriptor for MethodDescriptor<C> {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(return_type) => return_type.render_to(write_to),
        };
    }
}
