//! `invokedynamic` call sites
//!
//! Bootstrap methods are never run. The two bootstraps `javac` emits for the features we support
//! are recognized by identity and interpreted directly:
//!
//!   - `LambdaMetafactory.metafactory` produces a function object, which remembers the
//!     implementation method and the captured values
//!
//!   - `ObjectMethods.bootstrap` implements `equals`, `hashCode`, and `toString` of records from
//!     the component getters passed as static arguments

use super::intrinsics::string_hash;
use super::{java_type_name, ExecResult};
use crate::jvm::class_graph::{ClassId, ConstantData, FieldId, InvokeDynamicId, MethodId};
use crate::jvm::{BaseType, FieldType, Name, RefType};
use crate::vm::{ElementInfo, ElementKind, Error, FunctionObject, ObjRef, Slot, ThreadId, Value, Vm};
use std::rc::Rc;

impl<'g> Vm<'g> {
    pub(super) fn execute_invoke_dynamic(
        &mut self,
        thread: ThreadId,
        call_site: InvokeDynamicId<'g>,
    ) -> Result<ExecResult<'g>, Error> {
        let bootstrap = call_site.0.bootstrap;
        let bootstrap_method = bootstrap.0.method;
        let metafactory = self.java.members.lang.invoke.metafactory;
        let object_methods = self.java.members.lang.runtime.object_methods_bootstrap;

        if bootstrap_method == metafactory {
            self.metafactory(thread, call_site)
        } else if bootstrap_method == object_methods {
            let getters: Vec<FieldId<'g>> = bootstrap
                .0
                .arguments
                .iter()
                .filter_map(|argument| match argument {
                    ConstantData::FieldGetterHandle(field) => Some(*field),
                    _ => None,
                })
                .collect();
            match call_site.0.name.as_str() {
                "equals" => self.record_equals(thread, &getters),
                "hashCode" => self.record_hash_code(thread, &getters),
                "toString" => self.record_to_string(thread, &getters),
                other => Err(Error::UnsupportedNative(format!(
                    "ObjectMethods.bootstrap for {}",
                    other
                ))),
            }
        } else {
            Err(Error::UnsupportedNative(format!(
                "bootstrap method {:?}",
                bootstrap_method.0
            )))
        }
    }

    /// Replace the call site arguments on the stack with the result
    fn complete_call_site(
        &mut self,
        thread: ThreadId,
        popped: usize,
        result: Value,
    ) -> Result<ExecResult<'g>, Error> {
        let frame = self.frame_mut(thread)?;
        frame.drop_entries(popped)?;
        frame.push_value(result);
        Ok(ExecResult::Continue(frame.pc + 1))
    }

    /// Create (or reuse) the function object for a lambda or method reference
    ///
    /// The call site descriptor takes the captured values and returns the functional interface.
    /// The implementation method is the second static argument.
    fn metafactory(
        &mut self,
        thread: ThreadId,
        call_site: InvokeDynamicId<'g>,
    ) -> Result<ExecResult<'g>, Error> {
        let captured_count = call_site.0.descriptor.parameters.len();
        let interface = match call_site.0.descriptor.return_type {
            Some(FieldType::Ref(RefType::Object(interface))) => interface,
            _ => {
                return Err(Error::UnexpectedInstruction(format!(
                    "lambda call site {:?}",
                    call_site.0
                )))
            }
        };
        let implementation: MethodId<'g> = match call_site.0.bootstrap.0.arguments.get(1) {
            Some(ConstantData::MethodHandle(method)) => *method,
            _ => {
                return Err(Error::UnexpectedInstruction(format!(
                    "lambda call site {:?}",
                    call_site.0
                )))
            }
        };

        let frame = self.frame(thread)?;
        let captured = frame.top_entries(captured_count)?;
        let site_key = (frame.method, frame.pc);

        // The same call site with the same captured values gives back the same object
        if let Some(cached) = self.transients.functions.get(&site_key) {
            if let Ok(element) = self.state.heap.get(*cached) {
                if let ElementKind::Function(function) = &element.kind {
                    let same = function.implementation == implementation
                        && function.captured.len() == captured.len()
                        && function
                            .captured
                            .iter()
                            .zip(&captured)
                            .all(|(old, new)| old.value.same_as(&new.value));
                    if same {
                        let cached = *cached;
                        return self.complete_call_site(thread, captured_count, Value::Ref(cached));
                    }
                }
            }
        }

        let function = FunctionObject {
            interface,
            name: call_site.0.name.clone(),
            implementation,
            captured,
        };
        let element = ElementInfo::new(
            RefType::Object(interface),
            ElementKind::Function(function),
            thread,
        );
        let object = match self.state.heap.allocate(element, false) {
            Some(object) => object,
            None => return Ok(self.out_of_memory()),
        };
        log::debug!("function object {} for {:?}", object, implementation.0);
        self.transients.functions.insert(site_key, object);
        self.complete_call_site(thread, captured_count, Value::Ref(object))
    }

    /// Values of the record components of an object
    fn record_components(
        &self,
        record: ObjRef,
        getters: &[FieldId<'g>],
    ) -> Result<Vec<Slot>, Error> {
        let element = self.state.heap.get(record)?;
        getters
            .iter()
            .map(|field| {
                element.field(*field).cloned().ok_or(Error::UnexpectedElement {
                    reference: record,
                    expected: "record with component fields",
                })
            })
            .collect()
    }

    fn string_contents(&self, value: Value) -> Option<Rc<str>> {
        match value {
            Value::Ref(object) => self.state.heap.get(object).ok()?.string_value().cloned(),
            _ => None,
        }
    }

    /// Component equality: primitives by value, strings by contents, other objects by identity
    fn components_equal(&self, lhs: Value, rhs: Value) -> bool {
        if lhs.same_as(&rhs) {
            return true;
        }
        match (self.string_contents(lhs), self.string_contents(rhs)) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => false,
        }
    }

    fn record_equals(
        &mut self,
        thread: ThreadId,
        getters: &[FieldId<'g>],
    ) -> Result<ExecResult<'g>, Error> {
        let frame = self.frame(thread)?;
        let other = frame.peek_reference(0)?;
        let this = match frame.peek_reference(1)? {
            Some(this) => this,
            None => return Ok(self.null_pointer("Cannot invoke \"equals\" because value is null")),
        };

        let equal = match other {
            None => false,
            Some(other) if other == this => true,
            Some(other) => {
                let this_type = self.state.heap.get(this)?.ty;
                let other_type = self.state.heap.get(other)?.ty;
                this_type == other_type && {
                    let lhs = self.record_components(this, getters)?;
                    let rhs = self.record_components(other, getters)?;
                    lhs.iter()
                        .zip(&rhs)
                        .all(|(lhs, rhs)| self.components_equal(lhs.value, rhs.value))
                }
            }
        };
        self.complete_call_site(thread, 2, Value::Int(i32::from(equal)))
    }

    fn record_hash_code(
        &mut self,
        thread: ThreadId,
        getters: &[FieldId<'g>],
    ) -> Result<ExecResult<'g>, Error> {
        let this = match self.frame(thread)?.peek_reference(0)? {
            Some(this) => this,
            None => {
                return Ok(self.null_pointer("Cannot invoke \"hashCode\" because value is null"))
            }
        };
        let components = self.record_components(this, getters)?;
        let hash = getters
            .iter()
            .zip(&components)
            .fold(0i32, |hash, (field, component)| {
                hash.wrapping_mul(31)
                    .wrapping_add(self.component_hash(&field.0.descriptor, component.value))
            });
        self.complete_call_site(thread, 1, Value::Int(hash))
    }

    /// Hash of one component, the way the boxed type would compute it
    fn component_hash(&self, descriptor: &FieldType<ClassId<'g>>, value: Value) -> i32 {
        match value {
            Value::Null => 0,
            Value::Ref(object) => match self.string_contents(value) {
                Some(string) => string_hash(&string),
                None => object.0 as i32,
            },
            primitive => primitive_hash(descriptor, primitive),
        }
    }

    fn record_to_string(
        &mut self,
        thread: ThreadId,
        getters: &[FieldId<'g>],
    ) -> Result<ExecResult<'g>, Error> {
        let this = match self.frame(thread)?.peek_reference(0)? {
            Some(this) => this,
            None => {
                return Ok(self.null_pointer("Cannot invoke \"toString\" because value is null"))
            }
        };
        let class = self
            .state
            .heap
            .get(this)?
            .class()
            .ok_or(Error::UnexpectedElement {
                reference: this,
                expected: "record",
            })?;
        let components = self.record_components(this, getters)?;

        let rendered: Vec<String> = getters
            .iter()
            .zip(&components)
            .map(|(field, component)| {
                format!(
                    "{}={}",
                    field.0.name,
                    self.render_component(&field.0.descriptor, component.value)
                )
            })
            .collect();
        let string = format!("{}[{}]", simple_name(class), rendered.join(", "));

        let string_class = self.java.classes.lang.string;
        match self
            .state
            .heap
            .new_string(string_class, Rc::from(string), thread)
        {
            Some(string) => self.complete_call_site(thread, 1, Value::Ref(string)),
            None => Ok(self.out_of_memory()),
        }
    }

    /// What `String.valueOf` would give for a component
    fn render_component(&self, descriptor: &FieldType<ClassId<'g>>, value: Value) -> String {
        match (descriptor, value) {
            (FieldType::Base(BaseType::Boolean), Value::Int(i)) => (i != 0).to_string(),
            (FieldType::Base(BaseType::Char), Value::Int(i)) => char::from_u32(i as u32)
                .map_or_else(|| i.to_string(), |c| c.to_string()),
            (_, Value::Int(i)) => i.to_string(),
            (_, Value::Long(l)) => l.to_string(),
            (_, Value::Float(f)) => java_floating_string(f64::from(f), &format!("{:e}", f)),
            (_, Value::Double(d)) => java_floating_string(d, &format!("{:e}", d)),
            (_, Value::Null) => String::from("null"),
            (_, Value::Ref(object)) => match self.string_contents(value) {
                Some(string) => string.to_string(),
                None => {
                    let type_name = match self.state.heap.get(object) {
                        Ok(element) => java_type_name(&element.ty),
                        Err(_) => String::from("?"),
                    };
                    format!("{}@{:x}", type_name, object.0)
                }
            },
        }
    }
}

/// Class name without its package (or enclosing classes)
fn simple_name<'g>(class: ClassId<'g>) -> &'g str {
    let name = class.0.name.as_str();
    let name = name.rsplit('/').next().unwrap_or(name);
    name.rsplit('$').next().unwrap_or(name)
}

/// `hashCode` of the boxed version of a primitive value
fn primitive_hash<C>(descriptor: &FieldType<C>, value: Value) -> i32 {
    match (descriptor, value) {
        (FieldType::Base(BaseType::Boolean), Value::Int(0)) => 1237,
        (FieldType::Base(BaseType::Boolean), Value::Int(_)) => 1231,
        (_, Value::Int(i)) => i,
        (_, Value::Long(l)) => (l ^ ((l as u64) >> 32) as i64) as i32,
        (_, Value::Float(f)) => {
            let f = if f.is_nan() { f32::NAN } else { f };
            f.to_bits() as i32
        }
        (_, Value::Double(d)) => {
            let d = if d.is_nan() { f64::NAN } else { d };
            let bits = d.to_bits();
            (bits ^ (bits >> 32)) as i32
        }
        (_, Value::Null) | (_, Value::Ref(_)) => 0,
    }
}

/// What `Double.toString` (or `Float.toString`) renders, given the shortest digits that
/// round-trip in Rust's `{:e}` format
///
/// Magnitudes in `[10^-3, 10^7)` are plain decimals, everything else is `d.dddE<n>`. There is
/// always at least one digit after the point.
fn java_floating_string(value: f64, scientific: &str) -> String {
    if value.is_nan() {
        return String::from("NaN");
    }
    if value.is_infinite() {
        return String::from(if value > 0.0 { "Infinity" } else { "-Infinity" });
    }
    if value == 0.0 {
        return String::from(if value.is_sign_negative() { "-0.0" } else { "0.0" });
    }

    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(mantissa) => ("-", mantissa),
        None => ("", mantissa),
    };
    let mut digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if !(1e-3..1e7).contains(&value.abs()) {
        let rest = digits.split_off(1);
        let rest = if rest.is_empty() { String::from("0") } else { rest };
        return format!("{}{}.{}E{}", sign, digits, rest, exponent);
    }

    let (integer, fraction) = if exponent >= 0 {
        let point = exponent as usize + 1;
        if digits.len() > point {
            let fraction = digits.split_off(point);
            (digits, fraction)
        } else {
            let padding = "0".repeat(point - digits.len());
            (digits + &padding, String::new())
        }
    } else {
        let leading = "0".repeat((-exponent - 1) as usize);
        (String::from("0"), leading + &digits)
    };
    let fraction = if fraction.is_empty() { String::from("0") } else { fraction };
    format!("{}{}.{}", sign, integer, fraction)
}
