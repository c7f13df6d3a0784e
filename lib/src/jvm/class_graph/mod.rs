//! In-memory graph of classes and their members
//!
//! Classes, methods, fields, and call site descriptors are all allocated in arenas which outlive
//! the whole model checking run. This means references into the graph are cheap `Copy` handles
//! which can be freely stored inside instructions, heap objects, and caches. See [`RefId`] for how
//! those handles get an identity.

use super::code::{Code, InvokeType};
use super::{
    BinaryName, ClassAccessFlags, Error, FieldAccessFlags, FieldType, MethodAccessFlags,
    MethodDescriptor, Name, RefType, RenderDescriptor, UnqualifiedName,
};
use crate::util::RefId;
use elsa::map::FrozenMap;
use elsa::FrozenVec;
use std::borrow::Cow;
use std::cell::OnceCell;
use std::collections::HashSet;
use std::fmt;
use std::fmt::Debug;
use typed_arena::Arena;

mod assignable;
mod java_classes;
mod java_code;
mod java_lib_types;
mod java_members;

pub use assignable::*;
pub use java_classes::*;
pub use java_lib_types::*;
pub use java_members::*;

pub type ClassId<'g> = RefId<'g, ClassData<'g>>;
pub type MethodId<'g> = RefId<'g, MethodData<'g>>;
pub type FieldId<'g> = RefId<'g, FieldData<'g>>;
pub type BootstrapMethodId<'g> = RefId<'g, BootstrapMethodData<'g>>;
pub type InvokeDynamicId<'g> = RefId<'g, InvokeDynamicData<'g>>;

pub struct ClassGraphArenas<'g> {
    class_arena: Arena<ClassData<'g>>,
    method_arena: Arena<MethodData<'g>>,
    field_arena: Arena<FieldData<'g>>,
    bootstrap_method_arena: Arena<BootstrapMethodData<'g>>,
    invoke_dynamic_arena: Arena<InvokeDynamicData<'g>>,
}

impl<'g> ClassGraphArenas<'g> {
    pub fn new() -> Self {
        ClassGraphArenas {
            class_arena: Arena::new(),
            method_arena: Arena::new(),
            field_arena: Arena::new(),
            bootstrap_method_arena: Arena::new(),
            invoke_dynamic_arena: Arena::new(),
        }
    }
}

impl<'g> Default for ClassGraphArenas<'g> {
    fn default() -> Self {
        ClassGraphArenas::new()
    }
}

/// Tracks the relationships between classes/interfaces and the members on those classes
///
/// This is the metadata the interpreter consumes: static layout of objects, method bodies,
/// exception tables, and the flags (`static`, `synchronized`, `native`, ...) that change how an
/// instruction executes.
pub struct ClassGraph<'g> {
    arenas: &'g ClassGraphArenas<'g>,
    classes: FrozenMap<&'g BinaryName, ClassId<'g>>,
}

impl<'g> ClassGraph<'g> {
    /// New empty graph
    pub fn new(arenas: &'g ClassGraphArenas<'g>) -> Self {
        ClassGraph {
            arenas,
            classes: FrozenMap::new(),
        }
    }

    pub fn lookup_class(&'g self, name: &BinaryName) -> Option<ClassId<'g>> {
        self.classes.get(name).map(RefId)
    }

    /// Like `lookup_class`, but missing classes are an error
    pub fn require_class(&'g self, name: &BinaryName) -> Result<ClassId<'g>, Error> {
        self.lookup_class(name)
            .ok_or_else(|| Error::MissingClass(name.as_str().to_owned()))
    }

    /// Add a new class to the class graph
    pub fn add_class(&self, data: ClassData<'g>) -> ClassId<'g> {
        let data = &*self.arenas.class_arena.alloc(data);
        self.classes.insert(&data.name, RefId(data));
        RefId(data)
    }

    /// Add a field to the class graph and to its class
    pub fn add_field(&self, field: FieldData<'g>) -> FieldId<'g> {
        let data = &*self.arenas.field_arena.alloc(field);
        data.class.0.fields.push(RefId(data));
        RefId(data)
    }

    /// Add a method to the class graph and to its class
    ///
    /// If the class already has a method with the same name, descriptor, and staticness, that
    /// method is returned instead.
    pub fn add_method(&self, method: MethodData<'g>) -> MethodId<'g> {
        let class = method.class;
        if let Some(existing) = class.0.methods.iter().find(|m| {
            m.name == method.name
                && m.descriptor == method.descriptor
                && m.is_static() == method.is_static()
        }) {
            RefId(existing)
        } else {
            let data = &*self.arenas.method_arena.alloc(method);
            class.0.methods.push(RefId(data));
            RefId(data)
        }
    }

    pub fn add_bootstrap_method(
        &self,
        bootstrap_method: BootstrapMethodData<'g>,
    ) -> BootstrapMethodId<'g> {
        RefId(&*self.arenas.bootstrap_method_arena.alloc(bootstrap_method))
    }

    pub fn add_invoke_dynamic(&self, call_site: InvokeDynamicData<'g>) -> InvokeDynamicId<'g> {
        RefId(&*self.arenas.invoke_dynamic_arena.alloc(call_site))
    }

    /// Add standard types to the class graph
    pub fn insert_java_library_types(&self) -> Result<JavaLibrary<'g>, Error> {
        JavaLibrary::add_to_graph(self)
    }
}

pub struct ClassData<'g> {
    /// Name of the class
    pub name: BinaryName,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<ClassId<'g>>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: FrozenVec<ClassId<'g>>,

    pub access_flags: ClassAccessFlags,

    /// Methods
    pub methods: FrozenVec<MethodId<'g>>,

    /// Fields
    pub fields: FrozenVec<FieldId<'g>>,

    /// Record components, in declaration order (empty for everything but records)
    pub record_components: FrozenVec<FieldId<'g>>,
}

impl<'g> ClassData<'g> {
    pub fn new(
        name: BinaryName,
        superclass: ClassId<'g>,
        access_flags: ClassAccessFlags,
    ) -> ClassData<'g> {
        ClassData {
            name,
            superclass: Some(superclass),
            interfaces: FrozenVec::new(),
            access_flags,
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
            record_components: FrozenVec::new(),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::ABSTRACT)
    }
}

impl<'g> ClassId<'g> {
    /// This class, followed by all of its superclasses
    pub fn superclasses(self) -> impl Iterator<Item = ClassId<'g>> {
        std::iter::successors(Some(self), |class| class.0.superclass)
    }

    /// All interfaces this class implements, directly or transitively (no duplicates)
    pub fn all_interfaces(self) -> Vec<ClassId<'g>> {
        let mut found: Vec<ClassId<'g>> = vec![];
        let mut seen: HashSet<ClassId<'g>> = HashSet::new();
        let mut to_visit: Vec<ClassId<'g>> = self.superclasses().collect();
        while let Some(class) = to_visit.pop() {
            for interface in class.0.interfaces.iter() {
                let interface = RefId(interface);
                if seen.insert(interface) {
                    found.push(interface);
                    to_visit.push(interface);
                }
            }
        }
        found
    }

    pub fn is_subclass_of(self, other: ClassId<'g>) -> bool {
        self.superclasses().any(|class| class == other)
    }

    /// Method declared directly on this class
    pub fn declared_method(
        self,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<ClassId<'g>>,
    ) -> Option<MethodId<'g>> {
        self.0
            .methods
            .iter()
            .find(|method| &method.name == name && &method.descriptor == descriptor)
            .map(RefId)
    }

    /// Field declared directly on this class
    pub fn declared_field(self, name: &UnqualifiedName) -> Option<FieldId<'g>> {
        self.0
            .fields
            .iter()
            .find(|field| &field.name == name)
            .map(RefId)
    }

    /// Resolve a method reference, searching superclasses then superinterfaces
    pub fn resolve_method(
        self,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<ClassId<'g>>,
    ) -> Option<MethodId<'g>> {
        self.superclasses()
            .find_map(|class| class.declared_method(name, descriptor))
            .or_else(|| {
                self.all_interfaces()
                    .into_iter()
                    .find_map(|class| class.declared_method(name, descriptor))
            })
    }

    /// Resolve a field reference, searching superclasses then superinterfaces
    pub fn resolve_field(self, name: &UnqualifiedName) -> Option<FieldId<'g>> {
        self.superclasses()
            .find_map(|class| class.declared_field(name))
            .or_else(|| {
                self.all_interfaces()
                    .into_iter()
                    .find_map(|class| class.declared_field(name))
            })
    }

    /// Select the implementation of `method` for a receiver whose runtime class is `self`
    ///
    /// Superclasses are searched first. If none declares the method, a default method from one
    /// of the interfaces is used, falling back to an abstract interface declaration (so that the
    /// caller can raise `AbstractMethodError` instead of `NoSuchMethodError`).
    pub fn select_method(self, method: MethodId<'g>) -> Option<MethodId<'g>> {
        let name = &method.0.name;
        let descriptor = &method.0.descriptor;
        if let Some(found) = self.superclasses().find_map(|class| {
            class
                .declared_method(name, descriptor)
                .filter(|candidate| !candidate.0.is_static())
        }) {
            return Some(found);
        }

        let candidates: Vec<MethodId<'g>> = self
            .all_interfaces()
            .into_iter()
            .filter_map(|interface| interface.declared_method(name, descriptor))
            .filter(|candidate| !candidate.0.is_static())
            .collect();
        candidates
            .iter()
            .copied()
            .find(|candidate| !candidate.0.is_abstract())
            .or_else(|| candidates.first().copied())
    }

    /// Non-static fields, in layout order (superclass fields first)
    pub fn instance_fields(self) -> Vec<FieldId<'g>> {
        let mut chain: Vec<ClassId<'g>> = self.superclasses().collect();
        chain.reverse();
        chain
            .into_iter()
            .flat_map(|class| class.0.fields.iter().map(RefId).collect::<Vec<_>>())
            .filter(|field| !field.0.is_static())
            .collect()
    }

    /// Static fields declared on this class
    pub fn static_fields(self) -> Vec<FieldId<'g>> {
        self.0
            .fields
            .iter()
            .map(RefId)
            .filter(|field| field.0.is_static())
            .collect()
    }

    /// The static initializer, if there is one
    pub fn class_initializer(self) -> Option<MethodId<'g>> {
        self.0
            .methods
            .iter()
            .find(|method| method.name == UnqualifiedName::CLINIT && method.is_static())
            .map(RefId)
    }

    pub fn is_throwable(self) -> bool {
        self.superclasses()
            .any(|class| class.0.name == BinaryName::THROWABLE)
    }
}

impl<'g> PartialEq for ClassData<'g> {
    fn eq(&self, other: &ClassData<'g>) -> bool {
        self.name == other.name
    }
}

impl<'g> Eq for ClassData<'g> {}

impl<'g> RenderDescriptor for ClassData<'g> {
    fn render_to(&self, write_to: &mut String) {
        self.name.render_to(write_to)
    }
}

impl<'g> Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

pub struct MethodData<'g> {
    /// Class
    pub class: ClassId<'g>,

    /// Name of the method
    pub name: UnqualifiedName,

    /// Type of the method
    pub descriptor: MethodDescriptor<ClassId<'g>>,

    pub access_flags: MethodAccessFlags,

    /// Body of the method (set at most once, never for abstract or native methods)
    pub code: OnceCell<Code<'g>>,
}

impl<'g> Debug for MethodData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.0.name.as_str(),
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}

impl<'g> MethodData<'g> {
    pub fn new(
        class: ClassId<'g>,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<ClassId<'g>>,
        access_flags: MethodAccessFlags,
    ) -> MethodData<'g> {
        MethodData {
            class,
            name,
            descriptor,
            access_flags,
            code: OnceCell::new(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_synchronized(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::SYNCHRONIZED)
    }

    pub fn is_native(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::ABSTRACT)
    }

    pub fn is_init(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }

    pub fn is_clinit(&self) -> bool {
        self.name == UnqualifiedName::CLINIT
    }

    /// Size of the arguments (including the receiver) in operand stack words
    pub fn argument_words(&self) -> usize {
        self.descriptor.argument_words(!self.is_static())
    }

    /// Number of operand stack entries the arguments take (including the receiver)
    pub fn argument_entries(&self) -> usize {
        self.descriptor.parameters.len() + if self.is_static() { 0 } else { 1 }
    }

    /// With the exception of `invokespecial` vs. `invokevirtual`, there is usually only one valid
    /// way to invoke a method. This function finds it.
    pub fn infer_invoke_type(&self) -> InvokeType {
        if self.is_static() {
            InvokeType::Static
        } else if self.name.is_initializer() {
            InvokeType::Special
        } else if self.class.0.is_interface() {
            let n = self.descriptor.argument_words(true) as u8;
            InvokeType::Interface(n)
        } else {
            InvokeType::Virtual
        }
    }

    pub fn code(&self) -> Option<&Code<'g>> {
        self.code.get()
    }
}

impl<'g> MethodId<'g> {
    /// Body of the method, with the lifetime of the class graph
    pub fn body(self) -> Option<&'g Code<'g>> {
        self.0.code.get()
    }

    /// Attach a body to the method
    pub fn set_code(self, code: Code<'g>) -> Result<(), Error> {
        self.0
            .code
            .set(code)
            .map_err(|_| Error::CodeAlreadySet(format!("{:?}", self.0)))
    }
}

pub struct FieldData<'g> {
    /// Class
    ///
    /// Note: this is a pointer back to the class (so don't derive `Debug`)
    pub class: ClassId<'g>,

    /// Name of the field
    pub name: UnqualifiedName,

    /// Type of the field
    pub descriptor: FieldType<ClassId<'g>>,

    pub access_flags: FieldAccessFlags,
}

impl<'g> FieldData<'g> {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::STATIC)
    }

    pub fn is_final(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::FINAL)
    }

    pub fn is_volatile(&self) -> bool {
        self.access_flags.contains(FieldAccessFlags::VOLATILE)
    }
}

impl<'g> Debug for FieldData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}.{}:{}",
            self.class.0.name.as_str(),
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}

pub struct InvokeDynamicData<'g> {
    /// Name of the dynamically invoked method
    pub name: UnqualifiedName,

    /// Type of the dynamically invoked method
    pub descriptor: MethodDescriptor<ClassId<'g>>,

    /// Bootstrap method
    pub bootstrap: BootstrapMethodId<'g>,
}

impl<'g> Debug for InvokeDynamicData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "[{:?}]{}:{}",
            self.bootstrap,
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}

pub struct BootstrapMethodData<'g> {
    /// Bootstrap method
    ///
    /// This must be a static method.
    pub method: MethodId<'g>,

    /// Boostrap arguments
    pub arguments: Vec<ConstantData<'g>>,
}

impl<'g> Debug for BootstrapMethodData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tuple = f.debug_tuple(&format!(
            "{}.{}",
            self.method.0.class.0.name.as_str(),
            self.method.0.name.as_str(),
        ));
        for argument in &self.arguments {
            tuple.field(argument);
        }
        tuple.finish()
    }
}

#[derive(PartialEq, Clone)]
pub enum ConstantData<'g> {
    String(Cow<'static, str>),
    Class(RefType<ClassId<'g>>),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    MethodType(MethodDescriptor<ClassId<'g>>),
    FieldGetterHandle(FieldId<'g>),
    FieldSetterHandle(FieldId<'g>),
    MethodHandle(MethodId<'g>),
}

impl<'g> Debug for ConstantData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantData::String(string) => string.fmt(f),
            ConstantData::Class(ref_type) => ref_type.fmt(f),
            ConstantData::Integer(integer) => integer.fmt(f),
            ConstantData::Long(long) => long.fmt(f),
            ConstantData::Float(float) => float.fmt(f),
            ConstantData::Double(double) => double.fmt(f),
            ConstantData::MethodType(descriptor) => f.write_str(&descriptor.render()),
            ConstantData::FieldGetterHandle(field) => field.fmt(f),
            ConstantData::FieldSetterHandle(field) => field.fmt(f),
            ConstantData::MethodHandle(method) => method.fmt(f),
        }
    }
}
