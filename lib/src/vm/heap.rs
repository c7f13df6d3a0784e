use super::{
    ElementFlags, ElementInfo, ElementKind, Error, InitStatus, ObjRef, Slot, ThreadId, Value,
};
use crate::jvm::class_graph::ClassId;
use crate::jvm::{FieldType, RefType};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Copy-on-write heap
///
/// Elements are reference counted so that cloning the heap (which happens every time the search
/// saves a state) is cheap. Reading an element never copies it, and mutating an element only
/// copies it if some saved state still shares it.
#[derive(Clone, Debug)]
pub struct Heap<'g> {
    elements: Vec<Rc<ElementInfo<'g>>>,

    /// `java/lang/Class` objects (holding the static fields) of every class which has one
    statics: BTreeMap<ClassId<'g>, ObjRef>,

    /// Interned string literals
    strings: HashMap<Rc<str>, ObjRef>,

    /// Maximum number of elements
    limit: usize,

    /// Maximum length of a single array
    max_array_length: usize,
}

impl<'g> Heap<'g> {
    pub fn new(limit: usize) -> Heap<'g> {
        Heap {
            elements: vec![],
            statics: BTreeMap::new(),
            strings: HashMap::new(),
            limit,
            max_array_length: usize::MAX,
        }
    }

    pub fn with_max_array_length(mut self, max_array_length: usize) -> Heap<'g> {
        self.max_array_length = max_array_length;
        self
    }

    /// Number of elements allocated so far
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, reference: ObjRef) -> Result<&ElementInfo<'g>, Error> {
        self.elements
            .get(reference.0 as usize)
            .map(|element| &**element)
            .ok_or(Error::UnknownReference(reference))
    }

    /// Modifiable instance of an element (copying it first if it is shared with a saved state)
    pub fn get_mut(&mut self, reference: ObjRef) -> Result<&mut ElementInfo<'g>, Error> {
        self.elements
            .get_mut(reference.0 as usize)
            .map(Rc::make_mut)
            .ok_or(Error::UnknownReference(reference))
    }

    /// Add a new element, returning `None` if the heap is full
    ///
    /// Forced allocations ignore the limit (they are for things the VM itself needs, like the
    /// exception object reporting that the heap is full).
    pub fn allocate(&mut self, element: ElementInfo<'g>, force: bool) -> Option<ObjRef> {
        if !force && self.elements.len() >= self.limit {
            return None;
        }
        let reference = ObjRef(u32::try_from(self.elements.len()).ok()?);
        self.elements.push(Rc::new(element));
        Some(reference)
    }

    /// Allocate an instance of a class, with all fields at their default value
    pub fn new_object(
        &mut self,
        class: ClassId<'g>,
        thread: ThreadId,
        force: bool,
    ) -> Option<ObjRef> {
        let fields = class
            .instance_fields()
            .into_iter()
            .map(|field| (field, Slot::new(Value::default_for(&field.0.descriptor))))
            .collect();
        let element = ElementInfo::new(
            RefType::Object(class),
            ElementKind::Object { fields },
            thread,
        );
        self.allocate(element, force)
    }

    /// Allocate an array, with all elements at their default value
    ///
    /// Returns `None` if the heap is full, the array is too long, or the host can't provide the
    /// memory for it.
    pub fn new_array(
        &mut self,
        element_type: FieldType<ClassId<'g>>,
        length: usize,
        thread: ThreadId,
    ) -> Option<ObjRef> {
        if length > self.max_array_length || self.elements.len() >= self.limit {
            return None;
        }
        let mut elements = Vec::new();
        elements.try_reserve_exact(length).ok()?;
        elements.resize(length, Slot::new(Value::default_for(&element_type)));
        let element = ElementInfo::new(
            RefType::array(element_type),
            ElementKind::Array { elements },
            thread,
        );
        self.allocate(element, false)
    }

    /// Allocate an immutable string
    pub fn new_string(
        &mut self,
        string_class: ClassId<'g>,
        value: Rc<str>,
        thread: ThreadId,
    ) -> Option<ObjRef> {
        let mut element = ElementInfo::new(
            RefType::Object(string_class),
            ElementKind::String(value),
            thread,
        );
        element.flags.insert(ElementFlags::IMMUTABLE);
        self.allocate(element, false)
    }

    /// Get (or allocate) the interned string for a literal
    pub fn intern_string(
        &mut self,
        string_class: ClassId<'g>,
        value: &str,
        thread: ThreadId,
    ) -> Option<ObjRef> {
        if let Some(reference) = self.strings.get(value) {
            return Some(*reference);
        }
        let value: Rc<str> = Rc::from(value);
        let reference = self.new_string(string_class, value.clone(), thread)?;
        self.strings.insert(value, reference);
        Some(reference)
    }

    /// Class object of an already loaded class
    pub fn statics(&self, class: ClassId<'g>) -> Option<ObjRef> {
        self.statics.get(&class).copied()
    }

    /// Class object of a class, allocating it (in the uninitialized state) if needed
    ///
    /// Class objects are always exposed, since any thread can reach them.
    pub fn class_object(
        &mut self,
        class: ClassId<'g>,
        class_class: ClassId<'g>,
        thread: ThreadId,
    ) -> Option<ObjRef> {
        if let Some(reference) = self.statics(class) {
            return Some(reference);
        }
        let fields = class
            .static_fields()
            .into_iter()
            .map(|field| (field, Slot::new(Value::default_for(&field.0.descriptor))))
            .collect();
        let mut element = ElementInfo::new(
            RefType::Object(class_class),
            ElementKind::Statics {
                class,
                fields,
                init: InitStatus::NotInitialized,
            },
            thread,
        );
        element.flags.insert(ElementFlags::EXPOSED);
        let reference = self.allocate(element, true)?;
        self.statics.insert(class, reference);
        Some(reference)
    }

    /// All references, in allocation order
    pub fn references(&self) -> impl Iterator<Item = ObjRef> {
        (0..self.elements.len() as u32).map(ObjRef)
    }

    /// Do two heaps share the same (unmodified) copy of an element?
    pub fn shares_element(&self, other: &Heap<'g>, reference: ObjRef) -> bool {
        match (
            self.elements.get(reference.0 as usize),
            other.elements.get(reference.0 as usize),
        ) {
            (Some(e1), Some(e2)) => Rc::ptr_eq(e1, e2),
            _ => false,
        }
    }
}
