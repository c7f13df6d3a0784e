use super::scheduler::FieldLockInfo;
use super::{Error, ObjRef, Slot, ThreadId};
use crate::jvm::class_graph::{ClassId, FieldId, MethodId};
use crate::jvm::{RefType, UnqualifiedName};
use bitflags::bitflags;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

bitflags! {
    /// Sharedness and lifecycle flags of a heap element
    pub struct ElementFlags: u8 {
        /// Reachable from more than one live thread
        const SHARED = 0x01;

        /// Stored into a shared object or class (but maybe not yet accessed by another thread)
        const EXPOSED = 0x02;

        /// The constructor of the exact class of the object returned
        const CONSTRUCTED = 0x04;

        /// Contents never change (eg. strings), so accesses are never interesting
        const IMMUTABLE = 0x08;
    }
}

/// Progress of running the static initializer of a class
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InitStatus {
    NotInitialized,
    Initializing(ThreadId),
    Initialized,

    /// `<clinit>` threw an exception
    Erroneous,
}

/// Lock state of an element
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Monitor {
    pub owner: Option<ThreadId>,
    pub count: u32,
}

impl Monitor {
    /// Can the thread take the lock right now?
    pub fn can_lock(&self, thread: ThreadId) -> bool {
        match self.owner {
            None => true,
            Some(owner) => owner == thread,
        }
    }
}

/// Function object produced by an `invokedynamic` call site
#[derive(Clone, Debug)]
pub struct FunctionObject<'g> {
    /// Functional interface implemented
    pub interface: ClassId<'g>,

    /// Name of the single abstract method
    pub name: UnqualifiedName,

    /// Method called when the abstract method is invoked
    pub implementation: MethodId<'g>,

    /// Values captured at the call site (these get passed before the regular arguments)
    pub captured: Vec<Slot>,
}

/// Contents of a heap element
#[derive(Clone, Debug)]
pub enum ElementKind<'g> {
    Object {
        /// Instance fields in layout order
        fields: Vec<(FieldId<'g>, Slot)>,
    },
    Array {
        elements: Vec<Slot>,
    },

    /// `java/lang/Class` object, which also holds the static fields of the class
    Statics {
        class: ClassId<'g>,
        fields: Vec<(FieldId<'g>, Slot)>,
        init: InitStatus,
    },
    String(Rc<str>),
    Function(FunctionObject<'g>),
}

/// One object, array, or class on the heap
#[derive(Clone, Debug)]
pub struct ElementInfo<'g> {
    /// Runtime type
    pub ty: RefType<ClassId<'g>>,
    pub kind: ElementKind<'g>,
    pub monitor: Monitor,
    pub flags: ElementFlags,

    /// Threads which have accessed (or allocated) the element
    pub referencing_threads: BTreeSet<ThreadId>,

    /// Candidate locks protecting each field
    pub field_locks: HashMap<FieldId<'g>, FieldLockInfo>,
}

impl<'g> ElementInfo<'g> {
    pub fn new(ty: RefType<ClassId<'g>>, kind: ElementKind<'g>, thread: ThreadId) -> Self {
        ElementInfo {
            ty,
            kind,
            monitor: Monitor::default(),
            flags: ElementFlags::empty(),
            referencing_threads: BTreeSet::from([thread]),
            field_locks: HashMap::new(),
        }
    }

    /// Class of a non-array element
    pub fn class(&self) -> Option<ClassId<'g>> {
        match self.ty {
            RefType::Object(class) => Some(class),
            _ => None,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.flags.contains(ElementFlags::SHARED)
    }

    pub fn is_exposed_or_shared(&self) -> bool {
        self.flags
            .intersects(ElementFlags::SHARED | ElementFlags::EXPOSED)
    }

    pub fn is_constructed(&self) -> bool {
        self.flags.contains(ElementFlags::CONSTRUCTED)
    }

    pub fn is_immutable(&self) -> bool {
        self.flags.contains(ElementFlags::IMMUTABLE)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ElementKind::Array { .. })
    }

    /// Has the lock for the field been consistently held?
    pub fn is_lock_protected(&self, field: FieldId<'g>) -> bool {
        self.field_locks
            .get(&field)
            .map_or(false, FieldLockInfo::is_protected)
    }

    fn fields(&self) -> Option<&Vec<(FieldId<'g>, Slot)>> {
        match &self.kind {
            ElementKind::Object { fields } | ElementKind::Statics { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Value of an instance or static field (`None` if the element has no such field)
    pub fn field(&self, field: FieldId<'g>) -> Option<&Slot> {
        self.fields()?
            .iter()
            .find(|(id, _)| *id == field)
            .map(|(_, slot)| slot)
    }

    pub fn set_field(&mut self, field: FieldId<'g>, slot: Slot) -> bool {
        let fields = match &mut self.kind {
            ElementKind::Object { fields } | ElementKind::Statics { fields, .. } => fields,
            _ => return false,
        };
        match fields.iter_mut().find(|(id, _)| *id == field) {
            Some((_, existing)) => {
                *existing = slot;
                true
            }
            None => false,
        }
    }

    pub fn array_length(&self, reference: ObjRef) -> Result<usize, Error> {
        match &self.kind {
            ElementKind::Array { elements } => Ok(elements.len()),
            _ => Err(Error::UnexpectedElement {
                reference,
                expected: "array",
            }),
        }
    }

    pub fn array_elements(&self, reference: ObjRef) -> Result<&[Slot], Error> {
        match &self.kind {
            ElementKind::Array { elements } => Ok(elements),
            _ => Err(Error::UnexpectedElement {
                reference,
                expected: "array",
            }),
        }
    }

    pub fn array_elements_mut(&mut self, reference: ObjRef) -> Result<&mut Vec<Slot>, Error> {
        match &mut self.kind {
            ElementKind::Array { elements } => Ok(elements),
            _ => Err(Error::UnexpectedElement {
                reference,
                expected: "array",
            }),
        }
    }

    pub fn string_value(&self) -> Option<&Rc<str>> {
        match &self.kind {
            ElementKind::String(string) => Some(string),
            _ => None,
        }
    }

    pub fn init_status(&self) -> Option<InitStatus> {
        match &self.kind {
            ElementKind::Statics { init, .. } => Some(*init),
            _ => None,
        }
    }

    pub fn set_init_status(&mut self, status: InitStatus) {
        if let ElementKind::Statics { init, .. } = &mut self.kind {
            *init = status;
        }
    }
}
