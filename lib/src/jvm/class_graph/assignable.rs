use crate::jvm::class_graph::ClassId;
use crate::jvm::{BinaryName, RefType};
use crate::util::RefId;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Subtyping relationship between types
///
/// This is what `checkcast`, `instanceof`, `aastore`, and exception handler matching all use.
pub trait Assignable {
    /// Is the first type assignable to the second?
    fn is_assignable(&self, super_type: &Self) -> bool;
}

/// This does a traversal of super types in the class graph to determine assignability
impl<'g> Assignable for ClassId<'g> {
    fn is_assignable(&self, super_type: &ClassId<'g>) -> bool {
        let mut supertypes_to_visit: Vec<ClassId<'g>> = vec![*self];
        let mut dont_revisit: HashSet<ClassId<'g>> = HashSet::new();
        dont_revisit.insert(*self);

        // Interfaces are only reachable through interface edges
        let super_is_class: bool = !super_type.0.is_interface();

        while let Some(class) = supertypes_to_visit.pop() {
            if class == *super_type {
                return true;
            }

            if let Some(superclass) = class.0.superclass {
                if dont_revisit.insert(superclass) {
                    supertypes_to_visit.push(superclass);
                }
            }
            if !super_is_class {
                for interface in class.0.interfaces.iter() {
                    let interface = RefId(interface);
                    if dont_revisit.insert(interface) {
                        supertypes_to_visit.push(interface);
                    }
                }
            }
        }

        false
    }
}

/// Java assignability for reference types, including array covariance
impl<'g> Assignable for RefType<ClassId<'g>> {
    fn is_assignable(&self, super_type: &RefType<ClassId<'g>>) -> bool {
        match (self, super_type) {
            // Arrays are only assignable to a handful of class types
            (
                RefType::PrimitiveArray(_) | RefType::ObjectArray(_),
                RefType::Object(object_type),
            ) => is_array_super_type(&object_type.0.name),

            (RefType::PrimitiveArray(arr1), RefType::PrimitiveArray(arr2)) => arr1 == arr2,

            // `int[][]` is an `Object[]`, but `int[]` is not
            (RefType::PrimitiveArray(arr1), RefType::ObjectArray(arr2)) => {
                arr1.additional_dimensions > arr2.additional_dimensions
                    && is_array_super_type(&arr2.element_type.0.name)
            }

            (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2)) => {
                match arr1.additional_dimensions.cmp(&arr2.additional_dimensions) {
                    Ordering::Less => false,
                    Ordering::Equal => arr1.element_type.is_assignable(&arr2.element_type),
                    Ordering::Greater => is_array_super_type(&arr2.element_type.0.name),
                }
            }

            (RefType::Object(cls1), RefType::Object(cls2)) => cls1.is_assignable(cls2),

            _ => false,
        }
    }
}

/// Super types every array has
fn is_array_super_type(super_type: &BinaryName) -> bool {
    super_type == &BinaryName::OBJECT
        || super_type == &BinaryName::CLONEABLE
        || super_type == &BinaryName::SERIALIZABLE
}

#[cfg(test)]
mod test {
    use crate::jvm::class_graph::{Assignable, ClassGraph, ClassGraphArenas};
    use crate::jvm::{FieldType, RefType};

    #[test]
    fn classes_and_interfaces() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types().unwrap();
        let lang = &java.classes.lang;

        assert!(lang.object.is_assignable(&lang.object));
        assert!(lang.thread.is_assignable(&lang.object));
        assert!(!lang.object.is_assignable(&lang.thread));

        assert!(lang.thread.is_assignable(&lang.runnable), "Thread <: Runnable");
        assert!(lang.runnable.is_assignable(&lang.object), "Runnable <: Object");
        assert!(!lang.runnable.is_assignable(&lang.thread));
        assert!(!lang.string.is_assignable(&lang.runnable));

        // Through several superclasses, and through an inherited interface
        assert!(lang
            .array_index_out_of_bounds_exception
            .is_assignable(&lang.runtime_exception));
        assert!(lang
            .no_such_method_error
            .is_assignable(&java.classes.io.serializable));
        assert!(!lang.error.is_assignable(&lang.exception));
    }

    #[test]
    fn arrays() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types().unwrap();
        let lang = &java.classes.lang;

        let object = &RefType::Object(lang.object);
        let cloneable = &RefType::Object(lang.cloneable);
        let int_array = &RefType::array(FieldType::int());
        let long_array = &RefType::array(FieldType::long());
        let object_array = &RefType::array(FieldType::object(lang.object));
        let integer_array = &RefType::array(FieldType::object(lang.integer));
        let number_array = &RefType::array(FieldType::object(lang.number));
        let nested_int_array = &RefType::array(FieldType::array(FieldType::int()));
        let nested_integer_array =
            &RefType::array(FieldType::array(FieldType::object(lang.integer)));

        assert!(int_array.is_assignable(object));
        assert!(int_array.is_assignable(cloneable));
        assert!(!object.is_assignable(int_array));
        assert!(!int_array.is_assignable(long_array));

        assert!(integer_array.is_assignable(number_array), "covariance");
        assert!(!number_array.is_assignable(integer_array));
        assert!(!int_array.is_assignable(integer_array));
        assert!(!int_array.is_assignable(object_array));

        assert!(nested_int_array.is_assignable(object_array));
        assert!(nested_integer_array.is_assignable(object_array));
        assert!(!object_array.is_assignable(nested_integer_array));
        assert!(!nested_integer_array.is_assignable(integer_array));
    }
}
