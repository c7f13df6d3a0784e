use super::java_classes::JavaClasses;
use super::java_members::JavaMembers;
use super::{ClassGraph, Error};

/// Library classes and members the interpreter needs to know about
///
/// Most of these are plain classes with bytecode bodies (constructors, `Thread.run`, ...). The
/// `native` ones are implemented directly by the interpreter.
#[derive(Copy, Clone)]
pub struct JavaLibrary<'g> {
    pub classes: JavaClasses<'g>,
    pub members: JavaMembers<'g>,
}

impl<'g> JavaLibrary<'g> {
    pub fn add_to_graph(class_graph: &ClassGraph<'g>) -> Result<JavaLibrary<'g>, Error> {
        let classes = JavaClasses::add_to_graph(class_graph);
        let members = JavaMembers::add_to_graph(class_graph, &classes);
        let library = JavaLibrary { classes, members };
        library.install_code()?;
        Ok(library)
    }
}
