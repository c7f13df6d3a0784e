//! JVM classes, members, and bytecode
//!
//! Everything the interpreter runs lives in an arena-backed [`class_graph::ClassGraph`]: classes
//! refer to their superclasses and interfaces, members refer to their classes, and method bodies
//! are sequences of [`code::Instruction`] referring directly to members. Nothing is ever looked
//! up by name while running.
//!
//! ### Example
//!
//! ```java,ignore,no_run
//! public class Counter {
//!     static int count;
//!
//!     static synchronized void increment() {
//!         count = count + 1;
//!     }
//! }
//! ```
//!
//! Declaring that class and giving `increment` its body:
//!
//! ```
//! use jvmcheck::jvm::class_graph::*;
//! use jvmcheck::jvm::code::Instruction::*;
//! use jvmcheck::jvm::code::CodeBuilder;
//! use jvmcheck::jvm::*;
//!
//! # fn declare_class() -> Result<(), Error> {
//! let class_graph_arenas = ClassGraphArenas::new();
//! let class_graph = ClassGraph::new(&class_graph_arenas);
//! let java = class_graph.insert_java_library_types()?;
//!
//! let class = class_graph.add_class(ClassData::new(
//!     BinaryName::from_string(String::from("demo/Counter")).unwrap(),
//!     java.classes.lang.object,
//!     ClassAccessFlags::PUBLIC,
//! ));
//! let count = class_graph.add_field(FieldData {
//!     class,
//!     name: UnqualifiedName::from_string(String::from("count")).unwrap(),
//!     descriptor: FieldType::int(),
//!     access_flags: FieldAccessFlags::STATIC,
//! });
//! let increment = class_graph.add_method(MethodData::new(
//!     class,
//!     UnqualifiedName::from_string(String::from("increment")).unwrap(),
//!     MethodDescriptor {
//!         parameters: vec![],
//!         return_type: None,
//!     },
//!     MethodAccessFlags::STATIC | MethodAccessFlags::SYNCHRONIZED,
//! ));
//!
//! // The lock on the class object is taken by the call, not by the body
//! let mut code = CodeBuilder::new(increment);
//! code.push_instruction(GetStatic(count))?;
//! code.push_instruction(IConst1)?;
//! code.push_instruction(IAdd)?;
//! code.push_instruction(PutStatic(count))?;
//! code.push_instruction(Return)?;
//! code.install()?;
//!
//! assert_eq!(class.static_fields(), vec![count]);
//! assert_eq!(increment.body().map(|code| code.max_locals), Some(0));
//! # Ok(())
//! # }
//! # declare_class().unwrap();
//! ```

mod access_flags;
pub mod class_graph;
pub mod code;
mod descriptors;
mod errors;
mod names;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
