//! Explicit-state model checker for JVM bytecode
//!
//! Programs are loaded into a [`jvm::class_graph::ClassGraph`] and executed by the interpreter in
//! [`vm`]. Every point where the outcome could depend on the thread schedule (or on a value the
//! program asked to be chosen nondeterministically) becomes a choice generator, and [`search`]
//! explores all of the choices depth-first, reporting uncaught exceptions and deadlocks.

pub mod demos;
pub mod jvm;
pub mod search;
pub mod util;
pub mod vm;
