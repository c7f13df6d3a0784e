use super::ThreadId;
use crate::jvm::class_graph::ClassId;
use crate::jvm::Name;
use std::fmt;

/// Correctness property violated along a path
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Property<'g> {
    /// An exception propagated out of the bottom frame of a thread
    UncaughtException {
        thread: ThreadId,
        thread_name: String,
        class: ClassId<'g>,
        message: Option<String>,
    },

    /// Some threads are alive but none of them can run
    Deadlock { threads: Vec<ThreadId> },
}

impl<'g> fmt::Display for Property<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::UncaughtException {
                thread,
                thread_name,
                class,
                message,
            } => {
                write!(
                    f,
                    "uncaught exception in thread {} \"{}\": {}",
                    thread,
                    thread_name,
                    class.0.name.as_str().replace('/', ".")
                )?;
                if let Some(message) = message {
                    write!(f, ": {}", message)?;
                }
                Ok(())
            }
            Property::Deadlock { threads } => {
                f.write_str("deadlock between threads")?;
                for thread in threads {
                    write!(f, " {}", thread)?;
                }
                Ok(())
            }
        }
    }
}
