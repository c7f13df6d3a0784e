//! Deciding when a transition must be broken
//!
//! Every instruction that touches memory other threads could also touch, or that changes which
//! threads can run, asks the scheduler whether it should become a scheduling point. There are two
//! separate concerns:
//!
//!   - [`SharednessPolicy`] tracks which objects, arrays, and classes are shared between threads,
//!     and whether an access to them (or a store exposing a new object through them) is
//!     interesting enough to interleave
//!
//!   - [`SyncPolicy`] decides on scheduling points around locks, `wait`/`notify`, thread start and
//!     termination, `yield`, `join`, and atomic sections
//!
//! Both return a fresh choice generator when the transition should be broken, and `None`
//! otherwise.

mod field_lock;
mod sharedness;
mod sync;

pub use field_lock::*;
pub use sharedness::*;
pub use sync::*;

use super::Settings;

/// Identifiers of the choice generators the interpreter registers
pub mod ids {
    pub const ROOT: &str = "ROOT";

    pub const EXPOSE: &str = "EXPOSE";
    pub const SHARED_OBJECT: &str = "SHARED_OBJECT";
    pub const SHARED_CLASS: &str = "SHARED_CLASS";
    pub const SHARED_ARRAY: &str = "SHARED_ARRAY";

    pub const BLOCK: &str = "BLOCK";
    pub const LOCK: &str = "LOCK";
    pub const RELEASE: &str = "RELEASE";
    pub const WAIT: &str = "WAIT";
    pub const NOTIFY: &str = "NOTIFY";
    pub const NOTIFYALL: &str = "NOTIFYALL";
    pub const START: &str = "START";
    pub const YIELD: &str = "YIELD";
    pub const JOIN: &str = "JOIN";
    pub const TERMINATE: &str = "TERMINATE";
    pub const BEGIN_ATOMIC: &str = "BEGIN_ATOMIC";
    pub const END_ATOMIC: &str = "END_ATOMIC";
    pub const MAX_TRANSITION_LENGTH: &str = "MAX_TRANSITION_LENGTH";

    /// Blocking point where no thread can run (a deadlock, unless some thread is still alive)
    pub const BLOCKED_NO_CHOICE: &str = "BLOCKED_NO_CHOICE";

    /// Which waiting thread a `notify` wakes up
    pub const NOTIFY_WAITER: &str = "notifyWaiter";

    pub const VERIFY_GET_BOOLEAN: &str = "verifyGetBoolean";
    pub const VERIFY_GET_INT: &str = "verifyGetInt";
}

/// Sharedness and synchronization policies used by the interpreter
#[derive(Debug)]
pub struct Scheduler {
    pub sharedness: Box<dyn SharednessPolicy>,
    pub sync: Box<dyn SyncPolicy>,
}

impl Scheduler {
    /// Default policies: path sharedness, with all runnable threads as scheduling choices
    pub fn new(settings: &Settings) -> Scheduler {
        Scheduler {
            sharedness: Box::new(PathSharednessPolicy::new(settings)),
            sync: Box::new(AllRunnablesSyncPolicy::new(settings)),
        }
    }
}
