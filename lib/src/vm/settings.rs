use crate::jvm::class_graph::{ClassId, FieldId, MethodId};
use crate::jvm::{Name, UnqualifiedName};

/// Knobs controlling where the interpreter breaks transitions, and how the search runs
#[derive(Clone, Debug)]
pub struct Settings {
    /// Never break on accesses to `final` instance fields
    pub skip_finals: bool,

    /// Never break on accesses to `final` instance fields of objects whose constructor finished
    pub skip_constructed_finals: bool,

    /// Never break on accesses to `static final` fields
    pub skip_static_finals: bool,

    /// Never break on instance field accesses inside of constructors
    pub skip_inits: bool,

    /// Break when a reference to an object is stored into a shared object or class, exposing the
    /// stored object to other threads
    pub break_on_exposure: bool,

    /// Track which locks protect shared fields, and stop breaking on accesses to fields which
    /// appear to be consistently lock-protected
    pub sync_detection: bool,

    /// Number of consistently protected accesses before a field is assumed to be lock-protected
    pub lock_threshold: u32,

    /// Break even when the only runnable thread is the current one
    pub break_single_choice: bool,

    /// Break after releasing a lock that another thread was blocked on
    pub break_lock_release: bool,

    /// Break after `notify`/`notifyAll` woke up a waiting thread
    pub break_notify: bool,

    /// Break after starting a new thread
    pub break_start: bool,

    /// Break on `Thread.yield`
    pub break_yield: bool,

    /// Maximum number of instructions in one transition before it is forcibly broken
    pub max_transition_length: usize,

    /// Number of heap elements after which allocation raises `OutOfMemoryError`
    pub max_heap_objects: usize,

    /// Longest array that can be allocated before `OutOfMemoryError` is raised
    pub max_array_length: usize,

    /// Number of frames on a thread stack after which calls raise `StackOverflowError`
    pub max_stack_depth: usize,

    /// Types (and their subtypes) whose fields never cause a break, written as `java/lang/Foo`
    /// or with a trailing `*` to match a prefix
    pub never_break_on_types: Vec<String>,

    /// Types (and their subtypes) whose fields always cause a break
    pub always_break_on_types: Vec<String>,

    /// Methods in which accesses never cause a break, written as `pkg/Class.method`
    pub never_break_in_methods: Vec<String>,

    /// Fields which never cause a break, written as `pkg/Class.field`
    pub never_break_on_fields: Vec<String>,

    /// Fields which always cause a break
    pub always_break_on_fields: Vec<String>,

    /// Stop the search as soon as a property violation is found
    pub stop_on_first_violation: bool,

    /// Maximum depth (in choice generators) explored along any one path
    pub max_search_depth: Option<usize>,
}

/// Whether a configured pattern forces or forbids a break
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BreakRule {
    Never,
    Always,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            skip_finals: true,
            skip_constructed_finals: false,
            skip_static_finals: true,
            skip_inits: true,
            break_on_exposure: true,
            sync_detection: true,
            lock_threshold: 5,
            break_single_choice: false,
            break_lock_release: true,
            break_notify: true,
            break_start: true,
            break_yield: true,
            max_transition_length: 5000,
            max_heap_objects: 100_000,
            max_array_length: 1 << 20,
            max_stack_depth: 1024,
            never_break_on_types: vec![],
            always_break_on_types: vec![],
            never_break_in_methods: vec![],
            never_break_on_fields: vec![],
            always_break_on_fields: vec![],
            stop_on_first_violation: true,
            max_search_depth: None,
        }
    }

    /// Rule for the fields of a class (the closest matching superclass wins)
    pub fn type_break_rule(&self, class: ClassId) -> Option<BreakRule> {
        for class in class.superclasses() {
            let name = class.0.name.as_str();
            if matches_any(&self.always_break_on_types, name) {
                return Some(BreakRule::Always);
            }
            if matches_any(&self.never_break_on_types, name) {
                return Some(BreakRule::Never);
            }
        }
        None
    }

    /// Rule for a specific field
    pub fn field_break_rule(&self, field: FieldId) -> Option<BreakRule> {
        let name = field.0.name.as_str();
        if (!field.0.is_static() && name.starts_with("this$"))
            || (field.0.is_static() && field.0.name == UnqualifiedName::ASSERTIONSDISABLED)
        {
            return Some(BreakRule::Never);
        }

        let class = field.0.class.0.name.as_str();
        if matches_any_member(&self.always_break_on_fields, class, name) {
            Some(BreakRule::Always)
        } else if matches_any_member(&self.never_break_on_fields, class, name) {
            Some(BreakRule::Never)
        } else {
            None
        }
    }

    pub fn never_breaks_in(&self, method: MethodId) -> bool {
        matches_any_member(
            &self.never_break_in_methods,
            method.0.class.0.name.as_str(),
            method.0.name.as_str(),
        )
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::new()
    }
}

/// Match a name against a pattern which is either exact or ends in a `*` wildcard
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => pattern == name,
    }
}

fn matches_any(patterns: &[String], name: &str) -> bool {
    patterns.iter().any(|pattern| matches_pattern(pattern, name))
}

/// Match `Class.member` patterns (the split is on the last `.`)
fn matches_any_member(patterns: &[String], class: &str, member: &str) -> bool {
    patterns.iter().any(|pattern| match pattern.rsplit_once('.') {
        Some((class_pattern, member_pattern)) => {
            matches_pattern(class_pattern, class) && matches_pattern(member_pattern, member)
        }
        None => false,
    })
}
