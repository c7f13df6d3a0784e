//! Interpreter for JVM bytecode with choice points
//!
//! ### Transitions
//!
//! The interpreter runs one guest thread at a time. A transition is the run of instructions
//! executed by that thread up until some instruction decides that the schedule (or some
//! nondeterministic value) matters. At that point, the instruction registers a
//! [`ChoiceGenerator`] and the transition ends. The search (see [`crate::search`]) then saves the
//! state, and explores each choice in turn, starting a new transition for each.
//!
//! ### Re-executing instructions
//!
//! Instructions which register a choice generator don't complete: they leave the operand stack as
//! it was, and get executed again at the start of the next transition in which their thread runs.
//! Since the re-execution is the first step of a transition, the scheduler won't ask for a
//! choice again. The `resuming` flag on the thread distinguishes the re-execution of an
//! instruction which already did part of its work (eg. `Thread.start`) from a fresh execution.
//!
//! ### Example
//!
//! ```
//! use jvmcheck::jvm::class_graph::*;
//! use jvmcheck::jvm::code::{CodeBuilder, Instruction::*};
//! use jvmcheck::jvm::*;
//! use jvmcheck::vm::*;
//!
//! # fn run() -> Result<(), jvmcheck::vm::Error> {
//! let arenas = ClassGraphArenas::new();
//! let class_graph = ClassGraph::new(&arenas);
//! let java = class_graph.insert_java_library_types()?;
//!
//! let class = class_graph.add_class(ClassData::new(
//!     BinaryName::from_string(String::from("demo/Main")).unwrap(),
//!     java.classes.lang.object,
//!     ClassAccessFlags::PUBLIC,
//! ));
//! let main = class_graph.add_method(MethodData::new(
//!     class,
//!     UnqualifiedName::from_string(String::from("main")).unwrap(),
//!     MethodDescriptor { parameters: vec![], return_type: None },
//!     MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
//! ));
//! let mut code = CodeBuilder::new(main);
//! code.push_instruction(IConst1)?;
//! code.push_instruction(IConst2)?;
//! code.push_instruction(IAdd)?;
//! code.push_instruction(Pop)?;
//! code.push_instruction(Return)?;
//! code.install()?;
//!
//! let mut vm = Vm::new(java, Settings::new());
//! let main_thread = vm.start(main)?;
//! assert!(matches!(vm.run_transition()?, TransitionOutcome::EndState));
//! assert!(!vm.state.thread(main_thread)?.is_alive());
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```

mod choice;
mod element;
mod errors;
mod exec;
mod frame;
mod heap;
mod listener;
mod property;
pub mod scheduler;
mod settings;
mod state;
mod thread;
mod transients;
mod value;

pub use choice::*;
pub use element::*;
pub use errors::*;
pub use exec::*;
pub use frame::*;
pub use heap::*;
pub use listener::*;
pub use property::*;
pub use settings::*;
pub use state::*;
pub use thread::*;
pub use value::*;

use crate::jvm::class_graph::{JavaLibrary, MethodId};
use crate::jvm::{FieldType, RefType};
use scheduler::{ids, Scheduler};
use transients::Transients;

/// How a transition ended
#[derive(Debug)]
pub enum TransitionOutcome<'g> {
    /// An instruction registered a choice generator
    ChoicePoint(Box<dyn ChoiceGenerator>),

    /// Every thread terminated
    EndState,

    /// A property was violated (the path ends here)
    Violation(Property<'g>),
}

/// Interpreter state and configuration
pub struct Vm<'g> {
    pub java: JavaLibrary<'g>,
    pub settings: Settings,

    /// State of the program (this is what gets saved and restored)
    pub state: VmState<'g>,

    pub scheduler: Scheduler,

    /// Caches which are not part of the program state
    transients: Transients<'g>,

    listeners: Vec<Box<dyn VmListener<'g> + 'g>>,

    /// Choices made along the current path
    choice_path: Vec<ChoiceRecord>,

    /// Instructions executed so far (across all paths)
    instructions: u64,
}

impl<'g> Vm<'g> {
    /// New interpreter with the default scheduling policies
    pub fn new(java: JavaLibrary<'g>, settings: Settings) -> Vm<'g> {
        let scheduler = Scheduler::new(&settings);
        Vm {
            java,
            state: VmState::new(
                Heap::new(settings.max_heap_objects)
                    .with_max_array_length(settings.max_array_length),
            ),
            settings,
            scheduler,
            transients: Transients::default(),
            listeners: vec![],
            choice_path: vec![],
            instructions: 0,
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn VmListener<'g> + 'g>) {
        self.listeners.push(listener);
    }

    /// Create the main thread, about to call the given static method
    ///
    /// Array parameters (eg. the `String[]` of a `main` method) get empty arrays, and other
    /// parameters get default values. The class of the method is initialized first.
    pub fn start(&mut self, main: MethodId<'g>) -> Result<ThreadId, Error> {
        if !main.0.is_static() {
            return Err(Error::InvalidEntryPoint(format!("{:?}", main.0)));
        }
        let body = main
            .body()
            .ok_or_else(|| Error::MissingCode(format!("{:?}", main.0)))?;
        let main_id = ThreadId(self.state.threads().count());

        let thread_object = self
            .state
            .heap
            .new_object(self.java.classes.lang.thread, main_id, true)
            .ok_or(Error::HeapOverflow)?;

        let mut arguments = vec![];
        for parameter in &main.0.descriptor.parameters {
            let value = match parameter {
                FieldType::Ref(ref_type @ RefType::PrimitiveArray(_))
                | FieldType::Ref(ref_type @ RefType::ObjectArray(_)) => {
                    let component = ref_type
                        .component_type()
                        .ok_or(Error::InvalidEntryPoint(format!("{:?}", main.0)))?;
                    let array = self
                        .state
                        .heap
                        .new_array(component, 0, main_id)
                        .ok_or(Error::HeapOverflow)?;
                    Value::Ref(array)
                }
                other => Value::default_for(other),
            };
            arguments.push(Slot::new(value));
        }
        let mut frame = StackFrame::new(main, body, FrameKind::Normal);
        frame.set_arguments(arguments)?;

        let thread = self.state.add_thread(|id| {
            let mut thread = ThreadInfo::new(id, String::from("main"), thread_object);
            thread.stack.push(frame);
            thread
        });
        self.state.current = thread;
        log::info!("starting {} in thread {}", main.0.name, thread);

        // Static initializers run on top of `main`, which re-executes once they are done
        if let Some(ExecResult::Fault(throw)) = self.ensure_initialized(thread, main.0.class)? {
            log::error!("could not initialize the main class: {:?}", throw);
            return Err(Error::InvalidEntryPoint(format!("{:?}", main.0)));
        }
        Ok(thread)
    }

    /// Choice of the first thread to run
    pub fn root_cg(&self) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        self.scheduler.sync.root_cg(&self.state)
    }

    /// Choices made along the current path
    pub fn choice_path(&self) -> &[ChoiceRecord] {
        &self.choice_path
    }

    /// Make a choice from a generator which was just advanced
    ///
    /// Thread choices at scheduling points switch the current thread.
    pub fn apply_choice(&mut self, cg: &dyn ChoiceGenerator) -> Result<(), Error> {
        let choice = cg.next_choice().ok_or(Error::MissingChoice(cg.id()))?;
        let record = ChoiceRecord {
            id: cg.id(),
            choice,
            index: cg.processed_choices().saturating_sub(1),
            total: cg.total_choices(),
        };
        for listener in &mut self.listeners {
            listener.choice_generator_advanced(&self.state, &record);
        }
        self.choice_path.push(record);

        if let (Choice::Thread(thread), true) = (choice, cg.is_scheduling_point()) {
            self.state.current = thread;
        }
        let current = self.state.current;
        self.state.thread_mut(current)?.first_step = true;
        Ok(())
    }

    /// Go back to a saved state, forgetting choices made after it
    pub fn restore(&mut self, state: VmState<'g>, path_len: usize) {
        self.state = state;
        self.choice_path.truncate(path_len);
        self.cleanup_transients();
    }

    /// Drop caches which might refer to heap elements of another path
    pub fn cleanup_transients(&mut self) {
        self.transients.clear();
    }

    pub fn instructions_executed(&self) -> u64 {
        self.instructions
    }

    /// Choice made by the latest choice generator, if it has the given id
    fn current_choice(&self, id: &'static str) -> Result<Choice, Error> {
        self.choice_path
            .last()
            .filter(|record| record.id == id)
            .map(|record| record.choice)
            .ok_or(Error::MissingChoice(id))
    }

    /// Run the current thread until it reaches a choice point, terminates, or fails
    pub fn run_transition(&mut self) -> Result<TransitionOutcome<'g>, Error> {
        let thread = self.state.current;
        let mut executed: usize = 0;

        loop {
            let info = self.state.thread(thread)?;
            if !info.is_alive() || info.stack.is_empty() {
                if self.state.all_terminated() {
                    return Ok(TransitionOutcome::EndState);
                }
                return Err(Error::MissingChoiceGenerator(ids::TERMINATE));
            }

            if executed >= self.settings.max_transition_length {
                executed = 0;
                let cg = self.scheduler.sync.sets_reschedule_cg(
                    &self.state,
                    thread,
                    ids::MAX_TRANSITION_LENGTH,
                )?;
                if let Some(cg) = cg {
                    return Ok(self.register_choice_generator(cg));
                }
            }

            // Getting scheduled means the lock the thread was blocked on is free now
            let info = self.state.thread_mut(thread)?;
            if info.state == ThreadState::Unblocked {
                info.state = ThreadState::Runnable;
                info.lock_ref = None;
            }

            let frame = self.frame(thread)?;
            let instruction = frame.instruction()?;
            log::debug!(
                "{} {:?} {}: {:?}",
                thread,
                frame.method.0,
                frame.pc,
                instruction
            );
            for listener in &mut self.listeners {
                listener.executing_instruction(&self.state, thread, instruction);
            }

            let result = self.execute(thread)?;
            self.instructions += 1;
            executed += 1;
            for listener in &mut self.listeners {
                listener.instruction_executed(&self.state, thread, instruction);
            }

            match result {
                ExecResult::Continue(pc) => {
                    let info = self.state.thread_mut(thread)?;
                    if let Some(frame) = info.stack.last_mut() {
                        frame.pc = pc;
                    }
                    info.first_step = false;
                    info.resuming = false;
                }
                ExecResult::Suspend(cg) => {
                    let info = self.state.thread_mut(thread)?;
                    info.resuming = true;
                    info.first_step = false;
                    return Ok(self.register_choice_generator(cg));
                }
                ExecResult::Fault(throw) => {
                    let info = self.state.thread_mut(thread)?;
                    info.first_step = false;
                    info.resuming = false;
                    if let Some(property) = self.raise(thread, throw)? {
                        self.report_violation(&property);
                        return Ok(TransitionOutcome::Violation(property));
                    }
                }
            }
        }
    }

    /// Log a violated property and tell the listeners about it
    pub fn report_violation(&mut self, property: &Property<'g>) {
        log::error!("{}", property);
        for listener in &mut self.listeners {
            listener.property_violated(&self.state, property);
        }
    }

    fn register_choice_generator(&mut self, cg: Box<dyn ChoiceGenerator>) -> TransitionOutcome<'g> {
        log::info!(
            "registered {} CG with {} choices",
            cg.id(),
            cg.total_choices()
        );
        for listener in &mut self.listeners {
            listener.choice_generator_registered(&self.state, &*cg);
        }
        TransitionOutcome::ChoicePoint(cg)
    }
}
