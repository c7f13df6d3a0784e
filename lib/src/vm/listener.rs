use super::{ChoiceGenerator, ChoiceRecord, ObjRef, Property, ThreadId, VmState};
use crate::jvm::code::Instruction;

/// Observer of interpreter events
///
/// All methods default to doing nothing, so implementations only override what they care about.
/// Listeners see the state but can't change it.
pub trait VmListener<'g> {
    fn executing_instruction(
        &mut self,
        _state: &VmState<'g>,
        _thread: ThreadId,
        _instruction: &Instruction<'g>,
    ) {
    }

    fn instruction_executed(
        &mut self,
        _state: &VmState<'g>,
        _thread: ThreadId,
        _instruction: &Instruction<'g>,
    ) {
    }

    fn choice_generator_registered(&mut self, _state: &VmState<'g>, _cg: &dyn ChoiceGenerator) {}

    fn choice_generator_advanced(&mut self, _state: &VmState<'g>, _choice: &ChoiceRecord) {}

    fn thread_terminated(&mut self, _state: &VmState<'g>, _thread: ThreadId) {}

    /// A guest exception object was created (before it is unwound)
    fn exception_thrown(&mut self, _state: &VmState<'g>, _thread: ThreadId, _exception: ObjRef) {}

    fn property_violated(&mut self, _state: &VmState<'g>, _property: &Property<'g>) {}
}
