use super::{ids, FieldLockInfo};
use crate::jvm::class_graph::{ClassId, FieldId};
use crate::vm::{
    BreakRule, ChoiceGenerator, ElementFlags, ElementInfo, ElementKind, Error, ObjRef, Settings,
    ThreadChoiceFromSet, ThreadId, VmState,
};
use std::fmt::Debug;

/// Decides which memory accesses are scheduling points
///
/// The protocol for an access is: ask `can_have_*_cg` (cheap filters that don't depend on the
/// element's sharedness), then `update_*_sharedness` (record that the thread touched the element),
/// and finally `sets_*_cg` (create a choice generator if the element is shared).
pub trait SharednessPolicy: Debug {
    fn can_have_shared_object_cg<'g>(
        &self,
        state: &VmState<'g>,
        thread: ThreadId,
        object: ObjRef,
        field: FieldId<'g>,
    ) -> Result<bool, Error>;

    fn can_have_shared_class_cg<'g>(
        &self,
        state: &VmState<'g>,
        thread: ThreadId,
        class_object: ObjRef,
        field: FieldId<'g>,
    ) -> Result<bool, Error>;

    fn can_have_shared_array_cg<'g>(
        &self,
        state: &VmState<'g>,
        thread: ThreadId,
        array: ObjRef,
        index: usize,
    ) -> Result<bool, Error>;

    fn update_object_sharedness<'g>(
        &self,
        state: &mut VmState<'g>,
        thread: ThreadId,
        object: ObjRef,
        field: FieldId<'g>,
    ) -> Result<(), Error>;

    fn update_class_sharedness<'g>(
        &self,
        state: &mut VmState<'g>,
        thread: ThreadId,
        class_object: ObjRef,
        field: FieldId<'g>,
    ) -> Result<(), Error>;

    fn update_array_sharedness<'g>(
        &self,
        state: &mut VmState<'g>,
        thread: ThreadId,
        array: ObjRef,
        index: usize,
    ) -> Result<(), Error>;

    fn sets_shared_object_cg<'g>(
        &self,
        state: &VmState<'g>,
        thread: ThreadId,
        object: ObjRef,
        field: FieldId<'g>,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    fn sets_shared_class_cg<'g>(
        &self,
        state: &VmState<'g>,
        thread: ThreadId,
        class_object: ObjRef,
        field: FieldId<'g>,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    fn sets_shared_array_cg<'g>(
        &self,
        state: &VmState<'g>,
        thread: ThreadId,
        array: ObjRef,
        index: usize,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    /// Storing `exposed` into a field of `object` may make it reachable from other threads
    fn sets_shared_object_exposure_cg<'g>(
        &self,
        state: &mut VmState<'g>,
        thread: ThreadId,
        object: ObjRef,
        field: FieldId<'g>,
        exposed: ObjRef,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    fn sets_shared_class_exposure_cg<'g>(
        &self,
        state: &mut VmState<'g>,
        thread: ThreadId,
        class_object: ObjRef,
        field: FieldId<'g>,
        exposed: ObjRef,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;

    fn sets_shared_array_exposure_cg<'g>(
        &self,
        state: &mut VmState<'g>,
        thread: ThreadId,
        array: ObjRef,
        exposed: ObjRef,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error>;
}

/// Sharedness is tracked along the current path: an element becomes shared as soon as two live
/// threads have accessed it, and stays shared from then on.
#[derive(Debug)]
pub struct PathSharednessPolicy {
    settings: Settings,
}

impl PathSharednessPolicy {
    pub fn new(settings: &Settings) -> PathSharednessPolicy {
        PathSharednessPolicy {
            settings: settings.clone(),
        }
    }

    /// Filters common to all kinds of accesses (`None` means no filter decided)
    fn can_have_sharedness_cg<'g>(
        &self,
        state: &VmState<'g>,
        thread: ThreadId,
        owner: &ElementInfo<'g>,
        field: Option<FieldId<'g>>,
    ) -> Result<Option<bool>, Error> {
        let thread_info = state.thread(thread)?;

        // No empty transitions
        if thread_info.first_step {
            return Ok(Some(false));
        }
        if !state.has_other_runnables(thread) {
            return Ok(Some(false));
        }
        if self.is_in_never_break_method(state, thread)? {
            return Ok(Some(false));
        }
        match owner_class(owner).and_then(|class| self.settings.type_break_rule(class)) {
            Some(BreakRule::Never) => return Ok(Some(false)),
            Some(BreakRule::Always) => return Ok(Some(true)),
            None => (),
        }
        match field.and_then(|field| self.settings.field_break_rule(field)) {
            Some(BreakRule::Always) => Ok(Some(true)),
            Some(BreakRule::Never) => Ok(Some(false)),
            None => Ok(None),
        }
    }

    fn is_in_never_break_method(&self, state: &VmState, thread: ThreadId) -> Result<bool, Error> {
        Ok(state
            .thread(thread)?
            .stack
            .iter()
            .any(|frame| self.settings.never_breaks_in(frame.method)))
    }

    fn always_breaks_on(&self, owner: &ElementInfo) -> bool {
        owner_class(owner).and_then(|class| self.settings.type_break_rule(class))
            == Some(BreakRule::Always)
    }

    fn update_sharedness<'g>(
        &self,
        state: &mut VmState<'g>,
        thread: ThreadId,
        reference: ObjRef,
        field: Option<FieldId<'g>>,
    ) -> Result<(), Error> {
        let live: Vec<ThreadId> = state.live_threads();
        let held_locks: Vec<ObjRef> = state.thread(thread)?.locked_objects.clone();

        let element = state.heap.get(reference)?;
        let needs_thread = !element.referencing_threads.contains(&thread);
        let live_referencing = element
            .referencing_threads
            .iter()
            .chain(needs_thread.then_some(&thread))
            .filter(|referencing| live.contains(referencing))
            .count();
        let becomes_shared = live_referencing > 1 && !element.is_shared();

        if needs_thread || becomes_shared {
            let element = state.heap.get_mut(reference)?;
            element.referencing_threads.insert(thread);
            if becomes_shared {
                log::debug!("{} is now shared (accessed by {})", reference, thread);
                element.flags.insert(ElementFlags::SHARED);
            }
        }

        // Volatile fields are never assumed to be lock protected
        if let Some(field) = field.filter(|field| !field.0.is_volatile()) {
            if self.settings.sync_detection && state.heap.get(reference)?.is_shared() {
                self.update_field_lock_info(state, thread, reference, field, &held_locks)?;
            }
        }
        Ok(())
    }

    fn update_field_lock_info<'g>(
        &self,
        state: &mut VmState<'g>,
        thread: ThreadId,
        reference: ObjRef,
        field: FieldId<'g>,
        held_locks: &[ObjRef],
    ) -> Result<(), Error> {
        let updated = match state.heap.get(reference)?.field_locks.get(&field) {
            None => FieldLockInfo::new(held_locks, self.settings.lock_threshold),
            Some(info) => {
                let check = info.check_protection(held_locks);
                if check.info == *info {
                    return Ok(());
                }
                if check.assumption_failed {
                    log::warn!(
                        "unprotected access of {:?} on {} in thread {} (held locks: {:?})",
                        field,
                        reference,
                        thread,
                        held_locks
                    );
                }
                check.info
            }
        };
        state
            .heap
            .get_mut(reference)?
            .field_locks
            .insert(field, updated);
        Ok(())
    }

    /// Thread choice among all runnables, unless there is nothing to choose
    fn runnable_cg(&self, id: &'static str, state: &VmState) -> Option<Box<dyn ChoiceGenerator>> {
        if state.is_atomic() {
            return None;
        }
        let choices = state.runnable_threads();
        if choices.len() <= 1 {
            return None;
        }
        Some(Box::new(ThreadChoiceFromSet::new(id, choices, true)))
    }

    fn sets_exposure_cg<'g>(
        &self,
        state: &mut VmState<'g>,
        thread: ThreadId,
        owner: ObjRef,
        exposed: ObjRef,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        if !self.settings.break_on_exposure {
            return Ok(None);
        }
        let exposed_element = state.heap.get(exposed)?;
        match owner_class(exposed_element).and_then(|class| self.settings.type_break_rule(class)) {
            Some(BreakRule::Never) => return Ok(None),
            Some(BreakRule::Always) => {
                log::info!("type exposure CG storing {} into {}", exposed, owner);
                return Ok(self.runnable_cg(ids::EXPOSE, state));
            }
            None => (),
        }
        if self.is_in_never_break_method(state, thread)? {
            return Ok(None);
        }

        let owner_element = state.heap.get(owner)?;
        let first_exposure = !exposed_element.is_immutable()
            && !exposed_element.is_exposed_or_shared()
            && owner_element.is_exposed_or_shared();
        if first_exposure {
            state
                .heap
                .get_mut(exposed)?
                .flags
                .insert(ElementFlags::EXPOSED);
            log::info!("exposure CG storing {} into {}", exposed, owner);
            return Ok(self.runnable_cg(ids::EXPOSE, state));
        }
        Ok(None)
    }
}

impl SharednessPolicy for PathSharednessPolicy {
    fn can_have_shared_object_cg<'g>(
        &self,
        state: &VmState<'g>,
        thread: ThreadId,
        object: ObjRef,
        field: FieldId<'g>,
    ) -> Result<bool, Error> {
        let owner = state.heap.get(object)?;
        if let Some(decided) = self.can_have_sharedness_cg(state, thread, owner, Some(field))? {
            return Ok(decided);
        }
        if owner.is_immutable() {
            return Ok(false);
        }
        if self.settings.skip_finals && field.0.is_final() {
            return Ok(false);
        }
        if self.settings.skip_constructed_finals && field.0.is_final() && owner.is_constructed() {
            return Ok(false);
        }
        if self.settings.skip_inits && state.thread(thread)?.top_frame()?.method.0.is_init() {
            return Ok(false);
        }
        Ok(true)
    }

    fn can_have_shared_class_cg<'g>(
        &self,
        state: &VmState<'g>,
        thread: ThreadId,
        class_object: ObjRef,
        field: FieldId<'g>,
    ) -> Result<bool, Error> {
        let owner = state.heap.get(class_object)?;
        if let Some(decided) = self.can_have_sharedness_cg(state, thread, owner, Some(field))? {
            return Ok(decided);
        }
        if owner.is_immutable() {
            return Ok(false);
        }
        if self.settings.skip_static_finals && field.0.is_final() {
            return Ok(false);
        }

        // Static initializers of the class itself run under the class lock
        let method = state.thread(thread)?.top_frame()?.method;
        if method.0.is_clinit() && method.0.class == field.0.class {
            return Ok(false);
        }
        Ok(true)
    }

    fn can_have_shared_array_cg<'g>(
        &self,
        state: &VmState<'g>,
        thread: ThreadId,
        array: ObjRef,
        _index: usize,
    ) -> Result<bool, Error> {
        let owner = state.heap.get(array)?;
        Ok(self
            .can_have_sharedness_cg(state, thread, owner, None)?
            .unwrap_or(true))
    }

    fn update_object_sharedness<'g>(
        &self,
        state: &mut VmState<'g>,
        thread: ThreadId,
        object: ObjRef,
        field: FieldId<'g>,
    ) -> Result<(), Error> {
        self.update_sharedness(state, thread, object, Some(field))
    }

    fn update_class_sharedness<'g>(
        &self,
        state: &mut VmState<'g>,
        thread: ThreadId,
        class_object: ObjRef,
        field: FieldId<'g>,
    ) -> Result<(), Error> {
        self.update_sharedness(state, thread, class_object, Some(field))
    }

    fn update_array_sharedness<'g>(
        &self,
        state: &mut VmState<'g>,
        thread: ThreadId,
        array: ObjRef,
        _index: usize,
    ) -> Result<(), Error> {
        self.update_sharedness(state, thread, array, None)
    }

    fn sets_shared_object_cg<'g>(
        &self,
        state: &VmState<'g>,
        _thread: ThreadId,
        object: ObjRef,
        field: FieldId<'g>,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        let owner = state.heap.get(object)?;
        if self.always_breaks_on(owner) || (owner.is_shared() && !owner.is_lock_protected(field))
        {
            log::info!("CG accessing shared instance field {:?}", field);
            return Ok(self.runnable_cg(ids::SHARED_OBJECT, state));
        }
        Ok(None)
    }

    fn sets_shared_class_cg<'g>(
        &self,
        state: &VmState<'g>,
        _thread: ThreadId,
        class_object: ObjRef,
        field: FieldId<'g>,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        let owner = state.heap.get(class_object)?;
        if self.always_breaks_on(owner) || (owner.is_shared() && !owner.is_lock_protected(field))
        {
            log::info!("CG accessing shared static field {:?}", field);
            return Ok(self.runnable_cg(ids::SHARED_CLASS, state));
        }
        Ok(None)
    }

    fn sets_shared_array_cg<'g>(
        &self,
        state: &VmState<'g>,
        _thread: ThreadId,
        array: ObjRef,
        index: usize,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        if state.heap.get(array)?.is_shared() {
            log::info!("CG accessing shared array {}[{}]", array, index);
            return Ok(self.runnable_cg(ids::SHARED_ARRAY, state));
        }
        Ok(None)
    }

    fn sets_shared_object_exposure_cg<'g>(
        &self,
        state: &mut VmState<'g>,
        thread: ThreadId,
        object: ObjRef,
        _field: FieldId<'g>,
        exposed: ObjRef,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        self.sets_exposure_cg(state, thread, object, exposed)
    }

    fn sets_shared_class_exposure_cg<'g>(
        &self,
        state: &mut VmState<'g>,
        thread: ThreadId,
        class_object: ObjRef,
        _field: FieldId<'g>,
        exposed: ObjRef,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        self.sets_exposure_cg(state, thread, class_object, exposed)
    }

    fn sets_shared_array_exposure_cg<'g>(
        &self,
        state: &mut VmState<'g>,
        thread: ThreadId,
        array: ObjRef,
        exposed: ObjRef,
    ) -> Result<Option<Box<dyn ChoiceGenerator>>, Error> {
        self.sets_exposure_cg(state, thread, array, exposed)
    }
}

/// Class whose type rules apply to the element (the class itself, for static fields)
fn owner_class<'g>(element: &ElementInfo<'g>) -> Option<ClassId<'g>> {
    match &element.kind {
        ElementKind::Statics { class, .. } => Some(*class),
        _ => element.class(),
    }
}
