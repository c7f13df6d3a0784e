//! Depth-first exploration of the choice generator tree
//!
//! Every time a transition ends at a choice point, the search saves the state of the program
//! alongside the new choice generator. Each choice is then explored in turn by restoring that
//! snapshot, applying the choice, and running the next transition. Since states are never compared
//! to each other, every path through the tree is explored (there is no state matching).

use crate::vm::{ChoiceGenerator, ChoiceRecord, Error, Property, TransitionOutcome, Vm, VmState};
use std::fmt;

/// A pending branching point
struct Node<'g> {
    /// State right after the choice generator was registered
    state: VmState<'g>,
    cg: Box<dyn ChoiceGenerator>,

    /// Length of the choice path when the choice generator was registered
    path_len: usize,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Transitions executed (across all paths)
    pub transitions: u64,

    /// Paths which ended with every thread terminated
    pub end_states: u64,

    /// Deepest stack of choice generators seen
    pub max_depth: usize,

    /// Choice generators whose choices were exhausted
    pub backtracks: u64,

    /// Paths cut short by the search depth limit
    pub truncated_paths: u64,

    /// Instructions interpreted (across all paths)
    pub instructions: u64,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "transitions:     {}", self.transitions)?;
        writeln!(f, "end states:      {}", self.end_states)?;
        writeln!(f, "max depth:       {}", self.max_depth)?;
        writeln!(f, "backtracks:      {}", self.backtracks)?;
        if self.truncated_paths > 0 {
            writeln!(f, "truncated paths: {}", self.truncated_paths)?;
        }
        write!(f, "instructions:    {}", self.instructions)
    }
}

/// A violated property, with the choices leading up to it
#[derive(Clone, Debug)]
pub struct Violation<'g> {
    pub property: Property<'g>,
    pub trace: Vec<ChoiceRecord>,
}

impl<'g> fmt::Display for Violation<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.property)?;
        for (step, record) in self.trace.iter().enumerate() {
            write!(
                f,
                "  #{} {} {:?} ({}/{})",
                step,
                record.id,
                record.choice,
                record.index + 1,
                record.total
            )?;
            if step + 1 < self.trace.len() {
                f.write_str("\n")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct SearchReport<'g> {
    pub statistics: Statistics,
    pub violations: Vec<Violation<'g>>,
}

impl<'g> SearchReport<'g> {
    /// No property was violated on any explored path
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Should the search keep going after handling a transition outcome?
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

type EndStateCallback<'a, 'g> = Box<dyn FnMut(&VmState<'g>, &[ChoiceRecord]) + 'a>;

/// Depth-first search over a VM whose main thread has already been started
pub struct Search<'a, 'g> {
    vm: &'a mut Vm<'g>,

    /// Called at the end of every path where all threads terminated
    end_state: Option<EndStateCallback<'a, 'g>>,
}

impl<'a, 'g> Search<'a, 'g> {
    pub fn new(vm: &'a mut Vm<'g>) -> Search<'a, 'g> {
        Search {
            vm,
            end_state: None,
        }
    }

    /// Register a callback invoked with the final state of every completed path
    pub fn on_end_state(
        mut self,
        callback: impl FnMut(&VmState<'g>, &[ChoiceRecord]) + 'a,
    ) -> Search<'a, 'g> {
        self.end_state = Some(Box::new(callback));
        self
    }

    /// Explore every path, or stop at the first violation if the settings say so
    pub fn run(mut self) -> Result<SearchReport<'g>, Error> {
        let mut statistics = Statistics::default();
        let mut violations = vec![];
        let mut stack: Vec<Node<'g>> = vec![];

        let first = match self.vm.root_cg()? {
            Some(cg) => TransitionOutcome::ChoicePoint(cg),
            None => {
                statistics.transitions += 1;
                self.vm.run_transition()?
            }
        };
        let mut flow = self.handle(first, &mut stack, &mut statistics, &mut violations)?;

        while flow == Flow::Continue {
            let node = match stack.last_mut() {
                Some(node) => node,
                None => break,
            };
            if !node.cg.has_more_choices() {
                log::debug!("backtracking from {} CG", node.cg.id());
                stack.pop();
                statistics.backtracks += 1;
                continue;
            }

            node.cg.advance();
            self.vm.restore(node.state.clone(), node.path_len);
            self.vm.apply_choice(&*node.cg)?;

            statistics.transitions += 1;
            let outcome = self.vm.run_transition()?;
            flow = self.handle(outcome, &mut stack, &mut statistics, &mut violations)?;
        }

        statistics.instructions = self.vm.instructions_executed();
        log::info!(
            "search done: {} transitions, {} end states, {} violations",
            statistics.transitions,
            statistics.end_states,
            violations.len()
        );
        Ok(SearchReport {
            statistics,
            violations,
        })
    }

    fn handle(
        &mut self,
        outcome: TransitionOutcome<'g>,
        stack: &mut Vec<Node<'g>>,
        statistics: &mut Statistics,
        violations: &mut Vec<Violation<'g>>,
    ) -> Result<Flow, Error> {
        match outcome {
            TransitionOutcome::ChoicePoint(cg) => {
                // Nothing to choose from while threads are still alive
                if cg.total_choices() == 0 {
                    let threads = self.vm.state.live_threads();
                    if threads.is_empty() {
                        return Ok(self.end_state(statistics));
                    }
                    let property = Property::Deadlock { threads };
                    self.vm.report_violation(&property);
                    return Ok(self.violation(property, violations));
                }

                if let Some(max_depth) = self.vm.settings.max_search_depth {
                    if stack.len() >= max_depth {
                        log::debug!("depth limit reached at {} CG", cg.id());
                        statistics.truncated_paths += 1;
                        return Ok(Flow::Continue);
                    }
                }

                stack.push(Node {
                    state: self.vm.state.clone(),
                    cg,
                    path_len: self.vm.choice_path().len(),
                });
                statistics.max_depth = statistics.max_depth.max(stack.len());
                Ok(Flow::Continue)
            }
            TransitionOutcome::EndState => Ok(self.end_state(statistics)),
            TransitionOutcome::Violation(property) => Ok(self.violation(property, violations)),
        }
    }

    fn end_state(&mut self, statistics: &mut Statistics) -> Flow {
        statistics.end_states += 1;
        if let Some(callback) = &mut self.end_state {
            callback(&self.vm.state, self.vm.choice_path());
        }
        Flow::Continue
    }

    fn violation(&mut self, property: Property<'g>, violations: &mut Vec<Violation<'g>>) -> Flow {
        violations.push(Violation {
            property,
            trace: self.vm.choice_path().to_vec(),
        });
        if self.vm.settings.stop_on_first_violation {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::*;
    use crate::jvm::code::{CodeBuilder, Instruction::*, InvokeType};
    use crate::jvm::*;
    use crate::vm::{Choice, Settings};

    fn main_method<'g>(class_graph: &ClassGraph<'g>, java: &JavaLibrary<'g>) -> MethodId<'g> {
        let class = class_graph.add_class(ClassData::new(
            BinaryName::from_string(String::from("demo/Choose")).unwrap(),
            java.classes.lang.object,
            ClassAccessFlags::PUBLIC,
        ));
        class_graph.add_method(MethodData::new(
            class,
            UnqualifiedName::from_string(String::from("main")).unwrap(),
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        ))
    }

    #[test]
    fn every_boolean_combination_is_explored() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types().unwrap();
        let get_boolean = java.members.verify.get_boolean;

        let main = main_method(&class_graph, &java);
        let mut code = CodeBuilder::new(main);
        code.push_instruction(Invoke(InvokeType::Static, get_boolean)).unwrap();
        code.push_instruction(IStore(0)).unwrap();
        code.push_instruction(Invoke(InvokeType::Static, get_boolean)).unwrap();
        code.push_instruction(IStore(1)).unwrap();
        code.push_instruction(Return).unwrap();
        code.install().unwrap();

        let mut vm = Vm::new(java, Settings::new());
        vm.start(main).unwrap();

        let mut seen = vec![];
        let report = Search::new(&mut vm)
            .on_end_state(|_, path| {
                let choices: Vec<Choice> = path
                    .iter()
                    .filter(|record| record.id == "verifyGetBoolean")
                    .map(|record| record.choice)
                    .collect();
                seen.push(choices);
            })
            .run()
            .unwrap();

        assert!(report.is_clean());
        assert_eq!(report.statistics.end_states, 4);
        assert_eq!(report.statistics.max_depth, 3);
        assert_eq!(
            seen,
            vec![
                vec![Choice::Boolean(false), Choice::Boolean(false)],
                vec![Choice::Boolean(false), Choice::Boolean(true)],
                vec![Choice::Boolean(true), Choice::Boolean(false)],
                vec![Choice::Boolean(true), Choice::Boolean(true)],
            ]
        );
    }

    /// `int x = Verify.getInt(0, 3); int y = 6 / (x - 2);`
    fn divide_by_choice<'g>(
        class_graph: &ClassGraph<'g>,
        java: &JavaLibrary<'g>,
    ) -> MethodId<'g> {
        let main = main_method(class_graph, java);
        let mut code = CodeBuilder::new(main);
        code.push_instruction(IConst0).unwrap();
        code.push_instruction(IConst3).unwrap();
        code.push_instruction(Invoke(InvokeType::Static, java.members.verify.get_int))
            .unwrap();
        code.push_instruction(IStore(0)).unwrap();
        code.push_instruction(BiPush(6)).unwrap();
        code.push_instruction(ILoad(0)).unwrap();
        code.push_instruction(IConst2).unwrap();
        code.push_instruction(ISub).unwrap();
        code.push_instruction(IDiv).unwrap();
        code.push_instruction(IStore(1)).unwrap();
        code.push_instruction(Return).unwrap();
        code.install().unwrap();
        main
    }

    #[test]
    fn violation_carries_its_trace() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types().unwrap();
        let arithmetic_exception = java.classes.lang.arithmetic_exception;
        let main = divide_by_choice(&class_graph, &java);

        let mut vm = Vm::new(java, Settings::new());
        vm.start(main).unwrap();
        let report = Search::new(&mut vm).run().unwrap();

        // Stops at the first violation: x = 0 and x = 1 completed before that
        assert_eq!(report.statistics.end_states, 2);
        assert_eq!(report.violations.len(), 1);
        let violation = &report.violations[0];
        assert!(matches!(
            &violation.property,
            Property::UncaughtException { class, .. } if *class == arithmetic_exception
        ));
        let last = violation.trace.last().unwrap();
        assert_eq!(last.choice, Choice::Int(2));
        assert_eq!((last.index, last.total), (2, 4));
    }

    #[test]
    fn search_can_continue_past_violations() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types().unwrap();
        let main = divide_by_choice(&class_graph, &java);

        let mut settings = Settings::new();
        settings.stop_on_first_violation = false;
        let mut vm = Vm::new(java, settings);
        vm.start(main).unwrap();

        let report = Search::new(&mut vm).run().unwrap();
        assert_eq!(report.statistics.end_states, 3);
        assert_eq!(report.violations.len(), 1);
    }

    #[test]
    fn depth_limit_truncates_paths() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types().unwrap();
        let main = divide_by_choice(&class_graph, &java);

        let mut settings = Settings::new();
        settings.max_search_depth = Some(1);
        let mut vm = Vm::new(java, settings);
        vm.start(main).unwrap();
        let report = Search::new(&mut vm).run().unwrap();

        // Only the root choice fits, so the `getInt` choice point is never expanded
        assert!(report.is_clean());
        assert_eq!(report.statistics.end_states, 0);
        assert_eq!(report.statistics.truncated_paths, 1);
        assert_eq!(report.statistics.max_depth, 1);
    }

    #[test]
    fn restored_state_does_not_leak_between_paths() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types().unwrap();
        let main = divide_by_choice(&class_graph, &java);

        let mut settings = Settings::new();
        settings.stop_on_first_violation = false;
        let mut vm = Vm::new(java, settings);
        vm.start(main).unwrap();

        let mut divided = vec![];
        Search::new(&mut vm)
            .on_end_state(|state, path| {
                let x = match path.last().map(|record| record.choice) {
                    Some(Choice::Int(x)) => x,
                    other => panic!("unexpected choice {:?}", other),
                };
                assert!(state.all_terminated());
                divided.push(x);
            })
            .run()
            .unwrap();
        assert_eq!(divided, vec![0, 1, 3]);
    }
}
