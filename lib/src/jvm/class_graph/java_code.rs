use super::{ClassId, Error, JavaLibrary, MethodId, ThrowableConstructors};
use crate::jvm::code::{BranchInstruction, CodeBuilder, EqComparison, Instruction, InvokeType};

impl<'g> JavaLibrary<'g> {
    /// Attach bytecode bodies to the non-native library methods
    pub(super) fn install_code(&self) -> Result<(), Error> {
        use Instruction::*;

        let lang_classes = &self.classes.lang;
        let lang = &self.members.lang;
        let object_init = lang.object.init;

        install(object_init, vec![Return])?;

        // Object.equals is reference equality
        let mut code = CodeBuilder::new(lang.object.equals);
        let different = code.fresh_label();
        code.push_instruction(ALoad(0))?;
        code.push_instruction(ALoad(1))?;
        code.push_branch_instruction(BranchInstruction::IfACmp(EqComparison::NE, different))?;
        code.push_instruction(IConst1)?;
        code.push_instruction(IReturn)?;
        code.place_label(different)?;
        code.push_instruction(IConst0)?;
        code.push_instruction(IReturn)?;
        code.install()?;

        install_super_init(lang.number.init, object_init)?;
        install_super_init(lang.record.init, object_init)?;
        install_super_init(lang.thread.init, object_init)?;

        install(
            lang.thread.init_runnable,
            vec![
                ALoad(0),
                Invoke(InvokeType::Special, object_init),
                ALoad(0),
                ALoad(1),
                PutField(lang.thread.target),
                Return,
            ],
        )?;

        // Thread.run delegates to the target, if there is one
        let mut code = CodeBuilder::new(lang.thread.run);
        let no_target = code.fresh_label();
        code.push_instruction(ALoad(0))?;
        code.push_instruction(GetField(lang.thread.target))?;
        code.push_branch_instruction(BranchInstruction::IfNull(EqComparison::EQ, no_target))?;
        code.push_instruction(ALoad(0))?;
        code.push_instruction(GetField(lang.thread.target))?;
        code.push_instruction(Invoke(
            lang.runnable.run.0.infer_invoke_type(),
            lang.runnable.run,
        ))?;
        code.place_label(no_target)?;
        code.push_instruction(Return)?;
        code.install()?;

        install(
            lang.integer.init,
            vec![
                ALoad(0),
                Invoke(InvokeType::Special, lang.number.init),
                ALoad(0),
                ILoad(1),
                PutField(lang.integer.value),
                Return,
            ],
        )?;
        install(
            lang.integer.value_of,
            vec![
                New(lang_classes.integer),
                Dup,
                ILoad(0),
                Invoke(InvokeType::Special, lang.integer.init),
                AReturn,
            ],
        )?;
        install(
            lang.integer.int_value,
            vec![ALoad(0), GetField(lang.integer.value), IReturn],
        )?;

        install_super_init(lang.throwable.init, object_init)?;
        install(
            lang.throwable.init_message,
            vec![
                ALoad(0),
                Invoke(InvokeType::Special, object_init),
                ALoad(0),
                ALoad(1),
                PutField(lang.throwable.detail_message),
                Return,
            ],
        )?;
        install(
            lang.throwable.get_message,
            vec![ALoad(0), GetField(lang.throwable.detail_message), AReturn],
        )?;

        // Every other throwable just forwards to its superclass constructors
        for class in lang_classes.throwables() {
            if class == lang_classes.throwable {
                continue;
            }
            self.install_throwable_constructors(class)?;
        }

        Ok(())
    }

    fn install_throwable_constructors(&self, class: ClassId<'g>) -> Result<(), Error> {
        use Instruction::*;

        let missing = || Error::MissingMember(format!("constructors of {:?}", class));
        let own = ThrowableConstructors::lookup(&self.classes, class).ok_or_else(missing)?;
        let parent = class
            .0
            .superclass
            .and_then(|superclass| ThrowableConstructors::lookup(&self.classes, superclass))
            .ok_or_else(missing)?;

        install_super_init(own.init, parent.init)?;
        install(
            own.init_message,
            vec![
                ALoad(0),
                ALoad(1),
                Invoke(InvokeType::Special, parent.init_message),
                Return,
            ],
        )
    }
}

/// Body that just calls a no-argument superclass constructor
fn install_super_init<'g>(method: MethodId<'g>, super_init: MethodId<'g>) -> Result<(), Error> {
    install(
        method,
        vec![
            Instruction::ALoad(0),
            Instruction::Invoke(InvokeType::Special, super_init),
            Instruction::Return,
        ],
    )
}

/// Install straight-line code
fn install<'g>(method: MethodId<'g>, instructions: Vec<Instruction<'g>>) -> Result<(), Error> {
    let mut code = CodeBuilder::new(method);
    for insn in instructions {
        code.push_instruction(insn)?;
    }
    code.install()
}

#[cfg(test)]
mod test {
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas};

    #[test]
    fn non_native_methods_have_bodies() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types().unwrap();

        for class in java.classes.all() {
            for method in class.0.methods.iter() {
                assert_eq!(
                    method.code().is_some(),
                    !method.is_native() && !method.is_abstract(),
                    "{:?}",
                    method
                );
            }
        }
    }

    #[test]
    fn thread_run_checks_for_a_target() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        let java = class_graph.insert_java_library_types().unwrap();

        let run = java.members.lang.thread.run.body().unwrap();
        assert_eq!(run.max_locals, 1);
        assert_eq!(run.instructions.len(), 7);
        assert!(run.instructions[5].is_invoke());
    }
}
