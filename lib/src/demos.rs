//! Small bundled programs exercising each kind of error the checker looks for
//!
//! Each demo is built directly into a class graph (there is no class file parsing). The Java each
//! one corresponds to is given on the builder function.

use crate::jvm::class_graph::{
    ClassData, ClassGraph, ClassId, ConstantData, FieldData, FieldId, JavaLibrary, MethodData,
    MethodId, ThrowableConstructors,
};
use crate::jvm::code::{BranchInstruction, CodeBuilder, Instruction::*, InvokeType, OrdComparison};
use crate::jvm::{
    BinaryName, ClassAccessFlags, Error, FieldAccessFlags, FieldType, MethodAccessFlags,
    MethodDescriptor, Name, RefType, UnqualifiedName,
};
use std::borrow::Cow;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Demo {
    LostUpdate,
    SynchronizedCounter,
    Deadlock,
    ArrayStore,
    ClinitRace,
    Nondeterminism,
}

impl Demo {
    pub const ALL: [Demo; 6] = [
        Demo::LostUpdate,
        Demo::SynchronizedCounter,
        Demo::Deadlock,
        Demo::ArrayStore,
        Demo::ClinitRace,
        Demo::Nondeterminism,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Demo::LostUpdate => "lost-update",
            Demo::SynchronizedCounter => "synchronized-counter",
            Demo::Deadlock => "deadlock",
            Demo::ArrayStore => "array-store",
            Demo::ClinitRace => "clinit-race",
            Demo::Nondeterminism => "nondeterminism",
        }
    }

    pub fn from_name(name: &str) -> Option<Demo> {
        Demo::ALL.iter().copied().find(|demo| demo.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Demo::LostUpdate => "two threads increment a static field without locking",
            Demo::SynchronizedCounter => {
                "two threads increment a static field in a synchronized method"
            }
            Demo::Deadlock => "two threads take the same two locks in opposite orders",
            Demo::ArrayStore => "an Integer is stored into a String[] seen as an Object[]",
            Demo::ClinitRace => "two threads race to trigger a static initializer",
            Demo::Nondeterminism => "a division by a value chosen with Verify.getInt/getBoolean",
        }
    }

    /// Does the search find a property violation for this demo?
    pub fn expects_violation(self) -> bool {
        !matches!(self, Demo::SynchronizedCounter | Demo::ClinitRace)
    }

    /// Add the classes of the demo to the graph, returning its `main` method
    pub fn build<'g>(
        self,
        class_graph: &ClassGraph<'g>,
        java: &JavaLibrary<'g>,
    ) -> Result<MethodId<'g>, Error> {
        let builder = DemoBuilder { class_graph, java };
        match self {
            Demo::LostUpdate => builder.counter(false),
            Demo::SynchronizedCounter => builder.counter(true),
            Demo::Deadlock => builder.deadlock(),
            Demo::ArrayStore => builder.array_store(),
            Demo::ClinitRace => builder.clinit_race(),
            Demo::Nondeterminism => builder.nondeterminism(),
        }
    }
}

struct DemoBuilder<'a, 'g> {
    class_graph: &'a ClassGraph<'g>,
    java: &'a JavaLibrary<'g>,
}

impl<'a, 'g> DemoBuilder<'a, 'g> {
    fn class(&self, name: &str, interfaces: &[ClassId<'g>]) -> Result<ClassId<'g>, Error> {
        let name = BinaryName::from_string(format!("demo/{}", name)).map_err(Error::BadName)?;
        let data = ClassData::new(
            name,
            self.java.classes.lang.object,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        );
        for interface in interfaces {
            data.interfaces.push(*interface);
        }
        Ok(self.class_graph.add_class(data))
    }

    fn method(
        &self,
        class: ClassId<'g>,
        name: UnqualifiedName,
        parameters: Vec<FieldType<ClassId<'g>>>,
        return_type: Option<FieldType<ClassId<'g>>>,
        access_flags: MethodAccessFlags,
    ) -> MethodId<'g> {
        self.class_graph.add_method(MethodData::new(
            class,
            name,
            MethodDescriptor {
                parameters,
                return_type,
            },
            access_flags,
        ))
    }

    fn static_field(
        &self,
        class: ClassId<'g>,
        name: &str,
        descriptor: FieldType<ClassId<'g>>,
    ) -> Result<FieldId<'g>, Error> {
        Ok(self.class_graph.add_field(FieldData {
            class,
            name: UnqualifiedName::from_string(String::from(name)).map_err(Error::BadName)?,
            descriptor,
            access_flags: FieldAccessFlags::STATIC,
        }))
    }

    /// `public static void main(String[] args)`, with a body yet to be written
    fn main_method(&self, class: ClassId<'g>) -> Result<MethodId<'g>, Error> {
        let string_array = FieldType::array(FieldType::object(self.java.classes.lang.string));
        Ok(self.method(
            class,
            UnqualifiedName::from_string(String::from("main")).map_err(Error::BadName)?,
            vec![string_array],
            None,
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        ))
    }

    /// Constructor which only calls `Object.<init>`
    fn default_constructor(&self, class: ClassId<'g>) -> Result<MethodId<'g>, Error> {
        let init = self.method(
            class,
            UnqualifiedName::INIT,
            vec![],
            None,
            MethodAccessFlags::PUBLIC,
        );
        let mut code = CodeBuilder::new(init);
        code.push_instruction(ALoad(0))?;
        code.push_instruction(Invoke(InvokeType::Special, self.java.members.lang.object.init))?;
        code.push_instruction(Return)?;
        code.install()?;
        Ok(init)
    }

    /// `Runnable` class whose `run` method is written by `body`
    fn runnable(
        &self,
        name: &str,
        body: impl FnOnce(&mut CodeBuilder<'g>) -> Result<(), Error>,
    ) -> Result<MethodId<'g>, Error> {
        let class = self.class(name, &[self.java.classes.lang.runnable])?;
        let init = self.default_constructor(class)?;
        let run = self.method(
            class,
            UnqualifiedName::RUN,
            vec![],
            None,
            MethodAccessFlags::PUBLIC,
        );
        let mut code = CodeBuilder::new(run);
        body(&mut code)?;
        code.install()?;
        Ok(init)
    }

    /// Push `new Thread(new R())` where `runnable_init` is the constructor of `R`
    fn new_thread(
        &self,
        code: &mut CodeBuilder<'g>,
        runnable_init: MethodId<'g>,
    ) -> Result<(), Error> {
        code.push_instruction(New(self.java.classes.lang.thread))?;
        code.push_instruction(Dup)?;
        code.push_instruction(New(runnable_init.0.class))?;
        code.push_instruction(Dup)?;
        code.push_instruction(Invoke(InvokeType::Special, runnable_init))?;
        code.push_instruction(Invoke(
            InvokeType::Special,
            self.java.members.lang.thread.init_runnable,
        ))
    }

    /// Start one thread per runnable (kept in locals from 1 up), then join them all
    fn start_and_join(
        &self,
        code: &mut CodeBuilder<'g>,
        runnables: &[MethodId<'g>],
    ) -> Result<(), Error> {
        let thread = &self.java.members.lang.thread;
        for (idx, runnable_init) in runnables.iter().enumerate() {
            self.new_thread(code, *runnable_init)?;
            code.push_instruction(AStore(idx as u16 + 1))?;
        }
        for idx in 0..runnables.len() {
            code.push_instruction(ALoad(idx as u16 + 1))?;
            code.push_instruction(Invoke(thread.start.0.infer_invoke_type(), thread.start))?;
        }
        for idx in 0..runnables.len() {
            code.push_instruction(ALoad(idx as u16 + 1))?;
            code.push_instruction(Invoke(thread.join.0.infer_invoke_type(), thread.join))?;
        }
        Ok(())
    }

    /// Compare the `int` on the stack to `expected`, throwing an `AssertionError` if they differ
    fn assert_int(
        &self,
        code: &mut CodeBuilder<'g>,
        expected: i8,
        message: &'static str,
    ) -> Result<(), Error> {
        let assertion_error = self.java.classes.lang.assertion_error;
        let constructors = ThrowableConstructors::lookup(&self.java.classes, assertion_error)
            .ok_or_else(|| Error::MissingMember(String::from("AssertionError.<init>")))?;

        let ok = code.fresh_label();
        code.push_instruction(BiPush(expected))?;
        code.push_branch_instruction(BranchInstruction::IfICmp(OrdComparison::EQ, ok))?;
        code.push_instruction(New(assertion_error))?;
        code.push_instruction(Dup)?;
        code.push_instruction(Ldc(ConstantData::String(Cow::Borrowed(message))))?;
        code.push_instruction(Invoke(InvokeType::Special, constructors.init_message))?;
        code.push_instruction(AThrow)?;
        code.place_label(ok)
    }

    /// ```java,ignore
    /// class Counter {
    ///     static int count;
    ///
    ///     static [synchronized] void increment() { count = count + 1; }
    ///
    ///     public static void main(String[] args) throws InterruptedException {
    ///         Thread t1 = new Thread(new Incrementer());
    ///         Thread t2 = new Thread(new Incrementer());
    ///         t1.start(); t2.start();
    ///         t1.join(); t2.join();
    ///         assert count == 2 : "lost update";
    ///     }
    /// }
    ///
    /// class Incrementer implements Runnable {
    ///     public void run() { Counter.increment(); }
    /// }
    /// ```
    fn counter(&self, synchronized: bool) -> Result<MethodId<'g>, Error> {
        let class_name = if synchronized { "SynchronizedCounter" } else { "Counter" };
        let class = self.class(class_name, &[])?;
        let count = self.static_field(class, "count", FieldType::int())?;

        let mut flags = MethodAccessFlags::STATIC;
        if synchronized {
            flags |= MethodAccessFlags::SYNCHRONIZED;
        }
        let increment = self.method(
            class,
            UnqualifiedName::from_string(String::from("increment")).map_err(Error::BadName)?,
            vec![],
            None,
            flags,
        );
        let mut code = CodeBuilder::new(increment);
        code.push_instruction(GetStatic(count))?;
        code.push_instruction(IConst1)?;
        code.push_instruction(IAdd)?;
        code.push_instruction(PutStatic(count))?;
        code.push_instruction(Return)?;
        code.install()?;

        let incrementer = self.runnable(&format!("{}$Incrementer", class_name), |code| {
            code.push_instruction(Invoke(InvokeType::Static, increment))?;
            code.push_instruction(Return)
        })?;

        let main = self.main_method(class)?;
        let mut code = CodeBuilder::new(main);
        self.start_and_join(&mut code, &[incrementer, incrementer])?;
        code.push_instruction(GetStatic(count))?;
        self.assert_int(&mut code, 2, "lost update")?;
        code.push_instruction(Return)?;
        code.install()?;
        Ok(main)
    }

    /// ```java,ignore
    /// class Deadlock {
    ///     static Object left = new Object();
    ///     static Object right = new Object();
    ///
    ///     public static void main(String[] args) throws InterruptedException {
    ///         Thread t1 = new Thread(() -> { synchronized (left) { synchronized (right) { } } });
    ///         Thread t2 = new Thread(() -> { synchronized (right) { synchronized (left) { } } });
    ///         t1.start(); t2.start();
    ///         t1.join(); t2.join();
    ///     }
    /// }
    /// ```
    fn deadlock(&self) -> Result<MethodId<'g>, Error> {
        let object = self.java.classes.lang.object;
        let class = self.class("Deadlock", &[])?;
        let left = self.static_field(class, "left", FieldType::object(object))?;
        let right = self.static_field(class, "right", FieldType::object(object))?;

        let nested_locks = |outer: FieldId<'g>, inner: FieldId<'g>| {
            move |code: &mut CodeBuilder<'g>| -> Result<(), Error> {
                code.push_instruction(GetStatic(outer))?;
                code.push_instruction(MonitorEnter)?;
                code.push_instruction(GetStatic(inner))?;
                code.push_instruction(MonitorEnter)?;
                code.push_instruction(GetStatic(inner))?;
                code.push_instruction(MonitorExit)?;
                code.push_instruction(GetStatic(outer))?;
                code.push_instruction(MonitorExit)?;
                code.push_instruction(Return)
            }
        };
        let left_first = self.runnable("Deadlock$LeftFirst", nested_locks(left, right))?;
        let right_first = self.runnable("Deadlock$RightFirst", nested_locks(right, left))?;

        let clinit = self.method(
            class,
            UnqualifiedName::CLINIT,
            vec![],
            None,
            MethodAccessFlags::STATIC,
        );
        let mut code = CodeBuilder::new(clinit);
        for field in [left, right] {
            code.push_instruction(New(object))?;
            code.push_instruction(Dup)?;
            code.push_instruction(Invoke(InvokeType::Special, self.java.members.lang.object.init))?;
            code.push_instruction(PutStatic(field))?;
        }
        code.push_instruction(Return)?;
        code.install()?;

        let main = self.main_method(class)?;
        let mut code = CodeBuilder::new(main);
        self.start_and_join(&mut code, &[left_first, right_first])?;
        code.push_instruction(Return)?;
        code.install()?;
        Ok(main)
    }

    /// ```java,ignore
    /// class ArrayStore {
    ///     public static void main(String[] args) {
    ///         Object[] array = new String[2];
    ///         array[0] = Integer.valueOf(1);
    ///     }
    /// }
    /// ```
    fn array_store(&self) -> Result<MethodId<'g>, Error> {
        let class = self.class("ArrayStore", &[])?;
        let main = self.main_method(class)?;
        let mut code = CodeBuilder::new(main);
        code.push_instruction(IConst2)?;
        code.push_instruction(ANewArray(RefType::Object(self.java.classes.lang.string)))?;
        code.push_instruction(AStore(1))?;
        code.push_instruction(ALoad(1))?;
        code.push_instruction(IConst0)?;
        code.push_instruction(IConst1)?;
        code.push_instruction(Invoke(
            InvokeType::Static,
            self.java.members.lang.integer.value_of,
        ))?;
        code.push_instruction(AAStore)?;
        code.push_instruction(Return)?;
        code.install()?;
        Ok(main)
    }

    /// ```java,ignore
    /// class Config {
    ///     static int loads;
    ///     static { loads = loads + 1; }
    /// }
    ///
    /// class ClinitRace {
    ///     public static void main(String[] args) throws InterruptedException {
    ///         Thread t1 = new Thread(() -> { assert Config.loads == 1; });
    ///         Thread t2 = new Thread(() -> { assert Config.loads == 1; });
    ///         t1.start(); t2.start();
    ///         t1.join(); t2.join();
    ///         assert Config.loads == 1;
    ///     }
    /// }
    /// ```
    fn clinit_race(&self) -> Result<MethodId<'g>, Error> {
        let config = self.class("Config", &[])?;
        let loads = self.static_field(config, "loads", FieldType::int())?;
        let clinit = self.method(
            config,
            UnqualifiedName::CLINIT,
            vec![],
            None,
            MethodAccessFlags::STATIC,
        );
        let mut code = CodeBuilder::new(clinit);
        code.push_instruction(GetStatic(loads))?;
        code.push_instruction(IConst1)?;
        code.push_instruction(IAdd)?;
        code.push_instruction(PutStatic(loads))?;
        code.push_instruction(Return)?;
        code.install()?;

        let reader = self.runnable("ClinitRace$Reader", |code| {
            code.push_instruction(GetStatic(loads))?;
            self.assert_int(code, 1, "static initializer ran twice")?;
            code.push_instruction(Return)
        })?;

        let class = self.class("ClinitRace", &[])?;
        let main = self.main_method(class)?;
        let mut code = CodeBuilder::new(main);
        self.start_and_join(&mut code, &[reader, reader])?;
        code.push_instruction(GetStatic(loads))?;
        self.assert_int(&mut code, 1, "static initializer ran twice")?;
        code.push_instruction(Return)?;
        code.install()?;
        Ok(main)
    }

    /// ```java,ignore
    /// class Nondeterminism {
    ///     public static void main(String[] args) {
    ///         int x = Verify.getInt(0, 3);
    ///         if (Verify.getBoolean()) {
    ///             x = -x;
    ///         }
    ///         int y = 12 / (x + 3);
    ///     }
    /// }
    /// ```
    fn nondeterminism(&self) -> Result<MethodId<'g>, Error> {
        let verify = &self.java.members.verify;
        let class = self.class("Nondeterminism", &[])?;
        let main = self.main_method(class)?;
        let mut code = CodeBuilder::new(main);
        let keep_sign = code.fresh_label();
        code.push_instruction(IConst0)?;
        code.push_instruction(IConst3)?;
        code.push_instruction(Invoke(InvokeType::Static, verify.get_int))?;
        code.push_instruction(IStore(1))?;
        code.push_instruction(Invoke(InvokeType::Static, verify.get_boolean))?;
        code.push_branch_instruction(BranchInstruction::If(OrdComparison::EQ, keep_sign))?;
        code.push_instruction(ILoad(1))?;
        code.push_instruction(INeg)?;
        code.push_instruction(IStore(1))?;
        code.place_label(keep_sign)?;
        code.push_instruction(BiPush(12))?;
        code.push_instruction(ILoad(1))?;
        code.push_instruction(IConst3)?;
        code.push_instruction(IAdd)?;
        code.push_instruction(IDiv)?;
        code.push_instruction(IStore(2))?;
        code.push_instruction(Return)?;
        code.install()?;
        Ok(main)
    }
}
