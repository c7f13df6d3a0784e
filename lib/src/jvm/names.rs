use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods, fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BinaryName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid unqualified name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extact the raw underlying string data:
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extact the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(format!("Unqualified name '{}' is empty", name))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(UnqualifiedName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(format!("Binary name '{}' is empty", name))
        } else {
            name.split('/').map(UnqualifiedName::check_valid).collect()
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        match Self::check_valid(&name) {
            Ok(()) => Ok(BinaryName(Cow::Owned(name))),
            Err(msg) => Err(msg),
        }
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}
impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}
impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl UnqualifiedName {
    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    /// Is this one of the angle bracketed initializer names?
    pub fn is_initializer(&self) -> bool {
        *self == Self::INIT || *self == Self::CLINIT
    }

    // JDK names
    pub const BEGINATOMIC: Self = Self::name("beginAtomic");
    pub const BOOTSTRAP: Self = Self::name("bootstrap");
    pub const CURRENTTHREAD: Self = Self::name("currentThread");
    pub const DETAILMESSAGE: Self = Self::name("detailMessage");
    pub const ENDATOMIC: Self = Self::name("endAtomic");
    pub const EQUALS: Self = Self::name("equals");
    pub const GETBOOLEAN: Self = Self::name("getBoolean");
    pub const GETCLASS: Self = Self::name("getClass");
    pub const GETINT: Self = Self::name("getInt");
    pub const GETMESSAGE: Self = Self::name("getMessage");
    pub const HASHCODE: Self = Self::name("hashCode");
    pub const INTVALUE: Self = Self::name("intValue");
    pub const ISALIVE: Self = Self::name("isAlive");
    pub const JOIN: Self = Self::name("join");
    pub const LENGTH: Self = Self::name("length");
    pub const METAFACTORY: Self = Self::name("metafactory");
    pub const NOTIFY: Self = Self::name("notify");
    pub const NOTIFYALL: Self = Self::name("notifyAll");
    pub const RUN: Self = Self::name("run");
    pub const START: Self = Self::name("start");
    pub const TARGET: Self = Self::name("target");
    pub const TOSTRING: Self = Self::name("toString");
    pub const VALUE: Self = Self::name("value");
    pub const VALUEOF: Self = Self::name("valueOf");
    pub const WAIT: Self = Self::name("wait");
    pub const YIELD: Self = Self::name("yield");

    // Compiler generated names that never cause scheduling decisions
    pub const ASSERTIONSDISABLED: Self = Self::name("$assertionsDisabled");

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");
}

impl BinaryName {
    /// Join segments from the other name onto the end of this binary name
    pub fn join(&self, other: impl Name) -> BinaryName {
        BinaryName(Cow::Owned(format!("{}/{}", self.as_str(), other.as_str())))
    }

    /// Name without the package or enclosing class prefix (`java/util/Map$Entry` is `Entry`)
    pub fn simple_name(&self) -> &str {
        let name = self.as_str();
        let start = name.rfind(&['/', '$'][..]).map_or(0, |idx| idx + 1);
        &name[start..]
    }

    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    // JDK names
    pub const ABSTRACTMETHODERROR: Self = Self::name("java/lang/AbstractMethodError");
    pub const ARITHMETICEXCEPTION: Self = Self::name("java/lang/ArithmeticException");
    pub const ARRAYINDEXOUTOFBOUNDSEXCEPTION: Self =
        Self::name("java/lang/ArrayIndexOutOfBoundsException");
    pub const ARRAYSTOREEXCEPTION: Self = Self::name("java/lang/ArrayStoreException");
    pub const ASSERTIONERROR: Self = Self::name("java/lang/AssertionError");
    pub const CLASS: Self = Self::name("java/lang/Class");
    pub const CLASSCASTEXCEPTION: Self = Self::name("java/lang/ClassCastException");
    pub const CLONEABLE: Self = Self::name("java/lang/Cloneable");
    pub const ERROR: Self = Self::name("java/lang/Error");
    pub const EXCEPTION: Self = Self::name("java/lang/Exception");
    pub const ILLEGALARGUMENTEXCEPTION: Self = Self::name("java/lang/IllegalArgumentException");
    pub const ILLEGALMONITORSTATEEXCEPTION: Self =
        Self::name("java/lang/IllegalMonitorStateException");
    pub const ILLEGALTHREADSTATEEXCEPTION: Self =
        Self::name("java/lang/IllegalThreadStateException");
    pub const INCOMPATIBLECLASSCHANGEERROR: Self =
        Self::name("java/lang/IncompatibleClassChangeError");
    pub const INDEXOUTOFBOUNDSEXCEPTION: Self = Self::name("java/lang/IndexOutOfBoundsException");
    pub const INTEGER: Self = Self::name("java/lang/Integer");
    pub const INTERRUPTEDEXCEPTION: Self = Self::name("java/lang/InterruptedException");
    pub const LAMBDAMETAFACTORY: Self = Self::name("java/lang/invoke/LambdaMetafactory");
    pub const LINKAGEERROR: Self = Self::name("java/lang/LinkageError");
    pub const NEGATIVEARRAYSIZEEXCEPTION: Self =
        Self::name("java/lang/NegativeArraySizeException");
    pub const NOCLASSDEFFOUNDERROR: Self = Self::name("java/lang/NoClassDefFoundError");
    pub const NOSUCHFIELDERROR: Self = Self::name("java/lang/NoSuchFieldError");
    pub const NOSUCHMETHODERROR: Self = Self::name("java/lang/NoSuchMethodError");
    pub const NULLPOINTEREXCEPTION: Self = Self::name("java/lang/NullPointerException");
    pub const NUMBER: Self = Self::name("java/lang/Number");
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const OBJECTMETHODS: Self = Self::name("java/lang/runtime/ObjectMethods");
    pub const OUTOFMEMORYERROR: Self = Self::name("java/lang/OutOfMemoryError");
    pub const RECORD: Self = Self::name("java/lang/Record");
    pub const RUNNABLE: Self = Self::name("java/lang/Runnable");
    pub const RUNTIMEEXCEPTION: Self = Self::name("java/lang/RuntimeException");
    pub const SERIALIZABLE: Self = Self::name("java/io/Serializable");
    pub const STACKOVERFLOWERROR: Self = Self::name("java/lang/StackOverflowError");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const THREAD: Self = Self::name("java/lang/Thread");
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");
    pub const VIRTUALMACHINEERROR: Self = Self::name("java/lang/VirtualMachineError");

    // Model checker API
    pub const VERIFY: Self = Self::name("gov/nasa/jpf/vm/Verify");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validity() {
        assert!(UnqualifiedName::from_string(String::from("counter")).is_ok());
        assert!(UnqualifiedName::from_string(String::from("a/b")).is_err());
        assert!(UnqualifiedName::from_string(String::new()).is_err());
        assert!(BinaryName::from_string(String::from("demo/Counter")).is_ok());
        assert!(BinaryName::from_string(String::from("demo//Counter")).is_err());
    }

    #[test]
    fn simple_names() {
        assert_eq!(BinaryName::OBJECT.simple_name(), "Object");
        assert_eq!(
            BinaryName::from_string(String::from("demo/Outer$Point"))
                .unwrap()
                .simple_name(),
            "Point"
        );
        assert_eq!(
            BinaryName::from_string(String::from("Point")).unwrap().simple_name(),
            "Point"
        );
    }
}
