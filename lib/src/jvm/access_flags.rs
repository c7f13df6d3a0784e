use bitflags::bitflags;

bitflags! {
    /// Class modifiers the interpreter looks at
    ///
    /// `INTERFACE` and `ABSTRACT` decide whether `new` is allowed and how `invokeinterface`
    /// dispatches.
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
    }
}

bitflags! {
    /// Method modifiers
    ///
    /// `SYNCHRONIZED` methods take the lock of their receiver (or class object, when static) on
    /// entry. `NATIVE` methods have no body and must be handled as intrinsics.
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
    }
}

bitflags! {
    /// Field modifiers
    ///
    /// `FINAL` fields may be skipped as scheduling points, `VOLATILE` fields never are.
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
    }
}
