use crate::vm::ObjRef;

/// Locks which might be protecting accesses to one field of one object
///
/// The candidate set starts as the locks held on the first shared access, and is intersected with
/// the locks held on each following access. Once the set survives enough checks without becoming
/// empty, the field is assumed to be protected and its accesses stop being scheduling points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldLockInfo {
    /// No lock consistently protects the field
    Empty,

    Candidates {
        locks: Vec<ObjRef>,

        /// Checks left before the field is considered protected
        remaining_checks: u32,
    },
}

/// Outcome of checking the field lock info against an access
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtectionCheck {
    pub info: FieldLockInfo,

    /// The access broke a lock protection which had already been assumed
    pub assumption_failed: bool,
}

impl FieldLockInfo {
    /// Lock info for the first shared access
    pub fn new(held_locks: &[ObjRef], threshold: u32) -> FieldLockInfo {
        if held_locks.is_empty() {
            FieldLockInfo::Empty
        } else {
            FieldLockInfo::Candidates {
                locks: held_locks.to_vec(),
                remaining_checks: threshold,
            }
        }
    }

    pub fn is_protected(&self) -> bool {
        matches!(
            self,
            FieldLockInfo::Candidates {
                remaining_checks: 0,
                ..
            }
        )
    }

    /// Intersect the candidates with the locks held for this access
    pub fn check_protection(&self, held_locks: &[ObjRef]) -> ProtectionCheck {
        match self {
            FieldLockInfo::Empty => ProtectionCheck {
                info: FieldLockInfo::Empty,
                assumption_failed: false,
            },
            FieldLockInfo::Candidates {
                locks,
                remaining_checks,
            } => {
                let remaining: Vec<ObjRef> = locks
                    .iter()
                    .copied()
                    .filter(|lock| held_locks.contains(lock))
                    .collect();
                if remaining.is_empty() {
                    ProtectionCheck {
                        info: FieldLockInfo::Empty,
                        assumption_failed: *remaining_checks == 0,
                    }
                } else {
                    ProtectionCheck {
                        info: FieldLockInfo::Candidates {
                            locks: remaining,
                            remaining_checks: remaining_checks.saturating_sub(1),
                        },
                        assumption_failed: false,
                    }
                }
            }
        }
    }
}
