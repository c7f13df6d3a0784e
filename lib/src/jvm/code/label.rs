use std::fmt;

/// Symbolic jump target inside a method body under construction
///
/// Labels are only meaningful to the [`CodeBuilder`](super::CodeBuilder) that handed them out.
/// Once the body is installed, every label is resolved to an instruction index.
#[derive(Copy, Clone, Hash, Eq, PartialEq)]
pub struct SynLabel(usize);

/// Hands out labels in increasing order
#[derive(Default)]
pub struct LabelSupply {
    issued: usize,
}

impl LabelSupply {
    pub fn fresh(&mut self) -> SynLabel {
        let label = SynLabel(self.issued);
        self.issued += 1;
        label
    }

    /// Number of labels handed out so far
    pub fn issued(&self) -> usize {
        self.issued
    }
}

impl fmt::Debug for SynLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn labels_are_distinct() {
        let mut supply = LabelSupply::default();
        let first = supply.fresh();
        let second = supply.fresh();
        assert_ne!(first, second);
        assert_eq!(supply.issued(), 2);
        assert_eq!(format!("{:?} {:?}", first, second), "l0 l1");
    }
}
