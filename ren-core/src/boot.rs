use std::fmt;

/// Where a universe is in its startup sequence.
///
/// Phases run strictly in this order; later phases rely on what earlier ones set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BootPhase {
    /// Nothing done yet.
    Start,
    /// Cell layout and header encoding checked against what the evaluator assumes.
    SelfCheck,
    /// Allocation accounting and the heap registry are up.
    Pools,
    /// Builtin spellings interned.
    Symbols,
    /// Long-lived singletons allocated.
    Roots,
    /// Embedded boot sources scanned.
    BootBlob,
    /// The library, system and user contexts exist.
    Contexts,
    /// Natives, datatypes and typesets are bound in the library.
    Natives,
    /// Library and system level source has run.
    Mezzanine,
    /// Ready to run user code.
    Done,
}

impl BootPhase {
    pub const ALL: [BootPhase; 10] = [
        BootPhase::Start,
        BootPhase::SelfCheck,
        BootPhase::Pools,
        BootPhase::Symbols,
        BootPhase::Roots,
        BootPhase::BootBlob,
        BootPhase::Contexts,
        BootPhase::Natives,
        BootPhase::Mezzanine,
        BootPhase::Done,
    ];

    /// The phase after this one, if any.
    pub fn next(self) -> Option<BootPhase> {
        Self::ALL.iter().position(|phase| *phase == self).and_then(|index| Self::ALL.get(index + 1)).copied()
    }
}

impl fmt::Display for BootPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootPhase::Start => "start",
            BootPhase::SelfCheck => "self-check",
            BootPhase::Pools => "pools",
            BootPhase::Symbols => "symbols",
            BootPhase::Roots => "roots",
            BootPhase::BootBlob => "boot-blob",
            BootPhase::Contexts => "contexts",
            BootPhase::Natives => "natives",
            BootPhase::Mezzanine => "mezzanine",
            BootPhase::Done => "done",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered() {
        assert!(BootPhase::Symbols < BootPhase::Contexts);
        assert_eq!(BootPhase::Start.next(), Some(BootPhase::SelfCheck));
        assert_eq!(BootPhase::Done.next(), None);
    }
}
