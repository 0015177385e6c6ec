use super::code::{BranchInstruction, SynLabel};
use super::verifier::VType;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// A compressed stack map frame was given where only expanded frames are understood
    ///
    /// The producer needs to expand frames before they reach the simulator.
    CompressedFrame(&'static str),

    /// A callback arrived after `visit_end`
    VisitAfterEnd,

    /// `jsr` or `ret` reached a component that cannot handle subroutines
    UnsupportedSubroutineInstruction(BranchInstruction<SynLabel>),

    /// The subroutine starting at this label can end up invoking itself
    RecursiveSubroutine(SynLabel),

    /// A label is the target of a jump or range, but is never placed in the method body
    UnplacedLabel(SynLabel),

    /// A label in the original code has no counterpart in an instantiation (indicates a bug)
    MissingLabelRemap(SynLabel),

    /// No instantiation owns the handler of an exception range (indicates a bug)
    UnresolvedHandler(SynLabel),

    /// A `ret` at this node index is not owned by any subroutine
    UnownedRet(usize),

    /// Inlining would exceed one of the limits in the inliner settings
    InliningLimitExceeded { limit: &'static str, value: usize },

    /// Simulating an instruction failed
    VerifierError {
        instruction: String,
        kind: VerifierErrorKind,
    },

    BadDescriptor(String),
    MalformedName(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum VerifierErrorKind {
    EmptyStack,

    /// `aaload` on something that cannot be an array
    NotArrayType(VType),

    /// `new` without a label to identify it
    UnlabelledNew,

    /// `<init>` called on an uninitialized value whose `new` was never seen
    UnknownUninitialized(SynLabel),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CompressedFrame(kind) => write!(
                f,
                "received a compressed `{}` frame, but only expanded frames are accepted (expand frames when reading the class)",
                kind
            ),
            Error::VisitAfterEnd => f.write_str("method body visited after its end"),
            Error::UnsupportedSubroutineInstruction(insn) => write!(
                f,
                "subroutine instruction {:?} is not supported here (inline subroutines first)",
                insn
            ),
            Error::RecursiveSubroutine(entry) => {
                write!(f, "recursive invocation of the subroutine at {:?}", entry)
            }
            Error::UnplacedLabel(label) => {
                write!(f, "label {:?} is referenced but never placed", label)
            }
            Error::MissingLabelRemap(label) => {
                write!(f, "label {:?} has no remapped counterpart", label)
            }
            Error::UnresolvedHandler(label) => write!(
                f,
                "exception handler at {:?} is not owned by any instantiation",
                label
            ),
            Error::UnownedRet(index) => {
                write!(f, "`ret` at node #{} is not owned by any subroutine", index)
            }
            Error::InliningLimitExceeded { limit, value } => {
                write!(f, "inlining exceeds {} (reached {})", limit, value)
            }
            Error::VerifierError { instruction, kind } => {
                write!(f, "cannot simulate {}: {:?}", instruction, kind)
            }
            Error::BadDescriptor(msg) => write!(f, "bad descriptor: {}", msg),
            Error::MalformedName(msg) => write!(f, "malformed name: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
