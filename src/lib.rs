//! Filters over JVM method bodies
//!
//! Method bodies are streamed through [`jvm::code::CodeVisitor`]s. Two filters are provided:
//!
//!   - [`jvm::verifier::Simulator`] tracks the types on the stack and in the local variables
//!   - [`subroutines::SubroutineInliner`] rewrites away `jsr`/`ret` subroutines

pub mod jvm;
pub mod subroutines;
pub mod util;
