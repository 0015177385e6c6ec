//! Method bodies as a stream of symbolic instructions
//!
//! ### Structure
//!
//! We split up the [list of bytecode instructions][0] into two groups:
//!
//!   - [`Instruction`] for straight-line instructions
//!   - [`BranchInstruction`] for instructions that may jump somewhere (including `jsr` and `ret`)
//!
//! Positions in the code are marked with opaque [`SynLabel`]s, which is what branches, exception
//! ranges, and local variable scopes refer to.
//!
//! ### Visiting
//!
//! Code is consumed through the [`CodeVisitor`] trait, one element at a time. Transformations
//! and analyses are written as visitors that forward everything they receive to another visitor,
//! so they can be chained. A [`MethodBody`] records whatever it visits, and can replay it into
//! another visitor.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod instructions;
mod label;
mod method_body;
mod visitor;

pub use instructions::*;
pub use label::*;
pub use method_body::*;
pub use visitor::*;
