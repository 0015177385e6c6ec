//! Symbolic simulation of the stack and local variables
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _stack
//! map frame_ (represented using [`Frame`] or, one entry per slot, [`SlotFrame`]). The "types"
//! used (represented using [`VerificationType`]) are slightly augumented to take into account
//! initialization and null.
//!
//! Knowing the frame at a point in the code makes it possible to know the frame after the next
//! instruction (eg. `dadd` pops two `double`s and pushes one). [`Simulator`] does exactly this as
//! code streams by, starting from the method's parameters and resetting at every explicit frame.
//! It does not check that the types make sense (that is the job of [a real verifier][0]). Since
//! there is no control flow analysis, the frame after an unconditional jump is unknown until the
//! code provides one.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod frame;
mod simulator;
mod types;

pub use frame::*;
pub use simulator::*;
pub use types::*;
