//! Manipulate JVM method bodies
//!
//! ### Simple example
//!
//! Consider the following simple Java method:
//!
//! ```java,ignore,no_run
//! static long twice(int x) {
//!     return 2L * x;
//! }
//! ```
//!
//! Tracking the stack and locals through its body can be done as follows:
//!
//! ```
//! use bytecode_flow::jvm::code::{BranchInstruction::*, CodeVisitor, Instruction::*, MethodBody};
//! use bytecode_flow::jvm::verifier::{Simulator, VerificationType};
//! use bytecode_flow::jvm::*;
//!
//! # fn simulate_method() -> Result<(), Error> {
//! let header = MethodHeader::parse("me/alec/Math", "twice", "(I)J", MethodAccessFlags::STATIC)?;
//!
//! // Feed the body through a simulator into a buffer
//! let mut body = MethodBody::new();
//! let mut simulator = Simulator::new(&header, &mut body);
//! simulator.visit_instruction(&Ldc(code::ConstantData::Long(2)))?;
//! simulator.visit_instruction(&ILoad(0))?;
//! simulator.visit_instruction(&I2L)?;
//! assert_eq!(
//!     simulator.stack(),
//!     Some(&[
//!         VerificationType::Long,
//!         VerificationType::Top,
//!         VerificationType::Long,
//!         VerificationType::Top,
//!     ][..])
//! );
//! simulator.visit_instruction(&LMul)?;
//! simulator.visit_branch(&LReturn)?;
//! simulator.visit_maxs(0, 0)?;
//! simulator.visit_end()?;
//!
//! // Maximums are filled in from what was observed
//! assert_eq!((body.max_stack, body.max_locals), (4, 1));
//! # Ok(())
//! # }
//! # simulate_method().unwrap();
//! ```

mod access_flags;
pub mod code;
mod descriptors;
mod errors;
mod method;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use method::*;
pub use names::*;
