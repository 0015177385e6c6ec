//! Getting rid of `jsr`/`ret` subroutines
//!
//! Old compilers used subroutines to share the code of `finally` blocks between the normal exit
//! of a `try` and its exceptional exits. A subroutine is entered with `jsr` (which pushes a
//! return address) and exited with `ret` (which jumps back to a return address stored in a
//! local). Since class files version 51, `jsr` and `ret` are forbidden: frames cannot describe
//! return addresses.
//!
//! Inlining happens in two steps:
//!
//!   - [`SubroutineMap`] finds which nodes of the method body are reachable from which
//!     subroutine (or from the main body)
//!   - the inliner then emits one copy of each subroutine for every `jsr` that reaches it,
//!     recursively for subroutines called from other subroutines
//!
//! Use [`SubroutineInliner`] as part of a chain of visitors, or [`inline_subroutines`] on a
//! [`crate::jvm::code::MethodBody`] that is already in memory.

mod inliner;
mod instantiation;
mod reachability;
mod settings;

pub use inliner::*;
use instantiation::*;
pub use reachability::*;
pub use settings::*;
