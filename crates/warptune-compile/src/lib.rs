//! Source-to-module compilation for warptune.
//!
//! The actual source-to-PTX toolchain is an external collaborator behind the
//! [`ModuleCompiler`] trait; this crate owns the pieces shared by every
//! implementation: kernel sources, symbol construction, compile options, the
//! pending-module future, and the asynchronous compilation decorator.

pub mod compiler;
pub mod error;
pub mod future;
pub mod sim;
pub mod source;
pub mod symbol;

pub use compiler::*;
pub use error::*;
pub use future::*;
pub use sim::*;
pub use source::*;
pub use symbol::*;
