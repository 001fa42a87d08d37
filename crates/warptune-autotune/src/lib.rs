//! Online autotuning for JIT-compiled GPU kernels.
//!
//! Ties the other warptune crates together: per call site, a [`TunedKernel`]
//! compiles candidate configurations in the background, measures them on the
//! live problem sizes, and converges to the best variant while the
//! application keeps running. Results persist across runs through
//! [`TuningCache`].

#[cfg(feature = "cli")]
pub mod cli;
pub mod cache;
pub mod error;
pub mod results;
pub mod strategy;
pub mod tuner;

pub use cache::*;
pub use error::*;
pub use results::*;
pub use strategy::*;
pub use tuner::*;
