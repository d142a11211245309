//! Transformation library
//! Semantics-preserving rewrites of shader programs, and the generator
//! that chains them into variants.

pub mod const_clean;
pub mod donate;
mod generate;
mod id;
pub mod injection;
pub mod inline;
pub mod macros;
pub mod merge_set;
pub mod outline;
mod return_remover;
mod rng;
pub mod structify;
pub mod truncate;
pub mod vectorize;

pub use const_clean::clean_consts;
pub use generate::*;
pub use id::*;
pub use return_remover::*;
pub use rng::*;
pub use truncate::truncate_loops;
