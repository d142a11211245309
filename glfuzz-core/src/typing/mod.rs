//! Scopes and static types

mod bindings;
pub mod builtins;
mod scope;
mod typer;

pub use bindings::*;
pub use scope::*;
pub use typer::*;
