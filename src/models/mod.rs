//! Model module.
//!
//! Contains the word payload and the vector point shapes.

pub mod word;

pub use word::*;
