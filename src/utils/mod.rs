//! Utility module.

pub mod hash;
pub mod vector;

pub use hash::text_digest;
pub use vector::{cosine_similarity, l2_normalize, squared_distance};
