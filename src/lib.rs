//! Semantic word search.
//!
//! Words are embedded into dense vectors and stored in a vector collection;
//! lookups return the stored words closest in meaning. A batch pipeline
//! groups the collection into named themes.

pub mod api;
pub mod cli;
pub mod clustering;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;
