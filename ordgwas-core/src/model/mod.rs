//! Null model data structure and serialization.

pub mod null_model;
pub mod serialization;
