//! Small numerical helpers.

pub mod hwe;
