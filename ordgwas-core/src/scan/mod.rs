//! Variant scan: grouping, genotype encoding, per-unit testing and
//! result output.

pub mod encode;
pub mod engine;
pub mod error;
pub mod grouping;
pub mod writer;

pub use encode::GeneticModel;
pub use engine::{Scan, ScanConfig, ScanSummary};
pub use error::ScanError;
pub use grouping::{Grouping, TestUnit, UnitPlan};
pub use writer::{Layout, ResultWriter};
