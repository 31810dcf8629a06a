//! ordgwas-core: Statistical engine for ordinal-trait association scans.
//!
//! Fits the proportional-odds null model, then tests single variants,
//! windows or variant sets against it with a score test or a
//! likelihood-ratio test, streaming one result row per test unit.

pub mod model;
pub mod polr;
pub mod scan;
pub mod score_test;
pub mod util;
