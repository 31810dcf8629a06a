//! Proportional-odds (cumulative link) regression.
//!
//! P(Y <= j | x) = F(theta_j - x'beta), fitted by Fisher scoring.

pub mod fit;
pub mod link;
pub mod terms;
