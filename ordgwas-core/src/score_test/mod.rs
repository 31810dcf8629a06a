//! Association tests for one test unit against the fitted null model.
//!
//! Two strategies: the score test, which reuses null-fit quantities and
//! never refits, and the likelihood-ratio test, which refits the model
//! with the unit's columns appended.

pub mod lrt;
pub mod ordinal;

use std::str::FromStr;

use anyhow::Result;

use crate::model::null_model::FittedNullModel;
use crate::polr::fit::FitConfig;
use crate::scan::error::ScanError;

use lrt::LikelihoodRatioTest;
use ordinal::ScoreTestContext;

/// Which test to run for every unit of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestKind {
    #[default]
    Score,
    Lrt,
}

impl TestKind {
    pub fn name(&self) -> &'static str {
        match self {
            TestKind::Score => "score",
            TestKind::Lrt => "lrt",
        }
    }
}

impl FromStr for TestKind {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "score" => Ok(TestKind::Score),
            "lrt" => Ok(TestKind::Lrt),
            other => Err(ScanError::Configuration(format!(
                "unknown test '{}' (expected score or lrt)",
                other
            ))),
        }
    }
}

/// Result of testing one unit's informative columns.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitStatistic {
    pub statistic: f64,
    pub df: usize,
    pub pvalue: f64,
    /// Per-column effects; `None` for the score test.
    pub effects: Option<Vec<f64>>,
}

impl UnitStatistic {
    /// A unit with nothing to test: p = 1 and zero effects.
    pub fn trivial(kind: TestKind, width: usize) -> Self {
        Self {
            statistic: 0.0,
            df: 0,
            pvalue: 1.0,
            effects: match kind {
                TestKind::Score => None,
                TestKind::Lrt => Some(vec![0.0; width]),
            },
        }
    }

    /// Whether the statistic could not be computed.
    pub fn failed(&self) -> bool {
        self.pvalue.is_nan()
    }
}

/// The configured test, bound to the null model.
///
/// The score variant holds mutable scratch space: one unit at a time.
pub enum UnitTester<'a> {
    Score(ScoreTestContext),
    Lrt(LikelihoodRatioTest<'a>),
}

impl<'a> UnitTester<'a> {
    pub fn new(kind: TestKind, model: &'a FittedNullModel, fit_config: &FitConfig) -> Result<Self> {
        Ok(match kind {
            TestKind::Score => UnitTester::Score(model.score_context()?),
            TestKind::Lrt => UnitTester::Lrt(LikelihoodRatioTest::new(model, fit_config.clone())),
        })
    }

    pub fn kind(&self) -> TestKind {
        match self {
            UnitTester::Score(_) => TestKind::Score,
            UnitTester::Lrt(_) => TestKind::Lrt,
        }
    }

    /// Test `columns` jointly.
    pub fn test(&mut self, columns: &[&[f64]]) -> UnitStatistic {
        match self {
            UnitTester::Score(ctx) => {
                let out = ctx.test(columns);
                UnitStatistic {
                    statistic: out.statistic,
                    df: out.df,
                    pvalue: out.pvalue,
                    effects: None,
                }
            }
            UnitTester::Lrt(lrt) => {
                let out = lrt.test(columns);
                UnitStatistic {
                    statistic: out.statistic,
                    df: out.df,
                    pvalue: out.pvalue,
                    effects: Some(out.effects),
                }
            }
        }
    }
}
