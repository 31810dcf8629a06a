//! Link functions for cumulative (proportional-odds) models.
//!
//! Each link is a continuous distribution F on the real line; the model
//! is P(Y <= j | x) = F(theta_j - x'beta).

use std::f64::consts::{FRAC_1_SQRT_2, PI, SQRT_2};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use statrs::function::erf::{erfc, erfc_inv};

use crate::scan::error::ScanError;

/// Which latent distribution the thresholds live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkKind {
    Logit,
    Probit,
    Cloglog,
    Cauchit,
}

impl LinkKind {
    pub fn name(&self) -> &'static str {
        match self {
            LinkKind::Logit => "logit",
            LinkKind::Probit => "probit",
            LinkKind::Cloglog => "cloglog",
            LinkKind::Cauchit => "cauchit",
        }
    }

    /// The distribution behind this link.
    pub fn link(&self) -> Box<dyn CumulativeLink + Send + Sync> {
        match self {
            LinkKind::Logit => Box::new(LogitLink),
            LinkKind::Probit => Box::new(ProbitLink),
            LinkKind::Cloglog => Box::new(CloglogLink),
            LinkKind::Cauchit => Box::new(CauchitLink),
        }
    }
}

impl FromStr for LinkKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "logit" | "logistic" => Ok(LinkKind::Logit),
            "probit" => Ok(LinkKind::Probit),
            "cloglog" => Ok(LinkKind::Cloglog),
            "cauchit" => Ok(LinkKind::Cauchit),
            other => Err(ScanError::Configuration(format!(
                "unknown link '{}': expected logit, probit, cloglog or cauchit",
                other
            ))
            .into()),
        }
    }
}

/// Distribution interface for a cumulative link.
pub trait CumulativeLink {
    /// F(x).
    fn cdf(&self, x: f64) -> f64;
    /// f(x) = F'(x).
    fn pdf(&self, x: f64) -> f64;
    /// F^{-1}(p) for p in (0, 1).
    fn quantile(&self, p: f64) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct LogitLink;

impl CumulativeLink for LogitLink {
    fn cdf(&self, x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    fn pdf(&self, x: f64) -> f64 {
        let p = self.cdf(x);
        p * (1.0 - p)
    }

    fn quantile(&self, p: f64) -> f64 {
        (p / (1.0 - p)).ln()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProbitLink;

impl CumulativeLink for ProbitLink {
    fn cdf(&self, x: f64) -> f64 {
        0.5 * erfc(-x * FRAC_1_SQRT_2)
    }

    fn pdf(&self, x: f64) -> f64 {
        (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
    }

    fn quantile(&self, p: f64) -> f64 {
        -SQRT_2 * erfc_inv(2.0 * p)
    }
}

/// Complementary log-log: F(x) = 1 - exp(-exp(x)).
#[derive(Debug, Clone, Copy)]
pub struct CloglogLink;

impl CumulativeLink for CloglogLink {
    fn cdf(&self, x: f64) -> f64 {
        -(-x.exp()).exp_m1()
    }

    fn pdf(&self, x: f64) -> f64 {
        (x - x.exp()).exp()
    }

    fn quantile(&self, p: f64) -> f64 {
        (-(-p).ln_1p()).ln()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CauchitLink;

impl CumulativeLink for CauchitLink {
    fn cdf(&self, x: f64) -> f64 {
        0.5 + x.atan() / PI
    }

    fn pdf(&self, x: f64) -> f64 {
        1.0 / (PI * (1.0 + x * x))
    }

    fn quantile(&self, p: f64) -> f64 {
        (PI * (p - 0.5)).tan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LinkKind; 4] = [
        LinkKind::Logit,
        LinkKind::Probit,
        LinkKind::Cloglog,
        LinkKind::Cauchit,
    ];

    #[test]
    fn test_quantile_inverts_cdf() {
        for kind in ALL {
            let link = kind.link();
            for &p in &[0.05, 0.3, 0.5, 0.7, 0.95] {
                let back = link.cdf(link.quantile(p));
                assert!((back - p).abs() < 1e-9, "{:?} p={} back={}", kind, p, back);
            }
        }
    }

    #[test]
    fn test_pdf_matches_numeric_derivative() {
        let h = 1e-6;
        for kind in ALL {
            let link = kind.link();
            for &x in &[-2.0, -0.3, 0.0, 0.8, 2.5] {
                let numeric = (link.cdf(x + h) - link.cdf(x - h)) / (2.0 * h);
                assert!((numeric - link.pdf(x)).abs() < 1e-6, "{:?} at {}", kind, x);
            }
        }
    }

    #[test]
    fn test_known_values() {
        assert!((LogitLink.cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((ProbitLink.cdf(1.959963984540054) - 0.975).abs() < 1e-9);
        assert!((CloglogLink.cdf(0.0) - (1.0 - (-1.0f64).exp())).abs() < 1e-12);
        assert!((CauchitLink.cdf(1.0) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("Probit".parse::<LinkKind>().unwrap(), LinkKind::Probit);
        let err = "identity".parse::<LinkKind>().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScanError>(),
            Some(ScanError::Configuration(_))
        ));
    }
}
