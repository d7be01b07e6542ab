//! Link functions squashing an affinity difference into a competition weight.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LinkFunction {
    /// Logistic sigmoid.
    #[default]
    Sigmoid,

    /// Standard normal cumulative distribution function.
    GaussianCdf,
}

impl LinkFunction {
    #[must_use]
    pub fn value(self, x: f64) -> f64 {
        match self {
            Self::Sigmoid => sigmoid(x),
            Self::GaussianCdf => standard_normal_cdf(x),
        }
    }

    /// First derivative of the link function at `x`.
    #[must_use]
    pub fn derivative(self, x: f64) -> f64 {
        match self {
            Self::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            Self::GaussianCdf => standard_normal_pdf(x),
        }
    }
}

/// Numerically stable logistic function.
#[must_use]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[must_use]
pub fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x * FRAC_1_SQRT_2)
}

#[must_use]
pub fn standard_normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}
