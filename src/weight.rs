//! Per-quartet background weights from fake-rate lookups.

use std::ops::{Add, Mul};

use tracing::debug;

use crate::error::{Error, Result};
use crate::fakerate::FakeRateTable;
use crate::lepton::Lepton;
use crate::region::{ClassifiedQuartet, ControlRegion};

/// Largest usable fake rate; `ratio` diverges at 1.
pub const MAX_FAKE_RATE: f64 = 1.0 - 1e-6;

/// Odds `f / (1 - f)` of a loose lepton passing the tight selection.
pub fn ratio(f: f64) -> f64 {
    f / (1.0 - f)
}

/// A quantity with its -1σ / nominal / +1σ systematic variants.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Variation {
    pub down: f64,
    pub nominal: f64,
    pub up: f64,
}

impl Variation {
    pub fn new(down: f64, nominal: f64, up: f64) -> Self {
        Self { down, nominal, up }
    }

    pub fn splat(value: f64) -> Self {
        Self::new(value, value, value)
    }

    pub fn map<F: FnMut(f64) -> f64>(self, mut f: F) -> Self {
        Self::new(f(self.down), f(self.nominal), f(self.up))
    }
}

impl Add for Variation {
    type Output = Variation;

    fn add(self, rhs: Variation) -> Variation {
        Variation::new(self.down + rhs.down, self.nominal + rhs.nominal, self.up + rhs.up)
    }
}

impl Mul for Variation {
    type Output = Variation;

    fn mul(self, rhs: Variation) -> Variation {
        Variation::new(self.down * rhs.down, self.nominal * rhs.nominal, self.up * rhs.up)
    }
}

impl Mul<f64> for Variation {
    type Output = Variation;

    fn mul(self, rhs: f64) -> Variation {
        self.map(|v| v * rhs)
    }
}

/// Counters of fake-rate values that had to be adjusted before use.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WeightDiagnostics {
    /// Rate variants that were negative and clamped to zero.
    pub clamped_negative: u64,
    /// Failing leptons whose nominal rate was zero or negative.
    pub non_positive_nominal: u64,
    /// Rate variants at or above one, capped at [`MAX_FAKE_RATE`].
    pub capped_high: u64,
}

impl WeightDiagnostics {
    pub fn merge(&mut self, other: &WeightDiagnostics) {
        self.clamped_negative += other.clamped_negative;
        self.non_positive_nominal += other.non_positive_nominal;
        self.capped_high += other.capped_high;
    }
}

/// Event weights of one classified quartet.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct QuartetWeight {
    pub weight: Variation,
    /// For 2P2F quartets, their expected contribution to the 3P1F region.
    pub contribution_to_3p1f: Option<Variation>,
}

pub struct BackgroundWeightEngine<'t> {
    table: &'t FakeRateTable,
}

impl<'t> BackgroundWeightEngine<'t> {
    pub fn new(table: &'t FakeRateTable) -> Self {
        Self { table }
    }

    fn clamp(&self, f: f64, diagnostics: &mut WeightDiagnostics) -> f64 {
        if f < 0.0 {
            diagnostics.clamped_negative += 1;
            0.0
        } else if f >= 1.0 {
            diagnostics.capped_high += 1;
            MAX_FAKE_RATE
        } else {
            f
        }
    }

    /// `ratio` of the lepton's fake rate shifted by -1σ, 0, +1σ, each shift
    /// clamped into `[0, 1)` on its own.
    pub fn ratios(&self, lepton: &Lepton, diagnostics: &mut WeightDiagnostics) -> Result<Variation> {
        let fr = self.table.lookup_lepton(lepton)?;
        if fr.rate <= 0.0 {
            diagnostics.non_positive_nominal += 1;
            debug!(
                lepton = lepton.index(),
                pt = lepton.pt(),
                eta = lepton.eta(),
                rate = fr.rate,
                "non-positive fake rate for failing lepton"
            );
        }
        let rates = Variation::new(fr.rate - fr.error, fr.rate, fr.rate + fr.error);
        Ok(rates.map(|f| ratio(self.clamp(f, diagnostics))))
    }

    pub fn weigh(
        &self,
        classified: &ClassifiedQuartet,
        base_weight: f64,
        diagnostics: &mut WeightDiagnostics,
    ) -> Result<QuartetWeight> {
        let leptons = classified.quartet.leptons();
        let find = |index: usize| {
            leptons
                .iter()
                .copied()
                .find(|l| l.index() == index)
                .ok_or_else(|| {
                    Error::Invariant(format!("failing lepton {index} is not in its quartet"))
                })
        };
        match classified.region {
            ControlRegion::SignalLike => Ok(QuartetWeight {
                weight: Variation::splat(base_weight),
                contribution_to_3p1f: None,
            }),
            ControlRegion::ThreePassOneFail { fail } => {
                let r = self.ratios(find(fail)?, diagnostics)?;
                Ok(QuartetWeight {
                    weight: r * base_weight,
                    contribution_to_3p1f: None,
                })
            }
            ControlRegion::TwoPassTwoFail { fails: [a, b] } => {
                let r1 = self.ratios(find(a)?, diagnostics)?;
                let r2 = self.ratios(find(b)?, diagnostics)?;
                Ok(QuartetWeight {
                    weight: r1 * r2 * base_weight,
                    contribution_to_3p1f: Some((r1 + r2) * base_weight),
                })
            }
        }
    }
}
