//! Fake-rate tables binned in lepton flavor, detector region and pT.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lepton::{Flavor, Lepton};

/// |eta| boundary between barrel and endcap for electrons.
pub const ELECTRON_BARREL_ETA: f64 = 1.497;
/// |eta| boundary between barrel and endcap for muons.
pub const MUON_BARREL_ETA: f64 = 1.2;

fn validate_edges(edges: &[f64], n_values: usize, what: &str) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::FakeRate(format!("{what}: need at least one bin")));
    }
    if edges.len() != n_values + 1 {
        return Err(Error::FakeRate(format!(
            "{what}: {} edges for {n_values} bins",
            edges.len()
        )));
    }
    if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::FakeRate(format!(
            "{what}: edges must be finite and strictly increasing"
        )));
    }
    Ok(())
}

/// Bin holding `x`; values outside the edges land in the first or last bin.
fn find_bin_clamped(edges: &[f64], x: f64) -> usize {
    let n_bins = edges.len() - 1;
    edges.partition_point(|e| *e <= x).saturating_sub(1).min(n_bins - 1)
}

/// A 1D histogram with explicit (possibly non-uniform) bin edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram1D {
    /// Bin edges (length = n_bins + 1).
    pub edges: Vec<f64>,
    /// Bin contents (length = n_bins).
    pub contents: Vec<f64>,
}

impl Histogram1D {
    pub fn new(edges: Vec<f64>, contents: Vec<f64>) -> Result<Self> {
        validate_edges(&edges, contents.len(), "histogram")?;
        Ok(Self { edges, contents })
    }

    pub fn n_bins(&self) -> usize {
        self.contents.len()
    }

    pub fn find_bin_clamped(&self, x: f64) -> usize {
        find_bin_clamped(&self.edges, x)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DetectorRegion {
    Barrel,
    Endcap,
}

impl DetectorRegion {
    pub fn of(flavor: Flavor, eta: f64) -> Result<Self> {
        let boundary = match flavor {
            Flavor::Electron => ELECTRON_BARREL_ETA,
            Flavor::Muon => MUON_BARREL_ETA,
            Flavor::Tau => {
                return Err(Error::Domain("no fake rates for tau leptons".into()));
            }
        };
        if eta.abs() < boundary {
            Ok(DetectorRegion::Barrel)
        } else {
            Ok(DetectorRegion::Endcap)
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DetectorRegion::Barrel => "barrel",
            DetectorRegion::Endcap => "endcap",
        }
    }
}

/// A looked-up fake rate and its uncertainty.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FakeRate {
    pub rate: f64,
    pub error: f64,
}

impl fmt::Display for FakeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4} ± {:.4}", self.rate, self.error)
    }
}

/// Fake rates of one (flavor, region) in pT bins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnedRate {
    pub edges: Vec<f64>,
    pub rates: Vec<f64>,
    pub errors: Vec<f64>,
}

impl BinnedRate {
    pub fn new(edges: Vec<f64>, rates: Vec<f64>, errors: Vec<f64>) -> Result<Self> {
        let table = Self { edges, rates, errors };
        table.validate("rate table")?;
        Ok(table)
    }

    /// Rate = numerator / denominator per bin, with a binomial uncertainty.
    /// Bins with an empty denominator get a zero rate.
    pub fn from_ratio(numerator: &Histogram1D, denominator: &Histogram1D) -> Result<Self> {
        if numerator.edges != denominator.edges {
            return Err(Error::FakeRate(
                "numerator and denominator have different binning".into(),
            ));
        }
        let (rates, errors): (Vec<f64>, Vec<f64>) = numerator
            .contents
            .iter()
            .zip(&denominator.contents)
            .map(|(&num, &den)| {
                if den > 0.0 {
                    let f = num / den;
                    (f, f64::sqrt((f * (1.0 - f)).max(0.0) / den))
                } else {
                    (0.0, 0.0)
                }
            })
            .unzip();
        Self::new(numerator.edges.clone(), rates, errors)
    }

    fn validate(&self, what: &str) -> Result<()> {
        validate_edges(&self.edges, self.rates.len(), what)?;
        if self.errors.len() != self.rates.len() {
            return Err(Error::FakeRate(format!(
                "{what}: {} rates but {} uncertainties",
                self.rates.len(),
                self.errors.len()
            )));
        }
        if self.rates.iter().chain(&self.errors).any(|v| !v.is_finite()) {
            return Err(Error::FakeRate(format!("{what}: non-finite entry")));
        }
        if let Some(e) = self.errors.iter().find(|e| **e < 0.0) {
            return Err(Error::FakeRate(format!("{what}: negative uncertainty {e}")));
        }
        Ok(())
    }

    pub fn lookup(&self, pt: f64) -> FakeRate {
        let bin = find_bin_clamped(&self.edges, pt);
        FakeRate {
            rate: self.rates[bin],
            error: self.errors[bin],
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TableFile {
    #[serde(default)]
    histograms: HashMap<String, Histogram1D>,
    #[serde(default)]
    rates: HashMap<String, BinnedRate>,
}

/// Read-only fake-rate lookup shared by every event of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeRateTable {
    tables: BTreeMap<(Flavor, DetectorRegion), BinnedRate>,
}

const TABLE_KEYS: [(Flavor, DetectorRegion); 4] = [
    (Flavor::Electron, DetectorRegion::Barrel),
    (Flavor::Electron, DetectorRegion::Endcap),
    (Flavor::Muon, DetectorRegion::Barrel),
    (Flavor::Muon, DetectorRegion::Endcap),
];

fn table_name(flavor: Flavor, region: DetectorRegion) -> String {
    format!("{}-{}", flavor.name(), region.name())
}

impl FakeRateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, flavor: Flavor, region: DetectorRegion, table: BinnedRate) -> Result<()> {
        if flavor == Flavor::Tau {
            return Err(Error::FakeRate("no fake rates for tau leptons".into()));
        }
        table.validate(&table_name(flavor, region))?;
        self.tables.insert((flavor, region), table);
        Ok(())
    }

    /// Builds all four sub-tables from `<flavor>-<region>-numerator` and
    /// `<flavor>-<region>-denominator` histograms.
    pub fn from_histograms(histograms: &HashMap<String, Histogram1D>) -> Result<Self> {
        let mut table = Self::new();
        for (flavor, region) in TABLE_KEYS {
            let name = table_name(flavor, region);
            let get = |suffix: &str| {
                let key = format!("{name}-{suffix}");
                histograms
                    .get(&key)
                    .ok_or_else(|| Error::FakeRate(format!("missing histogram '{key}'")))
            };
            let (num, den) = (get("numerator")?, get("denominator")?);
            table.insert(flavor, region, BinnedRate::from_ratio(num, den)?)?;
        }
        Ok(table)
    }

    /// Builds all four sub-tables from `<flavor>-<region>` rate tables.
    pub fn from_rates(rates: &HashMap<String, BinnedRate>) -> Result<Self> {
        let mut table = Self::new();
        for (flavor, region) in TABLE_KEYS {
            let name = table_name(flavor, region);
            let rate = rates
                .get(&name)
                .ok_or_else(|| Error::FakeRate(format!("missing rate table '{name}'")))?;
            table.insert(flavor, region, rate.clone())?;
        }
        Ok(table)
    }

    /// Reads a JSON document holding either a `histograms` object of
    /// numerator/denominator pairs or a `rates` object of rate tables.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let file: TableFile = serde_json::from_str(text)?;
        match (file.histograms.is_empty(), file.rates.is_empty()) {
            (false, true) => Self::from_histograms(&file.histograms),
            (true, false) => Self::from_rates(&file.rates),
            (true, true) => Err(Error::FakeRate("no histograms or rates given".into())),
            (false, false) => Err(Error::FakeRate(
                "give either histograms or rates, not both".into(),
            )),
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path.as_ref())?)
    }

    pub fn lookup(&self, flavor: Flavor, pt: f64, eta: f64) -> Result<FakeRate> {
        let region = DetectorRegion::of(flavor, eta)?;
        let table = self.tables.get(&(flavor, region)).ok_or_else(|| {
            Error::FakeRate(format!("no table for {}", table_name(flavor, region)))
        })?;
        Ok(table.lookup(pt))
    }

    pub fn lookup_lepton(&self, lepton: &Lepton) -> Result<FakeRate> {
        self.lookup(lepton.flavor()?, lepton.pt(), lepton.eta())
    }
}
