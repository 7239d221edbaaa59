use std::fmt;

use crate::error::{Error, Result};
use crate::lepton::{Lepton, PtEtaPhiM};
use crate::region::{ControlRegion, FlavorComposition};
use crate::weight::Variation;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId {
    pub run: u64,
    pub lumi: u64,
    pub event: u64,
}

impl EventId {
    pub fn new(run: u64, lumi: u64, event: u64) -> Self {
        Self { run, lumi, event }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.run, self.lumi, self.event)
    }
}

/// Per-lepton branches of one event, as parallel arrays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LeptonColumns {
    pub pt: Vec<f64>,
    pub eta: Vec<f64>,
    pub phi: Vec<f64>,
    pub mass: Vec<f64>,
    pub pt_fsr: Vec<f64>,
    pub eta_fsr: Vec<f64>,
    pub phi_fsr: Vec<f64>,
    pub mass_fsr: Vec<f64>,
    pub pdg_id: Vec<i32>,
    pub tight_id: Vec<bool>,
    pub rel_iso: Vec<f64>,
}

impl LeptonColumns {
    pub fn push(&mut self, kin: PtEtaPhiM, kin_fsr: PtEtaPhiM, pdg_id: i32, tight_id: bool, rel_iso: f64) {
        self.pt.push(kin.pt);
        self.eta.push(kin.eta);
        self.phi.push(kin.phi);
        self.mass.push(kin.mass);
        self.pt_fsr.push(kin_fsr.pt);
        self.eta_fsr.push(kin_fsr.eta);
        self.phi_fsr.push(kin_fsr.phi);
        self.mass_fsr.push(kin_fsr.mass);
        self.pdg_id.push(pdg_id);
        self.tight_id.push(tight_id);
        self.rel_iso.push(rel_iso);
    }

    /// Number of leptons; fails unless every branch has the same length.
    pub fn len(&self) -> Result<usize> {
        let lengths = [
            ("pt", self.pt.len()),
            ("eta", self.eta.len()),
            ("phi", self.phi.len()),
            ("mass", self.mass.len()),
            ("pt_fsr", self.pt_fsr.len()),
            ("eta_fsr", self.eta_fsr.len()),
            ("phi_fsr", self.phi_fsr.len()),
            ("mass_fsr", self.mass_fsr.len()),
            ("pdg_id", self.pdg_id.len()),
            ("tight_id", self.tight_id.len()),
            ("rel_iso", self.rel_iso.len()),
        ];
        let n = lengths[0].1;
        if let Some((name, len)) = lengths.iter().find(|(_, len)| *len != n) {
            return Err(Error::MalformedInput(format!(
                "lepton branch '{name}' has {len} entries, 'pt' has {n}"
            )));
        }
        Ok(n)
    }

    pub fn is_empty(&self) -> bool {
        self.pt.is_empty()
    }

    pub fn leptons(&self) -> Result<Vec<Lepton>> {
        (0..self.len()?)
            .map(|i| {
                Lepton::new(
                    i,
                    PtEtaPhiM::new(self.pt[i], self.eta[i], self.phi[i], self.mass[i]),
                    PtEtaPhiM::new(self.pt_fsr[i], self.eta_fsr[i], self.phi_fsr[i], self.mass_fsr[i]),
                    self.pdg_id[i],
                    self.tight_id[i],
                    self.rel_iso[i],
                )
            })
            .collect()
    }
}

/// One event as read from the input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventRecord {
    pub id: EventId,
    /// Normalization weight supplied by the caller.
    pub base_weight: f64,
    pub leptons: LeptonColumns,
    /// Externally chosen quartet, for cross-checks only.
    pub reference_quartet: Option<[usize; 4]>,
}

impl EventRecord {
    pub fn new(id: EventId, base_weight: f64) -> Self {
        Self {
            id,
            base_weight,
            ..Self::default()
        }
    }
}

/// A weighted quartet of one event.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputRow {
    pub id: EventId,
    pub region: ControlRegion,
    pub composition: FlavorComposition,
    pub m4l: f64,
    pub z1_mass: f64,
    pub z2_mass: f64,
    pub weight: Variation,
    pub contribution_to_3p1f: Option<Variation>,
    pub lepton_indices: [usize; 4],
    /// Whether `lepton_indices` equals the event's reference quartet, if it
    /// has one.
    pub matches_reference: Option<bool>,
}
