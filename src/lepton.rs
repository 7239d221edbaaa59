use crate::error::{Error, Result};
use crate::kinematics::{self, FourMomentum};

pub const PDG_ELECTRON: i32 = 11;
pub const PDG_MUON: i32 = 13;
pub const PDG_TAU: i32 = 15;

/// Muons with relative isolation at or above this value are not tight.
pub const MUON_ISOLATION_MAX: f64 = 0.35;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flavor {
    Electron,
    Muon,
    Tau,
}

impl Flavor {
    pub fn from_pdg_id(pdg_id: i32) -> Result<Self> {
        match pdg_id.abs() {
            PDG_ELECTRON => Ok(Flavor::Electron),
            PDG_MUON => Ok(Flavor::Muon),
            PDG_TAU => Ok(Flavor::Tau),
            _ => Err(Error::Domain(format!("{pdg_id} is not a charged-lepton identity code"))),
        }
    }

    pub fn pdg_id(&self) -> i32 {
        match self {
            Flavor::Electron => PDG_ELECTRON,
            Flavor::Muon => PDG_MUON,
            Flavor::Tau => PDG_TAU,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Flavor::Electron => "electron",
            Flavor::Muon => "muon",
            Flavor::Tau => "tau",
        }
    }

    /// Minimum pT and maximum |eta| of the baseline acceptance.
    fn acceptance(&self) -> Option<(f64, f64)> {
        match self {
            Flavor::Electron => Some((7.0, 2.5)),
            Flavor::Muon => Some((5.0, 2.4)),
            Flavor::Tau => None,
        }
    }
}

/// Kinematics of a lepton as `(pt, eta, phi, mass)`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PtEtaPhiM {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub mass: f64,
}

impl PtEtaPhiM {
    pub fn new(pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        Self { pt, eta, phi, mass }
    }

    pub fn p4(&self) -> FourMomentum {
        FourMomentum::from_pt_eta_phi_m(self.pt, self.eta, self.phi, self.mass)
    }
}

/// One reconstructed lepton of an event.
#[derive(Clone, Debug, PartialEq)]
pub struct Lepton {
    kin: PtEtaPhiM,
    kin_fsr: PtEtaPhiM,
    pdg_id: i32,
    tight_id: bool,
    rel_iso: f64,
    index: usize,
}

impl Lepton {
    /// Fails on a zero identity code; any other code is stored as given and
    /// only rejected by the queries that need a known flavor.
    pub fn new(
        index: usize,
        kin: PtEtaPhiM,
        kin_fsr: PtEtaPhiM,
        pdg_id: i32,
        tight_id: bool,
        rel_iso: f64,
    ) -> Result<Self> {
        if pdg_id == 0 {
            return Err(Error::MalformedInput(format!(
                "lepton {index} has identity code 0"
            )));
        }
        Ok(Self {
            kin,
            kin_fsr,
            pdg_id,
            tight_id,
            rel_iso,
            index,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pdg_id(&self) -> i32 {
        self.pdg_id
    }

    pub fn pt(&self) -> f64 {
        self.kin.pt
    }

    pub fn eta(&self) -> f64 {
        self.kin.eta
    }

    pub fn phi(&self) -> f64 {
        self.kin.phi
    }

    pub fn rel_iso(&self) -> f64 {
        self.rel_iso
    }

    pub fn tight_id(&self) -> bool {
        self.tight_id
    }

    pub fn kinematics(&self, include_fsr: bool) -> PtEtaPhiM {
        if include_fsr {
            self.kin_fsr
        } else {
            self.kin
        }
    }

    pub fn flavor(&self) -> Result<Flavor> {
        Flavor::from_pdg_id(self.pdg_id)
    }

    /// Electric charge in units of e. Negative identity codes are
    /// antiparticles, so the charge is the opposite sign of the code.
    pub fn charge(&self) -> Result<i32> {
        self.flavor()?;
        Ok(-self.pdg_id.signum())
    }

    /// Same magnitude of identity code.
    pub fn same_flavor(&self, other: &Lepton) -> bool {
        self.pdg_id.abs() == other.pdg_id.abs()
    }

    pub fn opposite_charge(&self, other: &Lepton) -> bool {
        self.pdg_id.signum() * other.pdg_id.signum() < 0
    }

    pub fn four_momentum(&self, include_fsr: bool) -> FourMomentum {
        self.kinematics(include_fsr).p4()
    }

    pub fn delta_r(&self, other: &Lepton) -> f64 {
        kinematics::delta_r(self.kin.eta, self.kin.phi, other.kin.eta, other.kin.phi)
    }

    /// Flavor-dependent pT / |eta| acceptance. Leptons of unknown or tau
    /// flavor never pass.
    pub fn pass_kinematics(&self) -> bool {
        match self.flavor().ok().and_then(|f| f.acceptance()) {
            Some((pt_min, eta_max)) => self.kin.pt > pt_min && self.kin.eta.abs() < eta_max,
            None => false,
        }
    }

    pub fn pass_tight(&self) -> bool {
        let isolated = match self.flavor() {
            Ok(Flavor::Electron) => true,
            Ok(Flavor::Muon) => self.rel_iso < MUON_ISOLATION_MAX,
            _ => false,
        };
        self.tight_id && isolated && self.pass_kinematics()
    }

    pub fn pass_loose(&self) -> bool {
        self.pass_kinematics() && !self.pass_tight()
    }
}
