use crate::combinatorics::combinations;
use crate::config::{SelectionConfig, Z_MASS};
use crate::kinematics::FourMomentum;
use crate::lepton::Lepton;

/// A Z candidate: two leptons of the event, stored pT-descending, with their
/// FSR-inclusive four-momentum sum.
#[derive(Copy, Clone, Debug)]
pub struct Dilepton<'a> {
    leptons: [&'a Lepton; 2],
    p4: FourMomentum,
    index: usize,
}

impl<'a> Dilepton<'a> {
    /// Builds the candidate if the pair is opposite-sign same-flavor (or the
    /// config allows otherwise) and its FSR-inclusive mass lies strictly
    /// inside the Z mass window.
    pub fn try_build(a: &'a Lepton, b: &'a Lepton, config: &SelectionConfig) -> Option<Self> {
        if a.pdg_id() == 0 || b.pdg_id() == 0 || a.index() == b.index() {
            return None;
        }
        if !config.allow_wrong_charge_flavor && !(a.same_flavor(b) && a.opposite_charge(b)) {
            return None;
        }
        let p4 = a.four_momentum(true) + b.four_momentum(true);
        let mass = p4.mass();
        let (lo, hi) = config.z_mass_window;
        if !(mass > lo && mass < hi) {
            return None;
        }
        let leptons = if b.pt() > a.pt() { [b, a] } else { [a, b] };
        Some(Self {
            leptons,
            p4,
            index: 0,
        })
    }

    pub fn leptons(&self) -> [&'a Lepton; 2] {
        self.leptons
    }

    /// Position of this candidate in the output of [`build_all_candidates`].
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn p4(&self) -> FourMomentum {
        self.p4
    }

    pub fn mass(&self) -> f64 {
        self.p4.mass()
    }

    pub fn mass_without_fsr(&self) -> f64 {
        (self.leptons[0].four_momentum(false) + self.leptons[1].four_momentum(false)).mass()
    }

    pub fn distance_to_nominal(&self) -> f64 {
        (self.mass() - Z_MASS).abs()
    }

    pub fn closer_to_nominal_than(&self, other: &Dilepton) -> bool {
        self.distance_to_nominal() < other.distance_to_nominal()
    }

    pub fn is_same_flavor(&self) -> bool {
        self.leptons[0].same_flavor(self.leptons[1])
    }

    pub fn is_opposite_sign(&self) -> bool {
        self.leptons[0].opposite_charge(self.leptons[1])
    }

    pub fn is_os_sf(&self) -> bool {
        self.is_same_flavor() && self.is_opposite_sign()
    }

    /// Absolute identity code of the leading lepton.
    pub fn flavor_code(&self) -> i32 {
        self.leptons[0].pdg_id().abs()
    }

    /// Sum of absolute identity codes of both leptons.
    pub fn abs_pdg_sum(&self) -> i32 {
        self.leptons.iter().map(|l| l.pdg_id().abs()).sum()
    }

    pub fn both_tight(&self) -> bool {
        self.leptons.iter().all(|l| l.pass_tight())
    }

    pub fn failing_count(&self) -> usize {
        self.leptons.iter().filter(|l| !l.pass_tight()).count()
    }

    pub fn contains(&self, lepton: &Lepton) -> bool {
        self.leptons.iter().any(|l| l.index() == lepton.index())
    }

    pub fn shares_lepton(&self, other: &Dilepton) -> bool {
        other.leptons.iter().any(|l| self.contains(l))
    }

    pub fn is_z1_eligible(&self, config: &SelectionConfig) -> bool {
        self.mass() > config.z1_min_mass && (config.allow_z1_failing_leptons || self.both_tight())
    }
}

/// All dileptons built from unordered pairs of `leptons`, indexed by their
/// position in the returned list.
pub fn build_all_candidates<'a>(leptons: &'a [Lepton], config: &SelectionConfig) -> Vec<Dilepton<'a>> {
    combinations(leptons.len(), 2)
        .filter_map(|pair| Dilepton::try_build(&leptons[pair[0]], &leptons[pair[1]], config))
        .enumerate()
        .map(|(index, mut z)| {
            z.index = index;
            z
        })
        .collect()
}
