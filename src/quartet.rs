//! Four-lepton (ZZ) candidates and the OS-Method selection that builds them
//! from the dilepton candidates of an event.

use std::collections::BTreeMap;

use tracing::trace;

use crate::combinatorics::{arrangements, combinations};
use crate::config::{SelectionConfig, Z_MASS};
use crate::dilepton::Dilepton;
use crate::error::{Error, Result};
use crate::kinematics::FourMomentum;
use crate::lepton::Lepton;

/// Ordered pair of dileptons: `z1` plays the on-shell Z role.
#[derive(Copy, Clone, Debug)]
pub struct Quartet<'a> {
    z1: Dilepton<'a>,
    z2: Dilepton<'a>,
}

impl<'a> Quartet<'a> {
    pub fn new(z1: Dilepton<'a>, z2: Dilepton<'a>) -> Self {
        Self { z1, z2 }
    }

    pub fn z1(&self) -> &Dilepton<'a> {
        &self.z1
    }

    pub fn z2(&self) -> &Dilepton<'a> {
        &self.z2
    }

    /// Z1 leptons followed by Z2 leptons.
    pub fn leptons(&self) -> [&'a Lepton; 4] {
        let [a, b] = self.z1.leptons();
        let [c, d] = self.z2.leptons();
        [a, b, c, d]
    }

    pub fn p4(&self) -> FourMomentum {
        self.z1.p4() + self.z2.p4()
    }

    pub fn mass(&self) -> f64 {
        self.p4().mass()
    }

    /// Indices of the four leptons in the event collection, ascending.
    pub fn lepton_indices(&self) -> [usize; 4] {
        let mut indices = self.leptons().map(|l| l.index());
        indices.sort_unstable();
        indices
    }

    pub fn failing_count(&self) -> usize {
        self.z1.failing_count() + self.z2.failing_count()
    }

    pub fn failing_leptons(&self) -> Vec<&'a Lepton> {
        self.leptons()
            .into_iter()
            .filter(|l| !l.pass_tight())
            .collect()
    }

    pub fn abs_pdg_sum(&self) -> i32 {
        self.z1.abs_pdg_sum() + self.z2.abs_pdg_sum()
    }
}

/// Reason an ordered dilepton pair is not a ZZ candidate, in the order the
/// selection steps are applied.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rejection {
    SharedLepton,
    Z1Ineligible,
    Z2CloserToNominal,
    Ghost,
    LeptonPt,
    QcdResonance,
    SmartCut,
    LowM4l,
    TooManyFailing,
}

impl Rejection {
    pub const COUNT: usize = 9;

    pub const ALL: [Rejection; Rejection::COUNT] = [
        Rejection::SharedLepton,
        Rejection::Z1Ineligible,
        Rejection::Z2CloserToNominal,
        Rejection::Ghost,
        Rejection::LeptonPt,
        Rejection::QcdResonance,
        Rejection::SmartCut,
        Rejection::LowM4l,
        Rejection::TooManyFailing,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Rejection::SharedLepton => "shared lepton",
            Rejection::Z1Ineligible => "Z1 eligibility",
            Rejection::Z2CloserToNominal => "Z2 closer to nominal mass",
            Rejection::Ghost => "ghost removal",
            Rejection::LeptonPt => "lepton pT thresholds",
            Rejection::QcdResonance => "QCD suppression",
            Rejection::SmartCut => "smart cut",
            Rejection::LowM4l => "m4l floor",
            Rejection::TooManyFailing => "too many failing leptons",
        }
    }

    fn slot(&self) -> usize {
        *self as usize
    }
}

/// Counts of ordered dilepton pairs tested, rejected per step and accepted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cutflow {
    pub tested: u64,
    pub rejected: [u64; Rejection::COUNT],
    pub accepted: u64,
}

impl Cutflow {
    pub fn record(&mut self, outcome: std::result::Result<(), Rejection>) {
        self.tested += 1;
        match outcome {
            Ok(()) => self.accepted += 1,
            Err(rejection) => self.rejected[rejection.slot()] += 1,
        }
    }

    pub fn rejected_by(&self, rejection: Rejection) -> u64 {
        self.rejected[rejection.slot()]
    }

    pub fn merge(&mut self, other: &Cutflow) {
        self.tested += other.tested;
        self.accepted += other.accepted;
        for (a, b) in self.rejected.iter_mut().zip(other.rejected.iter()) {
            *a += b;
        }
    }
}

/// The alternate opposite-sign same-flavor pairing of the leptons of two
/// same-flavor OSSF dileptons, ordered so the first is closer to the nominal
/// Z mass. `None` if the dileptons do not qualify.
pub fn alternate_pairing(z1: &Dilepton, z2: &Dilepton) -> Option<(FourMomentum, FourMomentum)> {
    if !(z1.is_os_sf() && z2.is_os_sf() && z1.flavor_code() == z2.flavor_code()) {
        return None;
    }
    let [a, b] = z1.leptons();
    let [c, d] = z2.leptons();
    let (za, zb) = if a.opposite_charge(c) {
        (
            a.four_momentum(true) + c.four_momentum(true),
            b.four_momentum(true) + d.four_momentum(true),
        )
    } else {
        (
            a.four_momentum(true) + d.four_momentum(true),
            b.four_momentum(true) + c.four_momentum(true),
        )
    };
    if (zb.mass() - Z_MASS).abs() < (za.mass() - Z_MASS).abs() {
        Some((zb, za))
    } else {
        Some((za, zb))
    }
}

/// Applies the OS-Method selection to the dilepton candidates of one event.
pub struct QuartetBuilder<'c> {
    config: &'c SelectionConfig,
}

impl<'c> QuartetBuilder<'c> {
    pub fn new(config: &'c SelectionConfig) -> Self {
        Self { config }
    }

    /// Runs every selection step on the ordered pair `(z1, z2)`, stopping at
    /// the first that fails.
    pub fn check_pair(&self, z1: &Dilepton, z2: &Dilepton) -> std::result::Result<(), Rejection> {
        let config = self.config;
        if z1.shares_lepton(z2) {
            return Err(Rejection::SharedLepton);
        }
        if !z1.is_z1_eligible(config) {
            return Err(Rejection::Z1Ineligible);
        }
        // the swapped ordering is tried on its own
        if z2.closer_to_nominal_than(z1) && (config.allow_z1_failing_leptons || z2.both_tight()) {
            return Err(Rejection::Z2CloserToNominal);
        }

        let quartet = Quartet::new(*z1, *z2);
        let leptons = quartet.leptons();
        for pair in combinations(4, 2) {
            let (a, b) = (leptons[pair[0]], leptons[pair[1]]);
            if a.delta_r(b) < config.ghost_delta_r {
                return Err(Rejection::Ghost);
            }
        }
        let above_sub = leptons.iter().filter(|l| l.pt() > config.subleading_pt).count();
        let above_lead = leptons.iter().filter(|l| l.pt() > config.leading_pt).count();
        if above_sub < 2 || above_lead < 1 {
            return Err(Rejection::LeptonPt);
        }
        for pair in combinations(4, 2) {
            let (a, b) = (leptons[pair[0]], leptons[pair[1]]);
            if a.opposite_charge(b)
                && (a.four_momentum(false) + b.four_momentum(false)).mass() <= config.qcd_min_mass
            {
                return Err(Rejection::QcdResonance);
            }
        }

        if let Some((za, zb)) = alternate_pairing(z1, z2) {
            if (za.mass() - Z_MASS).abs() < z1.distance_to_nominal()
                && zb.mass() < config.smart_cut_min_mass
            {
                return Err(Rejection::SmartCut);
            }
        }

        if quartet.mass() <= config.m4l_min {
            return Err(Rejection::LowM4l);
        }
        if quartet.failing_count() > config.max_failing_leptons {
            return Err(Rejection::TooManyFailing);
        }
        Ok(())
    }

    /// Every ordered pair of distinct dileptons that passes [`check_pair`].
    ///
    /// [`check_pair`]: QuartetBuilder::check_pair
    pub fn candidates<'a>(&self, dileptons: &[Dilepton<'a>], cutflow: &mut Cutflow) -> Vec<Quartet<'a>> {
        arrangements(dileptons.len(), 2)
            .filter_map(|pair| {
                let (z1, z2) = (&dileptons[pair[0]], &dileptons[pair[1]]);
                let outcome = self.check_pair(z1, z2);
                trace!(
                    z1 = z1.index(),
                    z2 = z2.index(),
                    ?outcome,
                    "dilepton pair"
                );
                cutflow.record(outcome);
                outcome.ok().map(|()| Quartet::new(*z1, *z2))
            })
            .collect()
    }

    /// Keeps one candidate per distinct set of four leptons: the one whose Z1
    /// is closest to the nominal Z mass (ties go to the lower dilepton
    /// indices). Candidates on different lepton sets are all kept, ordered by
    /// their lepton indices.
    pub fn select<'a>(&self, dileptons: &[Dilepton<'a>], cutflow: &mut Cutflow) -> Result<Vec<Quartet<'a>>> {
        let mut groups: BTreeMap<[usize; 4], Vec<Quartet<'a>>> = BTreeMap::new();
        for quartet in self.candidates(dileptons, cutflow) {
            groups.entry(quartet.lepton_indices()).or_default().push(quartet);
        }
        groups
            .into_iter()
            .map(|(indices, group)| {
                if group.len() == 1 {
                    return Ok(group[0]);
                }
                let best = group
                    .into_iter()
                    .min_by(|a, b| {
                        a.z1()
                            .distance_to_nominal()
                            .total_cmp(&b.z1().distance_to_nominal())
                            .then(a.z1().index().cmp(&b.z1().index()))
                            .then(a.z2().index().cmp(&b.z2().index()))
                    })
                    .ok_or_else(|| Error::Invariant("empty candidate group".into()))?;
                if !best.z1().is_z1_eligible(self.config) {
                    return Err(Error::Invariant(format!(
                        "best ordering of leptons {indices:?} has a Z1 (m = {:.3}) that is not Z1-eligible",
                        best.z1().mass()
                    )));
                }
                Ok(best)
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dilepton::build_all_candidates;
    use crate::lepton::tests::lepton;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    /// Opening angle giving two equal-pT massless leptons at eta = 0 an
    /// invariant mass `m`.
    pub(crate) fn opening_angle(pt: f64, m: f64) -> f64 {
        f64::acos(1.0 - m * m / (2.0 * pt * pt))
    }

    /// Four muons where (0, 2) is a Z at rest with m = 91 GeV and (1, 3)
    /// has mass `zb_mass`. Of the crossed pairings, (0, 3) is the one closer
    /// to the nominal mass.
    pub(crate) fn smart_cut_event(zb_mass: f64) -> Vec<Lepton> {
        let delta = opening_angle(20.0, zb_mass);
        let tilt = 0.1;
        vec![
            lepton(0, 13, 45.5, 0.0, 0.0, true),
            lepton(1, 13, 20.0, 0.0, FRAC_PI_2 - delta / 2.0 + tilt, true),
            lepton(2, -13, 45.5, 0.0, PI, true),
            lepton(3, -13, 20.0, 0.0, FRAC_PI_2 + delta / 2.0 + tilt, true),
        ]
    }

    fn find<'a>(zs: &[Dilepton<'a>], i: usize, j: usize) -> Dilepton<'a> {
        *zs.iter()
            .find(|z| {
                let idx = z.leptons().map(|l| l.index());
                idx.contains(&i) && idx.contains(&j)
            })
            .unwrap()
    }

    #[test]
    fn smart_cut_rejects_low_mass_alternate() {
        let config = SelectionConfig::default();
        let builder = QuartetBuilder::new(&config);

        let leptons = smart_cut_event(8.0);
        let zs = build_all_candidates(&leptons, &config);
        let (z1, z2) = (find(&zs, 0, 3), find(&zs, 2, 1));
        assert_eq!(builder.check_pair(&z1, &z2), Err(Rejection::SmartCut));

        let leptons = smart_cut_event(15.0);
        let zs = build_all_candidates(&leptons, &config);
        let (z1, z2) = (find(&zs, 0, 3), find(&zs, 2, 1));
        assert_eq!(builder.check_pair(&z1, &z2), Ok(()));
    }

    #[test]
    fn alternate_pairing_is_ordered_by_nominal_distance() {
        let config = SelectionConfig::default();
        let leptons = smart_cut_event(15.0);
        let zs = build_all_candidates(&leptons, &config);
        let (za, zb) = alternate_pairing(&find(&zs, 0, 3), &find(&zs, 2, 1)).unwrap();
        assert_relative_eq!(za.mass(), 91.0, epsilon = 1e-9);
        assert_relative_eq!(zb.mass(), 15.0, epsilon = 1e-9);
    }

    #[test]
    fn best_ordering_per_lepton_set() {
        let config = SelectionConfig::default();
        let builder = QuartetBuilder::new(&config);

        let leptons = smart_cut_event(15.0);
        let zs = build_all_candidates(&leptons, &config);
        let mut cutflow = Cutflow::default();
        let selected = builder.select(&zs, &mut cutflow).unwrap();
        assert_eq!(selected.len(), 1);
        let best = selected[0];
        assert_relative_eq!(best.z1().mass(), 91.0, epsilon = 1e-9);
        assert_eq!(best.lepton_indices(), [0, 1, 2, 3]);
        assert!(cutflow.accepted >= 2);
        assert_eq!(cutflow.tested, (zs.len() * (zs.len() - 1)) as u64);

        let leptons = smart_cut_event(8.0);
        let zs = build_all_candidates(&leptons, &config);
        let mut cutflow = Cutflow::default();
        assert!(builder.select(&zs, &mut cutflow).unwrap().is_empty());
        assert!(cutflow.rejected_by(Rejection::SmartCut) >= 1);
    }

    /// A muon pair at 90 GeV and an electron pair at 60 GeV, both at eta = 0.
    fn two_z_event(muon_tight: [bool; 2]) -> Vec<Lepton> {
        let delta = opening_angle(40.0, 60.0);
        vec![
            lepton(0, 13, 45.0, 0.0, 0.0, muon_tight[0]),
            lepton(1, -13, 45.0, 0.0, opening_angle(45.0, 90.0), muon_tight[1]),
            lepton(2, 11, 40.0, 0.0, 1.0, true),
            lepton(3, -11, 40.0, 0.0, 1.0 + delta, true),
        ]
    }

    #[test]
    fn z2_closer_to_nominal_rejects_ordering() {
        let relaxed = SelectionConfig::default();
        let leptons = two_z_event([true, true]);
        let zs = build_all_candidates(&leptons, &relaxed);
        let (z90, z60) = (find(&zs, 0, 1), find(&zs, 2, 3));
        assert_relative_eq!(z90.mass(), 90.0, epsilon = 1e-9);
        assert_relative_eq!(z60.mass(), 60.0, epsilon = 1e-9);

        let builder = QuartetBuilder::new(&relaxed);
        assert_eq!(builder.check_pair(&z60, &z90), Err(Rejection::Z2CloserToNominal));
        assert_eq!(builder.check_pair(&z90, &z60), Ok(()));

        // the priority rule still applies when both Z2 leptons pass
        let strict = SelectionConfig {
            allow_z1_failing_leptons: false,
            ..SelectionConfig::default()
        };
        let builder = QuartetBuilder::new(&strict);
        assert_eq!(builder.check_pair(&z60, &z90), Err(Rejection::Z2CloserToNominal));
    }

    #[test]
    fn failing_on_shell_pair_cannot_be_z1_when_strict() {
        let strict = SelectionConfig {
            allow_z1_failing_leptons: false,
            ..SelectionConfig::default()
        };
        let builder = QuartetBuilder::new(&strict);
        let leptons = two_z_event([true, false]);
        let zs = build_all_candidates(&leptons, &strict);
        let (z90, z60) = (find(&zs, 0, 1), find(&zs, 2, 3));
        assert_eq!(builder.check_pair(&z60, &z90), Ok(()));
        assert_eq!(builder.check_pair(&z90, &z60), Err(Rejection::Z1Ineligible));

        let mut cutflow = Cutflow::default();
        let selected = builder.select(&zs, &mut cutflow).unwrap();
        assert_eq!(selected.len(), 1);
        assert_relative_eq!(selected[0].z1().mass(), 60.0, epsilon = 1e-9);
        assert_eq!(selected[0].failing_count(), 1);
        assert_eq!(cutflow.rejected_by(Rejection::Z1Ineligible), 1);
    }

    #[test]
    fn lighter_or_overlapping_pairs_are_not_z1() {
        let config = SelectionConfig::default();
        let builder = QuartetBuilder::new(&config);
        let leptons = smart_cut_event(15.0);
        let zs = build_all_candidates(&leptons, &config);
        let on_shell = find(&zs, 0, 2);
        let light = find(&zs, 1, 3);
        assert_eq!(builder.check_pair(&on_shell, &light), Ok(()));
        assert_eq!(
            builder.check_pair(&light, &on_shell),
            Err(Rejection::Z1Ineligible)
        );
        let crossed = find(&zs, 0, 3);
        assert_eq!(
            builder.check_pair(&crossed, &on_shell),
            Err(Rejection::SharedLepton)
        );
    }

    #[test]
    fn ghosts_and_qcd_resonances() {
        let config = SelectionConfig::default();
        let builder = QuartetBuilder::new(&config);
        let z1_delta = opening_angle(45.0, 90.0);
        let leptons = vec![
            lepton(0, 11, 45.0, 0.0, 0.0, true),
            lepton(1, -11, 45.0, 0.0, z1_delta, true),
            // 13 and -13 almost on top of the electron
            lepton(2, 13, 30.0, 0.0, 0.01, true),
            lepton(3, -13, 30.0, 1.5, 2.0, true),
        ];
        let zs = build_all_candidates(&leptons, &config);
        let (z1, z2) = (find(&zs, 0, 1), find(&zs, 2, 3));
        assert_eq!(builder.check_pair(&z1, &z2), Err(Rejection::Ghost));

        // an opposite-sign electron-muon pair at ~3 GeV
        let qcd = 3.0;
        let leptons = vec![
            lepton(0, 11, 45.0, 0.0, 0.0, true),
            lepton(1, -11, 45.0, 0.0, z1_delta, true),
            lepton(2, -13, 30.0, 0.0, opening_angle(f64::sqrt(45.0 * 30.0), qcd), true),
            lepton(3, 13, 30.0, 1.5, -2.0, true),
        ];
        let zs = build_all_candidates(&leptons, &config);
        let (z1, z2) = (find(&zs, 0, 1), find(&zs, 2, 3));
        assert_eq!(builder.check_pair(&z1, &z2), Err(Rejection::QcdResonance));
    }

    #[test]
    fn pt_thresholds() {
        let config = SelectionConfig::default();
        let builder = QuartetBuilder::new(&config);
        let leptons = vec![
            lepton(0, 13, 19.0, 0.0, 0.0, true),
            lepton(1, -13, 19.0, 1.0, PI, true),
            lepton(2, 11, 9.0, 1.0, 1.0, true),
            lepton(3, -11, 9.0, -1.0, -1.5, true),
        ];
        let zs = build_all_candidates(&leptons, &config);
        let (z1, z2) = (find(&zs, 0, 1), find(&zs, 2, 3));
        assert_eq!(builder.check_pair(&z1, &z2), Err(Rejection::LeptonPt));
    }

    #[test]
    fn cutflow_merges() {
        let mut a = Cutflow::default();
        a.record(Ok(()));
        a.record(Err(Rejection::Ghost));
        let mut b = Cutflow::default();
        b.record(Err(Rejection::Ghost));
        b.record(Err(Rejection::LowM4l));
        a.merge(&b);
        assert_eq!(a.tested, 4);
        assert_eq!(a.accepted, 1);
        assert_eq!(a.rejected_by(Rejection::Ghost), 2);
        assert_eq!(a.rejected_by(Rejection::LowM4l), 1);
        assert_eq!(a.rejected_by(Rejection::SmartCut), 0);
    }
}
