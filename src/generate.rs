//! Toy four-lepton events for exercising the pipeline without real data.

use std::f64::consts::PI;

use rand::{distributions::Uniform, rngs::StdRng, Rng, SeedableRng};
use tracing::info;

use crate::config::Z_MASS;
use crate::error::{Error, Result};
use crate::event::{EventId, EventRecord};
use crate::kinematics::FourMomentum;
use crate::lepton::{PtEtaPhiM, PDG_ELECTRON, PDG_MUON};

pub const Z_WIDTH: f64 = 2.4952;
const ELECTRON_MASS: f64 = 0.000511;
const MUON_MASS: f64 = 0.105_658;

const Z1_MASS_BOUNDS: (f64, f64) = (60.0, 120.0);
const Z2_MASS_BOUNDS: (f64, f64) = (12.0, 60.0);
const Z_PT_MAX: f64 = 60.0;
const Z_ETA_MAX: f64 = 1.5;
const EXTRA_PT_BOUNDS: (f64, f64) = (5.0, 30.0);
const EVENTS_PER_LUMI: u64 = 1000;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeneratorConfig {
    pub events: usize,
    pub seed: u64,
    /// Probability that a Z-daughter lepton passes the tight selection.
    pub tight_probability: f64,
    /// Probability of an additional, mostly non-prompt, lepton.
    pub extra_lepton_probability: f64,
    pub base_weight: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            events: 10_000,
            seed: 0,
            tight_probability: 0.8,
            extra_lepton_probability: 0.2,
            base_weight: 1.0,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, p) in [
            ("tight_probability", self.tight_probability),
            ("extra_lepton_probability", self.extra_lepton_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::Config(format!("{name} = {p} is not a probability")));
            }
        }
        Ok(())
    }
}

fn gen_z1_mass<R: Rng>(rng: &mut R) -> f64 {
    let u_mass = Uniform::new(Z1_MASS_BOUNDS.0, Z1_MASS_BOUNDS.1);
    let u_p = Uniform::new(0.0, 1.0);
    let mg2 = (Z_MASS * Z_WIDTH).powi(2);
    loop {
        let m_star: f64 = rng.sample(u_mass);
        // relativistic Breit-Wigner, normalized to one at the pole
        let p = mg2 / ((m_star * m_star - Z_MASS * Z_MASS).powi(2) + mg2);
        if p >= rng.sample(u_p) {
            return m_star;
        }
    }
}

fn gen_z2_mass<R: Rng>(rng: &mut R) -> f64 {
    let u_mass = Uniform::new(Z2_MASS_BOUNDS.0, Z2_MASS_BOUNDS.1);
    let u_p = Uniform::new(0.0, 1.0);
    loop {
        let m_star: f64 = rng.sample(u_mass);
        if Z2_MASS_BOUNDS.0 / m_star >= rng.sample(u_p) {
            return m_star;
        }
    }
}

fn gen_flavor<R: Rng>(rng: &mut R) -> (i32, f64) {
    if rng.gen_bool(0.5) {
        (PDG_ELECTRON, ELECTRON_MASS)
    } else {
        (PDG_MUON, MUON_MASS)
    }
}

fn kinematics(p4: &FourMomentum, mass: f64) -> PtEtaPhiM {
    PtEtaPhiM::new(p4.pt(), p4.eta(), p4.phi(), mass)
}

/// Decays a Z of the given mass into an opposite-sign same-flavor pair and
/// appends the pair to `record`, negative lepton first.
fn push_z<R: Rng>(rng: &mut R, record: &mut EventRecord, mass: f64, tight_probability: f64) {
    let u_pt = Uniform::new(0.0, Z_PT_MAX);
    let u_eta = Uniform::new(-Z_ETA_MAX, Z_ETA_MAX);
    let u_phi = Uniform::new(-PI, PI);
    let u_costheta = Uniform::new(-1.0, 1.0);
    let z = FourMomentum::from_pt_eta_phi_m(rng.sample(u_pt), rng.sample(u_eta), rng.sample(u_phi), mass);
    let (pdg_id, lepton_mass) = gen_flavor(rng);
    let (minus, plus) = z.two_body_decay(lepton_mass, lepton_mass, rng.sample(u_costheta), rng.sample(u_phi));
    for (p4, sign) in [(minus, 1), (plus, -1)] {
        let kin = kinematics(&p4, lepton_mass);
        let tight = rng.gen_bool(tight_probability);
        let rel_iso = rng.sample(Uniform::new(0.0, 0.3));
        record.leptons.push(kin, kin, sign * pdg_id, tight, rel_iso);
    }
}

fn push_extra<R: Rng>(rng: &mut R, record: &mut EventRecord) {
    let (pdg_id, lepton_mass) = gen_flavor(rng);
    let sign = if rng.gen_bool(0.5) { 1 } else { -1 };
    let kin = PtEtaPhiM::new(
        rng.sample(Uniform::new(EXTRA_PT_BOUNDS.0, EXTRA_PT_BOUNDS.1)),
        rng.sample(Uniform::new(-2.4, 2.4)),
        rng.sample(Uniform::new(-PI, PI)),
        lepton_mass,
    );
    let tight = rng.gen_bool(0.1);
    let rel_iso = rng.sample(Uniform::new(0.0, 1.0));
    record.leptons.push(kin, kin, sign * pdg_id, tight, rel_iso);
}

fn generate_event<R: Rng>(rng: &mut R, id: EventId, config: &GeneratorConfig) -> EventRecord {
    let mut record = EventRecord::new(id, config.base_weight);
    let z1_mass = gen_z1_mass(rng);
    let z2_mass = gen_z2_mass(rng);
    push_z(rng, &mut record, z1_mass, config.tight_probability);
    push_z(rng, &mut record, z2_mass, config.tight_probability);
    if rng.gen_bool(config.extra_lepton_probability) {
        push_extra(rng, &mut record);
    }
    record
}

pub fn generate(config: &GeneratorConfig) -> Result<Vec<EventRecord>> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    info!(events = config.events, seed = config.seed, "generating toy events");
    Ok((0..config.events as u64)
        .map(|i| {
            let id = EventId::new(1, i / EVENTS_PER_LUMI + 1, i);
            generate_event(&mut rng, id, config)
        })
        .collect())
}
