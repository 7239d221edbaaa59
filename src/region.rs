use std::fmt;

use crate::error::{Error, Result};
use crate::lepton::{PDG_ELECTRON, PDG_MUON};
use crate::quartet::Quartet;

/// Control region of a quartet, carrying the collection indices of the
/// leptons that fail the tight selection.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ControlRegion {
    SignalLike,
    ThreePassOneFail { fail: usize },
    TwoPassTwoFail { fails: [usize; 2] },
}

impl ControlRegion {
    pub fn label(&self) -> &'static str {
        match self {
            ControlRegion::SignalLike => "SR",
            ControlRegion::ThreePassOneFail { .. } => "3P1F",
            ControlRegion::TwoPassTwoFail { .. } => "2P2F",
        }
    }

    pub fn failing_indices(&self) -> Vec<usize> {
        match self {
            ControlRegion::SignalLike => vec![],
            ControlRegion::ThreePassOneFail { fail } => vec![*fail],
            ControlRegion::TwoPassTwoFail { fails } => fails.to_vec(),
        }
    }

    pub fn is_3p1f(&self) -> bool {
        matches!(self, ControlRegion::ThreePassOneFail { .. })
    }

    pub fn is_2p2f(&self) -> bool {
        matches!(self, ControlRegion::TwoPassTwoFail { .. })
    }
}

impl fmt::Display for ControlRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lepton-flavor content of a quartet. The mixed states are told apart by
/// the flavor of the Z2 pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlavorComposition {
    FourElectron,
    FourMuon,
    TwoMuonTwoElectron,
    TwoElectronTwoMuon,
}

impl FlavorComposition {
    pub fn of(quartet: &Quartet) -> Result<Self> {
        const ELECTRON_PAIR: i32 = 2 * PDG_ELECTRON;
        const MUON_PAIR: i32 = 2 * PDG_MUON;
        const FOUR_ELECTRONS: i32 = 2 * ELECTRON_PAIR;
        const FOUR_MUONS: i32 = 2 * MUON_PAIR;
        const MIXED: i32 = ELECTRON_PAIR + MUON_PAIR;
        match quartet.abs_pdg_sum() {
            FOUR_ELECTRONS => Ok(FlavorComposition::FourElectron),
            FOUR_MUONS => Ok(FlavorComposition::FourMuon),
            MIXED if !quartet.z2().is_same_flavor() => Err(Error::Domain(format!(
                "mixed quartet {:?} with a different-flavor Z2",
                quartet.lepton_indices()
            ))),
            MIXED => match quartet.z2().flavor_code() {
                PDG_ELECTRON => Ok(FlavorComposition::TwoMuonTwoElectron),
                PDG_MUON => Ok(FlavorComposition::TwoElectronTwoMuon),
                code => Err(Error::Domain(format!(
                    "mixed quartet with a Z2 of identity code {code}"
                ))),
            },
            sum => Err(Error::Domain(format!(
                "no flavor composition for identity-code sum {sum}"
            ))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FlavorComposition::FourElectron => "4e",
            FlavorComposition::FourMuon => "4mu",
            FlavorComposition::TwoMuonTwoElectron => "2mu2e",
            FlavorComposition::TwoElectronTwoMuon => "2e2mu",
        }
    }
}

impl fmt::Display for FlavorComposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Copy, Clone, Debug)]
pub struct ClassifiedQuartet<'a> {
    pub quartet: Quartet<'a>,
    pub region: ControlRegion,
    pub composition: FlavorComposition,
}

pub fn classify<'a>(quartet: Quartet<'a>) -> Result<ClassifiedQuartet<'a>> {
    let fails: Vec<usize> = quartet.failing_leptons().iter().map(|l| l.index()).collect();
    let region = match fails.as_slice() {
        [] => ControlRegion::SignalLike,
        [fail] => ControlRegion::ThreePassOneFail { fail: *fail },
        [a, b] => ControlRegion::TwoPassTwoFail { fails: [*a, *b] },
        _ => {
            return Err(Error::Invariant(format!(
                "accepted quartet {:?} has {} failing leptons",
                quartet.lepton_indices(),
                fails.len()
            )))
        }
    };
    Ok(ClassifiedQuartet {
        quartet,
        region,
        composition: FlavorComposition::of(&quartet)?,
    })
}

/// Classifies every selected quartet of an event. With `prefer_3p1f`, an
/// event with at least one 3P1F quartet keeps no 2P2F quartets.
pub fn classify_event<'a>(quartets: &[Quartet<'a>], prefer_3p1f: bool) -> Result<Vec<ClassifiedQuartet<'a>>> {
    let mut classified = quartets
        .iter()
        .map(|q| classify(*q))
        .collect::<Result<Vec<_>>>()?;
    if prefer_3p1f && classified.iter().any(|c| c.region.is_3p1f()) {
        classified.retain(|c| !c.region.is_2p2f());
    }
    Ok(classified)
}
