use std::f64::consts::{FRAC_PI_2, PI};

use approx::assert_relative_eq;
use proptest::prelude::*;

use reducible_bkg::analysis::{Analyzer, Diagnostics, EventOutcome};
use reducible_bkg::config::{AnalysisConfig, SelectionConfig};
use reducible_bkg::dilepton::build_all_candidates;
use reducible_bkg::event::{EventId, EventRecord};
use reducible_bkg::fakerate::FakeRateTable;
use reducible_bkg::kinematics::FourMomentum;
use reducible_bkg::lepton::{Lepton, PtEtaPhiM};
use reducible_bkg::quartet::{Cutflow, QuartetBuilder, Rejection};
use reducible_bkg::region::ControlRegion;
use reducible_bkg::weight::ratio;

const RATES: &str = r#"{
    "rates": {
        "electron-barrel": {
            "edges": [5.0, 10.0, 20.0, 30.0, 50.0, 100.0],
            "rates": [0.10, 0.12, 0.15, 0.20, 0.25],
            "errors": [0.01, 0.01, 0.02, 0.02, 0.03]
        },
        "electron-endcap": {
            "edges": [5.0, 100.0],
            "rates": [0.3],
            "errors": [0.05]
        },
        "muon-barrel": {
            "edges": [5.0, 10.0, 20.0, 100.0],
            "rates": [0.05, 0.08, 0.11],
            "errors": [0.01, 0.01, 0.01]
        },
        "muon-endcap": {
            "edges": [5.0, 100.0],
            "rates": [0.2],
            "errors": [0.04]
        }
    }
}"#;

fn table() -> FakeRateTable {
    FakeRateTable::from_json_str(RATES).unwrap()
}

fn kin(p4: &FourMomentum) -> PtEtaPhiM {
    PtEtaPhiM::new(p4.pt(), p4.eta(), p4.phi(), 0.0)
}

/// Two back-to-back Z candidates along x with masses `z1` and `z2` and a
/// four-lepton mass of `m4l`, each decaying perpendicular to its momentum.
/// Z1 goes to muons, Z2 to electrons; negative leptons come first.
fn two_boson_event(m4l: f64, z1: f64, z2: f64, tight: [bool; 4], base_weight: f64) -> EventRecord {
    let e1 = (m4l * m4l + z1 * z1 - z2 * z2) / (2.0 * m4l);
    let p = f64::sqrt(e1 * e1 - z1 * z1);
    let z1_p4 = FourMomentum::new(e1, p, 0.0, 0.0);
    let z2_p4 = FourMomentum::new(m4l - e1, -p, 0.0, 0.0);
    let (mu_minus, mu_plus) = z1_p4.two_body_decay(0.0, 0.0, 0.0, FRAC_PI_2);
    let (e_minus, e_plus) = z2_p4.two_body_decay(0.0, 0.0, 0.0, FRAC_PI_2);

    let mut record = EventRecord::new(EventId::new(1, 1, 1), base_weight);
    for (p4, pdg_id, tight) in [
        (mu_minus, 13, tight[0]),
        (mu_plus, -13, tight[1]),
        (e_minus, 11, tight[2]),
        (e_plus, -11, tight[3]),
    ] {
        record.leptons.push(kin(&p4), kin(&p4), pdg_id, tight, 0.1);
    }
    record
}

fn selected(outcome: EventOutcome) -> Vec<reducible_bkg::event::OutputRow> {
    match outcome {
        EventOutcome::Selected(rows) => rows,
        EventOutcome::NoCandidate => panic!("expected selected quartets"),
    }
}

#[test]
fn single_loose_lepton_gives_three_pass_one_fail() {
    let table = table();
    let analyzer = Analyzer::new(AnalysisConfig::default(), &table).unwrap();
    let record = two_boson_event(130.0, 91.0, 25.0, [true, true, true, false], 0.7);
    let loose_pt = record.leptons.pt[3];
    assert!(loose_pt > 10.0 && loose_pt < 20.0);

    let mut diagnostics = Diagnostics::default();
    let rows = selected(analyzer.process_event(&record, &mut diagnostics).unwrap());
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.region, ControlRegion::ThreePassOneFail { fail: 3 });
    assert_eq!(row.region.label(), "3P1F");
    assert_eq!(row.composition.label(), "2mu2e");
    assert_relative_eq!(row.m4l, 130.0, epsilon = 1e-6);
    assert_relative_eq!(row.z1_mass, 91.0, epsilon = 1e-6);
    assert_relative_eq!(row.z2_mass, 25.0, epsilon = 1e-6);
    assert_relative_eq!(row.weight.nominal, 0.7 * 0.12 / 0.88, epsilon = 1e-12);
    assert_relative_eq!(row.weight.down, 0.7 * ratio(0.11), epsilon = 1e-12);
    assert_relative_eq!(row.weight.up, 0.7 * ratio(0.13), epsilon = 1e-12);
    assert!(row.contribution_to_3p1f.is_none());
}

#[test]
fn low_four_lepton_mass_is_rejected() {
    let table = table();
    let analyzer = Analyzer::new(AnalysisConfig::default(), &table).unwrap();
    let record = two_boson_event(68.0, 50.0, 15.0, [true, true, false, false], 1.0);

    let mut diagnostics = Diagnostics::default();
    let outcome = analyzer.process_event(&record, &mut diagnostics).unwrap();
    assert_eq!(outcome, EventOutcome::NoCandidate);
    assert_eq!(diagnostics.cutflow.rejected_by(Rejection::LowM4l), 1);
    assert_eq!(diagnostics.cutflow.accepted, 0);

    let acc = analyzer.run(&[record], None).unwrap();
    assert!(acc.rows.is_empty());
    assert_eq!(acc.diagnostics.no_candidate, 1);
    assert_eq!(acc.diagnostics.malformed, 0);
}

#[test]
fn shared_tight_leptons_with_two_loose_partners_keep_both_quartets() {
    let table = table();
    let analyzer = Analyzer::new(AnalysisConfig::default(), &table).unwrap();
    let mut record = two_boson_event(130.0, 91.0, 25.0, [true, true, true, false], 1.0);
    let extra = PtEtaPhiM::new(20.0, 0.8, 0.0, 0.0);
    record.leptons.push(extra, extra, -11, false, 0.1);

    let mut diagnostics = Diagnostics::default();
    let rows = selected(analyzer.process_event(&record, &mut diagnostics).unwrap());
    // The quartets share three leptons but differ as lepton sets, so neither
    // replaces the other.
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].lepton_indices, [0, 1, 2, 3]);
    assert_eq!(rows[1].lepton_indices, [0, 1, 2, 4]);
    assert_eq!(rows[0].region, ControlRegion::ThreePassOneFail { fail: 3 });
    assert_eq!(rows[1].region, ControlRegion::ThreePassOneFail { fail: 4 });
    assert_relative_eq!(rows[0].weight.nominal, ratio(0.12), epsilon = 1e-12);
    assert_relative_eq!(rows[1].weight.nominal, ratio(0.15), epsilon = 1e-12);
    assert_eq!(diagnostics.multi_quartet, 1);
}

#[test]
fn all_tight_leptons_are_signal_like() {
    let table = table();
    let analyzer = Analyzer::new(AnalysisConfig::default(), &table).unwrap();
    let record = two_boson_event(130.0, 91.0, 25.0, [true; 4], 2.0);
    let mut diagnostics = Diagnostics::default();
    let rows = selected(analyzer.process_event(&record, &mut diagnostics).unwrap());
    assert_eq!(rows[0].region, ControlRegion::SignalLike);
    assert_relative_eq!(rows[0].weight.nominal, 2.0);
}

#[test]
fn two_loose_leptons_give_two_pass_two_fail() {
    let table = table();
    let analyzer = Analyzer::new(AnalysisConfig::default(), &table).unwrap();
    let record = two_boson_event(130.0, 91.0, 25.0, [true, true, false, false], 1.0);
    let mut diagnostics = Diagnostics::default();
    let rows = selected(analyzer.process_event(&record, &mut diagnostics).unwrap());
    assert!(rows[0].region.is_2p2f());
    let mut fails = rows[0].region.failing_indices();
    fails.sort_unstable();
    assert_eq!(fails, vec![2, 3]);
    let r = ratio(0.12);
    assert_relative_eq!(rows[0].weight.nominal, r * r, epsilon = 1e-12);
    assert_relative_eq!(rows[0].contribution_to_3p1f.unwrap().nominal, 2.0 * r, epsilon = 1e-12);
}

fn lepton_strategy() -> impl Strategy<Value = (i32, f64, f64, f64, bool)> {
    (
        prop_oneof![Just(11), Just(-11), Just(13), Just(-13)],
        5.0f64..80.0,
        -2.4f64..2.4,
        -PI..PI,
        any::<bool>(),
    )
}

fn build(specs: &[(i32, f64, f64, f64, bool)]) -> Vec<Lepton> {
    specs
        .iter()
        .enumerate()
        .map(|(i, &(pdg_id, pt, eta, phi, tight))| {
            let kin = PtEtaPhiM::new(pt, eta, phi, 0.0);
            Lepton::new(i, kin, kin, pdg_id, tight, 0.1).unwrap()
        })
        .collect()
}

proptest! {
    #[test]
    fn selection_is_repeatable_and_bounded(specs in prop::collection::vec(lepton_strategy(), 4..7)) {
        let leptons = build(&specs);
        let config = SelectionConfig::default();
        let builder = QuartetBuilder::new(&config);
        let mut cutflow = Cutflow::default();

        let first = build_all_candidates(&leptons, &config);
        let first = builder.select(&first, &mut cutflow).unwrap();
        let second = build_all_candidates(&leptons, &config);
        let second = builder.select(&second, &mut cutflow).unwrap();

        let mut a: Vec<[usize; 4]> = first.iter().map(|q| q.lepton_indices()).collect();
        let mut b: Vec<[usize; 4]> = second.iter().map(|q| q.lepton_indices()).collect();
        a.sort_unstable();
        b.sort_unstable();
        prop_assert_eq!(a, b);
        for q in &first {
            prop_assert!(q.failing_count() <= 2);
        }
    }
}
