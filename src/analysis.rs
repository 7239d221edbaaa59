//! The per-event pipeline (leptons -> dileptons -> quartets -> control
//! regions -> weights) and the parallel loop over a run's events.

use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::config::AnalysisConfig;
use crate::dilepton::build_all_candidates;
use crate::error::Result;
use crate::event::{EventRecord, OutputRow};
use crate::fakerate::FakeRateTable;
use crate::lepton::Lepton;
use crate::quartet::{Cutflow, QuartetBuilder, Rejection};
use crate::region::classify_event;
use crate::weight::{BackgroundWeightEngine, WeightDiagnostics};

#[derive(Clone, Debug, PartialEq)]
pub enum EventOutcome {
    /// No quartet entered a control region. Not an error.
    NoCandidate,
    Selected(Vec<OutputRow>),
}

/// Run-level counters. Each worker fills its own copy; copies are merged at
/// the end of the run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Diagnostics {
    pub processed: u64,
    pub malformed: u64,
    pub no_candidate: u64,
    pub selected: u64,
    /// Events that kept more than one quartet.
    pub multi_quartet: u64,
    /// 2P2F quartets dropped in favor of a 3P1F quartet of the same event.
    pub dropped_2p2f: u64,
    pub reference_matches: u64,
    pub reference_mismatches: u64,
    pub cutflow: Cutflow,
    pub weights: WeightDiagnostics,
}

impl Diagnostics {
    pub fn merge(&mut self, other: &Diagnostics) {
        self.processed += other.processed;
        self.malformed += other.malformed;
        self.no_candidate += other.no_candidate;
        self.selected += other.selected;
        self.multi_quartet += other.multi_quartet;
        self.dropped_2p2f += other.dropped_2p2f;
        self.reference_matches += other.reference_matches;
        self.reference_mismatches += other.reference_mismatches;
        self.cutflow.merge(&other.cutflow);
        self.weights.merge(&other.weights);
    }

    pub fn log_summary(&self) {
        info!(
            processed = self.processed,
            selected = self.selected,
            no_candidate = self.no_candidate,
            malformed = self.malformed,
            multi_quartet = self.multi_quartet,
            dropped_2p2f = self.dropped_2p2f,
            "event summary"
        );
        info!(
            tested = self.cutflow.tested,
            accepted = self.cutflow.accepted,
            "dilepton pairs"
        );
        for rejection in Rejection::ALL {
            info!(
                step = rejection.name(),
                rejected = self.cutflow.rejected_by(rejection),
                "cutflow"
            );
        }
        if self.weights != WeightDiagnostics::default() {
            warn!(
                clamped_negative = self.weights.clamped_negative,
                non_positive_nominal = self.weights.non_positive_nominal,
                capped_high = self.weights.capped_high,
                "fake rates adjusted"
            );
        }
        if self.reference_matches + self.reference_mismatches > 0 {
            info!(
                matches = self.reference_matches,
                mismatches = self.reference_mismatches,
                "reference quartet cross-check"
            );
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Accumulator {
    pub rows: Vec<OutputRow>,
    pub diagnostics: Diagnostics,
}

impl Accumulator {
    pub fn merge(mut self, other: Accumulator) -> Self {
        self.rows.extend(other.rows);
        self.diagnostics.merge(&other.diagnostics);
        self
    }
}

pub struct Analyzer<'t> {
    config: AnalysisConfig,
    fake_rates: &'t FakeRateTable,
}

impl<'t> Analyzer<'t> {
    pub fn new(config: AnalysisConfig, fake_rates: &'t FakeRateTable) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, fake_rates })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Runs the full selection and weighting on one event. Leptons outside
    /// the baseline acceptance take no part.
    pub fn process_event(&self, event: &EventRecord, diagnostics: &mut Diagnostics) -> Result<EventOutcome> {
        let selection = &self.config.selection;
        let leptons: Vec<Lepton> = event
            .leptons
            .leptons()?
            .into_iter()
            .filter(|l| l.pass_kinematics())
            .collect();
        let dileptons = build_all_candidates(&leptons, selection);
        let quartets = QuartetBuilder::new(selection).select(&dileptons, &mut diagnostics.cutflow)?;
        let classified = classify_event(&quartets, self.config.prefer_3p1f)?;
        diagnostics.dropped_2p2f += (quartets.len() - classified.len()) as u64;
        if classified.is_empty() {
            return Ok(EventOutcome::NoCandidate);
        }
        if classified.len() > 1 {
            diagnostics.multi_quartet += 1;
            debug!(event = %event.id, quartets = classified.len(), "several quartets kept");
        }

        let reference = event.reference_quartet.map(|mut r| {
            r.sort_unstable();
            r
        });
        let engine = BackgroundWeightEngine::new(self.fake_rates);
        let rows = classified
            .iter()
            .map(|c| {
                let weight = engine.weigh(c, event.base_weight, &mut diagnostics.weights)?;
                let lepton_indices = c.quartet.lepton_indices();
                Ok(OutputRow {
                    id: event.id,
                    region: c.region,
                    composition: c.composition,
                    m4l: c.quartet.mass(),
                    z1_mass: c.quartet.z1().mass(),
                    z2_mass: c.quartet.z2().mass(),
                    weight: weight.weight,
                    contribution_to_3p1f: weight.contribution_to_3p1f,
                    lepton_indices,
                    matches_reference: reference.map(|r| r == lepton_indices),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if reference.is_some() {
            if rows.iter().any(|r| r.matches_reference == Some(true)) {
                diagnostics.reference_matches += 1;
            } else {
                diagnostics.reference_mismatches += 1;
            }
        }
        Ok(EventOutcome::Selected(rows))
    }

    /// Processes events in parallel. Events that fail with a recoverable
    /// error are logged and skipped; an invariant violation aborts the run.
    pub fn run(&self, events: &[EventRecord], progress: Option<&ProgressBar>) -> Result<Accumulator> {
        let events = match self.config.max_events {
            Some(n) if n < events.len() => &events[..n],
            _ => events,
        };
        info!(events = events.len(), "processing");
        let heartbeat = self.config.heartbeat as u64;
        let done = AtomicU64::new(0);
        let accumulator = events
            .par_iter()
            .try_fold(Accumulator::default, |mut acc, event| -> Result<Accumulator> {
                acc.diagnostics.processed += 1;
                // counters of a skipped event are discarded
                let mut local = Diagnostics::default();
                match self.process_event(event, &mut local) {
                    Ok(outcome) => {
                        match outcome {
                            EventOutcome::Selected(rows) => {
                                local.selected += 1;
                                acc.rows.extend(rows);
                            }
                            EventOutcome::NoCandidate => local.no_candidate += 1,
                        }
                        acc.diagnostics.merge(&local);
                    }
                    Err(e) if !e.is_fatal() => {
                        warn!(
                            run = event.id.run,
                            lumi = event.id.lumi,
                            event = event.id.event,
                            error = %e,
                            "skipping event"
                        );
                        acc.diagnostics.malformed += 1;
                    }
                    Err(e) => {
                        error!(
                            run = event.id.run,
                            lumi = event.id.lumi,
                            event = event.id.event,
                            error = %e,
                            "aborting run"
                        );
                        return Err(e);
                    }
                }
                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                if n % heartbeat == 0 {
                    info!(processed = n, total = events.len(), "progress");
                }
                if let Some(bar) = progress {
                    bar.inc(1);
                }
                Ok(acc)
            })
            .try_reduce(Accumulator::default, |a, b| Ok(a.merge(b)))?;
        Ok(accumulator)
    }
}
