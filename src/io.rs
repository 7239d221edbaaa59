//! Tab-separated event input, row output and summary tables.

use std::path::Path;

use polars::prelude::*;

use crate::error::{Error, Result};
use crate::event::{EventId, EventRecord, OutputRow};
use crate::lepton::PtEtaPhiM;

pub const EVENT_COLUMNS: [&str; 15] = [
    "run", "lumi", "event", "weight", "pt", "eta", "phi", "mass", "pt_fsr", "eta_fsr", "phi_fsr",
    "mass_fsr", "pdg_id", "tight_id", "rel_iso",
];

pub fn read_tsv<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    Ok(CsvReadOptions::default()
        .with_parse_options(CsvParseOptions::default().with_separator(b'\t'))
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
        .finish()?)
}

pub fn write_tsv<P: AsRef<Path>>(path: P, df: &mut DataFrame) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path.as_ref())?;
    CsvWriter::new(file).with_separator(b'\t').finish(df)?;
    Ok(())
}

fn non_null<T>(name: &str, values: impl Iterator<Item = Option<T>>) -> Result<Vec<T>> {
    values
        .enumerate()
        .map(|(row, v)| v.ok_or_else(|| Error::MalformedInput(format!("null '{name}' in row {row}"))))
        .collect()
}

fn column_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let s = df.column(name)?.cast(&DataType::Float64)?;
    non_null(name, s.f64()?.into_iter())
}

fn column_u64(df: &DataFrame, name: &str) -> Result<Vec<u64>> {
    let s = df.column(name)?.cast(&DataType::UInt64)?;
    non_null(name, s.u64()?.into_iter())
}

fn column_i32(df: &DataFrame, name: &str) -> Result<Vec<i32>> {
    let s = df.column(name)?.cast(&DataType::Int32)?;
    non_null(name, s.i32()?.into_iter())
}

fn column_bool(df: &DataFrame, name: &str) -> Result<Vec<bool>> {
    let s = df.column(name)?.cast(&DataType::Boolean)?;
    non_null(name, s.bool()?.into_iter())
}

fn parse_quartet(text: &str) -> Result<[usize; 4]> {
    let indices = text
        .split(',')
        .map(|t| {
            t.trim()
                .parse::<usize>()
                .map_err(|e| Error::MalformedInput(format!("reference quartet '{text}': {e}")))
        })
        .collect::<Result<Vec<usize>>>()?;
    indices
        .try_into()
        .map_err(|_| Error::MalformedInput(format!("reference quartet '{text}' needs four indices")))
}

fn format_quartet(indices: &[usize; 4]) -> String {
    indices.map(|i| i.to_string()).join(",")
}

/// Groups one-row-per-lepton data into events: consecutive rows sharing
/// (run, lumi, event) belong to the same event, in row order. The event
/// weight and reference quartet are taken from the event's first row.
pub fn events_from_frame(df: &DataFrame) -> Result<Vec<EventRecord>> {
    for name in EVENT_COLUMNS {
        if df.column(name).is_err() {
            return Err(Error::MalformedInput(format!("missing column '{name}'")));
        }
    }
    let run = column_u64(df, "run")?;
    let lumi = column_u64(df, "lumi")?;
    let event = column_u64(df, "event")?;
    let weight = column_f64(df, "weight")?;
    let [pt, eta, phi, mass, pt_fsr, eta_fsr, phi_fsr, mass_fsr, rel_iso] = [
        "pt", "eta", "phi", "mass", "pt_fsr", "eta_fsr", "phi_fsr", "mass_fsr", "rel_iso",
    ]
    .map(|name| column_f64(df, name));
    let (pt, eta, phi, mass) = (pt?, eta?, phi?, mass?);
    let (pt_fsr, eta_fsr, phi_fsr, mass_fsr, rel_iso) = (pt_fsr?, eta_fsr?, phi_fsr?, mass_fsr?, rel_iso?);
    let pdg_id = column_i32(df, "pdg_id")?;
    let tight_id = column_bool(df, "tight_id")?;
    let reference: Option<Vec<Option<String>>> = match df.column("ref_quartet") {
        Ok(column) => {
            let s = column.cast(&DataType::String)?;
            let values = s.str()?.into_iter().map(|v| v.map(str::to_owned)).collect();
            Some(values)
        }
        Err(_) => None,
    };

    let mut events: Vec<EventRecord> = Vec::new();
    for row in 0..df.height() {
        let id = EventId::new(run[row], lumi[row], event[row]);
        if events.last().map(|e| e.id) != Some(id) {
            let mut record = EventRecord::new(id, weight[row]);
            if let Some(Some(text)) = reference.as_ref().map(|r| r[row].as_deref()) {
                if !text.trim().is_empty() {
                    record.reference_quartet = Some(parse_quartet(text)?);
                }
            }
            events.push(record);
        }
        if let Some(record) = events.last_mut() {
            record.leptons.push(
                PtEtaPhiM::new(pt[row], eta[row], phi[row], mass[row]),
                PtEtaPhiM::new(pt_fsr[row], eta_fsr[row], phi_fsr[row], mass_fsr[row]),
                pdg_id[row],
                tight_id[row],
                rel_iso[row],
            );
        }
    }
    Ok(events)
}

pub fn read_events<P: AsRef<Path>>(path: P) -> Result<Vec<EventRecord>> {
    events_from_frame(&read_tsv(path)?)
}

/// One row per lepton, the layout [`events_from_frame`] reads back.
pub fn events_to_frame(events: &[EventRecord]) -> Result<DataFrame> {
    let mut columns: [Vec<f64>; 9] = Default::default();
    let (mut run, mut lumi, mut event, mut weight) = (vec![], vec![], vec![], vec![]);
    let (mut pdg_id, mut tight_id, mut reference) = (vec![], vec![], vec![]);
    for record in events {
        let leptons = &record.leptons;
        let n = leptons.len()?;
        run.extend(std::iter::repeat(record.id.run).take(n));
        lumi.extend(std::iter::repeat(record.id.lumi).take(n));
        event.extend(std::iter::repeat(record.id.event).take(n));
        weight.extend(std::iter::repeat(record.base_weight).take(n));
        let reference_text = record.reference_quartet.as_ref().map(format_quartet);
        reference.extend(std::iter::repeat(reference_text).take(n));
        for (column, values) in columns.iter_mut().zip([
            &leptons.pt,
            &leptons.eta,
            &leptons.phi,
            &leptons.mass,
            &leptons.pt_fsr,
            &leptons.eta_fsr,
            &leptons.phi_fsr,
            &leptons.mass_fsr,
            &leptons.rel_iso,
        ]) {
            column.extend_from_slice(values);
        }
        pdg_id.extend_from_slice(&leptons.pdg_id);
        tight_id.extend_from_slice(&leptons.tight_id);
    }
    let [pt, eta, phi, mass, pt_fsr, eta_fsr, phi_fsr, mass_fsr, rel_iso] = columns;
    let mut df = df!(
        "run" => run,
        "lumi" => lumi,
        "event" => event,
        "weight" => weight,
        "pt" => pt,
        "eta" => eta,
        "phi" => phi,
        "mass" => mass,
        "pt_fsr" => pt_fsr,
        "eta_fsr" => eta_fsr,
        "phi_fsr" => phi_fsr,
        "mass_fsr" => mass_fsr,
        "pdg_id" => pdg_id,
        "tight_id" => tight_id,
        "rel_iso" => rel_iso
    )?;
    if reference.iter().any(Option::is_some) {
        df.with_column(Series::new("ref_quartet", reference))?;
    }
    Ok(df)
}

pub fn write_events<P: AsRef<Path>>(path: P, events: &[EventRecord]) -> Result<()> {
    write_tsv(path, &mut events_to_frame(events)?)
}

pub fn rows_to_frame(rows: &[OutputRow]) -> Result<DataFrame> {
    let f = |get: fn(&OutputRow) -> f64| rows.iter().map(get).collect::<Vec<f64>>();
    let contrib = |get: fn(&OutputRow) -> Option<f64>| rows.iter().map(get).collect::<Vec<Option<f64>>>();
    Ok(df!(
        "run" => rows.iter().map(|r| r.id.run).collect::<Vec<u64>>(),
        "lumi" => rows.iter().map(|r| r.id.lumi).collect::<Vec<u64>>(),
        "event" => rows.iter().map(|r| r.id.event).collect::<Vec<u64>>(),
        "region" => rows.iter().map(|r| r.region.label()).collect::<Vec<&str>>(),
        "composition" => rows.iter().map(|r| r.composition.label()).collect::<Vec<&str>>(),
        "m4l" => f(|r| r.m4l),
        "z1_mass" => f(|r| r.z1_mass),
        "z2_mass" => f(|r| r.z2_mass),
        "weight" => f(|r| r.weight.nominal),
        "weight_down" => f(|r| r.weight.down),
        "weight_up" => f(|r| r.weight.up),
        "contrib_3p1f" => contrib(|r| r.contribution_to_3p1f.map(|c| c.nominal)),
        "contrib_3p1f_down" => contrib(|r| r.contribution_to_3p1f.map(|c| c.down)),
        "contrib_3p1f_up" => contrib(|r| r.contribution_to_3p1f.map(|c| c.up)),
        "lepton_indices" => rows.iter().map(|r| format_quartet(&r.lepton_indices)).collect::<Vec<String>>(),
        "matches_reference" => rows.iter().map(|r| r.matches_reference).collect::<Vec<Option<bool>>>()
    )?)
}

pub fn write_rows<P: AsRef<Path>>(path: P, rows: &[OutputRow]) -> Result<()> {
    write_tsv(path, &mut rows_to_frame(rows)?)
}

/// Yields per (region, composition) of an output table, in order of first
/// appearance.
pub fn summarize_frame(df: DataFrame) -> Result<DataFrame> {
    let weights = [
        "weight",
        "weight_down",
        "weight_up",
        "contrib_3p1f",
        "contrib_3p1f_down",
        "contrib_3p1f_up",
    ];
    Ok(df
        .lazy()
        .with_columns(weights.map(|name| col(name).cast(DataType::Float64)))
        .group_by_stable([col("region"), col("composition")])
        .agg([
            col("weight").count().alias("rows"),
            col("weight").sum().alias("yield"),
            col("weight_down").sum().alias("yield_down"),
            col("weight_up").sum().alias("yield_up"),
            col("contrib_3p1f").sum().alias("contrib_3p1f"),
            col("contrib_3p1f_down").sum().alias("contrib_3p1f_down"),
            col("contrib_3p1f_up").sum().alias("contrib_3p1f_up"),
        ])
        .collect()?)
}

pub fn summarize(rows: &[OutputRow]) -> Result<DataFrame> {
    summarize_frame(rows_to_frame(rows)?)
}
