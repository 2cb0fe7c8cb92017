use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Sample, SyncError};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ErgHeader {
    pub description: Option<String>,
    pub file_name: Option<String>,
    pub ftp: Option<f64>,
    /// Every `KEY = VALUE` line of the header, keys upper-cased.
    pub fields: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ErgFile {
    pub header: ErgHeader,
    pub samples: Vec<Sample>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Outside,
    Header,
    Data,
}

/// Parse an ERG course file. Data lines are `minutes watts`; sample times
/// are returned in seconds. Lines that are not two numbers are skipped.
pub fn parse_erg(text: &str) -> Result<ErgFile, SyncError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut erg = ErgFile::default();
    let mut section = Section::Outside;
    let mut saw_data = false;

    for raw in text.lines() {
        let line = raw.trim();
        match line.to_ascii_uppercase().as_str() {
            "[COURSE HEADER]" => {
                section = Section::Header;
                continue;
            }
            "[END COURSE HEADER]" => {
                section = Section::Outside;
                continue;
            }
            "[COURSE DATA]" => {
                section = Section::Data;
                saw_data = true;
                continue;
            }
            "[END COURSE DATA]" => break,
            _ => {}
        }
        if line.is_empty() {
            continue;
        }
        match section {
            Section::Header => parse_header_line(line, &mut erg.header),
            Section::Data => {
                if let Some(sample) = parse_data_line(line) {
                    erg.samples.push(sample);
                }
            }
            Section::Outside => {}
        }
    }

    if !saw_data || erg.samples.is_empty() {
        return Err(SyncError::ErgParse("no power data found".into()));
    }
    debug!(
        "ERG parsed: {} samples, ftp {:?}",
        erg.samples.len(),
        erg.header.ftp
    );
    Ok(erg)
}

fn parse_header_line(line: &str, header: &mut ErgHeader) {
    let Some((key, value)) = line.split_once('=') else {
        return;
    };
    let key = key.trim().to_ascii_uppercase();
    let value = value.trim().to_string();
    match key.as_str() {
        "DESCRIPTION" => header.description = Some(value.clone()),
        "FILE NAME" => header.file_name = Some(value.clone()),
        "FTP" => header.ftp = value.parse::<f64>().ok().filter(|v| *v > 0.0),
        _ => {}
    }
    header.fields.insert(key, value);
}

fn parse_data_line(line: &str) -> Option<Sample> {
    let mut parts = line.split_whitespace();
    let minutes: f64 = parts.next()?.parse().ok()?;
    let watts: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(Sample::new(minutes * 60.0, watts))
}
