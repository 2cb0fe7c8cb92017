use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};

use crate::SyncError;

/// One planned step of a Zwift workout. Power is a fraction of FTP.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ZwoStep {
    pub kind: String,
    pub duration_s: f64,
    pub power_low: f64,
    pub power_high: f64,
}

impl ZwoStep {
    pub fn is_steady(&self) -> bool {
        (self.power_high - self.power_low).abs() < 1e-9
    }

    pub fn average_fraction(&self) -> f64 {
        (self.power_low + self.power_high) / 2.0
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ZwoWorkout {
    pub name: Option<String>,
    pub ftp_override: Option<f64>,
    pub steps: Vec<ZwoStep>,
}

/// Parse a `.zwo` workout, expanding `IntervalsT` blocks into on/off steps.
pub fn parse_zwo(text: &str) -> Result<ZwoWorkout, SyncError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut workout = ZwoWorkout::default();
    let mut path: Vec<String> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SyncError::ZwoParse(e.to_string()))?;
        match event {
            Event::Start(e) => {
                if parent_is(&path, "workout") {
                    push_steps(&e, &mut workout.steps)?;
                }
                path.push(local_name(&e));
            }
            Event::Empty(e) => {
                if parent_is(&path, "workout") {
                    push_steps(&e, &mut workout.steps)?;
                }
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| SyncError::ZwoParse(e.to_string()))?
                    .trim()
                    .to_string();
                if path.len() != 2 {
                    continue;
                }
                match path[1].as_str() {
                    "ftpOverride" => {
                        workout.ftp_override = text.parse::<f64>().ok().filter(|v| *v > 0.0);
                    }
                    "name" => workout.name = Some(text),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(workout)
}

fn push_steps(e: &BytesStart<'_>, steps: &mut Vec<ZwoStep>) -> Result<(), SyncError> {
    let kind = local_name(e);
    match kind.as_str() {
        "SteadyState" | "FreeRide" | "Freeride" => {
            let power = attr_f64(e, "Power")?.unwrap_or(0.0);
            steps.push(ZwoStep {
                duration_s: required(e, &kind, "Duration")?,
                power_low: power,
                power_high: power,
                kind,
            });
        }
        "Warmup" | "Cooldown" | "Ramp" => {
            let low = required(e, &kind, "PowerLow")?;
            let high = required(e, &kind, "PowerHigh")?;
            steps.push(ZwoStep {
                duration_s: required(e, &kind, "Duration")?,
                power_low: low,
                power_high: high,
                kind,
            });
        }
        "IntervalsT" => {
            let repeat = attr_f64(e, "Repeat")?.unwrap_or(1.0).max(0.0) as usize;
            let on_s = required(e, &kind, "OnDuration")?;
            let off_s = required(e, &kind, "OffDuration")?;
            let on_power = required(e, &kind, "OnPower")?;
            let off_power = required(e, &kind, "OffPower")?;
            for _ in 0..repeat {
                steps.push(ZwoStep {
                    kind: "IntervalsT.On".into(),
                    duration_s: on_s,
                    power_low: on_power,
                    power_high: on_power,
                });
                steps.push(ZwoStep {
                    kind: "IntervalsT.Off".into(),
                    duration_s: off_s,
                    power_low: off_power,
                    power_high: off_power,
                });
            }
        }
        // textevent and other decorations carry no timing.
        _ => {}
    }
    Ok(())
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn parent_is(path: &[String], name: &str) -> bool {
    path.last().is_some_and(|p| p == name)
}

fn attr_f64(e: &BytesStart<'_>, key: &str) -> Result<Option<f64>, SyncError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| SyncError::ZwoParse(err.to_string()))?;
        if attr.key.local_name().as_ref() != key.as_bytes() {
            continue;
        }
        let raw = attr
            .unescape_value()
            .map_err(|err| SyncError::ZwoParse(err.to_string()))?;
        let value = raw.trim().parse::<f64>().map_err(|_| {
            SyncError::ZwoParse(format!("attribute {}='{}' is not a number", key, raw))
        })?;
        return Ok(Some(value));
    }
    Ok(None)
}

fn required(e: &BytesStart<'_>, kind: &str, key: &str) -> Result<f64, SyncError> {
    attr_f64(e, key)?
        .ok_or_else(|| SyncError::ZwoParse(format!("<{}> is missing {}", kind, key)))
}
