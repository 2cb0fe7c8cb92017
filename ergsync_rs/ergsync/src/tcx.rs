use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Segment, SyncError};

const DEFAULT_WORKOUT_NAME: &str = "Imported Workout";
const DEFAULT_STEP_NAME: &str = "Interval";
const DEFAULT_STEP_SECONDS: f64 = 60.0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Workout {
    pub name: String,
    pub segments: Vec<Segment>,
}

#[derive(Default)]
struct StepBuilder {
    depth: usize,
    name: Option<String>,
    seconds: Option<f64>,
}

impl StepBuilder {
    fn finish(self) -> Segment {
        Segment::new(
            self.name.unwrap_or_else(|| DEFAULT_STEP_NAME.to_string()),
            self.seconds.unwrap_or(DEFAULT_STEP_SECONDS),
        )
    }
}

/// Parse the planned workout of a TCX file into named segments.
///
/// Only `Step` elements directly under `Workout` are read. A step's name is
/// its own `Name` child; its duration is the first `Seconds` found anywhere
/// inside it.
pub fn parse_tcx(text: &str) -> Result<Workout, SyncError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut workout_name: Option<String> = None;
    let mut step: Option<StepBuilder> = None;
    let mut segments = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            SyncError::TcxParse(format!("at byte {}: {}", reader.buffer_position(), e))
        })?;
        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "Step" && step.is_none() && parent_is(&path, "Workout") {
                    step = Some(StepBuilder {
                        depth: path.len(),
                        ..StepBuilder::default()
                    });
                }
                path.push(name);
            }
            Event::End(_) => {
                path.pop();
                if step.as_ref().is_some_and(|s| s.depth == path.len()) {
                    if let Some(done) = step.take() {
                        segments.push(done.finish());
                    }
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "Step" && step.is_none() && parent_is(&path, "Workout") {
                    segments.push(StepBuilder::default().finish());
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| SyncError::TcxParse(e.to_string()))?
                    .trim()
                    .to_string();
                let Some(current) = path.last().map(String::as_str) else {
                    continue;
                };
                match (step.as_mut(), current) {
                    (Some(builder), "Name") if path.len() == builder.depth + 2 => {
                        builder.name = Some(text);
                    }
                    (Some(builder), "Seconds") if builder.seconds.is_none() => {
                        let seconds: f64 = text.parse().map_err(|_| {
                            SyncError::TcxParse(format!("invalid step duration '{}'", text))
                        })?;
                        builder.seconds = Some(seconds);
                    }
                    (None, "Name") if workout_name.is_none() && parent_is(&path[..path.len() - 1], "Workout") => {
                        workout_name = Some(text);
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !path.is_empty() {
        return Err(SyncError::TcxParse(format!(
            "unexpected end of document inside <{}>",
            path.join("/")
        )));
    }

    let workout = Workout {
        name: workout_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_WORKOUT_NAME.to_string()),
        segments,
    };
    debug!(
        "TCX parsed: '{}' with {} steps",
        workout.name,
        workout.segments.len()
    );
    Ok(workout)
}

fn parent_is(path: &[String], name: &str) -> bool {
    path.last().is_some_and(|p| p == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <Workouts>
    <Workout Sport="Biking">
      <Name>VIRTUAL - Ellis</Name>
      <Step xsi:type="Step_t">
        <StepId>1</StepId>
        <Name>Warmup</Name>
        <Duration xsi:type="Time_t"><Seconds>600</Seconds></Duration>
        <Intensity>Active</Intensity>
      </Step>
      <Step xsi:type="Step_t">
        <StepId>2</StepId>
        <Duration xsi:type="Time_t"><Seconds>300</Seconds></Duration>
        <Target xsi:type="None_t"/>
      </Step>
      <Step xsi:type="Step_t">
        <StepId>3</StepId>
        <Name>Cool &amp; easy</Name>
      </Step>
    </Workout>
  </Workouts>
</TrainingCenterDatabase>"#;

    #[test]
    fn reads_names_durations_and_defaults() {
        let workout = parse_tcx(TCX).unwrap();
        assert_eq!(workout.name, "VIRTUAL - Ellis");
        assert_eq!(
            workout.segments,
            vec![
                Segment::new("Warmup", 600.0),
                Segment::new("Interval", 300.0),
                Segment::new("Cool & easy", 60.0),
            ]
        );
    }

    #[test]
    fn missing_workout_name_uses_default() {
        let text = "<TrainingCenterDatabase><Workouts><Workout>\
            <Step><Duration><Seconds>90</Seconds></Duration></Step>\
            </Workout></Workouts></TrainingCenterDatabase>";
        let workout = parse_tcx(text).unwrap();
        assert_eq!(workout.name, "Imported Workout");
        assert_eq!(workout.segments, vec![Segment::new("Interval", 90.0)]);
    }

    #[test]
    fn bad_seconds_is_an_error() {
        let text = "<Workout><Step><Duration><Seconds>ten</Seconds></Duration></Step></Workout>";
        assert!(matches!(parse_tcx(text), Err(SyncError::TcxParse(_))));
    }

    #[test]
    fn truncated_document_is_an_error() {
        assert!(parse_tcx("<Workout><Step><Name>x</Name>").is_err());
    }
}
