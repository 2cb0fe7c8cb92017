use serde::{Deserialize, Serialize};

use crate::SyncError;

/// Training zone derived from a power value's ratio to FTP.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Zone {
    Recovery,
    Endurance,
    Tempo,
    Threshold,
    Vo2Max,
    Neuromuscular,
    Unknown,
}

// Exclusive upper bounds in percent of the reference, ascending.
const ZONE_BOUNDS: [(f64, Zone); 5] = [
    (56.0, Zone::Recovery),
    (76.0, Zone::Endurance),
    (90.0, Zone::Tempo),
    (105.0, Zone::Threshold),
    (120.0, Zone::Vo2Max),
];

impl Zone {
    pub fn label(&self) -> &'static str {
        match self {
            Zone::Recovery => "Recovery",
            Zone::Endurance => "Endurance",
            Zone::Tempo => "Tempo",
            Zone::Threshold => "Threshold",
            Zone::Vo2Max => "VO2 Max",
            Zone::Neuromuscular => "Neuromuscular",
            Zone::Unknown => "Unknown",
        }
    }

    /// Hex colour used by the PB Intervals app for this zone.
    pub fn color_hex(&self) -> &'static str {
        match self {
            Zone::Recovery => "#00BFFF",
            Zone::Endurance => "#00FF00",
            Zone::Tempo => "#FFFF00",
            Zone::Threshold => "#FFA500",
            Zone::Vo2Max => "#FF4500",
            Zone::Neuromuscular => "#FF0000",
            Zone::Unknown => "#808080",
        }
    }

    pub fn rgb(&self) -> (u8, u8, u8) {
        let hex = &self.color_hex()[1..];
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0x80);
        (channel(0), channel(2), channel(4))
    }
}

pub(crate) fn validate_reference(reference: f64) -> Result<(), SyncError> {
    if reference.is_finite() && reference > 0.0 {
        Ok(())
    } else {
        Err(SyncError::InvalidReference(reference))
    }
}

/// Map an average value to its zone. A value on a bin boundary belongs to
/// the higher bin; an absent value is `Unknown`.
pub fn classify(average_value: Option<f64>, reference: f64) -> Result<Zone, SyncError> {
    validate_reference(reference)?;
    let Some(value) = average_value else {
        return Ok(Zone::Unknown);
    };
    let ratio = value / reference * 100.0;
    let zone = ZONE_BOUNDS
        .iter()
        .find(|(upper, _)| ratio < *upper)
        .map(|(_, zone)| *zone)
        .unwrap_or(Zone::Neuromuscular);
    Ok(zone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bins_follow_percent_of_reference() {
        let ftp = 200.0;
        assert_eq!(classify(Some(100.0), ftp).unwrap(), Zone::Recovery);
        assert_eq!(classify(Some(140.0), ftp).unwrap(), Zone::Endurance);
        assert_eq!(classify(Some(170.0), ftp).unwrap(), Zone::Tempo);
        assert_eq!(classify(Some(200.0), ftp).unwrap(), Zone::Threshold);
        assert_eq!(classify(Some(230.0), ftp).unwrap(), Zone::Vo2Max);
        assert_eq!(classify(Some(400.0), ftp).unwrap(), Zone::Neuromuscular);
    }

    #[test]
    fn boundary_value_goes_to_higher_bin() {
        assert_eq!(classify(Some(56.0), 100.0).unwrap(), Zone::Endurance);
        assert_eq!(classify(Some(76.0), 100.0).unwrap(), Zone::Tempo);
        assert_eq!(classify(Some(90.0), 100.0).unwrap(), Zone::Threshold);
        assert_eq!(classify(Some(105.0), 100.0).unwrap(), Zone::Vo2Max);
        assert_eq!(classify(Some(120.0), 100.0).unwrap(), Zone::Neuromuscular);
        assert_eq!(classify(Some(55.99), 100.0).unwrap(), Zone::Recovery);
    }

    #[test]
    fn missing_value_is_unknown() {
        assert_eq!(classify(None, 277.0).unwrap(), Zone::Unknown);
        assert_eq!(Zone::Unknown.color_hex(), "#808080");
    }

    #[test]
    fn non_positive_reference_fails() {
        assert_eq!(
            classify(Some(100.0), 0.0),
            Err(SyncError::InvalidReference(0.0))
        );
        assert!(classify(Some(100.0), -5.0).is_err());
        assert!(classify(None, f64::NAN).is_err());
    }

    #[test]
    fn rgb_decodes_hex_colour() {
        assert_eq!(Zone::Threshold.rgb(), (0xFF, 0xA5, 0x00));
        assert_eq!(Zone::Recovery.rgb(), (0x00, 0xBF, 0xFF));
    }
}
