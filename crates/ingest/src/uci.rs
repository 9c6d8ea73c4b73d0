//! Reader for the UCI "Individual household electric power consumption" file.
//!
//! The file is `;`-separated with a header row:
//!
//! ```text
//! Date;Time;Global_active_power;Global_reactive_power;Voltage;Global_intensity;Sub_metering_1;Sub_metering_2;Sub_metering_3
//! 16/12/2006;17:24:00;4.216;0.418;234.840;18.400;0.000;1.000;17.000
//! ```
//!
//! Missing measurements are written as `?`.

use std::fs::File;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::Deserialize;

use powerwatch_core::NewReading;

use crate::error::IngestError;

const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// One raw line of the file. Every field is kept as text; casting happens in
/// [`UciRecord::into_reading`] so a single bad cell never rejects the line.
#[derive(Debug, Clone, Deserialize)]
pub struct UciRecord {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Global_active_power")]
    pub global_active_power: String,
    #[serde(rename = "Global_reactive_power")]
    pub global_reactive_power: String,
    #[serde(rename = "Voltage")]
    pub voltage: String,
    #[serde(rename = "Global_intensity")]
    pub global_intensity: String,
    #[serde(rename = "Sub_metering_1")]
    pub sub_metering_1: String,
    #[serde(rename = "Sub_metering_2")]
    pub sub_metering_2: String,
    #[serde(rename = "Sub_metering_3")]
    pub sub_metering_3: String,
}

impl UciRecord {
    /// Lines whose timestamp does not parse are rejected; numeric cells that
    /// do not parse become NULL.
    pub fn into_reading(self) -> Result<NewReading, IngestError> {
        let ts = parse_timestamp(&self.date, &self.time)
            .ok_or_else(|| IngestError::InvalidTimestamp(format!("{} {}", self.date, self.time)))?;
        Ok(NewReading::from_features(
            ts,
            [
                parse_value(&self.global_active_power),
                parse_value(&self.global_reactive_power),
                parse_value(&self.voltage),
                parse_value(&self.global_intensity),
                parse_value(&self.sub_metering_1),
                parse_value(&self.sub_metering_2),
                parse_value(&self.sub_metering_3),
            ],
        ))
    }
}

/// `dd/mm/YYYY` + `HH:MM:SS`.
pub fn parse_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let joined = format!("{} {}", date.trim(), time.trim());
    NaiveDateTime::parse_from_str(&joined, TIMESTAMP_FORMAT).ok()
}

/// `?`, empty, unparsable and non-finite cells map to `None`.
pub fn parse_value(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "?" {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Open a UCI file and stream its lines as readings.
///
/// Malformed lines (wrong column count, bad timestamp) come through as `Err`
/// so the caller can count and skip them.
pub fn open_uci_file(
    path: &Path,
) -> Result<impl Iterator<Item = Result<NewReading, IngestError>>, IngestError> {
    let file = File::open(path)?;
    let reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(file);
    Ok(records(reader))
}

pub(crate) fn records<R: std::io::Read>(
    reader: csv::Reader<R>,
) -> impl Iterator<Item = Result<NewReading, IngestError>> {
    reader
        .into_deserialize::<UciRecord>()
        .map(|rec| rec.map_err(IngestError::from).and_then(UciRecord::into_reading))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};
    use std::io::Write;

    const HEADER: &str = "Date;Time;Global_active_power;Global_reactive_power;Voltage;Global_intensity;Sub_metering_1;Sub_metering_2;Sub_metering_3";

    #[test]
    fn values() {
        assert_eq!(parse_value("4.216"), Some(4.216));
        assert_eq!(parse_value(" 234.840 "), Some(234.84));
        assert_eq!(parse_value("?"), None);
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("abc"), None);
        assert_eq!(parse_value("NaN"), None);
    }

    #[test]
    fn timestamps_are_day_first() {
        let ts = parse_timestamp("16/12/2006", "17:24:00").unwrap();
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2006, 12, 16).unwrap());
        assert_eq!((ts.hour(), ts.minute()), (17, 24));

        assert!(parse_timestamp("2006-12-16", "17:24:00").is_none());
        assert!(parse_timestamp("31/02/2007", "00:00:00").is_none());
        assert!(parse_timestamp("16/12/2006", "?").is_none());
    }

    #[test]
    fn reads_file_and_flags_bad_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        writeln!(file, "16/12/2006;17:24:00;4.216;0.418;234.840;18.400;0.000;1.000;17.000").unwrap();
        writeln!(file, "21/12/2006;11:23:00;?;?;?;?;?;?;").unwrap();
        writeln!(file, "not-a-date;17:25:00;5.360;0.436;233.630;23.000;0.000;1.000;16.000").unwrap();
        writeln!(file, "16/12/2006;17:26:00;5.374").unwrap();
        file.flush().unwrap();

        let rows: Vec<_> = open_uci_file(file.path()).unwrap().collect();
        assert_eq!(rows.len(), 4);

        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.global_active_power_kw, Some(4.216));
        assert_eq!(first.sub_metering_3_wh, Some(17.0));

        let missing = rows[1].as_ref().unwrap();
        assert!(missing.features().iter().all(Option::is_none));

        assert!(matches!(rows[2], Err(IngestError::InvalidTimestamp(_))));
        assert!(matches!(rows[3], Err(IngestError::Csv(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = open_uci_file(Path::new("/nonexistent/household.txt")).err().unwrap();
        assert!(matches!(err, IngestError::Io(_)));
    }
}
