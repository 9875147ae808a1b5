use std::path::Path;

use anyhow::{Context, Result};
use ivspread_core::IvSample;
use ivspread_signals::SpreadRow;
use tracing::info;

/// Option samples loaded from disk, ordered by timestamp.
pub struct HistoricalIvProvider {
    samples: Vec<IvSample>,
}

impl HistoricalIvProvider {
    /// Reads a CSV with header
    /// `timestamp,call_iv,put_iv,call_delta,put_delta,underlying_price`.
    /// Timestamps are RFC 3339.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The CSV file cannot be opened
    /// - A record has the wrong number of fields
    /// - Timestamp or number parsing fails
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut samples = Vec::new();
        for (line, result) in reader.deserialize::<IvSample>().enumerate() {
            let sample =
                result.with_context(|| format!("Invalid sample on data row {}", line + 1))?;
            samples.push(sample);
        }

        // Stable sort keeps same-timestamp legs in file order.
        samples.sort_by_key(|s| s.timestamp);

        info!(path = %path.display(), samples = samples.len(), "Loaded option samples");
        Ok(Self { samples })
    }

    #[must_use]
    pub fn from_samples(mut samples: Vec<IvSample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self { samples }
    }

    #[must_use]
    pub fn samples(&self) -> &[IvSample] {
        &self.samples
    }

    #[must_use]
    pub fn into_samples(self) -> Vec<IvSample> {
        self.samples
    }
}

/// Writes option samples in the format [`HistoricalIvProvider::from_csv`] reads.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_samples_csv(path: impl AsRef<Path>, samples: &[IvSample]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for sample in samples {
        writer.serialize(sample)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the full row table, one line per timestamp. Undefined statistics
/// are written as empty fields.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_rows_csv(path: impl AsRef<Path>, rows: &[SpreadRow]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "Wrote spread rows");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_and_orders_samples() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "timestamp,call_iv,put_iv,call_delta,put_delta,underlying_price\n\
             2025-01-02T14:31:00Z,0.21,0.26,0.25,-0.25,231.5\n\
             2025-01-02T14:30:00Z,0.20,0.27,0.24,-0.26,231.0"
        )
        .unwrap();

        let provider = HistoricalIvProvider::from_csv(file.path()).unwrap();
        let samples = provider.samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].underlying_price, 231.0);
        assert_eq!(samples[1].put_iv, 0.26);
        assert!(samples[0].timestamp < samples[1].timestamp);
    }

    #[test]
    fn malformed_row_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "timestamp,call_iv,put_iv,call_delta,put_delta,underlying_price\n\
             2025-01-02T14:30:00Z,abc,0.27,0.24,-0.26,231.0"
        )
        .unwrap();

        let err = HistoricalIvProvider::from_csv(file.path()).err().unwrap();
        assert!(err.to_string().contains("data row 1"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(HistoricalIvProvider::from_csv("/nonexistent/samples.csv").is_err());
    }

    #[test]
    fn rows_csv_leaves_undefined_statistics_empty() {
        use chrono::{TimeZone, Utc};
        use ivspread_core::{SpreadSeed, StrategyParameters};
        use ivspread_signals::SpreadMetricsEngine;

        let seeds = vec![SpreadSeed {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 2, 14, 30, 0).unwrap(),
            put25_iv: 0.2625,
            call25_iv: 0.2090,
            underlying: 232.04,
        }];
        let rows = SpreadMetricsEngine::new(StrategyParameters::default()).compute(&seeds);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        write_rows_csv(&path, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("timestamp,put25_iv,call25_iv,underlying,spread_iv"));
        let first = lines.next().unwrap();
        assert!(first.starts_with("2025-01-02T14:30:00Z,"));
        assert!(first.contains(",,"));
        assert!(lines.next().is_none());
    }
}
