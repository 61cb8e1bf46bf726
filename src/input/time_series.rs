//! Code for reading time series tables and aligning them with the time index.
use super::{input_err_msg, parse_data_timestamp};
use crate::error::DispatchError;
use crate::time::TimeIndex;
use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use std::path::Path;

/// Name of the first column of every time series table
const TIMESTAMP_COLUMN: &str = "timestamp";

/// Named profiles aligned with a time index
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesTable {
    columns: IndexMap<String, Vec<f64>>,
}

impl TimeSeriesTable {
    /// Get the profile with the given name.
    ///
    /// Fails with a [`DispatchError::MissingInput`] if there is no such column.
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        match self.columns.get(name) {
            Some(values) => Ok(values),
            None => bail!(DispatchError::MissingInput(format!(
                "Column {name} not found"
            ))),
        }
    }

    /// Iterate over column names
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

/// Read a time series table which must exist
pub fn read_time_series(file_path: &Path, time_index: &TimeIndex) -> Result<TimeSeriesTable> {
    if !file_path.is_file() {
        bail!(DispatchError::MissingInput(format!(
            "Required file {} not found",
            file_path.display()
        )));
    }

    read_time_series_internal(file_path, time_index).with_context(|| input_err_msg(file_path))
}

/// Read a time series table, returning `None` if the file doesn't exist
pub fn read_time_series_optional(
    file_path: &Path,
    time_index: &TimeIndex,
) -> Result<Option<TimeSeriesTable>> {
    if !file_path.exists() {
        return Ok(None);
    }

    read_time_series(file_path, time_index).map(Some)
}

fn read_time_series_internal(file_path: &Path, time_index: &TimeIndex) -> Result<TimeSeriesTable> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(file_path)?;
    let headers = reader.headers()?.clone();
    if headers.get(0) != Some(TIMESTAMP_COLUMN) {
        bail!(DispatchError::MissingInput(format!(
            "First column must be called '{TIMESTAMP_COLUMN}'"
        )));
    }

    read_aligned_records(
        headers.iter().skip(1).map(String::from).collect(),
        reader.records().map(|record| record.map_err(anyhow::Error::from)),
        time_index,
    )
}

/// Align raw records with the time index.
///
/// Rows before the start of the index are skipped. From the first time step onwards, rows must
/// match the index exactly, one per time step. Rows after the end of the index are ignored.
fn read_aligned_records<I>(
    names: Vec<String>,
    records: I,
    time_index: &TimeIndex,
) -> Result<TimeSeriesTable>
where
    I: Iterator<Item = Result<csv::StringRecord>>,
{
    let mut values: Vec<Vec<f64>> = vec![Vec::with_capacity(time_index.len()); names.len()];
    let expected = time_index.as_slice();
    let mut pos = 0;
    for record in records {
        if pos == expected.len() {
            break;
        }

        let record = record?;
        let timestamp = parse_data_timestamp(record.get(0).unwrap_or_default())?;
        if pos == 0 && timestamp < expected[0] {
            continue;
        }
        if timestamp != expected[pos] {
            bail!(DispatchError::DataAlignment(format!(
                "Expected a row for {} but found {timestamp}",
                expected[pos]
            )));
        }

        for (i, column) in values.iter_mut().enumerate() {
            let raw = record.get(i + 1).unwrap_or_default();
            let value: f64 = raw.parse().map_err(|_| {
                DispatchError::InvalidValue(format!(
                    "Invalid number '{raw}' in column {} at {timestamp}",
                    names[i]
                ))
            })?;
            if !value.is_finite() {
                bail!(DispatchError::InvalidValue(format!(
                    "Non-finite value in column {} at {timestamp}",
                    names[i]
                )));
            }
            column.push(value);
        }
        pos += 1;
    }

    if pos < expected.len() {
        bail!(DispatchError::DataAlignment(format!(
            "Time series covers {pos} of {} time steps starting at {}",
            expected.len(),
            expected[0]
        )));
    }

    Ok(TimeSeriesTable {
        columns: names.into_iter().zip(values).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, time_index};
    use rstest::rstest;
    use std::fs;
    use tempfile::tempdir;

    fn write_series(dir: &Path, contents: &str) -> std::path::PathBuf {
        let file_path = dir.join("series_ts.csv");
        fs::write(&file_path, contents).unwrap();
        file_path
    }

    #[rstest]
    fn read_time_series_skips_leading_rows(time_index: TimeIndex) {
        // The fixture index covers 2017-01-01 00:00 to 02:00
        let dir = tempdir().unwrap();
        let file_path = write_series(
            dir.path(),
            "timestamp,a,b\n\
            2016-12-31 23:00:00,9,9\n\
            2017-01-01 00:00:00,0.1,1\n\
            2017-01-01 01:00:00,0.2,2\n\
            2017-01-01 02:00:00,0.3,3\n\
            2017-01-01 03:00:00,0.4,4\n",
        );
        let table = read_time_series(&file_path, &time_index).unwrap();
        assert_eq!(table.column("a").unwrap(), [0.1, 0.2, 0.3]);
        assert_eq!(table.column("b").unwrap(), [1.0, 2.0, 3.0]);
        assert_eq!(table.column_names().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[rstest]
    #[case(
        "timestamp,a\n2017-01-01 00:00:00,1\n2017-01-01 01:00:00,1\n",
        "Data alignment error: Time series covers 2 of 3 time steps starting at 2017-01-01 00:00:00"
    )]
    #[case(
        "timestamp,a\n2017-01-01 00:00:00,1\n2017-01-01 02:00:00,1\n2017-01-01 03:00:00,1\n",
        "Data alignment error: Expected a row for 2017-01-01 01:00:00 but found 2017-01-01 02:00:00"
    )]
    #[case(
        "timestamp,a\n2017-01-01 01:00:00,1\n2017-01-01 02:00:00,1\n2017-01-01 03:00:00,1\n",
        "Data alignment error: Expected a row for 2017-01-01 00:00:00 but found 2017-01-01 01:00:00"
    )]
    fn read_time_series_misaligned(
        time_index: TimeIndex,
        #[case] contents: &str,
        #[case] msg: &str,
    ) {
        let dir = tempdir().unwrap();
        let file_path = write_series(dir.path(), contents);
        let err = read_time_series(&file_path, &time_index).unwrap_err();
        assert_eq!(DispatchError::find_in(&err).unwrap().to_string(), msg);
    }

    #[rstest]
    fn read_time_series_missing_column(time_index: TimeIndex) {
        let dir = tempdir().unwrap();
        let file_path = write_series(
            dir.path(),
            "timestamp,a\n2017-01-01 00:00:00,1\n2017-01-01 01:00:00,1\n2017-01-01 02:00:00,1\n",
        );
        let table = read_time_series(&file_path, &time_index).unwrap();
        assert_error!(table.column("b"), "Missing input: Column b not found");
    }

    #[rstest]
    fn read_time_series_bad_header(time_index: TimeIndex) {
        let dir = tempdir().unwrap();
        let file_path = write_series(dir.path(), "time,a\n2017-01-01 00:00:00,1\n");
        let err = read_time_series(&file_path, &time_index).unwrap_err();
        assert!(matches!(
            DispatchError::find_in(&err),
            Some(DispatchError::MissingInput(_))
        ));
    }

    #[rstest]
    fn read_time_series_optional_absent(time_index: TimeIndex) {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("absent_ts.csv");
        assert!(
            read_time_series_optional(&file_path, &time_index)
                .unwrap()
                .is_none()
        );
        assert!(read_time_series(&file_path, &time_index).is_err());
    }
}
