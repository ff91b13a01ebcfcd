use crate::{
    error::{CleanError, Result},
    signal::Series,
};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::io::{Read, Write};
use std::path::Path;

pub const LEFT_PUPIL: &str = "Left Pupil Dilation";
pub const RIGHT_PUPIL: &str = "Right Pupil Dilation";

/// Header written by the recorder for every `eye_data.csv`.
pub const EYE_DATA_HEADER: [&str; 6] = [
    "Participant ID",
    "Run ID",
    "Timestamp",
    LEFT_PUPIL,
    RIGHT_PUPIL,
    "Blink",
];

/// A resolved column of an [`EyeTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    pub column: usize,
}

/// Raw contents of one recording table.
///
/// Cells are kept as text so that everything except the cleaned channels is
/// written back exactly as read. Rows shorter or longer than the header (the
/// recorder's `Blink Count` trailer) are carried along but are not samples.
#[derive(Debug, Clone, PartialEq)]
pub struct EyeTable {
    pub headers: StringRecord,
    pub rows: Vec<StringRecord>,
}

impl EyeTable {
    pub fn read(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| CleanError::io(path, e))?;
        Self::from_reader(file).map_err(|e| CleanError::csv(path, e))
    }

    pub fn from_reader<R: Read>(reader: R) -> csv::Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = reader.headers()?.clone();
        let rows = reader.records().collect::<csv::Result<Vec<_>>>()?;
        Ok(Self { headers, rows })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path).map_err(|e| CleanError::io(path, e))?;
        self.to_writer(file).map_err(|e| CleanError::csv(path, e))
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut writer = WriterBuilder::new().flexible(true).from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn is_sample_row(&self, row: &StringRecord) -> bool {
        row.len() == self.headers.len()
    }

    pub fn sample_count(&self) -> usize {
        self.rows.iter().filter(|r| self.is_sample_row(r)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }

    /// Look up a column by name, ignoring ASCII case and surrounding whitespace.
    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
            .map(|column| Channel {
                name: name.to_string(),
                column,
            })
    }

    /// Values of a channel across all sample rows.
    pub fn series(&self, channel: &Channel) -> Series {
        Series::new(
            self.rows
                .iter()
                .filter(|r| self.is_sample_row(r))
                .map(|r| r.get(channel.column).and_then(parse_pupil_value))
                .collect(),
        )
    }

    /// Write a series back into the channel's cells, sample row by sample row.
    pub fn replace_series(&mut self, channel: &Channel, series: &Series) -> Result<()> {
        let expected = self.sample_count();
        if series.len() != expected {
            return Err(CleanError::LengthMismatch {
                expected,
                actual: series.len(),
            });
        }
        let width = self.headers.len();
        let mut values = series.values.iter();
        for row in self.rows.iter_mut().filter(|r| r.len() == width) {
            let value = values.next().copied().flatten();
            let cells: StringRecord = row
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    if i == channel.column {
                        format_pupil_value(value)
                    } else {
                        cell.to_string()
                    }
                })
                .collect();
            *row = cells;
        }
        Ok(())
    }
}

/// Parse a pupil cell. Blank cells, `nan`, `None` and `null` are missing, as
/// is anything that does not parse to a finite number.
pub fn parse_pupil_value(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty()
        || ["nan", "none", "null"]
            .iter()
            .any(|m| trimmed.eq_ignore_ascii_case(m))
    {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn format_pupil_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
