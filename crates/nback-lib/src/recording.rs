//! Eye-tracking recording sessions.
//!
//! A [`RecordingSession`] owns the per-run state (participant, run label,
//! blink tracking) and forwards each gaze sample to an injected
//! [`SampleSink`]. The tracker integration itself lives outside this crate:
//! it only has to turn its callbacks into [`GazeSample`]s.

use crate::{
    error::{CleanError, Result},
    io::eye::{format_pupil_value, EYE_DATA_HEADER},
};
use csv::WriterBuilder;
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Label written in the timestamp column of the trailer row.
pub const BLINK_COUNT_LABEL: &str = "Blink Count";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    pub timestamp: f64,
    pub left: Option<f64>,
    pub right: Option<f64>,
    pub left_valid: bool,
    pub right_valid: bool,
}

impl GazeSample {
    /// Either eye reported invalid data.
    pub fn is_blink(&self) -> bool {
        !self.left_valid || !self.right_valid
    }
}

/// One sample as handed to a sink, tagged with its session.
#[derive(Debug, Clone, Copy)]
pub struct RecordedSample<'a> {
    pub participant: &'a str,
    pub run: &'a str,
    pub sample: &'a GazeSample,
    pub blink: bool,
}

/// Destination for recorded samples.
pub trait SampleSink {
    fn write_sample(&mut self, row: &RecordedSample<'_>) -> Result<()>;

    /// Called once when the session closes.
    fn finish(&mut self, participant: &str, run: &str, blink_count: usize) -> Result<()>;
}

impl<S: SampleSink + ?Sized> SampleSink for &mut S {
    fn write_sample(&mut self, row: &RecordedSample<'_>) -> Result<()> {
        (**self).write_sample(row)
    }

    fn finish(&mut self, participant: &str, run: &str, blink_count: usize) -> Result<()> {
        (**self).finish(participant, run, blink_count)
    }
}

/// Writes `eye_data.csv` rows followed by a `Blink Count` trailer.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    path: PathBuf,
}

impl CsvSink<File> {
    /// Append to `path`, writing the header first when the file is new or empty.
    pub fn append(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CleanError::io(path, e))?;
        let is_empty = file
            .metadata()
            .map_err(|e| CleanError::io(path, e))?
            .len()
            == 0;
        let mut sink = Self::with_path(file, path);
        if is_empty {
            sink.write_header()?;
        }
        Ok(sink)
    }
}

impl<W: Write> CsvSink<W> {
    /// Wrap an arbitrary writer; the header is written immediately.
    pub fn from_writer(writer: W) -> Result<Self> {
        let mut sink = Self::with_path(writer, Path::new("<writer>"));
        sink.write_header()?;
        Ok(sink)
    }

    fn with_path(writer: W, path: &Path) -> Self {
        Self {
            writer: WriterBuilder::new().flexible(true).from_writer(writer),
            path: path.to_path_buf(),
        }
    }

    fn write_header(&mut self) -> Result<()> {
        self.writer
            .write_record(EYE_DATA_HEADER)
            .map_err(|e| CleanError::csv(&self.path, e))
    }

    pub fn into_inner(self) -> Result<W> {
        let path = self.path;
        self.writer
            .into_inner()
            .map_err(|e| CleanError::io(path, e.into_error()))
    }
}

impl<W: Write> SampleSink for CsvSink<W> {
    fn write_sample(&mut self, row: &RecordedSample<'_>) -> Result<()> {
        self.writer
            .write_record([
                row.participant.to_string(),
                row.run.to_string(),
                row.sample.timestamp.to_string(),
                format_pupil_value(row.sample.left),
                format_pupil_value(row.sample.right),
                u8::from(row.blink).to_string(),
            ])
            .map_err(|e| CleanError::csv(&self.path, e))
    }

    fn finish(&mut self, participant: &str, run: &str, blink_count: usize) -> Result<()> {
        self.writer
            .write_record([
                participant.to_string(),
                run.to_string(),
                BLINK_COUNT_LABEL.to_string(),
                blink_count.to_string(),
            ])
            .map_err(|e| CleanError::csv(&self.path, e))?;
        self.writer
            .flush()
            .map_err(|e| CleanError::io(&self.path, e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub samples: usize,
    pub blinks: usize,
}

/// One participant run, from `open` to `close`.
pub struct RecordingSession<S: SampleSink> {
    participant: String,
    run: String,
    sink: S,
    previous_blink: bool,
    blinks: usize,
    samples: usize,
}

impl<S: SampleSink> RecordingSession<S> {
    pub fn open(participant: impl Into<String>, run: impl Into<String>, sink: S) -> Self {
        let participant = participant.into();
        let run = run.into();
        debug!("recording session opened for {} {}", participant, run);
        Self {
            participant,
            run,
            sink,
            previous_blink: false,
            blinks: 0,
            samples: 0,
        }
    }

    /// Forward a sample to the sink. A blink is counted on each transition
    /// from valid to invalid.
    pub fn record(&mut self, sample: &GazeSample) -> Result<()> {
        let blink = sample.is_blink();
        if blink && !self.previous_blink {
            self.blinks += 1;
        }
        self.previous_blink = blink;
        self.samples += 1;
        self.sink.write_sample(&RecordedSample {
            participant: &self.participant,
            run: &self.run,
            sample,
            blink,
        })
    }

    pub fn blink_count(&self) -> usize {
        self.blinks
    }

    pub fn close(self) -> Result<RecordingSummary> {
        self.close_into_sink().map(|(summary, _)| summary)
    }

    /// Close the session and hand the sink back to the caller.
    pub fn close_into_sink(mut self) -> Result<(RecordingSummary, S)> {
        self.sink
            .finish(&self.participant, &self.run, self.blinks)?;
        info!(
            "recorded {} samples (+ {} blinks) for {} {}",
            self.samples, self.blinks, self.participant, self.run
        );
        let summary = RecordingSummary {
            samples: self.samples,
            blinks: self.blinks,
        };
        Ok((summary, self.sink))
    }
}

/// Synthetic gaze stream at 10 Hz for offline testing.
///
/// Pupil sizes are uniform in 2–5 mm; roughly one sample in twenty is an
/// invalid (blink) sample with no pupil reading on the affected eye.
pub fn simulate_samples<R: Rng>(count: usize, rng: &mut R) -> Vec<GazeSample> {
    (0..count)
        .map(|i| {
            let left_valid = !rng.gen_bool(0.05);
            let right_valid = if left_valid { !rng.gen_bool(0.02) } else { false };
            let left = rng.gen_range(2.0..5.0);
            let right = rng.gen_range(2.0..5.0);
            GazeSample {
                timestamp: i as f64 * 0.1,
                left: left_valid.then_some(left),
                right: right_valid.then_some(right),
                left_valid,
                right_valid,
            }
        })
        .collect()
}
