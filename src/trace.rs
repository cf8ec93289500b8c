use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::{Error, Phase, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Voltage forced across the device, in V.
    pub voltage: f64,
    /// Current through the device, in A. Signed as measured.
    pub current: f64,
    /// Time since the start of the pattern, in s.
    pub time: f64,
}

/// Samples of one half-cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    phase: Phase,
    samples: Vec<Sample>,
}

impl Trace {
    pub fn with_capacity(phase: Phase, capacity: usize) -> Trace {
        Trace { phase, samples: Vec::with_capacity(capacity) }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Write one `<voltage> <|current|> <time>` line per sample, no header.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for sample in self.samples.iter() {
            writeln!(writer, "{:.9} {:.9} {:.9}", sample.voltage, sample.current.abs(), sample.time)?;
        }
        writer.flush()
    }

    /// Create (or truncate) the file at `path` and write the trace to it.
    pub fn write_to_path(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(Error::io(path))?;
        self.write_to(BufWriter::new(file)).map_err(Error::io(path))?;
        log::debug!("wrote {} samples to {}", self.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_trace_lines() {
        let mut trace = Trace::with_capacity(Phase::Reset, 2);
        trace.push(Sample { voltage: -0.012, current: -1.2e-7, time: 0.01 });
        trace.push(Sample { voltage: 0.5, current: 5e-4, time: 1.25 });
        let mut text = Vec::new();
        trace.write_to(&mut text).unwrap();
        assert_eq!(String::from_utf8(text).unwrap(),
            "-0.012000000 0.000000120 0.010000000\n\
             0.500000000 0.000500000 1.250000000\n");
    }

    #[test]
    fn test_empty_trace() {
        let trace = Trace::with_capacity(Phase::Set, 0);
        assert!(trace.is_empty());
        let mut text = Vec::new();
        trace.write_to(&mut text).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn test_write_to_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("Cycle_S1.txt");
        let trace = Trace::with_capacity(Phase::Set, 0);
        match trace.write_to_path(&path) {
            Err(Error::Io { path: error_path, .. }) => assert_eq!(error_path, path),
            result => panic!("unexpected {:?}", result),
        }
    }
}
