pub mod sys;
mod config;
mod params;
mod device;
mod trace;
mod output;
mod sweep;

use std::path::PathBuf;
use std::time::Duration;

use sys::DriverError;

#[derive(Debug)]
pub enum Error {
    InvalidSpeed(f64),
    InvalidResolution(f64),
    PatternTooLong { phase: Phase, duration: f64 },
    TooManyPoints { phase: Phase, points: u64, limit: u64 },
    TooFewPoints { phase: Phase },
    SamplingTooFast { phase: Phase, interval: f64, limit: f64 },
    Session(DriverError),
    Setup(DriverError),
    Execute(DriverError),
    Readback(DriverError),
    Timeout { elapsed: Duration },
    ShortReadback { measured: usize, expected: usize },
    Io { path: PathBuf, error: std::io::Error },
}

impl Error {
    /// Whether the error rejects the parameters of a single ramp speed, as opposed to
    /// a failure of the instrument or of the filesystem.
    pub fn is_parameter_rejection(&self) -> bool {
        matches!(self,
            Self::InvalidSpeed(_) |
            Self::InvalidResolution(_) |
            Self::PatternTooLong { .. } |
            Self::TooManyPoints { .. } |
            Self::TooFewPoints { .. } |
            Self::SamplingTooFast { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |error| Error::Io { path, error }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::InvalidSpeed(speed) =>
                write!(f, "invalid ramp speed {} V/s", speed),
            Self::InvalidResolution(resolution) =>
                write!(f, "invalid voltage resolution {} V", resolution),
            Self::PatternTooLong { phase, duration } =>
                write!(f, "{} pattern of {:e} s cannot be timed", phase, duration),
            Self::TooManyPoints { phase, points, limit } =>
                write!(f, "too many {} points ({}, limit {}), lower the number of {} measurement points",
                    phase, points, limit, phase),
            Self::TooFewPoints { phase } =>
                write!(f, "no {} measurement points, sampling resolution exceeds the voltage range", phase),
            Self::SamplingTooFast { phase, interval, limit } =>
                write!(f, "{} sampling interval {:e} s is below the instrument limit of {:e} s",
                    phase, interval, limit),
            Self::Session(error) =>
                write!(f, "session error: {}", error),
            Self::Setup(error) =>
                write!(f, "setup error: {}", error),
            Self::Execute(error) =>
                write!(f, "execute error: {}", error),
            Self::Readback(error) =>
                write!(f, "readback error: {}", error),
            Self::Timeout { elapsed } =>
                write!(f, "instrument did not complete within {:.3} s", elapsed.as_secs_f64()),
            Self::ShortReadback { measured, expected } =>
                write!(f, "instrument measured {} points, expected {}", measured, expected),
            Self::Io { path, error } =>
                write!(f, "could not create {}: {}", path.display(), error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Session(error) | Self::Setup(error) |
            Self::Execute(error) | Self::Readback(error) => Some(error),
            Self::Io { error, .. } => Some(error),
            _ => None
        }
    }
}

pub type Result<T> =
    core::result::Result<T, Error>;

pub use config::{
    ExperimentConfig,
    SweepPlan,
    OverflowPolicy,
};

pub use params::{
    Phase,
    PhaseTiming,
    RampParameters,
};

pub use device::Device;

pub use trace::{
    Sample,
    Trace,
};

pub use output::{
    format_general,
    RunDirectory,
    RampDirectory,
};

pub use sweep::{
    measure_ramps,
    SweepReport,
    CompletedRamp,
    SkippedRamp,
};
