//! The instrument driver contract.
//!
//! The WGFMU driver is a vendor library; this module only describes the subset of its API used
//! by the crate. [`imp`] binds the real library (feature `hardware`), [`sim`] is an in-process
//! stand-in used for dry runs and tests.

use std::fmt;

pub mod sim;

#[cfg(feature = "hardware")]
#[path = "wgfmu.rs"]
pub mod imp;

/// A failed driver call, as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    /// Name of the failing call.
    pub call: &'static str,
    /// Return code of the call.
    pub code: i32,
    pub message: String,
}

impl DriverError {
    pub fn new(call: &'static str, code: i32, message: impl Into<String>) -> Self {
        DriverError { call, code, message: message.into() }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{} failed with code {}", self.call, self.code)
        } else {
            write!(f, "{} failed with code {}: {}", self.call, self.code, self.message)
        }
    }
}

impl std::error::Error for DriverError {}

pub type DriverResult<T> =
    core::result::Result<T, DriverError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    Dc,
    FastIv,
    Pg,
    Smu,
}

impl OperationMode {
    pub fn wgfmu_code(self) -> i32 {
        match self {
            Self::Dc     => 2000,
            Self::FastIv => 2001,
            Self::Pg     => 2002,
            Self::Smu    => 2003,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureMode {
    Voltage,
    Current,
}

impl MeasureMode {
    pub fn wgfmu_code(self) -> i32 {
        match self {
            Self::Voltage => 4000,
            Self::Current => 4001,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureEventData {
    Averaged,
    Raw,
}

impl MeasureEventData {
    pub fn wgfmu_code(self) -> i32 {
        match self {
            Self::Averaged => 12000,
            Self::Raw      => 12001,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Completed,
    Done,
    Running,
    AbortCompleted,
    Aborted,
    RunningIllegal,
    Idle,
}

impl Status {
    pub fn from_wgfmu_code(code: i32) -> Option<Status> {
        Some(match code {
            10000 => Self::Completed,
            10001 => Self::Done,
            10002 => Self::Running,
            10003 => Self::AbortCompleted,
            10004 => Self::Aborted,
            10005 => Self::RunningIllegal,
            10006 => Self::Idle,
            _ => return None
        })
    }

    pub fn wgfmu_code(self) -> i32 {
        match self {
            Self::Completed      => 10000,
            Self::Done           => 10001,
            Self::Running        => 10002,
            Self::AbortCompleted => 10003,
            Self::Aborted        => 10004,
            Self::RunningIllegal => 10005,
            Self::Idle           => 10006,
        }
    }
}

/// Progress of a running sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub status: Status,
    /// Time since execution started, in s.
    pub elapsed: f64,
    /// Total time the sequence takes, in s.
    pub total: f64,
}

/// Measured sample count of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasureSize {
    /// Points measured so far.
    pub measured: usize,
    /// Points the sequence will measure in total.
    pub total: usize,
}

/// Calls of the WGFMU instrument library, one method per vendor function.
///
/// Patterns and sequences are programmed offline (without a session); `execute` and the calls
/// after it require an open session.
pub trait Driver {
    fn clear(&mut self) -> DriverResult<()>;
    fn create_pattern(&mut self, pattern: &str, initial_voltage: f64) -> DriverResult<()>;
    /// Append a vector `delta_time` after the last one, ramping linearly to `voltage`.
    fn add_vector(&mut self, pattern: &str, delta_time: f64, voltage: f64) -> DriverResult<()>;
    /// Place a vector at absolute `time`, ramping linearly to `voltage`.
    fn set_vector(&mut self, pattern: &str, time: f64, voltage: f64) -> DriverResult<()>;
    fn set_measure_event(&mut self, pattern: &str, event: &str, time: f64, points: usize,
                         interval: f64, averaging_time: f64, data: MeasureEventData)
                         -> DriverResult<()>;
    fn add_sequence(&mut self, channel: i32, pattern: &str, loop_count: f64) -> DriverResult<()>;

    fn open_session(&mut self, address: &str) -> DriverResult<()>;
    fn close_session(&mut self) -> DriverResult<()>;
    fn initialize(&mut self) -> DriverResult<()>;
    fn set_operation_mode(&mut self, channel: i32, mode: OperationMode) -> DriverResult<()>;
    fn set_measure_mode(&mut self, channel: i32, mode: MeasureMode) -> DriverResult<()>;
    fn connect(&mut self, channel: i32) -> DriverResult<()>;

    fn execute(&mut self) -> DriverResult<()>;
    fn status(&mut self) -> DriverResult<Progress>;
    fn abort(&mut self) -> DriverResult<()>;

    fn measure_value_size(&mut self, channel: i32) -> DriverResult<MeasureSize>;
    /// Returns the `(time, value)` pair of measurement point `index`.
    fn measure_value(&mut self, channel: i32, index: usize) -> DriverResult<(f64, f64)>;
    /// Returns the voltage forced by `channel` at `time`.
    fn interpolated_force_value(&mut self, channel: i32, time: f64) -> DriverResult<f64>;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_codes() {
        for status in [Status::Completed, Status::Done, Status::Running, Status::AbortCompleted,
                       Status::Aborted, Status::RunningIllegal, Status::Idle] {
            assert_eq!(Status::from_wgfmu_code(status.wgfmu_code()), Some(status));
        }
        assert_eq!(Status::from_wgfmu_code(0), None);
    }

    #[test]
    fn test_driver_error_display() {
        assert_eq!(DriverError::new("WGFMU_execute", -5, "").to_string(),
            "WGFMU_execute failed with code -5");
        assert_eq!(DriverError::new("WGFMU_openSession", -1, "no instrument").to_string(),
            "WGFMU_openSession failed with code -1: no instrument");
    }
}
