//! Fixed experiment configuration and the plan of a sweep.

use std::path::PathBuf;
use std::time::Duration;

/// Instrument-facing constants of the endurance experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    /// Peak of the SET ramp, in V.
    pub max_set_voltage: f64,
    /// Peak of the RESET ramp, in V. Negative.
    pub min_reset_voltage: f64,
    /// Voltage step between two consecutive measurement points, in V.
    pub voltage_resolution: f64,
    /// Averaging window of each measurement point, in s.
    pub averaging_time: f64,
    /// Channel forcing the ramp.
    pub voltage_channel: i32,
    /// Channel held at 0 V measuring the device current.
    pub current_channel: i32,
    /// VISA address of the instrument.
    pub instrument_address: String,
    /// Largest number of measurement points the instrument can store per channel.
    pub max_points: u64,
    /// Shortest sampling interval the instrument supports, in s.
    pub min_sampling_interval: f64,
    /// Added to the pattern duration to bound the wait for completion.
    pub completion_timeout: Duration,
    /// Time between two status polls while waiting for completion.
    pub status_poll_interval: Duration,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            max_set_voltage: 0.5,
            min_reset_voltage: -1.2,
            voltage_resolution: 10e-3,
            averaging_time: 1e-6,
            voltage_channel: 101,
            current_channel: 102,
            instrument_address: "b1500gpib".to_owned(),
            max_points: 4_000_000,
            min_sampling_interval: 10e-9,
            completion_timeout: Duration::from_secs(30),
            status_poll_interval: Duration::from_millis(10),
        }
    }
}

/// What to do with the rest of a sweep when a ramp speed is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Skip the rejected speed and continue with the next one.
    #[default]
    SkipSpeed,
    /// Stop the sweep at the rejected speed.
    AbortSweep,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    /// Ramp speeds, in V/s.
    pub speeds: Vec<f64>,
    /// Number of RESET/SET cycles per speed.
    pub cycles: u32,
    /// Directory the `meas` tree is created in.
    pub output_base: PathBuf,
    /// Pause after each RESET/SET cycle.
    pub inter_cycle_delay: Duration,
    /// Handling of speeds whose parameters are rejected.
    pub overflow_policy: OverflowPolicy,
}

impl Default for SweepPlan {
    fn default() -> Self {
        Self {
            speeds: vec![1.0],
            cycles: 5,
            output_base: PathBuf::from("."),
            inter_cycle_delay: Duration::from_millis(1000),
            overflow_policy: Default::default(),
        }
    }
}
