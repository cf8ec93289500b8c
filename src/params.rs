//! Waveform timing derived from a ramp speed.

use std::fmt;
use std::time::Duration;

use crate::{Error, ExperimentConfig, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Negative-going ramp to the minimum reset voltage.
    Reset,
    /// Positive-going ramp to the maximum set voltage.
    Set,
}

impl Phase {
    pub const ALL: [Phase; 2] = [Phase::Reset, Phase::Set];

    /// Voltage the ramp reaches at its peak.
    pub fn bound(self, config: &ExperimentConfig) -> f64 {
        match self {
            Self::Reset => config.min_reset_voltage,
            Self::Set => config.max_set_voltage,
        }
    }

    /// Letter used in the name of trace files.
    pub fn tag(self) -> char {
        match self {
            Self::Reset => 'R',
            Self::Set => 'S',
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Reset => write!(f, "reset"),
            Self::Set => write!(f, "set"),
        }
    }
}

/// Timing of one half-cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseTiming {
    pub phase: Phase,
    /// Peak voltage of the ramp, in V.
    pub bound: f64,
    /// Duration of the ramp from 0 V to `bound`, in s.
    pub half_time: f64,
    /// Duration of the ramp up and back down, in s.
    pub total_time: f64,
    pub points: u64,
    /// Time between two measurement points, in s.
    pub sampling_interval: f64,
    /// Number of samples read back and written to the trace file.
    pub samples: usize,
}

impl PhaseTiming {
    /// Length of the forced pattern including the trailing quarter-period pad, in s.
    pub fn pattern_time(&self) -> f64 {
        self.total_time + self.half_time / 2.0
    }

    /// Longest wait for the pattern to complete: its length plus the completion timeout.
    pub fn wait_limit(&self, config: &ExperimentConfig) -> Result<Duration> {
        let duration = self.pattern_time();
        Duration::try_from_secs_f64(duration).ok()
            .and_then(|pattern| pattern.checked_add(config.completion_timeout))
            .ok_or(Error::PatternTooLong { phase: self.phase, duration })
    }

    fn derive(config: &ExperimentConfig, phase: Phase, speed: f64) -> Result<PhaseTiming> {
        let bound = phase.bound(config);
        let half_time = (bound / speed).abs();
        let total_time = 2.0 * half_time;

        // Ratios such as 2.4 / 0.01 land a hair below the integer in binary floating point;
        // nudge by a few ULPs so that they are not floored one point short.
        let exact = 2.0 * bound.abs() / config.voltage_resolution;
        let points = (exact * (1.0 + 4.0 * f64::EPSILON)).floor();
        if !(points <= config.max_points as f64) {
            return Err(Error::TooManyPoints { phase, points: points as u64, limit: config.max_points })
        }
        if points < 1.0 {
            return Err(Error::TooFewPoints { phase })
        }
        let points = points as u64;

        let sampling_interval = total_time / points as f64;
        if sampling_interval < config.min_sampling_interval {
            return Err(Error::SamplingTooFast {
                phase,
                interval: sampling_interval,
                limit: config.min_sampling_interval,
            })
        }

        let timing = PhaseTiming {
            phase,
            bound,
            half_time,
            total_time,
            points,
            sampling_interval,
            samples: points as usize,
        };
        timing.wait_limit(config)?;
        Ok(timing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampParameters {
    /// Ramp speed, in V/s.
    pub speed: f64,
    pub reset: PhaseTiming,
    pub set: PhaseTiming,
}

impl RampParameters {
    /// Derive the timing of both half-cycles for a ramp `speed` in V/s.
    ///
    /// The SET phase is checked before the RESET phase, so when both exceed the point limit
    /// the error names the SET phase.
    pub fn derive(config: &ExperimentConfig, speed: f64) -> Result<RampParameters> {
        if !speed.is_finite() || speed == 0.0 {
            return Err(Error::InvalidSpeed(speed))
        }
        if !(config.voltage_resolution > 0.0 && config.voltage_resolution.is_finite()) {
            return Err(Error::InvalidResolution(config.voltage_resolution))
        }
        let set = PhaseTiming::derive(config, Phase::Set, speed)?;
        let reset = PhaseTiming::derive(config, Phase::Reset, speed)?;
        log::debug!("derive({} V/s): set = {:?}, reset = {:?}", speed, set, reset);
        Ok(RampParameters { speed, reset, set })
    }

    pub fn phase(&self, phase: Phase) -> &PhaseTiming {
        match phase {
            Phase::Reset => &self.reset,
            Phase::Set => &self.set,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() <= 1e-12 * expected.abs().max(1.0),
            "{} != {}", actual, expected);
    }

    #[test]
    fn test_derive_one_volt_per_second() {
        let params = RampParameters::derive(&ExperimentConfig::default(), 1.0).unwrap();
        assert_eq!(params.set.points, 100);
        assert_eq!(params.reset.points, 240);
        assert_eq!(params.set.samples, 100);
        assert_eq!(params.reset.samples, 240);
        assert_close(params.set.half_time, 0.5);
        assert_close(params.set.total_time, 1.0);
        assert_close(params.reset.half_time, 1.2);
        assert_close(params.reset.total_time, 2.4);
        assert_close(params.set.sampling_interval, 0.01);
        assert_close(params.reset.sampling_interval, 0.01);
    }

    #[test]
    fn test_derive_durations() {
        let config = ExperimentConfig::default();
        for &speed in [0.1, 1.0, 100.0, 500.0, 1000.0, -2.0].iter() {
            let params = RampParameters::derive(&config, speed).unwrap();
            for phase in Phase::ALL {
                let timing = params.phase(phase);
                assert_eq!(timing.phase, phase);
                assert!(timing.half_time > 0.0 && timing.half_time.is_finite());
                assert_close(timing.half_time, (phase.bound(&config) / speed).abs());
                assert_close(timing.total_time, 2.0 * timing.half_time);
                assert_close(timing.sampling_interval * timing.points as f64, timing.total_time);
                assert_close(timing.pattern_time(), 2.5 * timing.half_time);
            }
            // point count only depends on the voltage range
            assert_eq!(params.set.points, 100);
            assert_eq!(params.reset.points, 240);
        }
    }

    #[test]
    fn test_derive_too_many_points() {
        let config = ExperimentConfig { voltage_resolution: 1e-7, ..Default::default() };
        match RampParameters::derive(&config, 1.0) {
            Err(Error::TooManyPoints { phase: Phase::Set, points, limit }) => {
                assert_eq!(points, 10_000_000);
                assert_eq!(limit, 4_000_000);
            }
            result => panic!("unexpected {:?}", result),
        }

        // SET fits, RESET does not
        let config = ExperimentConfig { voltage_resolution: 5e-7, ..Default::default() };
        match RampParameters::derive(&config, 1.0) {
            Err(Error::TooManyPoints { phase: Phase::Reset, points, .. }) =>
                assert_eq!(points, 4_800_000),
            result => panic!("unexpected {:?}", result),
        }
    }

    #[test]
    fn test_derive_at_point_limit() {
        let config = ExperimentConfig { max_points: 240, ..Default::default() };
        assert!(RampParameters::derive(&config, 1.0).is_ok());
        let config = ExperimentConfig { max_points: 239, ..Default::default() };
        assert!(matches!(RampParameters::derive(&config, 1.0),
            Err(Error::TooManyPoints { phase: Phase::Reset, .. })));
    }

    #[test]
    fn test_derive_rejects_bad_input() {
        let config = ExperimentConfig::default();
        for &speed in [0.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY].iter() {
            let error = RampParameters::derive(&config, speed).unwrap_err();
            assert!(matches!(error, Error::InvalidSpeed(_)));
            assert!(error.is_parameter_rejection());
        }

        let config = ExperimentConfig { voltage_resolution: 2.0, ..Default::default() };
        assert!(matches!(RampParameters::derive(&config, 1.0),
            Err(Error::TooFewPoints { phase: Phase::Set })));

        for &resolution in [f64::NAN, 0.0, -10e-3, f64::INFINITY].iter() {
            let config = ExperimentConfig { voltage_resolution: resolution, ..Default::default() };
            let error = RampParameters::derive(&config, 1.0).unwrap_err();
            assert!(matches!(error, Error::InvalidResolution(_)), "{:?}", error);
            assert!(error.is_parameter_rejection());
        }
    }

    #[test]
    fn test_derive_rejects_untimeable_patterns() {
        let config = ExperimentConfig::default();
        // 0.5 V / 1e-320 V/s overflows to an infinite SET ramp
        match RampParameters::derive(&config, 1e-320) {
            Err(Error::PatternTooLong { phase: Phase::Set, duration }) => assert!(duration.is_infinite()),
            result => panic!("unexpected {:?}", result),
        }
        // SET still fits in a `Duration`, the 3e19 s RESET pattern does not
        match RampParameters::derive(&config, 1e-19) {
            Err(error @ Error::PatternTooLong { phase: Phase::Reset, .. }) =>
                assert!(error.is_parameter_rejection()),
            result => panic!("unexpected {:?}", result),
        }

        let params = RampParameters::derive(&config, 1.0).unwrap();
        assert_eq!(params.set.wait_limit(&config).unwrap(), Duration::from_millis(31_250));
        let config = ExperimentConfig { completion_timeout: Duration::MAX, ..config };
        assert!(matches!(params.set.wait_limit(&config),
            Err(Error::PatternTooLong { phase: Phase::Set, .. })));
    }

    #[test]
    fn test_derive_sampling_too_fast() {
        let config = ExperimentConfig::default();
        // 1 V in 1 ns split over 100 points
        match RampParameters::derive(&config, 1e9) {
            Err(Error::SamplingTooFast { phase: Phase::Set, interval, limit }) => {
                assert_close(interval, 1e-11);
                assert_close(limit, 10e-9);
            }
            result => panic!("unexpected {:?}", result),
        }
    }
}
