//! Layout of the measurement directory tree.
//!
//! `<base>/meas/cycles_<timestamp>/ramp_<speed>_V_per_second/Cycle_{R|S}<n>.txt`

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::{Error, Phase, Result};

const TIMESTAMP_FORMAT: &str = "%a_%d_%b_%Y__%H_%M_%S";

/// Format `value` the way C `printf("%g", value)` does.
pub fn format_general(value: f64) -> String {
    const PRECISION: i32 = 6;

    fn strip_zeros(digits: &str) -> &str {
        if digits.contains('.') {
            digits.trim_end_matches('0').trim_end_matches('.')
        } else {
            digits
        }
    }

    if value.is_nan() {
        return "nan".to_owned()
    } else if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_owned()
    } else if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_owned()
    }

    // the exponent is taken after rounding to the precision, e.g. 999999.5 is 1e+06
    let scientific = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else { return scientific };
    let Ok(exponent) = exponent.parse::<i32>() else { return scientific };
    if exponent < -4 || exponent >= PRECISION {
        format!("{}e{}{:02}", strip_zeros(mantissa), if exponent < 0 { '-' } else { '+' },
            exponent.abs())
    } else {
        let fixed = format!("{:.*}", (PRECISION - 1 - exponent) as usize, value);
        strip_zeros(&fixed).to_owned()
    }
}

/// Top-level directory of one run, `meas/cycles_<timestamp>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    /// Create the run directory for the current local time under `base`.
    pub fn create(base: &Path) -> Result<RunDirectory> {
        Self::create_at(base, &chrono::Local::now().naive_local())
    }

    /// Create the run directory for `timestamp` under `base`.
    ///
    /// `base/meas` may already exist, the run directory itself must not.
    pub fn create_at(base: &Path, timestamp: &NaiveDateTime) -> Result<RunDirectory> {
        let meas = base.join("meas");
        fs::create_dir_all(&meas).map_err(Error::io(&meas))?;
        let path = meas.join(format!("cycles_{}", timestamp.format(TIMESTAMP_FORMAT)));
        fs::create_dir(&path).map_err(Error::io(&path))?;
        log::info!("created run directory {}", path.display());
        Ok(RunDirectory { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory holding the traces of ramp `speed` (in V/s).
    pub fn ramp_directory(&self, speed: f64) -> Result<RampDirectory> {
        let path = self.path.join(format!("ramp_{}_V_per_second", format_general(speed)));
        fs::create_dir(&path).map_err(Error::io(&path))?;
        log::debug!("created ramp directory {}", path.display());
        Ok(RampDirectory { path })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampDirectory {
    path: PathBuf,
}

impl RampDirectory {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the trace of `phase` in cycle `cycle`, counted from 1.
    pub fn cycle_path(&self, phase: Phase, cycle: u32) -> PathBuf {
        self.path.join(format!("Cycle_{}{}.txt", phase.tag(), cycle))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::NaiveDate;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(9, 5, 3).unwrap()
    }

    #[test]
    fn test_format_general() {
        assert_eq!(format_general(1.0), "1");
        assert_eq!(format_general(0.1), "0.1");
        assert_eq!(format_general(100.0), "100");
        assert_eq!(format_general(500.0), "500");
        assert_eq!(format_general(1000.0), "1000");
        assert_eq!(format_general(2.5), "2.5");
        assert_eq!(format_general(-0.25), "-0.25");
        assert_eq!(format_general(123456.0), "123456");
        assert_eq!(format_general(1e6), "1e+06");
        assert_eq!(format_general(1234567.0), "1.23457e+06");
        assert_eq!(format_general(999999.5), "1e+06");
        assert_eq!(format_general(0.0001), "0.0001");
        assert_eq!(format_general(1e-5), "1e-05");
        assert_eq!(format_general(1.5e-7), "1.5e-07");
        assert_eq!(format_general(1e100), "1e+100");
        assert_eq!(format_general(1.0 / 3.0), "0.333333");
        assert_eq!(format_general(0.0), "0");
    }

    #[test]
    fn test_directory_layout() {
        let base = tempfile::tempdir().unwrap();
        let run = RunDirectory::create_at(base.path(), &timestamp()).unwrap();
        assert_eq!(run.path(), base.path().join("meas").join("cycles_Mon_19_Oct_2026__09_05_03"));
        assert!(run.path().is_dir());

        let ramp = run.ramp_directory(0.1).unwrap();
        assert_eq!(ramp.path(), run.path().join("ramp_0.1_V_per_second"));
        assert!(ramp.path().is_dir());
        assert_eq!(ramp.cycle_path(Phase::Reset, 1), ramp.path().join("Cycle_R1.txt"));
        assert_eq!(ramp.cycle_path(Phase::Set, 12), ramp.path().join("Cycle_S12.txt"));
    }

    #[test]
    fn test_existing_directories() {
        let base = tempfile::tempdir().unwrap();
        fs::create_dir(base.path().join("meas")).unwrap();
        let run = RunDirectory::create_at(base.path(), &timestamp()).unwrap();
        // same timestamp twice
        assert!(matches!(RunDirectory::create_at(base.path(), &timestamp()), Err(Error::Io { .. })));

        run.ramp_directory(1.0).unwrap();
        match run.ramp_directory(1.0) {
            Err(Error::Io { path, error }) => {
                assert_eq!(path, run.path().join("ramp_1_V_per_second"));
                assert_eq!(error.kind(), std::io::ErrorKind::AlreadyExists);
            }
            result => panic!("unexpected {:?}", result),
        }
    }
}
