//! Endurance sweep over ramp speeds and cycles.

use std::fmt;
use std::path::PathBuf;
use std::thread::sleep;

use crate::{Device, Error, ExperimentConfig, OverflowPolicy, Phase, RampParameters, Result};
use crate::{format_general, RampDirectory, RunDirectory, SweepPlan};
use crate::sys::Driver;

#[derive(Debug)]
pub struct CompletedRamp {
    pub parameters: RampParameters,
    pub directory: RampDirectory,
    /// Trace files in the order they were written.
    pub files: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct SkippedRamp {
    pub speed: f64,
    pub reason: Error,
}

#[derive(Debug)]
pub struct SweepReport {
    pub run_directory: RunDirectory,
    pub completed: Vec<CompletedRamp>,
    pub skipped: Vec<SkippedRamp>,
    /// Whether the sweep stopped early at a rejected speed.
    pub aborted: bool,
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "run directory: {}", self.run_directory.path().display())?;
        for ramp in self.completed.iter() {
            writeln!(f, "  {} V/s: {} files in {}", format_general(ramp.parameters.speed),
                ramp.files.len(), ramp.directory.path().display())?;
        }
        for ramp in self.skipped.iter() {
            writeln!(f, "  {} V/s: skipped, {}", format_general(ramp.speed), ramp.reason)?;
        }
        if self.aborted {
            writeln!(f, "  sweep aborted")?;
        }
        Ok(())
    }
}

/// Run `plan.cycles` RESET/SET cycles for every speed of `plan`.
///
/// The run directory is created before the instrument is touched. A speed whose parameters are
/// rejected gets no directory and is handled according to `plan.overflow_policy`; any other
/// error stops the sweep and is returned. Files already written are left in place.
pub fn measure_ramps<D: Driver>(device: &mut Device<D>, config: &ExperimentConfig,
                                plan: &SweepPlan) -> Result<SweepReport> {
    let run_directory = RunDirectory::create(&plan.output_base)?;
    let mut report = SweepReport {
        run_directory,
        completed: Vec::new(),
        skipped: Vec::new(),
        aborted: false,
    };

    for (index, &speed) in plan.speeds.iter().enumerate() {
        log::info!("measuring ramp {} V/s ({}/{})", format_general(speed), index + 1,
            plan.speeds.len());

        let parameters = match RampParameters::derive(config, speed) {
            Ok(parameters) => parameters,
            Err(reason) if reason.is_parameter_rejection() => {
                log::warn!("rejected ramp {} V/s: {}", format_general(speed), reason);
                report.skipped.push(SkippedRamp { speed, reason });
                match plan.overflow_policy {
                    OverflowPolicy::SkipSpeed => continue,
                    OverflowPolicy::AbortSweep => {
                        report.aborted = true;
                        break
                    }
                }
            }
            Err(error) => return Err(error),
        };

        let directory = report.run_directory.ramp_directory(speed)?;
        let mut files = Vec::with_capacity(2 * plan.cycles as usize);
        for cycle in 1..=plan.cycles {
            log::info!("cycle {}/{} at {} V/s", cycle, plan.cycles, format_general(speed));
            for phase in Phase::ALL {
                let trace = device.run_half_cycle(config, parameters.phase(phase))?;
                let path = directory.cycle_path(phase, cycle);
                trace.write_to_path(&path)?;
                files.push(path);
            }
            sleep(plan.inter_cycle_delay);
        }
        report.completed.push(CompletedRamp { parameters, directory, files });
    }

    Ok(report)
}
