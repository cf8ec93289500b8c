use std::ops::{Deref, DerefMut};
use std::thread::sleep;
use std::time::{Duration, Instant};

use crate::{Error, ExperimentConfig, PhaseTiming, Result, Sample, Trace};
use crate::sys::{Driver, DriverError, MeasureEventData, MeasureMode, OperationMode, Status};

const VOLTAGE_PATTERN: &str = "v1";
const VOLTAGE_EVENT: &str = "evt";
const CURRENT_PATTERN: &str = "v2";
const CURRENT_EVENT: &str = "evt_curr";

/// An open instrument session. Closed when dropped.
struct Session<'a, D: Driver> {
    driver: &'a mut D,
    open: bool,
}

impl<'a, D: Driver> Session<'a, D> {
    fn open(driver: &'a mut D, address: &str) -> Result<Session<'a, D>> {
        log::debug!("open_session({:?})", address);
        driver.open_session(address).map_err(Error::Session)?;
        Ok(Session { driver, open: true })
    }

    fn close(mut self) -> Result<()> {
        log::debug!("close_session()");
        self.open = false;
        self.driver.close_session().map_err(Error::Session)
    }
}

impl<'a, D: Driver> Deref for Session<'a, D> {
    type Target = D;

    fn deref(&self) -> &D {
        &*self.driver
    }
}

impl<'a, D: Driver> DerefMut for Session<'a, D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut *self.driver
    }
}

impl<'a, D: Driver> Drop for Session<'a, D> {
    fn drop(&mut self) {
        if self.open {
            if let Err(error) = self.driver.close_session() {
                log::warn!("could not close session: {}", error)
            }
        }
    }
}

#[derive(Debug)]
pub struct Device<D: Driver> {
    driver: D,
}

#[cfg(feature = "hardware")]
impl Device<crate::sys::imp::WgfmuDriverImpl> {
    pub fn new() -> Device<crate::sys::imp::WgfmuDriverImpl> {
        Device { driver: crate::sys::imp::WgfmuDriverImpl::new() }
    }
}

impl<D: Driver> Device<D> {
    pub fn with_driver(driver: D) -> Device<D> {
        Device { driver }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Program the ramp of one half-cycle into the driver. Does not need a session.
    ///
    /// The voltage channel ramps from 0 V to the phase bound and back in `total_time`, then
    /// holds 0 V for a quarter period so that sampling never outlasts the waveform. The current
    /// channel holds 0 V for `total_time`. Both channels sample `samples` points.
    pub fn program(&mut self, config: &ExperimentConfig, timing: &PhaseTiming) -> Result<()> {
        log::debug!("program({}, bound = {} V, half = {} s, {} samples every {} s)",
            timing.phase, timing.bound, timing.half_time, timing.samples, timing.sampling_interval);
        let driver = &mut self.driver;
        driver.clear().map_err(Error::Setup)?;

        driver.create_pattern(VOLTAGE_PATTERN, 0.0).map_err(Error::Setup)?;
        driver.add_vector(VOLTAGE_PATTERN, timing.half_time, timing.bound).map_err(Error::Setup)?;
        driver.add_vector(VOLTAGE_PATTERN, timing.half_time, 0.0).map_err(Error::Setup)?;
        driver.add_vector(VOLTAGE_PATTERN, timing.half_time / 2.0, 0.0).map_err(Error::Setup)?;
        driver.set_measure_event(VOLTAGE_PATTERN, VOLTAGE_EVENT, 0.0, timing.samples,
                                 timing.sampling_interval, config.averaging_time,
                                 MeasureEventData::Averaged).map_err(Error::Setup)?;
        driver.add_sequence(config.voltage_channel, VOLTAGE_PATTERN, 1.0).map_err(Error::Setup)?;

        driver.create_pattern(CURRENT_PATTERN, 0.0).map_err(Error::Setup)?;
        driver.set_vector(CURRENT_PATTERN, timing.total_time, 0.0).map_err(Error::Setup)?;
        driver.set_measure_event(CURRENT_PATTERN, CURRENT_EVENT, 0.0, timing.samples,
                                 timing.sampling_interval, config.averaging_time,
                                 MeasureEventData::Averaged).map_err(Error::Setup)?;
        driver.add_sequence(config.current_channel, CURRENT_PATTERN, 1.0).map_err(Error::Setup)?;
        Ok(())
    }

    /// Run one half-cycle and read back its trace.
    ///
    /// A session is opened for the duration of the call only and is closed on every path out
    /// of it.
    pub fn run_half_cycle(&mut self, config: &ExperimentConfig, timing: &PhaseTiming)
            -> Result<Trace> {
        let timeout = timing.wait_limit(config)?;
        self.program(config, timing)?;

        let mut session = Session::open(&mut self.driver, &config.instrument_address)?;
        session.initialize().map_err(Error::Session)?;
        session.set_operation_mode(config.voltage_channel, OperationMode::FastIv)
            .map_err(Error::Setup)?;
        session.set_operation_mode(config.current_channel, OperationMode::FastIv)
            .map_err(Error::Setup)?;
        session.set_measure_mode(config.current_channel, MeasureMode::Current)
            .map_err(Error::Setup)?;
        session.connect(config.voltage_channel).map_err(Error::Setup)?;
        session.connect(config.current_channel).map_err(Error::Setup)?;

        log::debug!("execute()");
        session.execute().map_err(Error::Execute)?;
        wait_until_completed(&mut *session, timeout, config.status_poll_interval)?;

        let trace = read_trace(&mut *session, config, timing)?;
        session.close()?;
        Ok(trace)
    }
}

/// Poll the instrument until the running sequence completes, aborting it after `timeout`.
fn wait_until_completed<D: Driver>(driver: &mut D, timeout: Duration, poll_interval: Duration)
        -> Result<()> {
    let started = Instant::now();
    loop {
        let progress = driver.status().map_err(Error::Execute)?;
        log::trace!("status() = {:?}", progress);
        match progress.status {
            Status::Completed | Status::Done => return Ok(()),
            Status::Running | Status::Idle => (),
            Status::Aborted | Status::AbortCompleted | Status::RunningIllegal =>
                return Err(Error::Execute(DriverError::new("WGFMU_getStatus",
                    progress.status.wgfmu_code(), format!("sequence stopped: {:?}", progress.status)))),
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            log::error!("sequence did not complete in {:?}, aborting", elapsed);
            if let Err(error) = driver.abort() {
                log::warn!("could not abort sequence: {}", error)
            }
            return Err(Error::Timeout { elapsed })
        }
        sleep(poll_interval);
    }
}

fn read_trace<D: Driver>(driver: &mut D, config: &ExperimentConfig, timing: &PhaseTiming)
        -> Result<Trace> {
    let size = driver.measure_value_size(config.current_channel).map_err(Error::Readback)?;
    log::debug!("measure_value_size({}) = {:?}", config.current_channel, size);
    if size.measured < timing.samples {
        return Err(Error::ShortReadback { measured: size.measured, expected: timing.samples })
    }

    let mut trace = Trace::with_capacity(timing.phase, timing.samples);
    for index in 0..timing.samples {
        let (time, current) = driver.measure_value(config.current_channel, index)
            .map_err(Error::Readback)?;
        let voltage = driver.interpolated_force_value(config.voltage_channel, time)
            .map_err(Error::Readback)?;
        trace.push(Sample { voltage, current, time });
    }
    Ok(trace)
}
