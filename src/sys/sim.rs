//! Simulated WGFMU instrument.
//!
//! Keeps patterns and sequences the way the vendor library does, "executes" them instantly and
//! measures a two-terminal resistive-switching cell connected between the channels. Useful for
//! dry runs of a sweep and for tests.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::{Driver, DriverError, DriverResult, MeasureEventData, MeasureMode, MeasureSize};
use super::{OperationMode, Progress, Status};

const PARAMETER_ERROR: i32 = -1;
const STATE_ERROR: i32 = -2;
const INJECTED_ERROR: i32 = -99;

/// Resistive-switching cell driven by the voltage across it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedCell {
    /// High resistance state, in ohm.
    pub hrs: f64,
    /// Low resistance state, in ohm.
    pub lrs: f64,
    /// Voltage at or above which the cell switches to LRS.
    pub set_threshold: f64,
    /// Voltage at or below which the cell switches to HRS.
    pub reset_threshold: f64,
    /// Current resistance, in ohm.
    pub resistance: f64,
}

impl Default for SimulatedCell {
    fn default() -> Self {
        SimulatedCell {
            hrs: 100e3,
            lrs: 1e3,
            set_threshold: 0.4,
            reset_threshold: -0.9,
            resistance: 100e3,
        }
    }
}

impl SimulatedCell {
    fn apply(&mut self, voltage: f64) -> f64 {
        if voltage >= self.set_threshold {
            self.resistance = self.lrs
        } else if voltage <= self.reset_threshold {
            self.resistance = self.hrs
        }
        voltage / self.resistance
    }
}

#[derive(Debug, Clone)]
struct MeasureEvent {
    time: f64,
    points: usize,
    interval: f64,
}

#[derive(Debug, Clone)]
struct Pattern {
    // (absolute time, voltage) breakpoints, first one at t = 0
    vectors: Vec<(f64, f64)>,
    events: Vec<MeasureEvent>,
}

impl Pattern {
    fn duration(&self) -> f64 {
        self.vectors.last().map(|&(time, _)| time).unwrap_or(0.0)
    }
}

/// Piecewise-linear force waveform of a channel, patterns laid end to end.
#[derive(Debug, Clone, Default)]
struct Timeline {
    vectors: Vec<(f64, f64)>,
}

impl Timeline {
    fn push(&mut self, offset: f64, pattern: &Pattern) {
        for &(time, voltage) in pattern.vectors.iter() {
            self.vectors.push((offset + time, voltage));
        }
    }

    fn voltage_at(&self, time: f64) -> f64 {
        let index = self.vectors.partition_point(|&(t, _)| t <= time);
        match (index, self.vectors.get(index)) {
            (0, _) => self.vectors.first().map(|&(_, v)| v).unwrap_or(0.0),
            (_, None) => self.vectors.last().map(|&(_, v)| v).unwrap_or(0.0),
            (_, Some(&(t1, v1))) => {
                let (t0, v0) = self.vectors[index - 1];
                if t1 > t0 { v0 + (v1 - v0) * (time - t0) / (t1 - t0) } else { v1 }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Execution {
    Idle,
    Running { polls_left: u32 },
    Completed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct SimulatedDriver {
    /// Device under test.
    pub cell: SimulatedCell,
    running_polls: u32,
    stall: bool,
    fail_call: Option<&'static str>,
    missing_points: usize,
    calls: Vec<&'static str>,
    patterns: HashMap<String, Pattern>,
    sequences: BTreeMap<i32, Vec<(String, u32)>>,
    session: Option<String>,
    connected: HashSet<i32>,
    operation_modes: HashMap<i32, OperationMode>,
    measure_modes: HashMap<i32, MeasureMode>,
    timelines: HashMap<i32, Timeline>,
    results: HashMap<i32, Vec<(f64, f64)>>,
    execution: Execution,
    polls: u32,
    sessions_opened: usize,
    sessions_closed: usize,
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new(SimulatedCell::default())
    }
}

impl SimulatedDriver {
    pub fn new(cell: SimulatedCell) -> SimulatedDriver {
        SimulatedDriver {
            cell,
            running_polls: 0,
            stall: false,
            fail_call: None,
            missing_points: 0,
            calls: Vec::new(),
            patterns: HashMap::new(),
            sequences: BTreeMap::new(),
            session: None,
            connected: HashSet::new(),
            operation_modes: HashMap::new(),
            measure_modes: HashMap::new(),
            timelines: HashMap::new(),
            results: HashMap::new(),
            execution: Execution::Idle,
            polls: 0,
            sessions_opened: 0,
            sessions_closed: 0,
        }
    }

    /// Report `Running` for this many status polls before the sequence completes.
    pub fn with_running_polls(mut self, polls: u32) -> SimulatedDriver {
        self.running_polls = polls;
        self
    }

    /// Never complete an execution.
    pub fn with_stall(mut self) -> SimulatedDriver {
        self.stall = true;
        self
    }

    /// Fail the first call of the vendor function named `call`.
    pub fn with_failure(mut self, call: &'static str) -> SimulatedDriver {
        self.fail_call = Some(call);
        self
    }

    /// Report `count` fewer measured points than were requested.
    pub fn with_missing_points(mut self, count: usize) -> SimulatedDriver {
        self.missing_points = count;
        self
    }

    /// Vendor names of all calls made so far, in order. Per-point readback calls are left out.
    pub fn calls(&self) -> &[&'static str] {
        &self.calls
    }

    pub fn session_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.sessions_closed
    }

    fn enter(&mut self, call: &'static str) -> DriverResult<()> {
        self.calls.push(call);
        self.enter_point(call)
    }

    fn enter_point(&mut self, call: &'static str) -> DriverResult<()> {
        if self.fail_call == Some(call) {
            self.fail_call = None;
            return Err(DriverError::new(call, INJECTED_ERROR, "injected failure"))
        }
        Ok(())
    }

    fn require_session(&self, call: &'static str) -> DriverResult<()> {
        match self.session {
            Some(_) => Ok(()),
            None => Err(DriverError::new(call, STATE_ERROR, "no open session")),
        }
    }

    fn pattern_mut(&mut self, call: &'static str, name: &str) -> DriverResult<&mut Pattern> {
        self.patterns.get_mut(name)
            .ok_or_else(|| DriverError::new(call, PARAMETER_ERROR, format!("no pattern {:?}", name)))
    }

    fn run(&mut self) {
        self.timelines.clear();
        self.results.clear();

        let mut events = Vec::new();
        for (&channel, sequence) in self.sequences.iter() {
            let mut timeline = Timeline::default();
            let mut offset = 0.0;
            for (name, loop_count) in sequence.iter() {
                let pattern = &self.patterns[name];
                for _ in 0..*loop_count {
                    timeline.push(offset, pattern);
                    for event in pattern.events.iter() {
                        events.push((channel, offset, event.clone()));
                    }
                    offset += pattern.duration();
                }
            }
            self.timelines.insert(channel, timeline);
        }

        let mut cell = self.cell;
        for (channel, offset, event) in events {
            let mode = self.measure_modes.get(&channel).copied().unwrap_or(MeasureMode::Voltage);
            let own = &self.timelines[&channel];
            let other = self.timelines.iter()
                .find(|&(&other, _)| other != channel && self.connected.contains(&other))
                .map(|(_, timeline)| timeline);
            let samples = self.results.entry(channel).or_default();
            for index in 0..event.points {
                let time = offset + event.time + index as f64 * event.interval;
                let value = match (mode, other) {
                    (MeasureMode::Voltage, _) => own.voltage_at(time),
                    (MeasureMode::Current, Some(other)) =>
                        cell.apply(other.voltage_at(time) - own.voltage_at(time)),
                    (MeasureMode::Current, None) => 0.0,
                };
                samples.push((time, value));
            }
        }
        self.cell = cell;
    }
}

impl Driver for SimulatedDriver {
    fn clear(&mut self) -> DriverResult<()> {
        self.enter("WGFMU_clear")?;
        self.patterns.clear();
        self.sequences.clear();
        self.timelines.clear();
        self.results.clear();
        self.execution = Execution::Idle;
        Ok(())
    }

    fn create_pattern(&mut self, pattern: &str, initial_voltage: f64) -> DriverResult<()> {
        self.enter("WGFMU_createPattern")?;
        if self.patterns.contains_key(pattern) {
            return Err(DriverError::new("WGFMU_createPattern", PARAMETER_ERROR,
                format!("pattern {:?} already exists", pattern)))
        }
        self.patterns.insert(pattern.to_owned(), Pattern {
            vectors: vec![(0.0, initial_voltage)],
            events: Vec::new(),
        });
        Ok(())
    }

    fn add_vector(&mut self, pattern: &str, delta_time: f64, voltage: f64) -> DriverResult<()> {
        self.enter("WGFMU_addVector")?;
        if !(delta_time > 0.0) {
            return Err(DriverError::new("WGFMU_addVector", PARAMETER_ERROR,
                format!("delta time {} is not positive", delta_time)))
        }
        let pattern = self.pattern_mut("WGFMU_addVector", pattern)?;
        let time = pattern.duration() + delta_time;
        pattern.vectors.push((time, voltage));
        Ok(())
    }

    fn set_vector(&mut self, pattern: &str, time: f64, voltage: f64) -> DriverResult<()> {
        self.enter("WGFMU_setVector")?;
        if !(time > 0.0) {
            return Err(DriverError::new("WGFMU_setVector", PARAMETER_ERROR,
                format!("time {} is not positive", time)))
        }
        let pattern = self.pattern_mut("WGFMU_setVector", pattern)?;
        pattern.vectors.retain(|&(t, _)| t != time);
        let index = pattern.vectors.partition_point(|&(t, _)| t < time);
        pattern.vectors.insert(index, (time, voltage));
        Ok(())
    }

    fn set_measure_event(&mut self, pattern: &str, _event: &str, time: f64, points: usize,
                         interval: f64, _averaging_time: f64, _data: MeasureEventData)
                         -> DriverResult<()> {
        self.enter("WGFMU_setMeasureEvent")?;
        if points == 0 || !(interval > 0.0) || time < 0.0 {
            return Err(DriverError::new("WGFMU_setMeasureEvent", PARAMETER_ERROR,
                format!("invalid event: {} points every {} s at {} s", points, interval, time)))
        }
        let pattern = self.pattern_mut("WGFMU_setMeasureEvent", pattern)?;
        pattern.events.push(MeasureEvent { time, points, interval });
        Ok(())
    }

    fn add_sequence(&mut self, channel: i32, pattern: &str, loop_count: f64) -> DriverResult<()> {
        self.enter("WGFMU_addSequence")?;
        if !self.patterns.contains_key(pattern) {
            return Err(DriverError::new("WGFMU_addSequence", PARAMETER_ERROR,
                format!("no pattern {:?}", pattern)))
        }
        if !(loop_count >= 1.0) {
            return Err(DriverError::new("WGFMU_addSequence", PARAMETER_ERROR,
                format!("loop count {} is below 1", loop_count)))
        }
        self.sequences.entry(channel).or_default().push((pattern.to_owned(), loop_count as u32));
        Ok(())
    }

    fn open_session(&mut self, address: &str) -> DriverResult<()> {
        self.enter("WGFMU_openSession")?;
        if let Some(open) = &self.session {
            return Err(DriverError::new("WGFMU_openSession", STATE_ERROR,
                format!("session to {} already open", open)))
        }
        self.session = Some(address.to_owned());
        self.sessions_opened += 1;
        Ok(())
    }

    fn close_session(&mut self) -> DriverResult<()> {
        self.enter("WGFMU_closeSession")?;
        self.require_session("WGFMU_closeSession")?;
        self.session = None;
        self.connected.clear();
        self.operation_modes.clear();
        self.measure_modes.clear();
        self.sessions_closed += 1;
        Ok(())
    }

    fn initialize(&mut self) -> DriverResult<()> {
        self.enter("WGFMU_initialize")?;
        self.require_session("WGFMU_initialize")?;
        self.connected.clear();
        Ok(())
    }

    fn set_operation_mode(&mut self, channel: i32, mode: OperationMode) -> DriverResult<()> {
        self.enter("WGFMU_setOperationMode")?;
        self.require_session("WGFMU_setOperationMode")?;
        self.operation_modes.insert(channel, mode);
        Ok(())
    }

    fn set_measure_mode(&mut self, channel: i32, mode: MeasureMode) -> DriverResult<()> {
        self.enter("WGFMU_setMeasureMode")?;
        self.require_session("WGFMU_setMeasureMode")?;
        self.measure_modes.insert(channel, mode);
        Ok(())
    }

    fn connect(&mut self, channel: i32) -> DriverResult<()> {
        self.enter("WGFMU_connect")?;
        self.require_session("WGFMU_connect")?;
        self.connected.insert(channel);
        Ok(())
    }

    fn execute(&mut self) -> DriverResult<()> {
        self.enter("WGFMU_execute")?;
        self.require_session("WGFMU_execute")?;
        if let Some(&channel) = self.sequences.keys().find(|&&channel| !self.connected.contains(&channel)) {
            return Err(DriverError::new("WGFMU_execute", STATE_ERROR,
                format!("channel {} is not connected", channel)))
        }
        for &channel in self.sequences.keys() {
            match self.operation_modes.get(&channel).copied().unwrap_or(OperationMode::Pg) {
                OperationMode::FastIv | OperationMode::Pg => (),
                mode => return Err(DriverError::new("WGFMU_execute", STATE_ERROR,
                    format!("channel {} cannot run sequences in {:?} mode", channel, mode))),
            }
        }
        self.run();
        self.polls = 0;
        self.execution = Execution::Running { polls_left: self.running_polls };
        Ok(())
    }

    fn status(&mut self) -> DriverResult<Progress> {
        self.enter("WGFMU_getStatus")?;
        self.require_session("WGFMU_getStatus")?;
        let total = self.timelines.values()
            .filter_map(|timeline| timeline.vectors.last().map(|&(time, _)| time))
            .fold(0.0, f64::max);
        self.polls += 1;
        let execution = self.execution;
        let status = match execution {
            Execution::Idle => Status::Idle,
            Execution::Running { .. } if self.stall => Status::Running,
            Execution::Running { polls_left: 0 } => {
                self.execution = Execution::Completed;
                Status::Completed
            }
            Execution::Running { polls_left } => {
                self.execution = Execution::Running { polls_left: polls_left - 1 };
                Status::Running
            }
            Execution::Completed => Status::Completed,
            Execution::Aborted => Status::AbortCompleted,
        };
        let elapsed = match status {
            Status::Running => total * (self.polls as f64 / (self.running_polls + 1) as f64).min(1.0),
            _ => total,
        };
        Ok(Progress { status, elapsed, total })
    }

    fn abort(&mut self) -> DriverResult<()> {
        self.enter("WGFMU_abort")?;
        self.require_session("WGFMU_abort")?;
        self.execution = Execution::Aborted;
        Ok(())
    }

    fn measure_value_size(&mut self, channel: i32) -> DriverResult<MeasureSize> {
        self.enter("WGFMU_getMeasureValueSize")?;
        self.require_session("WGFMU_getMeasureValueSize")?;
        let total = self.results.get(&channel).map(Vec::len).unwrap_or(0);
        let measured = match self.execution {
            Execution::Completed => total.saturating_sub(self.missing_points),
            _ => 0,
        };
        Ok(MeasureSize { measured, total })
    }

    fn measure_value(&mut self, channel: i32, index: usize) -> DriverResult<(f64, f64)> {
        self.enter_point("WGFMU_getMeasureValue")?;
        self.require_session("WGFMU_getMeasureValue")?;
        self.results.get(&channel)
            .and_then(|samples| samples.get(index))
            .copied()
            .ok_or_else(|| DriverError::new("WGFMU_getMeasureValue", PARAMETER_ERROR,
                format!("no point {} on channel {}", index, channel)))
    }

    fn interpolated_force_value(&mut self, channel: i32, time: f64) -> DriverResult<f64> {
        self.enter_point("WGFMU_getInterpolatedForceValue")?;
        self.require_session("WGFMU_getInterpolatedForceValue")?;
        self.timelines.get(&channel)
            .map(|timeline| timeline.voltage_at(time))
            .ok_or_else(|| DriverError::new("WGFMU_getInterpolatedForceValue", PARAMETER_ERROR,
                format!("no sequence on channel {}", channel)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn program_ramp(driver: &mut SimulatedDriver) {
        driver.clear().unwrap();
        driver.create_pattern("v1", 0.0).unwrap();
        driver.add_vector("v1", 1.0, 1.0).unwrap();
        driver.add_vector("v1", 1.0, 0.0).unwrap();
        driver.set_measure_event("v1", "evt", 0.0, 4, 0.5, 1e-6, MeasureEventData::Averaged).unwrap();
        driver.add_sequence(101, "v1", 1.0).unwrap();
        driver.create_pattern("v2", 0.0).unwrap();
        driver.set_vector("v2", 2.0, 0.0).unwrap();
        driver.set_measure_event("v2", "evt_curr", 0.0, 4, 0.5, 1e-6, MeasureEventData::Averaged).unwrap();
        driver.add_sequence(102, "v2", 1.0).unwrap();
    }

    #[test]
    fn test_timeline_interpolation() {
        let timeline = Timeline { vectors: vec![(0.0, 0.0), (1.0, 2.0), (3.0, -2.0)] };
        assert_eq!(timeline.voltage_at(-1.0), 0.0);
        assert_eq!(timeline.voltage_at(0.5), 1.0);
        assert_eq!(timeline.voltage_at(1.0), 2.0);
        assert_eq!(timeline.voltage_at(2.0), 0.0);
        assert_eq!(timeline.voltage_at(5.0), -2.0);
    }

    #[test]
    fn test_execute_requires_session_and_connection() {
        let mut driver = SimulatedDriver::default();
        program_ramp(&mut driver);
        assert_eq!(driver.execute().unwrap_err().code, STATE_ERROR);
        driver.open_session("b1500gpib").unwrap();
        driver.connect(101).unwrap();
        assert_eq!(driver.execute().unwrap_err().code, STATE_ERROR);
        driver.connect(102).unwrap();
        driver.execute().unwrap();
        assert_eq!(driver.status().unwrap().status, Status::Completed);
        driver.close_session().unwrap();
        assert!(!driver.session_open());
        assert_eq!(driver.sessions_opened(), 1);
        assert_eq!(driver.sessions_closed(), 1);
    }

    #[test]
    fn test_measure_current_through_cell() {
        let mut driver = SimulatedDriver::new(SimulatedCell {
            set_threshold: 10.0, // never switch
            ..Default::default()
        });
        program_ramp(&mut driver);
        driver.open_session("b1500gpib").unwrap();
        driver.set_measure_mode(102, MeasureMode::Current).unwrap();
        driver.connect(101).unwrap();
        driver.connect(102).unwrap();
        driver.execute().unwrap();
        // points are only reported once the sequence completed
        assert_eq!(driver.measure_value_size(102).unwrap(), MeasureSize { measured: 0, total: 4 });
        assert_eq!(driver.status().unwrap().status, Status::Completed);
        assert_eq!(driver.measure_value_size(102).unwrap(), MeasureSize { measured: 4, total: 4 });
        let (time, current) = driver.measure_value(102, 2).unwrap();
        assert_eq!(time, 1.0);
        assert_eq!(current, 1.0 / 100e3);
        assert_eq!(driver.interpolated_force_value(101, 0.5).unwrap(), 0.5);
        assert!(driver.measure_value(102, 4).is_err());
    }

    #[test]
    fn test_cell_switches() {
        let mut cell = SimulatedCell::default();
        assert_eq!(cell.apply(0.1), 0.1 / 100e3);
        assert_eq!(cell.apply(0.5), 0.5 / 1e3);
        assert_eq!(cell.apply(0.1), 0.1 / 1e3);
        assert_eq!(cell.apply(-1.0), -1.0 / 100e3);
    }

    #[test]
    fn test_running_polls_and_stall() {
        let mut driver = SimulatedDriver::default().with_running_polls(2);
        program_ramp(&mut driver);
        driver.open_session("b1500gpib").unwrap();
        driver.connect(101).unwrap();
        driver.connect(102).unwrap();
        driver.execute().unwrap();
        assert_eq!(driver.status().unwrap().status, Status::Running);
        assert_eq!(driver.status().unwrap().status, Status::Running);
        assert_eq!(driver.status().unwrap().status, Status::Completed);

        driver.stall = true;
        driver.execute().unwrap();
        for _ in 0..10 {
            assert_eq!(driver.status().unwrap().status, Status::Running);
        }
        driver.abort().unwrap();
        assert_eq!(driver.status().unwrap().status, Status::AbortCompleted);
    }

    #[test]
    fn test_injected_failure() {
        let mut driver = SimulatedDriver::default().with_failure("WGFMU_openSession");
        let error = driver.open_session("b1500gpib").unwrap_err();
        assert_eq!(error.call, "WGFMU_openSession");
        assert_eq!(error.code, INJECTED_ERROR);
        driver.open_session("b1500gpib").unwrap();
        assert_eq!(driver.calls(), &["WGFMU_openSession", "WGFMU_openSession"]);
    }

    #[test]
    fn test_point_readback_is_not_recorded() {
        let mut driver = SimulatedDriver::default().with_failure("WGFMU_getInterpolatedForceValue");
        program_ramp(&mut driver);
        driver.open_session("b1500gpib").unwrap();
        driver.connect(101).unwrap();
        driver.connect(102).unwrap();
        driver.execute().unwrap();
        driver.status().unwrap();
        let recorded = driver.calls().len();
        for index in 0..4 {
            driver.measure_value(102, index).unwrap();
        }
        assert_eq!(driver.interpolated_force_value(101, 0.5).unwrap_err().code, INJECTED_ERROR);
        assert_eq!(driver.interpolated_force_value(101, 0.5).unwrap(), 0.5);
        assert_eq!(driver.calls().len(), recorded);
        assert_eq!(driver.calls().last(), Some(&"WGFMU_getStatus"));
    }
}
