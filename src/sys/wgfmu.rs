use std::ffi::CString;
use libc::{c_char, c_double, c_int};

use super::{DriverError, DriverResult, MeasureEventData, MeasureMode, MeasureSize, OperationMode};
use super::{Progress, Status};

const WGFMU_NO_ERROR: c_int = 0;

#[link(name = "wgfmu")]
extern "system" {
    fn WGFMU_openSession(address: *const c_char) -> c_int;
    fn WGFMU_closeSession() -> c_int;
    fn WGFMU_initialize() -> c_int;
    fn WGFMU_clear() -> c_int;
    fn WGFMU_getErrorSize(size: *mut c_int) -> c_int;
    fn WGFMU_getError(error: *mut c_char, size: *mut c_int) -> c_int;

    fn WGFMU_createPattern(pattern: *const c_char, initial_voltage: c_double) -> c_int;
    fn WGFMU_addVector(pattern: *const c_char, delta_time: c_double, voltage: c_double) -> c_int;
    fn WGFMU_setVector(pattern: *const c_char, time: c_double, voltage: c_double) -> c_int;
    fn WGFMU_setMeasureEvent(pattern: *const c_char, event: *const c_char, time: c_double,
                             points: c_int, interval: c_double, average: c_double,
                             rdata: c_int) -> c_int;
    fn WGFMU_addSequence(channel: c_int, pattern: *const c_char, loop_count: c_double) -> c_int;

    fn WGFMU_setOperationMode(channel: c_int, mode: c_int) -> c_int;
    fn WGFMU_setMeasureMode(channel: c_int, mode: c_int) -> c_int;
    fn WGFMU_connect(channel: c_int) -> c_int;

    fn WGFMU_execute() -> c_int;
    fn WGFMU_abort() -> c_int;
    fn WGFMU_getStatus(status: *mut c_int, elapsed: *mut c_double, total: *mut c_double) -> c_int;

    fn WGFMU_getMeasureValueSize(channel: c_int, measured: *mut c_int, total: *mut c_int) -> c_int;
    fn WGFMU_getMeasureValue(channel: c_int, index: c_int, time: *mut c_double,
                             value: *mut c_double) -> c_int;
    fn WGFMU_getInterpolatedForceValue(channel: c_int, time: c_double,
                                       value: *mut c_double) -> c_int;
}

fn c_string(call: &'static str, value: &str) -> DriverResult<CString> {
    CString::new(value)
        .map_err(|_| DriverError::new(call, -1, format!("{:?} contains a NUL byte", value)))
}

fn c_count(call: &'static str, value: usize) -> DriverResult<c_int> {
    c_int::try_from(value)
        .map_err(|_| DriverError::new(call, -1, format!("{} does not fit the driver", value)))
}

/// Binding to the WGFMU instrument library.
///
/// The library keeps a single implicit session per process; this type only stands for it.
#[derive(Debug, Default)]
pub struct WgfmuDriverImpl {
    _private: (),
}

impl WgfmuDriverImpl {
    pub fn new() -> WgfmuDriverImpl {
        WgfmuDriverImpl { _private: () }
    }

    fn check(&self, call: &'static str, code: c_int) -> DriverResult<()> {
        if code == WGFMU_NO_ERROR {
            log::trace!("{}() = ok", call);
            Ok(())
        } else {
            let message = self.error_message();
            log::trace!("{}() = {} ({})", call, code, message);
            Err(DriverError::new(call, code, message))
        }
    }

    fn error_message(&self) -> String {
        unsafe {
            let mut size: c_int = 0;
            if WGFMU_getErrorSize(&mut size) != WGFMU_NO_ERROR || size <= 0 {
                return String::new()
            }
            let mut buffer = vec![0u8; size as usize + 1];
            let mut size = buffer.len() as c_int;
            if WGFMU_getError(buffer.as_mut_ptr() as *mut c_char, &mut size) != WGFMU_NO_ERROR {
                return String::new()
            }
            let end = buffer.iter().position(|&byte| byte == 0).unwrap_or(buffer.len());
            String::from_utf8_lossy(&buffer[..end]).trim().to_owned()
        }
    }
}

impl super::Driver for WgfmuDriverImpl {
    fn clear(&mut self) -> DriverResult<()> {
        self.check("WGFMU_clear", unsafe { WGFMU_clear() })
    }

    fn create_pattern(&mut self, pattern: &str, initial_voltage: f64) -> DriverResult<()> {
        let pattern = c_string("WGFMU_createPattern", pattern)?;
        self.check("WGFMU_createPattern", unsafe {
            WGFMU_createPattern(pattern.as_ptr(), initial_voltage)
        })
    }

    fn add_vector(&mut self, pattern: &str, delta_time: f64, voltage: f64) -> DriverResult<()> {
        let pattern = c_string("WGFMU_addVector", pattern)?;
        self.check("WGFMU_addVector", unsafe {
            WGFMU_addVector(pattern.as_ptr(), delta_time, voltage)
        })
    }

    fn set_vector(&mut self, pattern: &str, time: f64, voltage: f64) -> DriverResult<()> {
        let pattern = c_string("WGFMU_setVector", pattern)?;
        self.check("WGFMU_setVector", unsafe {
            WGFMU_setVector(pattern.as_ptr(), time, voltage)
        })
    }

    fn set_measure_event(&mut self, pattern: &str, event: &str, time: f64, points: usize,
                         interval: f64, averaging_time: f64, data: MeasureEventData)
                         -> DriverResult<()> {
        let pattern = c_string("WGFMU_setMeasureEvent", pattern)?;
        let event = c_string("WGFMU_setMeasureEvent", event)?;
        let points = c_count("WGFMU_setMeasureEvent", points)?;
        self.check("WGFMU_setMeasureEvent", unsafe {
            WGFMU_setMeasureEvent(pattern.as_ptr(), event.as_ptr(), time, points, interval,
                                  averaging_time, data.wgfmu_code())
        })
    }

    fn add_sequence(&mut self, channel: i32, pattern: &str, loop_count: f64) -> DriverResult<()> {
        let pattern = c_string("WGFMU_addSequence", pattern)?;
        self.check("WGFMU_addSequence", unsafe {
            WGFMU_addSequence(channel, pattern.as_ptr(), loop_count)
        })
    }

    fn open_session(&mut self, address: &str) -> DriverResult<()> {
        let address = c_string("WGFMU_openSession", address)?;
        self.check("WGFMU_openSession", unsafe { WGFMU_openSession(address.as_ptr()) })
    }

    fn close_session(&mut self) -> DriverResult<()> {
        self.check("WGFMU_closeSession", unsafe { WGFMU_closeSession() })
    }

    fn initialize(&mut self) -> DriverResult<()> {
        self.check("WGFMU_initialize", unsafe { WGFMU_initialize() })
    }

    fn set_operation_mode(&mut self, channel: i32, mode: OperationMode) -> DriverResult<()> {
        self.check("WGFMU_setOperationMode", unsafe {
            WGFMU_setOperationMode(channel, mode.wgfmu_code())
        })
    }

    fn set_measure_mode(&mut self, channel: i32, mode: MeasureMode) -> DriverResult<()> {
        self.check("WGFMU_setMeasureMode", unsafe {
            WGFMU_setMeasureMode(channel, mode.wgfmu_code())
        })
    }

    fn connect(&mut self, channel: i32) -> DriverResult<()> {
        self.check("WGFMU_connect", unsafe { WGFMU_connect(channel) })
    }

    fn execute(&mut self) -> DriverResult<()> {
        self.check("WGFMU_execute", unsafe { WGFMU_execute() })
    }

    fn status(&mut self) -> DriverResult<Progress> {
        let mut code: c_int = 0;
        let mut elapsed: c_double = 0.0;
        let mut total: c_double = 0.0;
        self.check("WGFMU_getStatus", unsafe {
            WGFMU_getStatus(&mut code, &mut elapsed, &mut total)
        })?;
        let status = Status::from_wgfmu_code(code)
            .ok_or_else(|| DriverError::new("WGFMU_getStatus", code, "unknown status"))?;
        Ok(Progress { status, elapsed, total })
    }

    fn abort(&mut self) -> DriverResult<()> {
        self.check("WGFMU_abort", unsafe { WGFMU_abort() })
    }

    fn measure_value_size(&mut self, channel: i32) -> DriverResult<MeasureSize> {
        let mut measured: c_int = 0;
        let mut total: c_int = 0;
        self.check("WGFMU_getMeasureValueSize", unsafe {
            WGFMU_getMeasureValueSize(channel, &mut measured, &mut total)
        })?;
        Ok(MeasureSize { measured: measured.max(0) as usize, total: total.max(0) as usize })
    }

    fn measure_value(&mut self, channel: i32, index: usize) -> DriverResult<(f64, f64)> {
        let index = c_count("WGFMU_getMeasureValue", index)?;
        let mut time: c_double = 0.0;
        let mut value: c_double = 0.0;
        self.check("WGFMU_getMeasureValue", unsafe {
            WGFMU_getMeasureValue(channel, index, &mut time, &mut value)
        })?;
        Ok((time, value))
    }

    fn interpolated_force_value(&mut self, channel: i32, time: f64) -> DriverResult<f64> {
        let mut value: c_double = 0.0;
        self.check("WGFMU_getInterpolatedForceValue", unsafe {
            WGFMU_getInterpolatedForceValue(channel, time, &mut value)
        })?;
        Ok(value)
    }
}
