use std::path::PathBuf;
use std::time::Duration;

use wgfmu_ramp::{Device, ExperimentConfig, OverflowPolicy, SweepPlan};

fn run() -> wgfmu_ramp::Result<()> {
    let plan = SweepPlan {
        speeds: vec![
            // 0.1,
            1.0,
            // 100.0,
            // 500.0,
            // 1000.0,
        ],
        cycles: 5,
        output_base: std::env::args_os().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
        inter_cycle_delay: Duration::from_millis(1000),
        overflow_policy: OverflowPolicy::SkipSpeed,
    };
    let mut device = Device::new();
    let report = wgfmu_ramp::measure_ramps(&mut device, &ExperimentConfig::default(), &plan)?;
    print!("{}", report);
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(error) = run() {
        eprintln!("error: {}", error);
        std::process::exit(1)
    }
}
