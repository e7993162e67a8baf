//! Init instance lifecycle commands.
//!
//! - `initprobe start` - start crinit and wait for its control socket
//! - `initprobe stop` - tear down every task, then stop crinit
//! - `initprobe is-running` - exit 0 if crinit is running
//! - `initprobe teardown` - disable and kill every task with a process
//! - `initprobe reboot` / `initprobe poweroff`

use anyhow::{Context, Result, bail};
use initprobe_core::instance::{InitInstance, StartOutcome, StopOutcome};
use initprobe_core::teardown::TeardownReport;

use super::print_json;

/// Start the instance unless it is already running.
pub fn start(instance: &InitInstance<'_>) -> Result<()> {
    let outcome = instance.start().context("failed to start init instance")?;
    match outcome {
        StartOutcome::AlreadyRunning => println!("Init instance already running"),
        StartOutcome::Started(ready) => println!(
            "Init instance started: control socket ready after {} poll(s) ({}ms)",
            ready.polls,
            ready.elapsed.as_millis()
        ),
    }
    Ok(())
}

/// Tear down every task and stop the instance.
pub fn stop(instance: &InitInstance<'_>, json: bool) -> Result<()> {
    let outcome = instance.stop().context("failed to stop init instance")?;
    if json {
        return print_json(&outcome);
    }
    match outcome {
        StopOutcome::NotRunning => println!("Init instance not running"),
        StopOutcome::Stopped(report) => {
            print_report(&report);
            println!("Init instance stopped");
        },
    }
    Ok(())
}

/// Succeed only if the instance is running.
pub fn is_running(instance: &InitInstance<'_>) -> Result<()> {
    let running = instance
        .is_running()
        .context("failed to check for init instance")?;
    if !running {
        bail!("init instance is not running");
    }
    println!("Init instance running");
    Ok(())
}

/// Disable and kill every task that has a process.
pub fn teardown(instance: &InitInstance<'_>, json: bool) -> Result<()> {
    let report = instance
        .teardown()
        .teardown_all()
        .context("failed to tear down tasks")?;
    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

/// Ask the instance to reboot the target.
pub fn reboot(instance: &InitInstance<'_>) -> Result<()> {
    instance.reboot().context("failed to request reboot")?;
    println!("Reboot requested");
    Ok(())
}

/// Ask the instance to power the target off.
pub fn poweroff(instance: &InitInstance<'_>) -> Result<()> {
    instance.poweroff().context("failed to request poweroff")?;
    println!("Poweroff requested");
    Ok(())
}

fn print_report(report: &TeardownReport) {
    if report.stopped.is_empty() {
        println!("No running tasks");
    }
    for name in &report.stopped {
        println!("  stopped  {name}");
    }
    for name in &report.skipped {
        println!("  skipped  {name}");
    }
}
