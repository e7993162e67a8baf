//! Task commands.
//!
//! Each state-changing command prints the task's state as observed right
//! after the action.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use initprobe_core::instance::InitInstance;
use initprobe_core::task::{AddTaskOptions, Task, TaskState};

use super::print_json;

/// List loaded tasks.
pub fn list(instance: &InitInstance<'_>, json: bool) -> Result<()> {
    let entries = instance.tasks().list().context("failed to list tasks")?;
    if json {
        return print_json(&entries);
    }

    if entries.is_empty() {
        println!("No tasks loaded");
        return Ok(());
    }
    println!("{:<32} {:>8}", "NAME", "PID");
    for entry in &entries {
        println!("{:<32} {:>8}", entry.name, entry.pid);
    }
    Ok(())
}

/// Show the state of a task.
pub fn status(instance: &InitInstance<'_>, name: &str, json: bool) -> Result<()> {
    let task = instance
        .tasks()
        .query_state(name)
        .with_context(|| format!("failed to query task '{name}'"))?;
    print_task(&task, json)
}

/// Enable a task.
pub fn enable(instance: &InitInstance<'_>, name: &str, json: bool) -> Result<()> {
    let task = instance
        .tasks()
        .enable(name)
        .with_context(|| format!("failed to enable task '{name}'"))?;
    print_task(&task, json)
}

/// Disable a task.
pub fn disable(instance: &InitInstance<'_>, name: &str, json: bool) -> Result<()> {
    let task = instance
        .tasks()
        .disable(name)
        .with_context(|| format!("failed to disable task '{name}'"))?;
    print_task(&task, json)
}

/// Stop a task's process.
pub fn stop(instance: &InitInstance<'_>, name: &str, json: bool) -> Result<()> {
    let task = instance
        .tasks()
        .stop(name)
        .with_context(|| format!("failed to stop task '{name}'"))?;
    print_task(&task, json)
}

/// Kill a task's process.
pub fn kill(instance: &InitInstance<'_>, name: &str, json: bool) -> Result<()> {
    let task = instance
        .tasks()
        .kill(name)
        .with_context(|| format!("failed to kill task '{name}'"))?;
    print_task(&task, json)
}

/// Restart a task that is done or failed.
pub fn restart(instance: &InitInstance<'_>, name: &str, json: bool) -> Result<()> {
    let task = instance
        .tasks()
        .restart(name)
        .with_context(|| format!("failed to restart task '{name}'"))?;
    print_task(&task, json)
}

/// Load a task configuration file present on the target.
pub fn add_task(instance: &InitInstance<'_>, file: &Path, options: &AddTaskOptions) -> Result<()> {
    instance
        .add_task(file, options)
        .with_context(|| format!("failed to add task from {}", file.display()))?;
    println!("Task configuration {} loaded", file.display());
    Ok(())
}

/// Send a notification on behalf of a task.
pub fn notify(instance: &InitInstance<'_>, name: &str, message: &str, json: bool) -> Result<()> {
    let task = instance
        .tasks()
        .notify(name, message)
        .with_context(|| format!("failed to notify for task '{name}'"))?;
    print_task(&task, json)
}

/// Wait until a task reaches `state`.
pub fn await_state(
    instance: &InitInstance<'_>,
    name: &str,
    state: &str,
    timeout: Duration,
    json: bool,
) -> Result<()> {
    let expected = TaskState::from_word(state);
    let task = instance
        .tasks()
        .await_state(name, &expected, timeout)
        .with_context(|| format!("task '{name}' did not become {expected}"))?;
    print_task(&task, json)
}

fn print_task(task: &Task, json: bool) -> Result<()> {
    if json {
        return print_json(task);
    }
    println!("{}", describe_task(task));
    Ok(())
}

fn describe_task(task: &Task) -> String {
    if task.has_pid() {
        format!("{}: {} (pid {})", task.name, task.state, task.pid)
    } else {
        format!("{}: {}", task.name, task.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_task_with_pid() {
        let task = Task {
            name: "web".to_string(),
            pid: 42,
            state: TaskState::Running,
        };
        assert_eq!(describe_task(&task), "web: running (pid 42)");
    }

    #[test]
    fn test_describe_task_without_pid() {
        assert_eq!(describe_task(&Task::unknown("ghost")), "ghost: unknown");
    }
}
