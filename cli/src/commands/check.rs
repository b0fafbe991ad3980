use opsbot_core::api::{CliError, Engine};

/// Prints every task with its state and the schedule that would be installed.
/// Returns 1 when anything is disabled or skipped.
pub async fn run(engine: &Engine) -> Result<i32, CliError> {
    let tasks = engine.tasks().snapshot();
    let mut problems = 0;
    for task in tasks.iter() {
        let kind = if task.is_job() { "job" } else { "plugin" };
        if task.base.disabled {
            problems += 1;
            println!("{kind:6} {:24} disabled: {}", task.name(), task.base.reason);
        } else {
            println!("{kind:6} {:24} ok", task.name());
        }
    }

    let report = engine.start_scheduler().await;
    engine.stop_scheduler().await;
    for name in &report.scheduled {
        println!("schedule {name:22} ok");
    }
    for (name, reason) in &report.skipped {
        problems += 1;
        println!("schedule {name:22} skipped: {reason}");
    }
    Ok(if problems > 0 { 1 } else { 0 })
}
