//! Platform drivers: core-pinned task spawning and the task watchdog.

pub mod task_pin;
pub mod watchdog;
