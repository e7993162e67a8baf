//! CLI command implementations.

use anyhow::{Context, Result};
use serde::Serialize;

pub mod caps;
pub mod config;
pub mod instance;
pub mod task;

/// Prints `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{text}");
    Ok(())
}
