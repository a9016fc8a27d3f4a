//! Fixed-point conversion helpers

use anyhow::{Context, Result};
use colored::Colorize;
use distribution_model::{from_fixed, to_fixed, Fixed18};

pub fn to(value: f64) -> Result<()> {
    let fixed = to_fixed(value).with_context(|| format!("Cannot encode {}", value))?;
    println!("{} {}", "SD59x18:".bright_cyan(), fixed.raw());
    Ok(())
}

pub fn from(raw: &str) -> Result<()> {
    let fixed: Fixed18 = raw.parse().with_context(|| format!("Invalid fixed-point integer: {}", raw))?;
    println!("{} {}", "Exact:".bright_cyan(), fixed);
    println!("{} {}", "Display:".bright_cyan(), from_fixed(&fixed));
    Ok(())
}
