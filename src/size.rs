//! Byte budgets and human-readable sizes.
//!
//! Both use binary multipliers: 1 KB = 1024 bytes, 1 MB = 1024 * 1024 bytes.

use std::fmt;
use std::str::FromStr;

use crate::error::{CompressError, Result};

pub const KB: u64 = 1024;
pub const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    Kb,
    Mb,
}

impl SizeUnit {
    pub fn multiplier(&self) -> u64 {
        match self {
            SizeUnit::Kb => KB,
            SizeUnit::Mb => MB,
        }
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeUnit::Kb => f.write_str("KB"),
            SizeUnit::Mb => f.write_str("MB"),
        }
    }
}

impl FromStr for SizeUnit {
    type Err = CompressError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kb" | "k" => Ok(SizeUnit::Kb),
            "mb" | "m" => Ok(SizeUnit::Mb),
            other => Err(CompressError::InvalidBudget(format!("unknown unit '{}'", other))),
        }
    }
}

/// A maximum output size as entered by a user, e.g. `50 KB`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Budget {
    pub amount: f64,
    pub unit: SizeUnit,
}

impl Budget {
    pub fn new(amount: f64, unit: SizeUnit) -> Self {
        Self { amount, unit }
    }

    pub fn kb(amount: f64) -> Self {
        Self::new(amount, SizeUnit::Kb)
    }

    pub fn mb(amount: f64) -> Self {
        Self::new(amount, SizeUnit::Mb)
    }

    /// The budget in bytes, rounded down. Fails unless it is at least one byte.
    pub fn to_bytes(&self) -> Result<u64> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(CompressError::InvalidBudget(format!(
                "{} {} is not a positive size",
                self.amount, self.unit
            )));
        }
        let bytes = (self.amount * self.unit.multiplier() as f64).floor() as u64;
        if bytes == 0 {
            return Err(CompressError::InvalidBudget(format!(
                "{} {} is less than one byte",
                self.amount, self.unit
            )));
        }
        Ok(bytes)
    }
}

/// Render a byte count as `N bytes`, `N.NN KB` or `N.NN MB`.
pub fn format_file_size(size_bytes: u64) -> String {
    if size_bytes >= MB {
        format!("{:.2} MB", size_bytes as f64 / MB as f64)
    } else if size_bytes >= KB {
        format!("{:.2} KB", size_bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", size_bytes)
    }
}

/// Percentage saved going from `original` to `compressed` bytes.
///
/// Negative when the output grew. Zero for an empty original.
pub fn reduction_percent(original: u64, compressed: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (original as f64 - compressed as f64) / original as f64 * 100.0
}

pub fn format_reduction(original: u64, compressed: u64) -> String {
    format!("{:.1}%", reduction_percent(original, compressed))
}
