//! Minimal sysfs GPIO access
//!
//! The board exposes pins under /sys/class/gpio. Writing a pin number
//! to `export` creates gpio<N>/ with `direction` and `value` files;
//! all reads and writes after that go through the `value` file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Pin direction, written to the sysfs `direction` file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// A single exported sysfs GPIO pin
#[derive(Debug, Clone)]
pub struct SysfsPin {
    value_path: PathBuf,
}

impl SysfsPin {
    /// Export `pin` under `base` (typically /sys/class/gpio) and set
    /// its direction. Exporting an already-exported pin is not an
    /// error.
    pub fn open(base: &Path, pin: u32, direction: Direction) -> io::Result<Self> {
        let pin_dir = base.join(format!("gpio{pin}"));
        if !pin_dir.exists() {
            fs::write(base.join("export"), pin.to_string())?;
        }
        fs::write(pin_dir.join("direction"), direction.as_str())?;

        debug!(pin, direction = direction.as_str(), "gpio pin opened");

        Ok(Self {
            value_path: pin_dir.join("value"),
        })
    }

    /// Wrap an existing value file directly. Used by tests and
    /// non-standard wirings.
    pub fn from_value_path(value_path: PathBuf) -> Self {
        Self { value_path }
    }

    /// Read the pin level; a leading '1' counts as high.
    pub fn read(&self) -> io::Result<bool> {
        let raw = fs::read_to_string(&self.value_path)?;
        Ok(raw.trim_start().starts_with('1'))
    }

    /// Drive the pin high or low.
    pub fn write(&self, high: bool) -> io::Result<()> {
        fs::write(&self.value_path, if high { "1" } else { "0" })
    }
}
