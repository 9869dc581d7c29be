//! Register-style bus access to the controller device.
//!
//! The controller (buttons + volume knob) is reachable over SMBus single-byte
//! transfers at a fixed device address. The daemon treats the bus as an
//! unreliable external collaborator: every call site tolerates and logs
//! failures without crashing the loop, so the trait surface is just the two
//! byte operations.

use anyhow::Result;

/// Byte-level access to the controller device.
///
/// Production code uses [`I2cBus`]; tests substitute scripted doubles.
pub trait VolumeBus {
    /// Read one byte from the device (the current poll reading).
    fn read_byte(&mut self) -> Result<u8>;

    /// Write one byte to the device (the derived volume level).
    fn write_byte(&mut self, value: u8) -> Result<()>;
}

/// SMBus-backed implementation over a Linux `/dev/i2c-*` node.
#[cfg(target_os = "linux")]
pub struct I2cBus {
    device: i2cdev::linux::LinuxI2CDevice,
}

#[cfg(target_os = "linux")]
impl std::fmt::Debug for I2cBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("I2cBus").finish_non_exhaustive()
    }
}

#[cfg(target_os = "linux")]
impl I2cBus {
    /// Open the bus device node and bind it to the controller address.
    ///
    /// # Errors
    ///
    /// Returns an error if the node does not exist or the address cannot
    /// be selected (permissions, missing i2c-dev module).
    pub fn open(path: &str, device_addr: u16) -> Result<Self> {
        use anyhow::Context;

        let device = i2cdev::linux::LinuxI2CDevice::new(path, device_addr)
            .with_context(|| format!("open I2C device {path} at address {device_addr:#04x}"))?;
        Ok(Self { device })
    }
}

#[cfg(target_os = "linux")]
impl VolumeBus for I2cBus {
    fn read_byte(&mut self) -> Result<u8> {
        use anyhow::Context;
        use i2cdev::core::I2CDevice;

        self.device
            .smbus_read_byte()
            .context("SMBus read from controller")
    }

    fn write_byte(&mut self, value: u8) -> Result<()> {
        use anyhow::Context;
        use i2cdev::core::I2CDevice;

        self.device
            .smbus_write_byte(value)
            .context("SMBus write to controller")
    }
}
