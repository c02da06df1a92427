//! Transports deliver nibbles and the RS/RW/E framing signals to the controller pins.
//!
//! The [protocol engine](super::Hd44780) decides what to send and when; a transport only knows
//! how to get one nibble (or byte, on 8-bit buses) onto the pins and latch it with an E-strobe.
//! Delays are borrowed from the engine for the duration of each call, so a transport never owns
//! a clock.
mod expander;
mod gpio;

pub use expander::*;
pub use gpio::*;

use crate::LcdError;
use crate::LcdResult;
use crate::hd44780::BusWidth;
use embedded_hal::delay::DelayNs;
use std::fmt::Debug;

/// E high time. The controller needs 450 ns.
pub const ENABLE_PULSE_US: u32 = 1;
/// Settle time after the falling edge of E; the typical execution time of a command.
pub const COMMAND_SETTLE_US: u32 = 37;

pub trait Transport: Debug {
    /// Width of the data bus wired to the controller.
    fn bus_width(&self) -> BusWidth;

    /// Presents the low nibble of `nibble` on D4..D7 with the given RS and RW low, then strobes E.
    ///
    /// On 8-bit buses, the nibble is presented on D4..D7 and D0..D3 are driven low, which is what
    /// the wake-up sequence needs.
    fn write_nibble(&mut self, nibble: u8, rs: bool, delay: &mut dyn DelayNs) -> LcdResult<()>;

    /// Presents a whole byte on D0..D7 and strobes E once.
    ///
    /// # Errors
    /// - [LcdError::NotSupported] on 4-bit transports.
    fn write_byte(&mut self, _byte: u8, _rs: bool, _delay: &mut dyn DelayNs) -> LcdResult<()> {
        Err(LcdError::NotSupported)
    }

    /// Updates the backlight and flushes it to the pins without strobing E.
    fn set_backlight(&mut self, on: bool) -> LcdResult<()>;

    /// Current backlight state, as last requested.
    fn backlight(&self) -> bool;

    /// Whether the RW line is wired, allowing reads from the controller.
    ///
    /// This is a property of the wiring, fixed when the transport is constructed.
    fn supports_read(&self) -> bool {
        false
    }

    /// Reads one nibble from D4..D7 with RW high, during a single E-strobe.
    ///
    /// # Errors
    /// - [LcdError::NotSupported] if [Transport::supports_read] is `false`.
    fn read_nibble(&mut self, _rs: bool, _delay: &mut dyn DelayNs) -> LcdResult<u8> {
        Err(LcdError::NotSupported)
    }

    /// Reads one byte from D0..D7 with RW high, during a single E-strobe.
    ///
    /// # Errors
    /// - [LcdError::NotSupported] on 4-bit transports, or if reading is not supported.
    fn read_byte(&mut self, _rs: bool, _delay: &mut dyn DelayNs) -> LcdResult<u8> {
        Err(LcdError::NotSupported)
    }
}
