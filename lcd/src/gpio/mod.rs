//! GPIO abstraction used by the [direct transport](crate::hd44780::transport::GpioTransport).
//!
//! Pins are claimed from a [GpioDriver], then switched to input or output mode. Data lines are
//! grouped into a [GpioBus] so a whole nibble (or byte) is presented in one call.
pub mod gpiod;

use crate::{LcdError, LcdResult};
use std::fmt::Debug;

pub trait GpioDriver: Debug {
    /// Gets the amount of GPIO pins available.
    fn count(&self) -> LcdResult<usize>;

    /// Gets the GPIO pin at the given index.
    fn get_pin(&self, index: usize) -> LcdResult<Box<dyn GpioPin + '_>>;

    /// Gets the GPIO pin bus at the specific indices.
    fn get_pin_bus<const N: usize>(
        &self,
        indices: [usize; N],
    ) -> LcdResult<Box<dyn GpioBus<N> + '_>>;
}

/// Specifies the active level of a signal.
///
/// By default, the active level is high. The LCD transports use it for the backlight polarity,
/// since backpacks differ in whether the backlight transistor is switched by a high or a low level.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioActiveLevel {
    #[default]
    High,
    Low,
}

impl GpioActiveLevel {
    /// Gets the real state that will be outputted on the pin based on the active level and the value.
    pub fn get_state(&self, value: bool) -> bool {
        match self {
            GpioActiveLevel::High => value,
            GpioActiveLevel::Low => !value,
        }
    }
}

pub trait GpioPin: Debug {
    /// Sets the GPIO pin function to output, allowing writing its state.
    fn as_output(&mut self) -> LcdResult<Box<dyn GpioOutput + '_>>;
}

pub trait GpioOutput: Debug {
    /// Writes the state of the GPIO pin.
    fn write(&self, value: bool) -> LcdResult<()>;
}

pub trait GpioBus<const N: usize>: Debug {
    fn as_input(&mut self) -> LcdResult<Box<dyn GpioBusInput<N> + '_>>;
    fn as_output(&mut self) -> LcdResult<Box<dyn GpioBusOutput<N> + '_>>;
}

pub trait GpioBusInput<const N: usize>: Debug {
    fn read(&self) -> LcdResult<[bool; N]>;
}

impl dyn GpioBusInput<8> + '_ {
    /// Reads the values of the GPIO pins in the bus.
    /// Returns them as a byte, LSb first.
    pub fn read_byte(&self) -> LcdResult<u8> {
        let values = self.read()?;
        Ok(pack_bits(&values))
    }
}

impl dyn GpioBusInput<4> + '_ {
    /// Reads the values of the GPIO pins in the bus.
    /// Returns them as a nibble, LSb first.
    pub fn read_nibble(&self) -> LcdResult<u8> {
        let values = self.read()?;
        Ok(pack_bits(&values))
    }
}

pub trait GpioBusOutput<const N: usize>: Debug {
    fn write(&self, values: &[bool; N]) -> LcdResult<()>;
}

impl dyn GpioBusOutput<8> + '_ {
    /// Writes the values to the GPIO pins in the bus.
    /// The values are written as a byte, LSb first.
    pub fn write_byte(&self, value: u8) -> LcdResult<()> {
        self.write(&unpack_bits(value))
    }
}

impl dyn GpioBusOutput<4> + '_ {
    /// Writes the values to the GPIO pins in the bus.
    /// The values are written as a nibble, LSb first.
    pub fn write_nibble(&self, value: u8) -> LcdResult<()> {
        if value > 0b1111 {
            return Err(LcdError::InvalidArgument);
        }
        self.write(&unpack_bits(value))
    }
}

fn pack_bits<const N: usize>(values: &[bool; N]) -> u8 {
    values
        .iter()
        .enumerate()
        .filter(|(_, high)| **high)
        .fold(0u8, |acc, (i, _)| acc | (1 << i))
}

fn unpack_bits<const N: usize>(value: u8) -> [bool; N] {
    let mut values = [false; N];
    for (i, bit) in values.iter_mut().enumerate() {
        *bit = (value & (1 << i)) != 0;
    }
    values
}
