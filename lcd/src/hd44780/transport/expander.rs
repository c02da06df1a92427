use crate::gpio::GpioActiveLevel;
use crate::hd44780::BusWidth;
use crate::hd44780::transport::{COMMAND_SETTLE_US, ENABLE_PULSE_US, Transport};
use crate::{LcdError, LcdResult};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::trace;
use std::fmt::{Debug, Formatter};

/// Bit positions of the controller signals on the expander's 8-bit port.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ExpanderPinMap {
    pub rs: u8,
    pub rw: u8,
    pub e: u8,
    pub backlight: u8,
    /// D4, D5, D6, D7.
    pub data: [u8; 4],
}

impl ExpanderPinMap {
    /// Checks that every signal sits on its own bit of the 8-bit port.
    pub fn validate(&self) -> LcdResult<()> {
        let mut used = 0u8;
        for bit in self.bits() {
            if bit > 7 || used & (1 << bit) != 0 {
                return Err(LcdError::InvalidArgument);
            }
            used |= 1 << bit;
        }
        Ok(())
    }

    fn bits(&self) -> [u8; 8] {
        [
            self.rs,
            self.rw,
            self.e,
            self.backlight,
            self.data[0],
            self.data[1],
            self.data[2],
            self.data[3],
        ]
    }
}

impl Default for ExpanderPinMap {
    /// The wiring of the common PCF8574 backpack: `P0`=RS, `P1`=RW, `P2`=E, `P3`=backlight, `P4..P7`=D4..D7.
    fn default() -> Self {
        ExpanderPinMap {
            rs: 0,
            rw: 1,
            e: 2,
            backlight: 3,
            data: [4, 5, 6, 7],
        }
    }
}

/// Configuration of an I²C port expander backpack.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ExpanderConfig {
    /// 7-bit bus address.
    pub address: u8,
    pub pins: ExpanderPinMap,
    pub backlight_level: GpioActiveLevel,
    /// Whether the RW line of the display is connected to the expander. Some backpacks strap it to
    /// ground, which makes reading from the controller impossible.
    pub rw_connected: bool,
}

impl ExpanderConfig {
    pub const DEFAULT_ADDRESS: u8 = 0x27;

    pub fn new(address: u8) -> Self {
        ExpanderConfig {
            address,
            ..Default::default()
        }
    }

    pub fn with_pins(mut self, pins: ExpanderPinMap) -> Self {
        self.pins = pins;
        self
    }

    pub fn with_backlight_level(mut self, level: GpioActiveLevel) -> Self {
        self.backlight_level = level;
        self
    }

    /// Marks the RW line as strapped to ground.
    pub fn write_only(mut self) -> Self {
        self.rw_connected = false;
        self
    }
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        ExpanderConfig {
            address: Self::DEFAULT_ADDRESS,
            pins: ExpanderPinMap::default(),
            backlight_level: GpioActiveLevel::High,
            rw_connected: true,
        }
    }
}

/// Transport reaching the controller through an 8-bit I²C port expander such as the PCF8574.
///
/// All signals share one port byte, so an E-strobe takes three bus writes: the data with E low,
/// the same with E high, and the same with E low again. The backlight bit is merged into every
/// write.
pub struct ExpanderTransport<I> {
    i2c: I,
    address: u8,
    rs_mask: u8,
    rw_mask: u8,
    e_mask: u8,
    backlight_mask: u8,
    data_masks: [u8; 4],
    backlight_level: GpioActiveLevel,
    readable: bool,
    backlight: bool,
    /// Last port value written, without E and backlight bits.
    port: u8,
}

impl<I> Debug for ExpanderTransport<I> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpanderTransport")
            .field("address", &format_args!("{:#04x}", self.address))
            .field("e_mask", &format_args!("{:08b}", self.e_mask))
            .field("backlight", &self.backlight)
            .field("port", &format_args!("{:08b}", self.port))
            .finish_non_exhaustive()
    }
}

impl<I: I2c> ExpanderTransport<I> {
    /// Creates a new transport. Nothing is written to the bus until the first operation.
    ///
    /// # Errors
    /// - [LcdError::InvalidArgument] if the address does not fit in 7 bits, or the pin map is invalid
    ///   (see [ExpanderPinMap::validate]).
    pub fn new(i2c: I, config: ExpanderConfig) -> LcdResult<Self> {
        if config.address > 0x7F {
            return Err(LcdError::InvalidArgument);
        }
        config.pins.validate()?;

        let pins = config.pins;
        Ok(ExpanderTransport {
            i2c,
            address: config.address,
            rs_mask: 1 << pins.rs,
            rw_mask: 1 << pins.rw,
            e_mask: 1 << pins.e,
            backlight_mask: 1 << pins.backlight,
            data_masks: pins.data.map(|bit| 1 << bit),
            backlight_level: config.backlight_level,
            readable: config.rw_connected,
            backlight: false,
            port: 0,
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Gives the bus back.
    pub fn release(self) -> I {
        self.i2c
    }

    fn backlight_bits(&self) -> u8 {
        if self.backlight_level.get_state(self.backlight) {
            self.backlight_mask
        } else {
            0
        }
    }

    /// Spreads the low nibble over the D4..D7 port bits.
    fn data_bits(&self, nibble: u8) -> u8 {
        self.data_masks
            .iter()
            .enumerate()
            .filter(|(i, _)| nibble & (1 << i) != 0)
            .fold(0, |acc, (_, mask)| acc | mask)
    }

    /// Gathers the D4..D7 port bits into a nibble.
    fn nibble_from(&self, port: u8) -> u8 {
        self.data_masks
            .iter()
            .enumerate()
            .filter(|(_, mask)| port & **mask != 0)
            .fold(0, |acc, (i, _)| acc | (1 << i))
    }

    fn write_port(&mut self, value: u8) -> LcdResult<()> {
        let value = value | self.backlight_bits();
        trace!("Writing port: {:08b} @ {:#04x}", value, self.address);
        self.i2c.write(self.address, &[value]).map_err(LcdError::from_i2c)
    }

    fn latch(&mut self, word: u8) -> LcdResult<()> {
        self.port = word;
        self.write_port(word)
    }
}

impl<I: I2c> Transport for ExpanderTransport<I> {
    fn bus_width(&self) -> BusWidth {
        BusWidth::Four
    }

    fn write_nibble(&mut self, nibble: u8, rs: bool, delay: &mut dyn DelayNs) -> LcdResult<()> {
        let nibble = nibble & 0x0F;
        trace!("Writing nibble: {:04b}, RS: {}", nibble, rs);

        let mut word = self.data_bits(nibble);
        if rs {
            word |= self.rs_mask;
        }

        self.latch(word)?;
        self.write_port(word | self.e_mask)?;
        delay.delay_us(ENABLE_PULSE_US);
        self.write_port(word)?;
        delay.delay_us(COMMAND_SETTLE_US);
        Ok(())
    }

    fn set_backlight(&mut self, on: bool) -> LcdResult<()> {
        self.backlight = on;
        self.write_port(self.port)
    }

    fn backlight(&self) -> bool {
        self.backlight
    }

    fn supports_read(&self) -> bool {
        self.readable
    }

    fn read_nibble(&mut self, rs: bool, delay: &mut dyn DelayNs) -> LcdResult<u8> {
        if !self.readable {
            return Err(LcdError::NotSupported);
        }

        // Quasi-bidirectional port: data lines written high can be pulled low by the controller
        let mut word = self.data_bits(0x0F) | self.rw_mask;
        if rs {
            word |= self.rs_mask;
        }

        self.latch(word)?;
        self.write_port(word | self.e_mask)?;
        delay.delay_us(ENABLE_PULSE_US);
        let mut buffer = [0u8; 1];
        self.i2c
            .read(self.address, &mut buffer)
            .map_err(LcdError::from_i2c)?;
        self.write_port(word)?;
        delay.delay_us(ENABLE_PULSE_US);

        let nibble = self.nibble_from(buffer[0]);
        trace!("Read nibble: {:04b}, RS: {}", nibble, rs);
        Ok(nibble)
    }
}
