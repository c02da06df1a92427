use crate::gpio::{GpioActiveLevel, GpioBus, GpioOutput};
use crate::hd44780::BusWidth;
use crate::hd44780::transport::{COMMAND_SETTLE_US, ENABLE_PULSE_US, Transport};
use crate::{LcdError, LcdResult};
use embedded_hal::delay::DelayNs;
use log::trace;

#[derive(Debug)]
pub enum GpioDataBus<'a> {
    Bus8Bit(&'a mut dyn GpioBus<8>),
    Bus4Bit(&'a mut dyn GpioBus<4>),
}

impl GpioDataBus<'_> {
    pub fn is_4bit(&self) -> bool {
        matches!(self, GpioDataBus::Bus4Bit(_))
    }
}

/// Transport driving the controller pins directly from host GPIO lines.
///
/// The data lines are written as one [GpioBus], then E is pulsed high for
/// [ENABLE_PULSE_US] and the controller is given [COMMAND_SETTLE_US] to latch the value.
#[derive(Debug)]
pub struct GpioTransport<'a> {
    pin_e: &'a dyn GpioOutput,
    pin_rw: Option<&'a dyn GpioOutput>,
    pin_rs: &'a dyn GpioOutput,
    data_bus: GpioDataBus<'a>,
    pin_backlight: Option<(&'a dyn GpioOutput, GpioActiveLevel)>,
    backlight: bool,
}

impl<'a> GpioTransport<'a> {
    /// Creates a new transport using a 4-bit data bus, wired to D4..D7 of the controller.
    ///
    /// # Parameters
    ///
    /// - `pin_e`: Enable output pin.
    /// - `pin_rw`: Optional read/write output pin. If not provided, the transport only supports writes
    ///   (R/W pin of the display must be connected to GND, signifying write mode).
    /// - `pin_rs`: Register select output pin.
    /// - `data_bus`: The data bus, D4 first.
    pub fn new_4bit(
        pin_e: &'a dyn GpioOutput,
        pin_rw: Option<&'a dyn GpioOutput>,
        pin_rs: &'a dyn GpioOutput,
        data_bus: &'a mut dyn GpioBus<4>,
    ) -> Self {
        GpioTransport {
            pin_e,
            pin_rw,
            pin_rs,
            data_bus: GpioDataBus::Bus4Bit(data_bus),
            pin_backlight: None,
            backlight: false,
        }
    }

    /// Creates a new transport using an 8-bit data bus, wired to D0..D7 of the controller.
    ///
    /// See [GpioTransport::new_4bit] for the parameters.
    pub fn new_8bit(
        pin_e: &'a dyn GpioOutput,
        pin_rw: Option<&'a dyn GpioOutput>,
        pin_rs: &'a dyn GpioOutput,
        data_bus: &'a mut dyn GpioBus<8>,
    ) -> Self {
        GpioTransport {
            pin_e,
            pin_rw,
            pin_rs,
            data_bus: GpioDataBus::Bus8Bit(data_bus),
            pin_backlight: None,
            backlight: false,
        }
    }

    /// Adds a backlight output pin, switched on at the given active level.
    ///
    /// Without a backlight pin, [Transport::set_backlight] only records the requested state.
    pub fn with_backlight(mut self, pin: &'a dyn GpioOutput, level: GpioActiveLevel) -> Self {
        self.pin_backlight = Some((pin, level));
        self
    }

    fn pulse_e(pin: &dyn GpioOutput, delay: &mut dyn DelayNs) -> LcdResult<()> {
        // Set E pin to high
        pin.write(true)?;
        delay.delay_us(ENABLE_PULSE_US);
        // Set E pin to low
        pin.write(false)?;
        delay.delay_us(COMMAND_SETTLE_US);
        Ok(())
    }

    fn prepare_write(&self, rs: bool) -> LcdResult<()> {
        self.pin_rs.write(rs)?;
        if let Some(rw) = self.pin_rw {
            rw.write(false)?;
        }
        Ok(())
    }

    /// Sets RS and raises RW before a read cycle.
    fn prepare_read(&self, rs: bool, delay: &mut dyn DelayNs) -> LcdResult<&'a dyn GpioOutput> {
        let rw = self.pin_rw.ok_or(LcdError::NotSupported)?;
        self.pin_rs.write(rs)?;
        rw.write(true)?;
        delay.delay_us(ENABLE_PULSE_US);
        Ok(rw)
    }
}

impl Transport for GpioTransport<'_> {
    fn bus_width(&self) -> BusWidth {
        match self.data_bus {
            GpioDataBus::Bus8Bit(_) => BusWidth::Eight,
            GpioDataBus::Bus4Bit(_) => BusWidth::Four,
        }
    }

    fn write_nibble(&mut self, nibble: u8, rs: bool, delay: &mut dyn DelayNs) -> LcdResult<()> {
        let nibble = nibble & 0x0F;
        trace!("Writing nibble: {:04b}, RS: {}", nibble, rs);
        self.prepare_write(rs)?;

        // The output handle keeps the data lines driven, so E is pulsed before it is dropped
        match &mut self.data_bus {
            GpioDataBus::Bus8Bit(bus) => {
                let bus = bus.as_output()?;
                bus.write_byte(nibble << 4)?;
                Self::pulse_e(self.pin_e, delay)
            }
            GpioDataBus::Bus4Bit(bus) => {
                let bus = bus.as_output()?;
                bus.write_nibble(nibble)?;
                Self::pulse_e(self.pin_e, delay)
            }
        }
    }

    fn write_byte(&mut self, byte: u8, rs: bool, delay: &mut dyn DelayNs) -> LcdResult<()> {
        if self.data_bus.is_4bit() {
            return Err(LcdError::NotSupported);
        }
        trace!("Writing byte: {:08b}, RS: {}", byte, rs);
        self.prepare_write(rs)?;

        let GpioDataBus::Bus8Bit(bus) = &mut self.data_bus else {
            return Err(LcdError::NotSupported);
        };
        let bus = bus.as_output()?;
        bus.write_byte(byte)?;
        Self::pulse_e(self.pin_e, delay)
    }

    fn set_backlight(&mut self, on: bool) -> LcdResult<()> {
        self.backlight = on;
        if let Some((pin, level)) = self.pin_backlight {
            pin.write(level.get_state(on))?;
        }
        Ok(())
    }

    fn backlight(&self) -> bool {
        self.backlight
    }

    fn supports_read(&self) -> bool {
        self.pin_rw.is_some()
    }

    fn read_nibble(&mut self, rs: bool, delay: &mut dyn DelayNs) -> LcdResult<u8> {
        let rw = self.prepare_read(rs, delay)?;

        let nibble = match &mut self.data_bus {
            GpioDataBus::Bus8Bit(bus) => {
                let input = bus.as_input()?;
                self.pin_e.write(true)?;
                delay.delay_us(ENABLE_PULSE_US);
                let byte = input.read_byte()?;
                self.pin_e.write(false)?;
                byte >> 4
            }
            GpioDataBus::Bus4Bit(bus) => {
                let input = bus.as_input()?;
                self.pin_e.write(true)?;
                delay.delay_us(ENABLE_PULSE_US);
                let nibble = input.read_nibble()?;
                self.pin_e.write(false)?;
                nibble
            }
        };
        delay.delay_us(ENABLE_PULSE_US);

        // Set RW pin back to write
        rw.write(false)?;

        trace!("Read nibble: {:04b}, RS: {}", nibble, rs);
        Ok(nibble)
    }

    fn read_byte(&mut self, rs: bool, delay: &mut dyn DelayNs) -> LcdResult<u8> {
        if self.data_bus.is_4bit() {
            return Err(LcdError::NotSupported);
        }
        let rw = self.prepare_read(rs, delay)?;

        let GpioDataBus::Bus8Bit(bus) = &mut self.data_bus else {
            return Err(LcdError::NotSupported);
        };
        let byte = {
            let input = bus.as_input()?;
            self.pin_e.write(true)?;
            delay.delay_us(ENABLE_PULSE_US);
            let byte = input.read_byte()?;
            self.pin_e.write(false)?;
            byte
        };
        delay.delay_us(ENABLE_PULSE_US);

        rw.write(false)?;

        trace!("Read byte: {:08b}, RS: {}", byte, rs);
        Ok(byte)
    }
}
