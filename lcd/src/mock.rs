//! Test doubles shared by the unit tests.
//!
//! Every double records into a shared [Recorder], so a test sees pin changes, bus transfers,
//! decoded controller instructions and delays on a single timeline.
use crate::gpio::{GpioBus, GpioBusInput, GpioBusOutput, GpioOutput};
use crate::hd44780::BusWidth;
use crate::hd44780::command;
use crate::hd44780::transport::Transport;
use crate::{LcdError, LcdResult};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Event {
    /// A single GPIO line was driven.
    Pin(&'static str, bool),
    /// A GPIO data bus was driven, LSb first.
    Bus(u8),
    /// The output handle of a GPIO data bus was dropped, releasing the lines.
    BusReleased,
    /// A nibble reached the controller through a [FakeController].
    Nibble { value: u8, rs: bool },
    /// A full byte reached the controller through an 8-bit [FakeController].
    Byte { value: u8, rs: bool },
    /// Instruction decoded by the [FakeController].
    Command(u8),
    /// Data byte decoded by the [FakeController].
    Data(u8),
    Backlight(bool),
    Read { rs: bool },
    I2cWrite(u8),
    I2cRead(u8),
    Delay(u32),
}

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    fail: bool,
    reads: VecDeque<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct Recorder(Rc<RefCell<State>>);

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        self.0.borrow_mut().events.push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().events.clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().events.clear();
    }

    /// Makes every following transfer fail, until reset.
    pub fn set_fail(&self, fail: bool) {
        self.0.borrow_mut().fail = fail;
    }

    pub fn failing(&self) -> bool {
        self.0.borrow().fail
    }

    pub fn queue_reads(&self, values: &[u8]) {
        self.0.borrow_mut().reads.extend(values.iter().copied());
    }

    pub fn next_read(&self) -> Option<u8> {
        self.0.borrow_mut().reads.pop_front()
    }

    pub fn delays_us(&self) -> Vec<u32> {
        self.0
            .borrow()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Delay(us) => Some(*us),
                _ => None,
            })
            .collect()
    }

    pub fn total_delay_us(&self) -> u64 {
        self.delays_us().iter().map(|&us| us as u64).sum()
    }

    /// Decoded instructions, in order.
    pub fn commands(&self) -> Vec<u8> {
        self.0
            .borrow()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Command(command) => Some(*command),
                _ => None,
            })
            .collect()
    }

    /// Decoded instructions and data bytes, with delays stripped.
    pub fn traffic(&self) -> Vec<Event> {
        self.0
            .borrow()
            .events
            .iter()
            .filter(|event| matches!(event, Event::Command(_) | Event::Data(_)))
            .copied()
            .collect()
    }

    pub fn i2c_writes(&self) -> Vec<u8> {
        self.0
            .borrow()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::I2cWrite(byte) => Some(*byte),
                _ => None,
            })
            .collect()
    }
}

/// [DelayNs] that records every requested delay, rounded up to microseconds.
#[derive(Debug, Clone, Default)]
pub struct RecordingDelay(Recorder);

impl RecordingDelay {
    pub fn new(recorder: &Recorder) -> Self {
        Self(recorder.clone())
    }

    pub fn calls_us(&self) -> Vec<u32> {
        self.0.delays_us()
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.push(Event::Delay(ns.div_ceil(1000)));
    }

    fn delay_us(&mut self, us: u32) {
        self.0.push(Event::Delay(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0.push(Event::Delay(ms * 1000));
    }
}

#[derive(Debug)]
pub struct MockPin {
    name: &'static str,
    recorder: Recorder,
}

impl MockPin {
    pub fn new(name: &'static str, recorder: &Recorder) -> Self {
        Self {
            name,
            recorder: recorder.clone(),
        }
    }
}

impl GpioOutput for MockPin {
    fn write(&self, value: bool) -> LcdResult<()> {
        if self.recorder.failing() {
            return Err(LcdError::Io(std::io::ErrorKind::BrokenPipe));
        }
        self.recorder.push(Event::Pin(self.name, value));
        Ok(())
    }
}

/// GPIO bus whose reads are served from the recorder's read queue.
#[derive(Debug)]
pub struct MockBus<const N: usize> {
    recorder: Recorder,
}

impl<const N: usize> MockBus<N> {
    pub fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: recorder.clone(),
        }
    }

    pub fn with_input(self, values: &[u8]) -> Self {
        self.recorder.queue_reads(values);
        self
    }
}

impl<const N: usize> GpioBus<N> for MockBus<N> {
    fn as_input(&mut self) -> LcdResult<Box<dyn GpioBusInput<N> + '_>> {
        Ok(Box::new(MockBusIo::<N> {
            recorder: self.recorder.clone(),
            output: false,
        }))
    }

    fn as_output(&mut self) -> LcdResult<Box<dyn GpioBusOutput<N> + '_>> {
        Ok(Box::new(MockBusIo::<N> {
            recorder: self.recorder.clone(),
            output: true,
        }))
    }
}

#[derive(Debug)]
struct MockBusIo<const N: usize> {
    recorder: Recorder,
    output: bool,
}

impl<const N: usize> Drop for MockBusIo<N> {
    fn drop(&mut self) {
        if self.output {
            self.recorder.push(Event::BusReleased);
        }
    }
}

impl<const N: usize> GpioBusInput<N> for MockBusIo<N> {
    fn read(&self) -> LcdResult<[bool; N]> {
        let value = self.recorder.next_read().unwrap_or(0);
        let mut values = [false; N];
        for (i, bit) in values.iter_mut().enumerate() {
            *bit = value & (1 << i) != 0;
        }
        Ok(values)
    }
}

impl<const N: usize> GpioBusOutput<N> for MockBusIo<N> {
    fn write(&self, values: &[bool; N]) -> LcdResult<()> {
        if self.recorder.failing() {
            return Err(LcdError::Io(std::io::ErrorKind::BrokenPipe));
        }
        let value = values
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, &high)| if high { acc | (1 << i) } else { acc });
        self.recorder.push(Event::Bus(value));
        Ok(())
    }
}

/// I²C expander stand-in answering at a single address.
#[derive(Debug)]
pub struct MockI2c {
    address: u8,
    recorder: Recorder,
}

impl MockI2c {
    pub fn new(address: u8, recorder: &Recorder) -> Self {
        Self {
            address,
            recorder: recorder.clone(),
        }
    }
}

impl ErrorType for MockI2c {
    type Error = ErrorKind;
}

impl I2c for MockI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    for &byte in bytes.iter() {
                        if self.recorder.failing() {
                            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
                        }
                        self.recorder.push(Event::I2cWrite(byte));
                    }
                }
                Operation::Read(buffer) => {
                    for byte in buffer.iter_mut() {
                        if self.recorder.failing() {
                            return Err(ErrorKind::Bus);
                        }
                        *byte = self.recorder.next_read().unwrap_or(0xFF);
                        self.recorder.push(Event::I2cRead(*byte));
                    }
                }
            }
        }
        Ok(())
    }
}

/// A behavioural model of the controller behind a transport.
///
/// It starts in 8-bit mode like a freshly powered controller, follows the wake-up sequence into
/// 4-bit mode, assembles nibbles into bytes and keeps DDRAM, CGRAM and the address counter, so
/// read-back can be checked end to end.
#[derive(Debug)]
pub struct FakeController {
    recorder: Recorder,
    width: BusWidth,
    readable: bool,
    backlight: bool,
    nibble_mode: bool,
    pending_high: Option<u8>,
    pending_read: Option<u8>,
    ddram: [u8; 128],
    cgram: [u8; 64],
    address: u8,
    cgram_selected: bool,
    increment: bool,
}

impl FakeController {
    pub fn new(recorder: &Recorder) -> Self {
        Self {
            recorder: recorder.clone(),
            width: BusWidth::Four,
            readable: false,
            backlight: false,
            nibble_mode: false,
            pending_high: None,
            pending_read: None,
            ddram: [b' '; 128],
            cgram: [0; 64],
            address: 0,
            cgram_selected: false,
            increment: true,
        }
    }

    pub fn eight_bit(mut self) -> Self {
        self.width = BusWidth::Eight;
        self
    }

    pub fn readable(mut self) -> Self {
        self.readable = true;
        self
    }

    pub fn ddram(&self) -> &[u8; 128] {
        &self.ddram
    }

    pub fn cgram(&self) -> &[u8; 64] {
        &self.cgram
    }

    fn check(&self) -> LcdResult<()> {
        if self.recorder.failing() {
            return Err(LcdError::Nack);
        }
        Ok(())
    }

    fn step_address(&mut self) {
        let mask = if self.cgram_selected {
            command::CGRAM_ADDRESS_MASK
        } else {
            command::DDRAM_ADDRESS_MASK
        };
        self.address = if self.increment {
            self.address.wrapping_add(1)
        } else {
            self.address.wrapping_sub(1)
        } & mask;
    }

    fn execute(&mut self, value: u8, rs: bool) {
        if rs {
            self.recorder.push(Event::Data(value));
            if self.cgram_selected {
                self.cgram[self.address as usize] = value;
            } else {
                self.ddram[self.address as usize] = value;
            }
            self.step_address();
            return;
        }

        self.recorder.push(Event::Command(value));
        if value & command::SET_DDRAM_ADDRESS != 0 {
            self.address = value & command::DDRAM_ADDRESS_MASK;
            self.cgram_selected = false;
        } else if value & command::SET_CGRAM_ADDRESS != 0 {
            self.address = value & command::CGRAM_ADDRESS_MASK;
            self.cgram_selected = true;
        } else if value & command::FUNCTION_SET != 0 {
            if self.width == BusWidth::Four {
                self.nibble_mode = value & command::EIGHT_BIT_MODE == 0;
            }
        } else if value & command::ENTRY_MODE_SET != 0 && value & 0xF8 == 0 {
            self.increment = value & command::ENTRY_LEFT != 0;
        } else if value == command::CLEAR_DISPLAY {
            self.ddram = [b' '; 128];
            self.address = 0;
            self.cgram_selected = false;
            self.increment = true;
        } else if value & 0xFE == command::RETURN_HOME {
            self.address = 0;
            self.cgram_selected = false;
        }
    }

    fn read_value(&mut self, rs: bool) -> u8 {
        if rs {
            let value = if self.cgram_selected {
                self.cgram[self.address as usize]
            } else {
                self.ddram[self.address as usize]
            };
            self.step_address();
            value
        } else {
            self.address
        }
    }
}

impl Transport for FakeController {
    fn bus_width(&self) -> BusWidth {
        self.width
    }

    fn write_nibble(&mut self, nibble: u8, rs: bool, _delay: &mut dyn DelayNs) -> LcdResult<()> {
        self.check()?;
        let nibble = nibble & 0x0F;
        self.recorder.push(Event::Nibble { value: nibble, rs });

        if !self.nibble_mode {
            // Only D4..D7 are wired; D0..D3 read as low
            self.execute(nibble << 4, rs);
            return Ok(());
        }

        match self.pending_high.take() {
            None => self.pending_high = Some(nibble),
            Some(high) => self.execute((high << 4) | nibble, rs),
        }
        Ok(())
    }

    fn write_byte(&mut self, byte: u8, rs: bool, _delay: &mut dyn DelayNs) -> LcdResult<()> {
        if self.width == BusWidth::Four {
            return Err(LcdError::NotSupported);
        }
        self.check()?;
        self.recorder.push(Event::Byte { value: byte, rs });
        self.execute(byte, rs);
        Ok(())
    }

    fn set_backlight(&mut self, on: bool) -> LcdResult<()> {
        self.backlight = on;
        self.check()?;
        self.recorder.push(Event::Backlight(on));
        Ok(())
    }

    fn backlight(&self) -> bool {
        self.backlight
    }

    fn supports_read(&self) -> bool {
        self.readable
    }

    fn read_nibble(&mut self, rs: bool, _delay: &mut dyn DelayNs) -> LcdResult<u8> {
        if !self.readable {
            return Err(LcdError::NotSupported);
        }
        self.check()?;
        self.recorder.push(Event::Read { rs });
        match self.pending_read.take() {
            Some(low) => Ok(low),
            None => {
                let value = self.read_value(rs);
                self.pending_read = Some(value & 0x0F);
                Ok(value >> 4)
            }
        }
    }

    fn read_byte(&mut self, rs: bool, _delay: &mut dyn DelayNs) -> LcdResult<u8> {
        if !self.readable || self.width == BusWidth::Four {
            return Err(LcdError::NotSupported);
        }
        self.check()?;
        self.recorder.push(Event::Read { rs });
        Ok(self.read_value(rs))
    }
}
