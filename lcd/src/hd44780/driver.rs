use crate::hd44780::transport::Transport;
use crate::hd44780::{
    BusWidth, CharSize, CursorDirection, DisplayControl, EntryMode, FunctionSet, Geometry,
    HD44780Driver, command,
};
use crate::{LcdError, LcdResult};
use embedded_hal::delay::DelayNs;
use log::{debug, trace, warn};
use std::fmt::{Debug, Formatter};

/// Wait after power-on before the first command. The controller needs 40 ms after Vcc rises
/// above 2.7 V.
pub const POWER_ON_DELAY_US: u32 = 50_000;
/// Wait after each `0x3` wake-up nibble. The controller needs 4.1 ms after the first one and
/// 100 µs after the others; waiting the long time every time is valid from any starting state.
pub const WAKE_UP_DELAY_US: u32 = 4_500;
/// Wait after switching the interface to 4-bit mode.
pub const MODE_SWITCH_DELAY_US: u32 = 150;
/// Execution time of the clear display and return home commands.
pub const LONG_COMMAND_DELAY_US: u32 = 2_000;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DriverState {
    /// Only [Hd44780::begin] and the backlight are usable.
    Uninitialized,
    /// The initialization sequence is in flight.
    Initializing,
    Ready,
}

/// HD44780 protocol engine.
///
/// Owns the shadow copies of the controller's write-only registers and frames every byte for the
/// transport: two nibbles, high first, on 4-bit transports, or one byte on 8-bit transports.
///
/// Shadow registers are always updated *before* the command that writes them is sent. If the
/// transport fails, the shadow already holds the wanted state, and calling the same mutator again
/// sends the same byte.
pub struct Hd44780<T, D> {
    transport: T,
    delay: D,
    state: DriverState,
    geometry: Option<Geometry>,
    entry_mode: EntryMode,
    display_control: DisplayControl,
    function_set: FunctionSet,
    last_error: Option<LcdError>,
}

impl<T: Debug, D> Debug for Hd44780<T, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hd44780")
            .field("transport", &self.transport)
            .field("state", &self.state)
            .field("geometry", &self.geometry)
            .field("entry_mode", &self.entry_mode)
            .field("display_control", &self.display_control)
            .field("function_set", &self.function_set)
            .finish_non_exhaustive()
    }
}

impl<T: Transport, D: DelayNs> Hd44780<T, D> {
    /// Creates a new engine. The transport is not touched until [Hd44780::begin] or
    /// [Hd44780::set_backlight] is called.
    pub fn new(transport: T, delay: D) -> Self {
        Hd44780 {
            transport,
            delay,
            state: DriverState::Uninitialized,
            geometry: None,
            entry_mode: EntryMode::default(),
            display_control: DisplayControl::default(),
            function_set: FunctionSet::default(),
            last_error: None,
        }
    }

    /// Initializes the controller, from whatever state it powered up in.
    ///
    /// On 4-bit transports, it first sends the `0011` nibble three times, which leaves the
    /// controller in 8-bit mode no matter if it was in 4-bit or 8-bit mode before, then `0010` to
    /// switch to 4-bit mode. 8-bit transports send the full `00110000` byte three times instead.
    ///
    /// Then, it sets the function set (frozen from now on), turns the display off, clears it,
    /// sets the entry mode to left-to-right without shift, and turns the display on with the cursor
    /// and blinking off.
    ///
    /// # Errors
    /// - [LcdError::AlreadyInitialized] if the display was already initialized; nothing is sent.
    /// - [LcdError::InvalidArgument] if the geometry is invalid (see [Geometry::new]); nothing is sent.
    /// - Any transport error. The engine stays uninitialized and `begin` can be called again.
    pub fn begin(&mut self, cols: u8, rows: u8, char_size: CharSize) -> LcdResult<()> {
        if self.state == DriverState::Ready {
            return Err(LcdError::AlreadyInitialized);
        }
        let geometry = Geometry::new(cols, rows, char_size)?;

        debug!(
            "Initializing {}x{} display ({:?}) over {:?} bus",
            cols,
            rows,
            char_size,
            self.transport.bus_width()
        );

        self.state = DriverState::Initializing;
        match self.initialize(&geometry) {
            Ok(()) => {
                self.geometry = Some(geometry);
                self.state = DriverState::Ready;
                debug!("Display initialized, function set: {:08b}", self.function_set.bits());
                Ok(())
            }
            Err(err) => {
                warn!("Display initialization failed: {}", err);
                self.state = DriverState::Uninitialized;
                Err(err)
            }
        }
    }

    fn initialize(&mut self, geometry: &Geometry) -> LcdResult<()> {
        let bus_width = self.transport.bus_width();
        self.function_set = FunctionSet::new(bus_width, geometry);

        self.delay.delay_us(POWER_ON_DELAY_US);

        // Synchronize
        match bus_width {
            BusWidth::Four => {
                for _ in 0..3 {
                    self.write_nibble(0b0011)?;
                    self.delay.delay_us(WAKE_UP_DELAY_US);
                }
                self.write_nibble(0b0010)?;
                self.delay.delay_us(MODE_SWITCH_DELAY_US);
            }
            BusWidth::Eight => {
                for _ in 0..3 {
                    self.send(command::FUNCTION_SET | command::EIGHT_BIT_MODE, false)?;
                    self.delay.delay_us(WAKE_UP_DELAY_US);
                }
            }
        }

        self.function_set(self.function_set)?;

        self.display_control = DisplayControl::default();
        self.set_display_control(self.display_control)?;

        self.clear_display()?;

        self.entry_mode = EntryMode::default();
        self.entry_mode.set_direction(CursorDirection::Right);
        self.entry_mode.set_shift(false);
        self.set_entry_mode(self.entry_mode)?;

        self.display_control.set_display_on(true);
        self.set_display_control(self.display_control)
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == DriverState::Ready
    }

    /// Geometry given to [Hd44780::begin], if the display is initialized.
    pub fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }

    pub fn entry_mode(&self) -> EntryMode {
        self.entry_mode
    }

    pub fn display_control(&self) -> DisplayControl {
        self.display_control
    }

    pub fn function_set_register(&self) -> FunctionSet {
        self.function_set
    }

    /// The last transport error, kept until taken or replaced by a newer one.
    pub fn last_error(&self) -> Option<&LcdError> {
        self.last_error.as_ref()
    }

    pub fn take_last_error(&mut self) -> Option<LcdError> {
        self.last_error.take()
    }

    pub(crate) fn record_error(&mut self, err: LcdError) {
        self.last_error = Some(err);
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Gives the transport and the delay back.
    pub fn release(self) -> (T, D) {
        (self.transport, self.delay)
    }

    /// Whether the transport can read from the controller.
    pub fn supports_read(&self) -> bool {
        self.transport.supports_read()
    }

    /// Sends a raw command byte, with RS set to `0`.
    pub fn command(&mut self, value: u8) -> LcdResult<()> {
        self.send_command(value)
    }

    /// Writes a byte to the RAM selected by the last address command, with RS set to `1`.
    ///
    /// Returns the number of bytes written.
    pub fn write_data(&mut self, value: u8) -> LcdResult<usize> {
        self.send_data(value)?;
        Ok(1)
    }

    /// Clears the display and moves the cursor home, then waits for the command to complete.
    pub fn clear(&mut self) -> LcdResult<()> {
        self.clear_display()
    }

    /// Moves the cursor home and undoes display shifts, then waits for the command to complete.
    pub fn home(&mut self) -> LcdResult<()> {
        self.return_home()
    }

    pub fn display(&mut self) -> LcdResult<()> {
        self.update_display_control(|control| control.set_display_on(true))
    }

    pub fn no_display(&mut self) -> LcdResult<()> {
        self.update_display_control(|control| control.set_display_on(false))
    }

    /// Shows the underline cursor.
    pub fn cursor(&mut self) -> LcdResult<()> {
        self.update_display_control(|control| control.set_cursor_on(true))
    }

    pub fn no_cursor(&mut self) -> LcdResult<()> {
        self.update_display_control(|control| control.set_cursor_on(false))
    }

    /// Blinks the character cell at the cursor.
    pub fn blink(&mut self) -> LcdResult<()> {
        self.update_display_control(|control| control.set_blink_on(true))
    }

    pub fn no_blink(&mut self) -> LcdResult<()> {
        self.update_display_control(|control| control.set_blink_on(false))
    }

    pub fn left_to_right(&mut self) -> LcdResult<()> {
        self.update_entry_mode(|mode| mode.set_direction(CursorDirection::Right))
    }

    pub fn right_to_left(&mut self) -> LcdResult<()> {
        self.update_entry_mode(|mode| mode.set_direction(CursorDirection::Left))
    }

    /// Shifts the display on each write instead of moving the cursor, "right-justifying" text at
    /// the cursor.
    pub fn autoscroll(&mut self) -> LcdResult<()> {
        self.update_entry_mode(|mode| mode.set_shift(true))
    }

    pub fn no_autoscroll(&mut self) -> LcdResult<()> {
        self.update_entry_mode(|mode| mode.set_shift(false))
    }

    /// Shifts the whole display one cell to the left, without changing DDRAM.
    pub fn scroll_display_left(&mut self) -> LcdResult<()> {
        self.cursor_shift(true, CursorDirection::Left)
    }

    pub fn scroll_display_right(&mut self) -> LcdResult<()> {
        self.cursor_shift(true, CursorDirection::Right)
    }

    /// Moves the cursor one cell to the left, without writing.
    pub fn move_cursor_left(&mut self) -> LcdResult<()> {
        self.cursor_shift(false, CursorDirection::Left)
    }

    pub fn move_cursor_right(&mut self) -> LcdResult<()> {
        self.cursor_shift(false, CursorDirection::Right)
    }

    /// Moves the cursor to `(col, row)`.
    ///
    /// Rows past the last one are clamped to the last row. Columns are not clamped, see
    /// [Geometry::ddram_address].
    pub fn set_cursor(&mut self, col: u8, row: u8) -> LcdResult<()> {
        let geometry = self.geometry.ok_or(LcdError::NotInitialized)?;
        self.set_ddram_address(geometry.ddram_address(col, row))
    }

    /// Defines the custom character at code `slot` (`0..=7`, higher slots wrap).
    ///
    /// Each byte of `glyph` is one pixel row, top to bottom, using bits 4..0. This leaves the
    /// address counter in CGRAM, so call [Hd44780::set_cursor] before writing text again.
    pub fn create_char(&mut self, slot: u8, glyph: &[u8; 8]) -> LcdResult<()> {
        self.set_cgram_address((slot & 0b111) << 3)?;
        for &row in glyph {
            self.send_data(row)?;
        }
        Ok(())
    }

    /// Switches the backlight. Usable before [Hd44780::begin].
    pub fn set_backlight(&mut self, on: bool) -> LcdResult<()> {
        trace!("Setting backlight: {}", on);
        let result = self.transport.set_backlight(on);
        self.track(result)
    }

    pub fn is_backlight_on(&self) -> bool {
        self.transport.backlight()
    }

    /// Reads the busy flag and the address counter.
    ///
    /// # Errors
    /// - [LcdError::NotSupported] if the transport cannot read.
    pub fn read_busy_flag_and_address(&mut self) -> LcdResult<(bool, u8)> {
        self.get_busy_flag_and_address()
    }

    fn update_display_control(&mut self, update: impl FnOnce(&mut DisplayControl)) -> LcdResult<()> {
        self.ensure_ready()?;
        update(&mut self.display_control);
        self.set_display_control(self.display_control)
    }

    fn update_entry_mode(&mut self, update: impl FnOnce(&mut EntryMode)) -> LcdResult<()> {
        self.ensure_ready()?;
        update(&mut self.entry_mode);
        self.set_entry_mode(self.entry_mode)
    }

    fn ensure_ready(&self) -> LcdResult<()> {
        match self.state {
            DriverState::Uninitialized => Err(LcdError::NotInitialized),
            DriverState::Initializing | DriverState::Ready => Ok(()),
        }
    }

    fn track<R>(&mut self, result: LcdResult<R>) -> LcdResult<R> {
        if let Err(err) = &result {
            self.last_error = Some(err.clone());
        }
        result
    }

    fn write_nibble(&mut self, nibble: u8) -> LcdResult<()> {
        let result = self.transport.write_nibble(nibble, false, &mut self.delay);
        self.track(result)
    }

    fn send(&mut self, data: u8, rs: bool) -> LcdResult<()> {
        trace!("Sending data: {:08b}, RS: {}", data, rs);

        let result = match self.transport.bus_width() {
            BusWidth::Four => self
                .transport
                .write_nibble(data >> 4, rs, &mut self.delay)
                .and_then(|_| self.transport.write_nibble(data & 0x0F, rs, &mut self.delay)),
            BusWidth::Eight => self.transport.write_byte(data, rs, &mut self.delay),
        };
        self.track(result)
    }

    fn read(&mut self, rs: bool) -> LcdResult<u8> {
        self.ensure_ready()?;
        if !self.transport.supports_read() {
            return Err(LcdError::NotSupported);
        }

        let result = match self.transport.bus_width() {
            BusWidth::Four => self.transport.read_nibble(rs, &mut self.delay).and_then(|high| {
                let low = self.transport.read_nibble(rs, &mut self.delay)?;
                Ok((high << 4) | low)
            }),
            BusWidth::Eight => self.transport.read_byte(rs, &mut self.delay),
        };
        let data = self.track(result)?;

        trace!("Read data: {:08b}, RS: {}", data, rs);
        Ok(data)
    }
}

impl<T: Transport, D: DelayNs> HD44780Driver for Hd44780<T, D> {
    /// Sends the command, then waits for it to complete if it is one of the slow ones
    /// (clear display, return home).
    fn send_command(&mut self, command: u8) -> LcdResult<()> {
        self.ensure_ready()?;
        self.send(command, false)?;

        if command == command::CLEAR_DISPLAY || command & 0b11111110 == command::RETURN_HOME {
            self.delay.delay_us(LONG_COMMAND_DELAY_US);
        }
        Ok(())
    }

    fn send_data(&mut self, data: u8) -> LcdResult<()> {
        self.ensure_ready()?;
        self.send(data, true)
    }

    fn read_command(&mut self) -> LcdResult<u8> {
        self.read(false)
    }

    fn read_data(&mut self) -> LcdResult<u8> {
        self.read(true)
    }
}
