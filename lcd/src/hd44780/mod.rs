//! HD44780 controller protocol.
//!
//! [HD44780Driver] is the raw command catalogue, composed on top of the two low-level primitives
//! `send_command` and `send_data`. [Hd44780] implements it over any [Transport](transport::Transport)
//! and adds the initialization sequence and the shadow registers.
//!
//! # Sources
//!
//! - Hitachi, “HD44780U (LCD-II) Dot Matrix Liquid Crystal Display Controller/Driver,” rev. 0.0, 1998.
mod driver;
pub mod transport;

pub use driver::*;

use crate::{LcdError, LcdResult};
use std::fmt::Debug;

/// Opcodes and flag bits of the HD44780 instruction set.
pub mod command {
    pub const CLEAR_DISPLAY: u8 = 0b00000001;
    pub const RETURN_HOME: u8 = 0b00000010;
    pub const ENTRY_MODE_SET: u8 = 0b00000100;
    pub const DISPLAY_CONTROL: u8 = 0b00001000;
    pub const CURSOR_SHIFT: u8 = 0b00010000;
    pub const FUNCTION_SET: u8 = 0b00100000;
    pub const SET_CGRAM_ADDRESS: u8 = 0b01000000;
    pub const SET_DDRAM_ADDRESS: u8 = 0b10000000;

    // Entry mode
    pub const ENTRY_LEFT: u8 = 0b00000010;
    pub const ENTRY_SHIFT_INCREMENT: u8 = 0b00000001;

    // Display control
    pub const DISPLAY_ON: u8 = 0b00000100;
    pub const CURSOR_ON: u8 = 0b00000010;
    pub const BLINK_ON: u8 = 0b00000001;

    // Cursor / display shift
    pub const DISPLAY_MOVE: u8 = 0b00001000;
    pub const MOVE_RIGHT: u8 = 0b00000100;

    // Function set
    pub const EIGHT_BIT_MODE: u8 = 0b00010000;
    pub const TWO_LINE: u8 = 0b00001000;
    pub const DOTS_5X10: u8 = 0b00000100;

    /// Highest CGRAM address.
    pub const CGRAM_ADDRESS_MASK: u8 = 0b00111111;
    /// Highest DDRAM address.
    pub const DDRAM_ADDRESS_MASK: u8 = 0b01111111;
}

/// DDRAM address of the first column of each row.
///
/// Rows 2 and 3 continue rows 0 and 1: on a 20x4 module, row 2 starts right after the 20th
/// character of row 0.
pub const ROW_OFFSETS: [u8; 4] = [0x00, 0x40, 0x14, 0x54];

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorDirection {
    /// Moves the cursor to the left after writing/reading data.
    Left,
    /// Moves the cursor to the right after writing/reading data.
    Right,
}

/// Character cell size.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum CharSize {
    #[default]
    Dots5x8,
    /// Taller font, honoured by the controller on single-line displays only.
    Dots5x10,
}

/// Width of the data bus between the transport and the controller.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BusWidth {
    Four,
    Eight,
}

/// Display dimensions, captured when the display is initialized.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Geometry {
    cols: u8,
    rows: u8,
    char_size: CharSize,
}

impl Geometry {
    pub const MAX_COLS: u8 = 40;
    pub const MAX_ROWS: u8 = 4;

    /// Creates a new geometry.
    ///
    /// # Errors
    /// - [LcdError::InvalidArgument] if `cols` is not in `1..=40` or `rows` not in `1..=4`.
    pub fn new(cols: u8, rows: u8, char_size: CharSize) -> LcdResult<Self> {
        if !(1..=Self::MAX_COLS).contains(&cols) || !(1..=Self::MAX_ROWS).contains(&rows) {
            return Err(LcdError::InvalidArgument);
        }
        Ok(Geometry {
            cols,
            rows,
            char_size,
        })
    }

    pub fn cols(&self) -> u8 {
        self.cols
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    pub fn char_size(&self) -> CharSize {
        self.char_size
    }

    /// DDRAM address of `(col, row)`.
    ///
    /// Rows past the last one are clamped to the last row. Columns are not clamped: an address past
    /// the visible width lands in off-screen DDRAM, which scrolls into view when the display is
    /// shifted. The result wraps within the 7-bit DDRAM address space.
    pub fn ddram_address(&self, col: u8, row: u8) -> u8 {
        let row = row.min(self.rows - 1);
        col.wrapping_add(ROW_OFFSETS[row as usize]) & command::DDRAM_ADDRESS_MASK
    }
}

/// Shadow of the entry mode register.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct EntryMode(u8);

impl EntryMode {
    pub fn from_bits(bits: u8) -> Self {
        EntryMode(bits & (command::ENTRY_LEFT | command::ENTRY_SHIFT_INCREMENT))
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Direction the cursor advances in after each data write.
    pub fn direction(&self) -> CursorDirection {
        if self.0 & command::ENTRY_LEFT != 0 {
            CursorDirection::Right
        } else {
            CursorDirection::Left
        }
    }

    pub fn set_direction(&mut self, direction: CursorDirection) {
        set_flag(&mut self.0, command::ENTRY_LEFT, direction == CursorDirection::Right);
    }

    /// Whether the display shifts instead of the cursor on each data write.
    pub fn shift(&self) -> bool {
        self.0 & command::ENTRY_SHIFT_INCREMENT != 0
    }

    pub fn set_shift(&mut self, shift: bool) {
        set_flag(&mut self.0, command::ENTRY_SHIFT_INCREMENT, shift);
    }
}

/// Shadow of the display control register.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct DisplayControl(u8);

impl DisplayControl {
    pub fn from_bits(bits: u8) -> Self {
        DisplayControl(bits & (command::DISPLAY_ON | command::CURSOR_ON | command::BLINK_ON))
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn display_on(&self) -> bool {
        self.0 & command::DISPLAY_ON != 0
    }

    pub fn set_display_on(&mut self, on: bool) {
        set_flag(&mut self.0, command::DISPLAY_ON, on);
    }

    pub fn cursor_on(&self) -> bool {
        self.0 & command::CURSOR_ON != 0
    }

    pub fn set_cursor_on(&mut self, on: bool) {
        set_flag(&mut self.0, command::CURSOR_ON, on);
    }

    pub fn blink_on(&self) -> bool {
        self.0 & command::BLINK_ON != 0
    }

    pub fn set_blink_on(&mut self, on: bool) {
        set_flag(&mut self.0, command::BLINK_ON, on);
    }
}

/// Shadow of the function set register. Written once, during initialization.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FunctionSet(u8);

impl FunctionSet {
    pub fn new(bus_width: BusWidth, geometry: &Geometry) -> Self {
        let mut bits = 0;
        set_flag(&mut bits, command::EIGHT_BIT_MODE, bus_width == BusWidth::Eight);
        set_flag(&mut bits, command::TWO_LINE, geometry.rows() > 1);
        // The 5x10 font only exists in single-line mode
        set_flag(
            &mut bits,
            command::DOTS_5X10,
            geometry.char_size() == CharSize::Dots5x10 && geometry.rows() == 1,
        );
        FunctionSet(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn eight_bit(&self) -> bool {
        self.0 & command::EIGHT_BIT_MODE != 0
    }

    pub fn two_line(&self) -> bool {
        self.0 & command::TWO_LINE != 0
    }

    pub fn font_5x10(&self) -> bool {
        self.0 & command::DOTS_5X10 != 0
    }
}

fn set_flag(bits: &mut u8, flag: u8, on: bool) {
    if on {
        *bits |= flag;
    } else {
        *bits &= !flag;
    }
}

/// The `HD44780Driver` trait is the raw HD44780 instruction set.
///
/// Each command is a byte made of an opcode and its flag bits, sent with RS set to `0`. Data bytes
/// are sent with RS set to `1` and land in whichever RAM (CGRAM or DDRAM) the last address command
/// selected.
pub trait HD44780Driver: Debug {
    /// Clears the display and sets the cursor to the home position.
    ///
    /// Command: `00000001`.
    fn clear_display(&mut self) -> LcdResult<()> {
        self.send_command(command::CLEAR_DISPLAY)
    }

    /// Sets the cursor to the home position and undoes any display shift.
    ///
    /// Command: `0000001?`.
    fn return_home(&mut self) -> LcdResult<()> {
        self.send_command(command::RETURN_HOME)
    }

    /// Sets the entry mode, which controls the cursor direction and whether the display shifts.
    ///
    /// Command: `000001IS`.
    /// `I` is `1` for right cursor direction, `0` for left cursor direction.
    /// `S` is `1` for display shift, `0` for no display shift.
    fn set_entry_mode(&mut self, mode: EntryMode) -> LcdResult<()> {
        self.send_command(command::ENTRY_MODE_SET | mode.bits())
    }

    /// Turns the display on or off, and controls the cursor and its blinking.
    ///
    /// Command: `00001DCB`.
    fn set_display_control(&mut self, control: DisplayControl) -> LcdResult<()> {
        self.send_command(command::DISPLAY_CONTROL | control.bits())
    }

    /// Moves the cursor or shifts the display by one in the specified direction, without changing DDRAM.
    ///
    /// Command: `0001DR??`.
    /// `D` is `1` for display shift, `0` for cursor move.
    /// `R` is `1` for right shift, `0` for left shift.
    fn cursor_shift(&mut self, display_shift: bool, direction: CursorDirection) -> LcdResult<()> {
        let mut command = command::CURSOR_SHIFT;
        if display_shift {
            command |= command::DISPLAY_MOVE;
        }
        if direction == CursorDirection::Right {
            command |= command::MOVE_RIGHT;
        }
        self.send_command(command)
    }

    /// Sets the bus width, line count and font.
    ///
    /// Command: `001BLF??`.
    fn function_set(&mut self, function: FunctionSet) -> LcdResult<()> {
        self.send_command(command::FUNCTION_SET | function.bits())
    }

    /// Sets the CGRAM address. Following data writes define custom characters.
    ///
    /// The address is a 6-bit value. If out of bounds, it will return [LcdError::InvalidArgument].
    fn set_cgram_address(&mut self, address: u8) -> LcdResult<()> {
        if address > command::CGRAM_ADDRESS_MASK {
            return Err(LcdError::InvalidArgument);
        }
        self.send_command(command::SET_CGRAM_ADDRESS | address)
    }

    /// Sets the DDRAM address, i.e. the cursor position.
    ///
    /// The address is a 7-bit value. If out of bounds, it will return [LcdError::InvalidArgument].
    fn set_ddram_address(&mut self, address: u8) -> LcdResult<()> {
        if address > command::DDRAM_ADDRESS_MASK {
            return Err(LcdError::InvalidArgument);
        }
        self.send_command(command::SET_DDRAM_ADDRESS | address)
    }

    /// Reads the busy flag and address counter.
    fn get_busy_flag_and_address(&mut self) -> LcdResult<(bool, u8)> {
        let status = self.read_command()?;
        let busy_flag = status & 0b10000000 != 0;
        let address = status & command::DDRAM_ADDRESS_MASK;
        Ok((busy_flag, address))
    }

    // Low-level primitives, implemented by the driver.

    /// Sends a command to the controller, with RS set to `0`.
    fn send_command(&mut self, command: u8) -> LcdResult<()>;

    /// Sends data to the controller, with RS set to `1`.
    fn send_data(&mut self, data: u8) -> LcdResult<()>;

    /// Reads the busy flag and address counter, with RS set to `0`.
    fn read_command(&mut self) -> LcdResult<u8>;

    /// Reads data from the current CGRAM or DDRAM address, with RS set to `1`.
    fn read_data(&mut self) -> LcdResult<u8>;
}
