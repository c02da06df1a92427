//! Character-device view of the display: text in, glyphs on screen.
use crate::hd44780::transport::Transport;
use crate::hd44780::{HD44780Driver, Hd44780};
use crate::{LcdError, LcdResult};
use embedded_hal::delay::DelayNs;
use log::{debug, warn};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// A character LCD, as applications see it.
///
/// Dereferences to the [protocol engine](Hd44780), so the whole command catalogue
/// (`begin`, `clear`, `cursor`, `autoscroll`, ...) is available directly.
#[derive(Debug)]
pub struct CharacterLcd<T, D> {
    driver: Hd44780<T, D>,
}

impl<T: Transport, D: DelayNs> CharacterLcd<T, D> {
    pub fn new(transport: T, delay: D) -> Self {
        let driver = Hd44780::new(transport, delay);
        debug!(
            "Character LCD over {:?} bus, read-back {}",
            driver.transport().bus_width(),
            if driver.supports_read() { "supported" } else { "not supported" }
        );
        CharacterLcd { driver }
    }

    pub fn into_inner(self) -> Hd44780<T, D> {
        self.driver
    }

    /// Writes one character code at the cursor. Codes `0..=7` show the custom glyphs.
    ///
    /// Returns the number of bytes written.
    pub fn write(&mut self, byte: u8) -> LcdResult<usize> {
        self.driver.write_data(byte)
    }

    /// Writes the character codes in order, stopping at the first failure.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> LcdResult<usize> {
        let mut written = 0;
        for &byte in bytes {
            written += self.driver.write_data(byte)?;
        }
        Ok(written)
    }

    /// Prints a string at the cursor.
    ///
    /// Control characters (`\n` included) are sent as character codes like any other ASCII
    /// character. Anything outside ASCII is printed as `?`.
    pub fn print(&mut self, s: &str) -> LcdResult<usize> {
        let mut written = 0;
        for c in s.chars() {
            if c.is_ascii() {
                written += self.driver.write_data(c as u8)?;
            } else {
                warn!("Non-ASCII character: {}", c);
                written += self.driver.write_data(b'?')?;
            }
        }
        Ok(written)
    }

    /// Turns the display and the backlight on.
    pub fn on(&mut self) -> LcdResult<()> {
        self.driver.display()?;
        self.driver.set_backlight(true)
    }

    /// Turns the display and the backlight off. DDRAM is kept.
    pub fn off(&mut self) -> LcdResult<()> {
        self.driver.no_display()?;
        self.driver.set_backlight(false)
    }

    pub fn backlight(&mut self) -> LcdResult<()> {
        self.driver.set_backlight(true)
    }

    pub fn no_backlight(&mut self) -> LcdResult<()> {
        self.driver.set_backlight(false)
    }

    /// Reads the character code shown at `(col, row)`.
    ///
    /// Leaves the cursor one cell past `(col, row)`.
    ///
    /// # Errors
    /// - [LcdError::NotSupported] if the transport cannot read. Nothing is sent in that case.
    pub fn get_char_at(&mut self, col: u8, row: u8) -> LcdResult<u8> {
        if !self.driver.supports_read() {
            return Err(LcdError::NotSupported);
        }
        self.driver.set_cursor(col, row)?;
        self.driver.read_data()
    }
}

impl<T, D> Deref for CharacterLcd<T, D> {
    type Target = Hd44780<T, D>;

    fn deref(&self) -> &Self::Target {
        &self.driver
    }
}

impl<T, D> DerefMut for CharacterLcd<T, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.driver
    }
}

impl<T: Transport, D: DelayNs> fmt::Write for CharacterLcd<T, D> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        match self.print(s) {
            Ok(_) => Ok(()),
            Err(err) => {
                self.driver.record_error(err);
                Err(fmt::Error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hd44780::CharSize;
    use crate::hd44780::transport::{ExpanderConfig, ExpanderTransport};
    use crate::mock::{Event, FakeController, MockI2c, Recorder, RecordingDelay};
    use std::fmt::Write;

    fn lcd(
        controller: FakeController,
        recorder: &Recorder,
    ) -> CharacterLcd<FakeController, RecordingDelay> {
        let mut lcd = CharacterLcd::new(controller, RecordingDelay::new(recorder));
        lcd.begin(16, 2, CharSize::Dots5x8).unwrap();
        recorder.clear();
        lcd
    }

    #[test]
    fn test_print_ascii() {
        let recorder = Recorder::new();
        let mut lcd = lcd(FakeController::new(&recorder), &recorder);

        assert_eq!(lcd.print("Hi\n"), Ok(3));
        assert_eq!(
            recorder.traffic(),
            vec![Event::Data(b'H'), Event::Data(b'i'), Event::Data(b'\n')]
        );
    }

    #[test]
    fn test_print_replaces_non_ascii() {
        let recorder = Recorder::new();
        let mut lcd = lcd(FakeController::new(&recorder), &recorder);

        assert_eq!(lcd.print("zł"), Ok(2));
        assert_eq!(recorder.traffic(), vec![Event::Data(b'z'), Event::Data(b'?')]);
    }

    #[test]
    fn test_fmt_write() {
        let recorder = Recorder::new();
        let mut lcd = lcd(FakeController::new(&recorder), &recorder);

        write!(lcd, "{:>3}", 7).unwrap();
        assert_eq!(&lcd.transport().ddram()[..3], b"  7");
    }

    #[test]
    fn test_fmt_write_records_error() {
        let recorder = Recorder::new();
        let mut lcd = lcd(FakeController::new(&recorder), &recorder);

        recorder.set_fail(true);
        assert!(write!(lcd, "x").is_err());
        assert_eq!(lcd.take_last_error(), Some(LcdError::Nack));
    }

    #[test]
    fn test_write_bytes() {
        let recorder = Recorder::new();
        let mut lcd = lcd(FakeController::new(&recorder), &recorder);

        lcd.set_cursor(4, 1).unwrap();
        assert_eq!(lcd.write_bytes(&[0, 1, b'A']), Ok(3));
        assert_eq!(lcd.write(b'B'), Ok(1));
        assert_eq!(&lcd.transport().ddram()[0x44..0x48], &[0, 1, b'A', b'B']);
    }

    #[test]
    fn test_on_off() {
        let recorder = Recorder::new();
        let mut lcd = lcd(FakeController::new(&recorder), &recorder);

        lcd.off().unwrap();
        assert!(!lcd.display_control().display_on());
        assert!(!lcd.is_backlight_on());
        lcd.on().unwrap();
        assert!(lcd.display_control().display_on());

        let events: Vec<Event> = recorder
            .events()
            .into_iter()
            .filter(|event| matches!(event, Event::Command(_) | Event::Backlight(_)))
            .collect();
        assert_eq!(
            events,
            vec![
                Event::Command(0x08),
                Event::Backlight(false),
                Event::Command(0x0C),
                Event::Backlight(true),
            ]
        );
    }

    #[test]
    fn test_backlight_toggle() {
        let recorder = Recorder::new();
        let mut lcd = lcd(FakeController::new(&recorder), &recorder);

        lcd.backlight().unwrap();
        assert!(lcd.is_backlight_on());
        lcd.no_backlight().unwrap();
        assert!(!lcd.is_backlight_on());
    }

    #[test]
    fn test_get_char_at_round_trip() {
        let recorder = Recorder::new();
        let mut lcd = lcd(FakeController::new(&recorder).readable(), &recorder);
        let glyph = [0x1F, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1F, 0x00];

        lcd.create_char(3, &glyph).unwrap();
        lcd.set_cursor(0, 0).unwrap();
        lcd.write(3).unwrap();

        assert_eq!(lcd.get_char_at(0, 0), Ok(3));
    }

    #[test]
    fn test_get_char_at_over_expander() {
        let recorder = Recorder::new();
        let transport =
            ExpanderTransport::new(MockI2c::new(0x27, &recorder), ExpanderConfig::new(0x27)).unwrap();
        let mut lcd = CharacterLcd::new(transport, RecordingDelay::default());
        lcd.begin(16, 2, CharSize::Dots5x8).unwrap();
        recorder.clear();
        // Port values sampled during the two read strobes; D4..D7 sit on P4..P7
        recorder.queue_reads(&[0x00, 0x30]);

        assert_eq!(lcd.get_char_at(2, 1), Ok(3));

        let events = recorder.events();
        let writes = recorder.i2c_writes();
        // Set DDRAM address 0xC2, then two reads with RW and RS high and the data lines released
        assert_eq!(writes[..6], [0xC0, 0xC4, 0xC0, 0x20, 0x24, 0x20]);
        assert_eq!(writes[6..], [0xF3, 0xF7, 0xF3, 0xF3, 0xF7, 0xF3]);
        assert!(events.contains(&Event::I2cRead(0x00)));
        assert!(events.contains(&Event::I2cRead(0x30)));
    }

    #[test]
    fn test_get_char_at_without_read_support() {
        let recorder = Recorder::new();
        let mut lcd = lcd(FakeController::new(&recorder), &recorder);

        assert_eq!(lcd.get_char_at(0, 0), Err(LcdError::NotSupported));
        assert!(recorder.events().is_empty());
    }
}
