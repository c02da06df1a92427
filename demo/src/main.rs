mod config;
mod dry_run;

use crate::config::{Config, TransportConfig, active_level};
use crate::dry_run::DryRunI2c;
use crystal_lcd::delay::ThreadDelay;
use crystal_lcd::gpio::gpiod::GpiodDriver;
use crystal_lcd::gpio::GpioDriver;
use crystal_lcd::hd44780::transport::{ExpanderTransport, GpioTransport, Transport};
use crystal_lcd::{CharSize, CharacterLcd};
use dotenv::dotenv;
use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};
use std::fmt::Write;
use std::thread::sleep;
use std::time::Duration;

/// A small bell, uploaded as custom character 0.
const BELL: [u8; 8] = [
    0b00100, 0b01110, 0b01110, 0b01110, 0b11111, 0b00000, 0b00100, 0b00000,
];

/// Shown right-aligned on the second row.
const VERSION: &str = concat!("v.", env!("CARGO_PKG_VERSION"));

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    info!("Crystal LCD demo starting...");

    debug!("Trying to load config...");
    let config = if let Some(config) = Config::try_load()? {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found, using default config.");
        let config = Config::default();
        config.save()?;
        config
    };
    debug!("{:?}", config);

    let char_size = config.char_size.into();

    match &config.transport {
        TransportConfig::Gpio {
            chip,
            e,
            rs,
            rw,
            data,
            backlight,
            backlight_active_low,
        } => {
            info!(
                "LCD @ {} E: {}, RS: {}, RW: {:?}, Data: {:?}, Backlight: {:?}",
                chip, e, rs, rw, data, backlight
            );

            let gpio = GpiodDriver::open(chip)?;
            debug!("{:?} initialized.", gpio);

            let mut pin_e = gpio.get_pin(*e)?;
            let pin_e_out = pin_e.as_output()?;
            let mut pin_rs = gpio.get_pin(*rs)?;
            let pin_rs_out = pin_rs.as_output()?;
            let mut pin_rw = rw.map(|index| gpio.get_pin(index)).transpose()?;
            let pin_rw_out = match pin_rw.as_mut() {
                Some(pin) => Some(pin.as_output()?),
                None => None,
            };
            let mut pin_backlight = backlight.map(|index| gpio.get_pin(index)).transpose()?;
            let pin_backlight_out = match pin_backlight.as_mut() {
                Some(pin) => Some(pin.as_output()?),
                None => None,
            };
            let backlight_level = active_level(*backlight_active_low);

            match data.len() {
                4 => {
                    let mut bus = gpio.get_pin_bus::<4>(data.as_slice().try_into()?)?;
                    let mut transport = GpioTransport::new_4bit(
                        &*pin_e_out,
                        pin_rw_out.as_deref(),
                        &*pin_rs_out,
                        &mut *bus,
                    );
                    if let Some(pin) = pin_backlight_out.as_deref() {
                        transport = transport.with_backlight(pin, backlight_level);
                    }
                    run(CharacterLcd::new(transport, ThreadDelay), &config, char_size)?;
                    Ok(())
                }
                8 => {
                    let mut bus = gpio.get_pin_bus::<8>(data.as_slice().try_into()?)?;
                    let mut transport = GpioTransport::new_8bit(
                        &*pin_e_out,
                        pin_rw_out.as_deref(),
                        &*pin_rs_out,
                        &mut *bus,
                    );
                    if let Some(pin) = pin_backlight_out.as_deref() {
                        transport = transport.with_backlight(pin, backlight_level);
                    }
                    run(CharacterLcd::new(transport, ThreadDelay), &config, char_size)?;
                    Ok(())
                }
                n => Err(eyre::eyre!("Invalid number of data pins: {}", n)),
            }
        }
        TransportConfig::Expander { address, .. } => {
            let expander = config
                .transport
                .expander_config()
                .ok_or_else(|| eyre::eyre!("Not an expander transport"))?;
            info!("LCD @ I2C {:#04x}, pins: {:?}", address, expander.pins);
            warn!("No I2C bus backend available, running against a dry-run bus.");

            let transport = ExpanderTransport::new(DryRunI2c::new(*address), expander)?;
            let lcd = CharacterLcd::new(transport, ThreadDelay);
            let lcd = run(lcd, &config, char_size)?;
            let (transport, _) = lcd.into_inner().release();
            info!("{} bytes sent to the expander.", transport.release().writes());
            Ok(())
        }
    }
}

/// Runs the demo on an uninitialized display, and gives it back.
fn run<T: Transport, D: DelayNs>(
    mut lcd: CharacterLcd<T, D>,
    config: &Config,
    char_size: CharSize,
) -> eyre::Result<CharacterLcd<T, D>> {
    debug!("Initializing LCD...");
    lcd.set_backlight(true)?;
    lcd.begin(config.cols, config.rows, char_size)?;
    debug!("{:?} initialized.", *lcd);

    lcd.create_char(0, &BELL)?;

    lcd.set_cursor(0, 0)?;
    lcd.write(0)?;
    lcd.print(" Hello!")?;

    let version_col = config.cols.saturating_sub(VERSION.len() as u8);
    lcd.set_cursor(version_col, 1)?;
    write!(lcd, "{}", VERSION)?;

    if lcd.supports_read() {
        let glyph = lcd.get_char_at(0, 0)?;
        debug!("Character at (0, 0): {:#04x}", glyph);
    }

    for _ in 0..3 {
        sleep(Duration::from_millis(500));
        lcd.no_backlight()?;
        sleep(Duration::from_millis(500));
        lcd.backlight()?;
    }

    info!("Done.");
    Ok(lcd)
}
