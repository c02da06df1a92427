use crystal_lcd::CharSize;
use crystal_lcd::gpio::GpioActiveLevel;
use crystal_lcd::hd44780::transport::{ExpanderConfig, ExpanderPinMap};
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::env::var_os;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "lcd.json";

#[derive(Serialize, Deserialize, Debug)]
pub struct Config {
    pub cols: u8,
    pub rows: u8,
    #[serde(default)]
    pub char_size: CharSizeConfig,
    pub transport: TransportConfig,
}

#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone)]
pub enum CharSizeConfig {
    #[default]
    #[serde(rename = "5x8")]
    Dots5x8,
    #[serde(rename = "5x10")]
    Dots5x10,
}

impl From<CharSizeConfig> for CharSize {
    fn from(value: CharSizeConfig) -> Self {
        match value {
            CharSizeConfig::Dots5x8 => CharSize::Dots5x8,
            CharSizeConfig::Dots5x10 => CharSize::Dots5x10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Display wired straight to the host GPIO lines.
    Gpio {
        chip: String,
        e: usize,
        rs: usize,
        #[serde(default)]
        rw: Option<usize>,
        /// D4..D7, or D0..D7.
        data: Vec<usize>,
        #[serde(default)]
        backlight: Option<usize>,
        #[serde(default)]
        backlight_active_low: bool,
    },
    /// Display behind an I²C port expander backpack.
    Expander {
        address: u8,
        #[serde(default)]
        pins: Option<PinsConfig>,
        #[serde(default)]
        backlight_active_low: bool,
        #[serde(default = "default_true")]
        rw_connected: bool,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone)]
pub struct PinsConfig {
    pub rs: u8,
    pub rw: u8,
    pub e: u8,
    pub backlight: u8,
    pub data: [u8; 4],
}

impl From<PinsConfig> for ExpanderPinMap {
    fn from(pins: PinsConfig) -> Self {
        ExpanderPinMap {
            rs: pins.rs,
            rw: pins.rw,
            e: pins.e,
            backlight: pins.backlight,
            data: pins.data,
        }
    }
}

pub fn active_level(active_low: bool) -> GpioActiveLevel {
    if active_low {
        GpioActiveLevel::Low
    } else {
        GpioActiveLevel::High
    }
}

impl TransportConfig {
    /// Expander settings, if the display sits behind an expander.
    pub fn expander_config(&self) -> Option<ExpanderConfig> {
        let TransportConfig::Expander {
            address,
            pins,
            backlight_active_low,
            rw_connected,
        } = self
        else {
            return None;
        };

        let mut config = ExpanderConfig::new(*address)
            .with_backlight_level(active_level(*backlight_active_low));
        if let Some(pins) = pins {
            config = config.with_pins((*pins).into());
        }
        if !rw_connected {
            config = config.write_only();
        }
        Some(config)
    }
}

impl Config {
    fn path() -> PathBuf {
        let config_str = var_os("CONFIG_FILE");
        let config_str: &OsStr = config_str
            .as_deref()
            .unwrap_or(OsStr::new(DEFAULT_CONFIG_FILE));
        PathBuf::from(config_str)
    }

    /// Loads the config named by `CONFIG_FILE`.
    ///
    /// Returns `None` if the file does not exist. A file that exists but cannot be read or parsed
    /// is an error, so it never gets replaced by the defaults.
    pub fn try_load() -> eyre::Result<Option<Self>> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(config_path: &Path) -> eyre::Result<Option<Self>> {
        if !config_path.exists() {
            return Ok(None);
        }
        let file = std::fs::File::open(config_path)
            .wrap_err_with(|| format!("Cannot open {}", config_path.display()))?;
        let reader = std::io::BufReader::new(file);
        let config = serde_json::from_reader(reader)
            .wrap_err_with(|| format!("Invalid config in {}", config_path.display()))?;
        Ok(Some(config))
    }

    pub fn save(&self) -> std::io::Result<()> {
        let file = std::fs::File::create(Self::path())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

impl Default for Config {
    /// A 16x2 display behind a PCF8574 backpack at its usual address.
    fn default() -> Self {
        Config {
            cols: 16,
            rows: 2,
            char_size: CharSizeConfig::Dots5x8,
            transport: TransportConfig::Expander {
                address: ExpanderConfig::DEFAULT_ADDRESS,
                pins: None,
                backlight_active_low: false,
                rw_connected: true,
            },
        }
    }
}
