//! Driver for HD44780-compatible alphanumeric character LCD modules.
//!
//! The crate is split into three layers:
//! - [hd44780::transport] moves nibbles and framing signals to the controller pins, either directly
//!   through [GPIO](gpio) or through an I²C port expander ([hd44780::transport::ExpanderTransport]),
//! - [hd44780::Hd44780] is the protocol engine: initialization, command framing and shadow registers,
//! - [display::CharacterLcd] is the character-device facade used by applications.
pub mod delay;
pub mod display;
pub mod gpio;
pub mod hd44780;

#[cfg(test)]
pub(crate) mod mock;

pub use display::CharacterLcd;
pub use hd44780::{CharSize, Geometry, Hd44780};

use embedded_hal::i2c;
use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum LcdError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("the feature is not supported on this transport")]
    NotSupported,
    #[error("the display has not been initialized")]
    NotInitialized,
    #[error("the display is already initialized")]
    AlreadyInitialized,
    #[error("bus transfer not acknowledged")]
    Nack,
    #[error("bus arbitration lost")]
    ArbitrationLoss,
    #[error("bus error: {0}")]
    Bus(String),
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
}

impl LcdError {
    /// Whether the error came from the transport rather than from misuse of the API.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            LcdError::Nack | LcdError::ArbitrationLoss | LcdError::Bus(_) | LcdError::Io(_)
        )
    }

    /// Maps an [embedded_hal] I²C error onto the driver error.
    pub fn from_i2c<E: i2c::Error>(err: E) -> Self {
        match err.kind() {
            i2c::ErrorKind::NoAcknowledge(_) => LcdError::Nack,
            i2c::ErrorKind::ArbitrationLoss => LcdError::ArbitrationLoss,
            kind => LcdError::Bus(format!("{kind:?}")),
        }
    }
}

impl From<std::io::Error> for LcdError {
    fn from(err: std::io::Error) -> Self {
        LcdError::Io(err.kind())
    }
}

pub type LcdResult<T> = Result<T, LcdError>;
