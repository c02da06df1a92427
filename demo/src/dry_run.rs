use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use log::trace;

/// I²C bus that only logs what would be sent, for running the demo without the hardware.
///
/// A single device answers, at the configured address. Reads return `0xFF`, like an expander
/// whose port lines are all pulled up.
#[derive(Debug)]
pub struct DryRunI2c {
    address: u8,
    writes: usize,
}

impl DryRunI2c {
    pub fn new(address: u8) -> Self {
        DryRunI2c { address, writes: 0 }
    }

    /// Number of bytes written so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl ErrorType for DryRunI2c {
    type Error = ErrorKind;
}

impl I2c for DryRunI2c {
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
                    for byte in bytes.iter() {
                        trace!("I2C {:#04x} <- {:08b}", address, byte);
                    }
                    self.writes += bytes.len();
                }
                Operation::Read(buffer) => {
                    buffer.fill(0xFF);
                    trace!("I2C {:#04x} -> {:?}", address, buffer);
                }
            }
        }
        Ok(())
    }
}
