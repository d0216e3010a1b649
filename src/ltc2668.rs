//! [LTC2668](https://www.analog.com/en/products/ltc2668.html) 16 channel,
//! 16-bit voltage output DAC.
//!
//! Drives the mixer bias lines on boards without an IQ demodulator with DC
//! offset registers. Every command is one 24-bit frame, MSB first:
//! command nibble and channel nibble, then the 16-bit code.

use embedded_hal::blocking::spi::Transfer;

use crate::errors::*;

/// Number of outputs
pub const CHANNELS: u8 = 16;

/// Write code to n, update n
const CMD_WRITE_UPDATE: u8 = 0x30;
/// Write span to all
const CMD_SPAN_ALL: u8 = 0xE0;

gen_field_enum!(
    /// Output span, the same for every channel
    Span {
        /// 0 V to 5 V
        Unipolar5V = 0,
        /// 0 V to 10 V
        Unipolar10V = 1,
        /// -5 V to 5 V
        Bipolar5V = 2,
        /// -10 V to 10 V
        Bipolar10V = 3,
        /// -2.5 V to 2.5 V
        Bipolar2V5 = 4,
    }
);

impl Span {
    /// Output voltage at code 0 and code 0xFFFF
    pub fn range(self) -> (f64, f64) {
        match self {
            Span::Unipolar5V => (0.0, 5.0),
            Span::Unipolar10V => (0.0, 10.0),
            Span::Bipolar5V => (-5.0, 5.0),
            Span::Bipolar10V => (-10.0, 10.0),
            Span::Bipolar2V5 => (-2.5, 2.5),
        }
    }

    /// Code producing `volts`, truncated
    pub fn code(self, volts: f64) -> Result<u16, Error> {
        let (lo, hi) = self.range();
        if !(lo..=hi).contains(&volts) {
            return Err(Error::InvalidVoltage);
        }
        Ok(((volts - lo) / (hi - lo) * u16::MAX as f64) as u16)
    }
}

/// LTC2668 DAC
pub struct Ltc2668<SPI> {
    spi: SPI,
    span: Span,
    span_written: bool,
}

impl<SPI> Ltc2668<SPI>
where SPI: Transfer<u8>,
{
    /// DAC with every output in `span`. The span goes out with the first
    /// voltage.
    pub fn new(spi: SPI, span: Span) -> Self {
        Ltc2668 { spi, span, span_written: false }
    }

    /// Output span
    #[inline]
    pub fn span(&self) -> Span {
        self.span
    }

    /// Set output `channel` to `volts`, returns the code written
    pub fn set_voltage(&mut self, channel: u8, volts: f64) -> Result<u16, Error> {
        if channel >= CHANNELS {
            return Err(Error::InvalidFieldValue);
        }
        let code = self.span.code(volts)?;

        if !self.span_written {
            self.write(CMD_SPAN_ALL, self.span as u16)?;
            self.span_written = true;
        }
        self.write(CMD_WRITE_UPDATE | channel, code)?;
        log::debug!("LTC2668 DAC{}: {} V (0x{:04X})", channel, volts, code);
        Ok(code)
    }

    fn write(&mut self, command: u8, data: u16) -> Result<(), Error> {
        let mut frame = [command, (data >> 8) as u8, (data & 0xFF) as u8];
        self.spi.transfer(&mut frame).map_err(|_| Error::Bus)?;
        Ok(())
    }
}
