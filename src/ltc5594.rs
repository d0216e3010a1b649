//! LTC5594 wideband IQ demodulator
//!
//! 8-bit registers 0x00..0x17, frames `[R/W | address, data]`. The LO
//! matching network has to follow the LO frequency, so the demodulator is
//! retuned whenever the synthesizer feeding it moves.

use embedded_hal::blocking::spi::Transfer;

use crate::device::*;
use crate::errors::*;
use crate::register::*;
use crate::sequencer::Retune;

/// Chip ID register
const CHIPID_ADDR: u8 = 0x17;

/// Control register, holds the self-clearing soft reset
const CTRL_ADDR: u8 = 0x16;

/// LTC5594 register file
#[derive(Debug, Clone)]
pub struct Ltc5594Map;

impl RegisterMap for Ltc5594Map {
    type Word = u8;
    const DEFAULTS: &'static [u8] = &POWER_ON;

    fn writable(addr: u8) -> bool {
        addr != CHIPID_ADDR
    }

    fn verify_exempt(addr: u8) -> bool {
        addr == CTRL_ADDR
    }
}

/// Shadow image of one LTC5594
pub type Ltc5594Image = RegisterImage<Ltc5594Map>;

#[rustfmt::skip]
const POWER_ON: [u8; 0x18] = [
    0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80,
    0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80,
    0x04, 0x82, 0x48, 0xE3, 0x80, 0x6A, 0xF0, 0x00,
];

gen_field!(
    /// Q channel IM3 correction, Y term
    IM3QY, 0x00, 0, 8);
gen_field!(
    /// Q channel IM3 correction, X term
    IM3QX, 0x01, 0, 8);
gen_field!(
    /// I channel IM3 correction, Y term
    IM3IY, 0x02, 0, 8);
gen_field!(
    /// I channel IM3 correction, X term
    IM3IX, 0x03, 0, 8);
gen_field!(
    /// Q channel IM2 correction
    IM2QX, 0x04, 0, 8);
gen_field!(
    /// I channel IM2 correction
    IM2IX, 0x05, 0, 8);
gen_field!(
    /// Q channel HD3 correction, Y term
    HD3QY, 0x06, 0, 8);
gen_field!(
    /// Q channel HD3 correction, X term
    HD3QX, 0x07, 0, 8);
gen_field!(
    /// I channel HD3 correction, Y term
    HD3IY, 0x08, 0, 8);
gen_field!(
    /// I channel HD3 correction, X term
    HD3IX, 0x09, 0, 8);
gen_field!(
    /// Q channel HD2 correction, Y term
    HD2QY, 0x0A, 0, 8);
gen_field!(
    /// Q channel HD2 correction, X term
    HD2QX, 0x0B, 0, 8);
gen_field!(
    /// I channel HD2 correction, Y term
    HD2IY, 0x0C, 0, 8);
gen_field!(
    /// I channel HD2 correction, X term
    HD2IX, 0x0D, 0, 8);
gen_field!(
    /// I channel DC offset, 0x80 is zero
    DCOI, 0x0E, 0, 8);
gen_field!(
    /// Q channel DC offset, 0x80 is zero
    DCOQ, 0x0F, 0, 8);
gen_field!(
    /// IP3 current adjust
    IP3IC, 0x10, 0, 3);
gen_field!(
    /// IP3 capacitor adjust
    IP3CC, 0x11, 0, 2);
gen_field!(
    /// IQ gain error adjust, 0x20 is zero
    GERR, 0x11, 2, 6);
gen_field!(
    /// LO matching capacitor 1
    CF1, 0x12, 0, 5);
gen_field!(
    /// LO bias common-mode
    LVCM, 0x12, 5, 3);
gen_field!(
    /// LO matching capacitor 2
    CF2, 0x13, 0, 5);
gen_field!(
    /// LO matching inductor
    LF1, 0x13, 5, 2);
gen_field!(
    /// LO band, 1 above ~1.05 GHz
    BAND, 0x13, 7, 1);
gen_field!(
    /// IF amplifier current
    AMPIC, 0x15, 0, 2);
gen_field!(
    /// IF amplifier capacitance
    AMPCC, 0x15, 2, 2);
gen_field!(
    /// IF amplifier gain
    AMPG, 0x15, 4, 3);
gen_field!(
    /// SDO readback mode
    SDO_MODE, 0x16, 2, 1);
gen_field!(
    /// Soft reset, self-clearing
    SRST, 0x16, 3, 1);
gen_field!(
    /// IF amplifier enable
    EAMP, 0x16, 4, 1);
gen_field!(
    /// Adjustment enable
    EADJ, 0x16, 5, 1);
gen_field!(
    /// DC offset correction enable
    EDC, 0x16, 6, 1);
gen_field!(
    /// Demodulator enable
    EDEM, 0x16, 7, 1);
gen_field!(
    /// Chip ID, read only
    CHIPID, CHIPID_ADDR, 0, 8);

/// IQ phase error adjust, 9 bits: 0x14 holds bits 8..1, 0x15[7] bit 0.
/// 0x100 is zero.
pub const PHA: SplitField = SplitField::new(
    FieldDescriptor::new(0x14, 0, 8),
    FieldDescriptor::new(0x15, 7, 1),
);

/// LO matching settings for one frequency range
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LoBand {
    /// Upper edge, exclusive, Hz
    pub below: u64,
    /// BAND
    pub band: u8,
    /// CF1
    pub cf1: u8,
    /// LF1
    pub lf1: u8,
    /// CF2
    pub cf2: u8,
}

macro_rules! gen_lo_band {
    ($below:expr, $band:expr, $cf1:expr, $lf1:expr, $cf2:expr) => {
        LoBand { below: $below, band: $band, cf1: $cf1, lf1: $lf1, cf2: $cf2 }
    };
}

/// LO matching table, ordered by frequency
#[rustfmt::skip]
pub static LO_BANDS: [LoBand; 16] = [
    gen_lo_band!(  339_000_000, 0, 31, 3, 31),
    gen_lo_band!(  398_000_000, 0, 21, 3, 24),
    gen_lo_band!(  419_000_000, 0, 14, 3, 23),
    gen_lo_band!(  556_000_000, 0, 17, 2, 31),
    gen_lo_band!(  625_000_000, 0, 10, 2, 23),
    gen_lo_band!(  801_000_000, 0, 15, 1, 31),
    gen_lo_band!(  831_000_000, 0, 14, 1, 27),
    gen_lo_band!(1_046_000_000, 0,  8, 1, 21),
    gen_lo_band!(1_242_000_000, 1, 31, 3, 31),
    gen_lo_band!(1_411_000_000, 1, 21, 3, 28),
    gen_lo_band!(1_696_000_000, 1, 17, 2, 26),
    gen_lo_band!(2_070_000_000, 1, 15, 1, 31),
    gen_lo_band!(2_470_000_000, 1,  8, 1, 21),
    gen_lo_band!(2_980_000_000, 1,  2, 1, 10),
    gen_lo_band!(3_500_000_000, 1,  1, 0, 19),
    gen_lo_band!(     u64::MAX, 1,  0, 0,  0),
];

/// Matching settings for an LO frequency
pub fn lo_band(f_lo: u64) -> &'static LoBand {
    LO_BANDS
        .iter()
        .find(|b| f_lo < b.below)
        .unwrap_or(&LO_BANDS[LO_BANDS.len() - 1])
}

/// IQ channel
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Channel {
    /// In-phase
    I,
    /// Quadrature
    Q,
}

/// LTC5594 device
pub struct Ltc5594<SPI> {
    programmer: Programmer<SPI, Ltc5594Map>,
}

impl<SPI> Ltc5594<SPI>
where SPI: Transfer<u8>,
{
    /// Creates the device driver with a power-on image
    pub fn new(spi: SPI) -> Self {
        Ltc5594 { programmer: Programmer::new(spi) }
    }

    /// Read each register back after writing it
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.programmer = self.programmer.with_verify(verify);
        self
    }

    /// Update the LO matching network fields for `f_lo`
    pub fn set_lo_frequency(&mut self, f_lo: u64) -> Result<(), Error> {
        let b = lo_band(f_lo);
        log::debug!("LTC5594 LO {} Hz: band {} CF1 {} LF1 {} CF2 {}", f_lo, b.band, b.cf1, b.lf1, b.cf2);
        let image = self.programmer.image_mut();
        image.write(BAND, b.band as u32)?;
        image.write(CF1, b.cf1 as u32)?;
        image.write(LF1, b.lf1 as u32)?;
        image.write(CF2, b.cf2 as u32)?;
        Ok(())
    }

    /// DC offset of one channel, 0x80 is zero
    pub fn set_dc_offset(&mut self, channel: Channel, offset: u8) -> Result<(), Error> {
        let f = match channel {
            Channel::I => DCOI,
            Channel::Q => DCOQ,
        };
        self.programmer.image_mut().write(f, offset as u32).map(|_| ())
    }

    /// IQ gain error, 6 bits, 0x20 is zero
    pub fn set_gain_error(&mut self, gerr: u8) -> Result<(), Error> {
        self.programmer.image_mut().write(GERR, gerr as u32).map(|_| ())
    }

    /// IQ phase error, 9 bits, 0x100 is zero
    pub fn set_phase_error(&mut self, pha: u16) -> Result<(), Error> {
        self.programmer.image_mut().write_split(PHA, pha as u64).map(|_| ())
    }

    /// IQ phase error currently in the image
    pub fn phase_error(&self) -> Result<u16, Error> {
        Ok(self.programmer.image().read_split(PHA)? as u16)
    }

    /// Write the image out
    pub fn program(&mut self, mode: ProgramMode) -> Result<usize, Error> {
        self.programmer.program(mode)
    }

    /// Read the chip ID
    pub fn chip_id(&mut self) -> Result<u8, Error> {
        self.programmer.read_register(CHIPID.addr)
    }

    /// Shadow image
    #[inline]
    pub fn image(&self) -> &Ltc5594Image {
        self.programmer.image()
    }
}

impl<SPI> Retune for Ltc5594<SPI>
where SPI: Transfer<u8>,
{
    fn retune(&mut self, f_hz: u64) -> Result<(), Error> {
        self.set_lo_frequency(f_hz)?;
        self.program(ProgramMode::Partial).map(|_| ())
    }
}
