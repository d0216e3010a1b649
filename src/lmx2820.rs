//! LMX2820 synthesizer
//!
//! 16-bit registers R0..R112, written as 24-bit frames
//! `[R/W | address, data MSB, data LSB]`. Only output A is driven.

use embedded_hal::blocking::spi::Transfer;

use crate::constants::*;
use crate::device::*;
use crate::errors::*;
use crate::frequency::{self, *};
use crate::refin::ReferencePath;
use crate::register::*;

/// LMX2820 register file
#[derive(Debug, Clone)]
pub struct Lmx2820Map;

impl RegisterMap for Lmx2820Map {
    type Word = u16;
    const DEFAULTS: &'static [u16] = &POWER_ON;

    /// R0 carries the self-clearing RESET and calibration bits
    fn verify_exempt(addr: u8) -> bool {
        addr == 0
    }
}

/// Shadow image of one LMX2820
pub type Lmx2820Image = RegisterImage<Lmx2820Map>;

/// Power-on register values, R0..R112
#[rustfmt::skip]
const POWER_ON: [u16; 113] = [
    0x6070, 0x57A0, 0x8032, 0x0041, 0x4204, 0x3832, 0x0A43, 0x00C8,
    0xC802, 0x0005, 0x0000, 0x0612, 0x0408, 0x0038, 0x3001, 0x2001,
    0x271C, 0x1440, 0x03E8, 0x2120, 0x272C, 0x1C64, 0xE2BF, 0x1102,
    0x0E34, 0x0624, 0x0DB0, 0x8001, 0x0639, 0x318C, 0xB18C, 0x0401,
    0x1001, 0x0000, 0x0010, 0x3100, 0x0038, 0x0500, 0x0000, 0x03E8,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x0300, 0x0300,
    0x4180, 0x0000, 0x0080, 0x203F, 0x0000, 0x0000, 0x0000, 0x0002,
    0x0001, 0x0001, 0x0000, 0x1388, 0x01F4, 0x03E8, 0x0000, 0xC350,
    0x4080, 0x0001, 0x003F, 0x0000, 0x0000, 0x0011, 0x004E, 0x0000,
    0x0000, 0x0000, 0x0000, 0x0000, 0x0000, 0x06CC, 0x0001, 0x0116,
    0x01C0, 0x0000, 0x0000, 0x0F00, 0x0040, 0x0000, 0x0040, 0xFF00,
    0x03FF, 0x0000, 0x0000, 0x0000, 0x0000, 0x1000, 0x0000, 0x0000,
    0x17F8, 0x0000, 0x1C80, 0x19B9, 0x0533, 0x03E8, 0x0028, 0x0014,
    0x0014, 0x000A, 0x0000, 0x0000, 0x0000, 0x0000, 0x001F, 0x0000,
    0xFFFF,
];

gen_field!(
    /// Power down the whole device
    POWERDOWN, 0, 0, 1);
gen_field!(
    /// Soft reset, self-clearing
    RESET, 0, 1, 1);
gen_field!(
    /// Frequency calibration on R0 write
    FCAL_EN, 0, 4, 1);
gen_field!(
    /// OSCin doubler
    OSC_2X, 11, 4, 1);
gen_field!(
    /// Reference multiplier
    MULT, 12, 10, 3);
gen_field!(
    /// Reference post-divider
    PLL_R, 13, 5, 8);
gen_field!(
    /// Reference pre-divider
    PLL_R_PRE, 14, 0, 12);
gen_field!(
    /// VCO core, 1..=7
    VCO_SEL, 22, 13, 3);
gen_field!(
    /// Output A channel divider, ÷2^(k+1)
    CHDIVA, 32, 6, 3);
gen_field!(
    /// Delta-sigma modulator order
    MASH_ORDER, 35, 7, 2);
gen_field!(
    /// Feedback divider integer part
    PLL_N, 36, 0, 15);
gen_field!(
    /// Output A source, see [`OutputMux`]
    OUTA_MUX, 78, 0, 2);
gen_field!(
    /// Output A power down
    OUTA_PD, 78, 4, 1);
gen_field!(
    /// Output A power
    OUTA_PWR, 79, 1, 3);

/// Fractional denominator, R38:R39
pub const PLL_DEN: SplitField = SplitField::new(
    FieldDescriptor::new(38, 0, 16),
    FieldDescriptor::new(39, 0, 16),
);

/// Fractional numerator, R42:R43
pub const PLL_NUM: SplitField = SplitField::new(
    FieldDescriptor::new(42, 0, 16),
    FieldDescriptor::new(43, 0, 16),
);

gen_field_enum!(
    /// Output A source
    OutputMux {
        /// Channel divider
        ChannelDivider = 0,
        /// VCO
        Vco = 1,
        /// VCO doubler
        Doubler = 2,
        /// Output off
        HighImpedance = 3,
    }
);

macro_rules! gen_band {
    ($i:expr, $lo:expr, $hi:expr, $min_n:expr, $gain:expr) => {
        VcoBand { index: $i, low: $lo, high: $hi, min_n: $min_n, gain: $gain }
    };
}

/// VCO cores, contiguous over 5.65..11.3 GHz
#[rustfmt::skip]
pub const VCO_BANDS: [VcoBand; 7] = [
    gen_band!(1,  5_650_000_000,  6_350_000_000, [12, 18, 19, 24], (84, 115)),
    gen_band!(2,  6_350_000_000,  7_300_000_000, [14, 21, 22, 26], (94, 131)),
    gen_band!(3,  7_300_000_000,  8_100_000_000, [16, 23, 24, 26], (123, 156)),
    gen_band!(4,  8_100_000_000,  9_000_000_000, [16, 26, 27, 29], (132, 169)),
    gen_band!(5,  9_000_000_000,  9_800_000_000, [18, 28, 29, 31], (131, 163)),
    gen_band!(6,  9_800_000_000, 10_600_000_000, [18, 30, 31, 33], (152, 185)),
    gen_band!(7, 10_600_000_000, 11_300_000_000, [20, 33, 34, 36], (130, 151)),
];

/// LMX2820 VCO
pub const VCO: VcoRange = VcoRange { min: VCO_FREQ_MIN, max: VCO_FREQ_MAX, bands: &VCO_BANDS };

/// Write the reference path fields
pub fn encode_reference(image: &mut Lmx2820Image, reference: &ReferencePath) -> Result<(), Error> {
    image.write(OSC_2X, reference.doubler() as u32)?;
    image.write(MULT, reference.multiplier() as u32)?;
    image.write(PLL_R_PRE, reference.pre_divider() as u32)?;
    image.write(PLL_R, reference.post_divider() as u32)?;
    Ok(())
}

/// Rebuild the reference path from the image
pub fn decode_reference(image: &Lmx2820Image, f_ref: u64) -> Result<ReferencePath, Error> {
    ReferencePath::new(
        f_ref,
        image.read(OSC_2X)? != 0,
        image.read(PLL_R_PRE)? as u16,
        image.read(MULT)? as u8,
        image.read(PLL_R)? as u8,
    )
}

/// Flatten a plan into the image. Only registers whose value changes get
/// dirty.
pub fn encode_plan(image: &mut Lmx2820Image, plan: &SynthesizerPlan) -> Result<(), Error> {
    let mux = match plan.output {
        OutputStage::Vco => OutputMux::Vco,
        OutputStage::Doubler => OutputMux::Doubler,
        OutputStage::Divider(k) => {
            image.write(CHDIVA, k as u32)?;
            OutputMux::ChannelDivider
        }
    };
    image.write(OUTA_MUX, mux.into())?;

    image.write(PLL_N, plan.n)?;
    image.write_split(PLL_DEN, plan.denominator as u64)?;
    image.write_split(PLL_NUM, plan.numerator as u64)?;
    image.write(MASH_ORDER, plan.modulator_order as u32)?;
    image.write(VCO_SEL, plan.vco_band as u32)?;
    Ok(())
}

/// Rebuild the plan the image currently encodes
pub fn decode_plan(image: &Lmx2820Image, reference: &ReferencePath) -> Result<SynthesizerPlan, Error> {
    let output = match OutputMux::try_from(image.read(OUTA_MUX)?)? {
        OutputMux::Vco => OutputStage::Vco,
        OutputMux::Doubler => OutputStage::Doubler,
        OutputMux::ChannelDivider => OutputStage::Divider(image.read(CHDIVA)? as u8),
        OutputMux::HighImpedance => return Err(Error::InvalidFieldValue),
    };

    Ok(SynthesizerPlan::from_settings(
        reference,
        output,
        image.read(PLL_N)?,
        image.read_split(PLL_NUM)? as u32,
        image.read_split(PLL_DEN)? as u32,
        image.read(MASH_ORDER)? as u8,
        image.read(VCO_SEL)? as u8,
    ))
}

/// LMX2820 device
pub struct Lmx2820<SPI> {
    programmer: Programmer<SPI, Lmx2820Map>,
    reference: ReferencePath,
    vco: VcoRange,
    plan: Option<SynthesizerPlan>,
}

impl<SPI> Lmx2820<SPI>
where SPI: Transfer<u8>,
{
    /// Creates the device driver, nothing is written until the first
    /// commit.
    ///
    /// `spi` - SPI device for the synthesizer's chip select
    /// `reference` - OSCin path feeding the phase detector
    pub fn new(spi: SPI, reference: ReferencePath) -> Result<Self, Error> {
        let mut programmer = Programmer::new(spi);
        encode_reference(programmer.image_mut(), &reference)?;
        Ok(Lmx2820 { programmer, reference, vco: VCO, plan: None })
    }

    /// Read each register back after writing it
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.programmer = self.programmer.with_verify(verify);
        self
    }

    /// Reference path
    #[inline]
    pub fn reference(&self) -> &ReferencePath {
        &self.reference
    }

    /// Switch to a different reference path. The current plan no longer
    /// holds and is dropped.
    pub fn set_reference(&mut self, reference: ReferencePath) -> Result<(), Error> {
        encode_reference(self.programmer.image_mut(), &reference)?;
        self.reference = reference;
        self.plan = None;
        Ok(())
    }

    /// Plan `target` Hz without touching the image or the device
    pub fn get_plan(&self, target: u64) -> Result<SynthesizerPlan, Error> {
        frequency::plan(target, &self.reference, &self.vco)
    }

    /// Flatten a plan into the image and mark R0 so the commit ends with a
    /// frequency calibration
    pub fn apply_plan(&mut self, plan: &SynthesizerPlan) -> Result<(), Error> {
        let image = self.programmer.image_mut();
        encode_plan(image, plan)?;
        image.write(FCAL_EN, 1)?;
        image.touch(0)
    }

    /// Write the image out
    pub fn commit(&mut self, mode: ProgramMode) -> Result<usize, Error> {
        self.programmer.program(mode)
    }

    /// Apply and commit a plan. The plan becomes current only once every
    /// register made it out.
    pub fn program_plan(&mut self, plan: &SynthesizerPlan) -> Result<f64, Error> {
        self.apply_plan(plan)?;
        self.commit(ProgramMode::Partial)?;
        self.plan = Some(*plan);
        Ok(plan.achieved)
    }

    /// Tune to `target` Hz, returns the achieved frequency.
    /// Planning errors leave the image and the device untouched.
    pub fn set_frequency(&mut self, target: u64) -> Result<f64, Error> {
        let plan = self.get_plan(target)?;
        self.program_plan(&plan)
    }

    /// Achieved frequency of the last committed plan
    pub fn frequency(&self) -> Option<f64> {
        self.plan.map(|p| p.achieved)
    }

    /// Last committed plan
    pub fn plan(&self) -> Option<&SynthesizerPlan> {
        self.plan.as_ref()
    }

    /// Output A power, 0..=7
    pub fn set_output_power(&mut self, power: u8) -> Result<(), Error> {
        if power > OUT_POWER_MAX {
            return Err(Error::InvalidFieldValue);
        }
        self.programmer.image_mut().write(OUTA_PWR, power as u32)?;
        self.commit(ProgramMode::Partial).map(|_| ())
    }

    /// Power output A up or down
    pub fn set_output_enabled(&mut self, enabled: bool) -> Result<(), Error> {
        self.programmer.image_mut().write(OUTA_PD, !enabled as u32)?;
        self.commit(ProgramMode::Partial).map(|_| ())
    }

    /// Soft-reset the device and write the whole image back
    pub fn reset(&mut self) -> Result<usize, Error> {
        let r0 = self.programmer.image().get(0)?;
        let bit = 1u16 << RESET.offset;
        log::debug!("LMX2820 reset");
        self.programmer.write_register(0, r0 | bit)?;
        self.programmer.write_register(0, r0 & !bit)?;
        self.programmer.image_mut().mark_all_dirty();
        self.commit(ProgramMode::Full)
    }

    /// Read one register from the device
    pub fn read_back(&mut self, addr: u8) -> Result<u16, Error> {
        self.programmer.read_register(addr)
    }

    /// Shadow image
    #[inline]
    pub fn image(&self) -> &Lmx2820Image {
        self.programmer.image()
    }

    /// Shadow image, mutable
    #[inline]
    pub fn image_mut(&mut self) -> &mut Lmx2820Image {
        self.programmer.image_mut()
    }
}
