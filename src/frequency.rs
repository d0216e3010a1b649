//! Frequency planning
//!
//! Turns a requested output frequency into the output path, PLL divider
//! ratio, modulator order and VCO core of the synthesizer.
//!
//! f OUT = f PFD × (N + NUM/DEN) × output stage
//!
//! where the output stage is the VCO itself, the output doubler (×2) or
//! the channel divider (÷2^(k+1)).

use crate::{constants::*, errors::*, refin::ReferencePath};

/// One VCO core and the range it covers
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VcoBand {
    /// VCO_SEL value selecting this core
    pub index: u8,
    /// Lowest frequency, Hz
    pub low: u64,
    /// Highest frequency, Hz
    pub high: u64,
    /// Smallest usable PLL_N, by modulator order 0..=3
    pub min_n: [u32; 4],
    /// Typical VCO gain at `low` and `high`, MHz/V
    pub gain: (u32, u32),
}

impl VcoBand {
    /// Frequency lies within the core's range, edges included
    #[inline]
    pub fn contains(&self, vco: f64) -> bool {
        self.low as f64 <= vco && vco <= self.high as f64
    }

    /// Typical VCO gain at `vco`, MHz/V, linear across the core
    pub fn gain_at(&self, vco: f64) -> f64 {
        let d = (vco - self.low as f64) / (self.high - self.low) as f64;
        self.gain.0 as f64 + d * (self.gain.1 as f64 - self.gain.0 as f64)
    }
}

/// Absolute VCO range and its ordered, contiguous core table
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VcoRange {
    /// Lowest VCO frequency, Hz
    pub min: u64,
    /// Highest VCO frequency, Hz
    pub max: u64,
    /// VCO cores
    pub bands: &'static [VcoBand],
}

impl VcoRange {
    /// Lowest output frequency reachable through the channel divider
    #[inline]
    pub fn out_min(&self) -> u64 {
        self.min >> (CHDIV_MAX + 1)
    }

    /// Highest output frequency reachable through the output doubler
    #[inline]
    pub fn out_max(&self) -> u64 {
        2 * self.max
    }

    /// Lowest-index core containing `vco`
    pub fn select_band(&self, vco: f64) -> Result<&VcoBand, Error> {
        self.find_band(|b| b.contains(vco))
    }

    /// Lowest-index core containing the exact frequency `num / den`
    fn select_band_exact(&self, num: u128, den: u128) -> Result<&VcoBand, Error> {
        self.find_band(|b| b.low as u128 * den <= num && num <= b.high as u128 * den)
    }

    fn find_band(&self, contains: impl Fn(&VcoBand) -> bool) -> Result<&VcoBand, Error> {
        self.bands
            .iter()
            .filter(|b| contains(b))
            .min_by_key(|b| b.index)
            .ok_or(Error::InvalidVcoFrequency)
    }
}

/// Path from the VCO to the output pin
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutputStage {
    /// VCO straight out
    Vco,
    /// Output doubler, f OUT = 2 × f VCO
    Doubler,
    /// Channel divider depth k, f OUT = f VCO / 2^(k+1)
    Divider(u8),
}

impl OutputStage {
    /// Output doubler in use
    #[inline]
    pub fn doubler_enabled(self) -> bool {
        self == OutputStage::Doubler
    }

    /// Output frequency for a VCO frequency
    pub fn output(self, vco: f64) -> f64 {
        match self {
            OutputStage::Vco => vco,
            OutputStage::Doubler => vco * 2.0,
            OutputStage::Divider(k) => vco / (1u64 << (k + 1)) as f64,
        }
    }
}

/// Complete divider configuration for one output frequency
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SynthesizerPlan {
    /// Synthesized VCO frequency, Hz
    pub vco: f64,
    /// Output path
    pub output: OutputStage,
    /// PLL_N
    pub n: u32,
    /// PLL_NUM
    pub numerator: u32,
    /// PLL_DEN
    pub denominator: u32,
    /// MASH_ORDER, 0 disables the fractional path
    pub modulator_order: u8,
    /// VCO_SEL
    pub vco_band: u8,
    /// Phase detector frequency, Hz
    pub f_pfd: f64,
    /// Output frequency the settings produce, Hz
    pub achieved: f64,
}

impl SynthesizerPlan {
    /// Rebuild a plan from raw divider settings
    pub fn from_settings(
        reference: &ReferencePath,
        output: OutputStage,
        n: u32,
        numerator: u32,
        denominator: u32,
        modulator_order: u8,
        vco_band: u8,
    ) -> Self {
        let f_pfd = reference.f_pfd();
        let (num, den) = vco_ratio(reference, n, numerator, denominator);
        let vco = num as f64 / den as f64;

        SynthesizerPlan {
            vco,
            output,
            n,
            numerator,
            denominator,
            modulator_order,
            vco_band,
            f_pfd,
            achieved: output.output(vco),
        }
    }

    /// Output doubler in use
    #[inline]
    pub fn doubler_enabled(&self) -> bool {
        self.output.doubler_enabled()
    }

    /// Fractional path disabled
    #[inline]
    pub fn is_integer(&self) -> bool {
        self.modulator_order == 0
    }
}

/// Delta-sigma modulator order for a reduced denominator
pub fn modulator_order(denominator: u32) -> u8 {
    if denominator < 7 {
        1
    } else if denominator & 1 == 1 {
        2
    } else {
        3
    }
}

/// Greatest common divisor
pub fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Plan the synthesizer for `f_out` Hz
pub fn plan(f_out: u64, reference: &ReferencePath, vco: &VcoRange) -> Result<SynthesizerPlan, Error> {
    if !(vco.out_min()..=vco.out_max()).contains(&f_out) {
        return Err(Error::InvalidOutputFrequency);
    }

    // VCO frequency as vco_num / vco_den
    let (output, vco_num, vco_den) = output_path(f_out, vco)?;

    // N + NUM/DEN = f VCO / f PFD = p / q
    let (pfd_num, pfd_den) = reference.f_pfd_ratio();
    let p = vco_num as u128 * pfd_den as u128;
    let q = vco_den as u128 * pfd_num as u128;

    // Rounding to the nearest step can leave the VCO range when the request
    // sits on its edge, round towards the inside instead
    let mut div = divide(p, q, Rounding::Nearest);
    let (num, den) = vco_ratio(reference, div.n, div.numerator, div.denominator);
    if num < vco.min as u128 * den {
        div = divide(p, q, Rounding::Up);
    } else if num > vco.max as u128 * den {
        div = divide(p, q, Rounding::Down);
    }
    if div.n > PLL_N_MAX as u32 {
        return Err(Error::InvalidReferenceFrequency);
    }

    let (num, den) = vco_ratio(reference, div.n, div.numerator, div.denominator);
    let band = vco.select_band_exact(num, den)?;
    if div.n < band.min_n[div.order as usize] {
        return Err(Error::IntegerDividerTooSmall);
    }

    let mut res = SynthesizerPlan::from_settings(
        reference,
        output,
        div.n,
        div.numerator,
        div.denominator,
        div.order,
        band.index,
    );
    // the exact value lies within the core, keep float rounding from
    // stepping outside it
    res.vco = res.vco.clamp(band.low as f64, band.high as f64);
    res.achieved = output.output(res.vco);

    log::debug!(
        "f_out {} Hz: vco {} Hz ({:?}) core {} N {} NUM {} DEN {} order {} -> {} Hz",
        f_out,
        res.vco,
        res.output,
        res.vco_band,
        res.n,
        res.numerator,
        res.denominator,
        res.modulator_order,
        res.achieved
    );
    Ok(res)
}

/// f VCO of raw divider settings as a reduced ratio
fn vco_ratio(reference: &ReferencePath, n: u32, numerator: u32, denominator: u32) -> (u128, u128) {
    let (pfd_num, pfd_den) = reference.f_pfd_ratio();
    let (num, den) = if numerator == 0 || denominator == 0 {
        (n as u128, 1)
    } else {
        (n as u128 * denominator as u128 + numerator as u128, denominator as u128)
    };
    let (a, b) = (num * pfd_num as u128, den * pfd_den as u128);
    let g = gcd(a, b);
    (a / g, b / g)
}

/// Divider settings for one rounding direction
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Divider {
    n: u32,
    numerator: u32,
    denominator: u32,
    order: u8,
}

/// Split `p / q` into N and a reduced 32-bit fraction
fn divide(p: u128, q: u128, rounding: Rounding) -> Divider {
    // saturates, rejected against PLL_N_MAX by the caller
    let n = u32::try_from(p / q).unwrap_or(u32::MAX);
    match encode_fraction(p % q, q, rounding) {
        Fraction::Integer { carry } => Divider {
            n: n.saturating_add(carry as u32),
            numerator: 0,
            denominator: PLL_DEN_INTEGER,
            order: 0,
        },
        Fraction::Ratio { numerator, denominator } => Divider {
            n,
            numerator,
            denominator,
            order: modulator_order(denominator),
        },
    }
}

/// Pick the output stage, returns the VCO frequency as a ratio
fn output_path(f_out: u64, vco: &VcoRange) -> Result<(OutputStage, u64, u64), Error> {
    if f_out > vco.max {
        return Ok((OutputStage::Doubler, f_out, 2));
    }
    if f_out >= vco.min {
        return Ok((OutputStage::Vco, f_out, 1));
    }

    let mut vcof = f_out * 2;
    let mut k = 0;
    while vcof < vco.min {
        vcof *= 2;
        k += 1;
    }
    if k > CHDIV_MAX {
        Err(Error::InvalidOutputFrequency)
    } else {
        Ok((OutputStage::Divider(k), vcof, 1))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Fraction {
    /// No fractional part; `carry` rounds N up by one
    Integer { carry: bool },
    /// Reduced fraction
    Ratio { numerator: u32, denominator: u32 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Rounding {
    Nearest,
    Up,
    Down,
}

impl Rounding {
    /// `a / b` rounded
    #[inline]
    fn div(self, a: u128, b: u128) -> u128 {
        match self {
            Rounding::Nearest => (2 * a + b) / (2 * b),
            Rounding::Up => (a + b - 1) / b,
            Rounding::Down => a / b,
        }
    }
}

/// Encode `rem / q` (< 1) as a 32-bit fixed-point fraction reduced to
/// lowest terms
fn encode_fraction(rem: u128, q: u128, rounding: Rounding) -> Fraction {
    match reduce(rem, q, 1u128 << FRAC_BITS, rounding) {
        Some(f) => f,
        // an odd numerator needs all of 2^32, one more than PLL_DEN holds
        None => match reduce(rem, q, PLL_DEN_MAX as u128, rounding) {
            Some(f) => f,
            None => Fraction::Integer { carry: false },
        },
    }
}

/// `rem / q` over `modulus`, None if the reduced denominator does not fit
/// PLL_DEN
fn reduce(rem: u128, q: u128, modulus: u128, rounding: Rounding) -> Option<Fraction> {
    let raw = rounding.div(rem * modulus, q);
    if raw == 0 || raw == modulus {
        return Some(Fraction::Integer { carry: raw == modulus });
    }

    let g = gcd(raw, modulus);
    let (numerator, denominator) = (raw / g, modulus / g);
    if denominator > PLL_DEN_MAX as u128 {
        None
    } else {
        Some(Fraction::Ratio { numerator: numerator as u32, denominator: denominator as u32 })
    }
}
