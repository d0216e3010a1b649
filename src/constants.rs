//! Constants

/// Minimum allowed OSCin frequency
pub const REF_IN_FREQ_MIN: u64 = 5_000_000;

/// Maximum allowed OSCin frequency
pub const REF_IN_FREQ_MAX: u64 = 1_400_000_000;

/// Maximum OSCin frequency with the OSC_2X doubler enabled
pub const REF_IN_DOUBLER_MAX: u64 = 250_000_000;

/// Max Phase Detector Frequency
pub const PFD_FREQ_MAX: u64 = 400_000_000;

/// Fundamental VCO min frequency
pub const VCO_FREQ_MIN: u64 = 5_650_000_000;

/// Fundamental VCO max frequency
pub const VCO_FREQ_MAX: u64 = 11_300_000_000;

/// Deepest channel divider setting, CHDIV = k divides by 2^(k+1)
pub const CHDIV_MAX: u8 = 6;

/// Fixed-point width of the fractional remainder
pub const FRAC_BITS: u32 = 32;

/// Largest value PLL_DEN / PLL_NUM can hold
pub const PLL_DEN_MAX: u64 = u32::MAX as u64;

/// PLL_DEN programmed when the fractional path is disabled
pub const PLL_DEN_INTEGER: u32 = 0x3E8;

/// Largest PLL_N value
pub const PLL_N_MAX: u64 = 0x7FFF;

/// Largest PLL_R_PRE value
pub const PLL_R_PRE_MAX: u16 = 0xFFF;

/// Largest PLL_R value
pub const PLL_R_MAX: u8 = 0xFF;

/// Reference multiplier range, MULT = 1 bypasses it
pub const MULT_MIN: u8 = 3;

/// Reference multiplier range, MULT = 1 bypasses it
pub const MULT_MAX: u8 = 7;

/// Highest OUTA_PWR setting
pub const OUT_POWER_MAX: u8 = 7;

/// Settling time after forcing the internal reference, ms
pub const SETTLE_BEFORE_PROGRAM_MS: u32 = 10;

/// Settling time for PLL relock to start before restoring the reference, ms
pub const SETTLE_AFTER_PROGRAM_MS: u32 = 10;

/// Capacity of a reference topology
pub const MAX_REFERENCE_LINES: usize = 8;
