//! Error types
//!
//! `no_std` compatible, `Copy` so it can be carried through the sequencer
//! without allocation.

use core::fmt;

/// Driver error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Range errors, rejected before anything is written
    /// Requested output frequency is outside of the device span
    InvalidOutputFrequency,
    /// VCO frequency is not covered by any VCO core
    InvalidVcoFrequency,
    /// OSCin or phase detector frequency out of range
    InvalidReferenceFrequency,
    /// Value does not fit in the register field
    InvalidFieldValue,
    /// Address outside of the register map
    InvalidRegister,
    /// No reference line with that id
    UnknownLine,
    /// Voltage outside of the DAC span or the allowed envelope
    InvalidVoltage,

    // Configuration errors
    /// OSC_2X doubler and reference multiplier requested together
    DoublerWithMultiplier,
    /// PLL_N below the minimum of the VCO core for the modulator order
    IntegerDividerTooSmall,
    /// Reference topology has no room for another line
    TopologyFull,
    /// Reference line id already in the topology
    DuplicateLine,

    // Bus errors, never retried
    /// SPI transfer failed
    Bus,
    /// GPIO write failed
    Pin,

    /// Read-back differs from the written value
    Mismatch {
        /// Register address
        addr: u8,
        /// Value written
        written: u32,
        /// Value read back
        read: u32,
    },
}

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Value outside the documented envelope
    Range,
    /// Internally inconsistent configuration
    Configuration,
    /// Transport failure
    Bus,
    /// Read-back verification failure
    Mismatch,
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOutputFrequency
            | Self::InvalidVcoFrequency
            | Self::InvalidReferenceFrequency
            | Self::InvalidFieldValue
            | Self::InvalidRegister
            | Self::UnknownLine
            | Self::InvalidVoltage => ErrorKind::Range,
            Self::DoublerWithMultiplier
            | Self::IntegerDividerTooSmall
            | Self::TopologyFull
            | Self::DuplicateLine => ErrorKind::Configuration,
            Self::Bus | Self::Pin => ErrorKind::Bus,
            Self::Mismatch { .. } => ErrorKind::Mismatch,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOutputFrequency => write!(f, "output frequency out of range"),
            Self::InvalidVcoFrequency => write!(f, "VCO frequency not covered by any VCO core"),
            Self::InvalidReferenceFrequency => write!(f, "reference or PFD frequency out of range"),
            Self::InvalidFieldValue => write!(f, "value does not fit register field"),
            Self::InvalidRegister => write!(f, "register address out of range"),
            Self::UnknownLine => write!(f, "unknown reference line"),
            Self::InvalidVoltage => write!(f, "voltage out of range"),
            Self::DoublerWithMultiplier => {
                write!(f, "reference doubler and multiplier are mutually exclusive")
            }
            Self::IntegerDividerTooSmall => {
                write!(f, "PLL_N below the minimum for the selected VCO core")
            }
            Self::TopologyFull => write!(f, "reference topology is full"),
            Self::DuplicateLine => write!(f, "reference line already present"),
            Self::Bus => write!(f, "SPI transfer failed"),
            Self::Pin => write!(f, "GPIO write failed"),
            Self::Mismatch { addr, written, read } => write!(
                f,
                "read-back mismatch at R{}: wrote 0x{:04X}, read 0x{:04X}",
                addr, written, read
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
