//! Input reference config
//! OSCin / OSC_2X doubler / PLL_R_PRE / MULT / PLL_R

use crate::{constants::*, errors::*};

/// Input reference path feeding the phase detector
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReferencePath {
    /// OSCin frequency, Hz
    f_ref: u64,
    /// True if the OSC_2X doubler is enabled
    doubler: bool,
    /// PLL_R_PRE pre-divider
    pre_divider: u16,
    /// MULT reference multiplier, 1 bypasses it
    multiplier: u8,
    /// PLL_R post-divider
    post_divider: u8,
}

impl ReferencePath {
    /// Configure the reference path
    pub fn new(
        f_ref: u64,
        doubler: bool,
        pre_divider: u16,
        multiplier: u8,
        post_divider: u8,
    ) -> Result<Self, Error> {
        if !(REF_IN_FREQ_MIN..=REF_IN_FREQ_MAX).contains(&f_ref) {
            return Err(Error::InvalidReferenceFrequency);
        }
        if doubler && multiplier != 1 {
            return Err(Error::DoublerWithMultiplier);
        }
        if doubler && f_ref > REF_IN_DOUBLER_MAX {
            return Err(Error::InvalidReferenceFrequency);
        }
        if !(1..=PLL_R_PRE_MAX).contains(&pre_divider)
            || !(multiplier == 1 || (MULT_MIN..=MULT_MAX).contains(&multiplier))
            || !(1..=PLL_R_MAX).contains(&post_divider)
        {
            return Err(Error::InvalidFieldValue);
        }

        let res = ReferencePath { f_ref, doubler, pre_divider, multiplier, post_divider };
        let (num, den) = res.f_pfd_ratio();
        if num > PFD_FREQ_MAX * den {
            Err(Error::InvalidReferenceFrequency)
        } else {
            Ok(res)
        }
    }

    /// OSCin straight into the phase detector
    pub fn direct(f_ref: u64) -> Result<Self, Error> {
        Self::new(f_ref, false, 1, 1, 1)
    }

    /// OSCin frequency, Hz
    #[inline]
    pub fn f_ref(&self) -> u64 {
        self.f_ref
    }

    /// OSC_2X enabled
    #[inline]
    pub fn doubler(&self) -> bool {
        self.doubler
    }

    /// PLL_R_PRE
    #[inline]
    pub fn pre_divider(&self) -> u16 {
        self.pre_divider
    }

    /// MULT
    #[inline]
    pub fn multiplier(&self) -> u8 {
        self.multiplier
    }

    /// PLL_R
    #[inline]
    pub fn post_divider(&self) -> u8 {
        self.post_divider
    }

    /// Phase detector frequency as an exact ratio `(num, den)`
    /// f PFD = OSCin × (1 + OSC_2X) × MULT / (PLL_R_PRE × PLL_R)
    pub fn f_pfd_ratio(&self) -> (u64, u64) {
        (
            self.f_ref * (1 + self.doubler as u64) * self.multiplier as u64,
            self.pre_divider as u64 * self.post_divider as u64,
        )
    }

    /// Phase detector frequency, Hz
    pub fn f_pfd(&self) -> f64 {
        let (num, den) = self.f_pfd_ratio();
        num as f64 / den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct() {
        let r = ReferencePath::direct(10_000_000).unwrap();
        assert_eq!(r.f_pfd_ratio(), (10_000_000, 1));
        assert_eq!(r.f_pfd(), 10e6);
    }

    #[test]
    fn test_dividers() {
        let r = ReferencePath::new(100_000_000, true, 2, 1, 5).unwrap();
        assert_eq!(r.f_pfd(), 20e6);
        let r = ReferencePath::new(10_000_000, false, 1, 5, 1).unwrap();
        assert_eq!(r.f_pfd(), 50e6);
    }

    #[test]
    fn test_doubler_with_multiplier() {
        assert_eq!(
            ReferencePath::new(10_000_000, true, 1, 3, 1),
            Err(Error::DoublerWithMultiplier)
        );
    }

    #[test]
    fn test_limits() {
        assert_eq!(ReferencePath::direct(1_000_000), Err(Error::InvalidReferenceFrequency));
        assert_eq!(ReferencePath::new(300_000_000, true, 1, 1, 1), Err(Error::InvalidReferenceFrequency));
        assert_eq!(ReferencePath::new(500_000_000, false, 1, 1, 1), Err(Error::InvalidReferenceFrequency));
        assert_eq!(ReferencePath::new(10_000_000, false, 0, 1, 1), Err(Error::InvalidFieldValue));
        assert_eq!(ReferencePath::new(10_000_000, false, 1, 2, 1), Err(Error::InvalidFieldValue));
    }
}
