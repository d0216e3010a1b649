//! Reference-switch sequencing
//!
//! On boards where GPIO lines select between the internal and an external
//! reference for several devices, a synthesizer is only reprogrammed while
//! those lines are forced to the internal source:
//!
//! 1. force the shared select lines safe, wait `before_program_ms`
//! 2. commit the new plan
//! 3. wait `after_program_ms` for relock to start, restore the lines
//! 4. retune downstream devices
//!
//! A failure anywhere, downstream steps included, leaves the lines forced
//! safe.

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use heapless::Vec;

use crate::constants::*;
use crate::errors::*;
use crate::lmx2820::Lmx2820;

/// A device whose configuration follows the frequency it is fed
pub trait Retune {
    /// Reconfigure for `f_hz` and commit
    fn retune(&mut self, f_hz: u64) -> Result<(), Error>;
}

/// What a GPIO line does
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LineRole {
    /// Reference source select; `safe` is the level picking the internal
    /// reference
    ReferenceSelect {
        /// Level selecting the internal reference
        safe: bool,
    },
    /// Any other board line, left alone while sequencing
    Auxiliary,
}

/// One output line of a topology
#[derive(Debug)]
pub struct ReferenceLine<P> {
    id: u8,
    pin: P,
    role: LineRole,
    /// User-selected level
    selected: bool,
}

impl<P> ReferenceLine<P> {
    /// Line identifier
    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Line role
    #[inline]
    pub fn role(&self) -> LineRole {
        self.role
    }

    /// User-selected level
    #[inline]
    pub fn selected(&self) -> bool {
        self.selected
    }
}

fn drive<P: OutputPin>(pin: &mut P, high: bool) -> Result<(), Error> {
    if high {
        pin.set_high().map_err(|_| Error::Pin)
    } else {
        pin.set_low().map_err(|_| Error::Pin)
    }
}

/// Devices and select lines sharing one reference source
#[derive(Debug)]
pub struct ReferenceTopology<P> {
    lines: Vec<ReferenceLine<P>, MAX_REFERENCE_LINES>,
    forced: bool,
}

impl<P> Default for ReferenceTopology<P> {
    fn default() -> Self {
        ReferenceTopology { lines: Vec::new(), forced: false }
    }
}

impl<P> ReferenceTopology<P>
where P: OutputPin,
{
    /// Empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a line and drive it to `selected`
    pub fn add_line(&mut self, id: u8, mut pin: P, role: LineRole, selected: bool) -> Result<(), Error> {
        if self.lines.is_full() {
            return Err(Error::TopologyFull);
        }
        if self.lines.iter().any(|l| l.id == id) {
            return Err(Error::DuplicateLine);
        }
        drive(&mut pin, selected)?;
        self.lines
            .push(ReferenceLine { id, pin, role, selected })
            .map_err(|_| Error::TopologyFull)
    }

    /// Drive every reference-select line to the internal source
    pub fn force_safe(&mut self) -> Result<(), Error> {
        self.forced = true;
        for l in self.lines.iter_mut() {
            if let LineRole::ReferenceSelect { safe } = l.role {
                drive(&mut l.pin, safe)?;
            }
        }
        log::debug!("reference lines forced safe");
        Ok(())
    }

    /// Drive every reference-select line back to its selected level
    pub fn restore(&mut self) -> Result<(), Error> {
        for l in self.lines.iter_mut() {
            if let LineRole::ReferenceSelect { .. } = l.role {
                drive(&mut l.pin, l.selected)?;
            }
        }
        self.forced = false;
        log::debug!("reference lines restored");
        Ok(())
    }

    /// Select a level for a line. While the lines are forced safe the level
    /// is only recorded and takes effect on restore.
    pub fn set_line(&mut self, id: u8, level: bool) -> Result<(), Error> {
        let forced = self.forced;
        let l = self.lines.iter_mut().find(|l| l.id == id).ok_or(Error::UnknownLine)?;
        if !(forced && matches!(l.role, LineRole::ReferenceSelect { .. })) {
            drive(&mut l.pin, level)?;
        }
        l.selected = level;
        Ok(())
    }

    /// Line by identifier
    pub fn line(&self, id: u8) -> Result<&ReferenceLine<P>, Error> {
        self.lines.iter().find(|l| l.id == id).ok_or(Error::UnknownLine)
    }

    /// Lines
    pub fn lines(&self) -> impl Iterator<Item = &ReferenceLine<P>> {
        self.lines.iter()
    }

    /// Lines are held on the internal reference
    #[inline]
    pub fn is_forced(&self) -> bool {
        self.forced
    }
}

/// Settling waits around a reprogram, board specific
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SettleDelays {
    /// After forcing the internal reference, before programming
    pub before_program_ms: u32,
    /// After programming, before restoring the reference
    pub after_program_ms: u32,
}

impl Default for SettleDelays {
    fn default() -> Self {
        SettleDelays {
            before_program_ms: SETTLE_BEFORE_PROGRAM_MS,
            after_program_ms: SETTLE_AFTER_PROGRAM_MS,
        }
    }
}

/// Runs reprograms with the reference forced safe
pub struct Sequencer<D> {
    delay: D,
    settle: SettleDelays,
}

impl<D> Sequencer<D>
where D: DelayMs<u32>,
{
    /// Sequencer with the given settling waits
    pub fn new(delay: D, settle: SettleDelays) -> Self {
        Sequencer { delay, settle }
    }

    /// Settling waits
    #[inline]
    pub fn settle(&self) -> SettleDelays {
        self.settle
    }

    /// Run `f` with the reference lines forced safe. The lines are restored
    /// only if `f` succeeds.
    pub fn guarded<P, T, F>(&mut self, topology: &mut ReferenceTopology<P>, f: F) -> Result<T, Error>
    where P: OutputPin,
          F: FnOnce() -> Result<T, Error>,
    {
        topology.force_safe()?;
        self.delay.delay_ms(self.settle.before_program_ms);
        let res = f()?;
        self.delay.delay_ms(self.settle.after_program_ms);
        topology.restore()?;
        Ok(res)
    }

    /// Tune `synth` to `target` Hz and propagate to `downstream`, returns
    /// the achieved frequency.
    ///
    /// Planning runs first: a planning error leaves the lines, the image
    /// and the device untouched.
    pub fn retune<P, SPI>(
        &mut self,
        topology: &mut ReferenceTopology<P>,
        synth: &mut Lmx2820<SPI>,
        downstream: &mut [&mut dyn Retune],
        target: u64,
    ) -> Result<f64, Error>
    where P: OutputPin,
          SPI: Transfer<u8>,
    {
        let plan = synth.get_plan(target)?;
        let res = self
            .guarded(topology, || synth.program_plan(&plan))
            .and_then(|achieved| {
                self.after_restore(topology, || propagate(downstream, target))?;
                Ok(achieved)
            });

        if let Err(e) = res {
            log::warn!("reconfiguration to {} Hz incomplete: {}, reference forced internal", target, e);
        }
        res
    }

    /// Run `f` on devices fed once the lines are restored. If it fails the
    /// lines are forced safe again.
    pub fn after_restore<P, T, F>(&mut self, topology: &mut ReferenceTopology<P>, f: F) -> Result<T, Error>
    where P: OutputPin,
          F: FnOnce() -> Result<T, Error>,
    {
        f().map_err(|e| {
            // Forcing again is best effort, the first error wins
            if !topology.is_forced() {
                let _ = topology.force_safe();
            }
            e
        })
    }

    /// Soft-reset `synth` and write its whole image back
    pub fn resync<P, SPI>(&mut self, topology: &mut ReferenceTopology<P>, synth: &mut Lmx2820<SPI>) -> Result<(), Error>
    where P: OutputPin,
          SPI: Transfer<u8>,
    {
        self.guarded(topology, || synth.reset().map(|_| ()))
            .map_err(|e| {
                log::warn!("device resync incomplete: {}", e);
                e
            })
    }
}

/// Retune every downstream device, stopping at the first error
pub fn propagate(downstream: &mut [&mut dyn Retune], f_hz: u64) -> Result<(), Error> {
    for d in downstream.iter_mut() {
        d.retune(f_hz)?;
    }
    Ok(())
}
