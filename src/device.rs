//! Register bus programming
//!
//! Frames are MSB first: one address byte with the read flag in bit 7,
//! followed by the register word. Each frame is one chip-select assertion,
//! handled by the SPI device.

use embedded_hal::blocking::spi::Transfer;

use crate::errors::*;
use crate::register::*;

/// Read flag in the address byte
const READ: u8 = 0x80;

/// Address byte plus the widest register word
const MAX_FRAME: usize = 1 + 2;

/// Which registers `program` writes
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProgramMode {
    /// Dirty registers only
    Partial,
    /// Every writable register, after a cold start or device reset
    Full,
}

/// Owns one device's SPI endpoint and its shadow image
pub struct Programmer<SPI, M: RegisterMap> {
    spi: SPI,
    image: RegisterImage<M>,
    verify: bool,
}

impl<SPI, M> Programmer<SPI, M>
where SPI: Transfer<u8>,
      M: RegisterMap,
{
    /// Programmer with a power-on image, nothing written yet.
    ///
    /// `spi` - SPI device for this chip select (`CPOL` = 0, `CPHA` = 0)
    pub fn new(spi: SPI) -> Self {
        Programmer { spi, image: RegisterImage::new(), verify: false }
    }

    /// Read every written register back and compare
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Shadow image
    #[inline]
    pub fn image(&self) -> &RegisterImage<M> {
        &self.image
    }

    /// Shadow image, mutable
    #[inline]
    pub fn image_mut(&mut self) -> &mut RegisterImage<M> {
        &mut self.image
    }

    /// Give back the SPI device
    pub fn release(self) -> SPI {
        self.spi
    }

    /// Writes registers out in descending address order.
    /// Blocking call, returns the number of registers written.
    ///
    /// Each dirty flag is cleared right after its register was written (and
    /// verified), so after a bus error the image still tells which
    /// registers did not make it.
    pub fn program(&mut self, mode: ProgramMode) -> Result<usize, Error> {
        let mut written = 0;
        for addr in (0..self.image.len() as u8).rev() {
            if !M::writable(addr) {
                // nothing to write, read-only
                self.image.mark_clean(addr);
                continue;
            }
            if mode == ProgramMode::Partial && !self.image.is_dirty(addr) {
                continue;
            }

            let w = self.image.get(addr)?;
            self.write_register(addr, w)?;
            if self.verify && !M::verify_exempt(addr) {
                let r = self.read_register(addr)?;
                if r != w {
                    return Err(Error::Mismatch { addr, written: w.to_u32(), read: r.to_u32() });
                }
            }
            self.image.mark_clean(addr);
            written += 1;
        }
        log::debug!("{:?} program: {} registers", mode, written);
        Ok(written)
    }

    /// Write one register, bypassing the image
    pub fn write_register(&mut self, addr: u8, w: M::Word) -> Result<(), Error> {
        log::trace!("R{} <- 0x{:04X}", addr, w.to_u32());
        let mut buf = [0u8; MAX_FRAME];
        let frame = frame(&mut buf, addr & !READ, w);
        self.spi.transfer(frame).map_err(|_| Error::Bus)?;
        Ok(())
    }

    /// Read one register from the device
    pub fn read_register(&mut self, addr: u8) -> Result<M::Word, Error> {
        let mut buf = [0u8; MAX_FRAME];
        let frame = frame(&mut buf, addr | READ, M::Word::default());
        let data = self.spi.transfer(frame).map_err(|_| Error::Bus)?;

        let w = data.iter().skip(1).fold(0u32, |w, b| (w << 8) | *b as u32);
        Ok(M::Word::from_u32(w))
    }
}

/// Lay out `[address, word MSB first]` in `buf`
fn frame<W: RegisterWord>(buf: &mut [u8; MAX_FRAME], a: u8, w: W) -> &mut [u8] {
    let len = 1 + W::BYTES;
    let w = w.to_u32();
    buf[0] = a;
    for (i, b) in buf[1..len].iter_mut().enumerate() {
        *b = (w >> (8 * (W::BYTES - 1 - i))) as u8;
    }
    &mut buf[..len]
}
