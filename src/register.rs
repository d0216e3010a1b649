//! Shadow register images
//!
//! A [`RegisterImage`] caches the intended value of every register of one
//! device together with a dirty bit per register. Bit-fields are described
//! by static [`FieldDescriptor`]s; writing a field is a read-modify-write of
//! its owning register that leaves the other bits alone and only dirties the
//! register when the stored value actually changes.

use core::fmt::Debug;
use core::marker::PhantomData;

use heapless::Vec;

use crate::errors::*;

/// Largest register map an image can hold
pub const MAX_REGISTERS: usize = 128;

/// Register word size
pub trait RegisterWord: Copy + Default + Eq + Debug + 'static {
    /// Bytes on the wire
    const BYTES: usize;

    /// Widen to u32
    fn to_u32(self) -> u32;

    /// Truncate from u32
    fn from_u32(x: u32) -> Self;
}

macro_rules! gen_register_word {
    ($t:ty) => {
        impl RegisterWord for $t {
            const BYTES: usize = core::mem::size_of::<$t>();
            #[inline] fn to_u32(self) -> u32 { self as u32 }
            #[inline] fn from_u32(x: u32) -> Self { x as $t }
        }
    };
}

gen_register_word!(u8);
gen_register_word!(u16);

/// Register file layout of one device
pub trait RegisterMap {
    /// Register width
    type Word: RegisterWord;

    /// Value of every register after construction, indexed by address
    const DEFAULTS: &'static [Self::Word];

    /// Register accepts writes
    #[inline]
    fn writable(_addr: u8) -> bool {
        true
    }

    /// Read-back does not reflect the written value (write-only or
    /// self-clearing bits)
    #[inline]
    fn verify_exempt(_addr: u8) -> bool {
        false
    }
}

/// Bit range inside one register
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Register address
    pub addr: u8,
    /// Offset of the least significant bit
    pub offset: u8,
    /// Number of bits
    pub width: u8,
}

impl FieldDescriptor {
    /// Describe a field
    pub const fn new(addr: u8, offset: u8, width: u8) -> Self {
        FieldDescriptor { addr, offset, width }
    }

    /// Field mask, not shifted
    #[inline]
    pub const fn mask(&self) -> u32 {
        ((1u64 << self.width) - 1) as u32
    }

    #[inline]
    fn extract(&self, w: u32) -> u32 {
        (w >> self.offset) & self.mask()
    }

    #[inline]
    fn insert(&self, w: u32, x: u32) -> u32 {
        (w & !(self.mask() << self.offset)) | ((x & self.mask()) << self.offset)
    }
}

/// Field whose bits are spread over two registers, `high` holds the most
/// significant part
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SplitField {
    /// Most significant part
    pub high: FieldDescriptor,
    /// Least significant part
    pub low: FieldDescriptor,
}

impl SplitField {
    /// Describe a split field
    pub const fn new(high: FieldDescriptor, low: FieldDescriptor) -> Self {
        SplitField { high, low }
    }

    /// Largest value the field holds
    #[inline]
    pub const fn max(&self) -> u64 {
        (1u64 << (self.high.width + self.low.width)) - 1
    }
}

/// Generate a field descriptor constant
macro_rules! gen_field {
    ($(#[$meta:meta])* $name:ident, $addr:expr, $off:expr, $nb:expr) => {
        $(#[$meta])*
        pub const $name: $crate::register::FieldDescriptor =
            $crate::register::FieldDescriptor::new($addr, $off, $nb);
    };
}

/// Enumerated field values
macro_rules! gen_field_enum {
    ($(#[$meta:meta])* $n:ident { $($(#[$vmeta:meta])* $v:ident = $x:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq)]
        pub enum $n {
            $($(#[$vmeta])* $v = $x),+
        }

        impl From<$n> for u32 {
            #[inline] fn from(x: $n) -> u32 { x as u32 }
        }

        impl core::convert::TryFrom<u32> for $n {
            type Error = $crate::errors::Error;

            fn try_from(x: u32) -> Result<Self, Self::Error> {
                match x {
                    $(_ if x == $x => Ok($n::$v),)+
                    _ => Err($crate::errors::Error::InvalidFieldValue),
                }
            }
        }
    };
}

/// Shadow copy of a device register file
#[derive(Debug, Clone)]
pub struct RegisterImage<M: RegisterMap> {
    values: Vec<M::Word, MAX_REGISTERS>,
    dirty: u128,
    map: PhantomData<M>,
}

impl<M: RegisterMap> Default for RegisterImage<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RegisterMap> RegisterImage<M> {
    /// Image seeded with the power-on defaults. The device state is
    /// unknown at this point, so every register starts dirty.
    pub fn new() -> Self {
        let mut values = Vec::new();
        for w in M::DEFAULTS.iter().take(MAX_REGISTERS) {
            // capacity checked by take()
            let _ = values.push(*w);
        }
        let mut image = RegisterImage { values, dirty: 0, map: PhantomData };
        image.mark_all_dirty();
        image
    }

    /// Number of registers
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for an empty register map
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cached register value
    pub fn get(&self, addr: u8) -> Result<M::Word, Error> {
        self.values.get(addr as usize).copied().ok_or(Error::InvalidRegister)
    }

    /// Replace a whole register. Dirties it only on change.
    pub fn store(&mut self, addr: u8, w: M::Word) -> Result<bool, Error> {
        let slot = self.values.get_mut(addr as usize).ok_or(Error::InvalidRegister)?;
        if *slot == w {
            return Ok(false);
        }
        *slot = w;
        self.dirty |= 1u128 << addr;
        Ok(true)
    }

    /// Decode a field
    pub fn read(&self, f: FieldDescriptor) -> Result<u32, Error> {
        Ok(f.extract(self.get(f.addr)?.to_u32()))
    }

    /// Read-modify-write a field. Returns true if the register changed.
    pub fn write(&mut self, f: FieldDescriptor, x: u32) -> Result<bool, Error> {
        if x > f.mask() {
            return Err(Error::InvalidFieldValue);
        }
        let w = self.get(f.addr)?.to_u32();
        self.store(f.addr, M::Word::from_u32(f.insert(w, x)))
    }

    /// Decode a split field
    pub fn read_split(&self, f: SplitField) -> Result<u64, Error> {
        let high = self.read(f.high)? as u64;
        let low = self.read(f.low)? as u64;
        Ok((high << f.low.width) | low)
    }

    /// Write both parts of a split field
    pub fn write_split(&mut self, f: SplitField, x: u64) -> Result<bool, Error> {
        if x > f.max() {
            return Err(Error::InvalidFieldValue);
        }
        let high = self.write(f.high, (x >> f.low.width) as u32)?;
        let low = self.write(f.low, (x as u32) & f.low.mask())?;
        Ok(high || low)
    }

    /// Accessor bound to one field
    pub fn field(&mut self, f: FieldDescriptor) -> Field<'_, M> {
        Field { image: self, desc: f }
    }

    /// Register needs to be written out
    #[inline]
    pub fn is_dirty(&self, addr: u8) -> bool {
        (addr as usize) < self.len() && self.dirty & (1u128 << addr) != 0
    }

    /// Number of dirty registers
    #[inline]
    pub fn dirty_count(&self) -> usize {
        self.dirty.count_ones() as usize
    }

    /// Force a register to be written on the next partial program
    pub fn touch(&mut self, addr: u8) -> Result<(), Error> {
        if addr as usize >= self.len() {
            return Err(Error::InvalidRegister);
        }
        self.dirty |= 1u128 << addr;
        Ok(())
    }

    /// Register was written out
    #[inline]
    pub fn mark_clean(&mut self, addr: u8) {
        if (addr as usize) < MAX_REGISTERS {
            self.dirty &= !(1u128 << addr);
        }
    }

    /// Every register is in sync with the device
    #[inline]
    pub fn clear_dirty(&mut self) {
        self.dirty = 0;
    }

    /// Every register needs to be written out
    pub fn mark_all_dirty(&mut self) {
        self.dirty = match self.len() {
            MAX_REGISTERS => u128::MAX,
            n => (1u128 << n) - 1,
        };
    }

    /// Dirty addresses, highest first
    pub fn dirty_descending(&self) -> impl Iterator<Item = u8> {
        let dirty = self.dirty;
        (0..self.len() as u8).rev().filter(move |a| dirty & (1u128 << a) != 0)
    }

    /// Back to the power-on defaults, all dirty
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Typed view of one field inside an image
pub struct Field<'a, M: RegisterMap> {
    image: &'a mut RegisterImage<M>,
    desc: FieldDescriptor,
}

impl<'a, M: RegisterMap> Field<'a, M> {
    /// Layout
    #[inline]
    pub fn descriptor(&self) -> FieldDescriptor {
        self.desc
    }

    /// Current value
    pub fn get(&self) -> Result<u32, Error> {
        self.image.read(self.desc)
    }

    /// Set the value, returns true if the owning register changed
    pub fn set(&mut self, x: u32) -> Result<bool, Error> {
        self.image.write(self.desc, x)
    }
}
