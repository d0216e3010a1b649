//! `embedded-hal` test doubles sharing one event log

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

/// Something the hardware saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Register write on a chip select
    Write { chip: u8, addr: u8, value: u32 },
    /// Register read on a chip select
    Read { chip: u8, addr: u8 },
    /// GPIO level change
    Pin { line: u8, high: bool },
    /// Blocking wait
    Delay(u32),
}

#[derive(Debug, Default)]
struct Log {
    events: Vec<Event>,
    frames: Vec<(u8, Vec<u8>)>,
}

/// Ordered record of bus, pin and delay activity
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Log>>);

impl EventLog {
    fn push(&self, e: Event) {
        self.0.lock().unwrap().events.push(e);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().events.clone()
    }

    pub fn clear(&self) {
        let mut log = self.0.lock().unwrap();
        log.events.clear();
        log.frames.clear();
    }

    /// Raw frames sent to `chip`, as they were clocked out
    pub fn frames(&self, chip: u8) -> Vec<Vec<u8>> {
        let log = self.0.lock().unwrap();
        log.frames.iter().filter(|(c, _)| *c == chip).map(|(_, f)| f.clone()).collect()
    }

    /// `(addr, value)` writes to `chip`
    pub fn writes(&self, chip: u8) -> Vec<(u8, u32)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Write { chip: c, addr, value } if c == chip => Some((addr, value)),
                _ => None,
            })
            .collect()
    }

    /// `(line, level)` changes
    pub fn pins(&self) -> Vec<(u8, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Pin { line, high } => Some((line, high)),
                _ => None,
            })
            .collect()
    }

    /// Position of the first event matching `f`
    pub fn position(&self, f: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events().iter().position(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockError;

#[derive(Debug, Default)]
struct SpiState {
    regs: BTreeMap<u8, u32>,
    stuck: BTreeMap<u8, u32>,
    fail_after: Option<usize>,
    transfers: usize,
}

/// Register-addressed SPI device model: stores writes, answers reads
#[derive(Debug, Clone)]
pub struct MockSpi {
    chip: u8,
    log: EventLog,
    state: Arc<Mutex<SpiState>>,
}

impl MockSpi {
    pub fn new(chip: u8, log: &EventLog) -> Self {
        MockSpi { chip, log: log.clone(), state: Arc::default() }
    }

    /// Transfers after the first `n` fail
    pub fn fail_after(&self, n: usize) {
        let mut st = self.state.lock().unwrap();
        st.fail_after = Some(st.transfers + n);
    }

    /// Bits that always read back as one
    pub fn stick(&self, addr: u8, bits: u32) {
        self.state.lock().unwrap().stuck.insert(addr, bits);
    }
}

impl Transfer<u8> for MockSpi {
    type Error = MockError;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], MockError> {
        let mut st = self.state.lock().unwrap();
        if matches!(st.fail_after, Some(n) if st.transfers >= n) {
            return Err(MockError);
        }
        st.transfers += 1;

        let mut log = self.log.0.lock().unwrap();
        log.frames.push((self.chip, words.to_vec()));

        let addr = words[0] & 0x7F;
        let n = words.len() - 1;
        if words[0] & 0x80 != 0 {
            let v = st.regs.get(&addr).copied().unwrap_or(0) | st.stuck.get(&addr).copied().unwrap_or(0);
            for (i, b) in words[1..].iter_mut().enumerate() {
                *b = (v >> (8 * (n - 1 - i))) as u8;
            }
            log.events.push(Event::Read { chip: self.chip, addr });
        } else {
            let value = words[1..].iter().fold(0u32, |w, b| (w << 8) | *b as u32);
            st.regs.insert(addr, value);
            log.events.push(Event::Write { chip: self.chip, addr, value });
        }
        Ok(words)
    }
}

/// Output line recording its level changes
#[derive(Debug, Clone)]
pub struct MockPin {
    line: u8,
    log: EventLog,
    failing: Arc<Mutex<bool>>,
}

impl MockPin {
    pub fn new(line: u8, log: &EventLog) -> Self {
        MockPin { line, log: log.clone(), failing: Arc::default() }
    }

    pub fn fail(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    fn set(&mut self, high: bool) -> Result<(), MockError> {
        if *self.failing.lock().unwrap() {
            return Err(MockError);
        }
        self.log.push(Event::Pin { line: self.line, high });
        Ok(())
    }
}

impl OutputPin for MockPin {
    type Error = MockError;

    fn set_low(&mut self) -> Result<(), MockError> {
        self.set(false)
    }

    fn set_high(&mut self) -> Result<(), MockError> {
        self.set(true)
    }
}

/// Delay that only records how long it was asked to wait
#[derive(Debug, Clone)]
pub struct MockDelay {
    log: EventLog,
}

impl MockDelay {
    pub fn new(log: &EventLog) -> Self {
        MockDelay { log: log.clone() }
    }
}

impl DelayMs<u32> for MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.log.push(Event::Delay(ms));
    }
}
