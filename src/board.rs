//! Multi-channel board control
//!
//! A board carries N synthesizer channels, each an LMX2820 with an optional
//! LTC5594 behind it. Channels whose reference select lines are shared form
//! a reference group and serialize on the group lock; other channels only
//! take their own lock. Boards whose mixers are biased from an LTC2668 DAC
//! map each channel's I and Q inputs to DAC outputs.
//!
//! Lock order is group, then channel, then DAC, then store.

use std::format;
use std::string::String;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use std::vec::Vec;

use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use thiserror::Error;

use crate::config::{ConfigStore, StoreError};
use crate::device::ProgramMode;
use crate::errors::Error;
use crate::frequency::SynthesizerPlan;
use crate::lmx2820::Lmx2820;
use crate::ltc2668::Ltc2668;
use crate::ltc5594::{self, Ltc5594};
use crate::sequencer::*;

/// Board level errors
#[derive(Debug, Error)]
pub enum BoardError {
    /// Device or planning error
    #[error("{0}")]
    Device(#[from] Error),

    /// No channel with this index
    #[error("unknown channel {0}")]
    UnknownChannel(usize),

    /// No reference group with this index
    #[error("unknown reference group {0}")]
    UnknownGroup(usize),

    /// Channel has no mixer bias outputs, or the board no DAC
    #[error("channel {0} has no mixer bias")]
    NoBias(usize),

    /// Configuration could not be persisted
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Largest mixer bias magnitude, V
pub const MIXER_BIAS_LIMIT: f64 = 0.2;

/// DAC outputs biasing one channel's mixer
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MixerBias {
    /// Output driving the I input
    pub dac_i: u8,
    /// Output driving the Q input
    pub dac_q: u8,
}

/// Static description of one channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Name, prefix of the persisted keys
    pub name: String,
    /// Lowest frequency the channel may be tuned to, Hz
    pub min_hz: u64,
    /// Highest frequency the channel may be tuned to, Hz
    pub max_hz: u64,
    /// Frequency at bring-up when nothing was persisted, Hz
    pub default_hz: u64,
    /// Reference group sharing this channel's select lines
    pub group: Option<usize>,
    /// Mixer bias outputs
    pub bias: Option<MixerBias>,
}

impl ChannelConfig {
    fn frequency_key(&self) -> String {
        format!("{}.frequency", self.name)
    }

    fn bias_key(&self, iq: ltc5594::Channel) -> String {
        match iq {
            ltc5594::Channel::I => format!("{}.bias_i", self.name),
            ltc5594::Channel::Q => format!("{}.bias_q", self.name),
        }
    }

    fn bias_output(&self, iq: ltc5594::Channel) -> Option<u8> {
        self.bias.map(|b| match iq {
            ltc5594::Channel::I => b.dac_i,
            ltc5594::Channel::Q => b.dac_q,
        })
    }

    fn check_span(&self, target: u64) -> Result<(), Error> {
        if (self.min_hz..=self.max_hz).contains(&target) {
            Ok(())
        } else {
            Err(Error::InvalidOutputFrequency)
        }
    }
}

/// Devices of one channel
pub struct Channel<SPI> {
    config: ChannelConfig,
    synth: Lmx2820<SPI>,
    downstream: Option<Ltc5594<SPI>>,
}

impl<SPI> Channel<SPI> {
    /// Channel from its devices
    pub fn new(config: ChannelConfig, synth: Lmx2820<SPI>, downstream: Option<Ltc5594<SPI>>) -> Self {
        Channel { config, synth, downstream }
    }
}

/// Select lines shared by several channels and the sequencer driving them
pub struct ReferenceGroup<P, D> {
    topology: ReferenceTopology<P>,
    sequencer: Sequencer<D>,
}

impl<P, D> ReferenceGroup<P, D> {
    /// Group from its lines
    pub fn new(topology: ReferenceTopology<P>, sequencer: Sequencer<D>) -> Self {
        ReferenceGroup { topology, sequencer }
    }
}

/// Blocking delay on the calling thread
#[derive(Debug, Default, Copy, Clone)]
pub struct StdDelay;

impl DelayMs<u32> for StdDelay {
    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn line_key(group: usize, id: u8) -> String {
    format!("ref{}.line{}", group, id)
}

/// Board with its channels, reference groups and persisted configuration
pub struct Board<SPI, P, D, S> {
    configs: Vec<ChannelConfig>,
    channels: Vec<Mutex<Channel<SPI>>>,
    groups: Vec<Mutex<ReferenceGroup<P, D>>>,
    dac: Option<Mutex<Ltc2668<SPI>>>,
    store: Mutex<S>,
}

impl<SPI, P, D, S> Board<SPI, P, D, S>
where SPI: Transfer<u8>,
      P: OutputPin,
      D: DelayMs<u32>,
      S: ConfigStore,
{
    /// Assemble a board. Nothing is written until [`Board::bring_up`].
    pub fn new(
        channels: Vec<Channel<SPI>>,
        groups: Vec<ReferenceGroup<P, D>>,
        store: S,
    ) -> Result<Self, BoardError> {
        for c in channels.iter() {
            match c.config.group {
                Some(g) if g >= groups.len() => return Err(BoardError::UnknownGroup(g)),
                _ => {}
            }
        }

        Ok(Board {
            configs: channels.iter().map(|c| c.config.clone()).collect(),
            channels: channels.into_iter().map(Mutex::new).collect(),
            groups: groups.into_iter().map(Mutex::new).collect(),
            dac: None,
            store: Mutex::new(store),
        })
    }

    /// Attach the DAC biasing the mixers
    pub fn with_dac(mut self, dac: Ltc2668<SPI>) -> Self {
        self.dac = Some(Mutex::new(dac));
        self
    }

    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Restore persisted reference line levels, tune every channel to its
    /// persisted frequency (or its default), then restore the mixer bias.
    pub fn bring_up(&self) -> Result<(), BoardError> {
        for (g, group) in self.groups.iter().enumerate() {
            let mut group = lock(group);
            let ids: Vec<u8> = group.topology.lines().map(|l| l.id()).collect();
            for id in ids {
                let level = lock(&self.store).flag(&line_key(g, id));
                if let Some(level) = level {
                    group.topology.set_line(id, level)?;
                }
            }
        }

        for ch in 0..self.channels.len() {
            let target = self.configured_frequency(ch)?;
            let achieved = self.set_frequency(ch, target)?;
            log::info!("{}: {} Hz", self.configs[ch].name, achieved);
        }

        for (ch, config) in self.configs.iter().enumerate() {
            if config.bias.is_none() {
                continue;
            }
            for iq in [ltc5594::Channel::I, ltc5594::Channel::Q] {
                let volts = self.mixer_bias(ch, iq)?;
                self.set_mixer_bias(ch, iq, volts)?;
            }
        }
        Ok(())
    }

    /// Tune a channel and persist the request, returns the achieved
    /// frequency.
    pub fn set_frequency(&self, ch: usize, target: u64) -> Result<f64, BoardError> {
        let config = self.config(ch)?;
        config.check_span(target)?;

        let mut group = match config.group {
            Some(g) => Some(lock(self.group(g)?)),
            None => None,
        };
        let mut channel = lock(&self.channels[ch]);
        let Channel { synth, downstream, .. } = &mut *channel;
        let mut downstream: Vec<&mut dyn Retune> =
            downstream.iter_mut().map(|d| d as &mut dyn Retune).collect();

        let achieved = match group.as_deref_mut() {
            Some(ReferenceGroup { topology, sequencer }) => {
                sequencer.retune(topology, synth, &mut downstream, target)?
            }
            None => {
                let achieved = synth.set_frequency(target)?;
                propagate(&mut downstream, target)?;
                achieved
            }
        };

        let mut store = lock(&self.store);
        store.set_float(&config.frequency_key(), target as f64);
        store.save()?;
        Ok(achieved)
    }

    /// Achieved frequency of the last successful tune
    pub fn frequency(&self, ch: usize) -> Result<Option<f64>, BoardError> {
        self.config(ch)?;
        Ok(lock(&self.channels[ch]).synth.frequency())
    }

    /// Persisted frequency request, or the channel default
    pub fn configured_frequency(&self, ch: usize) -> Result<u64, BoardError> {
        let config = self.config(ch)?;
        let stored = lock(&self.store).float(&config.frequency_key());
        Ok(match stored {
            Some(f) if config.check_span(f as u64).is_ok() => f as u64,
            _ => config.default_hz,
        })
    }

    /// Plan a frequency without touching anything
    pub fn get_plan(&self, ch: usize, target: u64) -> Result<SynthesizerPlan, BoardError> {
        let config = self.config(ch)?;
        config.check_span(target)?;
        Ok(lock(&self.channels[ch]).synth.get_plan(target)?)
    }

    /// Reset a channel's synthesizer and write every device of the channel
    /// back in full
    pub fn reset_device(&self, ch: usize) -> Result<(), BoardError> {
        let config = self.config(ch)?;
        let mut group = match config.group {
            Some(g) => Some(lock(self.group(g)?)),
            None => None,
        };
        let mut channel = lock(&self.channels[ch]);
        let Channel { synth, downstream, .. } = &mut *channel;

        match group.as_deref_mut() {
            Some(ReferenceGroup { topology, sequencer }) => {
                sequencer.resync(topology, synth)?;
                if let Some(d) = downstream {
                    sequencer.after_restore(topology, || d.program(ProgramMode::Full))?;
                }
            }
            None => {
                synth.reset()?;
                if let Some(d) = downstream {
                    d.program(ProgramMode::Full)?;
                }
            }
        }
        log::info!("{}: device resynced", config.name);
        Ok(())
    }

    /// Select a level for a reference line and persist it
    pub fn set_reference_line(&self, g: usize, id: u8, level: bool) -> Result<(), BoardError> {
        let mut group = lock(self.group(g)?);
        group.topology.set_line(id, level)?;

        let mut store = lock(&self.store);
        store.set_flag(&line_key(g, id), level);
        store.save()?;
        Ok(())
    }

    /// Selected level of a reference line
    pub fn reference_line(&self, g: usize, id: u8) -> Result<bool, BoardError> {
        let group = lock(self.group(g)?);
        Ok(group.topology.line(id)?.selected())
    }

    /// Bias one mixer input and persist it
    pub fn set_mixer_bias(&self, ch: usize, iq: ltc5594::Channel, volts: f64) -> Result<(), BoardError> {
        let config = self.config(ch)?;
        let output = config.bias_output(iq).ok_or(BoardError::NoBias(ch))?;
        if !(volts.abs() <= MIXER_BIAS_LIMIT) {
            return Err(Error::InvalidVoltage.into());
        }
        let dac = self.dac.as_ref().ok_or(BoardError::NoBias(ch))?;

        lock(dac).set_voltage(output, volts)?;

        let mut store = lock(&self.store);
        store.set_float(&config.bias_key(iq), volts);
        store.save()?;
        Ok(())
    }

    /// Persisted mixer bias, 0 V when nothing usable was stored
    pub fn mixer_bias(&self, ch: usize, iq: ltc5594::Channel) -> Result<f64, BoardError> {
        let config = self.config(ch)?;
        config.bias_output(iq).ok_or(BoardError::NoBias(ch))?;
        let stored = lock(&self.store).float(&config.bias_key(iq));
        Ok(match stored {
            Some(v) if v.abs() <= MIXER_BIAS_LIMIT => v,
            _ => 0.0,
        })
    }

    fn config(&self, ch: usize) -> Result<&ChannelConfig, BoardError> {
        self.configs.get(ch).ok_or(BoardError::UnknownChannel(ch))
    }

    fn group(&self, g: usize) -> Result<&Mutex<ReferenceGroup<P, D>>, BoardError> {
        self.groups.get(g).ok_or(BoardError::UnknownGroup(g))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryStore, TomlStore};
    use crate::ltc2668::Span;
    use crate::ltc5594::Channel::{I, Q};
    use crate::mock::*;
    use crate::refin::ReferencePath;

    type TestBoard = Board<MockSpi, MockPin, MockDelay, MemoryStore>;

    const LO0: usize = 0;
    const LO1: usize = 1;
    const DAC: u8 = 3;

    /// Handles on the lo0 devices
    struct Parts {
        lo0: MockSpi,
        demod: MockSpi,
        line0: MockPin,
    }

    impl Parts {
        fn new(log: &EventLog) -> Self {
            Parts { lo0: MockSpi::new(0, log), demod: MockSpi::new(1, log), line0: MockPin::new(0, log) }
        }
    }

    fn board(log: &EventLog, store: MemoryStore) -> TestBoard {
        board_with(log, store, &Parts::new(log))
    }

    /// lo0: grouped, demodulator on chip 1, mixer bias I on DAC2 and Q on
    /// DAC0; lo1: standalone on chip 2; DAC on chip 3
    fn board_with<S: ConfigStore>(log: &EventLog, store: S, parts: &Parts) -> Board<MockSpi, MockPin, MockDelay, S> {
        let reference = ReferencePath::direct(10_000_000).unwrap();
        let mut topology = ReferenceTopology::new();
        topology
            .add_line(0, parts.line0.clone(), LineRole::ReferenceSelect { safe: false }, true)
            .unwrap();
        let group = ReferenceGroup::new(topology, Sequencer::new(MockDelay::new(log), SettleDelays::default()));

        let lo0 = Channel::new(
            ChannelConfig {
                name: "lo0".into(),
                min_hz: 300_000_000,
                max_hz: 6_000_000_000,
                default_hz: 2_400_000_000,
                group: Some(0),
                bias: Some(MixerBias { dac_i: 2, dac_q: 0 }),
            },
            Lmx2820::new(parts.lo0.clone(), reference).unwrap(),
            Some(Ltc5594::new(parts.demod.clone())),
        );
        let lo1 = Channel::new(
            ChannelConfig {
                name: "lo1".into(),
                min_hz: 5_650_000_000,
                max_hz: 11_300_000_000,
                default_hz: 10_000_000_000,
                group: None,
                bias: None,
            },
            Lmx2820::new(MockSpi::new(2, log), reference).unwrap(),
            None,
        );
        let b = Board::new(vec![lo0, lo1], vec![group], store)
            .unwrap()
            .with_dac(Ltc2668::new(MockSpi::new(DAC, log), Span::Bipolar2V5));
        log.clear();
        b
    }

    #[test]
    fn test_bring_up_defaults() {
        let log = EventLog::default();
        let b = board(&log, MemoryStore::new());
        b.bring_up().unwrap();
        assert_eq!(b.frequency(LO0).unwrap(), Some(2.4e9));
        assert_eq!(b.frequency(LO1).unwrap(), Some(10e9));
        assert_eq!(log.writes(0).len(), 113);
        assert_eq!(log.writes(1).len(), 0x17);
        assert_eq!(log.writes(2).len(), 113);
        assert_eq!(b.configured_frequency(LO0).unwrap(), 2_400_000_000);
    }

    #[test]
    fn test_bring_up_persisted() {
        let mut store = MemoryStore::new();
        store.set_float("lo1.frequency", 10_005_000_000.0);
        store.set_float("lo0.frequency", 9e9);
        store.set_flag("ref0.line0", false);
        let log = EventLog::default();
        let b = board(&log, store);
        b.bring_up().unwrap();

        assert_eq!(b.frequency(LO1).unwrap(), Some(10_005_000_000.0));
        // out of span, default used
        assert_eq!(b.frequency(LO0).unwrap(), Some(2.4e9));
        assert!(!b.reference_line(0, 0).unwrap());
        assert_eq!(log.pins(), [(0, false), (0, false), (0, false)]);
    }

    #[test]
    fn test_span_checked_first() {
        let log = EventLog::default();
        let b = board(&log, MemoryStore::new());
        b.bring_up().unwrap();
        log.clear();

        let res = b.set_frequency(LO0, 10_000_000_000);
        assert!(matches!(res, Err(BoardError::Device(Error::InvalidOutputFrequency))));
        assert!(log.events().is_empty());
        assert_eq!(b.configured_frequency(LO0).unwrap(), 2_400_000_000);
        assert!(b.get_plan(LO0, 10_000_000_000).is_err());
    }

    #[test]
    fn test_standalone_channel_skips_lines() {
        let log = EventLog::default();
        let b = board(&log, MemoryStore::new());
        b.bring_up().unwrap();
        log.clear();

        assert_eq!(b.set_frequency(LO1, 10_005_000_000).unwrap(), 10_005_000_000.0);
        assert!(log.pins().is_empty());
        assert_eq!(b.configured_frequency(LO1).unwrap(), 10_005_000_000);
    }

    #[test]
    fn test_grouped_channel_sequenced() {
        let log = EventLog::default();
        let b = board(&log, MemoryStore::new());
        b.bring_up().unwrap();
        log.clear();

        assert_eq!(b.set_frequency(LO0, 1_000_000_000).unwrap(), 1e9);
        assert_eq!(log.pins(), [(0, false), (0, true)]);
        // demodulator moved to the lower LO band after the lines came back
        let restored = log.position(|e| *e == Event::Pin { line: 0, high: true }).unwrap();
        let demod = log.position(|e| matches!(e, Event::Write { chip: 1, .. })).unwrap();
        assert!(restored < demod);
    }

    #[test]
    fn test_get_plan_is_pure() {
        let log = EventLog::default();
        let b = board(&log, MemoryStore::new());
        let p = b.get_plan(LO0, 1_000_000_000).unwrap();
        assert_eq!(p.n, 800);
        assert!(log.events().is_empty());
        assert_eq!(b.frequency(LO0).unwrap(), None);
    }

    #[test]
    fn test_reference_line() {
        let log = EventLog::default();
        let b = board(&log, MemoryStore::new());
        b.set_reference_line(0, 0, false).unwrap();
        assert!(!b.reference_line(0, 0).unwrap());
        assert_eq!(log.pins(), [(0, false)]);
        assert!(matches!(
            b.set_reference_line(0, 3, true),
            Err(BoardError::Device(Error::UnknownLine))
        ));
        assert!(matches!(b.reference_line(2, 0), Err(BoardError::UnknownGroup(2))));
    }

    #[test]
    fn test_reset_device() {
        let log = EventLog::default();
        let b = board(&log, MemoryStore::new());
        b.bring_up().unwrap();
        log.clear();

        b.reset_device(LO0).unwrap();
        assert_eq!(log.writes(0).len(), 2 + 113);
        assert_eq!(log.writes(1).len(), 0x17);
        assert_eq!(log.pins(), [(0, false), (0, true)]);
        assert_eq!(b.frequency(LO0).unwrap(), Some(2.4e9));
    }

    #[test]
    fn test_reset_downstream_error_forces_lines() {
        let log = EventLog::default();
        let parts = Parts::new(&log);
        let b = board_with(&log, MemoryStore::new(), &parts);
        b.bring_up().unwrap();
        log.clear();

        parts.demod.fail_after(0);
        assert!(matches!(b.reset_device(LO0), Err(BoardError::Device(Error::Bus))));
        assert_eq!(log.pins(), [(0, false), (0, true), (0, false)]);
    }

    #[test]
    fn test_failed_changes_not_persisted() {
        let path = std::env::temp_dir().join(format!("lmx2820-board-failed-{}.toml", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let log = EventLog::default();
        let parts = Parts::new(&log);
        let b = board_with(&log, TomlStore::open(&path).unwrap(), &parts);
        b.bring_up().unwrap();

        parts.line0.fail(true);
        assert!(matches!(b.set_reference_line(0, 0, false), Err(BoardError::Device(Error::Pin))));
        assert!(b.reference_line(0, 0).unwrap());
        parts.line0.fail(false);

        parts.lo0.fail_after(0);
        assert!(matches!(b.set_frequency(LO0, 1_000_000_000), Err(BoardError::Device(Error::Bus))));
        assert_eq!(b.configured_frequency(LO0).unwrap(), 2_400_000_000);
        assert_eq!(b.frequency(LO0).unwrap(), Some(2.4e9));

        let saved = TomlStore::open(&path).unwrap();
        assert_eq!(saved.float("lo0.frequency"), Some(2.4e9));
        assert_eq!(saved.flag("ref0.line0"), None);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_mixer_bias() {
        let log = EventLog::default();
        let b = board(&log, MemoryStore::new());
        b.bring_up().unwrap();
        // nothing stored, both inputs at 0 V
        assert_eq!(
            log.frames(DAC),
            [vec![0xE0u8, 0x00, 0x04], vec![0x32, 0x7F, 0xFF], vec![0x30, 0x7F, 0xFF]]
        );
        log.clear();

        b.set_mixer_bias(LO0, I, 0.181).unwrap();
        assert_eq!(log.frames(DAC), [vec![0x32u8, 0x89, 0x43]]);
        assert_eq!(b.mixer_bias(LO0, I).unwrap(), 0.181);
        assert_eq!(b.mixer_bias(LO0, Q).unwrap(), 0.0);

        assert!(matches!(
            b.set_mixer_bias(LO0, Q, 0.25),
            Err(BoardError::Device(Error::InvalidVoltage))
        ));
        assert!(matches!(b.set_mixer_bias(LO1, I, 0.0), Err(BoardError::NoBias(LO1))));
        assert!(matches!(b.mixer_bias(LO1, Q), Err(BoardError::NoBias(LO1))));
        assert_eq!(log.frames(DAC).len(), 1);
    }

    #[test]
    fn test_mixer_bias_restored() {
        let mut store = MemoryStore::new();
        store.set_float("lo0.bias_q", -0.071);
        // outside the envelope, ignored
        store.set_float("lo0.bias_i", 0.5);
        let log = EventLog::default();
        let b = board(&log, store);
        b.bring_up().unwrap();

        assert_eq!(
            log.frames(DAC),
            [vec![0xE0u8, 0x00, 0x04], vec![0x32, 0x7F, 0xFF], vec![0x30, 0x7C, 0x5C]]
        );
        assert_eq!(b.mixer_bias(LO0, I).unwrap(), 0.0);
        assert_eq!(b.mixer_bias(LO0, Q).unwrap(), -0.071);
    }

    #[test]
    fn test_mixer_bias_without_dac() {
        let log = EventLog::default();
        let reference = ReferencePath::direct(10_000_000).unwrap();
        let ch = Channel::new(
            ChannelConfig {
                name: "lo0".into(),
                min_hz: 300_000_000,
                max_hz: 6_000_000_000,
                default_hz: 2_400_000_000,
                group: None,
                bias: Some(MixerBias { dac_i: 1, dac_q: 0 }),
            },
            Lmx2820::new(MockSpi::new(0, &log), reference).unwrap(),
            None,
        );
        let b: TestBoard = Board::new(vec![ch], vec![], MemoryStore::new()).unwrap();
        assert!(matches!(b.set_mixer_bias(LO0, I, 0.1), Err(BoardError::NoBias(LO0))));
    }

    #[test]
    fn test_unknown_channel() {
        let log = EventLog::default();
        let b = board(&log, MemoryStore::new());
        assert!(matches!(b.set_frequency(5, 1_000_000_000), Err(BoardError::UnknownChannel(5))));
        assert!(matches!(b.frequency(5), Err(BoardError::UnknownChannel(5))));
    }

    #[test]
    fn test_unknown_group() {
        let log = EventLog::default();
        let reference = ReferencePath::direct(10_000_000).unwrap();
        let ch = Channel::new(
            ChannelConfig {
                name: "lo0".into(),
                min_hz: 300_000_000,
                max_hz: 6_000_000_000,
                default_hz: 2_400_000_000,
                group: Some(1),
                bias: None,
            },
            Lmx2820::new(MockSpi::new(0, &log), reference).unwrap(),
            None,
        );
        let res: Result<TestBoard, _> = Board::new(vec![ch], vec![], MemoryStore::new());
        assert!(matches!(res, Err(BoardError::UnknownGroup(1))));
    }

    #[test]
    fn test_channels_in_parallel() {
        let log = EventLog::default();
        let b = board(&log, MemoryStore::new());
        b.bring_up().unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                for f in [1_000_000_000u64, 2_000_000_000, 3_000_000_000] {
                    b.set_frequency(LO0, f).unwrap();
                }
            });
            s.spawn(|| {
                for f in [6_000_000_000u64, 7_000_000_000, 8_000_000_000] {
                    b.set_frequency(LO1, f).unwrap();
                }
            });
        });
        assert_eq!(b.frequency(LO0).unwrap(), Some(3e9));
        assert_eq!(b.frequency(LO1).unwrap(), Some(8e9));
    }

    #[test]
    fn test_group_serializes_channels() {
        let log = EventLog::default();
        let reference = ReferencePath::direct(10_000_000).unwrap();
        let mut topology = ReferenceTopology::new();
        topology
            .add_line(0, MockPin::new(0, &log), LineRole::ReferenceSelect { safe: false }, true)
            .unwrap();
        let group = ReferenceGroup::new(topology, Sequencer::new(MockDelay::new(&log), SettleDelays::default()));
        let channels = (0..2u8)
            .map(|i| {
                Channel::new(
                    ChannelConfig {
                        name: format!("lo{}", i),
                        min_hz: 300_000_000,
                        max_hz: 6_000_000_000,
                        default_hz: 2_400_000_000,
                        group: Some(0),
                        bias: None,
                    },
                    Lmx2820::new(MockSpi::new(i, &log), reference).unwrap(),
                    None,
                )
            })
            .collect();
        let b: TestBoard = Board::new(channels, vec![group], MemoryStore::new()).unwrap();
        b.bring_up().unwrap();
        log.clear();

        thread::scope(|s| {
            for ch in 0..2usize {
                let b = &b;
                s.spawn(move || {
                    for f in [1_000_000_000u64, 2_000_000_000, 3_000_000_000, 4_000_000_000] {
                        b.set_frequency(ch, f + ch as u64 * 1_000_000).unwrap();
                    }
                });
            }
        });

        // each forced window holds the writes of a single channel
        let mut window: Option<Option<u8>> = None;
        let mut windows = 0;
        for e in log.events() {
            match e {
                Event::Pin { line: 0, high: false } => {
                    assert!(window.is_none(), "forced twice");
                    window = Some(None);
                }
                Event::Pin { line: 0, high: true } => {
                    assert!(window.take().is_some(), "restored twice");
                    windows += 1;
                }
                Event::Write { chip, .. } => {
                    let owner = window.as_mut().expect("write outside a forced window");
                    assert_eq!(*owner.get_or_insert(chip), chip);
                }
                _ => {}
            }
        }
        assert_eq!(windows, 8);
        assert!(window.is_none());
    }
}
