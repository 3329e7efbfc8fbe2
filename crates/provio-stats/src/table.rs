//! Open-addressing table of accumulated operation durations.
//!
//! Keys are placed at `sdbm(key) mod capacity` and collisions are resolved by
//! linear probing with wraparound. Probing stops at the first empty slot or
//! the matching key, and never visits more than `capacity` slots, so lookups
//! on a full table still terminate.
//!
//! What happens when the table fills up is decided by [`StatsGrowth`]:
//! `Fixed` tables reject new keys with [`StatsError::CapacityExceeded`],
//! `Double` tables grow before the load factor passes 3/4.

use crate::error::{Result, StatsError};
use crate::hash::home_slot;
use provio_core::{ProvioConfig, StatsGrowth};
use serde::Serialize;
use std::fmt::Write as _;
use std::iter::FusedIterator;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Slot {
    key: String,
    value: Duration,
}

/// One reported row of the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsEntry {
    pub name: String,
    pub micros: u64,
}

enum Probe {
    Found(usize),
    Vacant(usize),
    Full,
}

#[derive(Debug, Clone)]
pub struct StatsTable {
    slots: Vec<Option<Slot>>,
    len: usize,
    growth: StatsGrowth,
}

impl StatsTable {
    /// Create a table with `capacity` slots.
    pub fn with_capacity(capacity: usize, growth: StatsGrowth) -> Result<Self> {
        if capacity == 0 {
            return Err(StatsError::ZeroCapacity);
        }
        Ok(Self { slots: empty_slots(capacity)?, len: 0, growth })
    }

    pub fn from_config(config: &ProvioConfig) -> Result<Self> {
        Self::with_capacity(config.stats_capacity, config.stats_growth)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn growth(&self) -> StatsGrowth {
        self.growth
    }

    /// Accumulated duration for `key`, or `None` if it was never reported.
    pub fn get(&self, key: &str) -> Option<Duration> {
        match self.probe(key) {
            Probe::Found(index) => self.slots[index].as_ref().map(|slot| slot.value),
            Probe::Vacant(_) | Probe::Full => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Overwrite the value for `key`, inserting it if absent.
    pub fn set_or_insert(&mut self, key: &str, value: Duration) -> Result<()> {
        let index = self.slot_for_write(key)?;
        match &mut self.slots[index] {
            Some(slot) => slot.value = value,
            vacant => {
                *vacant = Some(Slot { key: key.to_string(), value });
                self.len += 1;
            }
        }
        Ok(())
    }

    /// Add `delta` to the accumulator for `key`, creating it at zero first.
    ///
    /// Returns the new accumulated total. Not atomic; shared tables go
    /// through [`crate::SharedStats`].
    pub fn accumulate(&mut self, key: &str, delta: Duration) -> Result<Duration> {
        let index = self.slot_for_write(key)?;
        let slot = match &mut self.slots[index] {
            Some(slot) => slot,
            vacant => {
                self.len += 1;
                tracing::trace!(operation = key, "stats entry created");
                vacant.insert(Slot { key: key.to_string(), value: Duration::ZERO })
            }
        };
        slot.value = slot.value.saturating_add(delta);
        Ok(slot.value)
    }

    /// Lazily yield every `(key, value)` pair in slot order.
    ///
    /// Iterators can be created any number of times; the borrow keeps
    /// insertion from interleaving with an iteration in progress.
    pub fn iter(&self) -> Iter<'_> {
        Iter { slots: self.slots.iter() }
    }

    /// Sum of every accumulated duration.
    pub fn total(&self) -> Duration {
        self.iter().map(|(_, value)| value).sum()
    }

    pub fn entries(&self) -> Vec<StatsEntry> {
        self.iter()
            .map(|(name, value)| StatsEntry {
                name: name.to_string(),
                micros: micros(value),
            })
            .collect()
    }

    /// One `<name> <micros> us` line per entry, in slot order.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.iter() {
            // Writing into a String cannot fail.
            let _ = writeln!(out, "{} {} us", name, micros(value));
        }
        out
    }

    /// Write [`Self::render_text`] to `path`, replacing any existing file.
    pub fn write_report(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.render_text())?;
        tracing::debug!(path = %path.display(), entries = self.len, "stats report written");
        Ok(())
    }

    /// JSON object mapping each operation name to its total in microseconds.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .iter()
            .map(|(name, value)| (name.to_string(), serde_json::Value::from(micros(value))))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }

    fn probe(&self, key: &str) -> Probe {
        let capacity = self.slots.len();
        let mut index = home_slot(key, capacity);
        for _ in 0..capacity {
            match &self.slots[index] {
                None => return Probe::Vacant(index),
                Some(slot) if slot.key == key => return Probe::Found(index),
                Some(_) => {
                    index += 1;
                    if index == capacity {
                        index = 0;
                    }
                }
            }
        }
        Probe::Full
    }

    fn slot_for_write(&mut self, key: &str) -> Result<usize> {
        if let Probe::Found(index) = self.probe(key) {
            return Ok(index);
        }
        if self.growth == StatsGrowth::Double && (self.len + 1) * 4 > self.capacity() * 3 {
            self.grow()?;
        }
        match self.probe(key) {
            Probe::Found(index) | Probe::Vacant(index) => Ok(index),
            Probe::Full => Err(StatsError::CapacityExceeded { capacity: self.capacity() }),
        }
    }

    fn grow(&mut self) -> Result<()> {
        let new_capacity = self.capacity() * 2;
        let old = std::mem::replace(&mut self.slots, empty_slots(new_capacity)?);
        for slot in old.into_iter().flatten() {
            let mut index = home_slot(&slot.key, new_capacity);
            while self.slots[index].is_some() {
                index = (index + 1) % new_capacity;
            }
            self.slots[index] = Some(slot);
        }
        tracing::debug!(capacity = new_capacity, len = self.len, "stats table grown");
        Ok(())
    }
}

fn empty_slots(capacity: usize) -> Result<Vec<Option<Slot>>> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(capacity)
        .map_err(|_| StatsError::OutOfMemory { what: "stats slots" })?;
    slots.resize_with(capacity, || None);
    Ok(slots)
}

fn micros(value: Duration) -> u64 {
    u64::try_from(value.as_micros()).unwrap_or(u64::MAX)
}

/// Iterator over occupied slots of a [`StatsTable`].
pub struct Iter<'a> {
    slots: std::slice::Iter<'a, Option<Slot>>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, Duration);

    fn next(&mut self) -> Option<Self::Item> {
        self.slots
            .by_ref()
            .flatten()
            .next()
            .map(|slot| (slot.key.as_str(), slot.value))
    }
}

impl FusedIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a StatsTable {
    type Item = (&'a str, Duration);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
