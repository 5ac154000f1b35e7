//! One-to-one table from external user ids to the 16-bit ids the grid carries.
//!
//! Slots are an arena indexed by internal id. New users get the lowest free
//! slot; released slots go onto a free list and are handed out again before
//! the arena grows.

use crate::error::{Result, WatermarkError};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

const ID_SPACE: usize = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub external_id: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct IdentityTable {
    slots: Vec<Option<IdentityRecord>>,
    by_external: HashMap<String, u16>,
    free: BTreeSet<u16>,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the lookup index and free list from a slot arena.
    fn from_slots(slots: Vec<Option<IdentityRecord>>) -> Result<Self> {
        if slots.len() > ID_SPACE {
            return Err(WatermarkError::IdSpaceExhausted);
        }
        let mut table = Self {
            slots,
            ..Self::default()
        };
        for (id, slot) in table.slots.iter().enumerate() {
            match slot {
                Some(record) => {
                    table.by_external.insert(record.external_id.clone(), id as u16);
                }
                None => {
                    table.free.insert(id as u16);
                }
            }
        }
        Ok(table)
    }

    /// Returns the id already assigned to `external_id`, or assigns the
    /// lowest unused one.
    pub fn get_or_allocate(&mut self, external_id: &str) -> Result<u16> {
        let now = Utc::now();
        if let Some(&id) = self.by_external.get(external_id) {
            if let Some(Some(record)) = self.slots.get_mut(id as usize) {
                record.last_accessed_at = now;
            }
            return Ok(id);
        }

        let id = match self.free.pop_first() {
            Some(id) => id,
            None if self.slots.len() < ID_SPACE => {
                self.slots.push(None);
                (self.slots.len() - 1) as u16
            }
            None => return Err(WatermarkError::IdSpaceExhausted),
        };
        self.slots[id as usize] = Some(IdentityRecord {
            external_id: external_id.to_string(),
            created_at: now,
            last_accessed_at: now,
        });
        self.by_external.insert(external_id.to_string(), id);
        info!("Allocated internal id {} for '{}'", id, external_id);
        Ok(id)
    }

    pub fn internal_id(&self, external_id: &str) -> Option<u16> {
        self.by_external.get(external_id).copied()
    }

    pub fn external_id(&self, id: u16) -> Option<&str> {
        self.record(id).map(|r| r.external_id.as_str())
    }

    pub fn record(&self, id: u16) -> Option<&IdentityRecord> {
        self.slots.get(id as usize).and_then(|s| s.as_ref())
    }

    /// Frees `id` for reuse and returns the external id it belonged to.
    pub fn release(&mut self, id: u16) -> Option<String> {
        let record = self.slots.get_mut(id as usize)?.take()?;
        self.by_external.remove(&record.external_id);
        self.free.insert(id);
        debug!("Released internal id {}", id);
        Some(record.external_id)
    }

    pub fn len(&self) -> usize {
        self.by_external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_external.is_empty()
    }

    /// Loads a table saved with [`save`](Self::save). A missing file is an
    /// empty table.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No identity table at '{}', starting empty", path.display());
            return Ok(Self::new());
        }
        let bytes = fs::read(path)?;
        let slots: Vec<Option<IdentityRecord>> = bincode::deserialize(&bytes)?;
        let table = Self::from_slots(slots)?;
        debug!("Loaded {} identities from '{}'", table.len(), path.display());
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serialize(&self.slots)?;
        fs::write(path, bytes)?;
        debug!("Saved {} identities to '{}'", self.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_dense_and_stable() {
        let mut table = IdentityTable::new();
        assert_eq!(table.get_or_allocate("alice").unwrap(), 0);
        assert_eq!(table.get_or_allocate("bob").unwrap(), 1);
        assert_eq!(table.get_or_allocate("alice").unwrap(), 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.external_id(1), Some("bob"));
        assert_eq!(table.internal_id("alice"), Some(0));
        assert_eq!(table.external_id(7), None);
    }

    #[test]
    fn released_slots_are_reused_lowest_first() {
        let mut table = IdentityTable::new();
        for name in ["a", "b", "c", "d"] {
            table.get_or_allocate(name).unwrap();
        }
        assert_eq!(table.release(2).as_deref(), Some("c"));
        assert_eq!(table.release(1).as_deref(), Some("b"));
        assert_eq!(table.release(1), None);
        assert_eq!(table.get_or_allocate("e").unwrap(), 1);
        assert_eq!(table.get_or_allocate("f").unwrap(), 2);
        assert_eq!(table.get_or_allocate("g").unwrap(), 4);
        assert_eq!(table.internal_id("b"), None);
    }

    #[test]
    fn exhausts_after_full_id_space() {
        let mut table = IdentityTable::new();
        for i in 0..ID_SPACE {
            table.get_or_allocate(&i.to_string()).unwrap();
        }
        assert!(matches!(
            table.get_or_allocate("one-too-many"),
            Err(WatermarkError::IdSpaceExhausted)
        ));
        assert_eq!(table.get_or_allocate("65535").unwrap(), 65535);
    }
}
