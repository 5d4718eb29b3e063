//! Device attributes (g0).
//!
//! Attributes are grouped into sets addressed by a master-assigned point
//! index; within a set each attribute is addressed by its variation.
//! Notifications carry the packed `(point << 8) | variation` index, and a
//! set itself is reported with variation 0.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{DbError, Result};
use crate::notify::pack_index;
use crate::sparse::SparseTable;
use crate::table::DbContext;
use crate::types::{DataValue, ObjectGroup, Timestamp};

/// Variation of the standard attribute set's "user-assigned location".
pub const VARIATION_LOCATION: u8 = 245;
/// Variation of the standard attribute set's "user-assigned ID code".
pub const VARIATION_ID_CODE: u8 = 246;
/// Variation of the standard attribute set's "user-assigned device name".
pub const VARIATION_DEVICE_NAME: u8 = 247;
/// Variation of the standard attribute set's "device manufacturer's name".
pub const VARIATION_MANUFACTURER: u8 = 252;

/// One device attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub value: DataValue,
    /// Master may overwrite the value
    pub writable: bool,
    pub timestamp: Timestamp,
}

/// Attributes sharing one g0 point index.
#[derive(Debug, Clone, Default)]
pub struct AttributeSet {
    attributes: BTreeMap<u8, Attribute>,
}

impl AttributeSet {
    pub fn get(&self, variation: u8) -> Option<&Attribute> {
        self.attributes.get(&variation)
    }

    /// Number of attributes in the set.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attributes in variation order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &Attribute)> {
        self.attributes.iter().map(|(v, a)| (*v, a))
    }
}

/// Device attribute sets.
#[derive(Debug)]
pub struct DeviceAttributes {
    sets: SparseTable<AttributeSet>,
    max_per_set: usize,
    ctx: DbContext,
}

impl DeviceAttributes {
    pub fn new(max_sets: usize, max_per_set: usize, ctx: DbContext) -> Self {
        Self {
            sets: SparseTable::new("device attribute sets", max_sets),
            max_per_set,
            ctx,
        }
    }

    /// Number of sets.
    pub fn quantity(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn get_set(&self, point: u16) -> Option<&AttributeSet> {
        self.sets.get(point)
    }

    /// Attribute at `(point, variation)`.
    pub fn get(&self, point: u16, variation: u8) -> Option<&Attribute> {
        self.sets.get(point)?.get(variation)
    }

    /// Point indices of every set, ascending.
    pub fn points(&self) -> impl Iterator<Item = u16> + '_ {
        self.sets.iter().map(|(i, _)| i)
    }

    /// Create the set at `point`. Creating an existing set is a no-op.
    pub fn add_set(&mut self, point: u16) -> Result<()> {
        if self.sets.insert(point, AttributeSet::default())? {
            debug!(point, "attribute set added");
            self.ctx
                .notifier()
                .add(ObjectGroup::DeviceAttributes, pack_index(point, 0));
        }
        Ok(())
    }

    /// Create or replace an attribute from the device side.
    pub fn set(&mut self, point: u16, variation: u8, value: DataValue, writable: bool) -> Result<()> {
        let max = self.max_per_set;
        let attribute = Attribute {
            value: value.stored(self.ctx.storage()),
            writable,
            timestamp: self.ctx.now(),
        };
        let set = self.sets.get_mut(point).ok_or(DbError::NotFound)?;

        let existed = set.attributes.contains_key(&variation);
        if !existed && set.attributes.len() >= max {
            return Err(DbError::capacity("device attributes", max));
        }
        set.attributes.insert(variation, attribute);

        let packed = pack_index(point, variation as u16);
        if existed {
            self.ctx.notifier().update(ObjectGroup::DeviceAttributes, packed);
        } else {
            self.ctx.notifier().add(ObjectGroup::DeviceAttributes, packed);
        }
        Ok(())
    }

    /// Overwrite an attribute on behalf of the master.
    ///
    /// Only existing attributes flagged writable accept a write.
    pub fn write(&mut self, point: u16, variation: u8, value: DataValue) -> Result<()> {
        let storage = self.ctx.storage();
        let now = self.ctx.now();
        let attribute = self
            .sets
            .get_mut(point)
            .and_then(|s| s.attributes.get_mut(&variation))
            .ok_or(DbError::NotFound)?;
        if !attribute.writable {
            return Err(DbError::NotSupported);
        }
        attribute.value = value.stored(storage);
        attribute.timestamp = now;
        self.ctx
            .notifier()
            .update(ObjectGroup::DeviceAttributes, pack_index(point, variation as u16));
        Ok(())
    }

    /// Remove one attribute.
    pub fn delete(&mut self, point: u16, variation: u8) -> bool {
        let removed = self
            .sets
            .get_mut(point)
            .and_then(|s| s.attributes.remove(&variation))
            .is_some();
        if removed {
            self.ctx
                .notifier()
                .delete(ObjectGroup::DeviceAttributes, pack_index(point, variation as u16));
        }
        removed
    }

    /// Remove a set and its attributes; higher sets move down one index.
    ///
    /// The set's own delete is reported before its attributes'.
    pub fn delete_set(&mut self, point: u16) -> bool {
        let Some(set) = self.sets.remove(point) else {
            return false;
        };
        debug!(point, attributes = set.len(), "attribute set deleted");
        let notifier = self.ctx.notifier();
        notifier.delete(ObjectGroup::DeviceAttributes, pack_index(point, 0));
        for variation in set.attributes.keys().rev() {
            notifier.delete(ObjectGroup::DeviceAttributes, pack_index(point, *variation as u16));
        }
        true
    }

    /// Remove every set, highest index first.
    pub fn destroy(&mut self) {
        while let Some(point) = self.sets.last_index() {
            self.delete_set(point);
        }
    }
}
