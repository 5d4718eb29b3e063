//! Datasets (g85 prototypes, g86 descriptors, g87 present values).
//!
//! A descriptor is an ordered list of elements, either enumerated literally
//! or pulled in from a UUID-identified prototype. Writing a new element
//! materializes value slots: one per literal element, or one per
//! data-bearing element of a referenced prototype. The dataset identifier
//! element is implicit and never stored.

use bytes::Bytes;
use tracing::{debug, trace};

use crate::control::ControlStatus;
use crate::error::{DbError, Result};
use crate::notify::pack_index;
use crate::sparse::SparseTable;
use crate::table::DbContext;
use crate::types::{ClassMask, DataType, DataValue, ObjectGroup, Timestamp};

/// Length of a prototype UUID.
pub const UUID_LEN: usize = 16;

/// Prototype identifier.
pub type Uuid = [u8; UUID_LEN];

/// Descriptor element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElementType {
    /// Dataset identifier (ID)
    Id = 1,
    /// Prototype UUID (UUID)
    Uuid = 2,
    /// Namespace (NSPC)
    Namespace = 3,
    /// Name annotation (NAME)
    Name = 4,
    /// Data element (DAEL)
    DataElement = 5,
    /// Control status (CTLS)
    ControlStatus = 6,
    /// Control value (CTLV)
    ControlValue = 7,
    /// Prototype reference (PTYP)
    PrototypeRef = 8,
}

impl ElementType {
    /// Create ElementType from raw byte value.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Id),
            2 => Ok(Self::Uuid),
            3 => Ok(Self::Namespace),
            4 => Ok(Self::Name),
            5 => Ok(Self::DataElement),
            6 => Ok(Self::ControlStatus),
            7 => Ok(Self::ControlValue),
            8 => Ok(Self::PrototypeRef),
            _ => Err(DbError::NotSupported),
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if elements of this type carry a value in the dataset.
    #[inline]
    pub const fn is_data_bearing(&self) -> bool {
        matches!(self, Self::DataElement | Self::ControlStatus | Self::ControlValue)
    }
}

/// One descriptor or prototype element.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorElement {
    pub element_type: ElementType,
    pub data_type: DataType,
    /// Maximum data length declared for the element
    pub max_len: u8,
    /// Ancillary value: element name, namespace text or prototype UUID
    pub ancillary: Bytes,
}

impl DescriptorElement {
    pub fn new(element_type: ElementType, data_type: DataType, max_len: u8, ancillary: &[u8]) -> Self {
        Self {
            element_type,
            data_type,
            max_len,
            ancillary: Bytes::copy_from_slice(ancillary),
        }
    }

    /// Data element (DAEL).
    pub fn data(data_type: DataType, max_len: u8, name: &[u8]) -> Self {
        Self::new(ElementType::DataElement, data_type, max_len, name)
    }

    /// Control value (CTLV).
    pub fn control_value(data_type: DataType, max_len: u8, name: &[u8]) -> Self {
        Self::new(ElementType::ControlValue, data_type, max_len, name)
    }

    /// Control status (CTLS).
    pub fn control_status(data_type: DataType, max_len: u8, name: &[u8]) -> Self {
        Self::new(ElementType::ControlStatus, data_type, max_len, name)
    }

    /// Name annotation (NAME).
    pub fn name(name: &[u8]) -> Self {
        Self::new(ElementType::Name, DataType::VisibleString, 0, name)
    }

    /// Namespace (NSPC).
    pub fn namespace(namespace: &[u8]) -> Self {
        Self::new(ElementType::Namespace, DataType::VisibleString, 0, namespace)
    }

    /// Reference to a prototype (PTYP).
    pub fn prototype(uuid: &Uuid) -> Self {
        Self::new(ElementType::PrototypeRef, DataType::OctetString, UUID_LEN as u8, uuid)
    }

    /// Referenced prototype UUID, for PTYP elements.
    pub fn prototype_uuid(&self) -> Option<Uuid> {
        if self.element_type != ElementType::PrototypeRef {
            return None;
        }
        self.ancillary.as_ref().try_into().ok()
    }

    fn stored(mut self, ctx: &DbContext) -> Self {
        // A prototype reference keeps its whole UUID
        if self.element_type != ElementType::PrototypeRef {
            self.ancillary = ctx.storage().store(&self.ancillary);
        }
        self
    }
}

/// Reusable dataset layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    uuid: Uuid,
    elements: Vec<DescriptorElement>,
}

impl Prototype {
    #[inline]
    pub fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    pub fn elements(&self) -> &[DescriptorElement] {
        &self.elements
    }

    /// Elements that carry a value.
    pub fn data_elements(&self) -> impl Iterator<Item = &DescriptorElement> {
        self.elements.iter().filter(|e| e.element_type.is_data_bearing())
    }
}

/// Device-wide prototype table with dense ids.
#[derive(Debug)]
pub struct Prototypes {
    prototypes: Vec<Prototype>,
    capacity: usize,
    element_capacity: usize,
    ctx: DbContext,
}

impl Prototypes {
    pub fn new(capacity: usize, element_capacity: usize, ctx: DbContext) -> Self {
        Self {
            prototypes: Vec::new(),
            capacity,
            element_capacity,
            ctx,
        }
    }

    pub fn quantity(&self) -> u16 {
        self.prototypes.len() as u16
    }

    pub fn get(&self, id: u16) -> Option<&Prototype> {
        self.prototypes.get(id as usize)
    }

    /// Look up a prototype by UUID, returning its id.
    pub fn find(&self, uuid: &Uuid) -> Option<(u16, &Prototype)> {
        self.prototypes
            .iter()
            .enumerate()
            .find(|(_, p)| &p.uuid == uuid)
            .map(|(id, p)| (id as u16, p))
    }

    /// Create a prototype, returning its id. An existing UUID keeps its id.
    pub fn add(&mut self, uuid: Uuid) -> Result<u16> {
        if let Some((id, _)) = self.find(&uuid) {
            return Ok(id);
        }
        if self.prototypes.len() >= self.capacity {
            return Err(DbError::capacity("dataset prototypes", self.capacity));
        }
        let id = self.prototypes.len() as u16;
        self.prototypes.push(Prototype {
            uuid,
            elements: Vec::new(),
        });
        debug!(id, "dataset prototype added");
        self.ctx.notifier().add(ObjectGroup::DatasetPrototype, id);
        Ok(id)
    }

    /// Write the element at `position`, appending if it is the next free slot.
    pub fn write_element(&mut self, id: u16, position: usize, element: DescriptorElement) -> Result<()> {
        if position >= self.element_capacity {
            return Err(DbError::capacity("prototype elements", self.element_capacity));
        }
        let element = element.stored(&self.ctx);
        let prototype = self.prototypes.get_mut(id as usize).ok_or(DbError::NotFound)?;
        store_element(&mut prototype.elements, position, element)?;
        self.ctx.notifier().update(ObjectGroup::DatasetPrototype, id);
        Ok(())
    }

    /// Remove a prototype; every higher id moves down by one.
    pub fn delete(&mut self, id: u16) -> bool {
        if id as usize >= self.prototypes.len() {
            return false;
        }
        self.prototypes.remove(id as usize);
        debug!(id, "dataset prototype deleted");
        self.ctx.notifier().delete(ObjectGroup::DatasetPrototype, id);
        true
    }

    /// Remove every prototype, highest id first.
    pub fn destroy(&mut self) {
        while let Some(last) = self.prototypes.len().checked_sub(1) {
            self.delete(last as u16);
        }
    }
}

/// Append at the end or overwrite in place; positions past the end are rejected.
///
/// Returns true when a new element was appended.
fn store_element(
    elements: &mut Vec<DescriptorElement>,
    position: usize,
    element: DescriptorElement,
) -> Result<bool> {
    match position.cmp(&elements.len()) {
        std::cmp::Ordering::Less => {
            elements[position] = element;
            Ok(false)
        }
        std::cmp::Ordering::Equal => {
            elements.push(element);
            Ok(true)
        }
        std::cmp::Ordering::Greater => Err(DbError::NotFound),
    }
}

/// Dataset characteristics byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Characteristics(u8);

impl Characteristics {
    pub const READABLE: Self = Self(0x01);
    pub const WRITABLE: Self = Self(0x02);
    pub const STATIC: Self = Self(0x04);
    pub const EVENT: Self = Self(0x08);

    #[inline]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw & 0x0F)
    }

    #[inline]
    pub const fn as_raw(&self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Characteristics {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Concrete point bound to a data-bearing descriptor element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointRef {
    pub group: ObjectGroup,
    pub index: u16,
}

/// One dataset: descriptor, point bindings and present values.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub characteristics: Characteristics,
    pub class_mask: ClassMask,
    elements: Vec<DescriptorElement>,
    point_refs: Vec<Option<PointRef>>,
    values: Vec<DataValue>,
    timestamp: Timestamp,
    test_failure: Option<ControlStatus>,
    changed: bool,
}

impl Dataset {
    fn new(characteristics: Characteristics, class_mask: ClassMask, now: Timestamp) -> Self {
        Self {
            characteristics,
            class_mask,
            elements: Vec::new(),
            point_refs: Vec::new(),
            values: Vec::new(),
            timestamp: now,
            test_failure: None,
            changed: false,
        }
    }

    /// Descriptor elements, excluding the implicit identifier.
    pub fn elements(&self) -> &[DescriptorElement] {
        &self.elements
    }

    pub fn values(&self) -> &[DataValue] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&DataValue> {
        self.values.get(index)
    }

    pub fn point_ref(&self, position: usize) -> Option<PointRef> {
        self.point_refs.get(position).copied().flatten()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn test_failure(&self) -> Option<ControlStatus> {
        self.test_failure
    }
}

/// Dataset descriptors keyed by master-assigned dataset id.
#[derive(Debug)]
pub struct Datasets {
    sets: SparseTable<Dataset>,
    element_capacity: usize,
    value_capacity: usize,
    ctx: DbContext,
}

impl Datasets {
    pub fn new(capacity: usize, element_capacity: usize, value_capacity: usize, ctx: DbContext) -> Self {
        Self {
            sets: SparseTable::new("datasets", capacity),
            element_capacity,
            value_capacity,
            ctx,
        }
    }

    pub fn quantity(&self) -> usize {
        self.sets.len()
    }

    pub fn contains(&self, id: u16) -> bool {
        self.sets.contains(id)
    }

    pub fn get(&self, id: u16) -> Option<&Dataset> {
        self.sets.get(id)
    }

    /// Dataset ids, ascending.
    pub fn ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.sets.iter().map(|(i, _)| i)
    }

    /// Create the dataset `id`. Creating an existing dataset is a no-op.
    pub fn add(&mut self, id: u16, characteristics: Characteristics, class_mask: ClassMask) -> Result<()> {
        let dataset = Dataset::new(characteristics, class_mask, self.ctx.now());
        if self.sets.insert(id, dataset)? {
            debug!(id, "dataset added");
            self.ctx
                .notifier()
                .add(ObjectGroup::DatasetDescriptor, pack_index(id, 0));
        }
        Ok(())
    }

    /// Write descriptor element `position`, expanding value slots when the
    /// element is new.
    ///
    /// A new prototype reference materializes one zero value per
    /// data-bearing element of the prototype; any other new element except
    /// a name annotation materializes one slot of its own type.
    pub fn write_descriptor_element(
        &mut self,
        id: u16,
        position: usize,
        element: DescriptorElement,
        prototypes: &Prototypes,
    ) -> Result<()> {
        if position >= self.element_capacity {
            return Err(DbError::capacity("descriptor elements", self.element_capacity));
        }
        if element.element_type == ElementType::Id {
            return Err(DbError::NotSupported);
        }

        let now = self.ctx.now();
        let value_capacity = self.value_capacity;
        let element = element.stored(&self.ctx);
        let dataset = self.sets.get_mut(id).ok_or(DbError::NotFound)?;
        if position > dataset.elements.len() {
            return Err(DbError::NotFound);
        }

        let mut slots = Vec::new();
        if position == dataset.elements.len() {
            if let Some(uuid) = element.prototype_uuid() {
                let (_, prototype) = prototypes.find(&uuid).ok_or(DbError::NotFound)?;
                slots.extend(prototype.data_elements().map(|e| e.data_type.zero_value(now)));
            } else if element.element_type != ElementType::Name {
                slots.push(element.data_type.zero_value(now));
            }
            if dataset.values.len() + slots.len() > value_capacity {
                return Err(DbError::capacity("dataset values", value_capacity));
            }
        }

        if store_element(&mut dataset.elements, position, element)? {
            dataset.point_refs.push(None);
        }
        if !slots.is_empty() {
            trace!(id, position, slots = slots.len(), "dataset values expanded");
            dataset.values.extend(slots);
        }
        self.ctx
            .notifier()
            .update(ObjectGroup::DatasetDescriptor, pack_index(id, position as u16));
        Ok(())
    }

    /// Bind descriptor element `position` to a concrete point.
    pub fn set_point_ref(&mut self, id: u16, position: usize, point: PointRef) -> Result<()> {
        let dataset = self.sets.get_mut(id).ok_or(DbError::NotFound)?;
        let slot = dataset.point_refs.get_mut(position).ok_or(DbError::NotFound)?;
        *slot = Some(point);
        Ok(())
    }

    /// Present value at `index`.
    pub fn read_value(&self, id: u16, index: usize) -> Option<&DataValue> {
        self.sets.get(id)?.values.get(index)
    }

    /// Store a value at `index`, appending if it is the next free slot.
    ///
    /// Variable-length payloads are copied into dataset-owned storage.
    pub fn write_value(&mut self, id: u16, index: usize, value: DataValue) -> Result<()> {
        if index >= self.value_capacity {
            return Err(DbError::capacity("dataset values", self.value_capacity));
        }
        let now = self.ctx.now();
        let value = value.stored(self.ctx.storage());
        let dataset = self.sets.get_mut(id).ok_or(DbError::NotFound)?;
        put_value(dataset, index, value, now)?;
        self.ctx
            .notifier()
            .update(ObjectGroup::DatasetPresentValue, pack_index(id, index as u16));
        Ok(())
    }

    /// Validate a control run without acting on it.
    pub fn select(&self, id: u16, start: usize, values: &[DataValue]) -> Result<()> {
        let dataset = self.sets.get(id).ok_or(DbError::NotFound)?;
        self.check_control(dataset, start, values.len())
    }

    /// Overwrite the run of values starting at `start`, one index per value.
    pub fn operate(&mut self, id: u16, start: usize, values: &[DataValue]) -> Result<()> {
        let dataset = self.sets.get(id).ok_or(DbError::NotFound)?;
        self.check_control(dataset, start, values.len())?;

        let now = self.ctx.now();
        let storage = self.ctx.storage();
        let dataset = self.sets.get_mut(id).ok_or(DbError::NotFound)?;
        for (offset, value) in values.iter().enumerate() {
            put_value(dataset, start + offset, value.clone().stored(storage), now)?;
        }
        debug!(id, start, count = values.len(), "dataset operate");
        let notifier = self.ctx.notifier();
        for offset in 0..values.len() {
            notifier.update(ObjectGroup::DatasetPresentValue, pack_index(id, (start + offset) as u16));
        }
        Ok(())
    }

    fn check_control(&self, dataset: &Dataset, start: usize, count: usize) -> Result<()> {
        if dataset.test_failure.is_some() {
            return Err(DbError::NotSupported);
        }
        if !dataset.characteristics.contains(Characteristics::WRITABLE) {
            return Err(DbError::NotSupported);
        }
        if start
            .checked_add(count)
            .map_or(true, |end| end > self.value_capacity)
        {
            return Err(DbError::TooManyOperations);
        }
        if start > dataset.values.len() {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Snapshot of the values if they changed since last reported.
    pub fn changed(&mut self, id: u16) -> Option<Vec<DataValue>> {
        let dataset = self.sets.get_mut(id)?;
        if !std::mem::take(&mut dataset.changed) {
            return None;
        }
        Some(dataset.values.clone())
    }

    pub fn set_characteristics(&mut self, id: u16, characteristics: Characteristics) -> Result<()> {
        self.sets.get_mut(id).ok_or(DbError::NotFound)?.characteristics = characteristics;
        self.ctx
            .notifier()
            .update(ObjectGroup::DatasetDescriptor, pack_index(id, 0));
        Ok(())
    }

    pub fn set_class_mask(&mut self, id: u16, class_mask: ClassMask) -> Result<()> {
        self.sets.get_mut(id).ok_or(DbError::NotFound)?.class_mask = class_mask;
        self.ctx
            .notifier()
            .update(ObjectGroup::DatasetDescriptor, pack_index(id, 0));
        Ok(())
    }

    /// Force controls on this dataset to fail.
    pub fn set_test_failure(&mut self, id: u16, status: Option<ControlStatus>) -> Result<()> {
        self.sets.get_mut(id).ok_or(DbError::NotFound)?.test_failure = status;
        Ok(())
    }

    /// Remove a dataset; every higher id moves down by one.
    ///
    /// The descriptor's delete is reported before its values'.
    pub fn delete(&mut self, id: u16) -> bool {
        let Some(dataset) = self.sets.remove(id) else {
            return false;
        };
        debug!(id, values = dataset.values.len(), "dataset deleted");
        let notifier = self.ctx.notifier();
        notifier.delete(ObjectGroup::DatasetDescriptor, pack_index(id, 0));
        for index in (0..dataset.values.len()).rev() {
            notifier.delete(ObjectGroup::DatasetPresentValue, pack_index(id, index as u16));
        }
        true
    }

    /// Remove every dataset, highest id first.
    pub fn destroy(&mut self) {
        while let Some(id) = self.sets.last_index() {
            self.delete(id);
        }
    }
}

fn put_value(dataset: &mut Dataset, index: usize, value: DataValue, now: Timestamp) -> Result<()> {
    match index.cmp(&dataset.values.len()) {
        std::cmp::Ordering::Less => dataset.values[index] = value,
        std::cmp::Ordering::Equal => dataset.values.push(value),
        std::cmp::Ordering::Greater => return Err(DbError::NotFound),
    }
    dataset.timestamp = now;
    dataset.changed = true;
    Ok(())
}
