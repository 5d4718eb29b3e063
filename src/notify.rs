//! Point lifecycle notifications.
//!
//! The owning session registers one [`UpdateNotifier`] when it builds the
//! database. It is invoked synchronously, before the mutating call returns,
//! for every point creation, mutation and deletion.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::ObjectGroup;

/// Point lifecycle event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    /// Point created
    Add,
    /// Point value, flags or configuration changed
    Update,
    /// Point removed
    Delete,
}

/// One lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointUpdate {
    pub kind: UpdateKind,
    pub group: ObjectGroup,
    /// Point number, or a packed outer/inner index for two-level objects
    pub index: u16,
}

impl PointUpdate {
    pub const fn new(kind: UpdateKind, group: ObjectGroup, index: u16) -> Self {
        Self { kind, group, index }
    }
}

/// Pack a two-level index: high byte is the outer index, low byte the inner.
#[inline]
pub const fn pack_index(outer: u16, inner: u16) -> u16 {
    ((outer & 0xFF) << 8) | (inner & 0xFF)
}

/// Split a packed index into `(outer, inner)`.
#[inline]
pub const fn unpack_index(packed: u16) -> (u16, u16) {
    (packed >> 8, packed & 0xFF)
}

/// Receiver of point lifecycle notifications.
pub trait UpdateNotifier: Send + Sync {
    fn notify(&self, update: PointUpdate);
}

/// Notifier that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl UpdateNotifier for NoopNotifier {
    fn notify(&self, _update: PointUpdate) {}
}

/// Notifier that records every update, for test harnesses.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    updates: Mutex<Vec<PointUpdate>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PointUpdate>> {
        self.updates.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Updates recorded so far.
    pub fn updates(&self) -> Vec<PointUpdate> {
        self.lock().clone()
    }

    /// Drain recorded updates.
    pub fn take(&self) -> Vec<PointUpdate> {
        std::mem::take(&mut *self.lock())
    }
}

impl UpdateNotifier for RecordingNotifier {
    fn notify(&self, update: PointUpdate) {
        self.lock().push(update);
    }
}

/// Shared handle to the registered notifier.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<dyn UpdateNotifier>,
}

impl Notifier {
    pub fn new(inner: Arc<dyn UpdateNotifier>) -> Self {
        Self { inner }
    }

    pub fn add(&self, group: ObjectGroup, index: u16) {
        self.emit(UpdateKind::Add, group, index);
    }

    pub fn update(&self, group: ObjectGroup, index: u16) {
        self.emit(UpdateKind::Update, group, index);
    }

    pub fn delete(&self, group: ObjectGroup, index: u16) {
        self.emit(UpdateKind::Delete, group, index);
    }

    fn emit(&self, kind: UpdateKind, group: ObjectGroup, index: u16) {
        tracing::trace!(?kind, %group, index, "point update");
        self.inner.notify(PointUpdate::new(kind, group, index));
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(Arc::new(NoopNotifier))
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Notifier")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_index() {
        assert_eq!(pack_index(2, 5), 0x0205);
        assert_eq!(pack_index(0, 254), 0x00FE);
        assert_eq!(unpack_index(0x0205), (2, 5));
        // Only the low byte of each part survives
        assert_eq!(pack_index(0x0102, 0x0304), 0x0204);
    }

    #[test]
    fn test_recording_notifier() {
        let recorder = Arc::new(RecordingNotifier::new());
        let notifier = Notifier::new(recorder.clone());

        notifier.add(ObjectGroup::BinaryInput, 0);
        notifier.update(ObjectGroup::BinaryInput, 0);
        notifier.delete(ObjectGroup::Counter, 3);

        assert_eq!(
            recorder.take(),
            vec![
                PointUpdate::new(UpdateKind::Add, ObjectGroup::BinaryInput, 0),
                PointUpdate::new(UpdateKind::Update, ObjectGroup::BinaryInput, 0),
                PointUpdate::new(UpdateKind::Delete, ObjectGroup::Counter, 3),
            ]
        );
        assert!(recorder.updates().is_empty());
    }

    #[test]
    fn test_default_notifier_discards() {
        let notifier = Notifier::default();
        notifier.add(ObjectGroup::AnalogInput, 1);
    }
}
