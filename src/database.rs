//! Outstation process database.
//!
//! [`Database`] owns every point table plus device attributes, datasets,
//! security users and user event queues. Operations spanning more than one
//! table live here: counters and analog inputs are added and deleted
//! together with their frozen twins, freezes are scheduled and dispatched,
//! and [`Database::destroy`] tears everything down in a defined order.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use voltage_dnp3::{ClassMask, Database, DatabaseConfig, FreezeTime, PointConfig, PointFlags};
//! use voltage_dnp3::notify::NoopNotifier;
//! use voltage_dnp3::session::SystemSession;
//! use voltage_dnp3::timer::{fired_stream, TokioTimers};
//!
//! let (timers, fired) = TokioTimers::new();
//! let mut db = Database::new(
//!     DatabaseConfig::new().max_points_per_table(64),
//!     Arc::new(NoopNotifier),
//!     Arc::new(SystemSession),
//!     Box::new(timers),
//! );
//! db.add_counter(PointConfig::new(ClassMask::CLASS_2, PointFlags::Online), 0)?;
//! db.schedule_counter_freeze(0, FreezeTime::Zero, 900_000, false)?;
//!
//! let mut fired = Box::pin(fired_stream(fired));
//! while let Some(timer) = fired.next().await {
//!     db.on_freeze_timer(timer);
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::analog::{NumericMode, ValueCodec};
use crate::attributes::DeviceAttributes;
use crate::auth::{AuthUsers, CryptoProvider, PassThroughCrypto, DEFAULT_USER_NUMBER_OFFSET};
use crate::dataset::{Datasets, DescriptorElement, Prototypes};
use crate::error::{DbError, Result};
use crate::events::{UserEvent, UserEventQueues};
use crate::freeze::{self, Freezable, FreezeScheduler, FreezeTime};
use crate::kinds::{
    AnalogInput, AnalogOutput, BinaryInput, BinaryOutput, Counter, DoubleBitInput,
    FrozenAnalogInput, FrozenCounter, OctetString,
};
use crate::notify::{Notifier, UpdateNotifier};
use crate::point::{PointConfig, PointKind};
use crate::session::Session;
use crate::table::{DbContext, PointTable, TwinnedTable};
use crate::timer::{FiredTimer, FreezeTarget, TimerChannel};
use crate::types::{
    ClassMask, EventValue, ObjectGroup, PointFlags, StoragePolicy, MAX_OCTET_STRING_LEN,
};

/// Default points per table.
pub const DEFAULT_MAX_POINTS: usize = 1024;

/// Default device attribute sets.
pub const DEFAULT_MAX_ATTRIBUTE_SETS: usize = 8;

/// Default attributes per set.
pub const DEFAULT_MAX_ATTRIBUTES_PER_SET: usize = 64;

/// Default dataset prototypes.
pub const DEFAULT_MAX_PROTOTYPES: usize = 16;

/// Default dataset descriptors.
pub const DEFAULT_MAX_DATASETS: usize = 16;

/// Default elements per descriptor or prototype.
pub const DEFAULT_MAX_DESCRIPTOR_ELEMENTS: usize = 32;

/// Default values per dataset.
pub const DEFAULT_MAX_DATASET_VALUES: usize = 32;

/// Default events per user event queue.
pub const DEFAULT_USER_EVENT_CAPACITY: usize = 100;

/// Default security users.
pub const DEFAULT_MAX_AUTH_USERS: usize = 16;

/// Database sizing and policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Analog wire encoding
    pub numeric_mode: NumericMode,
    /// Storage of octet strings, attribute and dataset payloads
    pub string_storage: StoragePolicy,
    pub max_points_per_table: usize,
    pub max_attribute_sets: usize,
    pub max_attributes_per_set: usize,
    pub max_prototypes: usize,
    pub max_datasets: usize,
    pub max_descriptor_elements: usize,
    pub max_dataset_values: usize,
    pub user_event_capacity: usize,
    pub max_auth_users: usize,
    /// First number given to security users other than "Common"
    pub auth_user_number_offset: u16,
}

impl DatabaseConfig {
    /// Create a configuration with default sizing.
    pub const fn new() -> Self {
        Self {
            numeric_mode: NumericMode::BUILD,
            string_storage: StoragePolicy::Fixed {
                max_len: MAX_OCTET_STRING_LEN,
            },
            max_points_per_table: DEFAULT_MAX_POINTS,
            max_attribute_sets: DEFAULT_MAX_ATTRIBUTE_SETS,
            max_attributes_per_set: DEFAULT_MAX_ATTRIBUTES_PER_SET,
            max_prototypes: DEFAULT_MAX_PROTOTYPES,
            max_datasets: DEFAULT_MAX_DATASETS,
            max_descriptor_elements: DEFAULT_MAX_DESCRIPTOR_ELEMENTS,
            max_dataset_values: DEFAULT_MAX_DATASET_VALUES,
            user_event_capacity: DEFAULT_USER_EVENT_CAPACITY,
            max_auth_users: DEFAULT_MAX_AUTH_USERS,
            auth_user_number_offset: DEFAULT_USER_NUMBER_OFFSET,
        }
    }

    /// Set analog wire encoding.
    pub fn numeric_mode(mut self, mode: NumericMode) -> Self {
        self.numeric_mode = mode;
        self
    }

    /// Set variable-length storage policy.
    pub fn string_storage(mut self, policy: StoragePolicy) -> Self {
        self.string_storage = policy;
        self
    }

    /// Set points per table.
    pub fn max_points_per_table(mut self, max: usize) -> Self {
        self.max_points_per_table = max;
        self
    }

    /// Set device attribute set and per-set limits.
    pub fn attributes(mut self, sets: usize, per_set: usize) -> Self {
        self.max_attribute_sets = sets;
        self.max_attributes_per_set = per_set;
        self
    }

    /// Set dataset limits.
    pub fn datasets(mut self, prototypes: usize, datasets: usize, elements: usize, values: usize) -> Self {
        self.max_prototypes = prototypes;
        self.max_datasets = datasets;
        self.max_descriptor_elements = elements;
        self.max_dataset_values = values;
        self
    }

    /// Set events per user event queue.
    pub fn user_event_capacity(mut self, capacity: usize) -> Self {
        self.user_event_capacity = capacity;
        self
    }

    /// Set security user limit and numbering offset.
    pub fn auth_users(mut self, max: usize, number_offset: u16) -> Self {
        self.max_auth_users = max;
        self.auth_user_number_offset = number_offset;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The outstation process database.
pub struct Database {
    ctx: DbContext,
    binary_inputs: PointTable<BinaryInput>,
    double_bit_inputs: PointTable<DoubleBitInput>,
    binary_outputs: PointTable<BinaryOutput>,
    counters: PointTable<Counter>,
    frozen_counters: PointTable<FrozenCounter>,
    analog_inputs: PointTable<AnalogInput>,
    frozen_analog_inputs: PointTable<FrozenAnalogInput>,
    analog_outputs: PointTable<AnalogOutput>,
    octet_strings: PointTable<OctetString>,
    attributes: DeviceAttributes,
    prototypes: Prototypes,
    datasets: Datasets,
    auth_users: AuthUsers,
    user_events: UserEventQueues,
    crypto: Arc<dyn CryptoProvider>,
    scheduler: FreezeScheduler,
}

impl Database {
    /// Build an empty database.
    ///
    /// `notifier` receives every point add, update and delete; `session`
    /// supplies time and accepts output events; `timers` fires scheduled
    /// freezes, which the caller feeds back through [`on_freeze_timer`](Self::on_freeze_timer).
    pub fn new(
        config: DatabaseConfig,
        notifier: Arc<dyn UpdateNotifier>,
        session: Arc<dyn Session>,
        timers: Box<dyn TimerChannel>,
    ) -> Self {
        let ctx = DbContext::new(
            Notifier::new(notifier),
            session,
            config.string_storage,
            ValueCodec::new(config.numeric_mode),
        );
        let points = config.max_points_per_table;
        info!(mode = ?config.numeric_mode, points, "database created");

        Self {
            binary_inputs: PointTable::new(points, ctx.clone()),
            double_bit_inputs: PointTable::new(points, ctx.clone()),
            binary_outputs: PointTable::new(points, ctx.clone()),
            counters: PointTable::new(points, ctx.clone()),
            frozen_counters: PointTable::new(points, ctx.clone()),
            analog_inputs: PointTable::new(points, ctx.clone()),
            frozen_analog_inputs: PointTable::new(points, ctx.clone()),
            analog_outputs: PointTable::new(points, ctx.clone()),
            octet_strings: PointTable::new(points, ctx.clone()),
            attributes: DeviceAttributes::new(
                config.max_attribute_sets,
                config.max_attributes_per_set,
                ctx.clone(),
            ),
            prototypes: Prototypes::new(
                config.max_prototypes,
                config.max_descriptor_elements,
                ctx.clone(),
            ),
            datasets: Datasets::new(
                config.max_datasets,
                config.max_descriptor_elements,
                config.max_dataset_values,
                ctx.clone(),
            ),
            auth_users: AuthUsers::new(config.max_auth_users, config.auth_user_number_offset),
            user_events: UserEventQueues::new(config.user_event_capacity),
            crypto: Arc::new(PassThroughCrypto),
            scheduler: FreezeScheduler::new(timers),
            ctx,
        }
    }

    /// Replace the crypto provider used by secure authentication.
    pub fn set_crypto(&mut self, crypto: Arc<dyn CryptoProvider>) {
        self.crypto = crypto;
    }

    pub fn crypto(&self) -> &dyn CryptoProvider {
        self.crypto.as_ref()
    }

    /// Shared table context.
    pub fn context(&self) -> &DbContext {
        &self.ctx
    }

    // ============================================
    // Device state
    // ============================================

    /// Put the whole device into (or out of) local control mode.
    ///
    /// While set, every output control is rejected with `LocalModeRejected`.
    pub fn set_local_mode(&mut self, local: bool) {
        debug!(local, "device local mode");
        self.ctx.set_device_local_mode(local);
    }

    pub fn local_mode(&self) -> bool {
        self.ctx.device_local_mode()
    }

    // ============================================
    // Tables
    // ============================================

    pub fn binary_inputs(&self) -> &PointTable<BinaryInput> {
        &self.binary_inputs
    }

    pub fn binary_inputs_mut(&mut self) -> &mut PointTable<BinaryInput> {
        &mut self.binary_inputs
    }

    pub fn double_bit_inputs(&self) -> &PointTable<DoubleBitInput> {
        &self.double_bit_inputs
    }

    pub fn double_bit_inputs_mut(&mut self) -> &mut PointTable<DoubleBitInput> {
        &mut self.double_bit_inputs
    }

    pub fn binary_outputs(&self) -> &PointTable<BinaryOutput> {
        &self.binary_outputs
    }

    pub fn binary_outputs_mut(&mut self) -> &mut PointTable<BinaryOutput> {
        &mut self.binary_outputs
    }

    /// Counters. Add and delete through [`add_counter`](Self::add_counter)
    /// and [`delete_counter`](Self::delete_counter) to keep frozen twins aligned.
    pub fn counters(&self) -> &PointTable<Counter> {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> TwinnedTable<'_, Counter> {
        TwinnedTable::new(&mut self.counters)
    }

    pub fn frozen_counters(&self) -> &PointTable<FrozenCounter> {
        &self.frozen_counters
    }

    pub fn frozen_counters_mut(&mut self) -> TwinnedTable<'_, FrozenCounter> {
        TwinnedTable::new(&mut self.frozen_counters)
    }

    /// Analog inputs. Add and delete through [`add_analog_input`](Self::add_analog_input)
    /// and [`delete_analog_input`](Self::delete_analog_input).
    pub fn analog_inputs(&self) -> &PointTable<AnalogInput> {
        &self.analog_inputs
    }

    pub fn analog_inputs_mut(&mut self) -> TwinnedTable<'_, AnalogInput> {
        TwinnedTable::new(&mut self.analog_inputs)
    }

    pub fn frozen_analog_inputs(&self) -> &PointTable<FrozenAnalogInput> {
        &self.frozen_analog_inputs
    }

    pub fn frozen_analog_inputs_mut(&mut self) -> TwinnedTable<'_, FrozenAnalogInput> {
        TwinnedTable::new(&mut self.frozen_analog_inputs)
    }

    pub fn analog_outputs(&self) -> &PointTable<AnalogOutput> {
        &self.analog_outputs
    }

    pub fn analog_outputs_mut(&mut self) -> &mut PointTable<AnalogOutput> {
        &mut self.analog_outputs
    }

    pub fn octet_strings(&self) -> &PointTable<OctetString> {
        &self.octet_strings
    }

    pub fn octet_strings_mut(&mut self) -> &mut PointTable<OctetString> {
        &mut self.octet_strings
    }

    pub fn attributes(&self) -> &DeviceAttributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut DeviceAttributes {
        &mut self.attributes
    }

    pub fn prototypes(&self) -> &Prototypes {
        &self.prototypes
    }

    pub fn prototypes_mut(&mut self) -> &mut Prototypes {
        &mut self.prototypes
    }

    pub fn datasets(&self) -> &Datasets {
        &self.datasets
    }

    pub fn datasets_mut(&mut self) -> &mut Datasets {
        &mut self.datasets
    }

    pub fn auth_users(&self) -> &AuthUsers {
        &self.auth_users
    }

    pub fn auth_users_mut(&mut self) -> &mut AuthUsers {
        &mut self.auth_users
    }

    pub fn user_events(&self) -> &UserEventQueues {
        &self.user_events
    }

    pub fn user_events_mut(&mut self) -> &mut UserEventQueues {
        &mut self.user_events
    }

    /// Number of points in the static table of `group`.
    pub fn quantity(&self, group: ObjectGroup) -> Result<u16> {
        let quantity = match group {
            ObjectGroup::BinaryInput => self.binary_inputs.quantity(),
            ObjectGroup::DoubleBitInput => self.double_bit_inputs.quantity(),
            ObjectGroup::BinaryOutput => self.binary_outputs.quantity(),
            ObjectGroup::Counter => self.counters.quantity(),
            ObjectGroup::FrozenCounter => self.frozen_counters.quantity(),
            ObjectGroup::AnalogInput => self.analog_inputs.quantity(),
            ObjectGroup::FrozenAnalogInput => self.frozen_analog_inputs.quantity(),
            ObjectGroup::AnalogOutput => self.analog_outputs.quantity(),
            ObjectGroup::OctetString => self.octet_strings.quantity(),
            ObjectGroup::DeviceAttributes => self.attributes.quantity() as u16,
            ObjectGroup::DatasetPrototype => self.prototypes.quantity(),
            ObjectGroup::DatasetDescriptor => self.datasets.quantity() as u16,
            other => return Err(DbError::UnknownGroup(other.as_u8())),
        };
        Ok(quantity)
    }

    // ============================================
    // Points with frozen twins
    // ============================================

    /// Add a counter and its frozen counter at the same index.
    pub fn add_counter(&mut self, config: PointConfig, value: u32) -> Result<u16> {
        add_with_twin(&mut self.counters, &mut self.frozen_counters, config, value)
    }

    /// Delete the highest counter and its frozen counter.
    pub fn delete_counter(&mut self) -> bool {
        delete_with_twin(&mut self.scheduler, &mut self.counters, &mut self.frozen_counters)
    }

    /// Add an analog input and its frozen analog input at the same index.
    pub fn add_analog_input(&mut self, config: PointConfig, value: f64) -> Result<u16> {
        add_with_twin(&mut self.analog_inputs, &mut self.frozen_analog_inputs, config, value)
    }

    /// Delete the highest analog input and its frozen analog input.
    pub fn delete_analog_input(&mut self) -> bool {
        delete_with_twin(
            &mut self.scheduler,
            &mut self.analog_inputs,
            &mut self.frozen_analog_inputs,
        )
    }

    // ============================================
    // Freeze
    // ============================================

    /// Freeze one counter now.
    pub fn freeze_counter(&mut self, index: u16, clear_after: bool) -> bool {
        freeze::freeze(&mut self.counters, &mut self.frozen_counters, index, clear_after)
    }

    /// Freeze every counter now, returning how many were frozen.
    pub fn freeze_all_counters(&mut self, clear_after: bool) -> usize {
        (0..self.counters.quantity())
            .filter(|&i| self.freeze_counter(i, clear_after))
            .count()
    }

    /// Freeze one analog input now.
    pub fn freeze_analog_input(&mut self, index: u16, clear_after: bool) -> bool {
        freeze::freeze(
            &mut self.analog_inputs,
            &mut self.frozen_analog_inputs,
            index,
            clear_after,
        )
    }

    /// Schedule freezes of one counter.
    pub fn schedule_counter_freeze(
        &mut self,
        index: u16,
        time: FreezeTime,
        interval_ms: u64,
        clear_after: bool,
    ) -> Result<Option<Duration>> {
        self.scheduler.schedule(
            &mut self.counters,
            &mut self.frozen_counters,
            index,
            time,
            interval_ms,
            clear_after,
        )
    }

    /// Schedule freezes of one analog input.
    pub fn schedule_analog_freeze(
        &mut self,
        index: u16,
        time: FreezeTime,
        interval_ms: u64,
        clear_after: bool,
    ) -> Result<Option<Duration>> {
        self.scheduler.schedule(
            &mut self.analog_inputs,
            &mut self.frozen_analog_inputs,
            index,
            time,
            interval_ms,
            clear_after,
        )
    }

    pub fn cancel_counter_freeze(&mut self, index: u16) -> Result<()> {
        self.scheduler.cancel(&mut self.counters, index)
    }

    pub fn cancel_analog_freeze(&mut self, index: u16) -> Result<()> {
        self.scheduler.cancel(&mut self.analog_inputs, index)
    }

    /// Run the freeze of an expired timer. Stale timers are ignored.
    pub fn on_freeze_timer(&mut self, fired: FiredTimer) -> bool {
        match fired.target {
            FreezeTarget::Counter(index) => self.scheduler.on_timer(
                &mut self.counters,
                &mut self.frozen_counters,
                index,
                fired.id,
            ),
            FreezeTarget::AnalogInput(index) => self.scheduler.on_timer(
                &mut self.analog_inputs,
                &mut self.frozen_analog_inputs,
                index,
                fired.id,
            ),
        }
    }

    // ============================================
    // Datasets and user events
    // ============================================

    /// Write a dataset descriptor element, resolving prototype references.
    pub fn write_descriptor_element(
        &mut self,
        id: u16,
        position: usize,
        element: DescriptorElement,
    ) -> Result<()> {
        self.datasets
            .write_descriptor_element(id, position, element, &self.prototypes)
    }

    /// Queue a user-managed event.
    pub fn add_user_event(&mut self, event: UserEvent) -> Result<()> {
        self.user_events.add(event)
    }

    /// Queue a secure authentication error, replacing any one waiting.
    pub fn record_auth_error(&mut self, user: u16, association: u16, error_code: u8) -> Result<()> {
        let event = UserEvent::new(
            ObjectGroup::Authentication,
            0,
            ClassMask::CLASS_3,
            7,
            PointFlags::default(),
            EventValue::AuthError {
                user,
                association,
                error_code,
            },
            self.ctx.now(),
        );
        self.user_events.add(event)
    }

    // ============================================
    // Teardown
    // ============================================

    /// Cancel every freeze timer, then delete everything, highest index first.
    pub fn destroy(&mut self) {
        self.scheduler.cancel_all(&mut self.counters);
        self.scheduler.cancel_all(&mut self.analog_inputs);

        self.binary_inputs.destroy();
        self.double_bit_inputs.destroy();
        self.binary_outputs.destroy();
        while self.delete_counter() {}
        while self.delete_analog_input() {}
        self.analog_outputs.destroy();
        self.octet_strings.destroy();
        self.attributes.destroy();
        self.datasets.destroy();
        self.prototypes.destroy();
        self.user_events.clear();
        self.auth_users.clear();
        info!("database destroyed");
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("binary_inputs", &self.binary_inputs.quantity())
            .field("double_bit_inputs", &self.double_bit_inputs.quantity())
            .field("binary_outputs", &self.binary_outputs.quantity())
            .field("counters", &self.counters.quantity())
            .field("analog_inputs", &self.analog_inputs.quantity())
            .field("analog_outputs", &self.analog_outputs.quantity())
            .field("octet_strings", &self.octet_strings.quantity())
            .field("local_mode", &self.local_mode())
            .finish_non_exhaustive()
    }
}

fn add_with_twin<T: Freezable>(
    live: &mut PointTable<T>,
    frozen: &mut PointTable<T::Frozen>,
    config: PointConfig,
    value: T::Value,
) -> Result<u16> {
    if live.quantity() as usize >= live.capacity() {
        return Err(DbError::capacity(T::LABEL, live.capacity()));
    }
    if frozen.quantity() as usize >= frozen.capacity() {
        return Err(DbError::capacity(<T::Frozen as PointKind>::LABEL, frozen.capacity()));
    }
    let index = live.add(config, value.clone())?;
    frozen.add(config, value)?;
    Ok(index)
}

fn delete_with_twin<T: Freezable>(
    scheduler: &mut FreezeScheduler,
    live: &mut PointTable<T>,
    frozen: &mut PointTable<T::Frozen>,
) -> bool {
    let Some(last) = live.quantity().checked_sub(1) else {
        return false;
    };
    let _ = scheduler.cancel(live, last);
    frozen.delete_last();
    live.delete_last()
}
