//! # voltage_dnp3
//!
//! DNP3 outstation process database for Rust.
//!
//! This crate holds the data an outstation reports and controls: typed
//! point tables, frozen counters and analogs, device attributes, datasets,
//! secure authentication users and user-managed event queues. It sits
//! between a protocol session (which parses requests and builds responses)
//! and the application (which supplies measurements and acts on controls).
//!
//! ## Features
//!
//! - **Typed tables**: One generic table per point type, indices dense from 0
//! - **Change tracking**: Lifecycle notifications for every add, update and delete
//! - **Controls**: CROB and analog output validation with test-failure injection
//! - **Freezes**: Immediate and scheduled freezes driven by a pluggable timer channel
//! - **Datasets**: Prototypes, descriptors and present values (g85/g86/g87)
//! - **Event queues**: Bounded per-group queues with sent/acknowledged tracking
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voltage_dnp3::{ClassMask, Database, DatabaseConfig, PointConfig, PointFlags};
//! use voltage_dnp3::notify::NoopNotifier;
//! use voltage_dnp3::session::SystemSession;
//! use voltage_dnp3::timer::TokioTimers;
//!
//! #[tokio::main]
//! async fn main() -> voltage_dnp3::Result<()> {
//!     let (timers, fired) = TokioTimers::new();
//!     let mut db = Database::new(
//!         DatabaseConfig::new(),
//!         Arc::new(NoopNotifier),
//!         Arc::new(SystemSession),
//!         Box::new(timers),
//!     );
//!
//!     let config = PointConfig::new(ClassMask::CLASS_1, PointFlags::Online);
//!     let index = db.add_analog_input(config, 0.0)?;
//!     db.analog_inputs_mut().write(index, 49.98)?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Index Packing
//!
//! Two-level objects (device attributes, dataset values) report changes
//! with a packed 16-bit index:
//!
//! ```text
//! +----------------+----------------+
//! | outer (8 bits) | inner (8 bits) |
//! +----------------+----------------+
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod analog;
pub mod attributes;
pub mod auth;
pub mod codec;
pub mod control;
pub mod database;
pub mod dataset;
pub mod error;
pub mod events;
pub mod freeze;
pub mod kinds;
pub mod notify;
pub mod point;
pub mod session;
pub mod table;
pub mod timer;
pub mod types;

mod sparse;

// Re-export main types
pub use analog::{NumericMode, ValueCodec};
pub use codec::EventRecordCodec;
pub use control::{ControlStatus, Crob, OpType};
pub use database::{Database, DatabaseConfig};
pub use error::{CodecError, DbError, Result};
pub use events::{UserEvent, UserEventQueues};
pub use freeze::FreezeTime;
pub use notify::{PointUpdate, UpdateKind, UpdateNotifier};
pub use point::{EventMode, Point, PointConfig, PointKind, PointSnapshot};
pub use session::{ChangeEvent, Session};
pub use table::{DbContext, PointTable, TwinnedTable};
pub use types::*;
