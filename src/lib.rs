//! # Satcore Flight Software
//!
//! Cyclic flight software core for a small satellite: a bit-packed state
//! bus shared by fixed-offset control tasks, a mission supervisor that
//! arbitrates operating modes, and compact downlink/uplink framing derived
//! from the bus itself.
//!
//! ## Features
//!
//! - **Bit codec**: little-endian bit streams with independent read/write cursors
//! - **State field bus**: named, typed, lock-protected fields with compact serializers
//! - **Cyclic scheduler**: fixed offsets, overrun accounting, bounded waits
//! - **Mission supervisor**: startup, detumble, pointing and hold modes with persisted flags
//! - **Telemetry**: 70-byte downlink packets and indexed uplink commands
//!
//! ## Quick Start
//!
//! ```rust
//! use satcore::{FlightConfig, FlightExecutive, MemoryStore, SimulatedClock};
//!
//! let config = FlightConfig::default();
//! let (mut executive, _links) =
//!     FlightExecutive::new(&config, Box::new(MemoryStore::new()), SimulatedClock::new())
//!         .expect("registration pass");
//!
//! executive.run(3);
//! assert_eq!(executive.scheduler().cycle_no(), 3);
//! ```
//!
//! ## Architecture
//!
//! - [`bitstream`] - bit-level codec
//! - [`serializer`] - compact value representations
//! - [`bus`] / [`field`] - the state field registry and its handles
//! - [`scheduler`] - the control cycle
//! - [`supervisor`] - mission mode state machine
//! - [`tasks`] - device monitors and the cycle clock
//! - [`telemetry`] / [`protocol`] - downlink frames and uplink packets
//! - [`console`] - JSON debug console
//! - [`executive`] - wires everything into one runnable schedule

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::new_without_default)]

pub mod bitstream;
pub mod bus;
pub mod clock;
pub mod config;
pub mod console;
pub mod error;
pub mod executive;
pub mod fault;
pub mod field;
pub mod logging;
pub mod mission;
pub mod persistence;
pub mod protocol;
pub mod scheduler;
pub mod serializer;
pub mod supervisor;
pub mod tasks;
pub mod telemetry;

// Re-export main public types for convenience
pub use bitstream::{BitStream, SeekFrom};
pub use bus::StateFieldBus;
pub use clock::{Clock, SimulatedClock, SystemClock};
pub use config::FlightConfig;
pub use error::{ConfigError, FlightError};
pub use executive::{DeviceLinks, FlightExecutive};
pub use field::{Access, ReadableField, Telemetry, WritableField};
pub use mission::{MissionMode, MissionStatus};
pub use persistence::{FileStore, MemoryStore, PersistentStore};
pub use scheduler::{ControlTask, CycleProfile, CyclicScheduler, SchedulerBuilder};
pub use supervisor::{MissionContext, MissionSupervisor};
