//! # Sync Engine
//!
//! Brings a device set onto a common trigger timeline before recording.
//!
//! Steps, in session order:
//! 1. `SyncRoleMonitor`: wait until every device follows the grandmaster
//! 2. `ClockOffsetEstimator`: bracket-latch every device clock against the host
//! 3. `ScheduleCoordinator`: program one shared start instant into each
//!    device's deferred trigger scheduler
//!
//! ## Example
//!
//! ```ignore
//! use sync_engine::{trigger_rates, ClockOffsetEstimator, ScheduleCoordinator, SyncRoleMonitor};
//!
//! SyncRoleMonitor::from_config(&bp.session)?.wait_for_role(&mut devices)?;
//! let offsets = ClockOffsetEstimator::new(host.clone()).estimate(&mut devices)?;
//! let outcome = ScheduleCoordinator::new(host).schedule(
//!     &mut devices,
//!     &offsets,
//!     bp.session.start_delay_s,
//!     &trigger_rates(&bp.devices),
//! )?;
//! ```

mod error;
mod offset;
mod role;
mod schedule;

pub use error::{Result, SyncError};
pub use offset::ClockOffsetEstimator;
pub use role::{RoleCensus, SyncRoleMonitor};
pub use schedule::{cancel_all, trigger_rates, ScheduleCoordinator, ScheduleOutcome};
