//! Device capability surface
//!
//! A `DeviceClock` is an opened camera with its own free-running clock and
//! a hardware action scheduler. Vendor property names are resolved once
//! when the device is opened; nothing here is looked up by string at
//! runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{ContractError, DeviceId, FrameRecord};

/// Clock-sync role a device reports on the time-sync protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRole {
    #[default]
    Unknown,
    Leader,
    Follower,
}

impl SyncRole {
    /// Parse a vendor status string (`"Slave"`, `"Master"`, ...)
    pub fn from_status(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "slave" | "follower" => Self::Follower,
            "master" | "leader" | "grandmaster" => Self::Leader,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for SyncRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Leader => "leader",
            Self::Follower => "follower",
        };
        f.write_str(s)
    }
}

/// Trigger arming steps applied before a schedule is programmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerStep {
    /// Route the trigger to frame start
    Selector,
    /// Use the scheduled action as trigger source
    Source,
    /// Enable triggered mode
    Mode,
}

impl TriggerStep {
    pub const ALL: [TriggerStep; 3] = [Self::Selector, Self::Source, Self::Mode];
}

impl fmt::Display for TriggerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Selector => "trigger_selector",
            Self::Source => "trigger_source",
            Self::Mode => "trigger_mode",
        };
        f.write_str(s)
    }
}

/// Consumer side of a device's frame queue
pub trait FrameSource: Send {
    /// Non-blocking pop of the oldest queued frame
    fn try_pop(&mut self) -> Option<FrameRecord>;

    /// True once the producer stopped ingesting because the queue hit its cap
    fn is_paused(&self) -> bool;

    /// Frames currently queued
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the queue; later producer pushes are rejected
    fn close(&mut self);
}

/// Opened camera device
pub trait DeviceClock: Send {
    fn device_id(&self) -> &DeviceId;

    /// Current clock-sync role
    fn sync_role(&mut self) -> Result<SyncRole, ContractError>;

    /// Capture the current device clock into the latch register
    fn latch_clock(&mut self) -> Result<(), ContractError>;

    /// Read the value captured by the last `latch_clock`
    fn read_latched_ns(&mut self) -> Result<i64, ContractError>;

    /// Apply one trigger arming step
    fn arm_trigger(&mut self, step: TriggerStep) -> Result<(), ContractError>;

    /// Cancel any previously armed schedule
    fn cancel_schedule(&mut self) -> Result<(), ContractError>;

    /// Stage a schedule: first trigger at `target_ns` (device clock) and
    /// then every `interval_us` microseconds
    fn program_schedule(&mut self, target_ns: i64, interval_us: u32)
        -> Result<(), ContractError>;

    /// Commit the staged schedule to the hardware
    fn commit_schedule(&mut self) -> Result<(), ContractError>;

    /// Allocate the stream buffer pool and return the consumer side of the
    /// frame queue. Acquisition does not start yet.
    fn open_stream(&mut self, capacity: usize) -> Result<Box<dyn FrameSource>, ContractError>;

    /// Start acquisition; frames arrive only once the schedule fires
    fn start_acquisition(&mut self) -> Result<(), ContractError>;

    fn stop_acquisition(&mut self) -> Result<(), ContractError>;

    /// Release the device handle
    fn close(&mut self) -> Result<(), ContractError>;
}

/// Host realtime clock (nanoseconds since the Unix epoch)
pub trait HostClock: Send + Sync {
    fn now_ns(&self) -> i64;
}

/// `HostClock` backed by the system realtime clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHostClock;

impl HostClock for SystemHostClock {
    fn now_ns(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or_default()
    }
}
