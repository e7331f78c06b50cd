//! # Session
//!
//! Top-level recording state machine.
//!
//! ```text
//! Idle -> Preparing -> Scheduled -> Recording -> Stopping -> Idle
//! ```
//!
//! ## Example
//!
//! ```ignore
//! let devices = DeviceFactory::new(backend).open_all(&serials)?;
//! let mut session = RecordingSession::new(blueprint, host);
//! session.prepare(devices)?;
//! let handle = session.start()?;
//! let report = handle.wait()?;
//! ```

mod error;
mod estimate;
mod session;
mod state;

pub use error::{Result, SessionError};
pub use estimate::{gib, DeviceEstimate, DiskEstimate};
pub use session::{RecordingHandle, RecordingSession};
pub use state::SessionState;
