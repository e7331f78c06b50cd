//! # Validation
//!
//! Offline inspection of finished recordings.
//!
//! - `discover`: group a session directory's files by device
//! - `checks`: per-device format checks V1..V8
//! - `sync`: cross-device timestamp spread per frame number
//! - `dump`: header listing of one raw file
//! - `plan`: constant-rate frame plan and payload streaming for re-encoding

pub mod checks;
pub mod discover;
pub mod dump;
pub mod error;
pub mod plan;
pub mod sync;

pub use checks::{
    validate_device, validate_session, CheckId, CheckResult, CheckStatus, DeviceValidation,
    SessionValidation,
};
pub use discover::{discover, DeviceFiles, SessionFiles};
pub use dump::{dump_raw_file, RawDump};
pub use error::{Result, ValidationError};
pub use plan::{build_frame_plan, encode_frames, EncodeJob, FrameLocation, PlanNote, PlanStats};
pub use sync::{sync_check, sync_check_logs, SyncCheckReport, SyncViolation, DEFAULT_THRESHOLD_MS};
