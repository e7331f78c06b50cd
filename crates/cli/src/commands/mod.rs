//! Command implementations.

mod dump;
mod encode;
mod info;
mod record;
mod sync_check;
mod validate;

use std::path::Path;
use std::process::ExitCode;

use config_loader::{ConfigLoader, SessionOverrides};
use contracts::SessionBlueprint;
use tracing::info;

use crate::error::{CliError, Result};

pub use dump::run_dump;
pub use encode::run_encode;
pub use info::run_info;
pub use record::run_record;
pub use sync_check::run_sync_check;
pub use validate::run_validate;

/// Outcome of a command that ran to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    const EXIT_ERROR: u8 = 2;

    pub fn from_passed(passed: bool) -> Self {
        if passed {
            Self::Pass
        } else {
            Self::Fail
        }
    }

    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Pass => ExitCode::SUCCESS,
            Self::Fail => ExitCode::FAILURE,
        }
    }

    pub fn exit_error() -> ExitCode {
        ExitCode::from(Self::EXIT_ERROR)
    }
}

/// Load, override and validate a session configuration
pub(crate) fn load_blueprint(path: &Path, overrides: &SessionOverrides) -> Result<SessionBlueprint> {
    info!(config = %path.display(), "loading configuration");
    if !path.exists() {
        return Err(CliError::config_not_found(path));
    }
    let blueprint = ConfigLoader::load_from_path(path)?;
    if overrides.is_empty() {
        return Ok(blueprint);
    }
    info!(?overrides, "applying command-line overrides");
    Ok(ConfigLoader::apply_overrides(blueprint, overrides)?)
}
