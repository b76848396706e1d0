//! crates/ar_pipeline/src/load.rs
//! Config first, then data: weights and epsilon are validated before a single
//! line is read.

use tracing::{debug, info_span};

use ar_io::loader::{self, InputPaths, LoadedContext};

use crate::EngineError;

pub fn load_checked(paths: &InputPaths) -> Result<LoadedContext, EngineError> {
    let _span = info_span!("load").entered();

    let config = loader::load_config_or_default(paths.config.as_deref())?;
    config.validate()?;

    let loaded = loader::load_data(paths, config)?;
    debug!(
        lines = loaded.lines.len(),
        sources = loaded.targets.len(),
        "inputs loaded"
    );
    Ok(loaded)
}
