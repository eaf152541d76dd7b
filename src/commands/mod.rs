pub mod check;
pub mod levels;
pub mod list;
pub mod plan;
pub mod report;
pub mod run;

use crate::Context;
use crate::catalog::{self, EntryRegistry};
use crate::paths::{self, StateLayout};
use crate::schema::LoadedConfig;
use anyhow::Result;
use taskflow::Engine;

/// Config, catalog and state layout shared by most commands
pub struct Session {
    pub loaded: LoadedConfig,
    pub engine: Engine,
    pub layout: StateLayout,
}

impl Session {
    /// Load config and build the engine; catalog problems are fatal
    pub fn open(ctx: &Context) -> Result<Self> {
        let loaded = load_config(ctx)?;
        let engine = catalog::build_engine(
            &loaded.config.tasks,
            &EntryRegistry::with_builtins(),
            loaded.config.execution.default_timeout_secs,
        )?;
        let layout = StateLayout::resolve()?;
        Ok(Self {
            loaded,
            engine,
            layout,
        })
    }
}

/// Load the config file named on the command line or the default one
pub fn load_config(ctx: &Context) -> Result<LoadedConfig> {
    let path = paths::config_file(ctx.config.as_deref())?;
    LoadedConfig::load(&path)
}
