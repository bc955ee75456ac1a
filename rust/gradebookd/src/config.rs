use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Workspace opened at start-up. Without one the client must send
    /// `workspace.select` first.
    pub workspace: Option<PathBuf>,
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            log_level: "info".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from defaults, `gradebookd.toml` and `GRADEBOOK_*`
    /// environment variables, in increasing priority.
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&DaemonConfig::default())?)
            .add_source(config::File::with_name("gradebookd").required(false))
            .add_source(config::Environment::with_prefix("GRADEBOOK").prefix_separator("_"));

        let cfg: DaemonConfig = builder.build()?.try_deserialize()?;
        Ok(cfg)
    }

    pub fn log_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}
