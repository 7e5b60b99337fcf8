//! Strategy documents stored as `<name>.ini` files in one directory.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::error::QuantgateError;
use crate::domain::strategy::{Strategy, build_strategy};
use crate::ports::strategy_port::{DeploymentStore, StrategyLoader};

pub struct StrategyFileStore {
    strategies_dir: PathBuf,
}

impl StrategyFileStore {
    pub fn new(strategies_dir: PathBuf) -> Self {
        Self { strategies_dir }
    }

    pub fn strategy_path(&self, name: &str) -> PathBuf {
        self.strategies_dir.join(format!("{}.ini", name))
    }
}

impl StrategyLoader for StrategyFileStore {
    fn load(&self, name: &str, code: &str) -> Result<Arc<dyn Strategy>, QuantgateError> {
        let config =
            FileConfigAdapter::from_string(code).map_err(|reason| QuantgateError::ConfigParse {
                file: format!("{}.ini", name),
                reason,
            })?;
        build_strategy(name, &config)
    }
}

impl DeploymentStore for StrategyFileStore {
    fn snapshot(&self, name: &str) -> Result<Option<Vec<u8>>, QuantgateError> {
        match fs::read(self.strategy_path(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn restore(&self, name: &str, snapshot: Option<&[u8]>) -> Result<(), QuantgateError> {
        let path = self.strategy_path(name);
        match snapshot {
            Some(bytes) => {
                fs::create_dir_all(&self.strategies_dir)?;
                let tmp_path = path.with_extension("ini.tmp");
                fs::write(&tmp_path, bytes)?;
                fs::rename(&tmp_path, &path)?;
            }
            None => match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        debug!(strategy = name, deployed = snapshot.is_some(), "deployment restored");
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, QuantgateError> {
        let entries = match fs::read_dir(&self.strategies_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            if let Some(stem) = name.to_string_lossy().strip_suffix(".ini") {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
