use std::ffi::OsString;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::{MigrafixError, Result};

/// A build toolchain installation (a JDK home, for example).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub name: String,
    pub home: PathBuf,
}

impl Toolchain {
    pub fn new(name: impl Into<String>, home: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            home: home.into(),
        }
    }

    fn bin_dir(&self) -> PathBuf {
        self.home.join("bin")
    }

    /// Fails unless the toolchain home and its `bin` directory exist.
    pub fn ensure_available(&self) -> Result<()> {
        if self.home.is_dir() && self.bin_dir().is_dir() {
            Ok(())
        } else {
            Err(MigrafixError::ToolchainUnavailable {
                toolchain: self.name.clone(),
                home: self.home.clone(),
            })
        }
    }

    /// Environment overlay activating this toolchain on top of `inherited_path`.
    pub fn env_overlay(&self, inherited_path: Option<OsString>) -> Result<IndexMap<String, String>> {
        let mut paths = vec![self.bin_dir()];
        if let Some(inherited) = inherited_path {
            paths.extend(std::env::split_paths(&inherited));
        }
        let path = std::env::join_paths(paths)
            .map_err(|e| MigrafixError::Config(format!("Invalid PATH for toolchain '{}': {e}", self.name)))?;

        let mut overlay = IndexMap::new();
        overlay.insert("JAVA_HOME".to_string(), path_string(&self.home));
        overlay.insert("PATH".to_string(), path.to_string_lossy().into_owned());
        Ok(overlay)
    }

    /// Checks availability and builds the overlay against the current `PATH`.
    pub fn activate(&self) -> Result<IndexMap<String, String>> {
        self.ensure_available()?;
        self.env_overlay(std::env::var_os("PATH"))
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
