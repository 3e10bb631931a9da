//! Package engine boundary.
//!
//! Dependency resolution and package installation are owned by an external
//! engine; the pipeline only needs the narrow surface below.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub mod dnf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    pub name: String,
    pub arch: String,
}

impl PackageRef {
    pub fn new(name: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arch: arch.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// `list_available` answers catalog queries.
    Catalog,
    /// `list_installed` reports installed packages with their file lists.
    InstalledList,
    /// `install` populates the install root.
    Install,
}

pub const REQUIRED_CAPABILITIES: &[Capability] = &[
    Capability::Catalog,
    Capability::InstalledList,
    Capability::Install,
];

pub trait PackageCatalog {
    /// Packages matching `pattern` that are available but not yet installed.
    fn list_available(&self, pattern: &str) -> Result<Vec<PackageRef>>;
}

pub trait PackageEngine: PackageCatalog {
    fn install_root(&self) -> &Path;
    fn set_install_root(&mut self, root: PathBuf);
    fn set_skip_broken(&mut self, skip: bool);
    fn list_installed(&self) -> Result<Vec<InstalledPackage>>;
    fn install(&mut self) -> Result<()>;

    fn capabilities(&self) -> &[Capability] {
        REQUIRED_CAPABILITIES
    }

    /// Host executables this engine shells out to.
    fn required_tools(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Check the engine handle can serve a build before anything is installed.
pub fn validate<E: PackageEngine + ?Sized>(engine: &E) -> Result<()> {
    let caps = engine.capabilities();
    let missing: Vec<String> = REQUIRED_CAPABILITIES
        .iter()
        .filter(|c| !caps.contains(*c))
        .map(|c| format!("{c:?}"))
        .collect();
    if !missing.is_empty() {
        return Err(Error::precondition(format!(
            "package engine lacks required capabilities: {}",
            missing.join(", ")
        )));
    }

    let root = engine.install_root();
    if root.as_os_str().is_empty() || !root.is_absolute() {
        return Err(Error::precondition(format!(
            "package engine install root '{}' is not an absolute path",
            root.display()
        )));
    }
    Ok(())
}
