use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::arch::ArchitectureInfo;

/// Identity of the product being composed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductInfo {
    pub name: String,
    pub version: String,
    pub release: String,
    pub variant: String,
    pub bug_url: String,
    pub is_beta: bool,
    /// Tree-relative directory holding the package payload; empty for a boot-only tree.
    pub package_dir: String,
}

impl ProductInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        release: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            release: release.into(),
            variant: String::new(),
            bug_url: String::new(),
            is_beta: false,
            package_dir: String::new(),
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }

    pub fn with_bug_url(mut self, bug_url: impl Into<String>) -> Self {
        self.bug_url = bug_url.into();
        self
    }

    pub fn with_package_dir(mut self, package_dir: impl Into<String>) -> Self {
        self.package_dir = package_dir.into();
        self
    }

    pub fn beta(mut self, is_beta: bool) -> Self {
        self.is_beta = is_beta;
        self
    }
}

/// Everything a collaborator may read about the run in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildContext {
    product: ProductInfo,
    arch: ArchitectureInfo,
    work_dir: PathBuf,
    log_dir: PathBuf,
    output_dir: PathBuf,
    install_root: PathBuf,
}

impl BuildContext {
    pub fn new(
        product: ProductInfo,
        arch: ArchitectureInfo,
        work_dir: PathBuf,
        log_dir: PathBuf,
        output_dir: PathBuf,
        install_root: PathBuf,
    ) -> Self {
        Self {
            product,
            arch,
            work_dir,
            log_dir,
            output_dir,
            install_root,
        }
    }

    pub fn product(&self) -> &ProductInfo {
        &self.product
    }

    pub fn arch(&self) -> &ArchitectureInfo {
        &self.arch
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }
}
