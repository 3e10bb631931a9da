//! Runtime and tree builders.
//!
//! The orchestrator only sequences these; what they do to the install root
//! and output tree is driven by the files under the template directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::context::BuildContext;
use crate::engine::PackageEngine;
use crate::error::Result;
use crate::log::BuildLog;
use crate::metadata::Sections;

pub mod runtime;
pub mod tree;

pub use runtime::SquashfsRuntimeBuilder;
pub use tree::DracutTreeBuilder;

pub trait RuntimeBuilder {
    /// Install the runtime package set through the engine.
    fn install(&mut self, engine: &mut dyn PackageEngine) -> Result<()>;
    fn postinstall(&mut self) -> Result<()>;
    /// Remove build-only files that must not ship in the runtime image.
    fn clean(&mut self) -> Result<()>;
    /// Write the compressed runtime image under `dir` and return its path.
    fn create_runtime(&mut self, dir: &Path) -> Result<PathBuf>;
}

pub trait TreeBuilder {
    fn rebuild_initrds(&mut self, args: &[&str]) -> Result<()>;
    /// Append the contents of `runtime_dir` to every initrd.
    fn initrd_append(&mut self, runtime_dir: &Path) -> Result<()>;
    /// Populate the output tree and boot images.
    fn build(&mut self) -> Result<()>;
    fn treeinfo_data(&self) -> &Sections;
}

/// Constructs the builders for one run.
pub trait BuilderFactory {
    fn runtime_builder(&self, ctx: &BuildContext, cfg: &Config) -> Result<Box<dyn RuntimeBuilder>>;

    /// `root` is the backup copy of the install root, not the cleaned original.
    fn tree_builder(
        &self,
        ctx: &BuildContext,
        cfg: &Config,
        root: &Path,
        output_dir: &Path,
    ) -> Result<Box<dyn TreeBuilder>>;

    fn required_tools(&self, cfg: &Config) -> Vec<String>;
}

/// Squashfs runtime image plus dracut-rebuilt initrds.
pub struct DefaultBuilders {
    log: Arc<BuildLog>,
    search_path: String,
}

impl DefaultBuilders {
    pub fn new(log: Arc<BuildLog>, search_path: impl Into<String>) -> Self {
        Self {
            log,
            search_path: search_path.into(),
        }
    }
}

impl BuilderFactory for DefaultBuilders {
    fn runtime_builder(&self, ctx: &BuildContext, cfg: &Config) -> Result<Box<dyn RuntimeBuilder>> {
        Ok(Box::new(SquashfsRuntimeBuilder::new(
            ctx.install_root(),
            cfg.sharedir(),
            cfg.compression().clone(),
            Arc::clone(&self.log),
            self.search_path.clone(),
        )))
    }

    fn tree_builder(
        &self,
        ctx: &BuildContext,
        cfg: &Config,
        root: &Path,
        output_dir: &Path,
    ) -> Result<Box<dyn TreeBuilder>> {
        Ok(Box::new(DracutTreeBuilder::new(
            ctx.arch().clone(),
            root,
            output_dir,
            cfg.ramdisk_template(),
            cfg.compression().clone(),
            Arc::clone(&self.log),
            self.search_path.clone(),
        )))
    }

    fn required_tools(&self, cfg: &Config) -> Vec<String> {
        vec![
            "mksquashfs".into(),
            "chroot".into(),
            "cpio".into(),
            cfg.compression().kind.clone(),
        ]
    }
}
