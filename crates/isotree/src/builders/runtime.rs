use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::builders::RuntimeBuilder;
use crate::config::Compression;
use crate::engine::PackageEngine;
use crate::error::{Error, Result};
use crate::fsutil;
use crate::log::BuildLog;
use crate::process;

pub const RUNTIME_IMAGE_NAME: &str = "squashfs.img";
pub const POSTINSTALL_DIR: &str = "postinstall";
pub const CLEANUP_LIST: &str = "cleanup.list";

/// Removed when the template directory has no cleanup list.
const DEFAULT_CLEANUP: &[&str] = &["var/cache/dnf/*", "var/log/dnf.log", "var/log/dnf.rpm.log"];

pub struct SquashfsRuntimeBuilder {
    root: PathBuf,
    sharedir: PathBuf,
    compression: Compression,
    log: Arc<BuildLog>,
    search_path: String,
}

impl SquashfsRuntimeBuilder {
    pub fn new(
        root: &Path,
        sharedir: &Path,
        compression: Compression,
        log: Arc<BuildLog>,
        search_path: impl Into<String>,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            sharedir: sharedir.to_path_buf(),
            compression,
            log,
            search_path: search_path.into(),
        }
    }

    fn cleanup_entries(&self) -> Result<Vec<String>> {
        let list = self.sharedir.join(CLEANUP_LIST);
        if !list.is_file() {
            return Ok(DEFAULT_CLEANUP.iter().map(|s| s.to_string()).collect());
        }
        let raw = fs::read_to_string(&list)
            .map_err(|e| Error::msg(format!("failed to read {}: {e}", list.display())))?;
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| l.trim_start_matches('/').to_string())
            .collect())
    }

    fn squashfs_command(&self, image: &Path) -> Command {
        let mut cmd = Command::new("mksquashfs");
        cmd.env("PATH", &self.search_path)
            .arg(&self.root)
            .arg(image)
            .args(["-noappend", "-no-progress", "-comp", self.compression.kind.as_str()]);
        if let Some(level) = squashfs_level(&self.compression) {
            cmd.arg("-Xcompression-level").arg(level.to_string());
        }
        cmd
    }
}

fn squashfs_level(c: &Compression) -> Option<u32> {
    match c.kind.as_str() {
        "gzip" | "zstd" => Some(c.speed.max(1)),
        _ => None,
    }
}

impl RuntimeBuilder for SquashfsRuntimeBuilder {
    fn install(&mut self, engine: &mut dyn PackageEngine) -> Result<()> {
        fsutil::ensure_dir(&self.root)?;
        engine.install()
    }

    fn postinstall(&mut self) -> Result<()> {
        let overlay = self.sharedir.join(POSTINSTALL_DIR);
        if !overlay.is_dir() {
            self.log
                .debug(format!("no post-install overlay at {}", overlay.display()));
            return Ok(());
        }
        self.log.debug(format!(
            "applying post-install overlay {} -> {}",
            overlay.display(),
            self.root.display()
        ));
        fsutil::copy_tree(&overlay, &self.root)
    }

    fn clean(&mut self) -> Result<()> {
        let mut removed = 0usize;
        for entry in self.cleanup_entries()? {
            let (rel, children_only) = match entry.strip_suffix("/*") {
                Some(dir) => (dir.to_string(), true),
                None => (entry.clone(), false),
            };
            fsutil::validate_rel_path(&rel)?;
            let target = self.root.join(&rel);
            if children_only {
                let Ok(rd) = fs::read_dir(&target) else {
                    continue;
                };
                for child in rd {
                    let child = child.map_err(|e| {
                        Error::msg(format!("failed to list {}: {e}", target.display()))
                    })?;
                    if fsutil::remove_path_if_exists(&child.path())? {
                        removed += 1;
                    }
                }
            } else if fsutil::remove_path_if_exists(&target)? {
                removed += 1;
            }
        }
        self.log.debug(format!("cleanup removed {removed} paths"));
        Ok(())
    }

    fn create_runtime(&mut self, dir: &Path) -> Result<PathBuf> {
        fsutil::ensure_dir(dir)?;
        let image = dir.join(RUNTIME_IMAGE_NAME);
        fsutil::remove_path_if_exists(&image)?;
        process::run_logged(&self.log, self.squashfs_command(&image))?;
        Ok(image)
    }
}
