use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fsutil;

pub const WORK_DIR_PREFIX: &str = "isotree.work.";
pub const OUTPUT_DIR_PREFIX: &str = "isotree.out.";
pub const ENGINE_DIR_PREFIX: &str = "isotree.engine.";

/// Directories of one run. The log directory always lives under the work dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub work_dir: PathBuf,
    pub log_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl WorkspacePaths {
    pub fn pkglists_dir(&self) -> PathBuf {
        self.work_dir.join("pkglists")
    }

    pub fn backup_root(&self) -> PathBuf {
        self.work_dir.join("installroot")
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.work_dir.join("runtime")
    }
}

/// Create (or reuse) the work, log and output directories. Missing paths are
/// replaced by fresh temporary directories that outlive the process.
/// Existing directories and their contents are left untouched.
pub fn init_dirs(work_dir: Option<&Path>, output_dir: Option<&Path>) -> Result<WorkspacePaths> {
    let work_dir = match work_dir {
        Some(p) => prepare(p, "work dir")?,
        None => fresh_temp_dir(WORK_DIR_PREFIX)?,
    };
    let log_dir = prepare(&work_dir.join("log"), "log dir")?;
    let output_dir = match output_dir {
        Some(p) => prepare(p, "output dir")?,
        None => fresh_temp_dir(OUTPUT_DIR_PREFIX)?,
    };
    Ok(WorkspacePaths {
        work_dir,
        log_dir,
        output_dir,
    })
}

fn prepare(p: &Path, what: &str) -> Result<PathBuf> {
    if p.as_os_str().is_empty() {
        return Err(Error::msg(format!("{what} path is empty")));
    }
    if p.exists() && !p.is_dir() {
        return Err(Error::msg(format!(
            "{what} {} exists and is not a directory",
            p.display()
        )));
    }
    fsutil::ensure_dir(p)?;
    Ok(p.to_path_buf())
}

/// Root handed to the package engine. Without an explicit path this is a
/// temporary directory that is removed on drop unless [`EngineRoot::keep`]
/// is called.
pub struct EngineRoot {
    path: PathBuf,
    temp: Option<tempfile::TempDir>,
}

impl EngineRoot {
    pub fn new(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit {
            let path = std::path::absolute(p)
                .map_err(|e| Error::msg(format!("failed to resolve {}: {e}", p.display())))?;
            return Ok(Self { path, temp: None });
        }
        let dir = tempfile::Builder::new()
            .prefix(ENGINE_DIR_PREFIX)
            .tempdir()
            .map_err(|e| {
                Error::msg(format!("failed to create temporary {ENGINE_DIR_PREFIX}* dir: {e}"))
            })?;
        Ok(Self {
            path: dir.path().to_path_buf(),
            temp: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    /// Leave the directory on disk for good and return its path.
    pub fn keep(mut self) -> PathBuf {
        if let Some(dir) = self.temp.take() {
            let _ = dir.keep();
        }
        self.path
    }
}

fn fresh_temp_dir(prefix: &str) -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .map_err(|e| Error::msg(format!("failed to create temporary {prefix}* dir: {e}")))?;
    Ok(dir.keep())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn creates_requested_dirs_and_log_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let work = tmp.path().join("work");
        let out = tmp.path().join("nested/out");

        let paths = init_dirs(Some(&work), Some(&out)).expect("init");
        assert!(work.is_dir());
        assert!(out.is_dir());
        assert_eq!(paths.log_dir, work.join("log"));
        assert!(paths.log_dir.is_dir());
        assert_eq!(paths.backup_root(), work.join("installroot"));
    }

    #[test]
    fn second_init_keeps_existing_contents() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let work = tmp.path().join("work");
        let out = tmp.path().join("out");
        init_dirs(Some(&work), Some(&out)).expect("first init");
        fs::write(out.join(".discinfo"), "keep\n").expect("write");
        fs::write(work.join("log").join("isotree.log"), "old\n").expect("write");

        init_dirs(Some(&work), Some(&out)).expect("second init");
        assert_eq!(fs::read_to_string(out.join(".discinfo")).expect("read"), "keep\n");
        assert_eq!(
            fs::read_to_string(work.join("log").join("isotree.log")).expect("read"),
            "old\n"
        );
    }

    #[test]
    fn rejects_file_in_place_of_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join("file");
        fs::write(&file, "x").expect("write");
        assert!(init_dirs(Some(&file), Some(tmp.path())).is_err());
    }

    #[test]
    fn temporary_engine_root_is_removed_on_drop() {
        let root = EngineRoot::new(None).expect("engine root");
        let path = root.path().to_path_buf();
        assert!(root.is_temporary());
        assert!(path.is_dir());
        let name = path.file_name().and_then(|s| s.to_str()).unwrap_or_default();
        assert!(name.starts_with(ENGINE_DIR_PREFIX), "{name}");

        drop(root);
        assert!(!path.exists());
    }

    #[test]
    fn kept_engine_root_survives() {
        let path = EngineRoot::new(None).expect("engine root").keep();
        assert!(path.is_dir());
        fs::remove_dir_all(&path).expect("cleanup");
    }

    #[test]
    fn explicit_engine_root_is_left_alone() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let wanted = tmp.path().join("engine");
        let root = EngineRoot::new(Some(&wanted)).expect("engine root");
        assert!(!root.is_temporary());
        assert_eq!(root.path(), wanted);
        drop(root);
        assert!(!wanted.exists());
    }

    #[test]
    fn defaults_to_prefixed_temp_dirs() {
        let paths = init_dirs(None, None).expect("init");
        let work_name = paths.work_dir.file_name().and_then(|s| s.to_str()).unwrap_or_default();
        let out_name = paths.output_dir.file_name().and_then(|s| s.to_str()).unwrap_or_default();
        assert!(work_name.starts_with(WORK_DIR_PREFIX), "{work_name}");
        assert!(out_name.starts_with(OUTPUT_DIR_PREFIX), "{out_name}");
        let _ = fs::remove_dir_all(&paths.work_dir);
        let _ = fs::remove_dir_all(&paths.output_dir);
    }
}
