use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

pub fn ensure_dir(p: &Path) -> Result<()> {
    fs::create_dir_all(p)
        .map_err(|e| Error::msg(format!("failed to create dir {}: {e}", p.display())))
}

pub fn write_text(p: &Path, s: &str) -> Result<()> {
    if let Some(parent) = p.parent() {
        ensure_dir(parent)?;
    }
    fs::write(p, s).map_err(|e| Error::msg(format!("failed to write {}: {e}", p.display())))
}

/// Reject paths that would escape the directory they are joined onto.
pub fn validate_rel_path(p: &str) -> Result<()> {
    let path = p.trim();
    if path.is_empty() {
        return Err(Error::msg("path is empty"));
    }
    if Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(Error::msg(format!("path '{path}' contains '..'")));
    }
    Ok(())
}

/// Absolute form of `p` with `.` and `..` folded away. Symlinks are not resolved.
pub fn normalize(p: &Path) -> Result<PathBuf> {
    let abs = std::path::absolute(p)
        .map_err(|e| Error::msg(format!("failed to resolve {}: {e}", p.display())))?;
    let mut out = PathBuf::new();
    for c in abs.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// True when `a` and `b` are the same directory or one lies inside the other.
pub fn paths_overlap(a: &Path, b: &Path) -> Result<bool> {
    let (a, b) = (normalize(a)?, normalize(b)?);
    Ok(a.starts_with(&b) || b.starts_with(&a))
}

pub fn remove_path_if_exists(p: &Path) -> Result<bool> {
    let Ok(meta) = fs::symlink_metadata(p) else {
        return Ok(false);
    };
    let res = if meta.is_dir() {
        fs::remove_dir_all(p)
    } else {
        fs::remove_file(p)
    };
    res.map_err(|e| Error::msg(format!("failed to remove {}: {e}", p.display())))?;
    Ok(true)
}

/// Mirror `src` into `dst` as a tree of hard links: directories are created,
/// regular files are linked, symlinks are recreated. Nothing is copied.
pub fn link_tree(src: &Path, dst: &Path) -> Result<usize> {
    if !src.is_dir() {
        return Err(Error::msg(format!(
            "source is not a directory: {}",
            src.display()
        )));
    }
    ensure_dir(dst)?;

    let mut linked = 0usize;
    for entry in walkdir::WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| Error::msg(format!("walkdir error: {e}")))?;
        let p = entry.path();
        let rel = p
            .strip_prefix(src)
            .map_err(|e| Error::msg(format!("strip_prefix failed: {e}")))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let out = dst.join(rel);
        let ft = entry.file_type();
        if ft.is_dir() {
            ensure_dir(&out)?;
        } else if ft.is_symlink() {
            copy_symlink(p, &out)?;
        } else {
            remove_path_if_exists(&out)?;
            fs::hard_link(p, &out).map_err(|e| {
                Error::msg(format!(
                    "failed to hard link {} -> {}: {e}",
                    p.display(),
                    out.display()
                ))
            })?;
            linked += 1;
        }
    }
    Ok(linked)
}

pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;
    for entry in walkdir::WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| Error::msg(format!("walkdir error: {e}")))?;
        let p = entry.path();
        let rel = p
            .strip_prefix(src)
            .map_err(|e| Error::msg(format!("strip_prefix failed: {e}")))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let out = dst.join(rel);
        let ft = entry.file_type();
        if ft.is_dir() {
            ensure_dir(&out)?;
        } else if ft.is_symlink() {
            copy_symlink(p, &out)?;
        } else {
            copy_file(p, &out)?;
        }
    }
    Ok(())
}

pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    fs::copy(src, dst).map_err(|e| {
        Error::msg(format!(
            "failed to copy {} -> {}: {e}",
            src.display(),
            dst.display()
        ))
    })?;
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    use std::os::unix::fs as unix_fs;

    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    remove_path_if_exists(dst)?;
    let target = fs::read_link(src)
        .map_err(|e| Error::msg(format!("failed to read symlink {}: {e}", src.display())))?;
    unix_fs::symlink(&target, dst).map_err(|e| {
        Error::msg(format!(
            "failed to create symlink {} -> {}: {e}",
            dst.display(),
            target.display()
        ))
    })
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    copy_file(src, dst)
}
