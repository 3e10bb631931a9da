use std::path::PathBuf;

/// What the orchestrator needs to know about the machine it runs on.
pub trait Host {
    /// True when running with an effective uid of 0.
    fn is_privileged(&self) -> bool;
    /// Native machine architecture as reported by the kernel (e.g. `x86_64`).
    fn machine(&self) -> Option<String>;
    /// Resolve an executable on the given `:`-separated search path.
    fn find_tool(&self, name: &str, search_path: &str) -> Option<PathBuf>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl Host for SystemHost {
    fn is_privileged(&self) -> bool {
        #[cfg(unix)]
        {
            unsafe { libc::geteuid() == 0 }
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    fn machine(&self) -> Option<String> {
        #[cfg(unix)]
        {
            let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
            if unsafe { libc::uname(&mut uts) } != 0 {
                return None;
            }
            let raw = unsafe { std::ffi::CStr::from_ptr(uts.machine.as_ptr()) };
            let machine = raw.to_string_lossy().trim().to_string();
            if machine.is_empty() { None } else { Some(machine) }
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    fn find_tool(&self, name: &str, search_path: &str) -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        which::which_in(name, Some(search_path), cwd).ok()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn reports_a_machine_architecture() {
        let m = SystemHost.machine().expect("uname machine");
        assert!(!m.is_empty());
    }

    #[test]
    fn finds_sh_on_standard_path() {
        assert!(SystemHost.find_tool("sh", "/usr/bin:/bin").is_some());
        assert!(SystemHost.find_tool("definitely-not-a-tool", "/usr/bin:/bin").is_none());
    }
}
