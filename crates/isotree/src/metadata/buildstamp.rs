use std::path::Path;

use chrono::{DateTime, Local};

use crate::error::Result;
use crate::fsutil;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStamp {
    pub product: String,
    pub version: String,
    pub bug_url: String,
    pub is_beta: bool,
    pub build_arch: String,
}

impl BuildStamp {
    pub fn new(
        product: impl Into<String>,
        version: impl Into<String>,
        bug_url: impl Into<String>,
        is_beta: bool,
        build_arch: impl Into<String>,
    ) -> Self {
        Self {
            product: product.into(),
            version: version.into(),
            bug_url: bug_url.into(),
            is_beta,
            build_arch: build_arch.into(),
        }
    }

    pub fn render(&self, now: DateTime<Local>) -> String {
        // Kept in the classic key order; some consumers parse it positionally.
        let uuid = format!("{}.{}", now.format("%Y%m%d%H%M"), self.build_arch);
        format!(
            "[Main]\nProduct={}\nVersion={}\nBugURL={}\nIsFinal={}\nUUID={}\n",
            self.product,
            self.version,
            self.bug_url,
            if self.is_beta { "False" } else { "True" },
            uuid
        )
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fsutil::write_text(path, &self.render(Local::now()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn renders_main_section() {
        let now = Local
            .with_ymd_and_hms(2026, 3, 14, 9, 26, 53)
            .single()
            .expect("valid local time");
        let stamp = BuildStamp::new("Fedora", "42", "https://bugs.example/", true, "x86_64");
        assert_eq!(
            stamp.render(now),
            "[Main]\nProduct=Fedora\nVersion=42\nBugURL=https://bugs.example/\nIsFinal=False\nUUID=202603140926.x86_64\n"
        );
    }

    #[test]
    fn final_release_is_marked() {
        let stamp = BuildStamp::new("Fedora", "42", "", false, "ppc64");
        assert!(stamp.render(Local::now()).contains("IsFinal=True\n"));
    }
}
