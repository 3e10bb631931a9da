//! Metadata files read by installer tooling: `.buildstamp` inside the
//! install root, `.discinfo` and `.treeinfo` at the top of the output tree.

use std::collections::BTreeMap;

mod buildstamp;
mod discinfo;
mod treeinfo;

pub use buildstamp::BuildStamp;
pub use discinfo::DiscInfo;
pub use treeinfo::TreeInfo;

pub const BUILDSTAMP_FILE: &str = ".buildstamp";
pub const DISCINFO_FILE: &str = ".discinfo";
pub const TREEINFO_FILE: &str = ".treeinfo";

/// Section name -> key -> value, as accumulated by tree builders.
pub type Sections = BTreeMap<String, BTreeMap<String, String>>;

fn render_ini(sections: &[(&str, &BTreeMap<String, String>)]) -> String {
    let mut out = String::new();
    for (i, (name, kv)) in sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("[{name}]\n"));
        for (k, v) in kv.iter() {
            out.push_str(&format!("{k} = {v}\n"));
        }
    }
    out
}
