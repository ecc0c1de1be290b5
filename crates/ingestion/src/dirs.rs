//! Download directory layout.
//!
//! Downloads land under `<root>/<year>/<month>/<leaf>`, where the leaf
//! name carries the scenario id, a UTC timestamp and a random suffix so
//! concurrent runs never collide. Inside the leaf, each product gets a
//! numbered `p_<ncn_id>_NNN` subdirectory.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{IngestError, Result};

/// Unique leaf name: `<base><day>_<HHMMSS>_<millis><5 random letters>`.
pub fn mk_leaf_name(base: &str) -> String {
    let now = Utc::now();
    let mut name = format!(
        "{}{}_{}_{:03}",
        base,
        now.format("%d"),
        now.format("%H%M%S"),
        now.timestamp_subsec_millis()
    );
    for b in &uuid::Uuid::new_v4().as_bytes()[..5] {
        name.push((b'a' + b % 26) as char);
    }
    name
}

/// Create `<root>/<year>/<month>[/<extra>]/<leaf>` and return the full
/// path plus the path relative to `root`.
///
/// The intermediate directories may already exist; the leaf must not,
/// so a clash with a concurrent run surfaces as an error.
pub fn create_dl_dir(
    root: &Path,
    leaf_base: &str,
    extra: Option<&str>,
) -> Result<(PathBuf, String)> {
    let now = Utc::now();
    let mut rel = PathBuf::new();
    rel.push(now.format("%Y").to_string());
    rel.push(now.format("%m").to_string());
    if let Some(extra) = extra {
        rel.push(extra);
    }
    std::fs::create_dir_all(root.join(&rel))?;

    rel.push(mk_leaf_name(leaf_base));
    let full = root.join(&rel);
    std::fs::create_dir(&full)?;

    let rel = rel
        .to_str()
        .ok_or_else(|| IngestError::Failed(format!("non-utf8 path {}", full.display())))?
        .to_string();
    Ok((full, rel))
}

/// Name of the i-th (1-based) product subdirectory. The index is padded
/// wide enough for the total count so names sort in download order.
pub fn subdir_name(ncn_id: &str, index: usize, total: usize) -> String {
    let width = if total > 10_000 {
        5
    } else if total > 1_000 {
        4
    } else {
        3
    };
    format!("p_{}_{:0width$}", ncn_id, index, width = width)
}

/// Check that the download root exists, is a directory, and is
/// writable; try to create it when missing.
pub fn ensure_dl_root(root: &Path) -> Result<()> {
    if !root.is_dir() {
        std::fs::create_dir_all(root)?;
    }
    let probe = root.join(mk_leaf_name(".wtest_"));
    std::fs::create_dir(&probe)?;
    std::fs::remove_dir(&probe)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_names_are_unique() {
        let a = mk_leaf_name("sc_x_");
        let b = mk_leaf_name("sc_x_");
        assert!(a.starts_with("sc_x_"));
        assert_ne!(a, b);
        let suffix = &a[a.len() - 5..];
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_create_dl_dir_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let (full, rel) = create_dl_dir(tmp.path(), "sc_a_", None).unwrap();
        assert!(full.is_dir());
        assert_eq!(full, tmp.path().join(&rel));

        let parts: Vec<&str> = rel.split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 4);
        assert_eq!(parts[1].len(), 2);
        assert!(parts[2].starts_with("sc_a_"));
    }

    #[test]
    fn test_create_dl_dir_with_extra() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, rel) = create_dl_dir(tmp.path(), "ap_", Some("addProduct")).unwrap();
        assert_eq!(rel.split('/').nth(2), Some("addProduct"));
    }

    #[test]
    fn test_subdir_name_padding() {
        assert_eq!(subdir_name("sc1", 7, 20), "p_sc1_007");
        assert_eq!(subdir_name("sc1", 7, 1_001), "p_sc1_0007");
        assert_eq!(subdir_name("sc1", 7, 10_001), "p_sc1_00007");
    }

    #[test]
    fn test_ensure_dl_root_creates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("downloads");
        ensure_dl_root(&root).unwrap();
        assert!(root.is_dir());
    }
}
