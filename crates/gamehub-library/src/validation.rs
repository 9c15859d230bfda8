//! Heuristics used by probes to reject ghost entries

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// An install directory must hold strictly more than this many bytes
pub const MIN_INSTALL_BYTES: u64 = 50 * 1024 * 1024;

/// Installer caches left next to a game; not counted towards its size
const INSTALLER_CACHE_DIR: &str = "__installer";

/// Normalize a display name for matching across sources.
///
/// Case-folds and strips trademark glyphs, colons and whitespace so that
/// "Need for Speed™ Unbound" and "Need for Speed Unbound" compare equal.
pub fn clean_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '™' | '®' | ':') && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether the files under `dir` add up to more than `threshold` bytes.
///
/// Stops walking as soon as the threshold is crossed. Unreadable entries
/// are ignored.
pub fn exceeds_size(dir: &Path, threshold: u64) -> bool {
    if !dir.is_dir() {
        return false;
    }

    let mut total: u64 = 0;
    let walker = WalkDir::new(dir).into_iter().filter_entry(|entry| {
        !(entry.file_type().is_dir()
            && entry
                .file_name()
                .to_string_lossy()
                .eq_ignore_ascii_case(INSTALLER_CACHE_DIR))
    });

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(metadata) = entry.metadata() {
            total = total.saturating_add(metadata.len());
            if total > threshold {
                return true;
            }
        }
    }

    false
}

/// Look for a Start Menu shortcut whose cleaned name overlaps the title's.
///
/// Matches when either cleaned name contains the other, so "skate.lnk"
/// corroborates "skate." and "Battlefield 2042 Launcher.lnk" corroborates
/// "Battlefield™ 2042". This can misfire on unrelated short names.
pub fn has_start_menu_shortcut(roots: &[PathBuf], title_name: &str) -> bool {
    let target = clean_name(title_name);
    if target.is_empty() {
        return false;
    }

    roots
        .iter()
        .filter(|root| root.is_dir())
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(Result::ok))
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| shortcut_stem(entry.path()))
        .map(|stem| clean_name(&stem))
        .any(|shortcut| {
            !shortcut.is_empty() && (target.contains(&shortcut) || shortcut.contains(&target))
        })
}

fn shortcut_stem(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !ext.eq_ignore_ascii_case("lnk") {
        return None;
    }
    Some(path.file_stem()?.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn sized_file(path: &Path, len: u64) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(path).unwrap().set_len(len).unwrap();
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("Need for Speed™ Unbound"), "needforspeedunbound");
        assert_eq!(clean_name("Battlefield®: 2042"), "battlefield2042");
        assert_eq!(clean_name("  F1\t24 "), "f124");
    }

    #[test]
    fn test_size_threshold_is_strict() {
        let dir = TempDir::new().unwrap();
        sized_file(&dir.path().join("data.bin"), MIN_INSTALL_BYTES);
        assert!(!exceeds_size(dir.path(), MIN_INSTALL_BYTES));

        sized_file(&dir.path().join("extra.bin"), 1);
        assert!(exceeds_size(dir.path(), MIN_INSTALL_BYTES));
    }

    #[test]
    fn test_size_counts_nested_files() {
        let dir = TempDir::new().unwrap();
        sized_file(&dir.path().join("a/b/one.pak"), 600);
        sized_file(&dir.path().join("a/two.pak"), 600);
        assert!(exceeds_size(dir.path(), 1000));
        assert!(!exceeds_size(dir.path(), 1200));
    }

    #[test]
    fn test_installer_cache_is_skipped() {
        let dir = TempDir::new().unwrap();
        sized_file(&dir.path().join("__Installer/cache.bin"), 5000);
        sized_file(&dir.path().join("game.exe"), 10);
        assert!(!exceeds_size(dir.path(), 100));
    }

    #[test]
    fn test_missing_dir_is_invalid() {
        let dir = TempDir::new().unwrap();
        assert!(!exceeds_size(&dir.path().join("gone"), 0));
    }

    #[test]
    fn test_start_menu_shortcut_matching() {
        let dir = TempDir::new().unwrap();
        let programs = dir.path().join("Programs");
        sized_file(&programs.join("EA/skate.lnk"), 0);
        sized_file(&programs.join("Battlefield 2042 Launcher.LNK"), 0);
        sized_file(&programs.join("notes.txt"), 0);

        let roots = vec![programs, dir.path().join("absent")];
        assert!(has_start_menu_shortcut(&roots, "skate."));
        assert!(has_start_menu_shortcut(&roots, "Battlefield™ 2042"));
        assert!(!has_start_menu_shortcut(&roots, "Mass Effect"));
        assert!(!has_start_menu_shortcut(&roots, "notes"));
    }
}
