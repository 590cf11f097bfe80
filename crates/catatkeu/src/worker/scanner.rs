//! One-shot directory scan for the drop zone.

use std::path::Path;

use log::info;
use walkdir::WalkDir;

/// Lists candidate file names in the watched directory, non-recursively and
/// lexicographically sorted. Directories are skipped, as is anything with
/// `.ocr.` in the name (recognizer temp artifacts). No extension filtering
/// here: processing decides supportability and records the proper failure
/// message.
pub fn list_image_files(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.contains(".ocr.") {
            continue;
        }
        names.push(name);
    }
    names.sort();
    info!("Scanned {} files in {}", names.len(), dir.display());
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_empty_directory() {
        let temp = TempDir::new().unwrap();
        assert!(list_image_files(temp.path()).is_empty());
    }

    #[test]
    fn test_scan_missing_directory() {
        let temp = TempDir::new().unwrap();
        let gone = temp.path().join("nope");
        assert!(list_image_files(&gone).is_empty());
    }

    #[test]
    fn test_scan_sorted_and_filtered() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("b.png"), b"x").unwrap();
        std::fs::write(temp.path().join("a.jpg"), b"x").unwrap();
        std::fs::write(temp.path().join("slip.ocr.png"), b"x").unwrap();
        std::fs::create_dir(temp.path().join("subdir")).unwrap();
        std::fs::write(temp.path().join("subdir/nested.png"), b"x").unwrap();
        // Unsupported extensions are still listed; the reconciler marks them.
        std::fs::write(temp.path().join("c.exe"), b"x").unwrap();

        let names = list_image_files(temp.path());
        assert_eq!(names, vec!["a.jpg", "b.png", "c.exe"]);
    }
}
