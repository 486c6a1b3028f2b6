use std::collections::{BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::config::CatalogConfig;
use crate::error::{Error, Result};

/// What to walk and which files count as images.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub lookup_path: PathBuf,
    /// Directory names skipped at any depth.
    pub ignore_dirs: Vec<String>,
    /// File name suffixes, e.g. `.jpg`; a missing leading dot is added.
    pub file_extensions: Vec<String>,
    /// Applies to both extensions and ignored directory names.
    pub case_sensitive: bool,
}

impl ScanOptions {
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let lookup_path = config
            .lookup_path
            .clone()
            .ok_or_else(|| Error::Configuration("catalog.lookup_path is not set".to_string()))?;

        Ok(Self {
            lookup_path,
            ignore_dirs: config.ignore_dirs.clone(),
            file_extensions: config.file_extensions.clone(),
            case_sensitive: config.case_sensitive,
        })
    }

    fn fold(&self, s: &str) -> String {
        if self.case_sensitive {
            s.to_string()
        } else {
            s.to_lowercase()
        }
    }
}

/// Walk `options.lookup_path` and return the absolute, normalized paths of
/// every matching file.
pub fn scan_images(options: &ScanOptions) -> Result<BTreeSet<PathBuf>> {
    if !options.lookup_path.exists() {
        return Err(Error::PathNotFound(options.lookup_path.clone()));
    }
    let root = normalize_path(&std::path::absolute(&options.lookup_path)?);

    let ignored: HashSet<String> = options.ignore_dirs.iter().map(|d| options.fold(d)).collect();
    let suffixes: Vec<String> = options
        .file_extensions
        .iter()
        .map(|ext| {
            let ext = options.fold(ext);
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{}", ext)
            }
        })
        .collect();

    let walker = WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.depth() > 0
                && entry.file_type().is_dir()
                && ignored.contains(&options.fold(&entry.file_name().to_string_lossy())))
        });

    let mut images = BTreeSet::new();
    for entry in walker {
        let entry = entry?;
        // Symlinked files count; symlinked directories are not descended.
        if !entry.file_type().is_file() && !entry.path().is_file() {
            continue;
        }

        let name = options.fold(&entry.file_name().to_string_lossy());
        if suffixes.iter().any(|suffix| name.ends_with(suffix.as_str())) {
            images.insert(entry.into_path());
        }
    }

    Ok(images)
}

/// Lexically resolve `.` and `..` components.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::{tempdir, TempDir};

    fn base_dir() -> TempDir {
        let dir = tempdir().unwrap();
        for folder in ["FolderA", "FolderB", "FolderC/FolderCInner"] {
            fs::create_dir_all(dir.path().join(folder)).unwrap();
        }
        for file in [
            "FolderA/FileA1.TXT",
            "FolderA/filea2.txt",
            "FolderB/FileB1.TXT",
            "FolderB/fileb2.txt",
            "FolderC/FolderCInner/FileC1.TXT",
            "FolderC/FolderCInner/filec2.txt",
            "FolderC/notes.md",
        ] {
            File::create(dir.path().join(file)).unwrap();
        }
        dir
    }

    fn options(root: &Path) -> ScanOptions {
        ScanOptions {
            lookup_path: root.to_path_buf(),
            ignore_dirs: Vec::new(),
            file_extensions: vec![".txt".to_string()],
            case_sensitive: false,
        }
    }

    fn names(found: &BTreeSet<PathBuf>) -> BTreeSet<String> {
        found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_scan_is_case_insensitive_by_default() {
        let dir = base_dir();
        let found = scan_images(&options(dir.path())).unwrap();

        assert_eq!(found.len(), 6);
        assert!(found.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn test_scan_case_sensitive() {
        let dir = base_dir();
        let mut opts = options(dir.path());
        opts.case_sensitive = true;

        let found = scan_images(&opts).unwrap();
        assert_eq!(
            names(&found),
            ["filea2.txt", "fileb2.txt", "filec2.txt"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn test_scan_skips_ignored_dirs_at_any_depth() {
        let dir = base_dir();
        let mut opts = options(dir.path());
        opts.ignore_dirs = vec!["folderb".to_string(), "FolderCInner".to_string()];

        let found = scan_images(&opts).unwrap();
        assert_eq!(
            names(&found),
            ["FileA1.TXT", "filea2.txt"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn test_extension_without_dot() {
        let dir = base_dir();
        let mut opts = options(dir.path());
        opts.file_extensions = vec!["md".to_string()];

        let found = scan_images(&opts).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_relative_components_are_normalized() {
        let dir = base_dir();
        let opts = options(&dir.path().join("FolderA").join("..").join("FolderB"));

        let found = scan_images(&opts).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| !p.to_string_lossy().contains("..")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_files_are_found() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let photos = dir.path().join("photos");
        fs::create_dir_all(photos.join("sub")).unwrap();
        fs::create_dir_all(dir.path().join("elsewhere")).unwrap();
        File::create(photos.join("plain.jpg")).unwrap();
        File::create(dir.path().join("real.jpg")).unwrap();
        File::create(dir.path().join("elsewhere/hidden.jpg")).unwrap();
        symlink(dir.path().join("real.jpg"), photos.join("link.jpg")).unwrap();
        symlink(dir.path().join("elsewhere"), photos.join("sub/linked_dir")).unwrap();
        symlink(dir.path().join("missing.jpg"), photos.join("dangling.jpg")).unwrap();

        let mut opts = options(&photos);
        opts.file_extensions = vec![".jpg".to_string()];

        let found = scan_images(&opts).unwrap();
        assert_eq!(
            names(&found),
            ["link.jpg", "plain.jpg"].iter().map(|s| s.to_string()).collect()
        );
        assert!(found.contains(&photos.join("link.jpg")));
    }

    #[test]
    fn test_missing_lookup_path() {
        let dir = tempdir().unwrap();
        let opts = options(&dir.path().join("absent"));

        assert!(matches!(scan_images(&opts), Err(Error::PathNotFound(_))));
    }

    #[test]
    fn test_from_config_requires_lookup_path() {
        let config = CatalogConfig::default();
        assert!(matches!(
            ScanOptions::from_config(&config),
            Err(Error::Configuration(_))
        ));
    }
}
