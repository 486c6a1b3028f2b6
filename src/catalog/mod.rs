//! Image catalog: a table of per-file capture metadata kept in step with a
//! directory tree.
//!
//! The first sync reads metadata for every matching file. Later syncs only
//! read files that are not yet catalogued, since extraction is the expensive
//! step. Rows for files that have disappeared are removed separately by
//! [`ImageCatalog::reconcile_deletions`].

pub mod discovery;
pub mod metadata;

pub use discovery::{scan_images, ScanOptions};
pub use metadata::{ExifExtractor, MetadataExtractor};

use chrono::NaiveDateTime;
use rusqlite::types::ToSql;
use rusqlite::Row;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{TableRow, TabularStore};

/// Capture metadata of one image file, keyed by its absolute path.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub filepath: String,
    pub created: Option<NaiveDateTime>,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub lens: Option<String>,
}

impl ImageRecord {
    pub fn empty(filepath: impl Into<String>) -> Self {
        Self {
            filepath: filepath.into(),
            created: None,
            lat: None,
            long: None,
            lens: None,
        }
    }
}

impl TableRow for ImageRecord {
    const TABLE: &'static str = "images";
    const COLUMNS: &'static [&'static str] = &["filepath", "created", "lat", "long", "lens"];
    const KEY: &'static [&'static str] = &["filepath"];
    const SCHEMA: &'static str = r#"
        CREATE TABLE IF NOT EXISTS images (
            filepath TEXT PRIMARY KEY,
            created TEXT,
            lat REAL,
            long REAL,
            lens TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_images_created ON images(created);
    "#;

    fn to_params(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.filepath as &dyn ToSql,
            &self.created as &dyn ToSql,
            &self.lat as &dyn ToSql,
            &self.long as &dyn ToSql,
            &self.lens as &dyn ToSql,
        ]
    }

    fn key_params(&self) -> Vec<&dyn ToSql> {
        vec![&self.filepath as &dyn ToSql]
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            filepath: row.get(0)?,
            created: row.get(1)?,
            lat: row.get(2)?,
            long: row.get(3)?,
            lens: row.get(4)?,
        })
    }
}

/// Catalog key of a file on disk.
pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Difference between the files on disk and the persisted catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDelta {
    /// On disk but not catalogued, keyed like the catalog and mapped to the
    /// path as scanned (the key is lossy for non UTF-8 names).
    pub added: BTreeMap<String, PathBuf>,
    /// Catalogued but no longer on disk.
    pub removed: BTreeSet<String>,
}

impl CatalogDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// What a call to [`ImageCatalog::sync`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSync {
    /// No catalog existed; every matching file was read.
    Full { rows: usize },
    /// The catalog was extended with files not seen before.
    Incremental { added: usize },
}

pub struct ImageCatalog<E = ExifExtractor> {
    store: TabularStore<ImageRecord>,
    options: ScanOptions,
    extractor: E,
}

impl ImageCatalog<ExifExtractor> {
    pub fn from_config(config: &Config) -> Result<Self> {
        let options = ScanOptions::from_config(&config.catalog)?;
        Ok(Self::new(config.db.exif_path(), options, ExifExtractor))
    }
}

impl<E: MetadataExtractor> ImageCatalog<E> {
    pub fn new(path: impl Into<PathBuf>, options: ScanOptions, extractor: E) -> Self {
        Self {
            store: TabularStore::new(path),
            options,
            extractor,
        }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Persisted rows, or `None` before the first sync.
    pub fn records(&self) -> Result<Option<Vec<ImageRecord>>> {
        self.store.load()
    }

    pub fn scan(&self) -> Result<BTreeSet<PathBuf>> {
        scan_images(&self.options)
    }

    /// Compare the lookup directory with the persisted catalog.
    ///
    /// An absent catalog counts as empty, so every file on disk is `added`.
    pub fn delta(&self) -> Result<CatalogDelta> {
        let on_disk: BTreeMap<String, PathBuf> = self
            .scan()?
            .into_iter()
            .map(|path| (path_key(&path), path))
            .collect();
        let persisted = self.persisted_paths()?.unwrap_or_default();

        let removed = persisted
            .iter()
            .filter(|key| !on_disk.contains_key(*key))
            .cloned()
            .collect();
        let added = on_disk
            .into_iter()
            .filter(|(key, _)| !persisted.contains(key))
            .collect();

        Ok(CatalogDelta { added, removed })
    }

    /// Bring the catalog up to date with files added since the last sync.
    ///
    /// Removed files are left in place; see [`reconcile_deletions`](Self::reconcile_deletions).
    pub fn sync(&mut self) -> Result<CatalogSync> {
        if self.store.exists()? {
            self.incremental_load()
        } else {
            self.full_load()
        }
    }

    /// Remove rows whose files no longer exist under the lookup directory.
    pub fn reconcile_deletions(&self) -> Result<usize> {
        if !self.store.exists()? {
            return Err(Error::Configuration(format!(
                "no image catalog at {}; run a sync first",
                self.store.path().display()
            )));
        }

        let gone = self.delta()?.removed;
        if gone.is_empty() {
            debug!("No catalogued images were removed");
            return Ok(0);
        }

        let removed = self.store.apply_deletions(|row| !gone.contains(&row.filepath))?;
        info!(removed, "Removed vanished images from catalog");
        Ok(removed)
    }

    fn full_load(&mut self) -> Result<CatalogSync> {
        let files: Vec<PathBuf> = self.scan()?.into_iter().collect();
        if files.is_empty() {
            return Err(Error::Configuration(format!(
                "no files matching {:?} under {}",
                self.options.file_extensions,
                self.options.lookup_path.display()
            )));
        }

        let records = self.extractor.extract(&files)?;
        let rows = self.store.replace(&records)?;
        info!(rows, path = %self.store.path().display(), "Built image catalog");
        Ok(CatalogSync::Full { rows })
    }

    fn incremental_load(&mut self) -> Result<CatalogSync> {
        let added = self.delta()?.added;
        if added.is_empty() {
            debug!("Image catalog is up to date");
            return Ok(CatalogSync::Incremental { added: 0 });
        }

        let files: Vec<PathBuf> = added.into_values().collect();
        let records = self.extractor.extract(&files)?;
        self.store.stage_all(records);
        let added = self.store.flush()?;
        info!(added, "Extended image catalog");
        Ok(CatalogSync::Incremental { added })
    }

    fn persisted_paths(&self) -> Result<Option<BTreeSet<String>>> {
        Ok(self
            .store
            .load()?
            .map(|rows| rows.into_iter().map(|row| row.filepath).collect()))
    }
}
