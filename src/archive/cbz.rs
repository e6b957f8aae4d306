//! Comic book zip (`.cbz`) archive writer.
//!
//! Files are staged in `<dest>/.<stem>.staging/` while the job runs. On
//! finalize they are written as stored (uncompressed) entries to
//! `<stem>.cbz.tmp`, which is then renamed onto `<stem>.cbz`. Layout:
//!
//! ```text
//! cover.jpg
//! 0001/0001.jpg
//! 0001/0002.jpg
//! 0002/0001.png
//! index.json
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{ArchiveError, ArchiveFactory, ArchiveWriter};
use crate::download::filename::sanitize_filename_component;
use crate::model::{Chapter, WorkItem};

/// Name of the entry holding the serialized [`WorkItem`].
pub const INDEX_ENTRY: &str = "index.json";

const ARCHIVE_EXTENSION: &str = "cbz";

/// File stem shared by an item's archive, partial file, and staging directory.
#[must_use]
pub fn archive_stem(item: &WorkItem) -> String {
    let title = sanitize_filename_component(&item.title);
    if title.is_empty() {
        item.id.to_string()
    } else {
        format!("{title}_{}", item.id)
    }
}

/// Opens [`CbzArchive`] writers.
#[derive(Debug, Default, Clone, Copy)]
pub struct CbzArchiveFactory;

#[async_trait]
impl ArchiveFactory for CbzArchiveFactory {
    async fn open(
        &self,
        destination: &Path,
        item: &WorkItem,
    ) -> Result<Box<dyn ArchiveWriter>, ArchiveError> {
        Ok(Box::new(CbzArchive::open(destination, item).await?))
    }
}

/// Staged `.cbz` writer for one item.
#[derive(Debug)]
pub struct CbzArchive {
    archive_path: PathBuf,
    partial_path: PathBuf,
    staging: PathBuf,
    item: WorkItem,
    chapters: BTreeMap<u64, Chapter>,
    entries: BTreeSet<String>,
    carried: Vec<String>,
    finalized: Option<PathBuf>,
}

struct WritePlan {
    partial: PathBuf,
    existing: PathBuf,
    staging: PathBuf,
    entries: Vec<String>,
    carried: Vec<String>,
    index: Vec<u8>,
}

impl CbzArchive {
    /// Opens a writer for `item`, discarding any staging left by an earlier run.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Io`] when the staging directory cannot be prepared.
    pub async fn open(destination: &Path, item: &WorkItem) -> Result<Self, ArchiveError> {
        let stem = archive_stem(item);
        let archive_path = destination.join(format!("{stem}.{ARCHIVE_EXTENSION}"));
        let partial_path = destination.join(format!("{stem}.{ARCHIVE_EXTENSION}.tmp"));
        let staging = destination.join(format!(".{stem}.staging"));

        remove_dir_if_exists(&staging).await?;
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| ArchiveError::io(&staging, e))?;

        let mut item = item.clone();
        item.chapters = None;

        debug!(path = %archive_path.display(), "archive opened");
        Ok(Self {
            archive_path,
            partial_path,
            staging,
            item,
            chapters: BTreeMap::new(),
            entries: BTreeSet::new(),
            carried: Vec::new(),
            finalized: None,
        })
    }

    /// Final archive location.
    #[must_use]
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    fn ensure_open(&self) -> Result<(), ArchiveError> {
        match &self.finalized {
            Some(path) => Err(ArchiveError::Finalized { path: path.clone() }),
            None => Ok(()),
        }
    }

    async fn stage(&mut self, name: String, file: &Path) -> Result<(), ArchiveError> {
        self.ensure_open()?;
        let target = self.staging.join(&name);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ArchiveError::io(parent, e))?;
        }
        tokio::fs::copy(file, &target)
            .await
            .map_err(|e| ArchiveError::io(file, e))?;
        self.entries.insert(name);
        Ok(())
    }

    fn index_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        let mut chapters: Vec<Chapter> = self.chapters.values().cloned().collect();
        chapters.sort_by_key(|c| c.number);
        let mut item = self.item.clone();
        item.chapters = Some(chapters);
        serde_json::to_vec_pretty(&item).map_err(|source| ArchiveError::Index {
            path: self.archive_path.clone(),
            source,
        })
    }
}

#[async_trait]
impl ArchiveWriter for CbzArchive {
    async fn add_cover(&mut self, file: &Path, extension: Option<&str>) -> Result<(), ArchiveError> {
        self.stage(entry_name("cover", extension), file).await
    }

    async fn add_page(
        &mut self,
        chapter: &Chapter,
        file: &Path,
        page_index: usize,
        extension: Option<&str>,
    ) -> Result<(), ArchiveError> {
        let base = format!("{:04}/{:04}", chapter.number, page_index + 1);
        self.stage(entry_name(&base, extension), file).await?;
        self.chapters.entry(chapter.id).or_insert_with(|| Chapter {
            pages: None,
            ..chapter.clone()
        });
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.archive_path.display()))]
    async fn merge_with_existing(&mut self) -> Result<(), ArchiveError> {
        self.ensure_open()?;
        if !tokio::fs::try_exists(&self.archive_path)
            .await
            .map_err(|e| ArchiveError::io(&self.archive_path, e))?
        {
            return Ok(());
        }

        let existing = self.archive_path.clone();
        let produced = self.entries.clone();
        let (carried, previous) =
            tokio::task::spawn_blocking(move || scan_existing(&existing, &produced)).await??;

        if let Some(chapters) = previous.and_then(|p| p.chapters) {
            for chapter in chapters {
                self.chapters.entry(chapter.id).or_insert(chapter);
            }
        }
        debug!(carried = carried.len(), "merging with existing archive");
        self.carried = carried;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.archive_path.display()))]
    async fn finalize(&mut self) -> Result<PathBuf, ArchiveError> {
        self.ensure_open()?;
        let plan = WritePlan {
            partial: self.partial_path.clone(),
            existing: self.archive_path.clone(),
            staging: self.staging.clone(),
            entries: self.entries.iter().cloned().collect(),
            carried: self.carried.clone(),
            index: self.index_bytes()?,
        };
        let entry_count = plan.entries.len() + plan.carried.len();
        tokio::task::spawn_blocking(move || write_archive(&plan)).await??;

        tokio::fs::rename(&self.partial_path, &self.archive_path)
            .await
            .map_err(|e| ArchiveError::io(&self.archive_path, e))?;
        remove_dir_if_exists(&self.staging).await?;

        info!(entries = entry_count, "archive finalized");
        self.finalized = Some(self.archive_path.clone());
        Ok(self.archive_path.clone())
    }

    async fn cleanup(&mut self) -> Result<(), ArchiveError> {
        remove_dir_if_exists(&self.staging).await?;
        remove_file_if_exists(&self.partial_path).await
    }
}

/// Reads the [`WorkItem`] stored in a finalized archive.
///
/// # Errors
///
/// Returns an error when the archive cannot be opened or has no valid index.
pub async fn read_index(archive: &Path) -> Result<WorkItem, ArchiveError> {
    let path = archive.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut zip = open_zip(&path)?;
        read_index_entry(&mut zip, &path)?.ok_or_else(|| {
            ArchiveError::zip(&path, zip::result::ZipError::FileNotFound)
        })
    })
    .await?
}

fn entry_name(base: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !ext.is_empty() => format!("{base}.{ext}"),
        _ => base.to_string(),
    }
}

fn open_zip(path: &Path) -> Result<ZipArchive<File>, ArchiveError> {
    let file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
    ZipArchive::new(file).map_err(|e| ArchiveError::zip(path, e))
}

fn read_index_entry(
    zip: &mut ZipArchive<File>,
    path: &Path,
) -> Result<Option<WorkItem>, ArchiveError> {
    match zip.by_name(INDEX_ENTRY) {
        Ok(entry) => serde_json::from_reader(entry)
            .map(Some)
            .map_err(|source| ArchiveError::Index {
                path: path.to_path_buf(),
                source,
            }),
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(ArchiveError::zip(path, e)),
    }
}

fn scan_existing(
    existing: &Path,
    produced: &BTreeSet<String>,
) -> Result<(Vec<String>, Option<WorkItem>), ArchiveError> {
    let mut zip = open_zip(existing)?;
    let carried = zip
        .file_names()
        .filter(|name| *name != INDEX_ENTRY && !name.ends_with('/'))
        .filter(|name| !produced.contains(*name))
        .map(ToString::to_string)
        .collect();
    let previous = read_index_entry(&mut zip, existing)?;
    Ok((carried, previous))
}

fn write_archive(plan: &WritePlan) -> Result<(), ArchiveError> {
    let partial = &plan.partial;
    let file = File::create(partial).map_err(|e| ArchiveError::io(partial, e))?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);

    for name in &plan.entries {
        let source = plan.staging.join(name);
        let mut input = File::open(&source).map_err(|e| ArchiveError::io(&source, e))?;
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| ArchiveError::zip(partial, e))?;
        std::io::copy(&mut input, &mut writer).map_err(|e| ArchiveError::io(partial, e))?;
    }

    if !plan.carried.is_empty() {
        let mut previous = open_zip(&plan.existing)?;
        for name in &plan.carried {
            let entry = previous
                .by_name(name)
                .map_err(|e| ArchiveError::zip(&plan.existing, e))?;
            writer
                .raw_copy_file(entry)
                .map_err(|e| ArchiveError::zip(partial, e))?;
        }
    }

    writer
        .start_file(INDEX_ENTRY, options)
        .map_err(|e| ArchiveError::zip(partial, e))?;
    writer
        .write_all(&plan.index)
        .map_err(|e| ArchiveError::io(partial, e))?;
    writer.finish().map_err(|e| ArchiveError::zip(partial, e))?;
    Ok(())
}

async fn remove_dir_if_exists(path: &Path) -> Result<(), ArchiveError> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(ArchiveError::io(path, e)),
        _ => Ok(()),
    }
}

async fn remove_file_if_exists(path: &Path) -> Result<(), ArchiveError> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(ArchiveError::io(path, e)),
        _ => Ok(()),
    }
}
