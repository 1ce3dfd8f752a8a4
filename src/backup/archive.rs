// dgraph-backup/src/backup/archive.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Local, SecondsFormat};
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// A zip of one export directory, waiting to be shipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArchive {
    pub local_path: PathBuf,
    pub prefix: String,
    pub timestamp: DateTime<Local>,
}

impl BackupArchive {
    /// Object key used in the bucket: the archive's file name.
    pub fn key(&self) -> String {
        self.local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Entries at or above this size need zip64 headers.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

fn needs_zip64(len: u64, threshold: u64) -> bool {
    len >= threshold
}

/// `<prefix>-<RFC3339>.zip`
pub fn archive_file_name(prefix: &str, timestamp: &DateTime<Local>) -> String {
    format!(
        "{}-{}.zip",
        prefix,
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Creates a timestamped zip of `source_dir` inside `archive_dir`.
///
/// The directory itself becomes the single top-level entry of the archive,
/// so extracting yields `<target>/<source_dir name>/...`.
pub fn create_zip_archive(
    source_dir: &Path,
    archive_dir: &Path,
    prefix: &str,
) -> Result<BackupArchive> {
    if !source_dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Source for archival is not a directory: {}",
            source_dir.display()
        ));
    }
    let root_name = source_dir
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .with_context(|| format!("Cannot determine directory name of {}", source_dir.display()))?;

    if !archive_dir.exists() {
        std::fs::create_dir_all(archive_dir).with_context(|| {
            format!(
                "Failed to create directory for archive: {}",
                archive_dir.display()
            )
        })?;
    }

    let timestamp = Local::now();
    let archive_path = archive_dir.join(archive_file_name(prefix, &timestamp));
    info!(
        "🗜 Compressing {} to {}",
        source_dir.display(),
        archive_path.display()
    );

    write_zip(source_dir, &archive_path, &root_name, ZIP64_THRESHOLD)?;

    info!("✓ Archive created at {}", archive_path.display());
    Ok(BackupArchive {
        local_path: archive_path,
        prefix: prefix.to_string(),
        timestamp,
    })
}

/// Extracts a zip archive into `extract_to_dir`.
///
/// Returns the archive's top-level directory inside `extract_to_dir` when all
/// entries share one, otherwise `extract_to_dir` itself.
pub fn extract_zip_archive(archive_path: &Path, extract_to_dir: &Path) -> Result<PathBuf> {
    if !archive_path.is_file() {
        return Err(anyhow::anyhow!(
            "Archive for extraction is not a file: {}",
            archive_path.display()
        ));
    }
    if !extract_to_dir.exists() {
        std::fs::create_dir_all(extract_to_dir).with_context(|| {
            format!(
                "Failed to create extraction directory: {}",
                extract_to_dir.display()
            )
        })?;
    } else if !extract_to_dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Extraction path exists but is not a directory: {}",
            extract_to_dir.display()
        ));
    }

    info!(
        "📦 Extracting {} to {}",
        archive_path.display(),
        extract_to_dir.display()
    );

    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive file: {}", archive_path.display()))?;
    let mut zip = ZipArchive::new(file)
        .with_context(|| format!("Failed to read zip archive: {}", archive_path.display()))?;

    let mut roots: Vec<PathBuf> = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .with_context(|| format!("Failed to read entry {} of {}", i, archive_path.display()))?;
        let relative = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .with_context(|| format!("Archive entry escapes extraction directory: {}", entry.name()))?;

        if let Some(Component::Normal(first)) = relative.components().next() {
            let first = PathBuf::from(first);
            if !roots.contains(&first) {
                roots.push(first);
            }
        }

        let out_path = extract_to_dir.join(&relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .with_context(|| format!("Failed to create {}", out_path.display()))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut out = File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {}", out_path.display()))?;
    }

    let extracted = match roots.as_slice() {
        [root] if extract_to_dir.join(root).is_dir() => extract_to_dir.join(root),
        _ => extract_to_dir.to_path_buf(),
    };
    info!("✓ Archive extracted to {}", extracted.display());
    Ok(extracted)
}

fn write_zip(source_dir: &Path, archive_path: &Path, root_name: &str, zip64_threshold: u64) -> Result<()> {
    let archive_file = File::create(archive_path)
        .with_context(|| format!("Failed to create archive file: {}", archive_path.display()))?;
    let mut zip = ZipWriter::new(archive_file);
    let file_options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let dir_options = FileOptions::default().compression_method(CompressionMethod::Stored);

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk directory: {}", source_dir.display()))?;
        let path = entry.path();
        let relative = path.strip_prefix(source_dir).with_context(|| {
            format!(
                "Failed to strip prefix {} from {}",
                source_dir.display(),
                path.display()
            )
        })?;
        let name = zip_entry_name(root_name, relative);

        if entry.file_type().is_dir() {
            zip.add_directory(name.as_str(), dir_options)
                .with_context(|| format!("Failed to add directory {} to archive", path.display()))?;
        } else if entry.file_type().is_file() {
            let len = entry
                .metadata()
                .with_context(|| format!("Failed to read metadata of {}", path.display()))?
                .len();
            debug!("Adding {} ({} bytes) as {}", path.display(), len, name);
            let options = file_options.large_file(needs_zip64(len, zip64_threshold));
            zip.start_file(name.as_str(), options)
                .with_context(|| format!("Failed to start zip entry {}", name))?;
            let mut file = File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            io::copy(&mut file, &mut zip)
                .with_context(|| format!("Failed to compress {}", path.display()))?;
        }
    }

    zip.finish()
        .with_context(|| format!("Failed to finish zip archive: {}", archive_path.display()))?;
    Ok(())
}

fn zip_entry_name(root: &str, relative: &Path) -> String {
    let mut name = root.to_string();
    for component in relative.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;

    fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(dir).unwrap().to_path_buf();
                (rel, fs::read(e.path()).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_archive_name_format() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:20:30+09:00")
            .unwrap()
            .with_timezone(&Local);
        let name = archive_file_name("dgraph-backup", &ts);
        assert!(name.starts_with("dgraph-backup-2024-05-01T"));
        assert!(name.ends_with(".zip"));
        let stamp = name
            .trim_start_matches("dgraph-backup-")
            .trim_end_matches(".zip");
        assert!(DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[test]
    fn test_archive_then_extract_round_trip() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let export = work.path().join("export");
        fs::create_dir_all(export.join("dgraph.r1.u0101/nested"))?;
        fs::write(export.join("dgraph.r1.u0101/g01.json.gz"), b"{\"uid\": \"0x1\"}")?;
        fs::write(export.join("dgraph.r1.u0101/g01.schema.gz"), b"name: string .")?;
        fs::write(export.join("dgraph.r1.u0101/nested/empty"), b"")?;

        let archive = create_zip_archive(&export, work.path(), "dgraph-backup")?;
        assert!(archive.local_path.is_file());
        assert_eq!(archive.prefix, "dgraph-backup");
        assert!(archive.key().starts_with("dgraph-backup-"));

        let target = work.path().join("data");
        let extracted = extract_zip_archive(&archive.local_path, &target)?;

        assert_eq!(extracted, target.join("export"));
        assert_eq!(snapshot(&export), snapshot(&extracted));
        Ok(())
    }

    #[test]
    fn test_zip64_only_for_entries_past_four_gib() {
        assert!(!needs_zip64(0, ZIP64_THRESHOLD));
        assert!(!needs_zip64(u32::MAX as u64 - 1, ZIP64_THRESHOLD));
        assert!(needs_zip64(u32::MAX as u64, ZIP64_THRESHOLD));
        assert!(needs_zip64(4_400_000_000, ZIP64_THRESHOLD));
    }

    #[test]
    fn test_zip64_entries_extract_intact() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let export = work.path().join("export");
        fs::create_dir_all(export.join("dgraph.r1.u0101"))?;
        fs::write(export.join("dgraph.r1.u0101/g01.rdf.gz"), b"<0x1> <name> \"a\" .")?;
        fs::write(export.join("dgraph.r1.u0101/g01.schema.gz"), b"name: string .")?;

        let archive_path = work.path().join("forced-zip64.zip");
        // Threshold 0 writes every file entry with zip64 headers.
        write_zip(&export, &archive_path, "export", 0)?;

        let extracted = extract_zip_archive(&archive_path, &work.path().join("data"))?;
        assert_eq!(snapshot(&export), snapshot(&extracted));
        Ok(())
    }

    #[test]
    #[ignore = "compresses a 4.4 GB sparse file"]
    fn test_archives_export_file_larger_than_four_gib() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let export = work.path().join("export");
        fs::create_dir_all(&export)?;
        let big = File::create(export.join("g01.rdf.gz"))?;
        big.set_len(4_400_000_000)?;
        drop(big);

        let archive = create_zip_archive(&export, work.path(), "dgraph-backup")?;

        let mut zip = ZipArchive::new(File::open(&archive.local_path)?)?;
        assert_eq!(zip.by_name("export/g01.rdf.gz")?.size(), 4_400_000_000);
        Ok(())
    }

    #[test]
    fn test_archive_missing_source_fails() {
        let work = tempfile::tempdir().unwrap();
        let result = create_zip_archive(&work.path().join("missing"), work.path(), "p");
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_rejects_non_zip() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let bogus = work.path().join("bogus.zip");
        fs::write(&bogus, b"not a zip")?;
        assert!(extract_zip_archive(&bogus, &work.path().join("out")).is_err());
        Ok(())
    }
}
