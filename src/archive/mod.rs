use crate::table::Table;
use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// File name suffix of a zipped CSV dataset
pub const DATASET_SUFFIX: &str = ".csv.zip";

/// A table read from a zipped CSV, together with the archive entry it came from
#[derive(Debug, Clone)]
pub struct ZippedTable {
    /// Name of the CSV entry inside the archive
    pub entry_name: String,

    /// Parsed contents of the entry
    pub table: Table,
}

/// How a table is written back to disk
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Write a temporary sibling file and rename it over the target
    pub atomic: bool,

    /// Prefix the CSV with a blank-headed row index column
    pub with_index: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            atomic: true,
            with_index: false,
        }
    }
}

/// Index of the single data entry in an archive.
///
/// Directory entries and macOS resource forks are ignored; anything other than
/// exactly one remaining entry is an error.
fn single_entry_index<R: Read + Seek>(archive: &ZipArchive<R>) -> Result<usize> {
    let candidates: Vec<usize> = (0..archive.len())
        .filter(|&idx| {
            archive
                .name_for_index(idx)
                .is_some_and(|name| !name.ends_with('/') && !name.starts_with("__MACOSX/"))
        })
        .collect();

    match candidates.as_slice() {
        [only] => Ok(*only),
        [] => bail!("Zero files found in zip archive"),
        _ => bail!(
            "Multiple files found in zip archive ({} entries), expected one CSV",
            candidates.len()
        ),
    }
}

/// Decompress and parse the CSV held by a `.csv.zip` file
pub fn read_zipped_table(path: &Path) -> Result<ZippedTable> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open dataset: {}", path.display()))?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Failed to read zip archive: {}", path.display()))?;

    let idx = single_entry_index(&archive)
        .with_context(|| format!("Unsupported archive layout: {}", path.display()))?;
    let mut entry = archive
        .by_index(idx)
        .with_context(|| format!("Failed to open archive entry {} in {}", idx, path.display()))?;
    let entry_name = entry.name().to_string();

    let mut buf = Vec::new();
    entry
        .read_to_end(&mut buf)
        .with_context(|| format!("Failed to decompress {} in {}", entry_name, path.display()))?;

    let table = Table::from_reader(buf.as_slice())
        .with_context(|| format!("Failed to parse {} in {}", entry_name, path.display()))?;

    Ok(ZippedTable { entry_name, table })
}

/// Write `table` as a deflate-compressed archive with a single CSV entry
pub fn write_zipped_table<W: Write + Seek>(
    writer: W,
    entry_name: &str,
    table: &Table,
    with_index: bool,
) -> Result<W> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(entry_name, options)
        .with_context(|| format!("Failed to start archive entry {}", entry_name))?;
    table.write_csv(&mut zip, with_index)?;

    let writer = zip.finish().context("Failed to finish zip archive")?;
    Ok(writer)
}

/// Replace the dataset at `path` with `table`
pub fn save_zipped_table(
    path: &Path,
    entry_name: &str,
    table: &Table,
    options: WriteOptions,
) -> Result<()> {
    if options.atomic {
        save_atomic(path, entry_name, table, options.with_index)
    } else {
        let file = File::create(path)
            .with_context(|| format!("Failed to open dataset for writing: {}", path.display()))?;
        let mut writer = write_zipped_table(BufWriter::new(file), entry_name, table, options.with_index)?;
        writer
            .flush()
            .with_context(|| format!("Failed to write dataset: {}", path.display()))?;
        Ok(())
    }
}

fn save_atomic(path: &Path, entry_name: &str, table: &Table, with_index: bool) -> Result<()> {
    // Rename over the link target so a symlinked dataset stays a symlink
    let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let path = resolved.as_path();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    let writer = write_zipped_table(BufWriter::new(tmp), entry_name, table, with_index)?;
    let tmp = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("Failed to flush temporary file for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync temporary file for {}", path.display()))?;

    // Temporary files are created owner-only
    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), metadata.permissions()).with_context(|| {
            format!("Failed to copy permissions of {}", path.display())
        })?;
    }

    tmp.persist(path)
        .with_context(|| format!("Failed to replace dataset: {}", path.display()))?;
    Ok(())
}

/// Build a `.csv.zip` fixture holding `csv` under `entry_name`
#[cfg(test)]
pub(crate) fn write_csv_fixture(path: &Path, entry_name: &str, csv: &str) {
    let file = File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    zip.start_file(entry_name, SimpleFileOptions::default())
        .unwrap();
    zip.write_all(csv.as_bytes()).unwrap();
    zip.finish().unwrap();
}

/// Read back the single entry of an archive as `(entry name, text)`
#[cfg(test)]
pub(crate) fn read_entry_text(path: &Path) -> (String, String) {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    assert_eq!(archive.len(), 1);
    let mut entry = archive.by_index(0).unwrap();
    let mut text = String::new();
    entry.read_to_string(&mut text).unwrap();
    (entry.name().to_string(), text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_zipped_table() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("people.csv.zip");
        write_csv_fixture(&path, "people.csv", "Unnamed: 0,name\n0,alice\n");

        let loaded = read_zipped_table(&path).unwrap();
        assert_eq!(loaded.entry_name, "people.csv");
        assert_eq!(loaded.table.headers(), ["Unnamed: 0", "name"]);
        assert_eq!(loaded.table.row_count(), 1);
    }

    #[test]
    fn test_directory_entries_are_ignored() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested.csv.zip");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        zip.add_directory("inner/", SimpleFileOptions::default()).unwrap();
        zip.start_file("inner/data.csv", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"a,b\n1,2\n").unwrap();
        zip.finish().unwrap();

        let loaded = read_zipped_table(&path).unwrap();
        assert_eq!(loaded.entry_name, "inner/data.csv");
    }

    #[test]
    fn test_multiple_entries_are_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("two.csv.zip");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        for name in ["a.csv", "b.csv"] {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(b"x\n1\n").unwrap();
        }
        zip.finish().unwrap();

        let err = read_zipped_table(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Multiple files"));
    }

    #[test]
    fn test_not_a_zip_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.csv.zip");
        fs::write(&path, b"name,value\nalice,1\n").unwrap();

        assert!(read_zipped_table(&path).is_err());
    }

    #[test]
    fn test_save_atomic_replaces_file_without_leftovers() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("people.csv.zip");
        write_csv_fixture(&path, "people.csv", "Unnamed: 0,name\n0,alice\n");

        let mut loaded = read_zipped_table(&path).unwrap();
        loaded.table.drop_unnamed_columns();
        save_zipped_table(&path, &loaded.entry_name, &loaded.table, WriteOptions::default())
            .unwrap();

        let (entry, text) = read_entry_text(&path);
        assert_eq!(entry, "people.csv");
        assert_eq!(text, "name\nalice\n");

        let leftovers: Vec<_> = fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_save_in_place_with_index() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("people.csv.zip");
        write_csv_fixture(&path, "people.csv", "name\nalice\nbob\n");

        let loaded = read_zipped_table(&path).unwrap();
        let options = WriteOptions {
            atomic: false,
            with_index: true,
        };
        save_zipped_table(&path, &loaded.entry_name, &loaded.table, options).unwrap();

        let (_, text) = read_entry_text(&path);
        assert_eq!(text, ",name\n0,alice\n1,bob\n");
    }
}
