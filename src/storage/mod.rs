// src/storage/mod.rs
use crate::extractors::section::ExtractedSection;
use crate::extractors::structured::StructuredTable;
use crate::extractors::table::StatementCategory;
use crate::utils::error::StorageError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SECTION_PREFIX: &str = "MDNA_";

/// `MDNA_<fiscal_year>_<source_stem>.txt`
pub fn section_file_name(section: &ExtractedSection) -> String {
    format!("{}{}_{}.txt", SECTION_PREFIX, section.fiscal_year, section.source_stem)
}

pub fn is_section_artifact(file_name: &str) -> bool {
    file_name.starts_with(SECTION_PREFIX) && file_name.ends_with(".txt")
}

/// `<source_stem>_<category>_<sequence>.csv`, sequence starting at 1.
pub fn table_file_name(source_stem: &str, category: StatementCategory, sequence: usize) -> String {
    format!("{}_{}_{}.csv", source_stem, category.as_str(), sequence)
}

/// Owns one output directory and every artifact written into it.
pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        // Create the base directory if it doesn't exist
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path })
    }

    /// Deletes the files in the directory whose names satisfy `is_artifact`.
    pub fn clear_artifacts<F>(&self, is_artifact: F) -> Result<usize, StorageError>
    where
        F: Fn(&str) -> bool,
    {
        let stale = self.list_artifacts(is_artifact)?;
        for path in &stale {
            fs::remove_file(path)?;
            tracing::debug!("Removed stale artifact {}", path.display());
        }
        Ok(stale.len())
    }

    /// Files directly inside the directory whose names satisfy `is_artifact`, sorted.
    pub fn list_artifacts<F>(&self, is_artifact: F) -> Result<Vec<PathBuf>, StorageError>
    where
        F: Fn(&str) -> bool,
    {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if is_artifact(&name.to_string_lossy()) {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }

    /// Saves the extracted section as UTF-8 text.
    pub fn save_section(&self, section: &ExtractedSection) -> Result<PathBuf, StorageError> {
        let file_path = self.base_dir.join(section_file_name(section));

        let mut file = fs::File::create(&file_path).map_err(StorageError::IoError)?;
        file.write_all(section.content.as_bytes())
            .map_err(StorageError::IoError)?;

        verify_written(&file_path)?;
        tracing::info!("Saved {} of {} to {}", section.section_name, section.source_name, file_path.display());
        Ok(file_path)
    }

    /// Saves one structured table as CSV.
    pub fn save_table(
        &self,
        table: &StructuredTable,
        source_stem: &str,
        category: StatementCategory,
        sequence: usize,
    ) -> Result<PathBuf, StorageError> {
        let file_path = self.base_dir.join(table_file_name(source_stem, category, sequence));
        self.save_csv(table, &file_path)?;
        Ok(file_path)
    }

    /// Saves a table under an explicit file name inside the directory.
    pub fn save_named_table(&self, table: &StructuredTable, file_name: &str) -> Result<PathBuf, StorageError> {
        let file_path = self.base_dir.join(file_name);
        self.save_csv(table, &file_path)?;
        Ok(file_path)
    }

    /// Saves arbitrary text (reports, raw JSON) under the given file name.
    pub fn save_text(&self, file_name: &str, content: &str) -> Result<PathBuf, StorageError> {
        let file_path = self.base_dir.join(file_name);
        fs::write(&file_path, content).map_err(StorageError::IoError)?;
        verify_written(&file_path)?;
        tracing::info!("Saved {}", file_path.display());
        Ok(file_path)
    }

    /// Saves a value as pretty-printed JSON.
    pub fn save_json(&self, file_name: &str, value: &serde_json::Value) -> Result<PathBuf, StorageError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.save_text(file_name, &json)
    }

    fn save_csv(&self, table: &StructuredTable, file_path: &Path) -> Result<(), StorageError> {
        let file = fs::File::create(file_path).map_err(StorageError::IoError)?;
        table.write_csv(file)?;
        verify_written(file_path)?;
        tracing::debug!("Saved table to {}", file_path.display());
        Ok(())
    }
}

/// A write only counts once the file exists with non-zero size.
fn verify_written(path: &Path) -> Result<(), StorageError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(StorageError::NotPersisted(path.display().to_string())),
    }
}
