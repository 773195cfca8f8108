//! Where the pieces of an export live on disk.
//!
//! ```text
//! <output-dir>/<experiment>_runs_export/
//!     <experiment>_runs.csv
//!     metadata.json
//!     export_summary.json
//!     artifacts/<run_id>/<relative-path>
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::transfer::error::{Error, Result};

pub const METADATA_FILE: &str = "metadata.json";
pub const ARTIFACTS_DIR: &str = "artifacts";
pub const EXPORT_SUMMARY_FILE: &str = "export_summary.json";
pub const IMPORT_SUMMARY_FILE: &str = "import_summary.json";
const TABLE_SUFFIX: &str = "_runs.csv";
const DIR_SUFFIX: &str = "_runs_export";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLayout {
    pub root: PathBuf,
    pub table: PathBuf,
    pub metadata: PathBuf,
    pub artifacts: PathBuf,
}

/// Experiment names may contain characters that are not valid in file names.
pub fn file_stem(experiment: &str) -> String {
    experiment
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

impl ExportLayout {
    /// The layout a new export of `experiment` gets below `output_dir`.
    pub fn for_export(output_dir: &Path, experiment: &str) -> Self {
        let stem = file_stem(experiment);
        let root = output_dir.join(format!("{}{}", stem, DIR_SUFFIX));
        ExportLayout {
            table: root.join(format!("{}{}", stem, TABLE_SUFFIX)),
            metadata: root.join(METADATA_FILE),
            artifacts: root.join(ARTIFACTS_DIR),
            root,
        }
    }

    /// Locates an existing export in `root`. The table is the only `*_runs.csv` file.
    pub fn open(root: &Path) -> Result<Self> {
        let entries = fs::read_dir(root).map_err(|e| Error::io(format!("reading {}", root.display()), e))?;
        let mut tables = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| Error::io(format!("reading {}", root.display()), e))?.path();
            let is_table = path
                .file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| name.ends_with(TABLE_SUFFIX));
            if is_table && path.is_file() {
                tables.push(path);
            }
        }
        tables.sort();
        let table = match tables.len() {
            1 => tables.remove(0),
            0 => {
                return Err(Error::io(
                    format!("looking for the runs table in {}", root.display()),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no *_runs.csv file"),
                ))
            }
            _ => {
                return Err(Error::io(
                    format!("looking for the runs table in {}", root.display()),
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "more than one *_runs.csv file, pass the table path explicitly"),
                ))
            }
        };
        Ok(ExportLayout::with_table(root, table))
    }

    /// A layout around an explicitly given table.
    pub fn with_table(root: &Path, table: PathBuf) -> Self {
        ExportLayout {
            root: root.to_path_buf(),
            table,
            metadata: root.join(METADATA_FILE),
            artifacts: root.join(ARTIFACTS_DIR),
        }
    }

    pub fn run_artifacts(&self, run_id: &str) -> PathBuf {
        self.artifacts.join(run_id)
    }

    pub fn export_summary(&self) -> PathBuf {
        self.root.join(EXPORT_SUMMARY_FILE)
    }

    /// The import summary is written next to the table it was imported from.
    pub fn import_summary(&self) -> PathBuf {
        self.table
            .parent()
            .unwrap_or(&self.root)
            .join(IMPORT_SUMMARY_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_layout_is_named_after_the_experiment() {
        let layout = ExportLayout::for_export(Path::new("/out"), "Exp");
        assert_eq!(layout.root, Path::new("/out/Exp_runs_export"));
        assert_eq!(layout.table, Path::new("/out/Exp_runs_export/Exp_runs.csv"));
        assert_eq!(layout.metadata, Path::new("/out/Exp_runs_export/metadata.json"));
        assert_eq!(layout.run_artifacts("r1"), Path::new("/out/Exp_runs_export/artifacts/r1"));
    }

    #[test]
    fn path_separators_in_names_are_replaced() {
        assert_eq!(file_stem("team/vision: v2"), "team_vision_ v2");
    }

    #[test]
    fn open_finds_the_single_table() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Exp_runs.csv"), "run_id,status,start_time\n").unwrap();
        fs::write(dir.path().join("notes.csv"), "").unwrap();
        let layout = ExportLayout::open(dir.path()).unwrap();
        assert_eq!(layout.table, dir.path().join("Exp_runs.csv"));
        assert_eq!(layout.import_summary(), dir.path().join(IMPORT_SUMMARY_FILE));

        fs::write(dir.path().join("Other_runs.csv"), "").unwrap();
        assert!(ExportLayout::open(dir.path()).is_err());
    }
}
