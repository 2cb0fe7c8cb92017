use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

/// A `.tcx`/`.erg` export pair sharing one file stem.
#[derive(Clone, Debug)]
pub struct WorkoutPair {
    pub tcx: PathBuf,
    pub erg: PathBuf,
    /// Later of the two files' modification times.
    pub modified: SystemTime,
}

impl WorkoutPair {
    pub fn stem(&self) -> String {
        self.tcx
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `<stem>.csv` in the directory holding the pair.
    pub fn output_path(&self) -> PathBuf {
        self.tcx.with_file_name(format!("{}.csv", self.stem()))
    }

    pub fn modified_display(&self) -> String {
        DateTime::<Local>::from(self.modified)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

#[derive(Debug, Default)]
pub struct Scan {
    pub tcx_files: Vec<PathBuf>,
    pub erg_files: Vec<PathBuf>,
    /// Newest first.
    pub pairs: Vec<WorkoutPair>,
}

pub fn default_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn scan_dir(dir: &Path) -> Result<Scan> {
    let mut scan = Scan::default();
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match extension_lc(&path).as_deref() {
            Some("tcx") => scan.tcx_files.push(path),
            Some("erg") => scan.erg_files.push(path),
            _ => {}
        }
    }
    scan.tcx_files.sort();
    scan.erg_files.sort();

    for tcx in &scan.tcx_files {
        let Some(erg) = scan
            .erg_files
            .iter()
            .find(|erg| erg.file_stem() == tcx.file_stem())
        else {
            continue;
        };
        let modified = mtime(tcx)?.max(mtime(erg)?);
        scan.pairs.push(WorkoutPair {
            tcx: tcx.clone(),
            erg: erg.clone(),
            modified,
        });
    }
    scan.pairs.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(scan)
}

fn extension_lc(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

fn mtime(path: &Path) -> Result<SystemTime> {
    let meta = fs::metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    Ok(meta.modified().unwrap_or(SystemTime::UNIX_EPOCH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;

    fn touch(dir: &Path, name: &str, age_s: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_s))
            .unwrap();
        path
    }

    #[test]
    fn pairs_by_stem_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Old.tcx", 500);
        touch(dir.path(), "Old.erg", 400);
        touch(dir.path(), "New.tcx", 100);
        touch(dir.path(), "New.ERG", 50);
        touch(dir.path(), "Lonely.tcx", 1);
        touch(dir.path(), "notes.txt", 1);

        let scan = scan_dir(dir.path()).unwrap();
        assert_eq!(scan.tcx_files.len(), 3);
        assert_eq!(scan.erg_files.len(), 2);
        let stems: Vec<String> = scan.pairs.iter().map(WorkoutPair::stem).collect();
        assert_eq!(stems, ["New", "Old"]);
        assert_eq!(scan.pairs[0].output_path(), dir.path().join("New.csv"));
    }

    #[test]
    fn empty_dir_has_no_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let scan = scan_dir(dir.path()).unwrap();
        assert!(scan.pairs.is_empty());
    }
}
