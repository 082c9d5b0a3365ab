//! Merges per-worker function-map fragments into one global map per architecture.
//!
//! Runs single-threaded after every writer has exited, so the fragments need
//! no locking. A mangled name seen with two or more distinct AST paths is
//! left out of the global map: importing an arbitrarily chosen definition
//! across TUs would be unsound.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{IoResultExt, Result};

use super::{FUNC_MAP_FILE, TEMP_FNMAP_FOLDER};

/// Mangled name to AST path; every key maps to exactly one value.
pub type GlobalFunctionMap = BTreeMap<String, String>;

/// Merge result for one architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchMerge {
    pub arch: String,
    pub map_file: PathBuf,
    pub entries: usize,
    pub ambiguous: usize,
}

/// Merge result for a whole CTU root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub architectures: Vec<ArchMerge>,
}

impl MergeReport {
    #[must_use]
    pub fn total_entries(&self) -> usize {
        self.architectures.iter().map(|a| a.entries).sum()
    }
}

/// Pure merge over fragment lines (`name ast_path`, split on the first space).
pub fn merge_fragments<I, S>(lines: I) -> (GlobalFunctionMap, usize)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut observed: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for line in lines {
        let line = line.as_ref().trim_end_matches(['\r', '\n']);
        let Some((name, path)) = line.split_once(' ') else {
            continue;
        };
        if name.is_empty() || path.is_empty() {
            continue;
        }
        observed
            .entry(name.to_string())
            .or_default()
            .insert(path.to_string());
    }

    let mut merged = GlobalFunctionMap::new();
    let mut ambiguous = 0;
    for (name, paths) in observed {
        if paths.len() == 1 {
            if let Some(path) = paths.into_iter().next() {
                merged.insert(name, path);
            }
        } else {
            tracing::trace!(%name, definitions = paths.len(), "leaving ambiguous name out of CTU");
            ambiguous += 1;
        }
    }
    (merged, ambiguous)
}

/// Merges every architecture under `ctu_dir` that has a fragment folder.
///
/// # Errors
/// Returns error if a fragment cannot be read or a global map cannot be written.
pub fn merge_ctu_maps(ctu_dir: &Path) -> Result<MergeReport> {
    let mut report = MergeReport::default();
    if !ctu_dir.is_dir() {
        return Ok(report);
    }

    let mut arch_dirs: Vec<PathBuf> = fs::read_dir(ctu_dir)
        .at_path(ctu_dir)?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.join(TEMP_FNMAP_FOLDER).is_dir())
        .collect();
    arch_dirs.sort();

    for arch_dir in arch_dirs {
        report.architectures.push(merge_arch(&arch_dir)?);
    }
    Ok(report)
}

/// Merges one `<ctu_dir>/<arch>` folder and removes its fragment scratch folder.
///
/// # Errors
/// Returns error if a fragment cannot be read or the map cannot be written.
pub fn merge_arch(arch_dir: &Path) -> Result<ArchMerge> {
    let temp_dir = arch_dir.join(TEMP_FNMAP_FOLDER);
    let lines = read_fragments(&temp_dir)?;
    let (merged, ambiguous) = merge_fragments(&lines);

    let map_file = arch_dir.join(FUNC_MAP_FILE);
    write_global_map(&map_file, &merged)?;

    if let Err(e) = fs::remove_dir_all(&temp_dir) {
        tracing::debug!(dir = %temp_dir.display(), "could not remove fragment folder: {e}");
    }

    let arch = arch_dir
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    tracing::info!(
        %arch,
        entries = merged.len(),
        ambiguous,
        "merged CTU function map into {}",
        map_file.display()
    );

    Ok(ArchMerge {
        arch,
        map_file,
        entries: merged.len(),
        ambiguous,
    })
}

/// Every line of every file inside `dir` (enumeration order is irrelevant).
///
/// # Errors
/// Returns error if the directory walk or a file read fails.
pub fn read_fragments(dir: &Path) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let content = fs::read_to_string(entry.path()).at_path(entry.path())?;
        lines.extend(content.lines().map(str::to_string));
    }
    Ok(lines)
}

/// Overwrites `path` with one `name ast_path` pair per line, sorted by name.
///
/// # Errors
/// Returns error if the file cannot be written.
pub fn write_global_map(path: &Path, map: &GlobalFunctionMap) -> Result<()> {
    let mut out = String::new();
    for (name, ast) in map {
        out.push_str(name);
        out.push(' ');
        out.push_str(ast);
        out.push('\n');
    }
    let mut file = fs::File::create(path).at_path(path)?;
    file.write_all(out.as_bytes()).at_path(path)?;
    Ok(())
}

/// Reads a global map written by [`write_global_map`].
///
/// # Errors
/// Returns error if the file cannot be read.
pub fn read_global_map(path: &Path) -> Result<GlobalFunctionMap> {
    let content = fs::read_to_string(path).at_path(path)?;
    Ok(content
        .lines()
        .filter_map(|l| l.split_once(' '))
        .map(|(n, p)| (n.to_string(), p.to_string()))
        .collect())
}
