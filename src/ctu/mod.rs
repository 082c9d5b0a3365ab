//! Cross translation unit support: per-TU preprocessing and function-map merging.
//!
//! Layout under the CTU root, one subtree per target architecture:
//!
//! ```text
//! <ctu_dir>/<arch>/ast/<source path>.ast
//! <ctu_dir>/<arch>/tmpExternalFnMaps/<one fragment per worker invocation>
//! <ctu_dir>/<arch>/externalDefMap.txt
//! ```

pub mod merge;
pub mod preprocess;
pub mod triple_arch;

pub use merge::{merge_ctu_maps, merge_fragments, read_global_map, GlobalFunctionMap, MergeReport};
pub use preprocess::{CtuPrepOutcome, CtuPreprocessor, PrepStage};
pub use triple_arch::{get_triple_arch, parse_triple_arch};

use std::path::{Path, PathBuf};

/// Scratch folder holding per-worker function-map fragments.
pub const TEMP_FNMAP_FOLDER: &str = "tmpExternalFnMaps";

/// Merged mangled-name to AST map, one per architecture.
pub const FUNC_MAP_FILE: &str = "externalDefMap.txt";

/// Directory of AST dumps inside an architecture folder.
pub const AST_DIR: &str = "ast";

/// Rewrites a source path into the map's AST convention: drive letter and one
/// leading separator removed, placed under `ast/`, `.ast` appended.
#[must_use]
pub fn ast_relative_path(source: &str) -> String {
    let no_drive = strip_drive(source);
    let relative = no_drive
        .strip_prefix('/')
        .or_else(|| no_drive.strip_prefix('\\'))
        .unwrap_or(no_drive);
    format!("{AST_DIR}/{relative}.ast")
}

/// Absolute location of the AST dump for `source`.
#[must_use]
pub fn ast_path(ctu_dir: &Path, arch: &str, source: &Path) -> PathBuf {
    ctu_dir
        .join(arch)
        .join(ast_relative_path(&source.to_string_lossy()))
}

/// Recovers the source path an AST dump was generated from.
#[must_use]
pub fn source_of_ast(ast: &Path) -> Option<PathBuf> {
    let text = ast.to_string_lossy().replace('\\', "/");
    let marker = format!("/{AST_DIR}/");
    let relative = match text.find(&marker) {
        Some(idx) => &text[idx + marker.len()..],
        None => text.strip_prefix(&marker[1..])?,
    };
    let relative = relative.strip_suffix(".ast")?;
    Some(PathBuf::from(format!("/{relative}")))
}

fn strip_drive(path: &str) -> &str {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        &path[2..]
    } else {
        path
    }
}
