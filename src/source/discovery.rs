//! Input file discovery.

use glob::MatchOptions;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::{DiscoveryError, PatternSnafu};

/// Expand `pattern` into the list of input files to load.
///
/// Dot-prefixed names only match when the pattern spells the dot out, so
/// files already marked as handled are never picked up again. Entries that
/// cannot be read are skipped with a warning; an invalid pattern is an
/// error. Results are sorted for consistent ordering.
pub fn discover_files(pattern: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let mut files = Vec::new();
    let mut total_matched = 0;
    for entry in glob::glob_with(pattern, options).context(PatternSnafu { pattern })? {
        total_matched += 1;
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(path) => debug!("Skipping non-file match {}", path.display()),
            Err(e) => warn!("Skipping unreadable path {}: {}", e.path().display(), e),
        }
    }

    debug!(
        "Pattern '{}' matched {} paths, {} are files",
        pattern,
        total_matched,
        files.len()
    );

    files.sort();
    Ok(files)
}
