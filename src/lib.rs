//! # smalipatch
//!
//! A library for finding security and entitlement checks in Android smali
//! listings and patching them in place
//!
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub mod apply;
pub mod collab;
pub mod ledger;
pub mod patch_ops;
pub mod rules;
pub mod run;
pub mod scan;
pub mod synth;
mod tests;
pub mod types;

/// Recurses a base path, typically a 'smali' folder from apktool, returning
/// the paths of all smali listings in stable sorted order
///
/// # Examples
///
/// ```no_run
///  use smalipatch::find_listing_files;
///  use std::path::Path;
///
///  let files = find_listing_files(Path::new("smali")).unwrap();
///  println!("{:} smali listings found.", files.len());
/// ```
pub fn find_listing_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut results = vec![];

    for entry in dir.read_dir()? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            // Directory: recurse sub-directory
            results.extend(find_listing_files(&entry.path())?);
        } else if entry.file_name().to_string_lossy().ends_with(".smali") {
            results.push(entry.path());
        }
    }

    // Stable order for reproducible reports
    results.sort();
    Ok(results)
}

/// Reads one listing, tolerating stray non-UTF-8 bytes.
pub fn read_listing(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
