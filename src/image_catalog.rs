use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use dirs_next as dirs;

/// One exercise image as listed in the catalog file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CatalogEntry {
    pub name: String,
    pub path: String,
}

static CATALOG: Lazy<Mutex<HashMap<String, String>>> = Lazy::new(|| Mutex::new(HashMap::new()));

const FILE: &str = "exercise_images.json";
const DEFAULT_CATALOG: &str = include_str!("../data/default_image_catalog.json");

fn catalog() -> MutexGuard<'static, HashMap<String, String>> {
    CATALOG.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(FILE))
}

/// Lowercase `name` and strip diacritics so "Elevação" matches "elevacao".
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

fn parse_entries(data: &str) -> serde_json::Result<HashMap<String, String>> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(data)?;
    Ok(entries
        .into_iter()
        .filter(|e| !e.name.trim().is_empty() && !e.path.trim().is_empty())
        .map(|e| (normalize_name(&e.name), e.path))
        .collect())
}

/// Load the catalog from the user's config directory.
///
/// The bundled default catalog is written there on first run. A file that
/// cannot be parsed is reported and the bundled catalog is used instead.
pub fn load() {
    let Some(p) = path() else {
        log::warn!("No config directory available, using bundled image catalog");
        load_bundled();
        return;
    };
    if !p.exists() {
        if let Some(parent) = p.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(&p, DEFAULT_CATALOG) {
            log::warn!("Could not seed image catalog at {}: {e}", p.display());
        }
    }
    match load_from_path(&p) {
        Ok(count) => log::info!("{count} exercise images mapped"),
        Err(e) => {
            log::error!("Image catalog {} unreadable: {e}", p.display());
            load_bundled();
        }
    }
}

fn load_bundled() {
    match parse_entries(DEFAULT_CATALOG) {
        Ok(map) => *catalog() = map,
        Err(e) => log::error!("Bundled image catalog is invalid: {e}"),
    }
}

/// Replace the catalog with the entries of the JSON file at `path`.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> io::Result<usize> {
    let data = std::fs::read_to_string(path)?;
    let map = parse_entries(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let count = map.len();
    *catalog() = map;
    Ok(count)
}

/// Find the image for an exercise by its normalized name.
pub fn lookup(exercise: &str) -> Option<String> {
    if exercise.trim().is_empty() {
        return None;
    }
    catalog().get(&normalize_name(exercise)).cloned()
}

/// Turn a catalog path into a URL; absolute `http(s)` references pass through.
pub fn absolute_url(base_url: &str, reference: &str) -> String {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return reference.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if reference.starts_with('/') {
        format!("{base}{reference}")
    } else {
        format!("{base}/{reference}")
    }
}
