use std::env;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::model::error::ModelError;

pub const DEFAULT_MODEL_FILENAME: &str = "dog_skin_disease_model.safetensors";
pub const WEIGHTS_EXTENSION: &str = "safetensors";

/// What to do when no file with the exact model filename exists anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Pick the largest file carrying the weights extension.
    LargestFile,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct LocatorConfig {
    pub filename: String,
    pub extension: String,
    pub search_roots: Vec<PathBuf>,
    pub max_depth: usize,
    pub fallback: FallbackPolicy,
}

impl LocatorConfig {
    pub fn from_env() -> Self {
        let filename =
            env::var("MODEL_FILE").unwrap_or_else(|_| DEFAULT_MODEL_FILENAME.to_string());
        let mut search_roots: Vec<PathBuf> = match env::var("MODEL_SEARCH_ROOTS") {
            Ok(list) => env::split_paths(&list).collect(),
            Err(_) => Vec::new(),
        };
        if search_roots.is_empty() {
            if let Ok(cwd) = env::current_dir() {
                search_roots.push(cwd);
            }
            search_roots.push(PathBuf::from("/app"));
        }
        let fallback = match env::var("MODEL_FALLBACK").as_deref() {
            Ok("off") => FallbackPolicy::Disabled,
            _ => FallbackPolicy::LargestFile,
        };
        Self {
            filename,
            extension: WEIGHTS_EXTENSION.to_string(),
            search_roots,
            max_depth: 2,
            fallback,
        }
    }
}

/// Resolve the weights file. Probes the exact filename in each search root
/// and its `models/` subfolder, then a shallow recursive scan for the exact
/// name, and finally (policy permitting) falls back to the largest file with
/// the weights extension.
pub fn locate_weights_file(cfg: &LocatorConfig) -> Result<PathBuf, ModelError> {
    for root in &cfg.search_roots {
        log_root_listing(root);
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    for root in &cfg.search_roots {
        candidates.push(root.join(&cfg.filename));
        candidates.push(root.join("models").join(&cfg.filename));
    }
    let exact_name = OsStr::new(&cfg.filename);
    for root in &cfg.search_roots {
        scan_files(root, 0, cfg.max_depth, &mut |path, _size| {
            if path.file_name() == Some(exact_name) && !candidates.contains(&path.to_path_buf()) {
                candidates.push(path.to_path_buf());
            }
        });
    }

    info!("Searching for weights file: {}", cfg.filename);
    for candidate in &candidates {
        match fs::metadata(candidate) {
            Ok(meta) if meta.is_file() => {
                info!(
                    "Found weights at {} ({:.2} MB)",
                    candidate.display(),
                    meta.len() as f64 / (1024.0 * 1024.0)
                );
                return Ok(candidate.clone());
            }
            _ => info!("  checked {} -> absent", candidate.display()),
        }
    }

    if cfg.fallback == FallbackPolicy::LargestFile {
        warn!(
            "No file named {} found, scanning for any .{} file",
            cfg.filename, cfg.extension
        );
        let extension = OsStr::new(&cfg.extension);
        let mut found: Vec<(PathBuf, u64)> = Vec::new();
        for root in &cfg.search_roots {
            scan_files(root, 0, cfg.max_depth, &mut |path, size| {
                if path.extension() == Some(extension) {
                    found.push((path.to_path_buf(), size));
                }
            });
        }
        for (path, size) in &found {
            info!(
                "  candidate {} ({:.2} MB)",
                path.display(),
                *size as f64 / (1024.0 * 1024.0)
            );
        }
        if let Some((path, _)) = found.into_iter().max_by_key(|(_, size)| *size) {
            info!("Using largest .{} file: {}", cfg.extension, path.display());
            return Ok(path);
        }
    }

    Err(ModelError::WeightsNotFound {
        filename: cfg.filename.clone(),
        roots: cfg.search_roots.clone(),
    })
}

fn scan_files<F: FnMut(&Path, u64)>(dir: &Path, depth: usize, max_depth: usize, visit: &mut F) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if depth < max_depth {
                scan_files(&path, depth + 1, max_depth, visit);
            }
        } else if let Ok(meta) = entry.metadata() {
            visit(&path, meta.len());
        }
    }
}

fn log_root_listing(root: &Path) {
    let Ok(entries) = fs::read_dir(root) else {
        info!("Search root {} is not readable", root.display());
        return;
    };
    let names: Vec<String> = entries
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    info!("Search root {} ({} entries):", root.display(), names.len());
    for name in names.iter().take(20) {
        info!("  - {name}");
    }
    if names.len() > 20 {
        info!("  ... and {} more", names.len() - 20);
    }
}
