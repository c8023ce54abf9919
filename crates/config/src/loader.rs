//! [`ConfigLoader`]: reads metric documents from strings, files and directories.
//!
//! Processing order for one document:
//! 1. environment substitution (`${NAME}`, `${NAME:-default}`)
//! 2. template rendering, only when a [`TemplateContext`] is supplied
//! 3. YAML parsing (the document must be a mapping)
//! 4. validation and detector id resolution

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ConfigError, LoadResult, LoadStatus, Result};
use crate::schema::{MetricDocument, MetricUnit};
use crate::substitution::substitute_env;
use crate::template::{TemplateContext, TemplateRenderer};
use crate::validation::validate_document;

/// Units and per-file outcomes from a directory scan.
#[derive(Debug, Default)]
pub struct LoadedDirectory {
    pub units: Vec<MetricUnit>,
    pub results: Vec<LoadResult>,
}

/// Loads and validates metric configuration.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    renderer: TemplateRenderer,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a document held in memory.
    pub fn load_str(&self, source: &str, ctx: Option<TemplateContext>) -> Result<MetricUnit> {
        let substituted = substitute_env(source)?;
        let rendered = match ctx {
            Some(ctx) => self.renderer.render_document(&substituted, ctx)?,
            None => substituted,
        };

        let value: serde_yaml::Value = serde_yaml::from_str(&rendered)?;
        if !value.is_mapping() {
            return Err(ConfigError::Validation(vec![
                "configuration must be a YAML mapping".to_string(),
            ]));
        }
        let doc: MetricDocument = serde_yaml::from_value(value)?;

        let (unit, warnings) = validate_document(doc)?;
        for warning in &warnings {
            warn!(metric = %unit.name(), path = %warning.path, "{}", warning.message);
        }
        debug!(metric = %unit.name(), detectors = unit.detectors().len(), "metric configuration loaded");
        Ok(unit)
    }

    /// Read a file and load it. Errors carry the file path.
    pub fn load_file(&self, path: &Path, ctx: Option<TemplateContext>) -> Result<MetricUnit> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_str(&contents, ctx).map_err(|e| e.in_file(path))
    }

    /// Recursively load every YAML file under `dir`, without template context.
    ///
    /// Dotfiles (filenames starting with `.`) and non-YAML files are skipped.
    /// Parse errors are reported per-file but do not abort the scan. A metric
    /// name already loaded from an earlier file fails the later one.
    pub fn load_dir(&self, dir: &Path) -> Result<LoadedDirectory> {
        if !dir.is_dir() {
            return Err(ConfigError::Io {
                path: dir.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let mut files = Vec::new();
        let mut loaded = LoadedDirectory::default();
        collect_files(dir, &mut files, &mut loaded.results);
        files.sort();

        let mut names = HashSet::new();
        for path in files {
            match self.load_file(&path, None) {
                Ok(unit) if !names.insert(unit.name().to_string()) => {
                    let error = format!("duplicate metric name '{}'", unit.name());
                    warn!(path = %path.display(), %error, "failed to load metric file");
                    loaded.results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed { error },
                    });
                }
                Ok(unit) => {
                    info!(metric = %unit.name(), path = %path.display(), "loaded metric");
                    loaded.results.push(LoadResult {
                        path,
                        status: LoadStatus::Loaded {
                            name: unit.name().to_string(),
                        },
                    });
                    loaded.units.push(unit);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load metric file");
                    loaded.results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            error: e.root().to_string(),
                        },
                    });
                }
            }
        }

        Ok(loaded)
    }
}

/// Walk `dir`, collecting YAML files and recording skipped entries.
fn collect_files(dir: &Path, files: &mut Vec<PathBuf>, results: &mut Vec<LoadResult>) {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "failed to read directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();

        // Skip dotfiles/dotdirs
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with('.'))
        {
            if path.is_file() {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "dotfile".to_string(),
                    },
                });
            }
            continue;
        }

        if path.is_dir() {
            collect_files(&path, files, results);
            continue;
        }

        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yml" || e == "yaml");

        if is_yaml {
            files.push(path);
        } else {
            results.push(LoadResult {
                path,
                status: LoadStatus::Skipped {
                    reason: "not a YAML file".to_string(),
                },
            });
        }
    }
}
