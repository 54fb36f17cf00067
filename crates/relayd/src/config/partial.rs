use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::diagnostics::{
    Diagnostic, Error, LoadError, MergeConflictLocation, MergeError, SourceInfo, Warning,
};
use super::LogLevel;

/// One config file as written, every field optional.
///
/// Values keep their span so merge conflicts can point at both definitions.
#[derive(Debug, Default, Deserialize)]
pub struct PartialConfig {
    #[serde(default)]
    pub imports: Vec<String>,

    pub logging: Option<PartialLoggingConfig>,
    pub server: Option<PartialServerConfig>,
    pub storage: Option<PartialStorageConfig>,
    pub serial: Option<PartialSerialConfig>,

    /// Source information for error reporting (not serialized)
    #[serde(skip)]
    pub source: Option<SourceInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialLoggingConfig {
    pub level: Option<toml::Spanned<LogLevel>>,
    pub overrides: Option<HashMap<String, toml::Spanned<LogLevel>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialServerConfig {
    pub listen: Option<toml::Spanned<String>>,
    pub port: Option<toml::Spanned<u16>>,
    pub static_dir: Option<toml::Spanned<PathBuf>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialStorageConfig {
    pub url: Option<toml::Spanned<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialSerialConfig {
    pub device: Option<toml::Spanned<PathBuf>>,
}

impl PartialConfig {
    /// Load a single config file without processing imports
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            error: e,
        })?;

        let mut config: PartialConfig = toml::from_str(&content).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            error: e,
        })?;

        config.source = Some(SourceInfo {
            file_path: path.to_path_buf(),
            content,
        });

        Ok(config)
    }

    /// Load config files with import resolution
    ///
    /// Returns all loaded configs in order (imports first, then parent)
    pub fn load_with_imports(paths: &[PathBuf]) -> Result<Vec<Self>, LoadError> {
        let mut visited = HashSet::new();
        let mut all_configs = Vec::new();

        for path in paths {
            Self::load_recursive(path, &mut visited, &mut all_configs)?;
        }

        Ok(all_configs)
    }

    fn load_recursive(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        configs: &mut Vec<Self>,
    ) -> Result<(), LoadError> {
        let canonical_path = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        if visited.contains(&canonical_path) {
            return Err(LoadError::ImportCycle {
                path: canonical_path.clone(),
                cycle: visited.iter().cloned().collect(),
            });
        }

        visited.insert(canonical_path.clone());

        let config = Self::from_file(path)?;

        // Depth-first, relative imports resolve against the importing file
        for import_path in &config.imports {
            let import_path_buf = PathBuf::from(import_path);
            let resolved_path = if import_path_buf.is_absolute() {
                import_path_buf
            } else {
                let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
                parent_dir.join(import_path_buf)
            };

            Self::load_recursive(&resolved_path, visited, configs)?;
        }

        configs.push(config);

        // Sibling branches may import the same file
        visited.remove(&canonical_path);

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.logging.is_none()
            && self.server.is_none()
            && self.storage.is_none()
            && self.serial.is_none()
            && self.imports.is_empty()
    }

    /// Merge multiple partial configs together
    ///
    /// Uses first-wins semantics: the first occurrence of a field is kept.
    /// Every later definition of the same field is recorded as an error, and
    /// merging continues so all conflicts are reported at once.
    pub fn merge<I>(configs: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = Self>,
    {
        let mut result = PartialConfig::default();
        let mut merger = Merger::default();
        let mut imports = Vec::new();

        for config in configs {
            imports.extend(config.imports.iter().cloned());

            let source_info = config.source.clone().unwrap_or_else(|| SourceInfo {
                file_path: PathBuf::from("<unknown>"),
                content: String::new(),
            });

            if config.is_empty() {
                merger.diagnostics.push(Diagnostic::Warning(Warning::EmptyConfig {
                    file_path: source_info.file_path.clone(),
                }));
            }

            if let Some(logging) = config.logging {
                let into = result.logging.get_or_insert_with(Default::default);
                merger.field(&source_info, "logging.level", &mut into.level, logging.level);

                if let Some(overrides) = logging.overrides {
                    let into_overrides = into.overrides.get_or_insert_with(HashMap::new);
                    for (target, level) in overrides {
                        let path = format!("logging.overrides.{}", target);
                        let mut slot = into_overrides.remove(&target);
                        merger.field(&source_info, &path, &mut slot, Some(level));
                        if let Some(level) = slot {
                            into_overrides.insert(target, level);
                        }
                    }
                }
            }

            if let Some(server) = config.server {
                let into = result.server.get_or_insert_with(Default::default);
                merger.field(&source_info, "server.listen", &mut into.listen, server.listen);
                merger.field(&source_info, "server.port", &mut into.port, server.port);
                merger.field(
                    &source_info,
                    "server.static_dir",
                    &mut into.static_dir,
                    server.static_dir,
                );
            }

            if let Some(storage) = config.storage {
                let into = result.storage.get_or_insert_with(Default::default);
                merger.field(&source_info, "storage.url", &mut into.url, storage.url);
            }

            if let Some(serial) = config.serial {
                let into = result.serial.get_or_insert_with(Default::default);
                merger.field(&source_info, "serial.device", &mut into.device, serial.device);
            }
        }

        result.imports = imports;

        (result, merger.diagnostics)
    }
}

/// Tracks where each field was first defined while merging
#[derive(Default)]
struct Merger {
    first_definitions: HashMap<String, MergeConflictLocation>,
    diagnostics: Vec<Diagnostic>,
}

impl Merger {
    /// Keep `value` in `into` unless `field_path` was already set by an earlier file
    fn field<T>(
        &mut self,
        source_info: &SourceInfo,
        field_path: &str,
        into: &mut Option<toml::Spanned<T>>,
        value: Option<toml::Spanned<T>>,
    ) {
        let Some(value) = value else {
            return;
        };

        let location = MergeConflictLocation {
            file_path: source_info.file_path.clone(),
            span: value.span(),
            content: source_info.content.clone(),
        };

        if let Some(prev_loc) = self.first_definitions.get(field_path) {
            self.diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                field_path: field_path.to_string(),
                message: format!("'{}' defined in multiple config files", field_path),
                conflicts: vec![prev_loc.clone(), location],
            })));
        } else {
            *into = Some(value);
            self.first_definitions.insert(field_path.to_string(), location);
        }
    }
}
