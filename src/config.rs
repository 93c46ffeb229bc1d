//! Configuration management for english.
//!
//! Configuration is stored in `~/.english/config.txt` as `key=value` lines.
//! Only `api_key`, `model` and `endpoint` are recognized; anything else is
//! dropped on load and never written back.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_DIR_NAME: &str = ".english";
const CONFIG_FILE_NAME: &str = "config.txt";

/// Model used when none has been set.
pub const DEFAULT_MODEL: &str = "llama3";

/// Ollama generate endpoint used when none has been set.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/api/generate";

/// Persisted settings. Unset fields resolve to their defaults through the
/// accessor methods; an unset api key stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    api_key: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
}

impl Configuration {
    /// The API key, if one has been set.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// The model name, falling back to [`DEFAULT_MODEL`].
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// The endpoint URL, falling back to [`DEFAULT_ENDPOINT`].
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    /// Per-invocation overrides that are never persisted.
    pub fn with_overrides(mut self, model: Option<String>, endpoint: Option<String>) -> Self {
        if let Some(model) = model.filter(|m| !m.is_empty()) {
            self.model = Some(model);
        }
        if let Some(endpoint) = endpoint.filter(|e| !e.is_empty()) {
            self.endpoint = Some(endpoint);
        }
        self
    }

    /// Parse the `key=value` file format. Lines without `=` and unknown keys
    /// are skipped. Empty values count as unset.
    pub fn parse(contents: &str) -> Self {
        let mut config = Self::default();
        for line in contents.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = (!value.is_empty()).then(|| value.to_string());
            match key {
                "api_key" => config.api_key = value,
                "model" => config.model = value,
                "endpoint" => config.endpoint = value,
                other => debug!("Ignoring unknown config key: {}", other),
            }
        }
        config
    }

    /// Render to the `key=value` file format, omitting unset keys.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let fields = [
            ("api_key", &self.api_key),
            ("model", &self.model),
            ("endpoint", &self.endpoint),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                out.push_str(key);
                out.push('=');
                out.push_str(value);
                out.push('\n');
            }
        }
        out
    }
}

/// Which field a setter writes.
#[derive(Debug, Clone, Copy)]
enum Field {
    ApiKey,
    Model,
    Endpoint,
}

impl Field {
    fn name(self) -> &'static str {
        match self {
            Field::ApiKey => "api_key",
            Field::Model => "model",
            Field::Endpoint => "endpoint",
        }
    }

    fn slot(self, config: &mut Configuration) -> &mut Option<String> {
        match self {
            Field::ApiKey => &mut config.api_key,
            Field::Model => &mut config.model,
            Field::Endpoint => &mut config.endpoint,
        }
    }
}

/// A [`Configuration`] bound to its file on disk. Every setter writes the
/// file before returning.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: Configuration,
}

impl ConfigStore {
    /// Get the default config directory path (`~/.english`).
    pub fn config_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|p| p.join(CONFIG_DIR_NAME))
            .ok_or_else(|| Error::config_io(CONFIG_DIR_NAME, "could not determine home directory"))
    }

    /// Open the store in the default per-user location.
    pub fn open() -> Result<Self> {
        Self::open_in(Self::config_dir()?)
    }

    /// Open the store rooted at `dir`, creating the directory if needed.
    pub fn open_in(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        ensure_config_dir(&dir)?;
        let path = dir.join(CONFIG_FILE_NAME);
        let config = load(&path);
        Ok(Self { path, config })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn api_key(&self) -> Option<&str> {
        self.config.api_key()
    }

    pub fn model(&self) -> &str {
        self.config.model()
    }

    pub fn endpoint(&self) -> &str {
        self.config.endpoint()
    }

    pub fn set_api_key(&mut self, value: &str) -> Result<()> {
        self.set(Field::ApiKey, value)
    }

    pub fn set_model(&mut self, value: &str) -> Result<()> {
        self.set(Field::Model, value)
    }

    pub fn set_endpoint(&mut self, value: &str) -> Result<()> {
        self.set(Field::Endpoint, value)
    }

    /// Update one field and persist. If the write fails the previous value is
    /// restored, so memory never holds a value the file does not.
    fn set(&mut self, field: Field, value: &str) -> Result<()> {
        if value.is_empty() {
            return Err(Error::InvalidInput(format!("{} must not be empty", field.name())));
        }
        // One value per line: a line break would split it and smuggle in other keys.
        if value.contains(['\n', '\r']) {
            return Err(Error::InvalidInput(format!(
                "{} must not contain line breaks",
                field.name()
            )));
        }

        let previous = field.slot(&mut self.config).replace(value.to_string());
        if let Err(e) = self.save() {
            *field.slot(&mut self.config) = previous;
            return Err(e);
        }
        debug!("Saved {} to {}", field.name(), self.path.display());
        Ok(())
    }

    /// Save configuration to file.
    fn save(&self) -> Result<()> {
        std::fs::write(&self.path, self.config.render()).map_err(|e| {
            Error::config_io_source(&self.path, "could not open file for writing", e)
        })
    }
}

/// Load configuration from file, using defaults if it is missing or unreadable.
pub fn load(path: &Path) -> Configuration {
    match std::fs::read_to_string(path) {
        Ok(contents) => Configuration::parse(&contents),
        Err(e) => {
            debug!("No config loaded from {}: {}", path.display(), e);
            Configuration::default()
        }
    }
}

/// Make sure `dir` exists and is a directory, creating it owner-only if absent.
fn ensure_config_dir(dir: &Path) -> Result<()> {
    match std::fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => return Err(Error::config_io(dir, "exists but is not a directory")),
        Err(_) => {}
    }

    let mut builder = std::fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .map_err(|e| Error::config_io_source(dir, "could not create directory", e))?;
    debug!("Created config directory {}", dir.display());
    Ok(())
}
