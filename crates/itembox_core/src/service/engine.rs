//! Engine bootstrap from configuration.

use super::item_box::ItemBox;
use super::owner::OwnerSession;
use super::template_registry::TemplateRegistry;
use crate::alloc::AllocError;
use crate::config::{ConfigError, EngineConfig};
use crate::logging::{init_logging, LoggingError};
use crate::model::owner::OwnerRef;
use crate::model::template::{ItemTemplate, TemplateError};
use crate::repo::{RepoError, SqliteItemStore};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub enum EngineError {
    Config(ConfigError),
    Logging(LoggingError),
    Repo(RepoError),
    Template(TemplateError),
    Alloc(AllocError),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Logging(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Template(err) => write!(f, "{err}"),
            Self::Alloc(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Logging(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Template(err) => Some(err),
            Self::Alloc(err) => Some(err),
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<LoggingError> for EngineError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<RepoError> for EngineError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<TemplateError> for EngineError {
    fn from(value: TemplateError) -> Self {
        Self::Template(value)
    }
}

impl From<AllocError> for EngineError {
    fn from(value: AllocError) -> Self {
        Self::Alloc(value)
    }
}

/// Store, template registry and session factory of one process.
pub struct Engine {
    store: Arc<SqliteItemStore>,
    templates: TemplateRegistry,
    sync_interval: Duration,
}

impl Engine {
    /// Starts logging (when configured), opens the store and seeds templates.
    pub fn start(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        if let Some(log_dir) = &config.log_dir {
            init_logging(&config.log_level, log_dir)?;
        }

        let store = match &config.database_path {
            Some(path) => SqliteItemStore::open(path)?,
            None => SqliteItemStore::open_in_memory()?,
        };
        let engine = Self::with_store(Arc::new(store), config.sync_interval());
        if let Some(path) = &config.templates_path {
            let seeded = engine.seed_templates(path)?;
            info!("event=template_seed module=engine status=ok count={seeded}");
        }
        Ok(engine)
    }

    pub fn with_store(store: Arc<SqliteItemStore>, sync_interval: Duration) -> Self {
        Self {
            templates: TemplateRegistry::new(Arc::clone(&store) as _),
            store,
            sync_interval,
        }
    }

    pub fn store(&self) -> &Arc<SqliteItemStore> {
        &self.store
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Saves every template of a JSON array file; returns how many.
    pub fn seed_templates(&self, path: impl AsRef<Path>) -> Result<usize, EngineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.seed_templates_json(&text)
    }

    pub fn seed_templates_json(&self, text: &str) -> Result<usize, EngineError> {
        let templates: Vec<ItemTemplate> =
            serde_json::from_str(text).map_err(ConfigError::Parse)?;
        for template in &templates {
            self.templates.save(template)?;
        }
        Ok(templates.len())
    }

    pub fn open_session(&self, owner: OwnerRef) -> Result<OwnerSession, EngineError> {
        Ok(OwnerSession::open(
            owner,
            Arc::clone(&self.store) as _,
            Arc::clone(&self.store) as _,
            self.sync_interval,
        )?)
    }

    /// Box of a non-session owner such as a building warehouse or bank cell.
    pub fn load_box(&self, owner: OwnerRef, need_sync: bool) -> ItemBox {
        ItemBox::init(Arc::clone(&self.store) as _, owner, need_sync)
    }
}
