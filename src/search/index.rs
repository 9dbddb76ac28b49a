//! Search index lifecycle management

use crate::search::config::SearchConfig;
use crate::search::document::{IndexMapping, IndexSettings};
use crate::search::engine::SearchEngine;
use crate::search::error::{EngineError, SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Result of a create request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateOutcome {
    Created,
    /// The index was already there; nothing was changed
    AlreadyExists,
}

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum DeleteOutcome {
    Deleted { acknowledged: bool },
    /// Advisory only: the index did not exist
    NotFound,
}

/// Creates, deletes and probes the managed index
pub struct IndexManager {
    engine: Arc<dyn SearchEngine>,
    index_name: String,
    settings: IndexSettings,
    mapping: IndexMapping,
}

impl IndexManager {
    pub fn new(engine: Arc<dyn SearchEngine>, config: &SearchConfig) -> Self {
        Self {
            engine,
            index_name: config.index_name.clone(),
            settings: config.settings.clone(),
            mapping: config.mapping.clone(),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Create the configured index unless it already exists
    pub async fn create_index(&self) -> SearchResult<CreateOutcome> {
        if self.exists_index(&self.index_name).await? {
            info!(index = %self.index_name, "Index already exists");
            return Ok(CreateOutcome::AlreadyExists);
        }

        match self
            .engine
            .create_index(&self.index_name, &self.settings, &self.mapping)
            .await
        {
            Ok(()) => {
                info!(
                    index = %self.index_name,
                    shards = self.settings.number_of_shards,
                    replicas = self.settings.number_of_replicas,
                    "Index created"
                );
                Ok(CreateOutcome::Created)
            }
            // Lost a race with another creator
            Err(e) if e.is_already_exists() => {
                info!(index = %self.index_name, "Index already exists");
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(provisioning("create", &self.index_name, e)),
        }
    }

    /// Delete an index by name.
    ///
    /// A missing index is logged and reported as [`DeleteOutcome::NotFound`],
    /// not as an error.
    pub async fn delete_index(&self, name: &str) -> SearchResult<DeleteOutcome> {
        if !self.exists_index(name).await? {
            error!(index = %name, "Cannot delete index, it does not exist");
            return Ok(DeleteOutcome::NotFound);
        }

        match self.engine.delete_index(name).await {
            Ok(acknowledged) => {
                info!(index = %name, acknowledged, "Index deleted");
                Ok(DeleteOutcome::Deleted { acknowledged })
            }
            Err(e) if e.is_not_found() => {
                error!(index = %name, "Cannot delete index, it does not exist");
                Ok(DeleteOutcome::NotFound)
            }
            Err(e) => Err(provisioning("delete", name, e)),
        }
    }

    /// Check whether an index exists
    pub async fn exists_index(&self, name: &str) -> SearchResult<bool> {
        self.engine
            .exists(name)
            .await
            .map_err(|e| provisioning("probe", name, e))
    }
}

fn provisioning(action: &str, index: &str, err: EngineError) -> SearchError {
    error!(index = %index, action, error = %err, "Index provisioning failed");
    SearchError::Provisioning(format!("failed to {} index {}: {}", action, index, err))
}
