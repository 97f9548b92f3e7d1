use std::{sync::Arc, time::Duration};

use crate::{
    config::GalleryConfig, ConfigError, Gallery, Limits, MediaKind, MetadataIndex, ObjectStore,
};

/// Builder for configuring a [`Gallery`].
///
/// Leaving the index unset selects directory-scan listings and disables
/// reconciliation.
#[derive(Debug, Clone, Default)]
pub struct GalleryBuilder {
    config: GalleryConfig,
    store: Option<Arc<dyn ObjectStore>>,
    index: Option<Arc<dyn MetadataIndex>>,
}

impl GalleryBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current builder configuration snapshot.
    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    /// Sets the object store.
    pub fn storage<S: ObjectStore + 'static>(self, store: S) -> Self {
        self.shared_storage(Arc::new(store))
    }

    /// Sets an already shared object store.
    pub fn shared_storage(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the metadata index.
    pub fn index<I: MetadataIndex + 'static>(self, index: I) -> Self {
        self.shared_index(Arc::new(index))
    }

    /// Sets an already shared metadata index.
    pub fn shared_index(mut self, index: Arc<dyn MetadataIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, config: GalleryConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces all request limits.
    pub fn limits(mut self, limits: Limits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Sets the per-file size ceiling in bytes.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.limits.max_file_size = Some(bytes);
        self
    }

    /// Sets the request body ceiling in bytes.
    pub fn max_body_size(mut self, bytes: u64) -> Self {
        self.config.limits.max_body_size = Some(bytes);
        self
    }

    /// Sets the maximum number of files per request.
    pub fn max_files(mut self, count: usize) -> Self {
        self.config.limits.max_files = Some(count);
        self
    }

    /// Sets the concurrency ceiling for per-file work.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Sets the pause between reconciliation passes.
    pub fn reconcile_interval(mut self, interval: Duration) -> Self {
        self.config.reconcile_interval = interval;
        self
    }

    /// Sets the deadline for each index call.
    pub fn index_timeout(mut self, timeout: Duration) -> Self {
        self.config.index_timeout = timeout;
        self
    }

    /// Restricts the accepted media kinds.
    pub fn allowed_kinds(mut self, kinds: impl IntoIterator<Item = MediaKind>) -> Self {
        self.config.allowed_kinds = kinds.into_iter().collect();
        self
    }

    /// Sets the multipart field carrying files.
    pub fn file_field(mut self, field: impl Into<String>) -> Self {
        self.config.file_field = field.into();
        self
    }

    /// Validates the configuration and builds the gallery.
    pub fn build(self) -> Result<Gallery, ConfigError> {
        self.config.validate()?;
        let store = self.store.ok_or(ConfigError::MissingStorage)?;
        Ok(Gallery::from_parts(self.config, store, self.index))
    }
}
