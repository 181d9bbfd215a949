use log::info;

use crate::config::DirectoryConfig;
use crate::directory_service::DirectoryService;
use crate::error::DirectoryError;
use crate::kv_backend::LmdbBackend;
use crate::resolver::Resolver;

/// An LMDB-backed directory as handed across the FFI boundary.
pub struct DirectoryState {
    pub name: String,
    pub config: DirectoryConfig,
    resolver: Resolver<LmdbBackend>,
}

impl DirectoryState {
    pub fn with_config(name: String, config: DirectoryConfig) -> Result<Self, DirectoryError> {
        let backend = LmdbBackend::open(&name, config.map_size)?;
        let service = DirectoryService::new(backend, &config);
        info!("Directory '{name}' ready (chunk limit {} bytes)", config.chunk_limit);

        Ok(Self {
            name,
            config,
            resolver: Resolver::new(service),
        })
    }

    pub fn resolver(&self) -> &Resolver<LmdbBackend> {
        &self.resolver
    }

    pub fn service(&self) -> &DirectoryService<LmdbBackend> {
        self.resolver.service()
    }

    /// Flushes pending writes. The environment itself closes on drop.
    pub fn close(&self) -> Result<(), DirectoryError> {
        self.service().store().backend().sync()?;
        info!("Directory '{}' flushed", self.name);
        Ok(())
    }
}
