use std::sync::Arc;

use crate::error::Result;
use crate::index::inmem::InMemMetadataStore;
use crate::store::{MetadataStore, StoreParams};
use crate::store_fs::FsMetadataStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Fs,
    /// Volatile; `params.root` is ignored.
    InMem,
}

pub fn open_store(backend: Backend, p: StoreParams) -> Result<Arc<dyn MetadataStore>> {
    match backend {
        Backend::Fs => Ok(Arc::new(FsMetadataStore::new(p)?)),
        Backend::InMem => Ok(Arc::new(InMemMetadataStore::new())),
    }
}
