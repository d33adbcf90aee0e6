pub mod document_store;
pub mod sqlite_store;

pub use document_store::{
    decode, encode, load, load_all, load_versioned, save, DocumentStore, InMemoryDocumentStore,
    StoreError, StoredDocument,
};
pub use sqlite_store::SqliteDocumentStore;
