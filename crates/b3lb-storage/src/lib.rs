//! b3lb storage
//!
//! SQLite-backed persistence for the data model, plus the blob storage and
//! rendering traits that the recording pipeline treats as external
//! collaborators, and the environment-driven `Config`.

pub mod blob;
pub mod config;
pub mod render;
pub mod store;

pub use blob::{BlobStore, LocalBlobStore};
pub use config::Config;
pub use render::{NullRenderer, RenderedOutput, Renderer};
pub use store::Store;
