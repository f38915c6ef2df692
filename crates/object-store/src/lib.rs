//! Content-addressed bundle storage
//!
//! A bundle is a flat, directory-like set of named byte blobs. Uploading a
//! bundle stores every blob under its BLAKE3 hash and a canonical index
//! under the bundle's content address (a CIDv1). Bundles are immutable once
//! uploaded.
//!
//! # Features
//!
//! - Multiple storage backends: S3, MinIO, local filesystem, in-memory
//! - SQLite bookkeeping for uploaded bundles and pins
//!
//! # Example
//!
//! ```rust,no_run
//! use dchannel_object_store::{Bundle, ObjectStore};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), dchannel_object_store::BundleStoreError> {
//! let store = ObjectStore::new_local(Path::new("/tmp/bundles")).await?;
//!
//! let mut bundle = Bundle::new();
//! bundle.insert("meta.json", b"{}".to_vec());
//! let address = store.upload(bundle).await?;
//! let meta = store.get_file(&address, "meta.json").await?;
//! # Ok(())
//! # }
//! ```

mod address;
mod database;
mod error;
mod storage;
mod store;

pub use address::{AddressError, ContentAddress};
pub use error::{BundleStoreError, Result};
pub use storage::ObjectStoreConfig;
pub use store::{Bundle, BundleEntry, ObjectStore};
