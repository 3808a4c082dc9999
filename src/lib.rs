//! Stockkeeper Library
//!
//! Inventory persistence over a Firestore document store: categories,
//! suppliers and products, each carrying an opaque document id and a stable
//! numeric id, read through tolerant mappers that accept legacy field names.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod connector;
pub mod errors;
pub mod ids;
pub mod mapper;
pub mod models;
pub mod repositories;
pub mod store;

pub use connector::{Connector, ConnectorError};
pub use errors::{ErrorKind, ServiceError};
pub use ids::{stable_hash, EntityId};
pub use models::{Category, NewCategory, NewProduct, NewSupplier, Product, ProductState, Supplier};
pub use repositories::{CategoryRepository, InventoryRepository, ProductRepository, SupplierRepository};
pub use store::{DocumentStore, InMemoryStore, StoreHandle};
