//! # Swatchbook
//!
//! Backend for a materials-sample catalog: samples are organized into shared
//! collections, and collection owners invite collaborators through
//! tokenized links. Usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use swatchbook::server::{AppState, create_router};
//! use swatchbook::service::InviteSettings;
//! use swatchbook::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new("./data/swatchbook.db").unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store), InviteSettings::default()));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `swatchbook` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod service;
pub mod store;
pub mod types;
