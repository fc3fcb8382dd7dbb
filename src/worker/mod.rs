//! Background jobs against the search backend.
//!
//! # Architecture
//!
//! - `backend`: The [`SearchBackend`] contract implemented by the transport
//! - `handler`: [`SearchWorker`], which runs jobs under admission control

pub mod backend;
pub mod handler;

pub use backend::SearchBackend;
pub use handler::SearchWorker;
