//! Presentation-facing view models.
//!
//! Rendering itself happens outside this crate. This module turns a state
//! snapshot into display-ready values:
//!
//! ```text
//! StateEngine::get_snapshot → TableViewModel::compute → renderer
//! ```
//!
//! # Modules
//!
//! - [`viewmodel`]: View model types and their computation

pub mod viewmodel;

pub use viewmodel::{EmptyState, FieldItem, FieldListInfo, FooterInfo, HeaderInfo, TableViewModel};
