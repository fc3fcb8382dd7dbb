//! Application layer coordinating state, events, and actions.
//!
//! This module sits between the presentation layer and the worker. It owns
//! the application state and implements the event-driven flow of the
//! dashboard.
//!
//! # Architecture
//!
//! The application layer follows a unidirectional data flow pattern:
//!
//! ```text
//! User Input → Events → Event Handler → State Engine → Actions → Worker
//!                           ↑                                      ↓
//!                           └────────── Completion Events ─────────┘
//! ```
//!
//! # Modules
//!
//! - [`actions`]: Backend jobs emitted by the event handler
//! - [`engine`]: Transactional state owner with validators and hooks
//! - [`handler`]: Event processing and state transition coordinator
//! - [`operations`]: Named state operations and targeted getters
//! - [`state`]: The application state aggregate

pub mod actions;
pub mod engine;
pub mod handler;
pub mod operations;
pub mod state;

pub use actions::Action;
pub use engine::{core_invariants, StateEngine, StateEngineBuilder, StateValidator, UpdateHook};
pub use handler::{handle_event, search_action, Event};
pub use state::{ApplicationState, CancelHandle, DataState, MiscState, Pagination, SearchState, UiState};
