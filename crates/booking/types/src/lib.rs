//! Domain types for the booking lifecycle engine
//!
//! The engine reacts to booking status changes by running long-lived,
//! cancellable workflows. This crate holds the vocabulary shared by the
//! engine and its hosts:
//!
//! - [`DomainEvent`] / [`EventType`]: inbound booking events
//! - [`WorkflowRun`] / [`RunStatus`] / [`StepHistory`]: persisted run state
//! - [`Booking`] / [`BookingStatus`] / [`BookingPayload`]: the externally
//!   owned booking entity and the payload shape events carry
//! - [`SlotClock`]: conversion of stored slot strings into UTC instants

#![deny(unsafe_code)]

pub mod booking;
pub mod event;
pub mod ids;
pub mod run;
pub mod slot;

pub use booking::{Booking, BookingPayload, BookingSnapshot, BookingStatus, Listing, Party, RedeemType};
pub use event::{DomainEvent, EventType};
pub use ids::{CorrelationKey, DefinitionId, RunId};
pub use run::{RunStatus, StepHistory, StepRecord, WorkflowRun};
pub use slot::SlotClock;

/// Errors raised by workflow definitions, runs and the engine around them
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow definition not found: {0}")]
    DefinitionNotFound(DefinitionId),

    #[error("Workflow definition already registered: {0}")]
    DuplicateDefinition(DefinitionId),

    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("Workflow run not found: {0}")]
    RunNotFound(RunId),

    #[error("Invalid run transition from {from} to {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error("Invalid time slot '{0}'")]
    InvalidSlot(String),

    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;
