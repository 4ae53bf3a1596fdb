//! Booking lifecycle orchestration engine
//!
//! Reacts to booking status changes by running multi-step, long-lived,
//! cancellable workflows that send notifications and eventually force a
//! terminal booking status.
//!
//! # Architecture
//!
//! - [`Dispatcher`]: turns [`DomainEvent`](booking_types::DomainEvent)s into
//!   new runs and cancellation signals
//! - [`Scheduler`]: drives a run through its steps from the persisted
//!   cursor, memoising every step result by name
//! - [`DurableTimerService`]: wake-ups for sleeping runs, rebuilt from
//!   storage on every start
//! - [`CancellationRegistry`]: `(event type, correlation key)` to runs,
//!   cancelled with compare-and-swap status writes
//! - [`BookingOrchestrator`]: the facade composing all of the above
//!
//! Concrete booking workflows live in [`workflows`].

#![deny(unsafe_code)]

pub mod cancellation;
pub mod clock;
pub mod config;
pub mod definition;
pub mod definition_registry;
pub mod dispatcher;
pub mod notification;
pub mod orchestrator;
pub mod profile;
pub mod scheduler;
pub mod storage;
pub mod timer;
pub mod workflows;

pub use cancellation::CancellationRegistry;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use definition::{
    Action, ActionError, RetryPolicy, StepContext, StepSpec, WakeResolver, WorkflowDefinition,
};
pub use definition_registry::DefinitionRegistry;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use notification::{
    EmailMessage, HttpNotificationGateway, LogNotificationGateway, Notification,
    NotificationError, NotificationGateway, SmsMessage,
};
pub use orchestrator::{BookingOrchestrator, RecoveryReport};
pub use profile::{AccountRef, NoopProfileDirectory, ProfileDirectory, ProfileError};
pub use scheduler::{DriveOutcome, Scheduler};
pub use storage::{BookingStore, InMemoryStore, RunStore, StorageError, WriteOutcome};
pub use timer::DurableTimerService;
pub use workflows::{standard_registry, WorkflowDeps};
