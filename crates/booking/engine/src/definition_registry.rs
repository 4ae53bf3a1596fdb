//! Definition registry: the static table of workflow definitions
//!
//! Definitions are loaded once at startup and never change afterwards.
//! The registry indexes them by id, by triggering event type, and by the
//! event types that cancel them.

use crate::definition::WorkflowDefinition;
use booking_types::{DefinitionId, EventType, WorkflowError, WorkflowResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of workflow definitions
#[derive(Clone, Debug, Default)]
pub struct DefinitionRegistry {
    /// All registered definitions, keyed by ID
    definitions: HashMap<DefinitionId, Arc<WorkflowDefinition>>,
    /// Registration order, for stable dispatch order
    order: Vec<DefinitionId>,
    /// Index by trigger event type
    by_trigger: HashMap<EventType, Vec<DefinitionId>>,
}

impl DefinitionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow definition
    ///
    /// Validates the definition before storing. Ids must be unique.
    pub fn register(&mut self, definition: WorkflowDefinition) -> WorkflowResult<DefinitionId> {
        definition.validate()?;

        let id = definition.id.clone();
        if self.definitions.contains_key(&id) {
            return Err(WorkflowError::DuplicateDefinition(id));
        }

        self.by_trigger
            .entry(definition.trigger)
            .or_default()
            .push(id.clone());
        self.order.push(id.clone());

        tracing::info!(
            definition_id = %id,
            trigger = %definition.trigger,
            steps = definition.steps.len(),
            "Workflow definition registered"
        );
        self.definitions.insert(id.clone(), Arc::new(definition));
        Ok(id)
    }

    /// Get a definition by ID
    pub fn get(&self, id: &DefinitionId) -> WorkflowResult<Arc<WorkflowDefinition>> {
        self.definitions
            .get(id)
            .cloned()
            .ok_or_else(|| WorkflowError::DefinitionNotFound(id.clone()))
    }

    /// Definitions started by the given event type, in registration order
    pub fn triggered_by(&self, event_type: EventType) -> Vec<Arc<WorkflowDefinition>> {
        self.by_trigger
            .get(&event_type)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.definitions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Definitions whose in-flight runs the given event type cancels
    pub fn cancellable_by(&self, event_type: EventType) -> Vec<Arc<WorkflowDefinition>> {
        self.order
            .iter()
            .filter_map(|id| self.definitions.get(id))
            .filter(|def| def.is_cancelled_by(event_type))
            .cloned()
            .collect()
    }

    /// List all registered definitions in registration order
    pub fn list(&self) -> Vec<Arc<WorkflowDefinition>> {
        self.order
            .iter()
            .filter_map(|id| self.definitions.get(id).cloned())
            .collect()
    }

    /// Total number of registered definitions
    pub fn count(&self) -> usize {
        self.definitions.len()
    }

    /// Check if a definition exists
    pub fn contains(&self, id: &DefinitionId) -> bool {
        self.definitions.contains_key(id)
    }
}
