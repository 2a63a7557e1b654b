//! Trigger matching: deciding whether an event starts a run.
//!
//! A flow definition carries trigger configurations (push, pull_request,
//! manual). When an event arrives, the first matching trigger selects the
//! run; if none matches, the flow is not started at all.

use lamel_types::flow::{FlowDefinition, TriggerConfig, TriggerEvent};

/// Find the first trigger in `def` that fires for `event`.
///
/// Returns `None` when the event does not start this flow (e.g. a push to a
/// branch the flow does not watch).
pub fn matching_trigger<'a>(
    def: &'a FlowDefinition,
    event: &TriggerEvent,
) -> Option<&'a TriggerConfig> {
    def.triggers.iter().find(|trigger| trigger.matches(event))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
