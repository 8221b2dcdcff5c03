//! K8s-style autoscale node (spec §4.8). Consumes a stream edge whose
//! points carry a resource-name tag and a desired-replicas field; clamps
//! against `[min, max]` and, when the desired count differs from the
//! current one (read through an injected collaborator), requests an
//! update and emits an `(old, new)` pair.

use flow_core::{Message, Point, Value};

use crate::operator::Operator;

/// The external collaborator (spec §6) this node reads current replica
/// counts from and issues scale requests to. Out of scope to implement a
/// concrete client against any particular orchestrator here.
pub trait ReplicaController: Send {
    fn current_replicas(&self, resource: &str) -> Option<i64>;
    fn set_replicas(&mut self, resource: &str, replicas: i64) -> Result<(), String>;
}

pub struct Autoscale<C: ReplicaController> {
    pub resource_tag: String,
    pub replicas_field: String,
    pub min: i64,
    pub max: i64,
    controller: C,
}

impl<C: ReplicaController> Autoscale<C> {
    pub fn new(resource_tag: impl Into<String>, replicas_field: impl Into<String>, min: i64, max: i64, controller: C) -> Self {
        Self {
            resource_tag: resource_tag.into(),
            replicas_field: replicas_field.into(),
            min,
            max,
            controller,
        }
    }
}

impl<C: ReplicaController> Operator for Autoscale<C> {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        let Message::Point(p) = &msg else { return vec![msg] };
        let Some(resource) = p.tag(&self.resource_tag) else {
            return Vec::new();
        };
        let Some(desired_raw) = p.field(&self.replicas_field).and_then(Value::as_i64) else {
            return Vec::new();
        };
        let desired = desired_raw.clamp(self.min, self.max);
        let Some(current) = self.controller.current_replicas(resource) else {
            tracing::warn!(%resource, "autoscale: resource not found in controller");
            return Vec::new();
        };
        if desired == current {
            return Vec::new();
        }
        if let Err(e) = self.controller.set_replicas(resource, desired) {
            tracing::warn!(%resource, error = %e, "autoscale: replica update failed");
            return Vec::new();
        }
        vec![Message::Point(
            Point::new(p.measurement.clone(), p.time)
                .with_tags(p.tags.clone())
                .with_field("old", current)
                .with_field("new", desired),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::Tags;
    use std::collections::HashMap;

    struct FakeController {
        replicas: HashMap<String, i64>,
    }

    impl ReplicaController for FakeController {
        fn current_replicas(&self, resource: &str) -> Option<i64> {
            self.replicas.get(resource).copied()
        }
        fn set_replicas(&mut self, resource: &str, replicas: i64) -> Result<(), String> {
            self.replicas.insert(resource.to_string(), replicas);
            Ok(())
        }
    }

    #[test]
    fn clamps_and_emits_old_new_pair() {
        let mut controller = FakeController { replicas: HashMap::new() };
        controller.replicas.insert("web".to_string(), 2);
        let mut op = Autoscale::new("resource", "replicas", 1, 5, controller);

        let p = Point::new("autoscale", 0)
            .with_tags(Tags::from_pairs([("resource", "web")]))
            .with_field("replicas", 100i64);
        let out = op.process(Message::Point(p));
        let Message::Point(result) = &out[0] else { panic!() };
        assert_eq!(result.field("old").and_then(Value::as_i64), Some(2));
        assert_eq!(result.field("new").and_then(Value::as_i64), Some(5));
    }

    #[test]
    fn no_emit_when_already_at_desired() {
        let mut controller = FakeController { replicas: HashMap::new() };
        controller.replicas.insert("web".to_string(), 3);
        let mut op = Autoscale::new("resource", "replicas", 1, 5, controller);

        let p = Point::new("autoscale", 0)
            .with_tags(Tags::from_pairs([("resource", "web")]))
            .with_field("replicas", 3i64);
        assert!(op.process(Message::Point(p)).is_empty());
    }
}
