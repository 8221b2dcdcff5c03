//! Wraps `flow_ops::Autoscale` for the DAG: the kernel is generic over its
//! `ReplicaController` collaborator, which doesn't fit a homogeneous
//! `NodeKind` enum, so this newtype boxes it into a trait object instead.

use flow_ops::{Autoscale, ReplicaController};

pub struct DynReplicaController(pub Box<dyn ReplicaController>);

impl ReplicaController for DynReplicaController {
    fn current_replicas(&self, resource: &str) -> Option<i64> {
        self.0.current_replicas(resource)
    }

    fn set_replicas(&mut self, resource: &str, replicas: i64) -> Result<(), String> {
        self.0.set_replicas(resource, replicas)
    }
}

pub struct AutoscaleConfig {
    pub inner: Autoscale<DynReplicaController>,
}

impl AutoscaleConfig {
    pub fn new(
        resource_tag: impl Into<String>,
        replicas_field: impl Into<String>,
        min: i64,
        max: i64,
        controller: Box<dyn ReplicaController>,
    ) -> Self {
        Self {
            inner: Autoscale::new(resource_tag, replicas_field, min, max, DynReplicaController(controller)),
        }
    }
}

impl flow_ops::Operator for AutoscaleConfig {
    fn process(&mut self, msg: flow_core::Message) -> Vec<flow_core::Message> {
        self.inner.process(msg)
    }
}
