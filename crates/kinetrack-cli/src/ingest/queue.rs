//! Multi-producer, single-consumer observation queues.
//!
//! The network (or replay) thread sends; the frame loop drains without ever
//! blocking.

use crossbeam_channel::{unbounded, Receiver, Sender};
use kinetrack_predict::JointId;
use kinetrack_rig::Vec3;

/// One routed observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub bone: String,
    pub joint: JointId,
    pub position: Vec3,
}

impl Observation {
    pub fn new(bone: impl Into<String>, joint: JointId, position: Vec3) -> Self {
        Self {
            bone: bone.into(),
            joint,
            position,
        }
    }
}

/// Producer half. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ObservationSender {
    inner: Sender<Observation>,
}

impl ObservationSender {
    /// Enqueues without blocking. Returns `false` once the consumer is gone.
    pub fn send(&self, observation: Observation) -> bool {
        self.inner.send(observation).is_ok()
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct ObservationReceiver {
    inner: Receiver<Observation>,
}

impl ObservationReceiver {
    /// Next queued observation, or `None` if the queue is currently empty.
    pub fn try_dequeue(&self) -> Option<Observation> {
        self.inner.try_recv().ok()
    }

    /// Everything queued right now, in arrival order.
    pub fn drain(&self) -> Vec<Observation> {
        self.inner.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Creates a connected unbounded queue.
pub fn observation_queue() -> (ObservationSender, ObservationReceiver) {
    let (tx, rx) = unbounded();
    (ObservationSender { inner: tx }, ObservationReceiver { inner: rx })
}
