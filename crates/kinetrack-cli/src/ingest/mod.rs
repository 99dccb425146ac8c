//! Landmark ingestion.
//!
//! Decoded landmarks are routed onto one queue per stream. Streams are
//! independent: nothing orders observations across them.

pub mod landmarks;
pub mod queue;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use kinetrack_rig::Side;

pub use landmarks::{Landmark, LandmarkKind};
pub use queue::{observation_queue, Observation, ObservationReceiver, ObservationSender};

/// Observation stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    LeftHand,
    RightHand,
    LeftPose,
    RightPose,
    Body,
}

impl Stream {
    pub const ALL: [Stream; 5] = [
        Stream::LeftHand,
        Stream::RightHand,
        Stream::LeftPose,
        Stream::RightPose,
        Stream::Body,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::LeftHand => "left_hand",
            Stream::RightHand => "right_hand",
            Stream::LeftPose => "left_pose",
            Stream::RightPose => "right_pose",
            Stream::Body => "body",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    /// Stream a landmark belongs on. Hands without a recognised label are
    /// dropped. Pose landmarks follow the side of the bone they drive; a
    /// `side` field contradicting that bone drops the landmark, and central
    /// bones go to the body stream.
    pub fn route(landmark: &Landmark) -> Option<Stream> {
        match landmark.kind {
            LandmarkKind::Hand => match landmark.resolved_side()? {
                Side::Left => Some(Stream::LeftHand),
                Side::Right => Some(Stream::RightHand),
            },
            LandmarkKind::Pose => {
                let bone_side = landmark.bone_name().as_deref().and_then(bone_side);
                match (landmark.resolved_side(), bone_side) {
                    (Some(labelled), Some(side)) if labelled != side => None,
                    (_, Some(Side::Left)) => Some(Stream::LeftPose),
                    (_, Some(Side::Right)) => Some(Stream::RightPose),
                    (_, None) => Some(Stream::Body),
                }
            }
        }
    }
}

/// Side encoded in a bone name's `.L`/`.R` suffix.
fn bone_side(bone: &str) -> Option<Side> {
    [Side::Left, Side::Right]
        .into_iter()
        .find(|side| {
            bone.strip_suffix(side.suffix())
                .is_some_and(|rest| rest.ends_with('.'))
        })
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Producer side of every stream. Cloneable and `Send`.
#[derive(Debug, Clone)]
pub struct LandmarkRouter {
    senders: Vec<ObservationSender>,
}

impl LandmarkRouter {
    /// Routes one landmark. Returns the stream it was queued on, or `None`
    /// if it maps to no bone or no stream.
    pub fn route(&self, landmark: &Landmark) -> Option<Stream> {
        let Some(bone) = landmark.bone_name() else {
            trace!(id = landmark.id, kind = ?landmark.kind, "landmark maps to no bone");
            return None;
        };
        let Some(stream) = Stream::route(landmark) else {
            trace!(
                bone = %bone,
                side = ?landmark.resolved_side(),
                "landmark side missing or contradicts its bone"
            );
            return None;
        };
        let observation = Observation::new(bone, landmark.joint_id(), landmark.position());
        self.senders[stream.index()]
            .send(observation)
            .then_some(stream)
    }

    /// Routes a batch, returning how many landmarks were queued.
    pub fn route_all<'a, I>(&self, landmarks: I) -> usize
    where
        I: IntoIterator<Item = &'a Landmark>,
    {
        landmarks
            .into_iter()
            .filter(|landmark| self.route(landmark).is_some())
            .count()
    }
}

/// Consumer side: one queue per stream.
#[derive(Debug)]
pub struct IngestHub {
    receivers: Vec<ObservationReceiver>,
    router: LandmarkRouter,
}

impl Default for IngestHub {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestHub {
    pub fn new() -> Self {
        let (senders, receivers) = Stream::ALL.iter().map(|_| observation_queue()).unzip();
        Self {
            receivers,
            router: LandmarkRouter { senders },
        }
    }

    /// A router feeding this hub.
    pub fn router(&self) -> LandmarkRouter {
        self.router.clone()
    }

    pub fn receiver(&self, stream: Stream) -> &ObservationReceiver {
        &self.receivers[stream.index()]
    }

    /// Drains several streams into one batch, in stream order.
    pub fn drain(&self, streams: &[Stream]) -> Vec<Observation> {
        streams
            .iter()
            .flat_map(|stream| self.receiver(*stream).drain())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinetrack_rig::Vec3;

    #[test]
    fn test_routing_by_side() {
        let hub = IngestHub::new();
        let router = hub.router();
        let landmarks = [
            Landmark::hand(Side::Left, 0, Vec3::zeros()),
            Landmark::hand(Side::Right, 8, Vec3::x()),
            Landmark::pose(Some(Side::Right), 16, Vec3::y()),
            Landmark::pose(None, 0, Vec3::z()),
            // No bone for pose id 5.
            Landmark::pose(None, 5, Vec3::z()),
        ];
        assert_eq!(router.route_all(&landmarks), 4);

        assert_eq!(hub.receiver(Stream::LeftHand).len(), 1);
        assert_eq!(hub.receiver(Stream::RightHand).len(), 1);
        assert_eq!(hub.receiver(Stream::LeftPose).len(), 0);
        assert_eq!(hub.receiver(Stream::RightPose).len(), 1);
        let body = hub.receiver(Stream::Body).drain();
        assert_eq!(body[0].bone, "B-head");
        assert_eq!(body[0].joint, 100);
    }

    #[test]
    fn test_pose_side_follows_bone() {
        // Right shoulder labelled left: contradictory, dropped.
        assert_eq!(Stream::route(&Landmark::pose(Some(Side::Left), 12, Vec3::zeros())), None);
        // Unlabelled arm landmarks still reach their arm.
        assert_eq!(
            Stream::route(&Landmark::pose(None, 15, Vec3::zeros())),
            Some(Stream::LeftPose)
        );
        // Central bones ignore the label.
        assert_eq!(
            Stream::route(&Landmark::pose(Some(Side::Right), 0, Vec3::zeros())),
            Some(Stream::Body)
        );

        let hub = IngestHub::new();
        let router = hub.router();
        assert_eq!(router.route(&Landmark::pose(Some(Side::Right), 13, Vec3::zeros())), None);
        assert!(hub.drain(&Stream::ALL).is_empty());
    }

    #[test]
    fn test_drain_merges_streams() {
        let hub = IngestHub::new();
        let router = hub.router();
        router.route(&Landmark::pose(Some(Side::Right), 14, Vec3::zeros()));
        router.route(&Landmark::hand(Side::Right, 0, Vec3::zeros()));
        let batch = hub.drain(&[Stream::RightHand, Stream::RightPose]);
        let bones: Vec<_> = batch.iter().map(|o| o.bone.as_str()).collect();
        assert_eq!(bones, vec!["B-hand.R", "B-upperArm.R"]);
        assert!(hub.drain(&Stream::ALL).is_empty());
    }

    #[test]
    fn test_router_crosses_threads() {
        let hub = IngestHub::new();
        let router = hub.router();
        std::thread::spawn(move || {
            router.route(&Landmark::hand(Side::Left, 4, Vec3::zeros()));
        })
        .join()
        .unwrap();
        let observed = hub.receiver(Stream::LeftHand).try_dequeue().unwrap();
        assert_eq!(observed.bone, "B-thumbTip.L");
    }
}
