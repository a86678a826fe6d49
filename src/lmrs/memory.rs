use crate::perception::LateralDirection;
use crate::VehicleId;
use smallvec::SmallVec;

/// State a driver carries from one decision step to the next.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LaneChangeMemory {
    /// The leaders seen in the previous step, to detect a new leader.
    pub(crate) leaders: SmallVec<[VehicleId; 4]>,
    /// The vehicle the active synchronization currently targets.
    pub(crate) sync_target: Option<VehicleId>,
    /// The lane change in progress, if any.
    pub(crate) lane_change: Option<LaneChangeManeuver>,
    /// The number of completed decision steps.
    pub(crate) steps: u64,
}

/// A lane change in progress.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LaneChangeManeuver {
    pub direction: LateralDirection,
    /// Time since initiation in s.
    pub elapsed: f64,
}

impl LaneChangeMemory {
    /// The leaders seen in the previous step.
    pub fn leaders(&self) -> &[VehicleId] {
        &self.leaders
    }

    /// The current synchronization target.
    pub fn sync_target(&self) -> Option<VehicleId> {
        self.sync_target
    }

    /// The lane change in progress.
    pub fn lane_change(&self) -> Option<LaneChangeManeuver> {
        self.lane_change
    }

    /// Whether a lane change is in progress.
    pub fn is_changing_lane(&self) -> bool {
        self.lane_change.is_some()
    }

    /// The number of completed decision steps.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Whether the vehicle was seen as leader in the previous step.
    pub(crate) fn has_seen(&self, id: VehicleId) -> bool {
        self.leaders.contains(&id)
    }
}

impl LaneChangeManeuver {
    pub fn new(direction: LateralDirection) -> Self {
        Self {
            direction,
            elapsed: 0.0,
        }
    }

    /// Advances the maneuver by `dt`, returning `None` once `duration` has elapsed.
    pub fn advance(self, dt: f64, duration: f64) -> Option<Self> {
        let elapsed = self.elapsed + dt;
        (elapsed < duration).then_some(Self { elapsed, ..self })
    }
}
