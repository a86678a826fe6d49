//! The perception contract.
//!
//! Perception is gathered by the surrounding simulation before a driver's decision step and
//! is read-only during it. [PerceptionSnapshot] is a plain, fully materialised
//! implementation of the [Perception] trait.

use crate::driver::CarFollowingModel;
use crate::error::PerceptionError;
use crate::parameters::ParameterSet;
use crate::VehicleId;
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;

/// A lateral direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LateralDirection {
    Left,
    Right,
}

impl LateralDirection {
    /// Both directions, left first.
    pub const BOTH: [LateralDirection; 2] = [LateralDirection::Left, LateralDirection::Right];

    /// The opposite direction.
    pub fn flip(self) -> Self {
        match self {
            LateralDirection::Left => LateralDirection::Right,
            LateralDirection::Right => LateralDirection::Left,
        }
    }

    /// The adjacent lane in this direction.
    pub fn lane(self) -> RelativeLane {
        match self {
            LateralDirection::Left => RelativeLane::Left,
            LateralDirection::Right => RelativeLane::Right,
        }
    }

    fn idx(self) -> usize {
        match self {
            LateralDirection::Left => 0,
            LateralDirection::Right => 1,
        }
    }
}

/// A lane relative to the one the driver is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelativeLane {
    Left,
    Current,
    Right,
}

impl RelativeLane {
    fn idx(self) -> usize {
        match self {
            RelativeLane::Left => 0,
            RelativeLane::Current => 1,
            RelativeLane::Right => 2,
        }
    }
}

/// The state of the perceiving vehicle itself.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EgoState {
    /// Speed in m/s.
    pub speed: f64,
    /// Vehicle length in m.
    pub length: f64,
}

/// The speed limits applicable to the driver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeedLimitInfo {
    /// The legal speed limit in m/s.
    pub speed_limit: f64,
    /// The maximum speed of the vehicle in m/s.
    pub max_vehicle_speed: f64,
}

impl SpeedLimitInfo {
    pub fn new(speed_limit: f64, max_vehicle_speed: f64) -> Self {
        Self {
            speed_limit,
            max_vehicle_speed,
        }
    }
}

/// Mandatory lane change information for a lane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RouteInfo {
    /// The number of lane changes still required, starting from this lane.
    pub lane_changes: u32,
    /// The distance in m within which these lane changes must be completed,
    /// i.e. the distance to the end of the lane or the point of no return.
    pub remaining: f64,
}

impl RouteInfo {
    /// A lane on which the route continues without any lane change.
    pub const FREE: RouteInfo = RouteInfo {
        lane_changes: 0,
        remaining: f64::INFINITY,
    };

    pub fn new(lane_changes: u32, remaining: f64) -> Self {
        Self {
            lane_changes,
            remaining,
        }
    }
}

impl Default for RouteInfo {
    fn default() -> Self {
        Self::FREE
    }
}

/// A snapshot of a neighbouring vehicle.
#[derive(Clone)]
pub struct HeadwayObservation {
    /// The ID of the neighbour.
    pub id: VehicleId,
    /// The net distance in m, positive ahead of the perceiving vehicle and negative behind.
    pub distance: f64,
    /// The speed in m/s.
    pub speed: f64,
    /// The acceleration in m/s<sup>2</sup>.
    pub acceleration: f64,
    /// The length of the neighbour in m.
    pub length: f64,
    /// The neighbour's parameters as committed at the end of its previous step.
    pub parameters: ParameterSet,
    /// The neighbour's car-following model.
    pub car_following: Rc<dyn CarFollowingModel>,
    /// The speed limits applicable to the neighbour.
    pub speed_limit: SpeedLimitInfo,
}

impl HeadwayObservation {
    /// Creates an observation of a neighbour with zero acceleration and a length of 4.5 m.
    pub fn new(
        id: VehicleId,
        distance: f64,
        speed: f64,
        parameters: ParameterSet,
        car_following: Rc<dyn CarFollowingModel>,
        speed_limit: SpeedLimitInfo,
    ) -> Self {
        Self {
            id,
            distance,
            speed,
            acceleration: 0.0,
            length: 4.5,
            parameters,
            car_following,
            speed_limit,
        }
    }

    /// The absolute net gap in m.
    pub fn gap(&self) -> f64 {
        self.distance.abs()
    }

    /// Whether the neighbour is ahead.
    pub fn is_ahead(&self) -> bool {
        self.distance > 0.0
    }
}

impl fmt::Debug for HeadwayObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadwayObservation")
            .field("id", &self.id)
            .field("distance", &self.distance)
            .field("speed", &self.speed)
            .field("acceleration", &self.acceleration)
            .finish()
    }
}

/// Perception available to a driver during one decision step.
pub trait Perception {
    /// The perceiving vehicle's own state.
    fn ego(&self) -> Result<EgoState, PerceptionError>;

    /// The speed limits applicable to the perceiving vehicle.
    fn speed_limit(&self) -> Result<SpeedLimitInfo, PerceptionError>;

    /// Whether an adjacent lane exists in the given direction.
    fn has_lane(&self, dir: LateralDirection) -> bool;

    /// The leaders on a lane, ordered by increasing distance.
    fn leaders(&self, lane: RelativeLane) -> Result<&[HeadwayObservation], PerceptionError>;

    /// The followers on a lane, ordered by increasing gap.
    fn followers(&self, lane: RelativeLane) -> Result<&[HeadwayObservation], PerceptionError>;

    /// Whether a vehicle is alongside in the adjacent lane in the given direction.
    fn alongside(&self, dir: LateralDirection) -> Result<bool, PerceptionError>;

    /// Mandatory lane change information for a lane.
    fn route(&self, lane: RelativeLane) -> Result<RouteInfo, PerceptionError>;

    /// The legal lane change possibility towards `dir`. A positive value is the distance
    /// over which a lane change is allowed, a non-positive value is minus the distance
    /// until it becomes allowed.
    fn legal_lane_change(&self, dir: LateralDirection) -> Result<f64, PerceptionError>;

    /// Vehicles on a lane found upstream of a crossing or merging conflict area.
    fn upstream_of_conflicts(&self, lane: RelativeLane) -> Result<&[VehicleId], PerceptionError>;
}

/// The perceived contents of one lane.
#[derive(Clone, Debug, Default)]
struct LaneSnapshot {
    leaders: Vec<HeadwayObservation>,
    followers: Vec<HeadwayObservation>,
    route: RouteInfo,
    legal_lane_change: f64,
    conflicts: SmallVec<[VehicleId; 4]>,
}

/// A materialised [Perception], built up front by the simulation.
#[derive(Clone, Debug)]
pub struct PerceptionSnapshot {
    ego: EgoState,
    speed_limit: SpeedLimitInfo,
    lanes: [Option<LaneSnapshot>; 3],
    alongside: [bool; 2],
}

impl PerceptionSnapshot {
    /// Creates a snapshot of a single lane road without any neighbours.
    pub fn new(ego: EgoState, speed_limit: SpeedLimitInfo) -> Self {
        Self {
            ego,
            speed_limit,
            lanes: [None, Some(Default::default()), None],
            alongside: [false; 2],
        }
    }

    /// Adds an adjacent lane on which lane changes are allowed.
    pub fn with_lane(mut self, dir: LateralDirection) -> Self {
        self.lanes[dir.lane().idx()] = Some(LaneSnapshot {
            legal_lane_change: f64::INFINITY,
            ..Default::default()
        });
        self
    }

    /// Adds a neighbour to a lane, as leader or follower depending on its distance.
    ///
    /// # Panics
    /// If the lane has not been added.
    pub fn with_vehicle(mut self, lane: RelativeLane, obs: HeadwayObservation) -> Self {
        let snapshot = self.lane_mut(lane);
        let list = if obs.is_ahead() {
            &mut snapshot.leaders
        } else {
            &mut snapshot.followers
        };
        let idx = list
            .iter()
            .position(|other| other.gap() > obs.gap())
            .unwrap_or(list.len());
        list.insert(idx, obs);
        self
    }

    /// Marks a vehicle alongside in the adjacent lane.
    pub fn with_alongside(mut self, dir: LateralDirection) -> Self {
        self.alongside[dir.idx()] = true;
        self
    }

    /// Sets the mandatory lane change information of a lane.
    pub fn with_route(mut self, lane: RelativeLane, route: RouteInfo) -> Self {
        self.lane_mut(lane).route = route;
        self
    }

    /// Sets the legal lane change possibility towards an adjacent lane.
    pub fn with_legal_lane_change(mut self, dir: LateralDirection, possibility: f64) -> Self {
        self.lane_mut(dir.lane()).legal_lane_change = possibility;
        self
    }

    /// Marks a vehicle as being upstream of a conflict area on a lane.
    pub fn with_conflict(mut self, lane: RelativeLane, id: VehicleId) -> Self {
        self.lane_mut(lane).conflicts.push(id);
        self
    }

    fn lane_mut(&mut self, lane: RelativeLane) -> &mut LaneSnapshot {
        self.lanes[lane.idx()]
            .as_mut()
            .expect("Lane has not been added to the snapshot")
    }

    fn lane(&self, lane: RelativeLane) -> Result<&LaneSnapshot, PerceptionError> {
        self.lanes[lane.idx()]
            .as_ref()
            .ok_or(PerceptionError::NoSuchLane { lane })
    }
}

impl Perception for PerceptionSnapshot {
    fn ego(&self) -> Result<EgoState, PerceptionError> {
        Ok(self.ego)
    }

    fn speed_limit(&self) -> Result<SpeedLimitInfo, PerceptionError> {
        Ok(self.speed_limit)
    }

    fn has_lane(&self, dir: LateralDirection) -> bool {
        self.lanes[dir.lane().idx()].is_some()
    }

    fn leaders(&self, lane: RelativeLane) -> Result<&[HeadwayObservation], PerceptionError> {
        Ok(&self.lane(lane)?.leaders)
    }

    fn followers(&self, lane: RelativeLane) -> Result<&[HeadwayObservation], PerceptionError> {
        Ok(&self.lane(lane)?.followers)
    }

    fn alongside(&self, dir: LateralDirection) -> Result<bool, PerceptionError> {
        Ok(self.alongside[dir.idx()])
    }

    fn route(&self, lane: RelativeLane) -> Result<RouteInfo, PerceptionError> {
        Ok(self.lane(lane)?.route)
    }

    fn legal_lane_change(&self, dir: LateralDirection) -> Result<f64, PerceptionError> {
        Ok(self.lane(dir.lane())?.legal_lane_change)
    }

    fn upstream_of_conflicts(&self, lane: RelativeLane) -> Result<&[VehicleId], PerceptionError> {
        Ok(&self.lane(lane)?.conflicts)
    }
}
