use crate::lmrs::LaneChangeMemory;
use crate::parameters::{ParameterSet, DLEFT, DRIGHT, RHO};
use crate::perception::{HeadwayObservation, SpeedLimitInfo};
use crate::VehicleId;
use std::rc::Rc;

pub use car_following::{CarFollowingModel, Idm, IdmPlus, Leader};

mod car_following;

/// A simulated driver: the behavioural state of one vehicle.
#[derive(Clone, Debug)]
pub struct Driver {
    /// The ID of the driven vehicle.
    pub(crate) id: VehicleId,
    /// The behavioural parameters.
    pub(crate) params: ParameterSet,
    /// State carried from one decision step to the next.
    pub(crate) memory: LaneChangeMemory,
    /// The longitudinal model.
    car_following: Rc<dyn CarFollowingModel>,
}

impl Driver {
    /// Creates a new driver.
    pub fn new(
        id: VehicleId,
        params: ParameterSet,
        car_following: Rc<dyn CarFollowingModel>,
    ) -> Self {
        Self {
            id,
            params,
            memory: Default::default(),
            car_following,
        }
    }

    /// Gets the ID of the driven vehicle.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The driver's parameters.
    pub fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    /// Mutable access to the driver's parameters.
    pub fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    /// The driver's lane change memory.
    pub fn memory(&self) -> &LaneChangeMemory {
        &self.memory
    }

    /// The driver's car-following model.
    pub fn car_following(&self) -> &Rc<dyn CarFollowingModel> {
        &self.car_following
    }

    /// The lane change desire committed at the end of the last step, as (left, right).
    pub fn desire(&self) -> (f64, f64) {
        (
            self.params.get_optional(&DLEFT).unwrap_or(0.0),
            self.params.get_optional(&DRIGHT).unwrap_or(0.0),
        )
    }

    /// The social pressure committed at the end of the last step.
    pub fn social_pressure(&self) -> f64 {
        self.params.get_optional(&RHO).unwrap_or(0.0)
    }

    /// Creates an observation of this driver's vehicle for use in another driver's perception.
    /// The parameters are a snapshot: later changes by this driver are not visible through it.
    pub fn observe(
        &self,
        distance: f64,
        speed: f64,
        length: f64,
        speed_limit: SpeedLimitInfo,
    ) -> HeadwayObservation {
        HeadwayObservation {
            id: self.id,
            distance,
            speed,
            acceleration: 0.0,
            length,
            parameters: self.params.clone(),
            car_following: self.car_following.clone(),
            speed_limit,
        }
    }
}
