pub use config::BehaviorConfig;
pub use driver::{CarFollowingModel, Driver, Idm, IdmPlus, Leader};
pub use error::{ParameterError, PerceptionError, StepError};
pub use lmrs::{
    Desire, Follower, GapAcceptance, IncentiveContext, KeepRightIncentive, LaneChangeManeuver,
    LaneChangeMemory, LateralIntent, Lmrs, MandatoryIncentive, OperationalPlan, RouteIncentive,
    SpeedWithCourtesyIncentive, Synchronization, Tailgating, TurnIndicator, VoluntaryIncentive,
};
pub use parameters::{ClaimOwner, ParameterFactory, ParameterSet, ParameterType};
pub use perception::{
    EgoState, HeadwayObservation, LateralDirection, Perception, PerceptionSnapshot, RelativeLane,
    RouteInfo, SpeedLimitInfo,
};
pub use population::{Population, StepOutcome};
use slotmap::new_key_type;
pub use slotmap::{Key, KeyData};
pub use util::Interval;

pub mod config;
mod debug;
mod driver;
mod error;
pub mod lmrs;
pub mod parameters;
mod perception;
mod population;
mod util;

new_key_type! {
    /// Unique ID of a [Driver] and its vehicle.
    pub struct VehicleId;
}
