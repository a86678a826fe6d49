//! The lane change model with relaxation and synchronization.
//!
//! Each decision step produces an acceleration and a lateral intent for one driver. The
//! driver's desire to change lane is aggregated from incentives and compared against the
//! thresholds `DFREE` (free lane change), `DSYNC` (synchronize with the target lane) and
//! `DCOOP` (indicate, asking others to cooperate). Headway is shortened around lane changes
//! and relaxes back to `TMAX` over time.
//!
//! A lane change lasts `LCDUR` seconds from the step that initiates it. Throughout the
//! maneuver, perception keeps reporting the departure lane as [RelativeLane::Current] and
//! the arrival lane in the direction of the maneuver. The current lane switches to the
//! arrival lane on the first step after [LaneChangeMemory::is_changing_lane] turns false.

use crate::debug::debug_decision;
use crate::driver::{CarFollowingModel, Driver, Leader};
use crate::error::StepError;
use crate::parameters::{
    ParameterSet, BCRIT, DCOOP, DFREE, DLC, DLEFT, DRIGHT, DSYNC, LCDUR, RHO, T, TAU, TMAX,
};
use crate::perception::{HeadwayObservation, LateralDirection, Perception, RelativeLane};
use serde::Serialize;
use smallvec::SmallVec;

pub use cooperation::cooperate;
pub use desire::{aggregate, Desire, IncentiveContext, MandatoryIncentive, VoluntaryIncentive};
pub use gap::GapAcceptance;
pub use incentives::{KeepRightIncentive, RouteIncentive, SpeedWithCourtesyIncentive};
pub use memory::{LaneChangeManeuver, LaneChangeMemory};
pub use sync::{dead_end, Synchronization};
pub use tailgating::{social_pressure, Tailgating};
pub use util::Follower;

mod cooperation;
mod desire;
mod gap;
mod incentives;
mod memory;
mod sync;
mod tailgating;
mod util;

/// The lateral part of a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LateralIntent {
    None,
    Left,
    Right,
}

/// The turn indicator, signalling the desire to change lane to others.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TurnIndicator {
    Off,
    Left,
    Right,
}

impl From<LateralDirection> for LateralIntent {
    fn from(dir: LateralDirection) -> Self {
        match dir {
            LateralDirection::Left => LateralIntent::Left,
            LateralDirection::Right => LateralIntent::Right,
        }
    }
}

impl From<LateralDirection> for TurnIndicator {
    fn from(dir: LateralDirection) -> Self {
        match dir {
            LateralDirection::Left => TurnIndicator::Left,
            LateralDirection::Right => TurnIndicator::Right,
        }
    }
}

/// The outcome of one decision step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct OperationalPlan {
    /// The acceleration in m/s<sup>2</sup>.
    pub acceleration: f64,
    /// Whether to start a lane change this step.
    pub lateral: LateralIntent,
    pub indicator: TurnIndicator,
}

impl OperationalPlan {
    /// Zero acceleration, no lateral intent.
    pub const NEUTRAL: OperationalPlan = OperationalPlan {
        acceleration: 0.0,
        lateral: LateralIntent::None,
        indicator: TurnIndicator::Off,
    };
}

/// The lane change decision engine.
///
/// The engine holds no per-driver state, so one instance serves any number of drivers.
#[derive(Debug)]
pub struct Lmrs {
    synchronization: Synchronization,
    gap_acceptance: GapAcceptance,
    tailgating: Tailgating,
    mandatory: Vec<Box<dyn MandatoryIncentive>>,
    voluntary: Vec<Box<dyn VoluntaryIncentive>>,
    neutral_first_step: bool,
}

impl Default for Lmrs {
    /// Active synchronization, informed gap acceptance and social pressure, following the
    /// route with speed gain, courtesy and keeping right.
    fn default() -> Self {
        Lmrs::new(
            Synchronization::Active,
            GapAcceptance::Informed,
            Tailgating::Pressure,
        )
        .with_mandatory(RouteIncentive)
        .with_voluntary(SpeedWithCourtesyIncentive)
        .with_voluntary(KeepRightIncentive)
    }
}

impl Lmrs {
    /// Creates an engine without any incentives.
    pub fn new(
        synchronization: Synchronization,
        gap_acceptance: GapAcceptance,
        tailgating: Tailgating,
    ) -> Self {
        Self {
            synchronization,
            gap_acceptance,
            tailgating,
            mandatory: vec![],
            voluntary: vec![],
            neutral_first_step: true,
        }
    }

    /// Adds a mandatory incentive.
    pub fn with_mandatory(mut self, incentive: impl MandatoryIncentive + 'static) -> Self {
        self.mandatory.push(Box::new(incentive));
        self
    }

    /// Adds a voluntary incentive.
    pub fn with_voluntary(mut self, incentive: impl VoluntaryIncentive + 'static) -> Self {
        self.voluntary.push(Box::new(incentive));
        self
    }

    /// Sets whether the very first step at time zero yields [OperationalPlan::NEUTRAL].
    pub fn with_neutral_first_step(mut self, neutral: bool) -> Self {
        self.neutral_first_step = neutral;
        self
    }

    pub fn synchronization(&self) -> Synchronization {
        self.synchronization
    }

    pub fn gap_acceptance(&self) -> GapAcceptance {
        self.gap_acceptance
    }

    pub fn tailgating(&self) -> Tailgating {
        self.tailgating
    }

    /// Performs one decision step of a driver at time `now`, `dt` seconds after its
    /// previous step.
    ///
    /// On success, the driver's desire and social pressure are committed to its parameters
    /// and its memory is updated. On failure, the driver's parameters and memory are left as
    /// they were before the step.
    pub fn step(
        &self,
        driver: &mut Driver,
        perception: &dyn Perception,
        now: f64,
        dt: f64,
    ) -> Result<OperationalPlan, StepError> {
        let saved = driver.params.clone();
        let model = driver.car_following().clone();
        let mut memory = driver.memory.clone();
        let result = self.decide(
            &mut driver.params,
            &mut memory,
            model.as_ref(),
            perception,
            now,
            dt,
        );
        match result {
            Ok(plan) => {
                driver.memory = memory;
                debug_decision(driver, &plan);
                Ok(plan)
            }
            Err(err) => {
                driver.params = saved;
                Err(err)
            }
        }
    }

    fn decide(
        &self,
        params: &mut ParameterSet,
        memory: &mut LaneChangeMemory,
        model: &dyn CarFollowingModel,
        perception: &dyn Perception,
        now: f64,
        dt: f64,
    ) -> Result<OperationalPlan, StepError> {
        // Initial state
        if self.neutral_first_step && now == 0.0 && memory.steps == 0 {
            memory.steps += 1;
            return Ok(OperationalPlan::NEUTRAL);
        }

        let ego_state = perception.ego()?;
        let limits = perception.speed_limit()?;
        let speed = ego_state.speed;
        let ego = Follower {
            speed,
            limits: &limits,
            model,
        };
        let leaders = perception.leaders(RelativeLane::Current)?;

        // Relaxation from a new leader that just changed lane
        if let Some(leader) = leaders.first() {
            if !memory.has_seen(leader.id) {
                if let Some(desire) = leader.parameters.get_optional(&DLC) {
                    let headway = util::interpolated_headway(params, desire)?;
                    log::trace!("new leader {:?}, headway {:.3}", leader.id, headway);
                    params.set(&T, headway)?;
                }
            }
        }

        let rho = self.tailgating.apply(perception, params, ego)?;

        // Car-following
        let mut acc = model.following_acceleration(params, speed, &limits, &to_leaders(leaders))?;

        // End of the own lane
        let route = perception.route(RelativeLane::Current)?;
        if route.lane_changes > 0 {
            acc = f64::min(acc, dead_end(speed, route.remaining, params.get(&BCRIT)?));
        }

        let mut lateral = LateralIntent::None;
        let mut indicator = TurnIndicator::Off;
        let mut seen: SmallVec<[_; 4]> = leaders.iter().map(|leader| leader.id).collect();

        if let Some(maneuver) = memory.lane_change {
            // Changing lane: follow leaders on both lanes. The arrival lane's leaders stay
            // known, so they are not new once the arrival lane becomes the current lane.
            let target = maneuver.direction;
            if perception.has_lane(target) {
                let arrival = perception.leaders(target.lane())?;
                seen.extend(arrival.iter().map(|leader| leader.id));
                acc = f64::min(
                    acc,
                    model.following_acceleration(params, speed, &limits, &to_leaders(arrival))?,
                );
            }
            indicator = target.into();
            memory.lane_change = maneuver.advance(dt, params.get(&LCDUR)?);
            if memory.lane_change.is_none() {
                log::debug!("lane change {:?} completed", target);
            }
        } else {
            let desire = {
                let ctx = IncentiveContext {
                    perception,
                    params: &*params,
                    ego: ego_state,
                    limits,
                    car_following: model,
                };
                aggregate(&self.mandatory, &self.voluntary, &ctx)?
            };

            let initiated = self.select_lane_change(perception, params, ego, desire)?;
            match initiated {
                Some(dir) => {
                    let d = desire.get(dir);
                    log::debug!("initiating lane change {:?} at desire {:.3}", dir, d);
                    params.set(&DLC, d)?;
                    let headway = util::interpolated_headway(params, d)?;
                    params.set(&T, headway)?;
                    if let Some(leader) = perception.leaders(dir.lane())?.first() {
                        seen.push(leader.id);
                    }
                    memory.lane_change = Some(LaneChangeManeuver::new(dir));
                    memory.sync_target = None;
                    params.set(&DLEFT, 0.0)?;
                    params.set(&DRIGHT, 0.0)?;
                    lateral = dir.into();
                    indicator = dir.into();
                }
                None => {
                    let (dir, d) = desire.dominant();
                    if d >= params.get(&DSYNC)? {
                        let sync = self.synchronization.synchronize(
                            perception,
                            params,
                            ego,
                            dir,
                            d,
                            &mut memory.sync_target,
                        )?;
                        acc = f64::min(acc, sync);
                    } else {
                        memory.sync_target = None;
                    }
                    if d >= params.get(&DCOOP)? {
                        indicator = dir.into();
                    }
                    params.set(&DLEFT, desire.left)?;
                    params.set(&DRIGHT, desire.right)?;
                }
            }

            // Cooperation
            for dir in LateralDirection::BOTH {
                acc = f64::min(acc, cooperate(perception, params, ego, dir)?);
            }
        }

        // Relaxation
        let headway = params.get(&T)?;
        let relaxed = params.get(&TMAX)?;
        let fraction = f64::min(1.0, dt / params.get(&TAU)?);
        params.set(&T, headway + (relaxed - headway) * fraction)?;

        if let Some(rho) = rho {
            params.set(&RHO, rho)?;
        }
        memory.leaders = seen;
        memory.steps += 1;

        Ok(OperationalPlan {
            acceleration: acc,
            lateral,
            indicator,
        })
    }

    /// Selects the lane change to initiate, if any. Left takes precedence when its desire is
    /// at least the right desire.
    fn select_lane_change(
        &self,
        perception: &dyn Perception,
        params: &mut ParameterSet,
        ego: Follower,
        desire: Desire,
    ) -> Result<Option<LateralDirection>, StepError> {
        let d_free = params.get(&DFREE)?;
        let candidates = [
            (LateralDirection::Left, desire.left_dominates()),
            (LateralDirection::Right, true),
        ];
        for (dir, eligible) in candidates {
            let d = desire.get(dir);
            if !eligible || d < d_free || !perception.has_lane(dir) {
                continue;
            }
            if perception.legal_lane_change(dir)? <= 0.0 {
                continue;
            }
            if self.gap_acceptance.accept(perception, params, ego, dir, d)? {
                return Ok(Some(dir));
            }
        }
        Ok(None)
    }
}

fn to_leaders(observations: &[HeadwayObservation]) -> SmallVec<[Leader; 4]> {
    observations
        .iter()
        .map(|obs| Leader::new(obs.distance, obs.speed))
        .collect()
}
