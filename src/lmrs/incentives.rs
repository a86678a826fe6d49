//! Concrete lane change incentives.

use super::desire::{Desire, IncentiveContext, MandatoryIncentive, VoluntaryIncentive};
use crate::error::StepError;
use crate::parameters::{ParameterSet, DFREE, LOOKAHEAD, RHO, SOCIO, T0, VCONG, VGAIN};
use crate::perception::{HeadwayObservation, LateralDirection, RelativeLane, RouteInfo};
use crate::util::clamp01;

/// Follows the route: the desire to leave a lane from which more lane changes are needed
/// increases as the end of the lane approaches.
#[derive(Clone, Copy, Debug, Default)]
pub struct RouteIncentive;

/// Seeks lanes on which the anticipated speed is higher, and moves right to let pressing
/// followers pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpeedWithCourtesyIncentive;

/// Keeps right when there is no reason not to.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeepRightIncentive;

impl RouteIncentive {
    /// The desire to leave a lane, given the lane changes required from it.
    pub fn desire_to_leave(
        params: &ParameterSet,
        route: RouteInfo,
        speed: f64,
    ) -> Result<f64, StepError> {
        if route.lane_changes == 0 {
            return Ok(0.0);
        }
        let look_ahead = params.get(&LOOKAHEAD)?;
        let look_ahead_time = params.get(&T0)?;
        let per_lane_change = f64::max(look_ahead, speed * look_ahead_time);
        let desire = 1.0 - route.remaining / (route.lane_changes as f64 * per_lane_change);
        Ok(clamp01(desire))
    }
}

impl MandatoryIncentive for RouteIncentive {
    fn determine_desire(&self, ctx: &IncentiveContext) -> Result<Desire, StepError> {
        let current = ctx.perception.route(RelativeLane::Current)?;
        let mut desire = Desire::ZERO;
        for dir in LateralDirection::BOTH {
            if !ctx.perception.has_lane(dir) {
                continue;
            }
            let adjacent = ctx.perception.route(dir.lane())?;
            let value = if adjacent.lane_changes < current.lane_changes {
                Self::desire_to_leave(ctx.params, current, ctx.ego.speed)?
            } else if adjacent.lane_changes > current.lane_changes {
                -Self::desire_to_leave(ctx.params, adjacent, ctx.ego.speed)?
            } else {
                0.0
            };
            match dir {
                LateralDirection::Left => desire.left = value,
                LateralDirection::Right => desire.right = value,
            }
        }
        Ok(desire)
    }
}

impl SpeedWithCourtesyIncentive {
    /// The speed the driver anticipates on a lane. The influence of each leader fades out
    /// towards the look-ahead distance.
    fn anticipated_speed(
        leaders: &[HeadwayObservation],
        desired_speed: f64,
        look_ahead: f64,
    ) -> f64 {
        leaders
            .iter()
            .take_while(|leader| leader.distance < look_ahead)
            .map(|leader| {
                let weight = clamp01(leader.distance / look_ahead);
                weight * desired_speed + (1.0 - weight) * f64::min(leader.speed, desired_speed)
            })
            .fold(desired_speed, f64::min)
    }
}

impl VoluntaryIncentive for SpeedWithCourtesyIncentive {
    fn determine_desire(
        &self,
        ctx: &IncentiveContext,
        _mandatory: Desire,
    ) -> Result<Desire, StepError> {
        let look_ahead = ctx.params.get(&LOOKAHEAD)?;
        let v_gain = ctx.params.get(&VGAIN)?;
        let v_cong = ctx.params.get(&VCONG)?;
        let socio = ctx.params.get(&SOCIO)?;
        let desired_speed = ctx.car_following.desired_speed(ctx.params, &ctx.limits)?;

        let own_leaders = ctx.perception.leaders(RelativeLane::Current)?;
        let v_current = Self::anticipated_speed(own_leaders, desired_speed, look_ahead);

        let mut desire = Desire::ZERO;
        for dir in LateralDirection::BOTH {
            if !ctx.perception.has_lane(dir) {
                continue;
            }
            let leaders = ctx.perception.leaders(dir.lane())?;
            let v_adjacent = Self::anticipated_speed(leaders, desired_speed, look_ahead);
            let mut gain = (v_adjacent - v_current) / v_gain;
            match dir {
                LateralDirection::Left => desire.left = gain,
                LateralDirection::Right => {
                    // No overtaking on the right outside of congestion
                    if v_current >= v_cong {
                        gain = f64::min(gain, 0.0);
                    }
                    // Courtesy towards a pressing follower
                    let pressure = ctx
                        .perception
                        .followers(RelativeLane::Current)?
                        .first()
                        .and_then(|follower| follower.parameters.get_optional(&RHO))
                        .unwrap_or(0.0);
                    desire.right = gain + socio * pressure;
                }
            }
        }
        Ok(desire)
    }
}

impl VoluntaryIncentive for KeepRightIncentive {
    fn determine_desire(
        &self,
        ctx: &IncentiveContext,
        mandatory: Desire,
    ) -> Result<Desire, StepError> {
        if !ctx.perception.has_lane(LateralDirection::Right)
            || mandatory.right < 0.0
            || mandatory.left > 0.0
        {
            return Ok(Desire::ZERO);
        }
        Ok(Desire::new(0.0, ctx.params.get(&DFREE)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::driver::IdmPlus;
    use crate::perception::{EgoState, PerceptionSnapshot, SpeedLimitInfo};
    use crate::VehicleId;
    use assert_approx_eq::assert_approx_eq;
    use slotmap::KeyData;
    use std::rc::Rc;

    const EGO: EgoState = EgoState {
        speed: 5.0,
        length: 4.5,
    };

    fn limits() -> SpeedLimitInfo {
        SpeedLimitInfo::new(25.0, 50.0)
    }

    fn obs(id: u64, distance: f64, speed: f64, params: ParameterSet) -> HeadwayObservation {
        HeadwayObservation::new(
            VehicleId::from(KeyData::from_ffi(id)),
            distance,
            speed,
            params,
            Rc::new(IdmPlus),
            limits(),
        )
    }

    fn with_ctx<R>(perception: &PerceptionSnapshot, f: impl FnOnce(&IncentiveContext) -> R) -> R {
        let params = ParameterSet::with_defaults();
        let ctx = IncentiveContext {
            perception,
            params: &params,
            ego: EGO,
            limits: limits(),
            car_following: &IdmPlus,
        };
        f(&ctx)
    }

    #[test]
    fn desire_to_leave_grows_towards_lane_end() {
        let params = ParameterSet::with_defaults();
        let far = RouteIncentive::desire_to_leave(&params, RouteInfo::new(1, 1000.0), 5.0).unwrap();
        let near = RouteIncentive::desire_to_leave(&params, RouteInfo::new(1, 100.0), 5.0).unwrap();
        let end = RouteIncentive::desire_to_leave(&params, RouteInfo::new(1, 0.0), 5.0).unwrap();
        assert_eq!(far, 0.0);
        assert_approx_eq!(near, 1.0 - 100.0 / 295.0);
        assert_eq!(end, 1.0);
        assert_eq!(
            RouteIncentive::desire_to_leave(&params, RouteInfo::FREE, 5.0).unwrap(),
            0.0
        );
    }

    #[test]
    fn route_towards_lane_with_fewer_changes() {
        let perception = PerceptionSnapshot::new(EGO, limits())
            .with_lane(LateralDirection::Left)
            .with_lane(LateralDirection::Right)
            .with_route(RelativeLane::Current, RouteInfo::new(1, 100.0))
            .with_route(RelativeLane::Right, RouteInfo::new(2, 100.0));
        let desire = with_ctx(&perception, |ctx| RouteIncentive.determine_desire(ctx).unwrap());
        assert_approx_eq!(desire.left, 1.0 - 100.0 / 295.0);
        assert_approx_eq!(desire.right, -(1.0 - 100.0 / 590.0));
    }

    #[test]
    fn faster_lane_is_desired() {
        let params = ParameterSet::with_defaults();
        let perception = PerceptionSnapshot::new(EGO, limits())
            .with_lane(LateralDirection::Left)
            .with_vehicle(RelativeLane::Current, obs(1, 20.0, 5.0, params.clone()));
        let desire = with_ctx(&perception, |ctx| {
            SpeedWithCourtesyIncentive
                .determine_desire(ctx, Desire::ZERO)
                .unwrap()
        });
        assert!(desire.left > 0.0);
        assert_eq!(desire.right, 0.0);
    }

    #[test]
    fn courtesy_to_pressing_follower() {
        let mut pressing = ParameterSet::with_defaults();
        pressing.set(&RHO, 0.8).unwrap();
        let perception = PerceptionSnapshot::new(EGO, limits())
            .with_lane(LateralDirection::Right)
            .with_vehicle(RelativeLane::Current, obs(1, -10.0, 5.0, pressing));
        let desire = with_ctx(&perception, |ctx| {
            SpeedWithCourtesyIncentive
                .determine_desire(ctx, Desire::ZERO)
                .unwrap()
        });
        assert_approx_eq!(desire.right, 0.5 * 0.8);
    }

    #[test]
    fn keep_right_unless_route_forbids() {
        let perception = PerceptionSnapshot::new(EGO, limits()).with_lane(LateralDirection::Right);
        let desire = with_ctx(&perception, |ctx| {
            KeepRightIncentive.determine_desire(ctx, Desire::ZERO).unwrap()
        });
        assert_eq!(desire, Desire::new(0.0, 0.365));
        let desire = with_ctx(&perception, |ctx| {
            KeepRightIncentive
                .determine_desire(ctx, Desire::new(0.0, -0.2))
                .unwrap()
        });
        assert_eq!(desire, Desire::ZERO);
    }
}
