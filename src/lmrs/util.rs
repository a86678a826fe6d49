//! Numeric techniques shared by the lane change components.

use crate::driver::{CarFollowingModel, Leader};
use crate::error::StepError;
use crate::parameters::{ParameterSet, B, BCRIT, DCOOP, T, TMAX, TMIN};
use crate::perception::{HeadwayObservation, SpeedLimitInfo};
use crate::util::{clamp01, Interval};
use crate::VehicleId;

/// The car-following context of one driver: its speed, limits and model.
#[derive(Clone, Copy, Debug)]
pub struct Follower<'a> {
    pub speed: f64,
    pub limits: &'a SpeedLimitInfo,
    pub model: &'a dyn CarFollowingModel,
}

/// The headway matching a lane change desire, interpolated between `TMAX` (no desire) and
/// `TMIN` (full desire), but never longer than the current headway.
pub fn interpolated_headway(params: &ParameterSet, desire: f64) -> Result<f64, StepError> {
    let headways = Interval::new(params.get(&TMAX)?, params.get(&TMIN)?);
    Ok(f64::min(params.get(&T)?, headways.lerp(clamp01(desire))))
}

/// Evaluates `f` with the headway temporarily set for the given desire.
/// The original headway is restored afterwards, also when `f` fails.
pub fn with_desired_headway<R>(
    params: &mut ParameterSet,
    desire: f64,
    f: impl FnOnce(&ParameterSet) -> Result<R, StepError>,
) -> Result<R, StepError> {
    let headway = interpolated_headway(params, desire)?;
    params.set_resettable(&T, headway)?;
    let result = f(params);
    params.reset(&T)?;
    result
}

/// The acceleration of a follower towards a single leader, accepting a headway that
/// matches `desire`.
pub fn single_acceleration(
    gap: f64,
    leader_speed: f64,
    desire: f64,
    params: &mut ParameterSet,
    follower: Follower,
) -> Result<f64, StepError> {
    with_desired_headway(params, desire, |params| {
        let leaders = [Leader::new(gap, leader_speed)];
        Ok(follower
            .model
            .following_acceleration(params, follower.speed, follower.limits, &leaders)?)
    })
}

/// The acceleration of the perceiving driver to tag along behind a vehicle in an adjacent
/// lane, as if that vehicle were its leader. A vehicle behind yields a strong deceleration.
pub fn tag_along(
    target: &HeadwayObservation,
    desire: f64,
    params: &mut ParameterSet,
    ego: Follower,
) -> Result<f64, StepError> {
    single_acceleration(target.distance, target.speed, desire, params, ego)
}

/// The acceleration of a neighbour in response to the perceiving vehicle, `gap` metres ahead
/// of it, evaluated with the neighbour's own parameters and model.
pub fn neighbour_response(
    neighbour: &HeadwayObservation,
    gap: f64,
    own_speed: f64,
    desire: f64,
) -> Result<f64, StepError> {
    let mut params = neighbour.parameters.clone();
    neighbour_response_with(neighbour, &mut params, gap, own_speed, desire)
}

/// As [neighbour_response], with explicitly supplied (e.g. modified) neighbour parameters.
pub fn neighbour_response_with(
    neighbour: &HeadwayObservation,
    params: &mut ParameterSet,
    gap: f64,
    own_speed: f64,
    desire: f64,
) -> Result<f64, StepError> {
    let follower = Follower {
        speed: neighbour.speed,
        limits: &neighbour.speed_limit,
        model: neighbour.car_following.as_ref(),
    };
    single_acceleration(gap, own_speed, desire, params, follower)
}

/// Limits a deceleration to comfortable values, unless the desire is high enough to
/// justify harder braking. Above `DCOOP` the limit moves from `-B` to `-BCRIT` as the
/// desire approaches 1.
pub fn gentle_urgency(acc: f64, desire: f64, params: &ParameterSet) -> Result<f64, StepError> {
    let b = params.get(&B)?;
    if acc > -b {
        return Ok(acc);
    }
    let d_coop = params.get(&DCOOP)?;
    if desire < d_coop {
        return Ok(-b);
    }
    let bcrit = params.get(&BCRIT)?;
    let urgency = clamp01(Interval::new(d_coop, 1.0).inv_lerp(desire));
    let floor = Interval::new(-b, -bcrit).lerp(urgency);
    Ok(f64::max(acc, floor))
}

/// Removes vehicles found upstream of a conflict area, as they do not compete for the
/// same road space.
pub fn without_conflicts<'a>(
    vehicles: &'a [HeadwayObservation],
    upstream_of_conflicts: &'a [VehicleId],
) -> impl Iterator<Item = &'a HeadwayObservation> + 'a {
    vehicles
        .iter()
        .filter(move |obs| !upstream_of_conflicts.contains(&obs.id))
}

/// The space to keep free before the end of a lane, so that the lane changes after the
/// next one can still be performed.
pub fn required_buffer_space(
    speed: f64,
    lane_changes: u32,
    look_ahead: f64,
    look_ahead_time: f64,
    lane_change_duration: f64,
    d_coop: f64,
) -> f64 {
    let anticipation = f64::max(speed * look_ahead_time, look_ahead);
    let remaining = lane_changes as f64 - 1.0;
    speed * lane_change_duration + anticipation * remaining * (1.0 - d_coop)
}

/// The deceleration needed to stop at the end of the lane, no harsher than `-BCRIT`.
pub fn stop_for_end(
    distance: f64,
    params: &ParameterSet,
    ego: Follower,
) -> Result<f64, StepError> {
    let bcrit = params.get(&BCRIT)?;
    let acc = ego
        .model
        .stopping_acceleration(params, ego.speed, ego.limits, distance)?;
    Ok(f64::max(-bcrit, acc))
}

/// Inputs of [can_be_ahead].
#[derive(Clone, Copy, Debug)]
pub struct OvertakeInput {
    pub own_speed: f64,
    /// The length of the perceiving vehicle in m.
    pub own_length: f64,
    pub desired_speed: f64,
    pub max_acc: f64,
    pub min_gap: f64,
    /// The distance within which the lane change must be completed.
    pub remaining: f64,
    /// The space to keep free before `remaining`.
    pub buffer: f64,
}

/// Estimates whether the perceiving vehicle can get ahead of `target` before the end of the
/// lane, by accelerating at the maximum acceleration up to the desired speed while the
/// target keeps its speed.
pub fn can_be_ahead(target: &HeadwayObservation, input: &OvertakeInput) -> bool {
    // Distance to gain until the rear of the perceiving vehicle is `min_gap` ahead of the target
    let required = if target.is_ahead() {
        target.distance + target.length + input.own_length + input.min_gap
    } else {
        target.distance + input.min_gap
    };
    if required <= 0.0 {
        return true;
    }

    let v1 = input.own_speed;
    let v2 = target.speed;
    let acc = input.max_acc;
    let cruise = f64::max(v1, input.desired_speed);
    let t1 = f64::max(cruise - v1, 0.0) / acc;

    // Accelerating phase
    if t1 > 0.0 {
        let discr = (v1 - v2).powi(2) + 2.0 * acc * required;
        let t = (discr.sqrt() - (v1 - v2)) / acc;
        if t <= t1 {
            let travelled = v1 * t + 0.5 * acc * t * t;
            return travelled + input.buffer <= input.remaining;
        }
    }

    // Cruising phase
    let gained = (v1 - v2) * t1 + 0.5 * acc * t1 * t1;
    let travelled = v1 * t1 + 0.5 * acc * t1 * t1;
    let rel_speed = cruise - v2;
    if rel_speed <= 0.0 {
        return false;
    }
    let t = (required - gained) / rel_speed;
    travelled + cruise * t + input.buffer <= input.remaining
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::driver::IdmPlus;
    use crate::error::ParameterError;
    use assert_approx_eq::assert_approx_eq;
    use slotmap::KeyData;
    use std::rc::Rc;

    fn limits() -> SpeedLimitInfo {
        SpeedLimitInfo::new(30.0, 50.0)
    }

    fn obs(distance: f64, speed: f64) -> HeadwayObservation {
        HeadwayObservation::new(
            VehicleId::from(KeyData::from_ffi(1)),
            distance,
            speed,
            ParameterSet::with_defaults(),
            Rc::new(IdmPlus),
            limits(),
        )
    }

    #[test]
    fn headway_interpolation() {
        let mut params = ParameterSet::with_defaults();
        assert_approx_eq!(interpolated_headway(&params, 0.0).unwrap(), 1.2);
        assert_approx_eq!(interpolated_headway(&params, 1.0).unwrap(), 0.56);
        assert_approx_eq!(interpolated_headway(&params, 0.5).unwrap(), 0.88);
        assert_approx_eq!(interpolated_headway(&params, 7.0).unwrap(), 0.56);
        assert_approx_eq!(interpolated_headway(&params, -3.0).unwrap(), 1.2);

        params.set(&T, 0.7).unwrap();
        assert_approx_eq!(interpolated_headway(&params, 0.5).unwrap(), 0.7);
    }

    #[test]
    fn headway_is_restored() {
        let mut params = ParameterSet::with_defaults();
        params.set(&T, 1.0).unwrap();
        let inside = with_desired_headway(&mut params, 1.0, |p| Ok(p.get(&T)?)).unwrap();
        assert_approx_eq!(inside, 0.56);
        assert_eq!(params.get(&T), Ok(1.0));
        assert!(params.reset(&T).is_err());

        let result: Result<(), _> = with_desired_headway(&mut params, 1.0, |_| {
            Err(ParameterError::Missing { id: "X" }.into())
        });
        assert!(result.is_err());
        assert_eq!(params.get(&T), Ok(1.0));
    }

    #[test]
    fn higher_desire_tolerates_closer_leader() {
        let mut params = ParameterSet::with_defaults();
        let ego = Follower {
            speed: 20.0,
            limits: &limits(),
            model: &IdmPlus,
        };
        let target = obs(20.0, 20.0);
        let low = tag_along(&target, 0.0, &mut params, ego).unwrap();
        let high = tag_along(&target, 1.0, &mut params, ego).unwrap();
        assert!(high > low);
    }

    #[test]
    fn urgency_floor() {
        let params = ParameterSet::with_defaults();
        assert_eq!(gentle_urgency(-1.0, 0.0, &params).unwrap(), -1.0);
        assert_eq!(gentle_urgency(0.5, 1.0, &params).unwrap(), 0.5);
        assert_approx_eq!(gentle_urgency(-8.0, 0.5, &params).unwrap(), -2.09);
        assert_approx_eq!(gentle_urgency(-8.0, 0.788, &params).unwrap(), -2.09);
        assert_approx_eq!(gentle_urgency(-8.0, 1.0, &params).unwrap(), -3.5);
        assert_approx_eq!(gentle_urgency(-8.0, 0.894, &params).unwrap(), -2.795);
        assert_approx_eq!(gentle_urgency(-2.5, 1.0, &params).unwrap(), -2.5);
    }

    #[test]
    fn conflict_filtering() {
        let vehicles = [obs(10.0, 5.0), obs(20.0, 5.0)];
        let excluded = [vehicles[0].id];
        assert_eq!(without_conflicts(&vehicles, &excluded).count(), 0);
        assert_eq!(without_conflicts(&vehicles, &[]).count(), 2);
    }

    #[test]
    fn buffer_space() {
        assert_approx_eq!(required_buffer_space(20.0, 1, 295.0, 43.0, 3.0, 0.788), 60.0);
        let two = required_buffer_space(20.0, 2, 295.0, 43.0, 3.0, 0.788);
        assert_approx_eq!(two, 60.0 + 860.0 * 0.212);
        let slow = required_buffer_space(5.0, 2, 295.0, 43.0, 3.0, 0.788);
        assert_approx_eq!(slow, 15.0 + 295.0 * 0.212);
    }

    #[test]
    fn overtaking_estimate() {
        let input = OvertakeInput {
            own_speed: 20.0,
            own_length: 4.5,
            desired_speed: 30.0,
            max_acc: 1.25,
            min_gap: 3.0,
            remaining: 1000.0,
            buffer: 60.0,
        };
        assert!(can_be_ahead(&obs(10.0, 20.0), &input));
        assert!(can_be_ahead(&obs(-20.0, 20.0), &input));
        assert!(!can_be_ahead(&obs(10.0, 30.0), &input));
        assert!(!can_be_ahead(
            &obs(10.0, 20.0),
            &OvertakeInput {
                remaining: 100.0,
                ..input
            }
        ));
    }

    #[test]
    fn long_vehicle_needs_more_space_to_overtake() {
        let car = OvertakeInput {
            own_speed: 20.0,
            own_length: 4.5,
            desired_speed: 30.0,
            max_acc: 1.25,
            min_gap: 3.0,
            remaining: 220.0,
            buffer: 60.0,
        };
        let truck = OvertakeInput {
            own_length: 18.0,
            ..car
        };
        // Gaining 22 m takes 141 m, gaining 35.5 m takes 186 m
        assert!(can_be_ahead(&obs(10.0, 20.0), &car));
        assert!(!can_be_ahead(&obs(10.0, 20.0), &truck));
    }

    #[test]
    fn follower_only_needs_the_minimum_gap() {
        let input = OvertakeInput {
            own_speed: 20.0,
            own_length: 4.5,
            desired_speed: 30.0,
            max_acc: 1.25,
            min_gap: 3.0,
            remaining: 90.0,
            buffer: 60.0,
        };
        // Already 5 m ahead of the follower
        assert!(can_be_ahead(&obs(-5.0, 20.0), &input));
        // 1 m short of the minimum gap, gained over 26.3 m
        assert!(can_be_ahead(&obs(-2.0, 20.0), &input));
        // The follower's own length plays no part
        let long = HeadwayObservation {
            length: 18.0,
            ..obs(-2.0, 20.0)
        };
        assert!(can_be_ahead(&long, &input));
        assert!(!can_be_ahead(&obs(-2.0, 20.0), &OvertakeInput { remaining: 80.0, ..input }));
    }
}
