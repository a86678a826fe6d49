//! Synchronization: adjusting the acceleration to a future merge into an adjacent lane.

use super::util::{
    can_be_ahead, gentle_urgency, neighbour_response, required_buffer_space, stop_for_end,
    tag_along, without_conflicts, Follower, OvertakeInput,
};
use crate::error::StepError;
use crate::parameters::{ParameterSet, A, B, BCRIT, DCOOP, LCDUR, LOOKAHEAD, S0, T0, VCONG};
use crate::perception::{HeadwayObservation, LateralDirection, Perception, RelativeLane};
use crate::VehicleId;
use serde::Deserialize;

/// How a driver prepares to merge into an adjacent lane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Synchronization {
    /// Only stops for the end of the lane, once that can no longer be done comfortably.
    DeadEnd,
    /// Tags along behind the nearest leader in the adjacent lane.
    Passive,
    /// As [Passive](Self::Passive), but not at low desire and low speed.
    PassiveMoving,
    /// Selects and remembers a target vehicle to merge behind.
    #[default]
    Active,
}

/// The stopping deceleration for a dead end `remaining` metres ahead.
///
/// Returns infinity (no constraint) as long as stopping would not require braking harder
/// than `bcrit`.
pub fn dead_end(speed: f64, remaining: f64, bcrit: f64) -> f64 {
    if remaining <= 0.0 {
        return if speed > 0.0 { -bcrit } else { 0.0 };
    }
    let acc = -speed * speed / (2.0 * remaining);
    if acc < -bcrit {
        acc
    } else {
        f64::INFINITY
    }
}

impl Synchronization {
    /// Determines the acceleration towards a lane change in direction `dir`.
    ///
    /// `sync_target` is the remembered target of the active strategy; the other strategies
    /// leave it untouched.
    pub fn synchronize(
        &self,
        perception: &dyn Perception,
        params: &mut ParameterSet,
        ego: Follower,
        dir: LateralDirection,
        desire: f64,
        sync_target: &mut Option<VehicleId>,
    ) -> Result<f64, StepError> {
        match self {
            Synchronization::DeadEnd => {
                let route = perception.route(RelativeLane::Current)?;
                if route.lane_changes == 0 {
                    return Ok(f64::INFINITY);
                }
                Ok(dead_end(ego.speed, route.remaining, params.get(&BCRIT)?))
            }
            Synchronization::Passive => passive(perception, params, ego, dir, desire),
            Synchronization::PassiveMoving => {
                let slow = params.get(&LOOKAHEAD)? / params.get(&T0)?;
                if desire < params.get(&DCOOP)? && ego.speed < slow {
                    return Ok(f64::INFINITY);
                }
                passive(perception, params, ego, dir, desire)
            }
            Synchronization::Active => active(perception, params, ego, dir, desire, sync_target),
        }
    }
}

fn passive(
    perception: &dyn Perception,
    params: &mut ParameterSet,
    ego: Follower,
    dir: LateralDirection,
    desire: f64,
) -> Result<f64, StepError> {
    let lane = dir.lane();
    let excluded = perception.upstream_of_conflicts(lane)?;
    let urgent = desire >= params.get(&DCOOP)?;

    // Stationary vehicles are skipped unless urgent, not to lock onto a standing queue
    let mut acc = f64::INFINITY;
    if let Some(target) = without_conflicts(perception.leaders(lane)?, excluded)
        .find(|leader| urgent || leader.speed > 0.0)
    {
        let tag = tag_along(target, desire, params, ego)?;
        acc = gentle_urgency(tag, desire, params)?;
    }

    let route = perception.route(RelativeLane::Current)?;
    if route.lane_changes > 0 {
        acc = f64::min(acc, dead_end(ego.speed, route.remaining, params.get(&BCRIT)?));
    }
    Ok(acc)
}

fn active(
    perception: &dyn Perception,
    params: &mut ParameterSet,
    ego: Follower,
    dir: LateralDirection,
    desire: f64,
    sync_target: &mut Option<VehicleId>,
) -> Result<f64, StepError> {
    let lane = dir.lane();
    let excluded = perception.upstream_of_conflicts(lane)?;
    let leaders = perception.leaders(lane)?;
    let followers = perception.followers(lane)?;
    let route = perception.route(RelativeLane::Current)?;
    let x_cur = route.remaining;
    let x_merge = f64::max(0.0, -perception.legal_lane_change(dir)?);
    let b = params.get(&B)?;

    // 1. Abandon a target that is gone, congested too far ahead, or beyond the lane end.
    // A target upstream of a conflict area counts as gone.
    if let Some(id) = *sync_target {
        let target = without_conflicts(leaders, excluded)
            .chain(without_conflicts(followers, excluded))
            .find(|obs| obs.id == id);
        let keep = match target {
            None => false,
            Some(target) => {
                let congested = target.speed < params.get(&VCONG)? && target.distance > x_merge;
                !congested && target.distance <= x_cur
            }
        };
        if !keep {
            log::debug!("synchronization target {:?} abandoned", id);
            *sync_target = None;
        }
    }

    // Candidates ordered from downstream to upstream, ending with the adjacent follower
    let range = f64::min(params.get(&LOOKAHEAD)?, x_cur);
    let mut candidates: Vec<&HeadwayObservation> = without_conflicts(leaders, excluded)
        .filter(|leader| leader.distance <= range)
        .collect();
    candidates.reverse();
    let follower = without_conflicts(followers, excluded).next();
    candidates.extend(follower);

    // 2. Scan for the first leader that can comfortably be followed
    let mut target = (*sync_target).and_then(|id| candidates.iter().position(|obs| obs.id == id));
    if target.is_none() {
        for (i, candidate) in candidates.iter().enumerate() {
            if !candidate.is_ahead() {
                break;
            }
            if tag_along(candidate, desire, params, ego)? >= -b {
                log::debug!("synchronization target {:?} adopted", candidate.id);
                target = Some(i);
                break;
            }
        }
    }

    // 3. Walk upstream while the vehicle upstream of the target can be neither overtaken
    // nor relied upon to cooperate
    if let Some(mut i) = target {
        let n_cur = route.lane_changes;
        let input = OvertakeInput {
            own_speed: ego.speed,
            own_length: perception.ego()?.length,
            desired_speed: ego.model.desired_speed(params, ego.limits)?,
            max_acc: params.get(&A)?,
            min_gap: params.get(&S0)?,
            remaining: x_cur,
            buffer: if n_cur > 0 {
                buffer_space(params, ego.speed, n_cur)?
            } else {
                0.0
            },
        };
        let d_coop = params.get(&DCOOP)?;
        while let Some(up) = candidates.get(i + 1) {
            if can_be_ahead(up, &input) || cooperates(up, ego.speed, desire, d_coop)? {
                break;
            }
            i += 1;
            if !up.is_ahead() {
                // Reached the own follower: get behind it
                break;
            }
        }
        target = Some(i);
    }

    // 4. Resulting acceleration
    let mut acc = match target.map(|i| candidates[i]) {
        Some(target) => {
            if *sync_target != Some(target.id) {
                log::debug!("synchronizing to {:?}", target.id);
            }
            *sync_target = Some(target.id);
            let tag = tag_along(target, desire, params, ego)?;
            gentle_urgency(tag, desire, params)?
        }
        None => match follower {
            Some(follower) => {
                *sync_target = Some(follower.id);
                let tag = tag_along(follower, desire, params, ego)?;
                gentle_urgency(tag, desire, params)?
            }
            None if route.lane_changes > 0 => stop_for_end(x_cur, params, ego)?,
            None => f64::INFINITY,
        },
    };

    if route.lane_changes > 1 {
        let buffer = buffer_space(params, ego.speed, route.lane_changes)?;
        acc = f64::min(acc, stop_for_end(x_cur - buffer, params, ego)?);
    }
    Ok(acc)
}

fn buffer_space(params: &ParameterSet, speed: f64, lane_changes: u32) -> Result<f64, StepError> {
    Ok(required_buffer_space(
        speed,
        lane_changes,
        params.get(&LOOKAHEAD)?,
        params.get(&T0)?,
        params.get(&LCDUR)?,
        params.get(&DCOOP)?,
    ))
}

/// Whether a vehicle upstream of the target would yield to the perceiving driver at a
/// comfortable deceleration.
fn cooperates(
    up: &HeadwayObservation,
    own_speed: f64,
    desire: f64,
    d_coop: f64,
) -> Result<bool, StepError> {
    if desire < d_coop || up.is_ahead() {
        return Ok(false);
    }
    let acc = neighbour_response(up, up.gap(), own_speed, desire)?;
    Ok(acc >= -up.parameters.get(&B)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::driver::IdmPlus;
    use crate::perception::{EgoState, PerceptionSnapshot, RouteInfo, SpeedLimitInfo};
    use assert_approx_eq::assert_approx_eq;
    use slotmap::KeyData;
    use std::rc::Rc;

    fn limits() -> SpeedLimitInfo {
        SpeedLimitInfo::new(25.0, 50.0)
    }

    fn id(n: u64) -> VehicleId {
        VehicleId::from(KeyData::from_ffi(n))
    }

    fn obs(n: u64, distance: f64, speed: f64) -> HeadwayObservation {
        HeadwayObservation::new(
            id(n),
            distance,
            speed,
            ParameterSet::with_defaults(),
            Rc::new(IdmPlus),
            limits(),
        )
    }

    fn snapshot(speed: f64) -> PerceptionSnapshot {
        let ego = EgoState { speed, length: 4.5 };
        PerceptionSnapshot::new(ego, limits()).with_lane(LateralDirection::Left)
    }

    fn sync(
        strategy: Synchronization,
        perception: &PerceptionSnapshot,
        desire: f64,
        target: &mut Option<VehicleId>,
    ) -> f64 {
        let mut params = ParameterSet::with_defaults();
        let speed = perception.ego().unwrap().speed;
        let ego = Follower {
            speed,
            limits: &limits(),
            model: &IdmPlus,
        };
        let acc = strategy
            .synchronize(perception, &mut params, ego, LateralDirection::Left, desire, target)
            .unwrap();
        assert_eq!(params.get(&crate::parameters::T), Ok(1.2));
        acc
    }

    #[test]
    fn dead_end_regimes() {
        assert_eq!(dead_end(10.0, 0.0, 3.5), -3.5);
        assert_eq!(dead_end(10.0, -2.0, 3.5), -3.5);
        assert_eq!(dead_end(0.0, 0.0, 3.5), 0.0);
        assert_eq!(dead_end(20.0, 100.0, 3.5), f64::INFINITY);
        assert_approx_eq!(dead_end(20.0, 50.0, 3.5), -4.0);
    }

    #[test]
    fn dead_end_strategy_uses_current_lane() {
        let perception = snapshot(10.0);
        let mut target = None;
        assert_eq!(
            sync(Synchronization::DeadEnd, &perception, 1.0, &mut target),
            f64::INFINITY
        );
        let perception = perception.with_route(RelativeLane::Current, RouteInfo::new(1, 0.0));
        assert_eq!(sync(Synchronization::DeadEnd, &perception, 1.0, &mut target), -3.5);
    }

    #[test]
    fn passive_skips_standing_queue_at_low_desire() {
        let perception = snapshot(10.0)
            .with_vehicle(RelativeLane::Left, obs(1, 8.0, 0.0))
            .with_vehicle(RelativeLane::Left, obs(2, 80.0, 10.0));
        let mut target = None;
        let low = sync(Synchronization::Passive, &perception, 0.6, &mut target);
        let high = sync(Synchronization::Passive, &perception, 0.9, &mut target);
        assert!(low > -0.5);
        assert!(high < -2.09);
        assert!(high >= -3.5);
        assert_eq!(target, None);
    }

    #[test]
    fn passive_ignores_vehicles_upstream_of_conflicts() {
        let perception = snapshot(10.0)
            .with_vehicle(RelativeLane::Left, obs(1, 8.0, 10.0))
            .with_vehicle(RelativeLane::Left, obs(2, 80.0, 10.0));
        let mut target = None;
        let close = sync(Synchronization::Passive, &perception, 0.6, &mut target);
        let perception = perception.with_conflict(RelativeLane::Left, id(1));
        let far = sync(Synchronization::Passive, &perception, 0.6, &mut target);
        assert!(close < 0.0);
        assert!(far > 0.0);
    }

    #[test]
    fn passive_moving_waits_at_low_speed() {
        let perception = snapshot(5.0).with_vehicle(RelativeLane::Left, obs(1, 8.0, 2.0));
        let mut target = None;
        assert_eq!(
            sync(Synchronization::PassiveMoving, &perception, 0.6, &mut target),
            f64::INFINITY
        );
        assert!(sync(Synchronization::PassiveMoving, &perception, 0.9, &mut target).is_finite());
        assert!(sync(Synchronization::Passive, &perception, 0.6, &mut target).is_finite());
    }

    #[test]
    fn active_stops_for_end_without_candidates() {
        let perception =
            snapshot(20.0).with_route(RelativeLane::Current, RouteInfo::new(1, 50.0));
        let mut target = None;
        let acc = sync(Synchronization::Active, &perception, 0.9, &mut target);
        assert_approx_eq!(acc, -3.5);
        assert_eq!(target, None);
    }

    #[test]
    fn active_adopts_and_keeps_target() {
        let perception = snapshot(20.0).with_vehicle(RelativeLane::Left, obs(1, 60.0, 20.0));
        let mut target = None;
        let acc = sync(Synchronization::Active, &perception, 0.7, &mut target);
        assert!(acc > 0.0);
        assert_eq!(target, Some(id(1)));

        let again = sync(Synchronization::Active, &perception, 0.7, &mut target);
        assert_approx_eq!(again, acc);
        assert_eq!(target, Some(id(1)));
    }

    #[test]
    fn active_ignores_vehicles_upstream_of_conflicts() {
        let perception = snapshot(20.0)
            .with_vehicle(RelativeLane::Left, obs(1, 60.0, 20.0))
            .with_vehicle(RelativeLane::Left, obs(2, -30.0, 20.0))
            .with_conflict(RelativeLane::Left, id(1))
            .with_conflict(RelativeLane::Left, id(2));
        let mut target = None;
        let acc = sync(Synchronization::Active, &perception, 0.7, &mut target);
        assert_eq!(acc, f64::INFINITY);
        assert_eq!(target, None);

        // A remembered target upstream of a conflict is no candidate either
        let mut target = Some(id(1));
        sync(Synchronization::Active, &perception, 0.7, &mut target);
        assert_eq!(target, None);
    }

    #[test]
    fn active_abandons_missing_target() {
        let perception = snapshot(20.0).with_vehicle(RelativeLane::Left, obs(1, 60.0, 20.0));
        let mut target = Some(id(9));
        sync(Synchronization::Active, &perception, 0.7, &mut target);
        assert_eq!(target, Some(id(1)));
    }

    #[test]
    fn active_abandons_congested_target() {
        let perception = snapshot(20.0)
            .with_vehicle(RelativeLane::Left, obs(1, 60.0, 5.0))
            .with_vehicle(RelativeLane::Left, obs(2, 150.0, 20.0));
        let mut target = Some(id(1));
        sync(Synchronization::Active, &perception, 0.7, &mut target);
        assert_eq!(target, Some(id(2)));
    }

    #[test]
    fn active_walks_upstream_past_faster_vehicle() {
        let perception = snapshot(15.0)
            .with_route(RelativeLane::Current, RouteInfo::new(1, 150.0))
            .with_vehicle(RelativeLane::Left, obs(1, 100.0, 15.0))
            .with_vehicle(RelativeLane::Left, obs(2, 10.0, 30.0));
        let mut target = None;
        sync(Synchronization::Active, &perception, 0.9, &mut target);
        assert_eq!(target, Some(id(2)));
    }

    #[test]
    fn active_gets_behind_uncooperative_follower() {
        let perception = snapshot(15.0)
            .with_route(RelativeLane::Current, RouteInfo::new(1, 150.0))
            .with_vehicle(RelativeLane::Left, obs(1, 100.0, 15.0))
            .with_vehicle(RelativeLane::Left, obs(2, 10.0, 30.0))
            .with_vehicle(RelativeLane::Left, obs(3, -1.0, 30.0));
        let mut target = None;
        let acc = sync(Synchronization::Active, &perception, 0.9, &mut target);
        assert_eq!(target, Some(id(3)));
        assert!(acc < -2.09);
        assert!(acc >= -3.5);
    }

    #[test]
    fn buffer_space_for_further_lane_changes() {
        let perception =
            snapshot(20.0).with_route(RelativeLane::Current, RouteInfo::new(2, 200.0));
        let mut target = None;
        let acc = sync(Synchronization::Active, &perception, 0.9, &mut target);
        // 60 m for this lane change and 860 * 0.212 m for the next: past the stop point
        assert_approx_eq!(acc, -3.5);
    }
}
