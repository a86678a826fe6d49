//! Yielding to neighbours that indicate they want to merge in front.

use super::util::{single_acceleration, without_conflicts, Follower};
use crate::error::StepError;
use crate::parameters::{ParameterSet, B, DCOOP, DLEFT, DRIGHT};
use crate::perception::{LateralDirection, Perception};

/// The yielding acceleration towards the nearest leader in the adjacent lane in direction
/// `dir`, if that leader desires to change into the own lane. Infinite if there is no reason
/// to yield.
///
/// The neighbour's desire is read from its committed parameters, i.e. as of the end of its
/// previous step. Yielding is never harsher than `-B`.
pub fn cooperate(
    perception: &dyn Perception,
    params: &mut ParameterSet,
    ego: Follower,
    dir: LateralDirection,
) -> Result<f64, StepError> {
    if !perception.has_lane(dir) {
        return Ok(f64::INFINITY);
    }
    let lane = dir.lane();
    let excluded = perception.upstream_of_conflicts(lane)?;
    let neighbour = match without_conflicts(perception.leaders(lane)?, excluded).next() {
        Some(neighbour) => neighbour,
        None => return Ok(f64::INFINITY),
    };

    // The neighbour changes in the opposite direction to reach the own lane
    let desire_id = match dir.flip() {
        LateralDirection::Left => &DLEFT,
        LateralDirection::Right => &DRIGHT,
    };
    let desire = neighbour.parameters.get_optional(desire_id).unwrap_or(0.0);
    if desire < params.get(&DCOOP)? || (neighbour.speed <= 0.0 && ego.speed <= 0.0) {
        return Ok(f64::INFINITY);
    }

    let acc = single_acceleration(neighbour.distance, neighbour.speed, desire, params, ego)?;
    log::trace!("yielding to {:?} at desire {:.3}: {:.2}", neighbour.id, desire, acc);
    Ok(f64::max(acc, -params.get(&B)?))
}
