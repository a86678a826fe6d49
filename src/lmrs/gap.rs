use super::util::{neighbour_response_with, tag_along, without_conflicts, Follower};
use crate::error::StepError;
use crate::parameters::{ParameterSet, B, T, TMAX, TMIN};
use crate::perception::{LateralDirection, Perception};
use serde::Deserialize;

/// Decides whether a gap in an adjacent lane is safe to enter now.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapAcceptance {
    /// The new follower is judged with its own headway parameters.
    #[default]
    Informed,
    /// The new follower is judged as if it had the headway range of the perceiving driver.
    EgoHeadway,
}

impl GapAcceptance {
    /// Determines whether the gap towards `dir` is accepted at the given desire.
    ///
    /// Both the new follower and the driver itself may need to decelerate, but no more than
    /// `desire * B`.
    pub fn accept(
        &self,
        perception: &dyn Perception,
        params: &mut ParameterSet,
        ego: Follower,
        dir: LateralDirection,
        desire: f64,
    ) -> Result<bool, StepError> {
        if perception.alongside(dir)? {
            return Ok(false);
        }

        let lane = dir.lane();
        let excluded = perception.upstream_of_conflicts(lane)?;
        let threshold = -desire * params.get(&B)?;

        if let Some(follower) = without_conflicts(perception.followers(lane)?, excluded).next() {
            let mut follower_params = follower.parameters.clone();
            if *self == GapAcceptance::EgoHeadway {
                let tmin = params.get(&TMIN)?;
                let tmax = params.get(&TMAX)?;
                override_headway_range(&mut follower_params, tmin, tmax)?;
            }
            let acc = neighbour_response_with(
                follower,
                &mut follower_params,
                follower.gap(),
                ego.speed,
                desire,
            )?;
            if acc < threshold {
                log::trace!("gap {:?} rejected: follower {:.2} < {:.2}", dir, acc, threshold);
                return Ok(false);
            }
        }

        if let Some(leader) = without_conflicts(perception.leaders(lane)?, excluded).next() {
            let acc = tag_along(leader, desire, params, ego)?;
            if acc < threshold {
                log::trace!("gap {:?} rejected: own {:.2} < {:.2}", dir, acc, threshold);
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Replaces the headway range of a parameter set, moving the headway into the new range.
/// The updates are ordered such that every intermediate state passes the cross-checks.
fn override_headway_range(
    params: &mut ParameterSet,
    tmin: f64,
    tmax: f64,
) -> Result<(), StepError> {
    let headway = params.get(&T)?;
    params.set(&TMIN, f64::min(tmin, params.get(&TMIN)?))?;
    params.set(&TMAX, f64::max(tmax, params.get(&TMAX)?))?;
    params.set(&T, headway.clamp(tmin, tmax))?;
    params.set(&TMIN, tmin)?;
    params.set(&TMAX, tmax)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::driver::IdmPlus;
    use crate::perception::{
        EgoState, HeadwayObservation, PerceptionSnapshot, RelativeLane, SpeedLimitInfo,
    };
    use crate::VehicleId;
    use slotmap::KeyData;
    use std::rc::Rc;

    const EGO: EgoState = EgoState {
        speed: 20.0,
        length: 4.5,
    };

    fn limits() -> SpeedLimitInfo {
        SpeedLimitInfo::new(25.0, 50.0)
    }

    fn obs(distance: f64, speed: f64, params: ParameterSet) -> HeadwayObservation {
        HeadwayObservation::new(
            VehicleId::from(KeyData::from_ffi(7)),
            distance,
            speed,
            params,
            Rc::new(IdmPlus),
            limits(),
        )
    }

    fn accept(policy: GapAcceptance, perception: &PerceptionSnapshot, desire: f64) -> bool {
        let mut params = ParameterSet::with_defaults();
        let ego = Follower {
            speed: EGO.speed,
            limits: &limits(),
            model: &IdmPlus,
        };
        let accepted = policy
            .accept(perception, &mut params, ego, LateralDirection::Left, desire)
            .unwrap();
        assert_eq!(params.get(&T), Ok(1.2));
        accepted
    }

    fn strict_follower() -> ParameterSet {
        let mut params = ParameterSet::with_defaults();
        params.set(&TMAX, 2.0).unwrap();
        params.set(&T, 2.0).unwrap();
        params.set(&TMIN, 1.0).unwrap();
        params
    }

    #[test]
    fn empty_lane_is_accepted() {
        let perception = PerceptionSnapshot::new(EGO, limits()).with_lane(LateralDirection::Left);
        assert!(accept(GapAcceptance::Informed, &perception, 0.4));
    }

    #[test]
    fn vehicle_alongside_is_never_accepted() {
        let perception = PerceptionSnapshot::new(EGO, limits())
            .with_lane(LateralDirection::Left)
            .with_alongside(LateralDirection::Left);
        for desire in [-1.0, 0.0, 0.365, 0.5, 1.0, 10.0] {
            assert!(!accept(GapAcceptance::Informed, &perception, desire));
            assert!(!accept(GapAcceptance::EgoHeadway, &perception, desire));
        }
    }

    #[test]
    fn close_leader_needs_more_desire() {
        let perception = PerceptionSnapshot::new(EGO, limits())
            .with_lane(LateralDirection::Left)
            .with_vehicle(RelativeLane::Left, obs(14.0, 20.0, ParameterSet::with_defaults()));
        assert!(!accept(GapAcceptance::Informed, &perception, 0.4));
        assert!(accept(GapAcceptance::Informed, &perception, 1.0));
    }

    #[test]
    fn ego_headway_overrides_follower() {
        let perception = PerceptionSnapshot::new(EGO, limits())
            .with_lane(LateralDirection::Left)
            .with_vehicle(RelativeLane::Left, obs(-22.0, 20.0, strict_follower()));
        assert!(!accept(GapAcceptance::Informed, &perception, 0.5));
        assert!(accept(GapAcceptance::EgoHeadway, &perception, 0.5));
    }

    #[test]
    fn conflicting_vehicles_are_ignored() {
        let follower = obs(-5.0, 25.0, ParameterSet::with_defaults());
        let id = follower.id;
        let perception = PerceptionSnapshot::new(EGO, limits())
            .with_lane(LateralDirection::Left)
            .with_vehicle(RelativeLane::Left, follower);
        assert!(!accept(GapAcceptance::Informed, &perception, 0.5));
        let perception = perception.with_conflict(RelativeLane::Left, id);
        assert!(accept(GapAcceptance::Informed, &perception, 0.5));
    }

    #[test]
    fn headway_range_override() {
        let mut params = strict_follower();
        override_headway_range(&mut params, 0.56, 1.2).unwrap();
        assert_eq!(params.get(&TMIN), Ok(0.56));
        assert_eq!(params.get(&TMAX), Ok(1.2));
        assert_eq!(params.get(&T), Ok(1.2));
    }
}
