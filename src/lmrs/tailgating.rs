//! Social pressure from being held back by a slower leader.

use super::util::Follower;
use crate::error::StepError;
use crate::parameters::{ParameterSet, LOOKAHEAD, T, TMAX, TMIN, VGAIN};
use crate::perception::{HeadwayObservation, Perception, RelativeLane};
use crate::util::{clamp01, Interval};
use serde::Deserialize;

/// How a driver responds to a slower leader.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tailgating {
    /// No social pressure is determined.
    None,
    /// Social pressure is determined and committed for others to read.
    RhoOnly,
    /// As [RhoOnly](Self::RhoOnly), and the headway shortens with the pressure.
    #[default]
    Pressure,
}

/// The social pressure `rho` in [0, 1] exerted on `leader`.
pub fn social_pressure(
    desired_speed: f64,
    leader: Option<&HeadwayObservation>,
    v_gain: f64,
    look_ahead: f64,
) -> f64 {
    let leader = match leader {
        Some(leader) if desired_speed > leader.speed => leader,
        _ => return 0.0,
    };
    let proximity = 1.0 - leader.gap() / look_ahead;
    let exponent = -((desired_speed - leader.speed) / v_gain) * proximity;
    clamp01(1.0 - exponent.exp())
}

impl Tailgating {
    /// Determines the social pressure and, depending on the policy, tightens the headway.
    ///
    /// Returns the pressure to commit at the end of the step, or `None` if no pressure is
    /// determined.
    pub fn apply(
        &self,
        perception: &dyn Perception,
        params: &mut ParameterSet,
        ego: Follower,
    ) -> Result<Option<f64>, StepError> {
        if *self == Tailgating::None {
            return Ok(None);
        }
        let desired_speed = ego.model.desired_speed(params, ego.limits)?;
        let leader = perception.leaders(RelativeLane::Current)?.first();
        let rho = social_pressure(
            desired_speed,
            leader,
            params.get(&VGAIN)?,
            params.get(&LOOKAHEAD)?,
        );

        if *self == Tailgating::Pressure {
            let headways = Interval::new(params.get(&TMAX)?, params.get(&TMIN)?);
            let headway = f64::min(params.get(&T)?, headways.lerp(rho));
            params.set(&T, headway)?;
        }
        Ok(Some(rho))
    }
}
