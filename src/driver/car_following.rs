use crate::error::ParameterError;
use crate::parameters::{ParameterSet, A, B, DELTA, FSPEED, S0, T};
use crate::perception::SpeedLimitInfo;
use std::fmt::Debug;

/// A leader as seen by a car-following model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Leader {
    /// The net gap to the leader in m.
    pub gap: f64,
    /// The leader's speed in m/s.
    pub speed: f64,
}

impl Leader {
    pub fn new(gap: f64, speed: f64) -> Self {
        Self { gap, speed }
    }
}

/// A longitudinal driving model.
///
/// All behavioural values are read from the driver's parameters on every call, so that
/// temporary parameter changes, e.g. a shorter headway, take effect immediately.
pub trait CarFollowingModel: Debug {
    /// The speed the driver would like to drive at.
    fn desired_speed(
        &self,
        params: &ParameterSet,
        limits: &SpeedLimitInfo,
    ) -> Result<f64, ParameterError>;

    /// The acceleration in response to the leaders and speed limits, in m/s<sup>2</sup>.
    fn following_acceleration(
        &self,
        params: &ParameterSet,
        speed: f64,
        limits: &SpeedLimitInfo,
        leaders: &[Leader],
    ) -> Result<f64, ParameterError>;

    /// The acceleration needed to stop before a stop line `distance` metres ahead.
    fn stopping_acceleration(
        &self,
        params: &ParameterSet,
        speed: f64,
        limits: &SpeedLimitInfo,
        distance: f64,
    ) -> Result<f64, ParameterError> {
        self.following_acceleration(params, speed, limits, &[Leader::new(distance, 0.0)])
    }
}

/// The intelligent driver model.
#[derive(Clone, Copy, Debug, Default)]
pub struct Idm;

/// The intelligent driver model with the free and interaction terms combined by minimum,
/// which yields more realistic capacity.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdmPlus;

/// The terms of the intelligent driver model.
struct IdmTerms {
    max_acc: f64,
    /// `1 - (v / v0)^delta`
    free: f64,
    /// `(s* / s)^2` for the most restrictive leader, or zero.
    interaction: f64,
    /// Whether a leader is at or beyond bumper contact.
    collision: bool,
}

impl IdmTerms {
    fn new(
        params: &ParameterSet,
        speed: f64,
        desired_speed: f64,
        leaders: &[Leader],
    ) -> Result<Self, ParameterError> {
        let max_acc = params.get(&A)?;
        let comf_dec = params.get(&B)?;
        let min_gap = params.get(&S0)?;
        let headway = params.get(&T)?;
        let delta = params.get(&DELTA)?;

        let free = if desired_speed > 0.0 {
            1.0 - (speed / desired_speed).powf(delta)
        } else if speed > 0.0 {
            -comf_dec / max_acc
        } else {
            0.0
        };

        let factor = 1. / (2. * (max_acc * comf_dec).sqrt());
        let mut interaction: f64 = 0.0;
        let mut collision = false;
        for leader in leaders {
            if leader.gap <= 0.0 {
                collision = true;
                continue;
            }
            let appr = speed - leader.speed;
            let ss = min_gap + f64::max(0.0, speed * headway + speed * appr * factor);
            let term = ss / leader.gap;
            interaction = interaction.max(term * term);
        }

        Ok(Self {
            max_acc,
            free,
            interaction,
            collision,
        })
    }
}

fn desired_speed(params: &ParameterSet, limits: &SpeedLimitInfo) -> Result<f64, ParameterError> {
    let fspeed = params.get(&FSPEED)?;
    Ok(f64::min(fspeed * limits.speed_limit, limits.max_vehicle_speed))
}

impl CarFollowingModel for Idm {
    fn desired_speed(
        &self,
        params: &ParameterSet,
        limits: &SpeedLimitInfo,
    ) -> Result<f64, ParameterError> {
        desired_speed(params, limits)
    }

    fn following_acceleration(
        &self,
        params: &ParameterSet,
        speed: f64,
        limits: &SpeedLimitInfo,
        leaders: &[Leader],
    ) -> Result<f64, ParameterError> {
        let v0 = desired_speed(params, limits)?;
        let terms = IdmTerms::new(params, speed, v0, leaders)?;
        if terms.collision {
            return Ok(-10. * terms.max_acc);
        }
        Ok(terms.max_acc * (terms.free - terms.interaction))
    }
}

impl CarFollowingModel for IdmPlus {
    fn desired_speed(
        &self,
        params: &ParameterSet,
        limits: &SpeedLimitInfo,
    ) -> Result<f64, ParameterError> {
        desired_speed(params, limits)
    }

    fn following_acceleration(
        &self,
        params: &ParameterSet,
        speed: f64,
        limits: &SpeedLimitInfo,
        leaders: &[Leader],
    ) -> Result<f64, ParameterError> {
        let v0 = desired_speed(params, limits)?;
        let terms = IdmTerms::new(params, speed, v0, leaders)?;
        if terms.collision {
            return Ok(-10. * terms.max_acc);
        }
        Ok(terms.max_acc * f64::min(terms.free, 1. - terms.interaction))
    }
}
