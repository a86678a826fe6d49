//! Lane change desire and its aggregation from incentives.

use crate::driver::CarFollowingModel;
use crate::error::StepError;
use crate::parameters::{ParameterSet, DCOOP, DSYNC};
use crate::perception::{EgoState, LateralDirection, Perception, SpeedLimitInfo};
use crate::util::clamp01;
use std::fmt::Debug;

/// The desire to change lane, per direction.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Desire {
    pub left: f64,
    pub right: f64,
}

impl Desire {
    pub const ZERO: Desire = Desire {
        left: 0.0,
        right: 0.0,
    };

    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    /// The desire towards the given direction.
    pub fn get(&self, dir: LateralDirection) -> f64 {
        match dir {
            LateralDirection::Left => self.left,
            LateralDirection::Right => self.right,
        }
    }

    /// Whether the left desire is at least the right desire.
    pub fn left_dominates(&self) -> bool {
        self.left >= self.right
    }

    /// The dominant direction and its desire.
    pub fn dominant(&self) -> (LateralDirection, f64) {
        if self.left_dominates() {
            (LateralDirection::Left, self.left)
        } else {
            (LateralDirection::Right, self.right)
        }
    }
}

/// Everything an incentive may consider.
#[derive(Clone, Copy)]
pub struct IncentiveContext<'a> {
    pub perception: &'a dyn Perception,
    pub params: &'a ParameterSet,
    pub ego: EgoState,
    pub limits: SpeedLimitInfo,
    pub car_following: &'a dyn CarFollowingModel,
}

/// A reason to change lane that must be acted on, e.g. following the route.
pub trait MandatoryIncentive: Debug {
    fn determine_desire(&self, ctx: &IncentiveContext) -> Result<Desire, StepError>;
}

/// A reason to change lane that is optional, e.g. a speed gain.
pub trait VoluntaryIncentive: Debug {
    /// Determines the desire, given the already aggregated mandatory desire.
    fn determine_desire(
        &self,
        ctx: &IncentiveContext,
        mandatory: Desire,
    ) -> Result<Desire, StepError>;
}

/// Combines mandatory and voluntary incentives into a single desire.
///
/// Per direction, the most compelling mandatory incentive counts and voluntary incentives
/// add up. Voluntary desire which opposes a strong mandatory desire is faded out between
/// `DSYNC` and `DCOOP`.
pub fn aggregate(
    mandatory: &[Box<dyn MandatoryIncentive>],
    voluntary: &[Box<dyn VoluntaryIncentive>],
    ctx: &IncentiveContext,
) -> Result<Desire, StepError> {
    let mut mandatory_desire = if mandatory.is_empty() {
        Desire::ZERO
    } else {
        Desire::new(f64::NEG_INFINITY, f64::NEG_INFINITY)
    };
    for incentive in mandatory {
        let desire = incentive.determine_desire(ctx)?;
        mandatory_desire.left = f64::max(mandatory_desire.left, desire.left);
        mandatory_desire.right = f64::max(mandatory_desire.right, desire.right);
    }

    let mut voluntary_desire = Desire::ZERO;
    for incentive in voluntary {
        let desire = incentive.determine_desire(ctx, mandatory_desire)?;
        voluntary_desire.left += desire.left;
        voluntary_desire.right += desire.right;
    }

    let d_sync = ctx.params.get(&DSYNC)?;
    let d_coop = ctx.params.get(&DCOOP)?;
    let desire = Desire {
        left: combine(mandatory_desire.left, voluntary_desire.left, d_sync, d_coop),
        right: combine(mandatory_desire.right, voluntary_desire.right, d_sync, d_coop),
    };
    log::trace!(
        "desire: mandatory {:?}, voluntary {:?}, total {:?}",
        mandatory_desire,
        voluntary_desire,
        desire
    );
    Ok(desire)
}

/// Combines the mandatory and voluntary desire of one direction.
pub fn combine(mandatory: f64, voluntary: f64, d_sync: f64, d_coop: f64) -> f64 {
    let magnitude = mandatory.abs();
    let theta = if magnitude <= d_sync || mandatory * voluntary >= 0.0 {
        1.0
    } else if magnitude < d_coop {
        clamp01((d_coop - magnitude) / (d_coop - d_sync))
    } else {
        0.0
    };
    mandatory + theta * voluntary
}
