//! Behavioural parameters.
//!
//! A [ParameterType] describes one scalar parameter: its identifier, physical domain,
//! optional default, an optional single-value [Constraint] and an optional cross-parameter
//! check. The well-known types used by the lane change model live here as global statics;
//! they are built once on first use and never change afterwards.
//!
//! Values are stored per driver in a [ParameterSet].

use crate::error::ParameterError;
use once_cell::sync::Lazy;
use std::fmt;
use std::hash::{Hash, Hasher};

pub use factory::ParameterFactory;
pub use set::{ClaimOwner, ParameterSet};

mod factory;
mod set;

/// A pure check of a candidate value against the current contents of a parameter set.
/// Returns a human readable reason on rejection.
pub type CrossCheck = fn(f64, &ParameterSet) -> Result<(), String>;

/// The physical domain of a parameter value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Domain {
    /// m/s<sup>2</sup>
    Acceleration,
    /// s
    Duration,
    /// m
    Length,
    /// m/s
    Speed,
    /// A unitless factor or score.
    Dimensionless,
}

impl Domain {
    /// The SI unit of the domain.
    pub fn unit(&self) -> &'static str {
        match self {
            Domain::Acceleration => "m/s^2",
            Domain::Duration => "s",
            Domain::Length => "m",
            Domain::Speed => "m/s",
            Domain::Dimensionless => "-",
        }
    }
}

/// A constraint on a single parameter value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Constraint {
    Positive,
    NonNegative,
    UnitInterval,
}

impl Constraint {
    /// Determines whether the value satisfies the constraint.
    pub fn accepts(&self, value: f64) -> bool {
        match self {
            Constraint::Positive => value > 0.0,
            Constraint::NonNegative => value >= 0.0,
            Constraint::UnitInterval => (0.0..=1.0).contains(&value),
        }
    }

    /// A short description, used in error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Constraint::Positive => "value must be positive",
            Constraint::NonNegative => "value must not be negative",
            Constraint::UnitInterval => "value must be within [0, 1]",
        }
    }
}

/// Describes a behavioural parameter.
#[derive(Clone, Copy)]
pub struct ParameterType {
    id: &'static str,
    description: &'static str,
    domain: Domain,
    default: Option<f64>,
    constraint: Option<Constraint>,
    check: Option<CrossCheck>,
}

impl ParameterType {
    /// Creates a parameter type without a default, constraint or check.
    pub const fn new(id: &'static str, description: &'static str, domain: Domain) -> Self {
        Self {
            id,
            description,
            domain,
            default: None,
            constraint: None,
            check: None,
        }
    }

    /// Sets the default value.
    ///
    /// # Panics
    /// If the default does not satisfy the constraint of this type.
    pub fn with_default(mut self, default: f64) -> Self {
        self.default = Some(default);
        self.assert_default();
        self
    }

    /// Sets the single-value constraint.
    ///
    /// # Panics
    /// If an already set default does not satisfy the constraint.
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self.assert_default();
        self
    }

    /// Sets the cross-parameter check.
    pub fn with_check(mut self, check: CrossCheck) -> Self {
        self.check = Some(check);
        self
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn default_value(&self) -> Option<f64> {
        self.default
    }

    pub fn constraint(&self) -> Option<Constraint> {
        self.constraint
    }

    /// Validates a candidate value against the constraint and the cross-parameter check,
    /// given the current contents of `params`.
    pub fn validate(&self, value: f64, params: &ParameterSet) -> Result<(), ParameterError> {
        if !value.is_finite() {
            return Err(ParameterError::InvalidValue { id: self.id, value });
        }
        if let Some(constraint) = self.constraint {
            if !constraint.accepts(value) {
                return Err(ParameterError::ConstraintViolated {
                    id: self.id,
                    value,
                    constraint: constraint.describe(),
                });
            }
        }
        if let Some(check) = self.check {
            check(value, params).map_err(|reason| ParameterError::CheckFailed {
                id: self.id,
                value,
                reason,
            })?;
        }
        Ok(())
    }

    fn assert_default(&self) {
        if let (Some(default), Some(constraint)) = (self.default, self.constraint) {
            if !default.is_finite() || !constraint.accepts(default) {
                panic!(
                    "Default {} of parameter '{}' violates its constraint: {}",
                    default,
                    self.id,
                    constraint.describe()
                );
            }
        }
    }
}

impl PartialEq for ParameterType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.description == other.description
            && self.domain == other.domain
            && self.default.map(f64::to_bits) == other.default.map(f64::to_bits)
    }
}

impl Eq for ParameterType {}

impl Hash for ParameterType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.domain.unit())
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.description)
    }
}

/// Rejects values that are not strictly below the current value of `other`.
fn below(value: f64, params: &ParameterSet, other: &'static ParameterType) -> Result<(), String> {
    match params.get_optional(other) {
        Some(bound) if value >= bound => Err(format!("must be below {} = {}", other.id, bound)),
        _ => Ok(()),
    }
}

/// Rejects values that are not strictly above the current value of `other`.
fn above(value: f64, params: &ParameterSet, other: &'static ParameterType) -> Result<(), String> {
    match params.get_optional(other) {
        Some(bound) if value <= bound => Err(format!("must be above {} = {}", other.id, bound)),
        _ => Ok(()),
    }
}

pub static A: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("A", "Maximum (desired) car-following acceleration", Domain::Acceleration)
        .with_default(1.25)
        .with_constraint(Constraint::Positive)
});

pub static B: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("B", "Maximum comfortable car-following deceleration", Domain::Acceleration)
        .with_default(2.09)
        .with_constraint(Constraint::Positive)
        .with_check(|value, params| {
            above(value, params, &B0)?;
            below(value, params, &BCRIT)
        })
});

pub static B0: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("B0", "Maximum adjustment deceleration, e.g. when speed limit drops", Domain::Acceleration)
        .with_default(0.5)
        .with_constraint(Constraint::Positive)
        .with_check(|value, params| below(value, params, &B))
});

pub static BCRIT: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("BCRIT", "Maximum critical deceleration, e.g. stop for a dead end", Domain::Acceleration)
        .with_default(3.5)
        .with_constraint(Constraint::Positive)
        .with_check(|value, params| above(value, params, &B))
});

pub static S0: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("S0", "Stopping distance", Domain::Length)
        .with_default(3.0)
        .with_constraint(Constraint::Positive)
});

pub static T: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("T", "Desired headway", Domain::Duration)
        .with_default(1.2)
        .with_constraint(Constraint::Positive)
        .with_check(|value, params| {
            match params.get_optional(&TMIN) {
                Some(tmin) if value < tmin => return Err(format!("must not be below TMIN = {}", tmin)),
                _ => {}
            }
            match params.get_optional(&TMAX) {
                Some(tmax) if value > tmax => Err(format!("must not be above TMAX = {}", tmax)),
                _ => Ok(()),
            }
        })
});

pub static TMIN: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("TMIN", "Minimum car-following headway", Domain::Duration)
        .with_default(0.56)
        .with_constraint(Constraint::Positive)
        .with_check(|value, params| {
            below(value, params, &TMAX)?;
            match params.get_optional(&T) {
                Some(t) if value > t => Err(format!("must not be above T = {}", t)),
                _ => Ok(()),
            }
        })
});

pub static TMAX: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("TMAX", "Maximum car-following headway", Domain::Duration)
        .with_default(1.2)
        .with_constraint(Constraint::Positive)
        .with_check(|value, params| {
            above(value, params, &TMIN)?;
            match params.get_optional(&T) {
                Some(t) if value < t => Err(format!("must not be below T = {}", t)),
                _ => Ok(()),
            }
        })
});

pub static DELTA: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("DELTA", "Acceleration flattening exponent towards desired speed", Domain::Dimensionless)
        .with_default(4.0)
        .with_constraint(Constraint::Positive)
});

pub static FSPEED: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("FSPEED", "Factor on speed limit to determine desired speed", Domain::Dimensionless)
        .with_default(1.0)
        .with_constraint(Constraint::Positive)
});

pub static DFREE: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("DFREE", "Free lane change desire threshold", Domain::Dimensionless)
        .with_default(0.365)
        .with_constraint(Constraint::UnitInterval)
        .with_check(|value, params| below(value, params, &DSYNC))
});

pub static DSYNC: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("DSYNC", "Synchronized lane change desire threshold", Domain::Dimensionless)
        .with_default(0.577)
        .with_constraint(Constraint::UnitInterval)
        .with_check(|value, params| {
            above(value, params, &DFREE)?;
            below(value, params, &DCOOP)
        })
});

pub static DCOOP: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("DCOOP", "Cooperative lane change desire threshold", Domain::Dimensionless)
        .with_default(0.788)
        .with_constraint(Constraint::UnitInterval)
        .with_check(|value, params| above(value, params, &DSYNC))
});

pub static TAU: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("TAU", "Headway relaxation time", Domain::Duration)
        .with_default(25.0)
        .with_constraint(Constraint::Positive)
});

pub static VGAIN: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("VGAIN", "Speed gain for a full lane change desire", Domain::Speed)
        .with_default(69.6 / 3.6)
        .with_constraint(Constraint::Positive)
});

pub static LOOKAHEAD: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("LOOKAHEAD", "Look-ahead distance", Domain::Length)
        .with_default(295.0)
        .with_constraint(Constraint::Positive)
});

pub static T0: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("T0", "Look-ahead time for mandatory lane changes", Domain::Duration)
        .with_default(43.0)
        .with_constraint(Constraint::Positive)
});

pub static LCDUR: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("LCDUR", "Lane change duration", Domain::Duration)
        .with_default(3.0)
        .with_constraint(Constraint::Positive)
});

pub static VCONG: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("VCONG", "Speed threshold below which traffic is congested", Domain::Speed)
        .with_default(60.0 / 3.6)
        .with_constraint(Constraint::Positive)
});

pub static SOCIO: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("SOCIO", "Sensitivity to social pressure from followers", Domain::Dimensionless)
        .with_default(0.5)
        .with_constraint(Constraint::UnitInterval)
});

pub static RHO: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("RHO", "Social pressure exerted on the leader", Domain::Dimensionless)
        .with_default(0.0)
        .with_constraint(Constraint::UnitInterval)
});

pub static DLEFT: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("DLEFT", "Desire to change to the left lane", Domain::Dimensionless)
        .with_default(0.0)
});

pub static DRIGHT: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("DRIGHT", "Desire to change to the right lane", Domain::Dimensionless)
        .with_default(0.0)
});

pub static DLC: Lazy<ParameterType> = Lazy::new(|| {
    ParameterType::new("DLC", "Desire of the current or last lane change", Domain::Dimensionless)
});

/// All well-known parameter types, in registration order.
static REGISTRY: Lazy<Vec<&'static ParameterType>> = Lazy::new(|| {
    let types: Vec<&'static ParameterType> = vec![
        &*A, &*B0, &*B, &*BCRIT, &*S0, &*TMIN, &*TMAX, &*T, &*DELTA, &*FSPEED, &*DFREE,
        &*DSYNC, &*DCOOP, &*TAU, &*VGAIN, &*LOOKAHEAD, &*T0, &*LCDUR, &*VCONG, &*SOCIO, &*RHO,
        &*DLEFT, &*DRIGHT, &*DLC,
    ];
    for (idx, ty) in types.iter().enumerate() {
        if types[..idx].iter().any(|other| other.id == ty.id) {
            panic!("Duplicate parameter identifier '{}'", ty.id);
        }
    }
    types
});

/// Returns all well-known parameter types.
pub fn registry() -> &'static [&'static ParameterType] {
    &REGISTRY
}

/// Looks up a well-known parameter type by its identifier.
pub fn lookup(id: &str) -> Result<&'static ParameterType, ParameterError> {
    registry()
        .iter()
        .copied()
        .find(|ty| ty.id == id)
        .ok_or_else(|| ParameterError::UnknownParameter { id: id.to_string() })
}
