use super::{registry, ParameterType};
use crate::error::ParameterError;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

thread_local!(
    /// The default values, shared by every set created with [ParameterSet::with_defaults].
    static DEFAULTS: ParameterSet = ParameterSet::build_defaults();
);

/// An opaque token identifying the owner of a claimed parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClaimOwner(u64);

impl ClaimOwner {
    /// Creates an owner token. Distinct owners must use distinct values.
    pub const fn new(token: u64) -> Self {
        Self(token)
    }
}

/// The value recorded by [ParameterSet::set_resettable].
#[derive(Clone, Copy, Debug, PartialEq)]
enum Previous {
    Value(f64),
    Absent,
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    ty: &'static ParameterType,
    value: f64,
    claim: Option<ClaimOwner>,
    previous: Option<Previous>,
}

/// The parameter values of one driver.
///
/// Cloning a set is cheap: both sets alias the same storage until either of them is
/// modified, at which point the modified set takes a private copy. This lets many drivers
/// share default values, and lets perception hand out snapshots of a neighbour's
/// parameters which are unaffected by the neighbour's later changes.
#[derive(Clone, Default)]
pub struct ParameterSet {
    entries: Rc<BTreeMap<&'static str, Entry>>,
}

impl ParameterSet {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a parameter set holding the default value of every well-known parameter.
    ///
    /// # Panics
    /// On first use in a thread, if any default value fails its cross-parameter check.
    pub fn with_defaults() -> Self {
        DEFAULTS.with(|defaults| defaults.clone())
    }

    /// Whether this set still shares its storage with `other`.
    pub fn shares_storage_with(&self, other: &ParameterSet) -> bool {
        Rc::ptr_eq(&self.entries, &other.entries)
    }

    /// Whether the parameter has a value.
    pub fn contains(&self, ty: &ParameterType) -> bool {
        self.entries.contains_key(ty.id())
    }

    /// Gets the value of a parameter.
    pub fn get(&self, ty: &'static ParameterType) -> Result<f64, ParameterError> {
        self.get_optional(ty)
            .ok_or(ParameterError::Missing { id: ty.id() })
    }

    /// Gets the value of a parameter, if it is set.
    pub fn get_optional(&self, ty: &ParameterType) -> Option<f64> {
        self.entries.get(ty.id()).map(|entry| entry.value)
    }

    /// The owner of a claimed parameter, if any.
    pub fn claim_owner(&self, ty: &ParameterType) -> Option<ClaimOwner> {
        self.entries.get(ty.id()).and_then(|entry| entry.claim)
    }

    /// Iterates over the parameter types and values, ordered by identifier.
    pub fn iter(&self) -> impl Iterator<Item = (&'static ParameterType, f64)> + '_ {
        self.entries.values().map(|entry| (entry.ty, entry.value))
    }

    /// Sets the value of an unclaimed parameter.
    pub fn set(&mut self, ty: &'static ParameterType, value: f64) -> Result<(), ParameterError> {
        self.validate(ty, value, None)?;
        self.commit(ty, value, None);
        Ok(())
    }

    /// Sets the value of a parameter and claims it for `owner`.
    /// Other owners, and unowned setters, can no longer change the value.
    pub fn set_claimed(
        &mut self,
        ty: &'static ParameterType,
        value: f64,
        owner: ClaimOwner,
    ) -> Result<(), ParameterError> {
        self.validate(ty, value, Some(owner))?;
        self.commit(ty, value, Some(owner));
        Ok(())
    }

    /// Sets the value of a parameter, remembering the current value (or its absence)
    /// so that a single [reset](Self::reset) restores it. Only one level is remembered.
    pub fn set_resettable(
        &mut self,
        ty: &'static ParameterType,
        value: f64,
    ) -> Result<(), ParameterError> {
        self.validate(ty, value, None)?;
        let previous = match self.get_optional(ty) {
            Some(value) => Previous::Value(value),
            None => Previous::Absent,
        };
        self.commit(ty, value, None);
        if let Some(entry) = Rc::make_mut(&mut self.entries).get_mut(ty.id()) {
            entry.previous = Some(previous);
        }
        Ok(())
    }

    /// Restores the value recorded by the last [set_resettable](Self::set_resettable),
    /// removing the parameter if it was absent. Fails if there is nothing to restore.
    pub fn reset(&mut self, ty: &'static ParameterType) -> Result<(), ParameterError> {
        let entry = self.entries.get(ty.id());
        let previous = entry
            .and_then(|entry| entry.previous)
            .ok_or(ParameterError::NoResetHistory { id: ty.id() })?;
        if entry.and_then(|entry| entry.claim).is_some() {
            return Err(ParameterError::Claimed { id: ty.id() });
        }

        let entries = Rc::make_mut(&mut self.entries);
        match previous {
            Previous::Value(value) => {
                if let Some(entry) = entries.get_mut(ty.id()) {
                    entry.value = value;
                    entry.previous = None;
                }
            }
            Previous::Absent => {
                entries.remove(ty.id());
            }
        }
        Ok(())
    }

    /// Checks a candidate value without modifying the set.
    fn validate(
        &self,
        ty: &'static ParameterType,
        value: f64,
        owner: Option<ClaimOwner>,
    ) -> Result<(), ParameterError> {
        if let Some(claim) = self.claim_owner(ty) {
            if Some(claim) != owner {
                return Err(ParameterError::Claimed { id: ty.id() });
            }
        }
        ty.validate(value, self)
    }

    /// Stores an already validated value. Any resettable history is discarded, so a
    /// [reset](Self::reset) never undoes a later plain set.
    fn commit(&mut self, ty: &'static ParameterType, value: f64, owner: Option<ClaimOwner>) {
        let entries = Rc::make_mut(&mut self.entries);
        let entry = entries.entry(ty.id()).or_insert(Entry {
            ty,
            value,
            claim: None,
            previous: None,
        });
        entry.value = value;
        entry.previous = None;
        if owner.is_some() {
            entry.claim = owner;
        }
    }

    fn build_defaults() -> Self {
        let mut set = Self::new();
        for &ty in registry() {
            if let Some(default) = ty.default_value() {
                set.commit(ty, default, None);
            }
        }
        for (ty, value) in set.iter() {
            if let Err(err) = ty.validate(value, &set) {
                panic!("Invalid default for parameter '{}': {}", ty.id(), err);
            }
        }
        set
    }
}

impl fmt::Debug for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(id, entry)| (id, entry.value)))
            .finish()
    }
}
