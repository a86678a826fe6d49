use crate::driver::Driver;
use crate::lmrs::OperationalPlan;
#[cfg(feature = "debug")]
use serde_json::json;
#[cfg(feature = "debug")]
use slotmap::Key;

#[cfg(feature = "debug")]
thread_local!(
    static DEBUG_FRAME: std::cell::RefCell<Vec<serde_json::Value>> = Default::default();
);

/// Records the outcome of a driver's decision step.
#[allow(unused)]
pub fn debug_decision(driver: &Driver, plan: &OperationalPlan) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        let (left, right) = driver.desire();
        frame.borrow_mut().push(json!({
            "type": "decision",
            "vehicle": driver.id().data().as_ffi(),
            "desire": [left, right],
            "rho": driver.social_pressure(),
            "sync_target": driver.memory().sync_target().map(|id| id.data().as_ffi()),
            "plan": plan,
        }))
    })
}

/// Records a failed decision step.
#[allow(unused)]
pub fn debug_failure(driver: &Driver, reason: &str) {
    #[cfg(feature = "debug")]
    DEBUG_FRAME.with(|frame| {
        frame.borrow_mut().push(json!({
            "type": "failure",
            "vehicle": driver.id().data().as_ffi(),
            "reason": reason,
        }))
    })
}

#[cfg(feature = "debug")]
pub fn take_debug_frame() -> serde_json::Value {
    json!(DEBUG_FRAME.with(|frame| frame.take()))
}
