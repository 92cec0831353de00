// src/test_utils.rs

//! This module contains utilities for testing.

use crate::actuation::Actuator;
use crate::error::ActuationError;
use crate::stick::Controls;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// A constant defining the tolerance within which floating-point values
/// are considered close enough to be equal.
pub const TEST_TOLERANCE: f64 = 1e-5;

/// Checks if two floating point numbers are close enough to be considered
/// equal.
///
/// # Arguments
/// * `target` - The target value.
/// * `value` - The value to compare against the target.
///
/// # Returns
/// `true` if the absolute difference between `target` and `value` is less than
/// `TEST_TOLERANCE`, otherwise `false`.
pub fn value_close(target: f64, value: f64) -> bool {
    (target - value).abs() < TEST_TOLERANCE
}

/// One recorded call on [`MockActuator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorCall {
    /// `takeoff`
    Takeoff,
    /// `land`
    Land,
    /// `return_home`
    ReturnHome,
    /// `enable_virtual_stick`
    EnableVirtualStick,
    /// `disable_virtual_stick`
    DisableVirtualStick,
}

impl ActuatorCall {
    /// Operation name used in scripted errors.
    pub fn operation(self) -> &'static str {
        match self {
            ActuatorCall::Takeoff => "takeoff",
            ActuatorCall::Land => "land",
            ActuatorCall::ReturnHome => "return_home",
            ActuatorCall::EnableVirtualStick => "enable_virtual_stick",
            ActuatorCall::DisableVirtualStick => "disable_virtual_stick",
        }
    }
}

/// Actuator double that records calls and stick writes.
///
/// Calls succeed unless a failure was scripted with [`fail_next`]. A call
/// kind can be held pending with [`hold`] until [`release`]d, which is how
/// tests observe the state machines mid-request.
///
/// [`fail_next`]: MockActuator::fail_next
/// [`hold`]: MockActuator::hold
/// [`release`]: MockActuator::release
#[derive(Debug, Default)]
pub struct MockActuator {
    calls: Mutex<Vec<ActuatorCall>>,
    writes: Mutex<Vec<Controls>>,
    failures: Mutex<HashMap<ActuatorCall, Vec<String>>>,
    gates: Mutex<HashMap<ActuatorCall, Arc<Semaphore>>>,
}

impl MockActuator {
    /// Makes the next call of `call` fail with `description`.
    pub fn fail_next(&self, call: ActuatorCall, description: &str) {
        self.failures
            .lock()
            .unwrap()
            .entry(call)
            .or_default()
            .push(description.to_string());
    }

    /// Keeps calls of `call` pending until released.
    pub fn hold(&self, call: ActuatorCall) {
        self.gates
            .lock()
            .unwrap()
            .insert(call, Arc::new(Semaphore::new(0)));
    }

    /// Lets one held call of `call` resolve.
    pub fn release(&self, call: ActuatorCall) {
        if let Some(gate) = self.gates.lock().unwrap().get(&call) {
            gate.add_permits(1);
        }
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls of one kind so far.
    pub fn count(&self, call: ActuatorCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    /// Every stick frame written so far.
    pub fn writes(&self) -> Vec<Controls> {
        self.writes.lock().unwrap().clone()
    }

    async fn record(&self, call: ActuatorCall) -> Result<(), ActuationError> {
        self.calls.lock().unwrap().push(call);

        let gate = self.gates.lock().unwrap().get(&call).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&call)
            .and_then(|queue| (!queue.is_empty()).then(|| queue.remove(0)));
        match failure {
            Some(description) => Err(ActuationError::rejected(call.operation(), description)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Actuator for MockActuator {
    async fn takeoff(&self) -> Result<(), ActuationError> {
        self.record(ActuatorCall::Takeoff).await
    }

    async fn land(&self) -> Result<(), ActuationError> {
        self.record(ActuatorCall::Land).await
    }

    async fn return_home(&self) -> Result<(), ActuationError> {
        self.record(ActuatorCall::ReturnHome).await
    }

    async fn enable_virtual_stick(&self) -> Result<(), ActuationError> {
        self.record(ActuatorCall::EnableVirtualStick).await
    }

    async fn disable_virtual_stick(&self) -> Result<(), ActuationError> {
        self.record(ActuatorCall::DisableVirtualStick).await
    }

    fn write_sticks(&self, controls: Controls) {
        self.writes.lock().unwrap().push(controls);
    }
}
