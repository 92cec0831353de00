// src/session.rs

//! # Virtual Stick Session
//!
//! Owns the application's claim on virtual stick authority and is the only
//! arbiter of whether stick writes may reach the aircraft.
//!
//! ```text
//! Disabled --enable()--> Enabling --ok--> Enabled
//!                            |--err--> Disabled
//! Enabled|Enabling|Disabling --disable()--> Disabling --ok--> Disabled
//!                                               |--err--> Enabled
//! Enabled|Enabling --revoked externally--> Disabled
//! ```
//!
//! The state is plain data behind a `std::sync::Mutex` that is never held
//! across an `.await`. Every request bumps a generation counter so a
//! completion that resolves after the state moved on is reported as
//! [`ActuationError::Superseded`] instead of clobbering the newer state.
//!
//! A request future dropped before the vendor answers reverts its
//! transitional state: an abandoned enable falls back to `Disabled`, an
//! abandoned disable to `Enabled`. The session never stays stuck in
//! `Enabling` or `Disabling`.

use crate::actuation::{Actuator, AuthorityChangeReason, AuthorityOwner};
use crate::error::ActuationError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Virtual stick authority as seen by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum AuthorityState {
    /// No authority held.
    #[default]
    Disabled,
    /// Enable requested, not resolved yet.
    Enabling,
    /// Authority held; stick writes are forwarded.
    Enabled,
    /// Disable requested, not resolved yet.
    Disabling,
}

/// Undoes a transitional state if its request future is dropped.
struct PendingRequest<'a> {
    session: &'a VirtualStickSession,
    operation: &'static str,
    generation: u64,
    revert_to: AuthorityState,
    settled: bool,
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.session.lock();
        if state.generation == self.generation {
            state.authority = self.revert_to;
            state.generation += 1;
            tracing::warn!(
                operation = self.operation,
                state = ?self.revert_to,
                "virtual stick request abandoned"
            );
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    authority: AuthorityState,
    generation: u64,
    owner: Option<AuthorityOwner>,
    last_reason: Option<AuthorityChangeReason>,
    revocation: Option<AuthorityChangeReason>,
}

/// The application's virtual stick authority.
pub struct VirtualStickSession {
    actuator: Arc<dyn Actuator>,
    state: Mutex<SessionState>,
}

impl VirtualStickSession {
    /// A session in `Disabled` over the given actuator.
    pub fn new(actuator: Arc<dyn Actuator>) -> Self {
        Self {
            actuator,
            state: Mutex::new(SessionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current authority state.
    pub fn state(&self) -> AuthorityState {
        self.lock().authority
    }

    /// Last reported authority owner.
    pub fn owner(&self) -> Option<AuthorityOwner> {
        self.lock().owner
    }

    /// Last reported change reason.
    pub fn last_reason(&self) -> Option<AuthorityChangeReason> {
        self.lock().last_reason
    }

    /// The actuator this session drives.
    pub fn actuator(&self) -> &Arc<dyn Actuator> {
        &self.actuator
    }

    /// Requests authority. Only valid from `Disabled`.
    pub async fn enable(&self) -> Result<(), ActuationError> {
        let generation = {
            let mut state = self.lock();
            if state.authority != AuthorityState::Disabled {
                return Err(ActuationError::InvalidAuthorityTransition {
                    operation: "enable",
                    state: state.authority,
                });
            }
            state.authority = AuthorityState::Enabling;
            state.generation += 1;
            state.generation
        };
        tracing::info!("virtual stick enabling");

        let mut pending = PendingRequest {
            session: self,
            operation: "enable",
            generation,
            revert_to: AuthorityState::Disabled,
            settled: false,
        };
        let result = self.actuator.enable_virtual_stick().await;
        pending.settled = true;
        drop(pending);

        let mut state = self.lock();
        if state.generation != generation {
            tracing::debug!("virtual stick enable superseded");
            return Err(ActuationError::Superseded {
                operation: "enable",
            });
        }
        match result {
            Ok(()) => {
                state.authority = AuthorityState::Enabled;
                state.owner = Some(AuthorityOwner::Application);
                tracing::info!("virtual stick enabled");
                Ok(())
            }
            Err(err) => {
                state.authority = AuthorityState::Disabled;
                tracing::error!(%err, "virtual stick enable failed");
                Err(err)
            }
        }
    }

    /// Releases authority. Valid from `Enabled`, from `Enabling` where it
    /// cancels the pending enable, and from `Disabling` where it reissues
    /// the release and supersedes the earlier one.
    ///
    /// A failed disable leaves the session `Enabled`, since the aircraft
    /// may still be under application control.
    pub async fn disable(&self) -> Result<(), ActuationError> {
        let generation = {
            let mut state = self.lock();
            match state.authority {
                AuthorityState::Enabled
                | AuthorityState::Enabling
                | AuthorityState::Disabling => {}
                other => {
                    return Err(ActuationError::InvalidAuthorityTransition {
                        operation: "disable",
                        state: other,
                    })
                }
            }
            state.authority = AuthorityState::Disabling;
            state.generation += 1;
            state.generation
        };
        tracing::info!("virtual stick disabling");

        let mut pending = PendingRequest {
            session: self,
            operation: "disable",
            generation,
            revert_to: AuthorityState::Enabled,
            settled: false,
        };
        let result = self.actuator.disable_virtual_stick().await;
        pending.settled = true;
        drop(pending);

        let mut state = self.lock();
        if state.generation != generation {
            tracing::debug!("virtual stick disable superseded");
            return Err(ActuationError::Superseded {
                operation: "disable",
            });
        }
        match result {
            Ok(()) => {
                state.authority = AuthorityState::Disabled;
                tracing::info!("virtual stick disabled");
                Ok(())
            }
            Err(err) => {
                state.authority = AuthorityState::Enabled;
                tracing::error!(%err, "virtual stick disable failed");
                Err(err)
            }
        }
    }

    /// Passive notification from the vendor SDK that authority moved.
    ///
    /// Losing authority to anyone else while holding or acquiring it drops
    /// the session to `Disabled` and records a revocation for the flight
    /// phase machine to pick up. Returns whether this was a revocation.
    pub fn on_authority_changed(
        &self,
        owner: AuthorityOwner,
        reason: AuthorityChangeReason,
    ) -> bool {
        let mut state = self.lock();
        state.owner = Some(owner);
        state.last_reason = Some(reason);

        if owner == AuthorityOwner::Application {
            return false;
        }
        match state.authority {
            AuthorityState::Enabled | AuthorityState::Enabling => {
                state.authority = AuthorityState::Disabled;
                state.generation += 1;
                state.revocation = Some(reason);
                tracing::warn!(?owner, ?reason, "virtual stick authority revoked");
                true
            }
            AuthorityState::Disabling => {
                state.authority = AuthorityState::Disabled;
                state.generation += 1;
                tracing::info!(?owner, ?reason, "virtual stick released");
                false
            }
            AuthorityState::Disabled => false,
        }
    }

    /// Takes the pending revocation, if authority was lost since last asked.
    pub fn take_revocation(&self) -> Option<AuthorityChangeReason> {
        self.lock().revocation.take()
    }

    /// Runs `write` only while authority is `Enabled`, holding the state
    /// lock for the duration so authority cannot change mid-write.
    /// Returns whether `write` ran.
    pub fn with_authority(&self, write: impl FnOnce(&dyn Actuator)) -> bool {
        let state = self.lock();
        if state.authority != AuthorityState::Enabled {
            return false;
        }
        write(self.actuator.as_ref());
        true
    }
}

impl std::fmt::Debug for VirtualStickSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualStickSession")
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}
