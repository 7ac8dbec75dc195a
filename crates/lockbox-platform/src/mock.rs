// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Deterministic authenticator double for tests.
//
// Ships outside `cfg(test)` so downstream crates can script challenge
// outcomes instead of depending on real biometric hardware.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use lockbox_core::{AuthOutcome, AuthPolicy};
use tokio::sync::Notify;

use crate::traits::AuthenticatorGate;

struct MockState {
    can_evaluate: bool,
    outcomes: VecDeque<AuthOutcome>,
    evaluations: u32,
    hold_next: bool,
}

/// Scripted [`AuthenticatorGate`].
///
/// By default every challenge succeeds.  Tests can flip the capability
/// probe, queue specific outcomes, or hold the next evaluation open to
/// exercise cancellation.  Evaluations are counted so tests can assert the
/// gate was (or was not) consulted.
pub struct MockAuthenticator {
    state: Mutex<MockState>,
    release: Notify,
}

impl MockAuthenticator {
    /// A gate that reports capability and succeeds on every challenge.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                can_evaluate: true,
                outcomes: VecDeque::new(),
                evaluations: 0,
                hold_next: false,
            }),
            release: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // Poisoning only happens if a previous holder panicked; propagating
        // the inner guard keeps the gate usable.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Set what the capability probe reports.
    pub fn set_capability(&self, available: bool) {
        self.state().can_evaluate = available;
    }

    /// Queue the outcome for the next evaluation; the queue drains in FIFO
    /// order and falls back to `Success` when empty.
    pub fn push_outcome(&self, outcome: AuthOutcome) {
        self.state().outcomes.push_back(outcome);
    }

    /// Make the next evaluation suspend until [`release`](Self::release) is
    /// called (or the caller drops the future).
    pub fn hold_next(&self) {
        self.state().hold_next = true;
    }

    /// Wake an evaluation held by [`hold_next`](Self::hold_next).
    pub fn release(&self) {
        self.release.notify_waiters();
    }

    /// How many challenges have been presented so far.
    pub fn evaluations(&self) -> u32 {
        self.state().evaluations
    }
}

impl Default for MockAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthenticatorGate for MockAuthenticator {
    fn can_evaluate(&self, _policy: AuthPolicy) -> bool {
        self.state().can_evaluate
    }

    async fn evaluate(&self, _policy: AuthPolicy, _reason: &str) -> AuthOutcome {
        // The lock is released before any await so an aborted evaluation
        // cannot wedge the gate.
        let held = {
            let mut state = self.state();
            state.evaluations += 1;
            std::mem::take(&mut state.hold_next)
        };

        if held {
            self.release.notified().await;
        }

        let mut state = self.state();
        if !state.can_evaluate {
            return AuthOutcome::Unavailable;
        }
        state.outcomes.pop_front().unwrap_or(AuthOutcome::Success)
    }
}
