//! Terms-of-Service acceptance gate
//!
//! When the generative-language service refuses enablement because its terms
//! have not been accepted, a human has to visit a URL and confirm. Many
//! workers can hit that refusal at once; the gate makes sure only the first
//! one prompts and everybody else waits for the same confirmation.
//!
//! ```text
//!   Idle ──(first worker)──▶ Prompting ──(human confirms)──▶ Released
//!                                │                               │
//!          other workers wait ◀──┘         broadcast to all ◀────┘
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};

/// Asks a human to accept the terms and returns once they say so
#[async_trait]
pub trait AcceptancePrompt: Send + Sync {
    async fn confirm(&self, message: &str, url: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Prompting,
    Released,
}

/// What a worker did while passing through the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePass {
    /// This worker showed the prompt
    Prompted,
    /// This worker waited for another worker's prompt
    Waited,
    /// The prompt had already been answered earlier in the run
    AlreadyReleased,
}

/// One gate per account run
pub struct TosGate {
    state: Mutex<GateState>,
    released: watch::Sender<bool>,
    prompt: Arc<dyn AcceptancePrompt>,
    retry_delay: Duration,
}

impl TosGate {
    pub fn new(prompt: Arc<dyn AcceptancePrompt>, retry_delay: Duration) -> Self {
        let (released, _) = watch::channel(false);
        Self {
            state: Mutex::new(GateState::Idle),
            released,
            prompt,
            retry_delay,
        }
    }

    pub async fn state(&self) -> GateState {
        *self.state.lock().await
    }

    /// Block until a human has accepted the terms.
    ///
    /// Exactly one caller per gate becomes the leader and shows the prompt.
    /// Callers arriving after the release sleep `retry_delay` before
    /// returning so their retry loop does not spin.
    pub async fn await_acceptance(&self, message: &str, url: &str) -> GatePass {
        let previous = {
            let mut state = self.state.lock().await;
            let previous = *state;
            if previous == GateState::Idle {
                *state = GateState::Prompting;
            }
            previous
        };

        match previous {
            GateState::Idle => {
                tracing::error!("{}", message);
                tracing::error!("Please accept the terms by visiting this URL: {}", url);
                self.prompt.confirm(message, url).await;

                *self.state.lock().await = GateState::Released;
                self.released.send_replace(true);
                GatePass::Prompted
            }
            GateState::Prompting => {
                let mut receiver = self.released.subscribe();
                // only fails if the sender is dropped, which the gate prevents
                let _ = receiver.wait_for(|released| *released).await;
                GatePass::Waited
            }
            GateState::Released => {
                tokio::time::sleep(self.retry_delay).await;
                GatePass::AlreadyReleased
            }
        }
    }
}
