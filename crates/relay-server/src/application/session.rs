//! Per-connection session: the authentication gate in front of the
//! downstream endpoint.
//!
//! A [`Session`] turns each inbound frame into exactly one reply frame:
//!
//! | Session state   | Frame                        | Reply                                  |
//! |-----------------|------------------------------|----------------------------------------|
//! | authenticated   | anything                     | whatever the downstream endpoint says  |
//! | unauthenticated | `<auth1/>`, no cooldown      | challenge                              |
//! | unauthenticated | `<auth1/>`, cooldown active  | `<unauthorized/>` + `<time_out>`       |
//! | unauthenticated | response, cooldown active    | `<unauthorized/>` + `<time_out>`       |
//! | unauthenticated | correct response             | `<authorized/>`                        |
//! | unauthenticated | wrong response               | `<unauthorized/>` + new cooldown       |
//! | unauthenticated | response without challenge   | `<unauthorized/>`                      |
//! | unauthenticated | anything else                | `<unauthorized/>`                      |
//!
//! `authenticated` flips from `false` to `true` at most once and never back.

use std::time::Instant;

use async_trait::async_trait;
use relay_core::protocol::messages::{
    authorized_reply, challenge_reply, error_reply, unauthorized_reply,
};
use relay_core::{ledger_key, AuthRequest, RelayConfig, Verdict, Verifier};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::LockoutLedger;

/// Request/reply forwarding to the local management endpoint.
///
/// Implementations never fail from the caller's point of view: transport
/// problems are turned into a well-formed error reply.
#[async_trait]
pub trait Downstream: Send {
    /// Sends one request payload and returns the reply payload.
    async fn forward(&mut self, request: &[u8]) -> Vec<u8>;
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    peer_address: String,
    ledger_key: String,
    authenticated: bool,
    verifier: Verifier,
}

impl Session {
    /// Creates an unauthenticated session using the verifier `config` selects.
    pub fn new(peer_address: String, config: &RelayConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            ledger_key: ledger_key(&peer_address),
            peer_address,
            authenticated: false,
            verifier: Verifier::for_config(config),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer_address(&self) -> &str {
        &self.peer_address
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Produces the reply for one inbound frame payload.
    pub async fn handle_frame<D>(
        &mut self,
        frame: &[u8],
        ledger: &LockoutLedger,
        downstream: &mut D,
    ) -> Vec<u8>
    where
        D: Downstream + ?Sized,
    {
        if self.authenticated {
            debug!(session = %self.id, bytes = frame.len(), "forwarding request");
            return downstream.forward(frame).await;
        }

        match AuthRequest::classify(frame) {
            AuthRequest::Challenge => self.issue_challenge(ledger).await,
            AuthRequest::NonceHash(response) | AuthRequest::Encrypted(response) => {
                self.check_response(response, ledger).await
            }
            AuthRequest::Other => {
                debug!(session = %self.id, "request before authentication refused");
                let cooldown = ledger.current_cooldown(&self.ledger_key, Instant::now()).await;
                unauthorized_reply(cooldown)
            }
        }
    }

    async fn issue_challenge(&mut self, ledger: &LockoutLedger) -> Vec<u8> {
        let cooldown = ledger.current_cooldown(&self.ledger_key, Instant::now()).await;
        if cooldown > 0 {
            debug!(session = %self.id, cooldown, "challenge refused during cooldown");
            return unauthorized_reply(cooldown);
        }
        match self.verifier.issue_challenge() {
            Ok(challenge) => {
                debug!(session = %self.id, "challenge issued");
                challenge_reply(&challenge)
            }
            Err(e) => {
                warn!(session = %self.id, "could not issue challenge: {e}");
                error_reply("challenge unavailable")
            }
        }
    }

    async fn check_response(&mut self, response: &str, ledger: &LockoutLedger) -> Vec<u8> {
        let now = Instant::now();
        let cooldown = ledger.current_cooldown(&self.ledger_key, now).await;
        if cooldown > 0 {
            debug!(session = %self.id, cooldown, "response ignored during cooldown");
            return unauthorized_reply(cooldown);
        }

        match self.verifier.verify_response(response) {
            Verdict::Accepted => {
                ledger.record_success(&self.ledger_key).await;
                self.authenticated = true;
                info!(session = %self.id, peer = %self.peer_address, "session authenticated");
                authorized_reply()
            }
            Verdict::Rejected => {
                let cooldown = ledger.record_failure(&self.ledger_key, now).await;
                warn!(
                    session = %self.id,
                    peer = %self.peer_address,
                    cooldown,
                    "authentication failed"
                );
                unauthorized_reply(cooldown)
            }
            Verdict::NoChallenge => {
                debug!(session = %self.id, "response without an outstanding challenge");
                unauthorized_reply(0)
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
