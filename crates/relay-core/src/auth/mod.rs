//! Challenge/response credential verifiers.
//!
//! Both variants follow the same state machine:
//!
//! ```text
//! Idle ──issue_challenge──▶ Challenged ──verify_response──▶ Authenticated
//!                               ▲                      └──▶ Failed
//!                               └────────issue_challenge───────┘
//! ```
//!
//! Challenge material is single use: a response consumes it whether it was
//! correct or not, so a console that guesses wrong has to ask again (and the
//! lockout policy decides whether it may).
//!
//! The variant is chosen from [`RelayConfig::encryption_enabled`] when a
//! session starts and never changes for that session.

pub mod cipher;
pub mod nonce;

use thiserror::Error;

use crate::domain::config::RelayConfig;
use cipher::{CipherVerifier, EncryptedChallenge};
use nonce::NonceVerifier;

/// Errors raised while preparing or checking challenge material.
///
/// A wrong answer is not an error; it is [`Verdict::Rejected`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid key length for the challenge cipher")]
    InvalidKey,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Position in the challenge/response state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    Challenged,
    Authenticated,
    Failed,
}

/// Outcome of checking a challenge response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The response proves knowledge of the secret.
    Accepted,
    /// Wrong digest, undecryptable ciphertext or mismatching probe.
    Rejected,
    /// No challenge was outstanding; nothing was evaluated.
    NoChallenge,
}

/// Challenge material to send to the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Nonce(String),
    Encrypted(EncryptedChallenge),
}

/// The verifier selected for a session.
#[derive(Debug)]
pub enum Verifier {
    Nonce(NonceVerifier),
    Encrypted(CipherVerifier),
}

impl Verifier {
    /// Picks the variant `config` asks for.
    pub fn for_config(config: &RelayConfig) -> Self {
        if config.encryption_enabled {
            Verifier::Encrypted(CipherVerifier::new(config.shared_secret.clone()))
        } else {
            Verifier::Nonce(NonceVerifier::new(config.shared_secret.clone()))
        }
    }

    pub fn state(&self) -> AuthState {
        match self {
            Verifier::Nonce(v) => v.state(),
            Verifier::Encrypted(v) => v.state(),
        }
    }

    /// Draws fresh challenge material, replacing any outstanding challenge.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the encrypted variant cannot set up its cipher.
    pub fn issue_challenge(&mut self) -> Result<Challenge, AuthError> {
        match self {
            Verifier::Nonce(v) => Ok(Challenge::Nonce(v.issue_challenge())),
            Verifier::Encrypted(v) => v.issue_challenge().map(Challenge::Encrypted),
        }
    }

    /// Checks `response` against the outstanding challenge.
    pub fn verify_response(&mut self, response: &str) -> Verdict {
        match self {
            Verifier::Nonce(v) => v.verify_response(response),
            Verifier::Encrypted(v) => v.verify_response(response),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config(encryption_enabled: bool) -> RelayConfig {
        RelayConfig {
            enabled: true,
            encryption_enabled,
            shared_secret: "secret".to_string(),
            ..RelayConfig::default()
        }
    }

    #[test]
    fn test_for_config_selects_nonce_variant_by_default() {
        let verifier = Verifier::for_config(&config(false));
        assert!(matches!(verifier, Verifier::Nonce(_)));
        assert_eq!(verifier.state(), AuthState::Idle);
    }

    #[test]
    fn test_for_config_selects_encrypted_variant() {
        let verifier = Verifier::for_config(&config(true));
        assert!(matches!(verifier, Verifier::Encrypted(_)));
    }

    #[test]
    fn test_issue_challenge_matches_variant() {
        let mut plain = Verifier::for_config(&config(false));
        let mut encrypted = Verifier::for_config(&config(true));
        assert!(matches!(plain.issue_challenge(), Ok(Challenge::Nonce(_))));
        assert!(matches!(encrypted.issue_challenge(), Ok(Challenge::Encrypted(_))));
        assert_eq!(plain.state(), AuthState::Challenged);
        assert_eq!(encrypted.state(), AuthState::Challenged);
    }

    #[test]
    fn test_nonce_variant_accepts_correct_digest_through_enum() {
        // Arrange
        let mut verifier = Verifier::for_config(&config(false));
        let Ok(Challenge::Nonce(issued)) = verifier.issue_challenge() else {
            panic!("expected a nonce challenge");
        };

        // Act
        let verdict = verifier.verify_response(&nonce::nonce_digest(&issued, "secret"));

        // Assert
        assert_eq!(verdict, Verdict::Accepted);
        assert_eq!(verifier.state(), AuthState::Authenticated);
    }

    #[test]
    fn test_response_without_challenge_is_not_evaluated() {
        let mut verifier = Verifier::for_config(&config(true));
        assert_eq!(verifier.verify_response("AAAA"), Verdict::NoChallenge);
        assert_eq!(verifier.state(), AuthState::Idle);
    }
}
