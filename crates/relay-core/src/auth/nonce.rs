//! Plaintext challenge: nonce + MD5 digest.
//!
//! The relay sends a fresh nonce; the console answers with
//! `hex(md5(nonce + secret))`.  MD5 is kept only because management consoles
//! in the field speak this exact exchange.

use md5::{Digest, Md5};
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

use super::{AuthState, Verdict};

/// Random bytes per nonce (rendered as twice as many hex characters).
pub const NONCE_BYTES: usize = 16;

/// Generates a nonce from the operating system's CSPRNG.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Lower-case hex MD5 digest of `nonce` followed by `secret`.
///
/// ```rust
/// use relay_core::auth::nonce::nonce_digest;
///
/// assert_eq!(nonce_digest("", ""), "d41d8cd98f00b204e9800998ecf8427e");
/// ```
pub fn nonce_digest(nonce: &str, secret: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(nonce.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug)]
pub struct NonceVerifier {
    secret: String,
    state: AuthState,
    expected: Option<String>,
}

impl NonceVerifier {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            state: AuthState::Idle,
            expected: None,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Issues a new nonce and remembers the digest it expects back.
    pub fn issue_challenge(&mut self) -> String {
        let nonce = generate_nonce();
        self.expected = Some(nonce_digest(&nonce, &self.secret));
        self.state = AuthState::Challenged;
        nonce
    }

    /// Compares `digest` case-insensitively with the expected digest.
    ///
    /// The expected digest is lowercase hex, so the answer is lowercased first
    /// and the bytes compared in constant time.
    pub fn verify_response(&mut self, digest: &str) -> Verdict {
        let Some(expected) = self.expected.take() else {
            return Verdict::NoChallenge;
        };
        let answer = digest.trim().to_ascii_lowercase();
        if bool::from(expected.as_bytes().ct_eq(answer.as_bytes())) {
            self.state = AuthState::Authenticated;
            Verdict::Accepted
        } else {
            self.state = AuthState::Failed;
            Verdict::Rejected
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
