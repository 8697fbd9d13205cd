//! Encrypted challenge using an authenticated cipher.
//!
//! For every challenge the relay draws:
//!
//! - a 12-byte IV,
//! - a short random `extra` string, mixed into the key,
//! - a 64-byte random probe.
//!
//! The session key is `secret + extra`, truncated or zero-padded to the
//! cipher's key length.  The console encrypts the probe with ChaCha20-Poly1305
//! (128-bit tag) under that key and IV and returns the ciphertext; the relay
//! decrypts it and compares the plaintext with the probe byte for byte.
//!
//! A `(key, iv)` pair must never encrypt two different messages.  Each
//! challenge therefore draws a fresh 96-bit IV from the OS CSPRNG *and* fresh
//! key material.  Only the previous IV is remembered, so a console that keeps
//! asking for challenges costs constant memory and time per request.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use tracing::debug;

use super::{AuthError, AuthState, Verdict};

/// Cipher suite id advertised in `<protocol>`.
pub const PROTOCOL_CHACHA20_POLY1305: u32 = 1;
pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const PROBE_LEN: usize = 64;
pub const EXTRA_LEN: usize = 16;

/// Challenge material sent to the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedChallenge {
    pub iv: [u8; IV_LEN],
    pub extra: String,
    pub probe: Vec<u8>,
    pub protocol: u32,
}

/// Derives the session key from the shared secret and the extra material.
pub fn derive_key(secret: &str, extra: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    let material = secret.bytes().chain(extra.bytes());
    for (slot, byte) in key.iter_mut().zip(material) {
        *slot = byte;
    }
    key
}

/// Encrypts `probe` under `key` and `iv`; returns ciphertext followed by tag.
///
/// This is what a console computes when answering a challenge.
///
/// # Errors
///
/// Returns [`AuthError::InvalidKey`] or [`AuthError::EncryptionFailed`].
pub fn encrypt_probe(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    probe: &[u8],
) -> Result<Vec<u8>, AuthError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| AuthError::InvalidKey)?;
    cipher
        .encrypt(Nonce::from_slice(iv), probe)
        .map_err(|_| AuthError::EncryptionFailed)
}

/// Decrypts and authenticates `ciphertext` (ciphertext followed by tag).
///
/// # Errors
///
/// Returns [`AuthError::DecryptionFailed`] when the tag does not verify,
/// which is what a wrong key, wrong IV or tampered ciphertext produces.
pub fn decrypt_response(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, AuthError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| AuthError::InvalidKey)?;
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| AuthError::DecryptionFailed)
}

#[derive(Debug)]
struct Pending {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
    probe: Vec<u8>,
}

#[derive(Debug)]
pub struct CipherVerifier {
    secret: String,
    state: AuthState,
    pending: Option<Pending>,
    last_iv: Option<[u8; IV_LEN]>,
}

impl CipherVerifier {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            state: AuthState::Idle,
            pending: None,
            last_iv: None,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Draws fresh IV, extra material and probe.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the probe cannot be encrypted under the
    /// derived key, in which case no challenge is outstanding.
    pub fn issue_challenge(&mut self) -> Result<EncryptedChallenge, AuthError> {
        self.pending = None;

        let iv = self.fresh_iv();
        let extra: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(EXTRA_LEN)
            .map(char::from)
            .collect();
        let mut probe = vec![0u8; PROBE_LEN];
        OsRng.fill_bytes(&mut probe);

        let key = derive_key(&self.secret, &extra);
        // Proves the derived key is usable before the console is asked to use it.
        encrypt_probe(&key, &iv, &probe)?;

        self.pending = Some(Pending {
            key,
            iv,
            probe: probe.clone(),
        });
        self.state = AuthState::Challenged;

        Ok(EncryptedChallenge {
            iv,
            extra,
            probe,
            protocol: PROTOCOL_CHACHA20_POLY1305,
        })
    }

    /// Decrypts the base64 `response` and compares it with the probe.
    pub fn verify_response(&mut self, response: &str) -> Verdict {
        let Some(pending) = self.pending.take() else {
            return Verdict::NoChallenge;
        };
        let outcome = BASE64
            .decode(response.trim())
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))
            .and_then(|ciphertext| decrypt_response(&pending.key, &pending.iv, &ciphertext));

        match outcome {
            Ok(plaintext) if plaintext == pending.probe => {
                self.state = AuthState::Authenticated;
                Verdict::Accepted
            }
            Ok(_) => {
                debug!("encrypted response decrypted to a different probe");
                self.state = AuthState::Failed;
                Verdict::Rejected
            }
            Err(e) => {
                debug!("encrypted response rejected: {e}");
                self.state = AuthState::Failed;
                Verdict::Rejected
            }
        }
    }

    fn fresh_iv(&mut self) -> [u8; IV_LEN] {
        let mut iv = [0u8; IV_LEN];
        loop {
            OsRng.fill_bytes(&mut iv);
            if self.last_iv != Some(iv) {
                break;
            }
        }
        self.last_iv = Some(iv);
        iv
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
