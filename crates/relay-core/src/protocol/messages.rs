//! Authentication messages exchanged with the management console.
//!
//! The relay never parses the management protocol itself.  It only looks for
//! a handful of markers inside frames that arrive before a session is
//! authenticated:
//!
//! | Console sends                         | Meaning                        |
//! |---------------------------------------|--------------------------------|
//! | `<auth1/>`                            | request a challenge            |
//! | `<nonce_hash>hex</nonce_hash>`        | plaintext challenge response   |
//! | `<encrypted>base64</encrypted>`       | encrypted challenge response   |
//!
//! Replies generated by the relay are wrapped in the same reply envelope the
//! local management endpoint uses, so the console parses them exactly like
//! native replies.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::auth::cipher::EncryptedChallenge;
use crate::auth::Challenge;

/// Element wrapping every reply produced by the relay itself.
pub const REPLY_ENVELOPE: &str = "boinc_gui_rpc_reply";

/// Error text carried when the local management endpoint cannot be reached.
pub const NO_LOCAL_ENDPOINT: &str = "no local endpoint";

/// Error text carried when the local endpoint drops mid-request.
pub const LOCAL_ENDPOINT_LOST: &str = "local endpoint connection lost";

const CHALLENGE_MARKERS: [&str; 2] = ["<auth1/>", "<auth1 />"];
const NONCE_HASH_TAG: &str = "nonce_hash";
const ENCRYPTED_TAG: &str = "encrypted";

/// Classification of a frame received before authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequest<'a> {
    /// The console asks for a challenge.
    Challenge,
    /// Hex digest answering a plaintext challenge.
    NonceHash(&'a str),
    /// Base64 ciphertext answering an encrypted challenge.
    Encrypted(&'a str),
    /// Anything else; not allowed before authentication.
    Other,
}

impl<'a> AuthRequest<'a> {
    /// Looks for authentication markers in `frame`.
    ///
    /// Responses take precedence over a challenge request when a frame
    /// carries both.  Frames that are not valid UTF-8 are [`AuthRequest::Other`].
    pub fn classify(frame: &'a [u8]) -> Self {
        let Ok(text) = std::str::from_utf8(frame) else {
            return AuthRequest::Other;
        };
        if let Some(digest) = extract_tag(text, NONCE_HASH_TAG) {
            return AuthRequest::NonceHash(digest);
        }
        if let Some(ciphertext) = extract_tag(text, ENCRYPTED_TAG) {
            return AuthRequest::Encrypted(ciphertext);
        }
        if CHALLENGE_MARKERS.iter().any(|m| text.contains(m)) {
            return AuthRequest::Challenge;
        }
        AuthRequest::Other
    }
}

/// Returns the trimmed text between `<tag>` and `</tag>`, if both are present.
///
/// ```rust
/// use relay_core::protocol::messages::extract_tag;
///
/// assert_eq!(extract_tag("<a><nonce>  42 </nonce></a>", "nonce"), Some("42"));
/// assert_eq!(extract_tag("<nonce/>", "nonce"), None);
/// ```
pub fn extract_tag<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open)? + open.len();
    let len = text[start..].find(&close)?;
    Some(text[start..start + len].trim())
}

// ── Reply builders ────────────────────────────────────────────────────────────

fn envelope(body: &str) -> Vec<u8> {
    format!("<{REPLY_ENVELOPE}>\n{body}</{REPLY_ENVELOPE}>\n").into_bytes()
}

/// Reply carrying a plaintext challenge nonce.
pub fn nonce_reply(nonce: &str) -> Vec<u8> {
    envelope(&format!("<nonce>{nonce}</nonce>\n"))
}

/// Reply carrying an encrypted challenge: IV, extra key material and probe,
/// each base64-encoded, plus the cipher suite id.
pub fn encrypted_challenge_reply(challenge: &EncryptedChallenge) -> Vec<u8> {
    envelope(&format!(
        "<iv>{}</iv>\n<extra>{}</extra>\n<to_encrypt>{}</to_encrypt>\n<protocol>{}</protocol>\n",
        BASE64.encode(challenge.iv),
        BASE64.encode(challenge.extra.as_bytes()),
        BASE64.encode(&challenge.probe),
        challenge.protocol,
    ))
}

/// Renders whichever challenge the active verifier issued.
pub fn challenge_reply(challenge: &Challenge) -> Vec<u8> {
    match challenge {
        Challenge::Nonce(nonce) => nonce_reply(nonce),
        Challenge::Encrypted(encrypted) => encrypted_challenge_reply(encrypted),
    }
}

/// Reply sent after a successful challenge response.
pub fn authorized_reply() -> Vec<u8> {
    envelope("<authorized/>\n")
}

/// Reply sent when authentication is refused.
///
/// A non-zero `cooldown_secs` adds `<time_out>` so the console can tell the
/// user how long to wait before retrying.
pub fn unauthorized_reply(cooldown_secs: u64) -> Vec<u8> {
    if cooldown_secs == 0 {
        envelope("<unauthorized/>\n")
    } else {
        envelope(&format!(
            "<unauthorized/>\n<time_out>{cooldown_secs}</time_out>\n"
        ))
    }
}

/// Well-formed error envelope, used when the relay cannot produce a real reply.
pub fn error_reply(message: &str) -> Vec<u8> {
    envelope(&format!("<error>{message}</error>\n"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn text(bytes: &[u8]) -> &str {
        std::str::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_classify_challenge_request_inside_envelope() {
        // Arrange
        let frame = b"<boinc_gui_rpc_request>\n<auth1/>\n</boinc_gui_rpc_request>\n";

        // Act / Assert
        assert_eq!(AuthRequest::classify(frame), AuthRequest::Challenge);
    }

    #[test]
    fn test_classify_nonce_hash_extracts_digest() {
        let frame = b"<boinc_gui_rpc_request><auth2>\n<nonce_hash>ABCdef01</nonce_hash>\n</auth2></boinc_gui_rpc_request>";
        assert_eq!(
            AuthRequest::classify(frame),
            AuthRequest::NonceHash("ABCdef01")
        );
    }

    #[test]
    fn test_classify_encrypted_response() {
        let frame = b"<encrypted>aGVsbG8=</encrypted>";
        assert_eq!(AuthRequest::classify(frame), AuthRequest::Encrypted("aGVsbG8="));
    }

    #[test]
    fn test_classify_ordinary_request_is_other() {
        assert_eq!(AuthRequest::classify(b"<get_state/>"), AuthRequest::Other);
    }

    #[test]
    fn test_classify_invalid_utf8_is_other() {
        assert_eq!(AuthRequest::classify(&[0xff, 0xfe, 0x00]), AuthRequest::Other);
    }

    #[test]
    fn test_extract_tag_requires_closing_tag() {
        assert_eq!(extract_tag("<nonce_hash>abc", "nonce_hash"), None);
    }

    #[test]
    fn test_nonce_reply_is_enveloped() {
        let reply = nonce_reply("1a2b");
        assert_eq!(
            text(&reply),
            "<boinc_gui_rpc_reply>\n<nonce>1a2b</nonce>\n</boinc_gui_rpc_reply>\n"
        );
    }

    #[test]
    fn test_unauthorized_reply_without_cooldown_has_no_time_out() {
        let reply = unauthorized_reply(0);
        assert!(text(&reply).contains("<unauthorized/>"));
        assert!(!text(&reply).contains("<time_out>"));
    }

    #[test]
    fn test_unauthorized_reply_carries_cooldown_seconds() {
        let reply = unauthorized_reply(300);
        assert_eq!(extract_tag(text(&reply), "time_out"), Some("300"));
    }

    #[test]
    fn test_error_reply_names_missing_endpoint() {
        let reply = error_reply(NO_LOCAL_ENDPOINT);
        assert_eq!(extract_tag(text(&reply), "error"), Some("no local endpoint"));
        assert!(text(&reply).starts_with("<boinc_gui_rpc_reply>"));
    }

    #[test]
    fn test_encrypted_challenge_reply_encodes_each_field() {
        // Arrange
        let challenge = EncryptedChallenge {
            iv: [7u8; 12],
            extra: "xyz".to_string(),
            probe: vec![1, 2, 3],
            protocol: 1,
        };

        // Act
        let reply = encrypted_challenge_reply(&challenge);
        let body = text(&reply);

        // Assert
        assert_eq!(extract_tag(body, "iv"), Some(BASE64.encode([7u8; 12]).as_str()));
        assert_eq!(extract_tag(body, "extra"), Some("eHl6"));
        assert_eq!(extract_tag(body, "to_encrypt"), Some("AQID"));
        assert_eq!(extract_tag(body, "protocol"), Some("1"));
    }
}
