//! The single demo identity slot and the challenge/verify login flow.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::dataset::SyntheticUser;

pub const CHALLENGE_TTL_MINUTES: i64 = 5;
pub const MAX_DISPLAY_NAME_CHARS: usize = 128;
pub const MAX_BIO_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub npub: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub joined_at: DateTime<Utc>,
}

impl SessionUser {
    pub fn from_synthetic(user: &SyntheticUser, now: DateTime<Utc>) -> Self {
        Self {
            npub: user.npub.clone(),
            display_name: user.display_name.clone(),
            avatar_url: user.avatar_url.clone(),
            bio: user.bio.clone(),
            joined_at: now - ChronoDuration::days(i64::from(user.joined_days_ago)),
        }
    }

    pub fn fresh(npub: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            npub: npub.into(),
            display_name: None,
            avatar_url: None,
            bio: None,
            joined_at: now,
        }
    }

    pub fn apply(&mut self, update: ProfileUpdate) {
        if let Some(display_name) = update.display_name {
            self.display_name = display_name;
        }
        if let Some(bio) = update.bio {
            self.bio = bio;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("challenge not found")]
    NotFound,
    #[error("challenge already used")]
    AlreadyUsed,
    #[error("challenge expired")]
    Expired,
}

// Challenges are keyed by (lowercased pubkey, nonce); a pubkey may hold several.
#[derive(Debug, Default)]
pub struct Session {
    user: Option<SessionUser>,
    challenges: HashMap<(String, String), Challenge>,
}

impl Session {
    pub fn user(&self) -> Option<&SessionUser> {
        self.user.as_ref()
    }

    pub fn user_mut(&mut self) -> Option<&mut SessionUser> {
        self.user.as_mut()
    }

    pub fn login(&mut self, user: SessionUser) {
        info!(
            component = "session",
            event = "session.login",
            npub = %user.npub
        );
        self.user = Some(user);
    }

    pub fn logout(&mut self) {
        if self.user.is_some() {
            info!(component = "session", event = "session.logout");
        }
        self.user = None;
        self.challenges.clear();
    }

    pub fn issue_challenge(&mut self, pubkey: &str, nonce: String, now: DateTime<Utc>) -> Challenge {
        self.challenges.retain(|_, c| c.expires_at >= now);

        let challenge = Challenge {
            nonce,
            expires_at: now + ChronoDuration::minutes(CHALLENGE_TTL_MINUTES),
            used: false,
        };
        self.challenges
            .insert(challenge_key(pubkey, &challenge.nonce), challenge.clone());
        challenge
    }

    pub fn pending_challenges(&self) -> usize {
        self.challenges.len()
    }

    pub fn check_challenge(
        &self,
        pubkey: &str,
        nonce: &str,
        now: DateTime<Utc>,
    ) -> Result<(), VerifyError> {
        let challenge = self
            .challenges
            .get(&challenge_key(pubkey, nonce))
            .ok_or(VerifyError::NotFound)?;
        if challenge.used {
            return Err(VerifyError::AlreadyUsed);
        }
        if challenge.expires_at < now {
            return Err(VerifyError::Expired);
        }
        Ok(())
    }

    pub fn consume_challenge(&mut self, pubkey: &str, nonce: &str) {
        if let Some(challenge) = self.challenges.get_mut(&challenge_key(pubkey, nonce)) {
            challenge.used = true;
        }
    }
}

fn challenge_key(pubkey: &str, nonce: &str) -> (String, String) {
    (pubkey.to_ascii_lowercase(), nonce.to_string())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("display_name too long")]
    DisplayNameTooLong,
    #[error("bio too long")]
    BioTooLong,
}

// `Some(None)` clears a field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<Option<String>>,
    pub bio: Option<Option<String>>,
}

impl ProfileUpdate {
    pub fn from_json(body: &Value) -> Result<Self, ProfileError> {
        let display_name = text_field(body, "display_name");
        if let Some(Some(name)) = &display_name {
            if name.chars().count() > MAX_DISPLAY_NAME_CHARS {
                return Err(ProfileError::DisplayNameTooLong);
            }
        }
        let bio = text_field(body, "bio");
        if let Some(Some(text)) = &bio {
            if text.chars().count() > MAX_BIO_CHARS {
                return Err(ProfileError::BioTooLong);
            }
        }
        Ok(Self { display_name, bio })
    }
}

fn text_field(body: &Value, key: &str) -> Option<Option<String>> {
    let raw = match body.get(key)? {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string().trim().to_string(),
    };
    Some(if raw.is_empty() { None } else { Some(raw) })
}

pub fn is_hex_of_len(raw: &str, len: usize) -> bool {
    raw.len() == len && raw.chars().all(|c| c.is_ascii_hexdigit())
}

// NIP-01: sha256 over compact `[0, pubkey, created_at, kind, tags, content]`.
pub fn nostr_event_id(event: &Value) -> String {
    let payload = json!([
        0,
        event.get("pubkey").and_then(Value::as_str).unwrap_or(""),
        event.get("created_at").and_then(Value::as_i64).unwrap_or(0),
        event.get("kind").and_then(Value::as_i64).unwrap_or(0),
        event.get("tags").cloned().unwrap_or_else(|| json!([])),
        event.get("content").and_then(Value::as_str).unwrap_or(""),
    ]);
    let digest = Sha256::digest(payload.to_string().as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn login_and_logout_switch_between_two_states() {
        let mut session = Session::default();
        assert!(session.user().is_none());

        session.login(SessionUser::fresh("ab".repeat(32), now()));
        assert_eq!(session.user().map(|u| u.npub.len()), Some(64));

        session.logout();
        assert!(session.user().is_none());
    }

    #[test]
    fn profile_update_merges_only_present_fields() {
        let mut user = SessionUser::fresh("cd".repeat(32), now());
        user.display_name = Some("Alice".to_string());
        user.bio = Some("Yield farmer.".to_string());

        let update = ProfileUpdate::from_json(&json!({ "bio": "  Market maker.  " })).unwrap();
        user.apply(update);
        assert_eq!(user.display_name.as_deref(), Some("Alice"));
        assert_eq!(user.bio.as_deref(), Some("Market maker."));

        let clear = ProfileUpdate::from_json(&json!({ "display_name": "" })).unwrap();
        user.apply(clear);
        assert_eq!(user.display_name, None);
        assert_eq!(user.bio.as_deref(), Some("Market maker."));
    }

    #[test]
    fn profile_update_rejects_overlong_fields() {
        let long_name = "x".repeat(MAX_DISPLAY_NAME_CHARS + 1);
        assert_eq!(
            ProfileUpdate::from_json(&json!({ "display_name": long_name })),
            Err(ProfileError::DisplayNameTooLong)
        );
        let long_bio = "y".repeat(MAX_BIO_CHARS + 1);
        assert_eq!(
            ProfileUpdate::from_json(&json!({ "display_name": "ok", "bio": long_bio })),
            Err(ProfileError::BioTooLong)
        );
    }

    #[test]
    fn challenge_lifecycle() {
        let mut session = Session::default();
        let pubkey = "AB".repeat(32);
        let challenge = session.issue_challenge(&pubkey, "n1".to_string(), now());
        assert_eq!(challenge.expires_at, now() + ChronoDuration::minutes(5));

        assert_eq!(session.check_challenge(&pubkey, "other", now()), Err(VerifyError::NotFound));
        assert_eq!(session.check_challenge(&pubkey.to_lowercase(), "n1", now()), Ok(()));
        assert_eq!(
            session.check_challenge(&pubkey, "n1", now() + ChronoDuration::minutes(6)),
            Err(VerifyError::Expired)
        );

        session.consume_challenge(&pubkey, "n1");
        assert_eq!(session.check_challenge(&pubkey, "n1", now()), Err(VerifyError::AlreadyUsed));

        session.logout();
        assert_eq!(session.check_challenge(&pubkey, "n1", now()), Err(VerifyError::NotFound));
    }

    #[test]
    fn earlier_nonce_stays_valid_after_a_newer_one_is_issued() {
        let mut session = Session::default();
        let pubkey = "cd".repeat(32);
        session.issue_challenge(&pubkey, "first".to_string(), now());
        session.issue_challenge(&pubkey, "second".to_string(), now() + ChronoDuration::minutes(1));

        assert_eq!(session.check_challenge(&pubkey, "first", now()), Ok(()));
        session.consume_challenge(&pubkey, "first");
        assert_eq!(session.check_challenge(&pubkey, "second", now()), Ok(()));
        assert_eq!(session.pending_challenges(), 2);
    }

    #[test]
    fn issuing_drops_expired_challenges() {
        let mut session = Session::default();
        let pubkey = "ef".repeat(32);
        session.issue_challenge(&pubkey, "old".to_string(), now());
        session.issue_challenge("12".repeat(32).as_str(), "other".to_string(), now());
        assert_eq!(session.pending_challenges(), 2);

        let later = now() + ChronoDuration::minutes(CHALLENGE_TTL_MINUTES + 1);
        session.issue_challenge(&pubkey, "new".to_string(), later);
        assert_eq!(session.pending_challenges(), 1);
        assert_eq!(session.check_challenge(&pubkey, "old", later), Err(VerifyError::NotFound));
        assert_eq!(session.check_challenge(&pubkey, "new", later), Ok(()));
    }

    #[test]
    fn event_id_matches_compact_json_digest() {
        let event = json!({
            "pubkey": "a".repeat(64),
            "created_at": 1_700_000_000,
            "kind": 22242,
            "tags": [],
            "content": "nonce"
        });
        let expected_payload = format!(
            "[0,\"{}\",1700000000,22242,[],\"nonce\"]",
            "a".repeat(64)
        );
        let expected = hex::encode(Sha256::digest(expected_payload.as_bytes()));
        assert_eq!(nostr_event_id(&event), expected);
        assert!(is_hex_of_len(&expected, 64));
        assert!(!is_hex_of_len("zz", 2));
    }
}
