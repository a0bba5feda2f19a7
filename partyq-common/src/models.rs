//! Value types shared across the party pipeline
//!
//! `User` identifies a requester or voter, `Track` is a resolved playable unit.
//! Both are plain values: once handed to the player they are never mutated,
//! re-attribution produces a new `Track` via [`Track::with_requester`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Identity used for attribution and voting
///
/// Equality and hashing use the `(user_id, username)` pair only; the ban flag
/// is a property carried along, not part of the identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub user_id: Option<String>,
    pub username: Option<String>,
    #[serde(default)]
    pub is_banned: bool,
}

impl User {
    pub const ANONYMOUS_ID: &'static str = "Anon";
    pub const ANONYMOUS_NAME: &'static str = "Anonymous user";

    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            username: Some(username.into()),
            is_banned: false,
        }
    }

    /// User with only a display name (party hosts are created this way)
    pub fn named(username: impl Into<String>) -> Self {
        Self {
            user_id: None,
            username: Some(username.into()),
            is_banned: false,
        }
    }

    /// Shared identity for anonymous submissions
    pub fn anonymous() -> Self {
        Self::new(Self::ANONYMOUS_ID, Self::ANONYMOUS_NAME)
    }

    /// The empty user stands for "nobody" (system-originated or unattributed)
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.username.is_none()
    }

    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.user_id.as_deref())
            .unwrap_or("nobody")
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.user_id == other.user_id && self.username == other.username
    }
}

impl Eq for User {}

impl Hash for User {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.user_id.hash(state);
        self.username.hash(state);
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.user_id, &self.username) {
            (Some(id), Some(name)) => write!(f, "{} ({})", name, id),
            _ => write!(f, "{}", self.display_name()),
        }
    }
}

/// A resolved, playable unit
///
/// A track with neither a source reference nor a display name is the
/// "nothing is playing" sentinel, see [`Track::nothing`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    source_reference: Option<String>,
    asset_path: Option<PathBuf>,
    display_name: Option<String>,
    requested_by: User,
}

impl Track {
    /// Build a track produced by a successful resolution
    pub fn resolved(
        source_reference: impl Into<String>,
        asset_path: impl Into<PathBuf>,
        display_name: impl Into<String>,
        requested_by: User,
    ) -> Self {
        Self {
            source_reference: Some(source_reference.into()),
            asset_path: Some(asset_path.into()),
            display_name: Some(display_name.into()),
            requested_by,
        }
    }

    /// The sentinel value observers see while nothing is streaming
    pub fn nothing() -> Self {
        Self::default()
    }

    pub fn is_nothing(&self) -> bool {
        self.source_reference.is_none() && self.display_name.is_none()
    }

    /// Copy of this track attributed to another requester
    ///
    /// Used on cache hits: the asset and name are shared, only the
    /// attribution changes.
    pub fn with_requester(&self, requested_by: User) -> Self {
        Self {
            source_reference: self.source_reference.clone(),
            asset_path: self.asset_path.clone(),
            display_name: self.display_name.clone(),
            requested_by,
        }
    }

    pub fn source_reference(&self) -> Option<&str> {
        self.source_reference.as_deref()
    }

    pub fn asset_path(&self) -> Option<&Path> {
        self.asset_path.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn requested_by(&self) -> &User {
        &self.requested_by
    }

    /// True when the reference matches this track's source (cache key)
    pub fn matches_reference(&self, reference: &str) -> bool {
        self.source_reference.as_deref() == Some(reference)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nothing() {
            return write!(f, "nothing");
        }
        let name = self
            .display_name
            .as_deref()
            .or(self.source_reference.as_deref())
            .unwrap_or("<unnamed>");
        write!(f, "{} - requested by {}", name, self.requested_by.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_user_equality_ignores_ban_flag() {
        let alice = User::new("1", "@alice");
        let mut banned_alice = alice.clone();
        banned_alice.is_banned = true;

        assert_eq!(alice, banned_alice);

        let mut set = HashSet::new();
        set.insert(alice);
        assert!(!set.insert(banned_alice));
    }

    #[test]
    fn test_user_identity_is_pair() {
        assert_ne!(User::new("1", "@alice"), User::new("2", "@alice"));
        assert_ne!(User::new("1", "@alice"), User::new("1", "@bob"));
        assert!(User::default().is_empty());
        assert!(!User::anonymous().is_empty());
    }

    #[test]
    fn test_nothing_sentinel() {
        assert!(Track::nothing().is_nothing());
        assert_eq!(Track::nothing().to_string(), "nothing");

        let track =
            Track::resolved("https://example.com/a", "/tmp/a.mp3", "A", User::named("host"));
        assert!(!track.is_nothing());
    }

    #[test]
    fn test_with_requester_keeps_asset() {
        let alice = User::new("1", "@alice");
        let bob = User::new("2", "@bob");
        let original = Track::resolved("ref-a", "/cache/a.mp3", "Song A", alice.clone());

        let copy = original.with_requester(bob.clone());

        assert_eq!(copy.asset_path(), original.asset_path());
        assert_eq!(copy.display_name(), Some("Song A"));
        assert_eq!(copy.requested_by(), &bob);
        // Original untouched
        assert_eq!(original.requested_by(), &alice);
    }

    #[test]
    fn test_track_serializes_requester() {
        let track = Track::resolved("ref-a", "/cache/a.mp3", "Song A", User::new("1", "@alice"));
        let json = serde_json::to_value(&track).unwrap();

        assert_eq!(json["display_name"], "Song A");
        assert_eq!(json["requested_by"]["username"], "@alice");
    }
}
