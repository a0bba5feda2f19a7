//! Track cache
//!
//! Not a store of its own: a lookup over what the party already resolved
//! (history, then the queue). A hit lets a repeated request reuse the asset
//! on disk instead of resolving the reference again.

use partyq_common::{Track, User};

/// First track in `history ++ queue` resolved from `reference`
pub fn lookup(reference: &str, history: &[Track], queue: &[Track]) -> Option<Track> {
    history
        .iter()
        .chain(queue)
        .find(|t| t.matches_reference(reference) && t.asset_path().is_some())
        .cloned()
}

/// Cached copy attributed to the new requester
pub fn reuse(cached: &Track, requester: &User) -> Track {
    cached.with_requester(requester.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(reference: &str, name: &str, user: &User) -> Track {
        Track::resolved(reference, format!("/cache/{}.mp3", name), name, user.clone())
    }

    #[test]
    fn test_miss() {
        let alice = User::new("1", "@alice");
        let history = vec![track("ref-a", "a", &alice)];
        assert!(lookup("ref-z", &history, &[]).is_none());
    }

    #[test]
    fn test_history_checked_before_queue() {
        let alice = User::new("1", "@alice");
        let history = vec![track("ref-a", "from-history", &alice)];
        let queue = vec![track("ref-a", "from-queue", &alice)];

        let hit = lookup("ref-a", &history, &queue).unwrap();
        assert_eq!(hit.display_name(), Some("from-history"));
    }

    #[test]
    fn test_queue_hit() {
        let alice = User::new("1", "@alice");
        let queue = vec![track("ref-b", "b", &alice)];
        assert!(lookup("ref-b", &[], &queue).is_some());
    }

    #[test]
    fn test_reuse_restamps_requester_only() {
        let alice = User::new("1", "@alice");
        let bob = User::new("2", "@bob");
        let cached = track("ref-a", "a", &alice);

        let copy = reuse(&cached, &bob);
        assert_eq!(copy.requested_by(), &bob);
        assert_eq!(copy.asset_path(), cached.asset_path());
        assert_eq!(copy.display_name(), cached.display_name());
        assert_eq!(cached.requested_by(), &alice);
    }
}
