//! Skip-vote tracking
//!
//! Collects distinct voters for the track currently playing. The quorum is a
//! third of the registered users, rounded down, but never less than one.
//! The vote set is emptied whenever the current track changes.

use partyq_common::User;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Result of counting one vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Quorum reached; the caller skips the current track
    Skipping { votes: usize, threshold: usize },
    /// Vote recorded, quorum not reached yet
    Pending { votes: usize, threshold: usize },
    /// Nothing is playing; the vote was not recorded
    NothingPlaying,
}

impl VoteOutcome {
    pub fn is_skipping(&self) -> bool {
        matches!(self, VoteOutcome::Skipping { .. })
    }
}

impl fmt::Display for VoteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteOutcome::Skipping { votes, threshold } => {
                write!(f, "Skipping song... (votes {}/{})", votes, threshold)
            }
            VoteOutcome::Pending { votes, threshold } => {
                write!(f, "Votes: {}/{}", votes, threshold)
            }
            VoteOutcome::NothingPlaying => write!(f, "Nothing is playing"),
        }
    }
}

/// Votes needed to skip with `registered` users present
pub fn threshold(registered: usize) -> usize {
    (registered / 3).max(1)
}

#[derive(Debug, Default)]
pub struct SkipVoteTracker {
    voters: Mutex<HashSet<User>>,
}

impl SkipVoteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<User>> {
        self.voters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `voter` (repeat votes count once) and check the quorum
    pub fn register_vote(&self, voter: &User, registered: usize) -> VoteOutcome {
        let mut voters = self.lock();
        voters.insert(voter.clone());

        let votes = voters.len();
        let threshold = threshold(registered);
        if votes >= threshold {
            VoteOutcome::Skipping { votes, threshold }
        } else {
            VoteOutcome::Pending { votes, threshold }
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold() {
        assert_eq!(threshold(0), 1);
        assert_eq!(threshold(2), 1);
        assert_eq!(threshold(3), 1);
        assert_eq!(threshold(5), 1);
        assert_eq!(threshold(6), 2);
        assert_eq!(threshold(10), 3);
    }

    #[test]
    fn test_repeat_vote_counts_once() {
        let tracker = SkipVoteTracker::new();
        let alice = User::new("1", "@alice");

        assert_eq!(
            tracker.register_vote(&alice, 9),
            VoteOutcome::Pending { votes: 1, threshold: 3 }
        );
        assert_eq!(
            tracker.register_vote(&alice, 9),
            VoteOutcome::Pending { votes: 1, threshold: 3 }
        );
        assert_eq!(tracker.count(), 1);
    }

    #[test]
    fn test_quorum_reached() {
        let tracker = SkipVoteTracker::new();
        let users: Vec<_> = (0..6).map(|i| User::new(i.to_string(), format!("@u{}", i))).collect();

        assert!(!tracker.register_vote(&users[0], 6).is_skipping());
        let outcome = tracker.register_vote(&users[1], 6);
        assert_eq!(outcome, VoteOutcome::Skipping { votes: 2, threshold: 2 });
        assert_eq!(outcome.to_string(), "Skipping song... (votes 2/2)");
    }

    #[test]
    fn test_clear_resets_votes() {
        let tracker = SkipVoteTracker::new();
        tracker.register_vote(&User::new("1", "@alice"), 9);
        tracker.clear();
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn test_pending_display() {
        let outcome = VoteOutcome::Pending { votes: 1, threshold: 3 };
        assert_eq!(outcome.to_string(), "Votes: 1/3");
    }
}
