//! Request pipeline and playback
//!
//! Resolution workers feed the FIFO playback queue, a single playback loop
//! drains it, skip votes and the idle suggester act on the loop from outside.

pub mod backend;
pub mod engine;
pub mod queue;
pub mod resolver_pool;
pub mod skip_vote;
pub mod suggester;

pub use backend::{ClockBackend, CommandBackend, StreamBackend};
pub use engine::{PlaybackEngine, PlaybackState};
pub use queue::PlaybackQueue;
pub use resolver_pool::{RequestId, ResolutionResult, ResolverPool};
pub use skip_vote::{SkipVoteTracker, VoteOutcome};
pub use suggester::{IdleSuggester, PartyPlaylist, SuggesterTiming, SuggestionSink};
