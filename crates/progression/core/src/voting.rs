//! Voting sessions and vote tallying.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use strum::{AsRefStr, Display, EnumString};

use crate::ids::{NodeId, OptionId, SessionId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SessionStatus {
    Voting,
    Ended,
}

/// One node offered in a voting session.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VotingOption {
    pub id: OptionId,
    pub session_id: SessionId,
    pub node_id: NodeId,
    pub node_key: String,
    pub target_level: u32,
    pub vote_count: u32,
    /// Last time this option reached the session's leading vote count.
    pub last_highest_vote_at: Option<DateTime<Utc>>,
}

/// A single-round vote over up to a handful of candidate nodes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VotingSession {
    pub id: SessionId,
    pub status: SessionStatus,
    pub options: Vec<VotingOption>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub winning_option: Option<OptionId>,
}

impl VotingSession {
    pub fn is_voting(&self) -> bool {
        self.status == SessionStatus::Voting
    }

    pub fn option(&self, id: OptionId) -> Option<&VotingOption> {
        self.options.iter().find(|option| option.id == id)
    }

    pub fn option_for_node(&self, node_key: &str) -> Option<&VotingOption> {
        self.options.iter().find(|option| option.node_key == node_key)
    }

    pub fn winner(&self) -> Option<&VotingOption> {
        self.winning_option.and_then(|id| self.option(id))
    }

    /// Counts one vote for `option_id`, cast at `at`.
    ///
    /// The option's `last_highest_vote_at` is stamped when its new count ties
    /// or exceeds every other option, so the earliest option to reach the
    /// final maximum keeps the oldest stamp among the leaders.
    pub fn register_vote(&mut self, option_id: OptionId, at: DateTime<Utc>) -> Option<&VotingOption> {
        let index = self.options.iter().position(|option| option.id == option_id)?;
        let new_count = self.options[index].vote_count.saturating_add(1);

        let leading = self
            .options
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .all(|(_, other)| new_count >= other.vote_count);

        let option = &mut self.options[index];
        option.vote_count = new_count;
        if leading {
            option.last_highest_vote_at = Some(at);
        }
        Some(&self.options[index])
    }

    pub fn total_votes(&self) -> u32 {
        self.options.iter().map(|option| option.vote_count).sum()
    }
}

/// A recorded ballot. At most one per user per session.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vote {
    pub session_id: SessionId,
    pub option_id: OptionId,
    pub user_id: UserId,
    pub cast_at: DateTime<Utc>,
}

/// Picks the session winner.
///
/// Highest vote count wins. Among tied leaders the earliest
/// `last_highest_vote_at` wins, and a stamped option beats an unstamped one.
/// When no option received a vote the winner is drawn uniformly at random.
pub fn select_winner<'a, R>(options: &'a [VotingOption], rng: &mut R) -> Option<&'a VotingOption>
where
    R: Rng + ?Sized,
{
    if options.is_empty() {
        return None;
    }

    if options.iter().all(|option| option.vote_count == 0) {
        let index = rng.gen_range(0..options.len());
        return options.get(index);
    }

    let mut best = &options[0];
    for option in &options[1..] {
        if beats(option, best) {
            best = option;
        }
    }
    Some(best)
}

fn beats(candidate: &VotingOption, current: &VotingOption) -> bool {
    if candidate.vote_count != current.vote_count {
        return candidate.vote_count > current.vote_count;
    }
    match (candidate.last_highest_vote_at, current.last_highest_vote_at) {
        (Some(a), Some(b)) => a < b,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Strictly increasing wall clock for vote stamps.
///
/// Two votes landing within the clock's resolution still get distinct,
/// ordered timestamps, keeping tie-breaks deterministic.
#[derive(Debug, Default)]
pub struct VoteClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl VoteClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut now = Utc::now();
        if let Some(previous) = *last
            && now <= previous
        {
            now = previous + Duration::nanoseconds(1);
        }
        *last = Some(now);
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn session(keys: &[&str]) -> VotingSession {
        let id = SessionId(1);
        VotingSession {
            id,
            status: SessionStatus::Voting,
            options: keys
                .iter()
                .enumerate()
                .map(|(i, key)| VotingOption {
                    id: OptionId(i as u64 + 1),
                    session_id: id,
                    node_id: NodeId(i as u64 + 10),
                    node_key: (*key).to_owned(),
                    target_level: 1,
                    vote_count: 0,
                    last_highest_vote_at: None,
                })
                .collect(),
            created_at: Utc::now(),
            ended_at: None,
            winning_option: None,
        }
    }

    #[test]
    fn highest_count_wins() {
        let clock = VoteClock::new();
        let mut s = session(&["a", "b"]);
        for _ in 0..3 {
            s.register_vote(OptionId(2), clock.now());
        }
        s.register_vote(OptionId(1), clock.now());

        let winner = select_winner(&s.options, &mut rand::thread_rng()).unwrap();
        assert_eq!(winner.node_key, "b");
        assert_eq!(winner.vote_count, 3);
        assert_eq!(s.total_votes(), 4);
    }

    #[test]
    fn tie_goes_to_option_that_reached_it_first() {
        let clock = VoteClock::new();
        let mut s = session(&["a", "b", "c"]);
        s.register_vote(OptionId(2), clock.now());
        s.register_vote(OptionId(1), clock.now());

        let winner = select_winner(&s.options, &mut rand::thread_rng()).unwrap();
        assert_eq!(winner.node_key, "b");
    }

    #[test]
    fn overtaking_option_restamps() {
        let clock = VoteClock::new();
        let mut s = session(&["a", "b"]);
        s.register_vote(OptionId(1), clock.now());
        s.register_vote(OptionId(2), clock.now());
        s.register_vote(OptionId(2), clock.now());
        s.register_vote(OptionId(1), clock.now());

        // Both at two votes; b reached two before a did.
        let winner = select_winner(&s.options, &mut rand::thread_rng()).unwrap();
        assert_eq!(winner.node_key, "b");
    }

    #[test]
    fn trailing_vote_does_not_stamp() {
        let clock = VoteClock::new();
        let mut s = session(&["a", "b"]);
        s.register_vote(OptionId(1), clock.now());
        s.register_vote(OptionId(1), clock.now());
        let option = s.register_vote(OptionId(2), clock.now()).unwrap();
        assert_eq!(option.vote_count, 1);
        assert!(option.last_highest_vote_at.is_none());
    }

    #[test]
    fn zero_votes_picks_some_option() {
        let s = session(&["a", "b", "c", "d"]);
        let mut rng = StdRng::seed_from_u64(7);
        let winner = select_winner(&s.options, &mut rng).unwrap();
        assert_eq!(winner.vote_count, 0);
        assert!(s.options.iter().any(|o| o.id == winner.id));
    }

    #[test]
    fn no_options_no_winner() {
        assert!(select_winner(&[], &mut rand::thread_rng()).is_none());
    }

    #[test]
    fn clock_is_strictly_increasing() {
        let clock = VoteClock::new();
        let stamps: Vec<_> = (0..100).map(|_| clock.now()).collect();
        assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
