//! Role distribution for a match
//!
//! Maps a roster size onto the fixed balance table and shuffles the result.
//! Composition is fully determined by the player count; only the order
//! produced by the shuffle is random.

use rand::seq::SliceRandom;
use rand::Rng;
use shared::Role;

/// Smallest roster the table covers
pub const MIN_TABLE_PLAYERS: usize = 4;
/// Largest roster the table covers
pub const MAX_TABLE_PLAYERS: usize = 7;

/// How many of each role a roster of a given size receives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoleCounts {
    pub sheriff: usize,
    pub renegade: usize,
    pub outlaw: usize,
    pub deputy: usize,
}

impl RoleCounts {
    pub fn total(&self) -> usize {
        self.sheriff + self.renegade + self.outlaw + self.deputy
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Looks up the balance table. Sizes outside 4..=7 get all-zero counts.
pub fn role_counts(player_count: usize) -> RoleCounts {
    let (outlaw, deputy) = match player_count {
        4 => (2, 0),
        5 => (2, 1),
        6 => (3, 1),
        7 => (3, 2),
        _ => return RoleCounts::default(),
    };

    RoleCounts {
        sheriff: 1,
        renegade: 1,
        outlaw,
        deputy,
    }
}

/// Produces the unshuffled role list for `player_count` players
pub fn role_list(player_count: usize) -> Vec<Role> {
    let counts = role_counts(player_count);
    let mut roles = Vec::with_capacity(counts.total());

    roles.extend(std::iter::repeat(Role::Sheriff).take(counts.sheriff));
    roles.extend(std::iter::repeat(Role::Renegade).take(counts.renegade));
    roles.extend(std::iter::repeat(Role::Outlaw).take(counts.outlaw));
    roles.extend(std::iter::repeat(Role::Deputy).take(counts.deputy));

    roles
}

/// Returns a shuffled role list, or an empty list for unsupported sizes.
///
/// `SliceRandom::shuffle` is a Fisher-Yates shuffle, so every permutation
/// of the multiset is equally likely.
pub fn distribute<R: Rng + ?Sized>(player_count: usize, rng: &mut R) -> Vec<Role> {
    let mut roles = role_list(player_count);
    roles.shuffle(rng);
    roles
}
