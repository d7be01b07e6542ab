//! Entity store: flat user and venue tables cross-referenced by index.

use itertools::Itertools;
use rand::Rng;

use crate::dataset::Dataset;
use crate::math::distance::Point;
use crate::math::vector::Vector;
use crate::prelude::*;

pub type UserIndex = usize;
pub type VenueIndex = usize;

pub struct User {
    pub id: String,
    pub location: Option<Point>,

    /// Resolved check-ins as `(venue, observed count)`, ordered by venue ID.
    pub check_ins: Vec<(VenueIndex, f64)>,

    /// Symmetric friend list, empty unless the friendship regularization is enabled.
    pub friends: Vec<UserIndex>,

    pub bias: f64,
    pub factors: Vector,
}

impl User {
    /// Observed count at the venue, zero if the user has never checked in there.
    #[cfg(test)]
    #[must_use]
    pub fn count_at(&self, venue: VenueIndex) -> f64 {
        self.check_ins
            .iter()
            .find(|(index, _)| *index == venue)
            .map_or(0.0, |(_, count)| *count)
    }
}

/// Back-reference from a venue to one of its check-ins.
#[derive(Copy, Clone, Debug)]
pub struct VenueCheckIn {
    pub user: UserIndex,

    /// Position of the check-in in the user's `check_ins`.
    pub position: usize,

    pub count: f64,
}

pub struct Venue {
    pub id: String,
    pub location: Point,
    pub total_count: f64,

    /// Resolved neighbors in the input order.
    pub neighbors: Vec<VenueIndex>,

    /// Venues listing this one among their neighbors, once per occurrence.
    pub neighbor_of: Vec<VenueIndex>,

    pub check_ins: Vec<VenueCheckIn>,

    pub bias: f64,
    pub intrinsic: Vector,
    pub extrinsic: Vector,
}

pub struct EntityStore {
    pub users: Vec<User>,
    pub venues: Vec<Venue>,

    /// Unordered friend pairs, each once, lower index first.
    pub friend_pairs: Vec<(UserIndex, UserIndex)>,

    user_indices: AHashMap<String, UserIndex>,
    venue_indices: AHashMap<String, VenueIndex>,
}

impl EntityStore {
    /// Builds the store from the raw tables.
    ///
    /// Relations pointing at unknown entities are skipped.
    #[instrument(skip_all, fields(n_factors = n_factors))]
    pub fn build<R: Rng>(
        dataset: &Dataset,
        n_factors: usize,
        with_friends: bool,
        rng: &mut R,
    ) -> Self {
        let venue_ids = dataset
            .check_ins
            .values()
            .flat_map(AHashMap::keys)
            .filter(|venue_id| dataset.venue_locations.contains_key(*venue_id))
            .unique()
            .sorted()
            .collect_vec();
        let venue_indices: AHashMap<String, VenueIndex> = venue_ids
            .iter()
            .enumerate()
            .map(|(index, venue_id)| ((*venue_id).clone(), index))
            .collect();

        let mut n_skipped_check_ins = 0;
        let mut users = dataset
            .check_ins
            .iter()
            .sorted_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs))
            .map(|(user_id, venues)| {
                let check_ins = venues
                    .iter()
                    .filter_map(|(venue_id, count)| {
                        let index = venue_indices.get(venue_id).copied();
                        if index.is_none() {
                            n_skipped_check_ins += 1;
                        }
                        index.map(|index| (index, *count))
                    })
                    .sorted_by_key(|(index, _)| *index)
                    .collect_vec();
                User {
                    id: user_id.clone(),
                    location: dataset
                        .user_locations
                        .as_ref()
                        .and_then(|locations| locations.get(user_id).copied()),
                    check_ins,
                    friends: Vec::new(),
                    bias: 0.0,
                    factors: random_vector(rng, n_factors),
                }
            })
            .collect_vec();
        let user_indices: AHashMap<String, UserIndex> = users
            .iter()
            .enumerate()
            .map(|(index, user)| (user.id.clone(), index))
            .collect();

        let mut n_skipped_neighbors = 0;
        let mut venues = venue_ids
            .iter()
            .map(|venue_id| {
                let neighbors = dataset
                    .neighbors
                    .get(*venue_id)
                    .map(|neighbor_ids| {
                        neighbor_ids
                            .iter()
                            .filter_map(|neighbor_id| {
                                let index = venue_indices.get(neighbor_id).copied();
                                if index.is_none() {
                                    n_skipped_neighbors += 1;
                                }
                                index
                            })
                            .collect_vec()
                    })
                    .unwrap_or_default();
                Venue {
                    id: (*venue_id).clone(),
                    location: dataset.venue_locations[*venue_id],
                    total_count: 0.0,
                    neighbors,
                    neighbor_of: Vec::new(),
                    check_ins: Vec::new(),
                    bias: 0.0,
                    intrinsic: random_vector(rng, n_factors),
                    extrinsic: random_vector(rng, n_factors),
                }
            })
            .collect_vec();

        for (user_index, user) in users.iter().enumerate() {
            for (position, (venue_index, count)) in user.check_ins.iter().enumerate() {
                let venue = &mut venues[*venue_index];
                venue.total_count += count;
                venue.check_ins.push(VenueCheckIn {
                    user: user_index,
                    position,
                    count: *count,
                });
            }
        }
        for venue_index in 0..venues.len() {
            for neighbor_index in venues[venue_index].neighbors.clone() {
                venues[neighbor_index].neighbor_of.push(venue_index);
            }
        }

        let friend_pairs = match (&dataset.friendships, with_friends) {
            (Some(friendships), true) => collect_friend_pairs(friendships, &user_indices),
            _ => Vec::new(),
        };
        for (left, right) in &friend_pairs {
            users[*left].friends.push(*right);
            users[*right].friends.push(*left);
        }

        if n_skipped_check_ins != 0 {
            warn!(n_skipped_check_ins, "check-ins at venues without a location are skipped");
        }
        if n_skipped_neighbors != 0 {
            warn!(n_skipped_neighbors, "unknown neighbors are skipped");
        }
        let n_isolated_venues = venues.iter().filter(|venue| venue.neighbors.is_empty()).count();
        if n_isolated_venues != 0 {
            warn!(n_isolated_venues, "venues without neighbors have no competition term");
        }
        info!(
            n_users = users.len(),
            n_venues = venues.len(),
            n_friend_pairs = friend_pairs.len(),
            "store built",
        );

        Self {
            users,
            venues,
            friend_pairs,
            user_indices,
            venue_indices,
        }
    }

    #[must_use]
    pub fn user_index(&self, user_id: &str) -> Option<UserIndex> {
        self.user_indices.get(user_id).copied()
    }

    #[must_use]
    pub fn venue_index(&self, venue_id: &str) -> Option<VenueIndex> {
        self.venue_indices.get(venue_id).copied()
    }

    /// Number of training pairs.
    #[must_use]
    pub fn n_check_ins(&self) -> usize {
        self.users.iter().map(|user| user.check_ins.len()).sum()
    }
}

/// Symmetrizes and deduplicates the friendship lists into unordered pairs.
fn collect_friend_pairs(
    friendships: &AHashMap<String, Vec<String>>,
    user_indices: &AHashMap<String, UserIndex>,
) -> Vec<(UserIndex, UserIndex)> {
    let mut n_skipped = 0;
    let pairs = friendships
        .iter()
        .flat_map(|(user_id, friend_ids)| friend_ids.iter().map(move |friend_id| (user_id, friend_id)))
        .filter_map(|(user_id, friend_id)| {
            match (user_indices.get(user_id), user_indices.get(friend_id)) {
                (Some(left), Some(right)) if left != right => {
                    Some((*left.min(right), *left.max(right)))
                }
                (Some(_), Some(_)) => None,
                _ => {
                    n_skipped += 1;
                    None
                }
            }
        })
        .unique()
        .sorted()
        .collect_vec();
    if n_skipped != 0 {
        warn!(n_skipped, "friendships with unknown users are skipped");
    }
    pairs
}

fn random_vector<R: Rng>(rng: &mut R, length: usize) -> Vector {
    (0..length).map(|_| rng.gen_range(0.0..0.1)).collect()
}
