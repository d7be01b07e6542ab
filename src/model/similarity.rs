//! Pairwise venue similarity and its memoization.

use std::cmp::Ordering;

use parking_lot::RwLock;

use crate::math::vector::{cosine_from_sums, cosine_similarity, cosine_similarity_gradient, Vector};
use crate::model::config::SimilarityMode;
use crate::model::store::{EntityStore, Venue, VenueCheckIn, VenueIndex};
use crate::prelude::*;

/// Added to every user-to-venue distance, so that a venue at the user's home location still counts.
const DISTANCE_OFFSET_METERS: f64 = 0.1;

/// Memoized symmetric similarity.
///
/// Keys are venue index pairs ordered by the venues' IDs, so `(a, b)` and `(b, a)` share an entry.
/// Similarities depending on the trainable parameters are never memoized.
pub struct SimilarityCache {
    mode: SimilarityMode,
    entries: RwLock<AHashMap<(VenueIndex, VenueIndex), f64>>,
}

impl SimilarityCache {
    pub fn new(mode: SimilarityMode) -> Self {
        Self {
            mode,
            entries: RwLock::new(AHashMap::default()),
        }
    }

    pub fn similarity(&self, store: &EntityStore, a: VenueIndex, b: VenueIndex) -> f64 {
        let key = canonical_key(store, a, b);
        if self.mode.is_trainable() {
            return compute(self.mode, store, key.0, key.1);
        }
        if let Some(similarity) = self.entries.read().get(&key) {
            return *similarity;
        }
        // Concurrent misses on the same key compute the same value, the last write wins.
        let similarity = compute(self.mode, store, key.0, key.1);
        self.entries.write().insert(key, similarity);
        similarity
    }

    /// Gradient of `similarity(of, other)` with respect to the extrinsic vector of `of`.
    ///
    /// `None` when the similarity does not depend on the trainable parameters.
    pub fn gradient(&self, store: &EntityStore, of: VenueIndex, other: VenueIndex) -> Option<Vector> {
        match self.mode {
            SimilarityMode::VectorCosine => Some(cosine_similarity_gradient(
                &store.venues[of].extrinsic,
                &store.venues[other].extrinsic,
            )),
            _ => None,
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

fn canonical_key(store: &EntityStore, a: VenueIndex, b: VenueIndex) -> (VenueIndex, VenueIndex) {
    if store.venues[a].id <= store.venues[b].id {
        (a, b)
    } else {
        (b, a)
    }
}

fn compute(mode: SimilarityMode, store: &EntityStore, a: VenueIndex, b: VenueIndex) -> f64 {
    let (venue_a, venue_b) = (&store.venues[a], &store.venues[b]);
    match mode {
        SimilarityMode::CheckinCosine => checkin_cosine(venue_a, venue_b),
        SimilarityMode::DistanceCosine => distance_cosine(store, venue_a, venue_b),
        SimilarityMode::VectorCosine => cosine_similarity(&venue_a.extrinsic, &venue_b.extrinsic),
        SimilarityMode::Constant => 1.0,
    }
}

/// Cosine of the check-in count vectors over the users of either venue.
pub fn checkin_cosine(a: &Venue, b: &Venue) -> f64 {
    let (mut numerator, mut a_sq, mut b_sq) = (0.0, 0.0, 0.0);
    merge_join(&a.check_ins, &b.check_ins, |a, b| {
        let count_a = a.map_or(0.0, |check_in| check_in.count);
        let count_b = b.map_or(0.0, |check_in| check_in.count);
        numerator += count_a * count_b;
        a_sq += count_a * count_a;
        b_sq += count_b * count_b;
    });
    cosine_from_sums(numerator, a_sq, b_sq)
}

/// Cosine of the user-to-venue distance vectors over the located users common to both venues.
pub fn distance_cosine(store: &EntityStore, a: &Venue, b: &Venue) -> f64 {
    let (mut numerator, mut a_sq, mut b_sq) = (0.0, 0.0, 0.0);
    merge_join(&a.check_ins, &b.check_ins, |check_in_a, check_in_b| {
        let (Some(check_in), Some(_)) = (check_in_a, check_in_b) else {
            return;
        };
        let Some(location) = store.users[check_in.user].location else {
            return;
        };
        let distance_a = location.haversine_distance(&a.location) + DISTANCE_OFFSET_METERS;
        let distance_b = location.haversine_distance(&b.location) + DISTANCE_OFFSET_METERS;
        numerator += distance_a * distance_b;
        a_sq += distance_a * distance_a;
        b_sq += distance_b * distance_b;
    });
    cosine_from_sums(numerator, a_sq, b_sq)
}

/// Walks two check-in lists ordered by user, calling `f` once per user of either list.
fn merge_join<F>(a: &[VenueCheckIn], b: &[VenueCheckIn], mut f: F)
where
    F: FnMut(Option<&VenueCheckIn>, Option<&VenueCheckIn>),
{
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let ordering = match (a.get(i), b.get(j)) {
            (Some(lhs), Some(rhs)) => lhs.user.cmp(&rhs.user),
            (Some(_), None) => Ordering::Less,
            _ => Ordering::Greater,
        };
        match ordering {
            Ordering::Less => {
                f(Some(&a[i]), None);
                i += 1;
            }
            Ordering::Greater => {
                f(None, Some(&b[j]));
                j += 1;
            }
            Ordering::Equal => {
                f(Some(&a[i]), Some(&b[j]));
                i += 1;
                j += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::model::fixtures;

    fn store() -> EntityStore {
        EntityStore::build(&fixtures::dataset(), 3, false, &mut StdRng::seed_from_u64(7))
    }

    #[test]
    fn symmetric_ok() {
        let store = store();
        for mode in [
            SimilarityMode::CheckinCosine,
            SimilarityMode::DistanceCosine,
            SimilarityMode::VectorCosine,
            SimilarityMode::Constant,
        ] {
            let cache = SimilarityCache::new(mode);
            for a in 0..store.venues.len() {
                for b in 0..store.venues.len() {
                    let forward = cache.similarity(&store, a, b);
                    cache.clear();
                    let backward = cache.similarity(&store, b, a);
                    assert_eq!(forward.to_bits(), backward.to_bits(), "{:?}", mode);
                    assert!((-1.0..=1.0).contains(&forward), "{:?}: {}", mode, forward);
                }
            }
        }
    }

    #[test]
    fn canonical_key_shares_entry() {
        let store = store();
        let cache = SimilarityCache::new(SimilarityMode::CheckinCosine);
        cache.similarity(&store, 0, 1);
        cache.similarity(&store, 1, 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_is_transparent() {
        let store = store();
        let cache = SimilarityCache::new(SimilarityMode::DistanceCosine);
        let cached = cache.similarity(&store, 0, 2);
        assert_eq!(cache.similarity(&store, 0, 2).to_bits(), cached.to_bits());
        cache.clear();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.similarity(&store, 2, 0).to_bits(), cached.to_bits());
    }

    #[test]
    fn vector_cosine_is_not_memoized() {
        let mut store = store();
        let cache = SimilarityCache::new(SimilarityMode::VectorCosine);
        let before = cache.similarity(&store, 0, 1);
        assert_eq!(cache.len(), 0);
        store.venues[0].extrinsic = vec![1.0, 0.0, 0.0];
        store.venues[1].extrinsic = vec![0.0, 1.0, 0.0];
        let after = cache.similarity(&store, 0, 1);
        assert_ne!(before, after);
        assert_eq!(after, 0.0);
    }

    #[test]
    fn identical_check_ins_give_one() {
        let mut dataset = fixtures::dataset();
        dataset.check_ins = [
            ("alice", [("cafe", 3.0), ("gym", 3.0)]),
            ("bob", [("cafe", 1.5), ("gym", 1.5)]),
            ("carol", [("park", 1.0), ("gym", 0.0)]),
        ]
        .into_iter()
        .map(|(user_id, venues)| {
            let venues: AHashMap<String, f64> = venues
                .into_iter()
                .map(|(venue_id, count)| (venue_id.to_string(), count))
                .collect();
            (user_id.to_string(), venues)
        })
        .collect();
        let store = EntityStore::build(&dataset, 2, false, &mut StdRng::seed_from_u64(7));
        let cafe = store.venue_index("cafe").unwrap();
        let gym = store.venue_index("gym").unwrap();
        let cache = SimilarityCache::new(SimilarityMode::CheckinCosine);
        assert_eq!(cache.similarity(&store, cafe, gym), 1.0);
    }

    #[test]
    fn no_common_users_give_zero_distance_cosine() {
        let store = store();
        let cache = SimilarityCache::new(SimilarityMode::DistanceCosine);
        let cafe = &store.venues[store.venue_index("cafe").unwrap()];
        let isolated = Venue {
            id: "isolated".to_string(),
            location: cafe.location,
            total_count: 0.0,
            neighbors: Vec::new(),
            neighbor_of: Vec::new(),
            check_ins: Vec::new(),
            bias: 0.0,
            intrinsic: vec![0.0; 3],
            extrinsic: vec![0.0; 3],
        };
        assert_eq!(distance_cosine(&store, cafe, &isolated), 0.0);
        assert!(cache.similarity(&store, 0, 1) > 0.0);
    }

    #[test]
    fn constant_ok() {
        let store = store();
        let cache = SimilarityCache::new(SimilarityMode::Constant);
        assert_eq!(cache.similarity(&store, 0, 2), 1.0);
        assert!(cache.gradient(&store, 0, 2).is_none());
    }
}
