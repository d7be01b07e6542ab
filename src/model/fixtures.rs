//! Small synthetic dataset shared by the tests.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::dataset::{CheckIns, Dataset};
use crate::math::distance::Point;
use crate::model::config::ModelConfig;
use crate::model::Model;
use crate::prelude::*;

/// Three users, three venues, each venue neighboring the other two, one friendship.
pub fn dataset() -> Dataset {
    let check_ins: CheckIns = [
        ("alice", vec![("cafe", 3.0), ("park", 1.0)]),
        ("bob", vec![("cafe", 1.0), ("gym", 2.0)]),
        ("carol", vec![("gym", 4.0), ("park", 2.0)]),
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
    let venue_locations: AHashMap<String, Point> = [
        ("cafe", Point::new(1.3000, 103.8000)),
        ("gym", Point::new(1.3050, 103.8100)),
        ("park", Point::new(1.2900, 103.7950)),
    ]
    .into_iter()
    .map(|(id, point)| (id.to_string(), point))
    .collect();
    let user_locations: AHashMap<String, Point> = [
        ("alice", Point::new(1.3010, 103.8020)),
        ("bob", Point::new(1.3100, 103.8150)),
        ("carol", Point::new(1.2850, 103.7900)),
    ]
    .into_iter()
    .map(|(id, point)| (id.to_string(), point))
    .collect();
    let neighbors: AHashMap<String, Vec<String>> = [
        ("cafe", ["gym", "park"]),
        ("gym", ["park", "cafe"]),
        ("park", ["cafe", "gym"]),
    ]
    .into_iter()
    .map(|(id, neighbors)| (id.to_string(), neighbors.map(str::to_string).to_vec()))
    .collect();
    let friendships: AHashMap<String, Vec<String>> = [("alice", ["bob"]), ("bob", ["alice"])]
        .into_iter()
        .map(|(id, friends)| (id.to_string(), friends.map(str::to_string).to_vec()))
        .collect();

    Dataset {
        check_ins,
        venue_locations,
        user_locations: Some(user_locations),
        neighbors,
        friendships: Some(friendships),
    }
}

/// Builds a seeded model on the synthetic dataset.
///
/// Biases are set to non-zero values so that their gradients are not trivially regular.
pub fn model(config: ModelConfig) -> Model {
    let mut model = Model::new(&dataset(), config, &mut StdRng::seed_from_u64(42))
        .expect("the fixture configuration is valid");
    for (index, user) in model.store.users.iter_mut().enumerate() {
        user.bias = 0.1 * index as f64 - 0.1;
        for factor in user.factors.iter_mut() {
            *factor *= 10.0;
        }
    }
    for (index, venue) in model.store.venues.iter_mut().enumerate() {
        venue.bias = 0.05 * index as f64;
        for factor in venue.intrinsic.iter_mut().chain(venue.extrinsic.iter_mut()) {
            *factor *= 10.0;
        }
    }
    model.refresh_predictions();
    model
}
