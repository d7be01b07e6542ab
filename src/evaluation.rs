//! Held-out evaluation: prediction errors, mean baselines and top-K recall.

use itertools::Itertools;
use rayon::prelude::*;
use serde::Serialize;

use crate::dataset::CheckIns;
use crate::model::objective::SquaredError;
use crate::model::store::{UserIndex, VenueIndex};
use crate::model::Model;
use crate::prelude::*;

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct ErrorMetrics {
    /// Number of evaluated pairs.
    pub n: usize,

    pub mae: f64,
    pub rmse: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Evaluation {
    pub model: ErrorMetrics,
    pub global_mean: ErrorMetrics,
    pub user_mean: ErrorMetrics,
    pub venue_mean: ErrorMetrics,

    /// `(K, recall@K)`.
    pub recalls: Vec<(usize, f64)>,

    /// Ground-truth pairs with an unknown user or venue.
    pub n_skipped: usize,
}

/// Ground-truth pair resolved against the store.
struct Pair {
    user: UserIndex,
    venue: VenueIndex,
    count: f64,
}

#[instrument(skip_all, fields(n_users = ground_truth.len()))]
pub fn evaluate(model: &Model, ground_truth: &CheckIns, top_k: &[usize]) -> Evaluation {
    let (pairs, n_skipped) = resolve(model, ground_truth);
    if n_skipped != 0 {
        warn!(n_skipped, "ground-truth pairs with an unknown user or venue are skipped");
    }

    let user_means = model
        .store
        .users
        .iter()
        .map(|user| match user.check_ins.len() {
            0 => model.mu,
            n => user.check_ins.iter().map(|(_, count)| count).sum::<f64>() / n as f64,
        })
        .collect_vec();
    let venue_means = model
        .store
        .venues
        .iter()
        .map(|venue| match venue.check_ins.len() {
            0 => model.mu,
            n => venue.total_count / n as f64,
        })
        .collect_vec();

    let evaluation = Evaluation {
        model: error_metrics(&pairs, |pair| model.predict_pair(pair.user, pair.venue)),
        global_mean: error_metrics(&pairs, |_| model.mu),
        user_mean: error_metrics(&pairs, |pair| user_means[pair.user]),
        venue_mean: error_metrics(&pairs, |pair| venue_means[pair.venue]),
        recalls: top_k_recall(model, ground_truth, top_k),
        n_skipped,
    };
    info!(
        n = evaluation.model.n,
        mae = evaluation.model.mae,
        rmse = evaluation.model.rmse,
        "evaluated",
    );
    evaluation
}

/// Resolves the ground-truth pairs in a stable order, counting the unresolved ones.
fn resolve(model: &Model, ground_truth: &CheckIns) -> (Vec<Pair>, usize) {
    let mut n_skipped = 0;
    let mut pairs = Vec::new();
    for (user_id, venues) in ground_truth {
        for (venue_id, count) in venues {
            match (model.store.user_index(user_id), model.store.venue_index(venue_id)) {
                (Some(user), Some(venue)) => pairs.push(Pair {
                    user,
                    venue,
                    count: *count,
                }),
                _ => n_skipped += 1,
            }
        }
    }
    pairs.sort_unstable_by_key(|pair| (pair.user, pair.venue));
    (pairs, n_skipped)
}

fn error_metrics<F: Fn(&Pair) -> f64>(pairs: &[Pair], predict: F) -> ErrorMetrics {
    let mut squared_error = SquaredError::default();
    let mut absolute_error = 0.0;
    for pair in pairs {
        let residual = predict(pair) - pair.count;
        squared_error.push(residual);
        absolute_error += residual.abs();
    }
    ErrorMetrics {
        n: pairs.len(),
        mae: absolute_error / pairs.len().max(1) as f64,
        rmse: squared_error.rmse(),
    }
}

/// Mean share of each user's ground-truth venues found among their `K` highest predictions.
///
/// Venues are ranked by the predicted count, ties broken by the venue ID.
/// Only users known to the model are evaluated.
fn top_k_recall(model: &Model, ground_truth: &CheckIns, top_k: &[usize]) -> Vec<(usize, f64)> {
    let max_k = top_k.iter().copied().max().unwrap_or_default();
    let users = ground_truth
        .iter()
        .filter(|(_, venues)| !venues.is_empty())
        .filter_map(|(user_id, venues)| Some((model.store.user_index(user_id)?, venues)))
        .collect_vec();

    let hits: Vec<Vec<f64>> = users
        .par_iter()
        .map(|(user_index, truth)| {
            let ranking = rank_venues(model, *user_index, max_k);
            top_k
                .iter()
                .map(|k| {
                    let n_hits = ranking
                        .iter()
                        .take(*k)
                        .filter(|venue_index| truth.contains_key(&model.store.venues[**venue_index].id))
                        .count();
                    n_hits as f64 / truth.len() as f64
                })
                .collect::<Vec<f64>>()
        })
        .collect();

    top_k
        .iter()
        .enumerate()
        .map(|(i, k)| {
            let recall = if hits.is_empty() {
                0.0
            } else {
                hits.iter().map(|user_hits| user_hits[i]).sum::<f64>() / hits.len() as f64
            };
            info!(k, recall, "top-K recall");
            (*k, recall)
        })
        .collect()
}

/// Indices of the user's `limit` highest-predicted venues.
fn rank_venues(model: &Model, user: UserIndex, limit: usize) -> Vec<VenueIndex> {
    let venues = &model.store.venues;
    (0..venues.len())
        .map(|venue| (venue, model.predict_pair(user, venue)))
        .sorted_by(|(lhs, lhs_prediction), (rhs, rhs_prediction)| {
            rhs_prediction
                .total_cmp(lhs_prediction)
                .then_with(|| venues[*lhs].id.cmp(&venues[*rhs].id))
        })
        .take(limit)
        .map(|(venue, _)| venue)
        .collect()
}
