//! Check-in count model: biases, user–venue affinity and the neighbor competition.
//!
//! `predict(u, v) = μ + b_v + b_u + ⟨I_v, U_u⟩ + β / |N(v)| · Σₖ w(u, v, k) · ⟨U_u, E_k⟩`,
//! where `w(u, v, k) = α · link(⟨U_u, E_v⟩ - ⟨U_u, E_k⟩) + (1 - α) · similarity(v, k)`.

use rand::Rng;
use rayon::prelude::*;

use crate::dataset::Dataset;
use crate::math::vector::dot;
use crate::model::config::{ModelConfig, SimilarityMode};
use crate::model::similarity::SimilarityCache;
use crate::model::store::{EntityStore, User, UserIndex, Venue, VenueIndex};
use crate::prelude::*;

pub mod config;
pub mod gradient;
pub mod objective;
pub mod similarity;
pub mod store;

#[cfg(test)]
pub mod fixtures;

pub struct Model {
    pub config: ModelConfig,

    /// Mean observed count of the training set.
    pub mu: f64,

    pub store: EntityStore,

    similarities: SimilarityCache,

    /// Predictions of the training pairs, aligned with each user's `check_ins`.
    predictions: Vec<Vec<f64>>,
}

/// One neighbor's share of the competition term for a user at a venue.
#[derive(Copy, Clone, Debug)]
pub struct NeighborTerm {
    pub neighbor: VenueIndex,

    /// `⟨U, E_neighbor⟩`.
    pub user_neighbor: f64,

    pub link_derivative: f64,

    /// `α · link + (1 - α) · similarity`.
    pub weight: f64,

    /// The link function or the neighbor affinity was not finite. The whole term is zeroed.
    pub is_degenerate: bool,
}

impl Model {
    /// Validates the configuration against the dataset and builds a freshly initialized model.
    pub fn new<R: Rng>(dataset: &Dataset, config: ModelConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        ensure!(
            config.similarity != SimilarityMode::DistanceCosine || dataset.user_locations.is_some(),
            "the distance cosine similarity requires user locations",
        );
        ensure!(
            !config.friendship || dataset.friendships.is_some(),
            "the friendship regularization requires a friendship table",
        );
        let store = EntityStore::build(dataset, config.n_factors, config.friendship, rng);
        Ok(Self::from_parts(config, dataset.mean_count(), store))
    }

    /// Assembles a model from a built store, with a fresh similarity cache.
    pub fn from_parts(config: ModelConfig, mu: f64, store: EntityStore) -> Self {
        let mut model = Self {
            config,
            mu,
            store,
            similarities: SimilarityCache::new(config.similarity),
            predictions: Vec::new(),
        };
        model.refresh_predictions();
        model
    }

    pub const fn similarities(&self) -> &SimilarityCache {
        &self.similarities
    }

    #[cfg(test)]
    pub fn clear_similarities(&self) {
        self.similarities.clear();
    }

    /// Predicted check-in count, `None` when the user or the venue is unknown.
    #[must_use]
    pub fn predict(&self, user_id: &str, venue_id: &str) -> Option<f64> {
        let user = self.store.user_index(user_id)?;
        let venue = self.store.venue_index(venue_id)?;
        Some(self.predict_pair(user, venue))
    }

    #[must_use]
    pub fn predict_pair(&self, user: UserIndex, venue: VenueIndex) -> f64 {
        let user = &self.store.users[user];
        let venue_entity = &self.store.venues[venue];
        let mut prediction =
            self.mu + venue_entity.bias + user.bias + dot(&venue_entity.intrinsic, &user.factors);
        if let Some(scale) = self.competition_scale(venue_entity) {
            let competition: f64 = self
                .neighbor_terms(user, venue)
                .map(|term| term.weight * term.user_neighbor)
                .sum();
            prediction += scale * competition;
        }
        prediction
    }

    /// `β / |N(v)|`, or `None` for a venue without neighbors.
    #[must_use]
    pub fn competition_scale(&self, venue: &Venue) -> Option<f64> {
        match venue.neighbors.len() {
            0 => None,
            n_neighbors => Some(self.config.beta / n_neighbors as f64),
        }
    }

    pub fn neighbor_terms<'a>(
        &'a self,
        user: &'a User,
        venue: VenueIndex,
    ) -> impl Iterator<Item = NeighborTerm> + 'a {
        let user_venue = dot(&user.factors, &self.store.venues[venue].extrinsic);
        self.store.venues[venue]
            .neighbors
            .iter()
            .map(move |neighbor| self.neighbor_term(user, user_venue, venue, *neighbor))
    }

    /// Computes the competition share of `neighbor` for the user at `venue`.
    ///
    /// `user_venue` is `⟨U, E_venue⟩`.
    #[must_use]
    pub fn neighbor_term(
        &self,
        user: &User,
        user_venue: f64,
        venue: VenueIndex,
        neighbor: VenueIndex,
    ) -> NeighborTerm {
        let alpha = self.config.alpha;
        let user_neighbor = dot(&user.factors, &self.store.venues[neighbor].extrinsic);
        let difference = user_venue - user_neighbor;
        let link = self.config.link.value(difference);
        let link_derivative = self.config.link.derivative(difference);
        if !link.is_finite() || !link_derivative.is_finite() || !user_neighbor.is_finite() {
            return NeighborTerm {
                neighbor,
                user_neighbor: 0.0,
                link_derivative: 0.0,
                weight: 0.0,
                is_degenerate: true,
            };
        }
        let similarity = self.similarities.similarity(&self.store, venue, neighbor);
        NeighborTerm {
            neighbor,
            user_neighbor,
            link_derivative,
            weight: alpha * link + (1.0 - alpha) * similarity,
            is_degenerate: false,
        }
    }

    /// Recomputes the predictions of all training pairs from the current parameters.
    #[instrument(level = "debug", skip_all)]
    pub fn refresh_predictions(&mut self) {
        let predictions: Vec<Vec<f64>> = (0..self.store.users.len())
            .into_par_iter()
            .map(|user_index| {
                self.store.users[user_index]
                    .check_ins
                    .iter()
                    .map(|(venue_index, _)| self.predict_pair(user_index, *venue_index))
                    .collect::<Vec<f64>>()
            })
            .collect();
        self.predictions = predictions;
    }

    /// Cached prediction of the user's `position`-th check-in.
    #[cfg(test)]
    #[must_use]
    pub fn cached_prediction(&self, user: UserIndex, position: usize) -> f64 {
        self.predictions[user][position]
    }

    /// `predicted − observed` of the user's `position`-th check-in, from the cached predictions.
    #[must_use]
    pub fn residual(&self, user: UserIndex, position: usize) -> f64 {
        self.predictions[user][position] - self.store.users[user].check_ins[position].1
    }
}
