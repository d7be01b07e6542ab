//! Exact gradients of the objective over one parameter snapshot.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::math::vector::{add_scaled, descend, dot, Vector};
use crate::model::store::{UserIndex, VenueIndex};
use crate::model::Model;
use crate::prelude::*;

#[derive(Clone, Debug, PartialEq)]
pub struct UserGradient {
    pub bias: f64,
    pub factors: Vector,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VenueGradient {
    pub bias: f64,
    pub intrinsic: Vector,
    pub extrinsic: Vector,
}

pub struct Gradients {
    pub users: Vec<UserGradient>,
    pub venues: Vec<VenueGradient>,

    /// Neighbor terms skipped because of a non-finite link value or affinity.
    pub n_degenerate: usize,
}

impl Model {
    /// Computes the gradients of all parameters from the current snapshot.
    ///
    /// Requires up-to-date cached predictions.
    #[instrument(level = "debug", skip_all)]
    pub fn gradients(&self) -> Gradients {
        let n_degenerate = AtomicUsize::new(0);
        let users: Vec<UserGradient> = (0..self.store.users.len())
            .into_par_iter()
            .map(|user_index| self.user_gradient(user_index, &n_degenerate))
            .collect();
        let venues: Vec<VenueGradient> = (0..self.store.venues.len())
            .into_par_iter()
            .map(|venue_index| self.venue_gradient(venue_index, &n_degenerate))
            .collect();
        let n_degenerate = n_degenerate.into_inner();
        if n_degenerate != 0 {
            warn!(n_degenerate, "non-finite link function values are treated as zero");
        }
        Gradients {
            users,
            venues,
            n_degenerate,
        }
    }

    /// Applies a gradient step: users first, then venues.
    ///
    /// The cached predictions are stale afterwards.
    pub fn apply(&mut self, gradients: &Gradients, learning_rate: f64) {
        for (user, gradient) in self.store.users.iter_mut().zip(&gradients.users) {
            user.bias -= learning_rate * gradient.bias;
            descend(&mut user.factors, &gradient.factors, learning_rate);
        }
        for (venue, gradient) in self.store.venues.iter_mut().zip(&gradients.venues) {
            venue.bias -= learning_rate * gradient.bias;
            descend(&mut venue.intrinsic, &gradient.intrinsic, learning_rate);
            descend(&mut venue.extrinsic, &gradient.extrinsic, learning_rate);
        }
    }

    fn user_gradient(&self, user_index: UserIndex, n_degenerate: &AtomicUsize) -> UserGradient {
        let alpha = self.config.alpha;
        let regularization = &self.config.regularization;
        let user = &self.store.users[user_index];

        let mut bias = regularization.bias * user.bias;
        let mut factors: Vector = user.factors.iter().map(|factor| regularization.latent * factor).collect();

        for (position, (venue_index, _)) in user.check_ins.iter().enumerate() {
            let residual = self.residual(user_index, position);
            let venue = &self.store.venues[*venue_index];
            bias += residual;
            add_scaled(&mut factors, &venue.intrinsic, residual);

            let Some(scale) = self.competition_scale(venue) else {
                continue;
            };
            for term in self.neighbor_terms(user, *venue_index) {
                if term.is_degenerate {
                    n_degenerate.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                // ∂/∂U of w · ⟨U, E_k⟩ = w · E_k + ⟨U, E_k⟩ · α · link′ · (E_v − E_k).
                let neighbor = &self.store.venues[term.neighbor];
                let weight_scale = residual * scale * term.weight;
                let link_scale = residual * scale * term.user_neighbor * alpha * term.link_derivative;
                for ((factor, own), other) in factors.iter_mut().zip(&venue.extrinsic).zip(&neighbor.extrinsic) {
                    *factor += weight_scale * other + link_scale * (own - other);
                }
            }
        }

        for friend in &user.friends {
            let friend = &self.store.users[*friend];
            for ((factor, own), other) in factors.iter_mut().zip(&user.factors).zip(&friend.factors) {
                *factor += regularization.friendship * (own - other);
            }
        }

        UserGradient { bias, factors }
    }

    fn venue_gradient(&self, venue_index: VenueIndex, n_degenerate: &AtomicUsize) -> VenueGradient {
        let alpha = self.config.alpha;
        let regularization = &self.config.regularization;
        let venue = &self.store.venues[venue_index];

        let mut bias = regularization.bias * venue.bias;
        let mut intrinsic: Vector = venue.intrinsic.iter().map(|factor| regularization.latent * factor).collect();
        let mut extrinsic: Vector =
            venue.extrinsic.iter().map(|factor| regularization.extrinsic * factor).collect();

        // Terms of the venue's own predictions.
        let scale = self.competition_scale(venue);
        for check_in in &venue.check_ins {
            let user = &self.store.users[check_in.user];
            let residual = self.residual(check_in.user, check_in.position);
            bias += residual;
            add_scaled(&mut intrinsic, &user.factors, residual);

            let Some(scale) = scale else {
                continue;
            };
            for term in self.neighbor_terms(user, venue_index) {
                if term.is_degenerate {
                    n_degenerate.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                add_scaled(
                    &mut extrinsic,
                    &user.factors,
                    residual * scale * term.user_neighbor * alpha * term.link_derivative,
                );
                if let Some(gradient) = self.similarities().gradient(&self.store, venue_index, term.neighbor) {
                    add_scaled(
                        &mut extrinsic,
                        &gradient,
                        residual * scale * term.user_neighbor * (1.0 - alpha),
                    );
                }
            }
        }

        // Terms of the predictions at venues listing this one as a neighbor.
        for other_index in &venue.neighbor_of {
            let other = &self.store.venues[*other_index];
            let Some(scale) = self.competition_scale(other) else {
                continue;
            };
            let similarity_gradient = self.similarities().gradient(&self.store, venue_index, *other_index);
            for check_in in &other.check_ins {
                let user = &self.store.users[check_in.user];
                let residual = self.residual(check_in.user, check_in.position);
                let user_other = dot(&user.factors, &other.extrinsic);
                let term = self.neighbor_term(user, user_other, *other_index, venue_index);
                if term.is_degenerate {
                    n_degenerate.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                add_scaled(
                    &mut extrinsic,
                    &user.factors,
                    residual * scale * (term.weight - term.user_neighbor * alpha * term.link_derivative),
                );
                if let Some(gradient) = &similarity_gradient {
                    add_scaled(
                        &mut extrinsic,
                        gradient,
                        residual * scale * term.user_neighbor * (1.0 - alpha),
                    );
                }
            }
        }

        VenueGradient {
            bias,
            intrinsic,
            extrinsic,
        }
    }
}
