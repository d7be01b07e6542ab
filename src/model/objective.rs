//! Training objective: halved squared error plus the regularization penalties.

use crate::math::vector::dot;
use crate::model::Model;

/// Running sum of squared residuals.
#[derive(Default)]
pub struct SquaredError {
    error: f64,
    count: usize,
}

impl SquaredError {
    pub fn push(&mut self, residual: f64) {
        self.error += residual * residual;
        self.count += 1;
    }

    #[must_use]
    pub const fn sum(&self) -> f64 {
        self.error
    }

    #[cfg(test)]
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Root mean squared error, zero when nothing has been pushed.
    #[must_use]
    pub fn rmse(&self) -> f64 {
        (self.error / self.count.max(1) as f64).sqrt()
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Objective {
    /// Objective function value.
    pub value: f64,

    /// Root mean squared error of the training pairs.
    pub rmse: f64,
}

impl Model {
    /// Evaluates the objective from the cached predictions.
    ///
    /// Call [`Model::refresh_predictions`] after changing the parameters.
    #[must_use]
    pub fn objective(&self) -> Objective {
        let mut error = SquaredError::default();
        for (user_index, user) in self.store.users.iter().enumerate() {
            for position in 0..user.check_ins.len() {
                error.push(self.residual(user_index, position));
            }
        }

        let regularization = &self.config.regularization;
        let latent: f64 = self
            .store
            .users
            .iter()
            .map(|user| dot(&user.factors, &user.factors))
            .chain(
                self.store
                    .venues
                    .iter()
                    .map(|venue| dot(&venue.intrinsic, &venue.intrinsic)),
            )
            .sum();
        let bias: f64 = self
            .store
            .users
            .iter()
            .map(|user| user.bias * user.bias)
            .chain(self.store.venues.iter().map(|venue| venue.bias * venue.bias))
            .sum();
        let extrinsic: f64 = self
            .store
            .venues
            .iter()
            .map(|venue| dot(&venue.extrinsic, &venue.extrinsic))
            .sum();
        let friendship: f64 = self
            .store
            .friend_pairs
            .iter()
            .map(|(left, right)| {
                let (left, right) = (&self.store.users[*left].factors, &self.store.users[*right].factors);
                left.iter().zip(right).map(|(l, r)| (l - r) * (l - r)).sum::<f64>()
            })
            .sum();

        let value = 0.5 * error.sum()
            + 0.5 * regularization.latent * latent
            + 0.5 * regularization.bias * bias
            + 0.5 * regularization.extrinsic * extrinsic
            + 0.5 * regularization.friendship * friendship;
        Objective {
            value,
            rmse: error.rmse(),
        }
    }
}
