//! Durable JSON record of the trained parameters.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::math::vector::Vector;
use crate::model::config::ModelConfig;
use crate::model::Model;
use crate::prelude::*;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub bias: f64,
    pub factors: Vector,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VenueRecord {
    pub id: String,
    pub bias: f64,
    pub intrinsic: Vector,
    pub extrinsic: Vector,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub config: ModelConfig,
    pub mu: f64,
    pub users: Vec<UserRecord>,
    pub venues: Vec<VenueRecord>,
}

impl ModelRecord {
    #[must_use]
    pub fn from_model(model: &Model) -> Self {
        Self {
            config: model.config,
            mu: model.mu,
            users: model
                .store
                .users
                .iter()
                .map(|user| UserRecord {
                    id: user.id.clone(),
                    bias: user.bias,
                    factors: user.factors.clone(),
                })
                .collect(),
            venues: model
                .store
                .venues
                .iter()
                .map(|venue| VenueRecord {
                    id: venue.id.clone(),
                    bias: venue.bias,
                    intrinsic: venue.intrinsic.clone(),
                    extrinsic: venue.extrinsic.clone(),
                })
                .collect(),
        }
    }

    /// Fails on the first entity with a non-finite parameter, which JSON cannot represent.
    pub fn ensure_finite(&self) -> Result {
        ensure!(self.mu.is_finite(), "the global mean is not finite");
        for user in &self.users {
            ensure!(
                user.bias.is_finite() && user.factors.iter().all(|factor| factor.is_finite()),
                "user `{}` has non-finite parameters",
                user.id,
            );
        }
        for venue in &self.venues {
            ensure!(
                venue.bias.is_finite()
                    && venue.intrinsic.iter().chain(&venue.extrinsic).all(|factor| factor.is_finite()),
                "venue `{}` has non-finite parameters",
                venue.id,
            );
        }
        Ok(())
    }

    #[instrument(skip_all, fields(path = ?path))]
    pub fn save(&self, path: &Path) -> Result {
        self.ensure_finite().context("refusing to save a diverged model")?;
        let file = File::create(path).with_context(|| format!("failed to create `{}`", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).context("failed to serialize the model")?;
        writer.flush()?;
        info!(n_users = self.users.len(), n_venues = self.venues.len(), "model saved");
        Ok(())
    }

    #[instrument(skip_all, fields(path = ?path))]
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open `{}`", path.display()))?;
        let record: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to deserialize `{}`", path.display()))?;
        info!(n_users = record.users.len(), n_venues = record.venues.len(), "model loaded");
        Ok(record)
    }

    /// Rebuilds the model from the record and the tables it was trained on.
    ///
    /// Entities missing from the record keep their fresh random initialization.
    pub fn into_model<R: Rng>(self, dataset: &Dataset, rng: &mut R) -> Result<Model> {
        let n_factors = self.config.n_factors;
        for user in &self.users {
            ensure!(
                user.factors.len() == n_factors,
                "user `{}` has {} factors, expected {}",
                user.id,
                user.factors.len(),
                n_factors,
            );
        }
        for venue in &self.venues {
            ensure!(
                venue.intrinsic.len() == n_factors && venue.extrinsic.len() == n_factors,
                "venue `{}` has vectors of {} and {} factors, expected {}",
                venue.id,
                venue.intrinsic.len(),
                venue.extrinsic.len(),
                n_factors,
            );
        }

        let mut model = Model::new(dataset, self.config, rng)?;
        model.mu = self.mu;

        let mut n_unknown_users = 0;
        let mut n_restored_users = 0;
        for record in self.users {
            match model.store.user_index(&record.id) {
                Some(index) => {
                    let user = &mut model.store.users[index];
                    user.bias = record.bias;
                    user.factors = record.factors;
                    n_restored_users += 1;
                }
                None => n_unknown_users += 1,
            }
        }
        let mut n_unknown_venues = 0;
        let mut n_restored_venues = 0;
        for record in self.venues {
            match model.store.venue_index(&record.id) {
                Some(index) => {
                    let venue = &mut model.store.venues[index];
                    venue.bias = record.bias;
                    venue.intrinsic = record.intrinsic;
                    venue.extrinsic = record.extrinsic;
                    n_restored_venues += 1;
                }
                None => n_unknown_venues += 1,
            }
        }

        if n_unknown_users != 0 || n_unknown_venues != 0 {
            warn!(n_unknown_users, n_unknown_venues, "record entries without an entity are skipped");
        }
        let n_fresh_users = model.store.users.len() - n_restored_users;
        let n_fresh_venues = model.store.venues.len() - n_restored_venues;
        if n_fresh_users != 0 || n_fresh_venues != 0 {
            warn!(n_fresh_users, n_fresh_venues, "entities without a record keep a fresh initialization");
        }

        model.refresh_predictions();
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::model::fixtures;

    #[test]
    fn json_ok() -> Result {
        let model = fixtures::model(ModelConfig::default());
        let record = ModelRecord::from_model(&model);
        let json = serde_json::to_value(&record)?;
        assert_eq!(json["config"]["n_factors"], 10);
        assert_eq!(json["users"].as_array().map(Vec::len), Some(3));
        assert_eq!(json["venues"][0]["id"], "cafe");
        assert_eq!(serde_json::from_value::<ModelRecord>(json)?, record);
        Ok(())
    }

    #[test]
    fn into_model_restores_predictions() -> Result {
        let model = fixtures::model(ModelConfig {
            n_factors: 4,
            ..Default::default()
        });
        let record = ModelRecord::from_model(&model);
        let restored = record.into_model(&fixtures::dataset(), &mut StdRng::seed_from_u64(1))?;
        for user in &model.store.users {
            for venue in &model.store.venues {
                assert_eq!(model.predict(&user.id, &venue.id), restored.predict(&user.id, &venue.id));
            }
        }
        Ok(())
    }

    #[test]
    fn wrong_vector_length_fails() {
        let model = fixtures::model(ModelConfig::default());
        let mut record = ModelRecord::from_model(&model);
        record.venues[1].extrinsic.pop();
        assert!(record
            .into_model(&fixtures::dataset(), &mut StdRng::seed_from_u64(1))
            .is_err());
    }

    #[test]
    fn unknown_entries_are_skipped() -> Result {
        let model = fixtures::model(ModelConfig::default());
        let mut record = ModelRecord::from_model(&model);
        record.users.push(UserRecord {
            id: "ghost".to_string(),
            bias: 1.0,
            factors: vec![0.0; 10],
        });
        record.venues.remove(0);
        let restored = record.into_model(&fixtures::dataset(), &mut StdRng::seed_from_u64(1))?;
        assert_eq!(restored.store.users.len(), 3);
        assert!(restored.store.user_index("ghost").is_none());
        assert!(restored.predict("alice", "cafe").is_some());
        Ok(())
    }

    #[test]
    fn save_load_ok() -> Result {
        let model = fixtures::model(ModelConfig::default());
        let record = ModelRecord::from_model(&model);
        let path = std::env::temp_dir().join(format!("checkin-model-{}.json", std::process::id()));
        record.save(&path)?;
        let loaded = ModelRecord::load(&path);
        std::fs::remove_file(&path)?;
        assert_eq!(loaded?, record);
        Ok(())
    }

    #[test]
    fn save_non_finite_fails() {
        let mut model = fixtures::model(ModelConfig::default());
        model.store.users[0].bias = f64::NAN;
        let record = ModelRecord::from_model(&model);
        let path = std::env::temp_dir().join(format!("checkin-model-nan-{}.json", std::process::id()));
        let error = record.save(&path).unwrap_err();
        assert!(format!("{:#}", error).contains(&model.store.users[0].id));
        assert!(!path.exists());
    }

    #[test]
    fn ensure_finite_names_venue() {
        let model = fixtures::model(ModelConfig::default());
        let mut record = ModelRecord::from_model(&model);
        assert!(record.ensure_finite().is_ok());
        record.venues[2].extrinsic[1] = f64::INFINITY;
        let error = record.ensure_finite().unwrap_err();
        assert!(error.to_string().contains(&record.venues[2].id));
    }
}
