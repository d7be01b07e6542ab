//! Raw input tables the model is built from.

use crate::helpers::tracing::format_elapsed;
use crate::math::distance::Point;
use crate::opts::InputOpts;
use crate::prelude::*;

pub mod reader;

/// User ID → venue ID → observed check-in count.
pub type CheckIns = AHashMap<String, AHashMap<String, f64>>;

#[derive(Default, Clone)]
pub struct Dataset {
    pub check_ins: CheckIns,
    pub venue_locations: AHashMap<String, Point>,
    pub user_locations: Option<AHashMap<String, Point>>,

    /// Venue ID → ordered neighbor venue IDs.
    pub neighbors: AHashMap<String, Vec<String>>,

    /// User ID → friend user IDs.
    pub friendships: Option<AHashMap<String, Vec<String>>>,
}

impl Dataset {
    #[instrument(skip_all)]
    pub fn read(opts: &InputOpts) -> Result<Self> {
        let start_instant = Instant::now();
        let name = opts.check_ins.display().to_string();
        let check_ins = reader::read_check_ins(reader::open(&opts.check_ins)?, &name)?;

        let name = opts.venue_locations.display().to_string();
        let venue_locations = reader::read_locations(reader::open(&opts.venue_locations)?, &name)?;

        let name = opts.neighbors.display().to_string();
        let neighbors = reader::read_adjacency(reader::open(&opts.neighbors)?, &name)?;

        let user_locations = match &opts.user_locations {
            Some(path) => {
                let name = path.display().to_string();
                Some(reader::read_locations(reader::open(path)?, &name)?)
            }
            None => None,
        };
        let friendships = match &opts.friendships {
            Some(path) => {
                let name = path.display().to_string();
                Some(reader::read_adjacency(reader::open(path)?, &name)?)
            }
            None => None,
        };

        let dataset = Self {
            check_ins,
            venue_locations,
            user_locations,
            neighbors,
            friendships,
        };
        info!(
            n_users = dataset.check_ins.len(),
            n_check_ins = dataset.n_check_ins(),
            n_venues = dataset.venue_locations.len(),
            elapsed = %format_elapsed(start_instant),
            "dataset loaded",
        );
        Ok(dataset)
    }

    #[must_use]
    pub fn n_check_ins(&self) -> usize {
        self.check_ins.values().map(AHashMap::len).sum()
    }

    /// Mean observed count over every entry of the check-in table.
    #[must_use]
    pub fn mean_count(&self) -> f64 {
        let (sum, n) = self
            .check_ins
            .values()
            .flat_map(AHashMap::values)
            .fold((0.0, 0_usize), |(sum, n), count| (sum + count, n + 1));
        if n == 0 {
            0.0
        } else {
            sum / n as f64
        }
    }
}
