//! Line-oriented text readers of the input tables.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::{FromStr, SplitWhitespace};

use crate::dataset::CheckIns;
use crate::math::distance::Point;
use crate::prelude::*;

/// Stand-in for the `?` location marker.
pub const UNKNOWN_LOCATION: Point = Point::new(10.804200, 106.695736);

pub fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("failed to open `{}`", path.display()))?;
    Ok(BufReader::new(file))
}

/// Reads `<userId> <venueId>:<count> <venueId>:<count> …` lines.
pub fn read_check_ins<R: BufRead>(reader: R, name: &str) -> Result<CheckIns> {
    let mut check_ins = CheckIns::default();
    for_each_line(reader, name, |mut fields| {
        let user_id = next_field(&mut fields, "user ID")?;
        let mut venues = AHashMap::default();
        for field in fields {
            let (venue_id, count) = field
                .split_once(':')
                .ok_or_else(|| anyhow!("expected `<venueId>:<count>`, got `{}`", field))?;
            let count = parse_finite(count)?;
            ensure!(
                venues.insert(venue_id.to_string(), count).is_none(),
                "venue `{}` is repeated",
                venue_id,
            );
        }
        ensure!(
            check_ins.insert(user_id.to_string(), venues).is_none(),
            "user `{}` is repeated",
            user_id,
        );
        Ok(())
    })?;
    debug!(name, n_users = check_ins.len(), "check-ins read");
    Ok(check_ins)
}

/// Reads `<id> <lat>,<lng>` or `<id> ?` lines.
pub fn read_locations<R: BufRead>(reader: R, name: &str) -> Result<AHashMap<String, Point>> {
    let mut locations = AHashMap::default();
    for_each_line(reader, name, |mut fields| {
        let id = next_field(&mut fields, "ID")?;
        let location = parse_location(next_field(&mut fields, "location")?)?;
        locations.insert(id.to_string(), location);
        Ok(())
    })?;
    debug!(name, n_locations = locations.len(), "locations read");
    Ok(locations)
}

/// Reads `<id> <otherId> <otherId> …` lines: venue neighbors or user friendships.
pub fn read_adjacency<R: BufRead>(reader: R, name: &str) -> Result<AHashMap<String, Vec<String>>> {
    let mut adjacency = AHashMap::default();
    for_each_line(reader, name, |mut fields| {
        let id = next_field(&mut fields, "ID")?;
        adjacency.insert(id.to_string(), fields.map(str::to_string).collect());
        Ok(())
    })?;
    debug!(name, n_entries = adjacency.len(), "adjacency read");
    Ok(adjacency)
}

/// Reads `<count>,<userId>,<venueId>` lines.
pub fn read_ground_truth<R: BufRead>(reader: R, name: &str) -> Result<CheckIns> {
    let mut ground_truth = CheckIns::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read `{}`", name))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (count, user_id, venue_id) = parse_ground_truth_line(line)
            .with_context(|| format!("{}:{}: malformed line", name, index + 1))?;
        ground_truth
            .entry(user_id.to_string())
            .or_default()
            .insert(venue_id.to_string(), count);
    }
    debug!(name, n_users = ground_truth.len(), "ground truth read");
    Ok(ground_truth)
}

fn parse_ground_truth_line(line: &str) -> Result<(f64, &str, &str)> {
    let mut fields = line.split(',');
    let count = parse_finite(next_field(&mut fields, "count")?)?;
    let user_id = next_field(&mut fields, "user ID")?;
    let venue_id = next_field(&mut fields, "venue ID")?;
    Ok((count, user_id, venue_id))
}

fn for_each_line<R, F>(reader: R, name: &str, mut f: F) -> Result
where
    R: BufRead,
    F: FnMut(SplitWhitespace<'_>) -> Result,
{
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read `{}`", name))?;
        if line.trim().is_empty() {
            continue;
        }
        f(line.split_whitespace()).with_context(|| format!("{}:{}: malformed line", name, index + 1))?;
    }
    Ok(())
}

fn next_field<'a>(fields: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<&'a str> {
    fields
        .next()
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .ok_or_else(|| anyhow!("missing {}", what))
}

fn parse_finite(value: &str) -> Result<f64> {
    match f64::from_str(value.trim())? {
        value if value.is_finite() => Ok(value),
        value => Err(anyhow!("{} is not a finite number", value)),
    }
}

fn parse_location(value: &str) -> Result<Point> {
    if value == "?" {
        return Ok(UNKNOWN_LOCATION);
    }
    let (latitude, longitude) = value
        .split_once(',')
        .ok_or_else(|| anyhow!("expected `<lat>,<lng>` or `?`, got `{}`", value))?;
    Ok(Point::new(parse_finite(latitude)?, parse_finite(longitude)?))
}
