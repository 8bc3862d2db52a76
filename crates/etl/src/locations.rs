use serde::Deserialize;
use std::fmt;

/// One ingestion target, read from the `[[locations]]` tables of the config file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Location {
            name: name.into(),
            latitude,
            longitude,
        }
    }

    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.latitude, self.longitude)
    }
}

/// Used when the config file does not list any locations.
pub fn default_locations() -> Vec<Location> {
    vec![Location::new("Johannesburg", -26.2041, 28.0473)]
}

/// Pairs of differently named locations whose slugs are equal, so their raw
/// snapshots and daily archives would land on the same file names.
pub fn shared_slugs(locations: &[Location]) -> Vec<(&Location, &Location)> {
    let slugs: Vec<String> = locations.iter().map(Location::slug).collect();
    let mut pairs = Vec::new();
    for (i, location) in locations.iter().enumerate() {
        for (j, other) in locations.iter().enumerate().skip(i + 1) {
            if slugs[i] == slugs[j] && location.name != other.name {
                pairs.push((location, other));
            }
        }
    }
    pairs
}

/// Lower-cases the name, turns spaces into underscores and drops anything
/// else that is not safe in a file name.
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            'a'..='z' | '0'..='9' | '_' | '-' => Some(c),
            _ => None,
        })
        .collect();

    if slug.is_empty() {
        String::from("location")
    } else {
        slug
    }
}
