//! The classified point-of-interest record produced by the import pipeline.

use geo_types::Point;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::mapping::LevelId;
use crate::utils::leading_int;

pub type TagMap = HashMap<String, String>;

/// A labelable settlement or amenity with its resolved classification.
///
/// The id is the source node or relation id; area POIs reuse the relation id,
/// so ids are unique per primitive kind only. Instances are immutable after
/// construction.
#[derive(Debug, Clone)]
pub struct OsmPoi {
    pub id: i64,
    /// x = longitude, y = latitude, degrees.
    pub position: Point<f64>,
    pub level: LevelId,
    pub name: Option<String>,
    pub tags: TagMap,
}

impl OsmPoi {
    /// Priority ordering for the final sorted collection: earlier-declared
    /// Level first, then larger population, then smaller OSM id.
    pub fn priority_cmp(&self, other: &Self) -> Ordering {
        self.level
            .cmp(&other.level)
            .then_with(|| other.population().cmp(&self.population()))
            .then_with(|| self.id.cmp(&other.id))
    }

    pub fn population(&self) -> i64 {
        self.tags
            .get("population")
            .map(|value| leading_int(value))
            .unwrap_or(0)
    }
}

/// Resolve the display name: `name` beats `name:de` beats `name:en`.
pub fn resolve_name(tags: &TagMap) -> Option<String> {
    for key in ["name", "name:de", "name:en"] {
        if let Some(value) = tags.get(key) {
            return Some(value.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> TagMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn poi(id: i64, level: u32, population: Option<&str>) -> OsmPoi {
        let mut tags = TagMap::new();
        if let Some(pop) = population {
            tags.insert("population".to_string(), pop.to_string());
        }
        OsmPoi {
            id,
            position: Point::new(9.18, 48.78),
            level: LevelId(level),
            name: Some("X".to_string()),
            tags,
        }
    }

    #[test]
    fn name_precedence_prefers_plain_name() {
        let resolved = resolve_name(&tags(&[
            ("name:de", "Bahnhof"),
            ("name", "Gare"),
            ("name:en", "Station"),
        ]));
        assert_eq!(resolved.as_deref(), Some("Gare"));
    }

    #[test]
    fn name_precedence_falls_back_to_translations() {
        assert_eq!(
            resolve_name(&tags(&[("name:en", "Station"), ("name:de", "Bahnhof")])).as_deref(),
            Some("Bahnhof")
        );
        assert_eq!(
            resolve_name(&tags(&[("name:en", "Station")])).as_deref(),
            Some("Station")
        );
        assert_eq!(resolve_name(&tags(&[("place", "city")])), None);
    }

    #[test]
    fn priority_orders_by_level_then_population_then_id() {
        let mut pois = vec![
            poi(4, 2, None),
            poi(3, 1, Some("1000")),
            poi(2, 1, Some("50000")),
            poi(1, 2, None),
        ];
        pois.sort_by(OsmPoi::priority_cmp);
        let ids: Vec<i64> = pois.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 3, 1, 4]);
    }

    #[test]
    fn population_parses_leading_digits() {
        assert_eq!(poi(1, 1, Some("12000 (2019)")).population(), 12_000);
        assert_eq!(poi(1, 1, None).population(), 0);
    }
}
