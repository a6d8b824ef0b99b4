//! Optional name-to-population lookup loaded from a flat two-column table.
//!
//! The table backfills a missing `population` tag on settlement nodes before
//! classification, so population-gated Levels also apply to places whose OSM
//! data lacks the tag.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

use crate::poi::{TagMap, resolve_name};

#[derive(Debug, Default)]
pub struct PopulationTable {
    entries: HashMap<String, i64>,
}

impl PopulationTable {
    /// Parse a tab-separated `name<TAB>population` file. Lines starting with
    /// `#` are comments; malformed lines are logged and skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Population: failed to read {:?}", path))?;
        Ok(Self::parse(&raw))
    }

    pub fn parse(raw: &str) -> Self {
        let mut entries = HashMap::new();
        for (number, line) in raw.lines().enumerate() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut columns = line.splitn(2, '\t');
            let name = columns.next().unwrap_or("");
            let population = columns.next().and_then(|v| v.trim().parse::<i64>().ok());
            match population {
                Some(population) if !name.is_empty() => {
                    entries.insert(name.to_string(), population);
                }
                _ => {
                    tracing::warn!("Population: skipping malformed line {}", number + 1);
                }
            }
        }
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.entries.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert `population` into a settlement's tag set when the table knows
    /// its name and the extract does not carry the tag. Returns true when a
    /// value was added.
    pub fn backfill(&self, tags: &mut TagMap) -> bool {
        if !tags.contains_key("place") || tags.contains_key("population") {
            return false;
        }
        let Some(name) = resolve_name(tags) else {
            return false;
        };
        let Some(population) = self.get(&name) else {
            return false;
        };
        tags.insert("population".to_string(), population.to_string());
        true
    }
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

    #[test]
    fn parses_tab_separated_rows() {
        let table = PopulationTable::parse("# comment\nX\t500000\nStuttgart\t635911\n");
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("X"), Some(500_000));
        assert_eq!(table.get("Stuttgart"), Some(635_911));
        assert_eq!(table.get("Y"), None);
    }

    #[test]
    fn skips_malformed_rows() {
        let table = PopulationTable::parse("onlyname\nX\tnotanumber\nY\t12\n");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("Y"), Some(12));
    }

    #[test]
    fn backfills_missing_population_on_settlements() {
        let table = PopulationTable::parse("X\t500000\n");
        let mut settlement = tags(&[("place", "city"), ("name", "X")]);
        assert!(table.backfill(&mut settlement));
        assert_eq!(
            settlement.get("population").map(String::as_str),
            Some("500000")
        );
    }

    #[test]
    fn never_overrides_an_existing_tag() {
        let table = PopulationTable::parse("X\t500000\n");
        let mut settlement = tags(&[("place", "city"), ("name", "X"), ("population", "123")]);
        assert!(!table.backfill(&mut settlement));
        assert_eq!(
            settlement.get("population").map(String::as_str),
            Some("123")
        );
    }

    #[test]
    fn ignores_non_settlements_and_unknown_names() {
        let table = PopulationTable::parse("X\t500000\n");
        let mut amenity = tags(&[("amenity", "cafe"), ("name", "X")]);
        assert!(!table.backfill(&mut amenity));
        let mut unknown = tags(&[("place", "city"), ("name", "Y")]);
        assert!(!table.backfill(&mut unknown));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(file, "X\t42").unwrap();
        let table = PopulationTable::load(file.path()).unwrap();
        assert_eq!(table.get("X"), Some(42));
    }
}
