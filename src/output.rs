//! Plain-text export of a classified POI set.
//!
//! One header line, then one tab-separated row per POI in collection order:
//! longitude, latitude, OSM id, Level id, render factor, name, icon.

use anyhow::{Context, Result};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::mapping::LevelClassifier;
use crate::poi::OsmPoi;

pub fn write_poi_file(
    path: &Path,
    pois: &[OsmPoi],
    classifier: &LevelClassifier,
) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Output: failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    write_pois(&mut writer, pois, classifier)?;
    writer
        .flush()
        .with_context(|| format!("Output: failed to flush {:?}", path))
}

fn write_pois<W: Write>(
    writer: &mut W,
    pois: &[OsmPoi],
    classifier: &LevelClassifier,
) -> Result<()> {
    writeln!(
        writer,
        "Longitude [-180, 180]\tLatitude [-90, 90]\tOsmID\tLevel\tFactor\tName\tIcon"
    )?;
    for poi in pois {
        let level = classifier.level(poi.level);
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            poi.position.x(),
            poi.position.y(),
            poi.id,
            level.id.0,
            level.factor,
            poi.name.as_deref().unwrap_or("<undefined>"),
            level.icon.as_deref().unwrap_or("-"),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;
    use serde_json::json;

    use crate::mapping::{LevelDoc, LevelId};
    use crate::poi::TagMap;

    #[test]
    fn writes_header_and_rows() {
        let doc: LevelDoc = serde_json::from_value(json!({
            "level": "root",
            "sublevels": [
                {"level": "city", "factor": 22, "constraints": [{"tag": "place", "equals": "city"}]},
                {"level": "undefined", "factor": 1}
            ]
        }))
        .unwrap();
        let classifier = LevelClassifier::from_doc(&doc).unwrap();
        let pois = vec![OsmPoi {
            id: 42,
            position: Point::new(9.18, 48.78),
            level: LevelId(1),
            name: Some("Stuttgart".to_string()),
            tags: TagMap::new(),
        }];

        let mut buffer = Vec::new();
        write_pois(&mut buffer, &pois, &classifier).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Longitude"));
        assert_eq!(lines[1], "9.18\t48.78\t42\t1\t22\tStuttgart\t-");
    }
}
