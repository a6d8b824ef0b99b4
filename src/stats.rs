//! Per-level summary of an imported POI set.

use crate::mapping::LevelClassifier;
use crate::poi::OsmPoi;

/// Count POIs per Level, in registry (declaration) order. Levels without any
/// POI are included so gaps in the mapping stand out.
pub fn level_summary(pois: &[OsmPoi], classifier: &LevelClassifier) -> String {
    let mut counts = vec![0usize; classifier.levels().len()];
    for poi in pois {
        counts[poi.level.0 as usize - 1] += 1;
    }

    let mut out = format!("{} pois imported:", pois.len());
    for (level, count) in classifier.levels().iter().zip(counts) {
        out.push_str(&format!(
            "\n\tlevel {:>3} '{}' (factor {}): {} pois",
            level.id.0, level.name, level.factor, count
        ));
    }
    out
}
