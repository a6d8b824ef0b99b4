//! Parallel block extraction over a PBF stream.
//!
//! One extractor exists per primitive kind; all of them run through the same
//! `run_extraction_pass` driver, which fans decoded blocks out across the
//! rayon pool and funnels per-block result batches through a bounded channel
//! into a collector thread. Contention is proportional to block count, not
//! primitive count.

pub mod assembler;
pub mod import;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::bounded;
use geo_types::Point;
use osmpbf::{BlobDecode, BlobReader, Element, PrimitiveBlock, RelMemberType};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::filter::TagFilter;
use crate::mapping::{LevelClassifier, LevelId};
use crate::poi::{OsmPoi, TagMap, resolve_name};
use crate::population::PopulationTable;
use crate::utils::{ProgressCounter, build_tag_map};

/// Per-kind block consumer. Implementations must be pure per block; the
/// driver shares one instance across all workers by reference.
pub trait BlockExtractor: Sync {
    type Output: Send + 'static;

    fn extract(&self, block: &PrimitiveBlock) -> Vec<Self::Output>;
}

/// Decode the extract once, applying the extractor to every data block in
/// parallel. Opening the file is fatal; a block that fails to decode is
/// skipped with a diagnostic and never aborts the run. Passes that run
/// concurrently with another pass set `show_progress` to false so only one
/// progress line owns stderr.
pub fn run_extraction_pass<E>(
    path: &Path,
    extractor: &E,
    label: &'static str,
    blocks_in_flight: usize,
    show_progress: bool,
) -> Result<Vec<E::Output>>
where
    E: BlockExtractor,
{
    let reader = BlobReader::from_path(path)
        .with_context(|| format!("Import: failed to open extract {:?}", path))?;
    let (tx, rx) = bounded::<Vec<E::Output>>(blocks_in_flight.max(1));

    let collector = std::thread::spawn(move || -> Vec<E::Output> {
        let mut collected = Vec::new();
        for batch in rx {
            collected.extend(batch);
        }
        collected
    });

    let progress = if show_progress {
        ProgressCounter::new(label, 100)
    } else {
        ProgressCounter::silent(label)
    };
    let decode_result = reader.par_bridge().try_for_each(|blob_result| -> Result<()> {
        let blob = blob_result.with_context(|| format!("{}: blob stream error", label))?;
        let block = match blob.decode() {
            Ok(BlobDecode::OsmData(block)) => block,
            Ok(BlobDecode::OsmHeader(_)) => return Ok(()),
            Ok(BlobDecode::Unknown(kind)) => {
                tracing::debug!("{}: skipping unknown blob type {}", label, kind);
                return Ok(());
            }
            Err(error) => {
                tracing::warn!("{}: skipping undecodable block: {}", label, error);
                return Ok(());
            }
        };

        progress.inc(1);

        let batch = extractor.extract(&block);
        if !batch.is_empty() {
            tx.send(batch)
                .map_err(|err| anyhow!("{}: failed to send batch: {}", label, err))?;
        }
        Ok(())
    });

    drop(tx);
    let collected = collector
        .join()
        .map_err(|_| anyhow!("{}: collector thread panicked", label))?;
    // Terminate the progress line before any error can surface on stderr.
    progress.finish();
    tracing::debug!("{}: {} blocks processed", label, progress.count());
    decode_result?;

    Ok(collected)
}

/// Tag keys the extractors retain on matched elements: name resolution,
/// settlement handling, plus every key the classifier or filters inspect.
pub fn selected_tag_keys(classifier: &LevelClassifier, filters: &[&TagFilter]) -> HashSet<String> {
    let mut keys = classifier.required_keys();
    for filter in filters {
        filter.collect_keys(&mut keys);
    }
    for key in ["name", "name:de", "name:en", "place", "amenity", "population"] {
        keys.insert(key.to_string());
    }
    keys
}

fn retain_selected(mut tags: TagMap, keys: &HashSet<String>) -> TagMap {
    tags.retain(|key, _| keys.contains(key));
    tags
}

/// Build one node POI: backfill population, classify, and keep only
/// labelable results (a resolvable name, or an icon-bearing Level).
pub fn build_node_poi(
    id: i64,
    position: Point<f64>,
    mut tags: TagMap,
    classifier: &LevelClassifier,
    populations: Option<&PopulationTable>,
) -> Option<OsmPoi> {
    if let Some(table) = populations {
        table.backfill(&mut tags);
    }
    let level = classifier.classify(&tags);
    if classifier.is_default(level.id) {
        return None;
    }
    let name = resolve_name(&tags);
    if name.is_none() && !level.has_icon() {
        return None;
    }
    Some(OsmPoi {
        id,
        position,
        level: level.id,
        name,
        tags,
    })
}

pub struct NodePoiExtractor<'a> {
    pub filter: &'a TagFilter,
    pub classifier: &'a LevelClassifier,
    pub populations: Option<&'a PopulationTable>,
    pub keep_keys: &'a HashSet<String>,
}

impl BlockExtractor for NodePoiExtractor<'_> {
    type Output = OsmPoi;

    fn extract(&self, block: &PrimitiveBlock) -> Vec<OsmPoi> {
        let mut found = Vec::new();
        for element in block.elements() {
            let (id, position, tags) = match element {
                Element::Node(node) => (
                    node.id(),
                    Point::new(node.lon(), node.lat()),
                    build_tag_map(node.tags()),
                ),
                Element::DenseNode(node) => (
                    node.id(),
                    Point::new(node.lon(), node.lat()),
                    build_tag_map(node.tags()),
                ),
                _ => continue,
            };
            if !self.filter.matches(&tags) {
                continue;
            }
            let tags = retain_selected(tags, self.keep_keys);
            if let Some(poi) =
                build_node_poi(id, position, tags, self.classifier, self.populations)
            {
                found.push(poi);
            }
        }
        found
    }
}

/// A multipolygon relation awaiting geometry resolution. Transient: dropped
/// on success or on any missing-way failure.
#[derive(Debug, Clone)]
pub struct AreaCandidate {
    pub relation_id: i64,
    pub tags: TagMap,
    pub outer: Vec<i64>,
    pub inner: Vec<i64>,
    pub level: LevelId,
}

/// Role classification for multipolygon way members: outer (explicit or
/// empty role), inner, or unusable.
pub fn classify_role(role: &str) -> Option<bool> {
    match role {
        "outer" | "" => Some(true),
        "inner" => Some(false),
        _ => None,
    }
}

pub struct RelationCandidateExtractor<'a> {
    pub filter: &'a TagFilter,
    pub classifier: &'a LevelClassifier,
    pub keep_keys: &'a HashSet<String>,
}

impl BlockExtractor for RelationCandidateExtractor<'_> {
    type Output = AreaCandidate;

    fn extract(&self, block: &PrimitiveBlock) -> Vec<AreaCandidate> {
        let mut found = Vec::new();
        for element in block.elements() {
            let Element::Relation(relation) = element else {
                continue;
            };
            let tags = build_tag_map(relation.tags());
            if tags.get("type").map(String::as_str) != Some("multipolygon") {
                continue;
            }
            if !self.filter.matches(&tags) {
                continue;
            }

            let mut outer = Vec::new();
            let mut inner = Vec::new();
            let mut usable = true;
            for member in relation.members() {
                if member.member_type != RelMemberType::Way {
                    tracing::debug!(
                        "relation {}: non-way member {}, dropping",
                        relation.id(),
                        member.member_id
                    );
                    usable = false;
                    break;
                }
                let role = match member.role() {
                    Ok(role) => role,
                    Err(error) => {
                        tracing::debug!(
                            "relation {}: unreadable member role: {}, dropping",
                            relation.id(),
                            error
                        );
                        usable = false;
                        break;
                    }
                };
                match classify_role(role) {
                    Some(true) => outer.push(member.member_id),
                    Some(false) => inner.push(member.member_id),
                    None => {
                        tracing::debug!(
                            "relation {}: unknown member role '{}', dropping",
                            relation.id(),
                            role
                        );
                        usable = false;
                        break;
                    }
                }
            }
            if !usable {
                continue;
            }
            if outer.is_empty() {
                tracing::debug!(
                    "relation {}: no outer way members, dropping",
                    relation.id()
                );
                continue;
            }

            let tags = retain_selected(tags, self.keep_keys);
            // Level resolved once here and reused for the assembled POI.
            let level = self.classifier.classify(&tags).id;
            found.push(AreaCandidate {
                relation_id: relation.id(),
                tags,
                outer,
                inner,
                level,
            });
        }
        found
    }
}

pub struct WaySegmentExtractor<'a> {
    pub requested: &'a HashSet<i64>,
}

impl BlockExtractor for WaySegmentExtractor<'_> {
    type Output = (i64, Vec<i64>);

    fn extract(&self, block: &PrimitiveBlock) -> Vec<(i64, Vec<i64>)> {
        let mut found = Vec::new();
        for element in block.elements() {
            let Element::Way(way) = element else {
                continue;
            };
            if !self.requested.contains(&way.id()) {
                continue;
            }
            found.push((way.id(), way.refs().collect()));
        }
        found
    }
}

pub struct NodeCoordExtractor<'a> {
    pub requested: &'a HashSet<i64>,
}

impl BlockExtractor for NodeCoordExtractor<'_> {
    type Output = (i64, Point<f64>);

    fn extract(&self, block: &PrimitiveBlock) -> Vec<(i64, Point<f64>)> {
        let mut found = Vec::new();
        for element in block.elements() {
            let (id, position) = match element {
                Element::Node(node) => (node.id(), Point::new(node.lon(), node.lat())),
                Element::DenseNode(node) => (node.id(), Point::new(node.lon(), node.lat())),
                _ => continue,
            };
            if self.requested.contains(&id) {
                found.push((id, position));
            }
        }
        found
    }
}

/// Resolved lookup tables produced by the way and node passes.
pub type SegmentMap = HashMap<i64, Vec<i64>>;
pub type CoordMap = HashMap<i64, Point<f64>>;
