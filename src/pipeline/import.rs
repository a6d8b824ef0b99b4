//! Dependency-ordered import passes.
//!
//! The block-oriented PBF encoding has no random access by id, so relation
//! geometry is resolved through three sequential scans: relations yield the
//! way ids they reference, ways yield the node ids, nodes yield positions.
//! Only requested ids are retained between passes, bounding memory. The
//! independent node-POI scan runs concurrently on its own reader handle.

use anyhow::{Result, anyhow, bail};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::filter::TagFilter;
use crate::mapping::LevelClassifier;
use crate::pipeline::assembler::{assemble_rings, centroid};
use crate::pipeline::{
    AreaCandidate, CoordMap, NodeCoordExtractor, NodePoiExtractor, RelationCandidateExtractor,
    SegmentMap, WaySegmentExtractor, run_extraction_pass, selected_tag_keys,
};
use crate::poi::{OsmPoi, resolve_name};
use crate::population::PopulationTable;

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Bounded-channel capacity of each pass, i.e. decoded blocks buffered
    /// ahead of the collector.
    pub blocks_in_flight: usize,
    /// Total outer-vertex guard for multipolygon assembly.
    pub max_ring_vertices: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            blocks_in_flight: 64,
            max_ring_vertices: crate::pipeline::assembler::DEFAULT_MAX_RING_VERTICES,
        }
    }
}

pub struct ImportCoordinator<'a> {
    pub path: &'a Path,
    pub node_filter: &'a TagFilter,
    pub area_filter: &'a TagFilter,
    pub classifier: &'a LevelClassifier,
    pub populations: Option<&'a PopulationTable>,
    pub options: ImportOptions,
}

impl ImportCoordinator<'_> {
    /// Run the full import: three area passes plus the concurrent node-POI
    /// pass, concatenated into one unsorted collection. The cancel flag is
    /// checked between passes.
    pub fn import(&self, cancel: &AtomicBool) -> Result<Vec<OsmPoi>> {
        let keep_keys = selected_tag_keys(self.classifier, &[self.node_filter, self.area_filter]);

        std::thread::scope(|scope| {
            let node_pass = scope.spawn(|| {
                let extractor = NodePoiExtractor {
                    filter: self.node_filter,
                    classifier: self.classifier,
                    populations: self.populations,
                    keep_keys: &keep_keys,
                };
                // Concurrent with the area passes: no progress line of its
                // own, pass 1/3 owns stderr.
                run_extraction_pass(
                    self.path,
                    &extractor,
                    "node pois",
                    self.options.blocks_in_flight,
                    false,
                )
            });

            let area_result = self.run_area_passes(&keep_keys, cancel);

            let mut pois = node_pass
                .join()
                .map_err(|_| anyhow!("Import: node pass thread panicked"))??;
            tracing::info!("node pass: {} pois", pois.len());

            let area_pois = area_result?;
            tracing::info!("area passes: {} pois", area_pois.len());

            pois.extend(area_pois);
            Ok(pois)
        })
    }

    fn run_area_passes(
        &self,
        keep_keys: &HashSet<String>,
        cancel: &AtomicBool,
    ) -> Result<Vec<OsmPoi>> {
        ensure_live(cancel)?;
        let relation_extractor = RelationCandidateExtractor {
            filter: self.area_filter,
            classifier: self.classifier,
            keep_keys,
        };
        let candidates = run_extraction_pass(
            self.path,
            &relation_extractor,
            "pass 1/3: relations",
            self.options.blocks_in_flight,
            true,
        )?;
        tracing::info!("pass 1/3: {} multipolygon candidates", candidates.len());

        ensure_live(cancel)?;
        let way_ids: HashSet<i64> = candidates
            .iter()
            .flat_map(|c| c.outer.iter().chain(c.inner.iter()))
            .copied()
            .collect();
        let segments: SegmentMap = run_extraction_pass(
            self.path,
            &WaySegmentExtractor {
                requested: &way_ids,
            },
            "pass 2/3: ways",
            self.options.blocks_in_flight,
            true,
        )?
        .into_iter()
        .collect();
        tracing::info!(
            "pass 2/3: {} of {} requested ways resolved",
            segments.len(),
            way_ids.len()
        );

        ensure_live(cancel)?;
        let node_ids: HashSet<i64> = segments.values().flatten().copied().collect();
        let coords: CoordMap = run_extraction_pass(
            self.path,
            &NodeCoordExtractor {
                requested: &node_ids,
            },
            "pass 3/3: nodes",
            self.options.blocks_in_flight,
            true,
        )?
        .into_iter()
        .collect();
        tracing::info!(
            "pass 3/3: {} of {} requested nodes resolved",
            coords.len(),
            node_ids.len()
        );

        ensure_live(cancel)?;
        Ok(assemble_area_pois(
            candidates,
            &segments,
            &coords,
            self.classifier,
            self.options.max_ring_vertices,
        ))
    }
}

fn ensure_live(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::Relaxed) {
        bail!("Import: cancelled");
    }
    Ok(())
}

/// Materialize every resolvable candidate into an area POI. Each failure is
/// local to its relation: unresolved ways, malformed rings, or unresolved
/// coordinates drop the candidate with a diagnostic.
pub fn assemble_area_pois(
    candidates: Vec<AreaCandidate>,
    segments: &SegmentMap,
    coords: &CoordMap,
    classifier: &LevelClassifier,
    max_ring_vertices: usize,
) -> Vec<OsmPoi> {
    let mut pois = Vec::new();
    'candidates: for candidate in candidates {
        // No partial assembly: every referenced way must have resolved.
        for way_id in candidate.outer.iter().chain(candidate.inner.iter()) {
            if !segments.contains_key(way_id) {
                tracing::debug!(
                    "relation {}: way {} unresolved, dropping",
                    candidate.relation_id,
                    way_id
                );
                continue 'candidates;
            }
        }

        let outer: Vec<&[i64]> = candidate
            .outer
            .iter()
            .map(|way_id| segments[way_id].as_slice())
            .collect();
        let rings = match assemble_rings(&outer, max_ring_vertices) {
            Ok(rings) => rings,
            Err(error) => {
                tracing::debug!("relation {}: {}, dropping", candidate.relation_id, error);
                continue;
            }
        };
        let Some(position) = centroid(&rings, coords) else {
            tracing::debug!(
                "relation {}: unresolved ring node, dropping",
                candidate.relation_id
            );
            continue;
        };

        if classifier.is_default(candidate.level) {
            continue;
        }
        let name = resolve_name(&candidate.tags);
        pois.push(OsmPoi {
            id: candidate.relation_id,
            position,
            level: candidate.level,
            name,
            tags: candidate.tags,
        });
    }
    pois
}
