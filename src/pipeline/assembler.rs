//! Ring reconstruction for multipolygon outer ways.
//!
//! A relation's outer boundary arrives as an unordered set of way segments.
//! Rings are stitched back together by indexing segments on their endpoint
//! node ids and walking from endpoint to endpoint until the walk closes.

use geo_types::Point;
use std::collections::HashMap;
use std::fmt;

pub const DEFAULT_MAX_RING_VERTICES: usize = 100;

/// Local assembly failure: aborts this relation only, never the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    NoSegments,
    /// A way with fewer than two nodes cannot form a ring edge.
    DegenerateSegment,
    /// An endpoint with a single remaining incident segment: open ring.
    OpenRing { node: i64 },
    /// The walk ran out of segments before returning to its start.
    Disconnected { node: i64 },
    /// Vertex guard tripped; bounds assembly cost for pathological relations.
    TooManyVertices { count: usize, limit: usize },
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyError::NoSegments => write!(f, "no outer segments"),
            AssemblyError::DegenerateSegment => write!(f, "degenerate segment"),
            AssemblyError::OpenRing { node } => {
                write!(f, "malformed polygon: open ring at node {}", node)
            }
            AssemblyError::Disconnected { node } => {
                write!(f, "malformed polygon: disconnected at node {}", node)
            }
            AssemblyError::TooManyVertices { count, limit } => {
                write!(f, "{} outer vertices exceed the guard of {}", count, limit)
            }
        }
    }
}

impl std::error::Error for AssemblyError {}

/// Stitch every closed ring embedded in the segment set. Each returned ring
/// is a cyclic node-id sequence whose first and last entries coincide;
/// multiple disjoint rings per relation are supported.
pub fn assemble_rings(
    segments: &[&[i64]],
    max_vertices: usize,
) -> Result<Vec<Vec<i64>>, AssemblyError> {
    if segments.is_empty() {
        return Err(AssemblyError::NoSegments);
    }
    let total: usize = segments.iter().map(|s| s.len()).sum();
    if total > max_vertices {
        return Err(AssemblyError::TooManyVertices {
            count: total,
            limit: max_vertices,
        });
    }

    if let [single] = segments {
        if single.len() < 2 {
            return Err(AssemblyError::DegenerateSegment);
        }
        let mut ring = single.to_vec();
        // Data-repair heuristic: close a lone unclosed way.
        if ring.first() != ring.last() {
            ring.push(ring[0]);
        }
        return Ok(vec![ring]);
    }

    // Index each segment under both of its endpoint node ids.
    let mut by_endpoint: HashMap<i64, Vec<usize>> = HashMap::new();
    for (index, segment) in segments.iter().enumerate() {
        if segment.len() < 2 {
            return Err(AssemblyError::DegenerateSegment);
        }
        by_endpoint.entry(segment[0]).or_default().push(index);
        by_endpoint
            .entry(segment[segment.len() - 1])
            .or_default()
            .push(index);
    }

    let mut rings = Vec::new();
    loop {
        let unexhausted = by_endpoint
            .iter()
            .find(|(_, list)| !list.is_empty())
            .map(|(&node, list)| (node, list.len()));
        let Some((start, incident)) = unexhausted else {
            break;
        };
        if incident < 2 {
            return Err(AssemblyError::OpenRing { node: start });
        }

        let mut ring = vec![start];
        let mut current = start;
        loop {
            let Some(&index) = by_endpoint.get(&current).and_then(|list| list.first()) else {
                return Err(AssemblyError::Disconnected { node: current });
            };
            let segment = segments[index];
            detach(&mut by_endpoint, segment[0], index);
            detach(&mut by_endpoint, segment[segment.len() - 1], index);

            // Append oriented so the segment continues from the current
            // endpoint.
            if segment[0] == current {
                ring.extend_from_slice(&segment[1..]);
            } else {
                ring.extend(segment[..segment.len() - 1].iter().rev());
            }
            current = ring[ring.len() - 1];
            if current == start {
                break;
            }
        }
        rings.push(ring);
    }

    Ok(rings)
}

fn detach(by_endpoint: &mut HashMap<i64, Vec<usize>>, node: i64, index: usize) {
    if let Some(list) = by_endpoint.get_mut(&node)
        && let Some(position) = list.iter().position(|&i| i == index)
    {
        list.remove(position);
    }
}

/// Unweighted arithmetic mean of every emitted ring vertex. This is a
/// documented simplification, not an area-weighted polygon centroid. Returns
/// None when a node id has no resolved coordinate.
pub fn centroid(rings: &[Vec<i64>], coords: &HashMap<i64, Point<f64>>) -> Option<Point<f64>> {
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut count = 0usize;
    for ring in rings {
        for node in ring {
            let point = coords.get(node)?;
            sum_x += point.x();
            sum_y += point.y();
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    Some(Point::new(sum_x / count as f64, sum_y / count as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rotation/reflection-invariant ring comparison.
    fn assert_cyclic_eq(ring: &[i64], expected: &[i64]) {
        assert_eq!(ring.first(), ring.last(), "ring is not closed: {:?}", ring);
        let body = &ring[..ring.len() - 1];
        assert_eq!(body.len(), expected.len(), "ring {:?} vs {:?}", ring, expected);
        let doubled: Vec<i64> = [body, body].concat();
        let reversed: Vec<i64> = body.iter().rev().copied().collect();
        let doubled_rev: Vec<i64> = [reversed.as_slice(), reversed.as_slice()].concat();
        let found = doubled.windows(expected.len()).any(|w| w == expected)
            || doubled_rev.windows(expected.len()).any(|w| w == expected);
        assert!(found, "ring {:?} is not a rotation of {:?}", ring, expected);
    }

    #[test]
    fn three_segments_stitch_into_one_ring() {
        let rings = assemble_rings(
            &[&[1, 2, 3], &[3, 4, 5], &[5, 1]],
            DEFAULT_MAX_RING_VERTICES,
        )
        .unwrap();
        assert_eq!(rings.len(), 1);
        assert_cyclic_eq(&rings[0], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn reversed_segment_is_reoriented() {
        let rings = assemble_rings(
            &[&[1, 2, 3], &[5, 4, 3], &[5, 1]],
            DEFAULT_MAX_RING_VERTICES,
        )
        .unwrap();
        assert_eq!(rings.len(), 1);
        assert_cyclic_eq(&rings[0], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn single_segment_auto_closes() {
        let rings = assemble_rings(&[&[1, 2, 3]], DEFAULT_MAX_RING_VERTICES).unwrap();
        assert_eq!(rings, vec![vec![1, 2, 3, 1]]);
    }

    #[test]
    fn single_closed_segment_stays_unchanged() {
        let rings = assemble_rings(&[&[1, 2, 3, 1]], DEFAULT_MAX_RING_VERTICES).unwrap();
        assert_eq!(rings, vec![vec![1, 2, 3, 1]]);
    }

    #[test]
    fn disjoint_rings_are_all_recovered() {
        let rings = assemble_rings(
            &[&[1, 2, 3, 1], &[10, 11], &[11, 12, 10]],
            DEFAULT_MAX_RING_VERTICES,
        )
        .unwrap();
        assert_eq!(rings.len(), 2);
        let mut sizes: Vec<usize> = rings.iter().map(|r| r.len() - 1).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![3, 3]);
    }

    #[test]
    fn open_ring_fails_for_the_relation() {
        let result = assemble_rings(&[&[1, 2], &[2, 3]], DEFAULT_MAX_RING_VERTICES);
        assert!(matches!(
            result,
            Err(AssemblyError::OpenRing { .. }) | Err(AssemblyError::Disconnected { .. })
        ));
    }

    #[test]
    fn vertex_guard_rejects_oversized_relations() {
        let long: Vec<i64> = (0..120).collect();
        let result = assemble_rings(&[&long, &[1, 2]], DEFAULT_MAX_RING_VERTICES);
        assert_eq!(
            result,
            Err(AssemblyError::TooManyVertices {
                count: 122,
                limit: 100
            })
        );
    }

    #[test]
    fn empty_and_degenerate_inputs_fail() {
        assert_eq!(
            assemble_rings(&[], DEFAULT_MAX_RING_VERTICES),
            Err(AssemblyError::NoSegments)
        );
        assert_eq!(
            assemble_rings(&[&[1]], DEFAULT_MAX_RING_VERTICES),
            Err(AssemblyError::DegenerateSegment)
        );
        assert_eq!(
            assemble_rings(&[&[1, 2, 3], &[]], DEFAULT_MAX_RING_VERTICES),
            Err(AssemblyError::DegenerateSegment)
        );
    }

    #[test]
    fn centroid_averages_every_emitted_vertex() {
        let coords: HashMap<i64, Point<f64>> = [
            (1, Point::new(0.0, 0.0)),
            (2, Point::new(2.0, 0.0)),
            (3, Point::new(0.0, 2.0)),
        ]
        .into_iter()
        .collect();
        let rings = vec![vec![1, 2, 3, 1]];
        let center = centroid(&rings, &coords).unwrap();
        // the closing vertex is counted like any other
        assert!((center.x() - 0.5).abs() < 1e-9);
        assert!((center.y() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn centroid_fails_on_unresolved_nodes() {
        let coords: HashMap<i64, Point<f64>> = [(1, Point::new(0.0, 0.0))].into_iter().collect();
        assert!(centroid(&[vec![1, 2, 1]], &coords).is_none());
        assert!(centroid(&[], &coords).is_none());
    }
}
