//! Path joining and ring validation.
//!
//! Member ways of a relation arrive as independent coordinate runs. Runs
//! sharing an endpoint are stitched together, reversing a run when needed,
//! until each chain is closed or nothing else connects.

use geo::{Area, Coord, Intersects, Line, LineString};
use waymark_core::GeometryError;

/// Drop consecutive duplicate coordinates.
pub(crate) fn dedup_coords(coords: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut unique: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for coord in coords {
        if unique.last() != Some(coord) {
            unique.push(*coord);
        }
    }
    unique
}

/// Validate a closed ring and return it as a line string.
pub(crate) fn validated_ring(coords: &[Coord<f64>]) -> Result<LineString<f64>, GeometryError> {
    let unique = dedup_coords(coords);
    if unique.len() < 2 {
        return Err(GeometryError::Degenerate {
            distinct: unique.len(),
            required: 3,
        });
    }
    if unique.first() != unique.last() {
        return Err(GeometryError::Unclosed);
    }
    if unique.len() < 4 {
        return Err(GeometryError::Degenerate {
            distinct: unique.len() - 1,
            required: 3,
        });
    }
    let ring = LineString::from(unique);
    if crosses_itself(&ring) {
        return Err(GeometryError::SelfIntersecting);
    }
    if geo::Polygon::new(ring.clone(), Vec::new()).unsigned_area() <= 0.0 {
        return Err(GeometryError::ZeroArea);
    }
    Ok(ring)
}

/// Report whether any two non-adjacent segments of a closed ring touch.
fn crosses_itself(ring: &LineString<f64>) -> bool {
    let segments: Vec<Line<f64>> = ring.lines().collect();
    let count = segments.len();
    for (i, first) in segments.iter().enumerate() {
        for (j, second) in segments.iter().enumerate().skip(i + 2) {
            // The closing segment is adjacent to the opening one.
            if i == 0 && j + 1 == count {
                continue;
            }
            if first.intersects(second) {
                return true;
            }
        }
    }
    false
}

/// Result of stitching coordinate runs together.
#[derive(Debug, Default)]
pub(crate) struct Joined {
    /// Chains whose ends meet.
    pub(crate) closed: Vec<Vec<Coord<f64>>>,
    /// Chains left open after every connection was tried.
    pub(crate) open: Vec<Vec<Coord<f64>>>,
}

/// Join runs that share endpoints.
pub(crate) fn join_paths<I>(runs: I) -> Joined
where
    I: IntoIterator<Item = Vec<Coord<f64>>>,
{
    let mut joined = Joined::default();
    let mut pending: Vec<Vec<Coord<f64>>> = Vec::new();
    for run in runs {
        let unique = dedup_coords(&run);
        if unique.len() < 2 {
            continue;
        }
        if is_closed(&unique) {
            joined.closed.push(unique);
        } else {
            pending.push(unique);
        }
    }

    // Process runs in member order.
    pending.reverse();
    while let Some(mut chain) = pending.pop() {
        while !is_closed(&chain) {
            if !extend_chain(&mut chain, &mut pending) {
                break;
            }
        }
        if is_closed(&chain) {
            joined.closed.push(chain);
        } else {
            joined.open.push(chain);
        }
    }
    joined
}

fn is_closed(chain: &[Coord<f64>]) -> bool {
    chain.len() >= 2 && chain.first() == chain.last()
}

/// Attach one pending run to either end of `chain`.
fn extend_chain(chain: &mut Vec<Coord<f64>>, pending: &mut Vec<Vec<Coord<f64>>>) -> bool {
    let (Some(&head), Some(&tail)) = (chain.first(), chain.last()) else {
        return false;
    };
    let Some(index) = pending.iter().rposition(|run| {
        run.first() == Some(&tail)
            || run.last() == Some(&tail)
            || run.first() == Some(&head)
            || run.last() == Some(&head)
    }) else {
        return false;
    };
    let mut run = pending.remove(index);
    if run.first() == Some(&tail) {
        chain.extend(run.into_iter().skip(1));
    } else if run.last() == Some(&tail) {
        run.reverse();
        chain.extend(run.into_iter().skip(1));
    } else {
        if run.first() == Some(&head) {
            run.reverse();
        }
        // `run` now ends at `head`.
        run.pop();
        run.append(chain);
        *chain = run;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn coords(points: &[(f64, f64)]) -> Vec<Coord<f64>> {
        points.iter().map(|&(x, y)| Coord { x, y }).collect()
    }

    #[rstest]
    fn dedup_removes_only_consecutive_repeats() {
        let input = coords(&[(0.0, 0.0), (0.0, 0.0), (1.0, 0.0), (0.0, 0.0)]);
        assert_eq!(dedup_coords(&input).len(), 3);
    }

    #[rstest]
    fn joins_two_halves_into_a_ring() {
        let joined = join_paths([
            coords(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]),
            coords(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)]),
        ]);
        assert_eq!(joined.closed.len(), 1);
        assert!(joined.open.is_empty());
        let ring = joined.closed.first().expect("one ring");
        assert_eq!(ring.len(), 5);
    }

    #[rstest]
    fn prepends_runs_meeting_the_chain_head() {
        let joined = join_paths([
            coords(&[(1.0, 0.0), (2.0, 0.0)]),
            coords(&[(0.0, 0.0), (1.0, 0.0)]),
        ]);
        assert_eq!(joined.open, vec![coords(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)])]);
    }

    #[rstest]
    fn leaves_disconnected_runs_open() {
        let joined = join_paths([
            coords(&[(0.0, 0.0), (1.0, 0.0)]),
            coords(&[(5.0, 5.0), (6.0, 5.0)]),
        ]);
        assert!(joined.closed.is_empty());
        assert_eq!(joined.open.len(), 2);
    }

    #[rstest]
    #[case(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)], None)]
    #[case(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)], Some(GeometryError::Unclosed))]
    #[case(
        &[(0.0, 0.0), (1.0, 0.0), (0.0, 0.0)],
        Some(GeometryError::Degenerate { distinct: 2, required: 3 })
    )]
    #[case(
        &[(0.0, 0.0), (1.0, 1.0), (1.0, 0.0), (0.0, 1.0), (0.0, 0.0)],
        Some(GeometryError::SelfIntersecting)
    )]
    #[case(
        &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.0, 0.0)],
        Some(GeometryError::ZeroArea)
    )]
    fn validates_rings(#[case] points: &[(f64, f64)], #[case] expected: Option<GeometryError>) {
        let result = validated_ring(&coords(points));
        assert_eq!(result.err(), expected);
    }
}
