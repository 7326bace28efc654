//! Nettoyage des rings et découpage des rings auto-intersectants

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, Coord, Line, LineString, Polygon};

/// Tolérance de comparaison des coordonnées (unité du CRS)
pub(crate) const TOLERANCE: f64 = 1e-9;

/// Aire en dessous de laquelle un ring est considéré dégénéré
pub(crate) const AREA_EPSILON: f64 = 1e-9;

/// Compare deux coordonnées avec tolérance
pub fn coords_equal(a: Coord<f64>, b: Coord<f64>) -> bool {
    (a.x - b.x).abs() < TOLERANCE && (a.y - b.y).abs() < TOLERANCE
}

/// Ring ouvert (sans point de fermeture) et sans doublons consécutifs
pub fn open_ring(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for &c in &ring.0 {
        let is_new = coords.last().map_or(true, |&last| !coords_equal(last, c));
        if is_new {
            coords.push(c);
        }
    }
    while coords.len() > 1 && coords_equal(coords[0], coords[coords.len() - 1]) {
        coords.pop();
    }
    coords
}

/// Aire absolue d'un ring ouvert
pub fn ring_area(open: &[Coord<f64>]) -> f64 {
    if open.len() < 3 {
        return 0.0;
    }
    let mut closed = open.to_vec();
    closed.push(open[0]);
    Polygon::new(LineString::new(closed), vec![]).unsigned_area()
}

/// Vrai si le ring ouvert n'a ni auto-intersection ni segment replié
pub fn is_simple(open: &[Coord<f64>]) -> bool {
    let n = open.len();
    if n < 3 {
        return false;
    }
    let segs = segments(open);

    for i in 0..n {
        for j in (i + 1)..n {
            if !envelopes_overlap(&segs[i], &segs[j]) {
                continue;
            }
            match line_intersection(segs[i], segs[j]) {
                None => {}
                Some(LineIntersection::Collinear { .. }) => return false,
                Some(LineIntersection::SinglePoint { .. }) if adjacent(i, j, n) => {}
                Some(LineIntersection::SinglePoint { .. }) => return false,
            }
        }
    }
    true
}

/// Découpe un ring en boucles simples d'aire non nulle
///
/// Un ring déjà simple est retourné tel quel. Sinon le ring est « nodé » à
/// chaque croisement puis parcouru: chaque retour sur un sommet déjà visité
/// ferme une boucle. Un nœud papillon donne ainsi deux triangles.
pub fn simple_loops(ring: &LineString<f64>) -> Vec<Vec<Coord<f64>>> {
    let open = open_ring(ring);
    if open.len() < 3 {
        return Vec::new();
    }

    let loops = if is_simple(&open) {
        vec![open]
    } else {
        extract_loops(&node(&open))
    };

    loops
        .into_iter()
        .filter(|l| l.len() >= 3 && ring_area(l) > AREA_EPSILON)
        .collect()
}

/// Insère les points de croisement dans la séquence des sommets
fn node(open: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let n = open.len();
    let segs = segments(open);
    let mut splits: Vec<Vec<(f64, Coord<f64>)>> = vec![Vec::new(); n];

    for i in 0..n {
        for j in (i + 1)..n {
            if !envelopes_overlap(&segs[i], &segs[j]) {
                continue;
            }
            let points = match line_intersection(segs[i], segs[j]) {
                None => continue,
                Some(LineIntersection::SinglePoint { .. }) if adjacent(i, j, n) => continue,
                Some(LineIntersection::SinglePoint { intersection, .. }) => vec![intersection],
                Some(LineIntersection::Collinear { intersection }) => {
                    vec![intersection.start, intersection.end]
                }
            };
            // Même Coord poussée des deux côtés: le parcours la reconnaîtra
            for p in points {
                for k in [i, j] {
                    let t = segment_param(&segs[k], p);
                    if t > TOLERANCE && t < 1.0 - TOLERANCE {
                        splits[k].push((t, p));
                    }
                }
            }
        }
    }

    let mut noded = Vec::with_capacity(n * 2);
    for (i, mut points) in splits.into_iter().enumerate() {
        noded.push(open[i]);
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        for (_, p) in points {
            let is_new = noded.last().map_or(true, |&last| !coords_equal(last, p));
            if is_new {
                noded.push(p);
            }
        }
    }
    noded
}

/// Extrait les boucles fermées d'une séquence nodée
fn extract_loops(noded: &[Coord<f64>]) -> Vec<Vec<Coord<f64>>> {
    let mut loops = Vec::new();
    let mut path: Vec<Coord<f64>> = Vec::with_capacity(noded.len());

    for &c in noded.iter().chain(noded.first()) {
        match path.iter().position(|&p| coords_equal(p, c)) {
            Some(k) => {
                let closed: Vec<Coord<f64>> = path[k..].to_vec();
                path.truncate(k + 1);
                if closed.len() >= 3 {
                    loops.push(closed);
                }
            }
            None => path.push(c),
        }
    }
    loops
}

fn segments(open: &[Coord<f64>]) -> Vec<Line<f64>> {
    let n = open.len();
    (0..n)
        .map(|i| Line::new(open[i], open[(i + 1) % n]))
        .collect()
}

fn adjacent(i: usize, j: usize, n: usize) -> bool {
    j == i + 1 || (i == 0 && j == n - 1)
}

/// Position relative d'un point sur un segment (0 = début, 1 = fin)
fn segment_param(seg: &Line<f64>, p: Coord<f64>) -> f64 {
    let d = seg.delta();
    let len2 = d.x * d.x + d.y * d.y;
    if len2 == 0.0 {
        return 0.0;
    }
    ((p.x - seg.start.x) * d.x + (p.y - seg.start.y) * d.y) / len2
}

fn envelopes_overlap(a: &Line<f64>, b: &Line<f64>) -> bool {
    let (a_min_x, a_max_x) = min_max(a.start.x, a.end.x);
    let (a_min_y, a_max_y) = min_max(a.start.y, a.end.y);
    let (b_min_x, b_max_x) = min_max(b.start.x, b.end.x);
    let (b_min_y, b_max_y) = min_max(b.start.y, b.end.y);
    a_min_x <= b_max_x + TOLERANCE
        && b_min_x <= a_max_x + TOLERANCE
        && a_min_y <= b_max_y + TOLERANCE
        && b_min_y <= a_max_y + TOLERANCE
}

fn min_max(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(coords: &[(f64, f64)]) -> LineString<f64> {
        LineString::from(coords.to_vec())
    }

    #[test]
    fn test_open_ring_drops_duplicates() {
        let r = ring(&[(0.0, 0.0), (1.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]);
        let open = open_ring(&r);
        assert_eq!(open.len(), 3);
    }

    #[test]
    fn test_square_is_simple() {
        let r = ring(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]);
        assert!(is_simple(&open_ring(&r)));
        assert_eq!(simple_loops(&r).len(), 1);
    }

    #[test]
    fn test_bowtie_splits_into_two_triangles() {
        let r = ring(&[(0.0, 0.0), (2.0, 2.0), (2.0, 0.0), (0.0, 2.0), (0.0, 0.0)]);
        assert!(!is_simple(&open_ring(&r)));

        let loops = simple_loops(&r);
        assert_eq!(loops.len(), 2);
        for l in &loops {
            assert!(is_simple(l));
            assert!((ring_area(l) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_spike_is_removed() {
        // Carré avec un aller-retour vers (3, 0.5)
        let r = ring(&[
            (0.0, 0.0),
            (2.0, 0.0),
            (2.0, 0.5),
            (3.0, 0.5),
            (2.0, 0.5),
            (2.0, 2.0),
            (0.0, 2.0),
            (0.0, 0.0),
        ]);
        let loops = simple_loops(&r);
        assert_eq!(loops.len(), 1);
        assert!((ring_area(&loops[0]) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_ring_yields_nothing() {
        let r = ring(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (0.0, 0.0)]);
        assert!(simple_loops(&r).is_empty());
    }
}
