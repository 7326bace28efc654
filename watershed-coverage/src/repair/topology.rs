//! Assemblage des boucles simples en multipolygones valides

use geo::orient::{Direction, Orient};
use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon};

/// Polygone orienté (extérieur anti-horaire) à partir d'un ring ouvert
pub fn ring_polygon(open: &[Coord<f64>]) -> Polygon<f64> {
    let mut coords = open.to_vec();
    if let Some(&first) = open.first() {
        coords.push(first);
    }
    Polygon::new(LineString::new(coords), vec![]).orient(Direction::Default)
}

/// Union de toutes les parties, par paires successives
///
/// L'ordre des réductions ne dépend que de l'ordre d'entrée: deux appels sur
/// les mêmes parties donnent des coordonnées identiques au bit près.
pub fn union_all(parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    let mut layer: Vec<MultiPolygon<f64>> = parts.into_iter().filter(|m| !m.0.is_empty()).collect();

    while layer.len() > 1 {
        layer = layer
            .chunks(2)
            .map(|pair| {
                pair[1..]
                    .iter()
                    .fold(pair[0].clone(), |acc, next| acc.union(next))
            })
            .collect();
    }

    layer.pop().unwrap_or_else(|| MultiPolygon::new(vec![]))
}

/// Reconstruit un polygone d'entrée: union de ses coques moins union de ses trous
pub fn assemble(shells: &[Vec<Coord<f64>>], holes: &[Vec<Coord<f64>>]) -> MultiPolygon<f64> {
    let shell_union = union_all(
        shells
            .iter()
            .map(|s| MultiPolygon::new(vec![ring_polygon(s)]))
            .collect(),
    );

    if holes.is_empty() {
        return shell_union.orient(Direction::Default);
    }

    let hole_union = union_all(
        holes
            .iter()
            .map(|h| MultiPolygon::new(vec![ring_polygon(h)]))
            .collect(),
    );

    shell_union
        .difference(&hole_union)
        .orient(Direction::Default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    fn square(x0: f64, y0: f64, size: f64) -> Vec<Coord<f64>> {
        vec![
            Coord { x: x0, y: y0 },
            Coord { x: x0 + size, y: y0 },
            Coord { x: x0 + size, y: y0 + size },
            Coord { x: x0, y: y0 + size },
        ]
    }

    #[test]
    fn test_ring_polygon_is_counter_clockwise() {
        let mut cw = square(0.0, 0.0, 1.0);
        cw.reverse();
        let poly = ring_polygon(&cw);
        assert!(poly.signed_area() > 0.0);
    }

    #[test]
    fn test_union_all_dissolves_overlap() {
        let a = MultiPolygon::new(vec![ring_polygon(&square(0.0, 0.0, 2.0))]);
        let b = MultiPolygon::new(vec![ring_polygon(&square(1.0, 0.0, 2.0))]);
        let merged = union_all(vec![a, b]);
        assert!((merged.unsigned_area() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_union_all_empty() {
        assert!(union_all(Vec::new()).0.is_empty());
    }

    #[test]
    fn test_assemble_with_hole() {
        let result = assemble(&[square(0.0, 0.0, 4.0)], &[square(1.0, 1.0, 1.0)]);
        assert_eq!(result.0.len(), 1);
        assert!((result.unsigned_area() - 15.0).abs() < 1e-9);
    }
}
