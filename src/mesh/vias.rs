//! Via cut extraction.
//!
//! A via record carries one or more cut boxes. Cuts that share the same
//! landing metal on both levels act as one electrical junction: the landing
//! pads are equipotential, so their cuts combine in parallel at the cut
//! centroid. A via with cut-array parameters is one junction at its center.

use std::collections::BTreeMap;

use super::node::NodeEnclosure;
use crate::design::{Point, Rect, Via};
use crate::error::{IrError, Result};

/// One electrical via junction between two adjacent levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViaCut {
    pub loc: Point,
    pub bottom: u32,
    pub top: u32,
    pub bottom_enclosure: NodeEnclosure,
    pub top_enclosure: NodeEnclosure,
    /// Number of parallel cuts in the junction
    pub cuts: u32,
}

/// Landing metal for `cut` on one level.
///
/// An explicit landing box from the via wins. Otherwise the cut must sit on
/// a routing shape of that level; the metal directly under the cut is used.
fn landing(cut: &Rect, explicit: Option<Rect>, shapes: &[Rect], level: u32) -> Result<Rect> {
    if let Some(rect) = explicit {
        return Ok(rect);
    }
    if shapes.iter().any(|s| s.intersects(cut)) {
        return Ok(*cut);
    }
    let c = cut.center();
    Err(IrError::UnmappableEnclosure {
        x: c.x,
        y: c.y,
        level,
    })
}

/// Split a via into junctions.
///
/// `bottom_shapes`/`top_shapes` are the net's wires on the two levels.
pub fn via_cuts(via: &Via, bottom_shapes: &[Rect], top_shapes: &[Rect]) -> Result<Vec<ViaCut>> {
    let Some(bbox) = via.bbox() else {
        return Ok(Vec::new());
    };
    if via.top != via.bottom + 1 {
        let c = bbox.center();
        return Err(IrError::NonAdjacentVia {
            x: c.x,
            y: c.y,
            bottom: via.bottom,
            top: via.top,
        });
    }

    if let Some(params) = via.params {
        let loc = bbox.center();
        let bot = landing(&bbox, via.bottom_enclosure, bottom_shapes, via.bottom)?;
        let top = landing(&bbox, via.top_enclosure, top_shapes, via.top)?;
        return Ok(vec![ViaCut {
            loc,
            bottom: via.bottom,
            top: via.top,
            bottom_enclosure: NodeEnclosure::around(loc, &bot),
            top_enclosure: NodeEnclosure::around(loc, &top),
            cuts: params.cut_count(),
        }]);
    }

    // Group cuts by shared landing pads; BTreeMap keeps the output ordered.
    let mut groups: BTreeMap<(RectKey, RectKey), (Rect, Rect, Vec<Point>)> = BTreeMap::new();
    for cut in &via.cuts {
        let bot = landing(cut, via.bottom_enclosure, bottom_shapes, via.bottom)?;
        let top = landing(cut, via.top_enclosure, top_shapes, via.top)?;
        groups
            .entry((RectKey::from(bot), RectKey::from(top)))
            .or_insert_with(|| (bot, top, Vec::new()))
            .2
            .push(cut.center());
    }

    let mut junctions: BTreeMap<Point, ViaCut> = BTreeMap::new();
    for (_, (bot, top, centers)) in groups {
        let n = centers.len() as i64;
        let loc = Point::new(
            centers.iter().map(|p| p.x).sum::<i64>() / n,
            centers.iter().map(|p| p.y).sum::<i64>() / n,
        );
        let cut = ViaCut {
            loc,
            bottom: via.bottom,
            top: via.top,
            bottom_enclosure: NodeEnclosure::around(loc, &bot),
            top_enclosure: NodeEnclosure::around(loc, &top),
            cuts: centers.len() as u32,
        };
        junctions
            .entry(loc)
            .and_modify(|j| {
                j.cuts += cut.cuts;
                j.bottom_enclosure = j.bottom_enclosure.merge(&cut.bottom_enclosure);
                j.top_enclosure = j.top_enclosure.merge(&cut.top_enclosure);
            })
            .or_insert(cut);
    }

    Ok(junctions.into_values().collect())
}

/// Orderable rectangle key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct RectKey(i64, i64, i64, i64);

impl From<Rect> for RectKey {
    fn from(r: Rect) -> Self {
        RectKey(r.x_min, r.y_min, r.x_max, r.y_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::ViaParams;

    fn via(cuts: Vec<Rect>) -> Via {
        Via {
            bottom: 1,
            top: 2,
            cuts,
            bottom_enclosure: None,
            top_enclosure: None,
            params: None,
        }
    }

    #[test]
    fn test_separate_cuts_without_landing_boxes() {
        let v = via(vec![Rect::new(0, 0, 10, 10), Rect::new(40, 0, 50, 10)]);
        let shapes = [Rect::new(-100, -5, 100, 15)];
        let cuts = via_cuts(&v, &shapes, &shapes).unwrap();
        assert_eq!(cuts.len(), 2);
        assert_eq!(cuts[0].loc, Point::new(5, 5));
        assert_eq!(cuts[0].cuts, 1);
    }

    #[test]
    fn test_shared_landing_groups_cuts() {
        let mut v = via(vec![Rect::new(0, 0, 10, 10), Rect::new(20, 0, 30, 10)]);
        v.bottom_enclosure = Some(Rect::new(-5, -5, 35, 15));
        v.top_enclosure = Some(Rect::new(-5, -5, 35, 15));
        let cuts = via_cuts(&v, &[], &[]).unwrap();
        assert_eq!(cuts.len(), 1);
        assert_eq!(cuts[0].loc, Point::new(15, 5));
        assert_eq!(cuts[0].cuts, 2);
        assert_eq!(cuts[0].bottom_enclosure.dx_lo, 20);
    }

    #[test]
    fn test_params_make_one_junction() {
        let mut v = via(vec![Rect::new(0, 0, 100, 100)]);
        v.params = Some(ViaParams { rows: 2, cols: 2 });
        let shapes = [Rect::new(0, 0, 100, 100)];
        let cuts = via_cuts(&v, &shapes, &shapes).unwrap();
        assert_eq!(cuts.len(), 1);
        assert_eq!(cuts[0].cuts, 4);
        assert_eq!(cuts[0].loc, Point::new(50, 50));
    }

    #[test]
    fn test_cut_without_metal_is_unmappable() {
        let v = via(vec![Rect::new(0, 0, 10, 10)]);
        let far = [Rect::new(500, 500, 600, 600)];
        let err = via_cuts(&v, &[Rect::new(0, 0, 10, 10)], &far).unwrap_err();
        assert!(matches!(err, IrError::UnmappableEnclosure { level: 2, .. }));
    }

    #[test]
    fn test_non_adjacent_levels_rejected() {
        let mut v = via(vec![Rect::new(0, 0, 10, 10)]);
        v.top = 3;
        assert!(matches!(
            via_cuts(&v, &[], &[]),
            Err(IrError::NonAdjacentVia { .. })
        ));
    }
}
