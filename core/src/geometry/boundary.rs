use crate::prelude::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// Pixel-space point in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Zone boundary, decided and validated once at zone-creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Boundary {
    Rectangle { top_left: Point, bottom_right: Point },
    Polygon { points: Vec<Point> },
}

impl Boundary {
    pub fn rectangle(top_left: Point, bottom_right: Point) -> Self {
        Self::Rectangle {
            top_left,
            bottom_right,
        }
    }

    pub fn polygon(points: Vec<Point>) -> Self {
        Self::Polygon { points }
    }

    /// Rejects degenerate boundaries so containment never sees them.
    pub fn validate(&self) -> EngineResult<()> {
        match self {
            Boundary::Rectangle {
                top_left,
                bottom_right,
            } => {
                if !top_left.is_finite() || !bottom_right.is_finite() {
                    return Err(EngineError::InvalidBoundary(
                        "rectangle coordinates must be finite".to_string(),
                    ));
                }
                if top_left.x >= bottom_right.x || top_left.y >= bottom_right.y {
                    return Err(EngineError::InvalidBoundary(
                        "top_left must lie strictly above and left of bottom_right".to_string(),
                    ));
                }
                Ok(())
            }
            Boundary::Polygon { points } => {
                if points.len() < 3 {
                    return Err(EngineError::InvalidBoundary(format!(
                        "polygon needs at least 3 points, got {}",
                        points.len()
                    )));
                }
                if points.iter().any(|p| !p.is_finite()) {
                    return Err(EngineError::InvalidBoundary(
                        "polygon coordinates must be finite".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Membership test. Rectangles are edge-inclusive; polygons use the
    /// even-odd ray-casting rule. Deterministic for an unchanged boundary.
    pub fn contains(&self, point: Point) -> bool {
        match self {
            Boundary::Rectangle {
                top_left,
                bottom_right,
            } => {
                top_left.x <= point.x
                    && point.x <= bottom_right.x
                    && top_left.y <= point.y
                    && point.y <= bottom_right.y
            }
            Boundary::Polygon { points } => ray_cast(points, point),
        }
    }
}

fn ray_cast(points: &[Point], p: Point) -> bool {
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (pi, pj) = (points[i], points[j]);
        if (pi.y > p.y) != (pj.y > p.y) {
            let x_cross = pi.x + (p.y - pi.y) * (pj.x - pi.x) / (pj.y - pi.y);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> Boundary {
        Boundary::rectangle(Point::new(640.0, 360.0), Point::new(1280.0, 700.0))
    }

    #[test]
    fn rectangle_is_edge_inclusive() {
        let boundary = rect();
        assert!(boundary.contains(Point::new(640.0, 360.0)));
        assert!(boundary.contains(Point::new(1280.0, 700.0)));
        assert!(boundary.contains(Point::new(900.0, 500.0)));
        assert!(!boundary.contains(Point::new(300.0, 300.0)));
        assert!(!boundary.contains(Point::new(1280.1, 500.0)));
    }

    #[test]
    fn polygon_ray_cast_classifies_triangle() {
        let boundary = Boundary::polygon(vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(50.0, 100.0),
        ]);
        assert!(boundary.contains(Point::new(50.0, 40.0)));
        assert!(!boundary.contains(Point::new(5.0, 90.0)));
        assert!(!boundary.contains(Point::new(200.0, 50.0)));
    }

    #[test]
    fn containment_is_deterministic() {
        let boundary = Boundary::polygon(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ]);
        let edge = Point::new(10.0, 5.0);
        let first = boundary.contains(edge);
        for _ in 0..8 {
            assert_eq!(boundary.contains(edge), first);
        }
    }

    #[test]
    fn validate_rejects_degenerate_boundaries() {
        let flat = Boundary::rectangle(Point::new(10.0, 10.0), Point::new(10.0, 40.0));
        assert!(flat.validate().is_err());

        let two_points = Boundary::polygon(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]);
        assert!(two_points.validate().is_err());

        let nan = Boundary::rectangle(Point::new(f32::NAN, 0.0), Point::new(1.0, 1.0));
        assert!(nan.validate().is_err());

        assert!(rect().validate().is_ok());
    }
}
