/// A region of the image where features may be selected.
pub trait TargetArea: Send + Sync {
    /// Whether the pixel at column `x` and row `y` belongs to the region.
    fn contains(&self, x: f32, y: f32) -> bool;
}

impl<F> TargetArea for F
where
    F: Fn(f32, f32) -> bool + Send + Sync,
{
    fn contains(&self, x: f32, y: f32) -> bool {
        self(x, y)
    }
}

/// A simple polygon given by its vertices in order.
///
/// Containment follows the even-odd rule.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    vertices: Vec<(f32, f32)>,
}

impl Polygon {
    /// Create a polygon from its `(x, y)` vertices.
    pub fn new(vertices: Vec<(f32, f32)>) -> Self {
        Self { vertices }
    }

    /// Axis aligned rectangle with corners `(x0, y0)` and `(x1, y1)`.
    pub fn rectangle(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self::new(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)])
    }

    /// The vertices of the polygon.
    pub fn vertices(&self) -> &[(f32, f32)] {
        &self.vertices
    }
}

impl TargetArea for Polygon {
    fn contains(&self, x: f32, y: f32) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }

        // cast a ray towards +x and count edge crossings
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[j];
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_contains() {
        let rect = Polygon::rectangle(10.0, 10.0, 20.0, 30.0);
        assert!(rect.contains(15.0, 20.0));
        assert!(!rect.contains(5.0, 20.0));
        assert!(!rect.contains(15.0, 31.0));
    }

    #[test]
    fn concave_polygon() {
        // a "U" shape opening upwards
        let u = Polygon::new(vec![
            (0.0, 0.0),
            (3.0, 0.0),
            (3.0, 3.0),
            (2.0, 3.0),
            (2.0, 1.0),
            (1.0, 1.0),
            (1.0, 3.0),
            (0.0, 3.0),
        ]);
        assert!(u.contains(0.5, 2.0));
        assert!(u.contains(2.5, 2.0));
        assert!(!u.contains(1.5, 2.0));
        assert!(u.contains(1.5, 0.5));
    }

    #[test]
    fn degenerate_polygon() {
        assert!(!Polygon::new(vec![(0.0, 0.0), (1.0, 1.0)]).contains(0.5, 0.5));
    }

    #[test]
    fn closure_area() {
        let left_half = |x: f32, _y: f32| x < 50.0;
        assert!(left_half.contains(10.0, 0.0));
        assert!(!TargetArea::contains(&left_half, 60.0, 0.0));
    }
}
