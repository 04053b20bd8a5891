//! Pixel coordinate grid used by the rasterizer.

use nalgebra::Vector2;

/// Precomputed `(x, y)` coordinates for every pixel, row-major.
///
/// Pixel `(x, y)` sits at integer coordinates, so a Gaussian whose mean is
/// `(3.0, 1.0)` peaks exactly on the pixel in column 3, row 1. The grid is a
/// pure function of the image size and is rebuilt only when the field is
/// (re)initialized for an image.
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinateGrid {
    width: u32,
    height: u32,
    points: Vec<Vector2<f32>>,
}

impl CoordinateGrid {
    pub fn new(width: u32, height: u32) -> Self {
        let mut points = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                points.push(Vector2::new(x as f32, y as f32));
            }
        }
        Self {
            width,
            height,
            points,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Vector2<f32>] {
        &self.points
    }

    /// Coordinates of one row.
    pub fn row(&self, y: u32) -> &[Vector2<f32>] {
        let w = self.width as usize;
        let start = (y as usize) * w;
        &self.points[start..start + w]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_layout() {
        let g = CoordinateGrid::new(3, 2);
        assert_eq!(g.len(), 6);
        assert_eq!(g.points()[0], Vector2::new(0.0, 0.0));
        assert_eq!(g.points()[2], Vector2::new(2.0, 0.0));
        assert_eq!(g.points()[3], Vector2::new(0.0, 1.0));
        assert_eq!(g.row(1)[2], Vector2::new(2.0, 1.0));
    }
}
