use std::collections::hash_map::Values;
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A point in millimetres with its intensity.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub intensity: u16,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64, intensity: u16) -> Point {
        Point { x, y, z, intensity }
    }
}

/// Bit pattern of a point's position, used as the map key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PositionKey([u64; 3]);

impl PositionKey {
    fn of(x: f64, y: f64, z: f64) -> PositionKey {
        PositionKey([bits(x), bits(y), bits(z)])
    }
}

// -0.0 and 0.0 are the same position.
fn bits(v: f64) -> u64 {
    if v == 0. {
        0
    } else {
        v.to_bits()
    }
}

/// Unordered set of points keyed by position.
///
/// Setting a point at a position that already holds one replaces it, so
/// samples repeated across several rotations collapse into one point.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(into = "Vec<Point>", from = "Vec<Point>")
)]
pub struct PointCloud {
    points: HashMap<PositionKey, Point>,
}

impl PointCloud {
    pub fn new() -> PointCloud {
        PointCloud {
            points: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> PointCloud {
        PointCloud {
            points: HashMap::with_capacity(capacity),
        }
    }

    pub fn set(&mut self, point: Point) {
        self.points
            .insert(PositionKey::of(point.x, point.y, point.z), point);
    }

    pub fn get(&self, x: f64, y: f64, z: f64) -> Option<&Point> {
        self.points.get(&PositionKey::of(x, y, z))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> Values<'_, PositionKey, Point> {
        self.points.values()
    }
}

impl<'a> IntoIterator for &'a PointCloud {
    type Item = &'a Point;
    type IntoIter = Values<'a, PositionKey, Point>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Point> for PointCloud {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        let mut cloud = PointCloud::new();
        iter.into_iter().for_each(|p| cloud.set(p));
        cloud
    }
}

impl From<Vec<Point>> for PointCloud {
    fn from(points: Vec<Point>) -> Self {
        points.into_iter().collect()
    }
}

impl From<PointCloud> for Vec<Point> {
    fn from(cloud: PointCloud) -> Self {
        cloud.points.into_values().collect()
    }
}
