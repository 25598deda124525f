//! Placement of image slices in patient space.

use crate::dataset::split_values;

pub type Point3 = [f64; 3];
pub type Vector3 = [f64; 3];

pub const DEFAULT_ORIGIN: Point3 = [0.0, 0.0, 0.0];
pub const DEFAULT_RIGHT: Vector3 = [1.0, 0.0, 0.0];
pub const DEFAULT_UP: Vector3 = [0.0, 1.0, 0.0];
/// Pixel spacing and slice thickness in mm used when a file carries none
pub const DEFAULT_SPACING: f64 = 1.0;

/// Tolerance when comparing spacings of different slices
const SPACING_TOLERANCE: f64 = 1e-4;

pub(crate) fn cross(a: Vector3, b: Vector3) -> Vector3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn dot(a: Vector3, b: Vector3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Unit vector in the direction of `v`, `None` for (near) zero vectors
pub(crate) fn normalized(v: Vector3) -> Option<Vector3> {
    let length = dot(v, v).sqrt();
    (length.is_finite() && length > f64::EPSILON).then(|| v.map(|c| c / length))
}

/// Geometry of one 2-D slice.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaneGeometry {
    pub origin: Point3,
    /// Direction of increasing column index
    pub right: Vector3,
    /// Direction of increasing row index
    pub up: Vector3,
    /// In-plane spacing as (x, y), i.e. (between columns, between rows)
    pub spacing: (f64, f64),
    pub thickness: f64,
    pub columns: u32,
    pub rows: u32,
}

impl Default for PlaneGeometry {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN,
            right: DEFAULT_RIGHT,
            up: DEFAULT_UP,
            spacing: (DEFAULT_SPACING, DEFAULT_SPACING),
            thickness: DEFAULT_SPACING,
            columns: 0,
            rows: 0,
        }
    }
}

impl PlaneGeometry {
    /// Builds a plane, normalizing both axes.
    ///
    /// Degenerate axes (zero length or parallel) fall back to the identity
    /// orientation.
    pub fn new(
        origin: Point3,
        right: Vector3,
        up: Vector3,
        spacing: (f64, f64),
        thickness: f64,
    ) -> Self {
        let (right, up) = match (normalized(right), normalized(up)) {
            (Some(r), Some(u)) if normalized(cross(r, u)).is_some() => (r, u),
            _ => (DEFAULT_RIGHT, DEFAULT_UP),
        };
        Self {
            origin,
            right,
            up,
            spacing,
            thickness,
            ..Self::default()
        }
    }

    pub fn with_extent(mut self, columns: u32, rows: u32) -> Self {
        self.columns = columns;
        self.rows = rows;
        self
    }

    /// Unit normal of the plane (`right × up`)
    pub fn normal(&self) -> Vector3 {
        normalized(cross(self.right, self.up)).unwrap_or([0.0, 0.0, 1.0])
    }

    /// Signed distance of the origin along the plane normal
    pub fn position_along_normal(&self) -> f64 {
        dot(self.origin, self.normal())
    }

    /// Index bounds `[x0, x1, y0, y1, z0, z1]` of the plane in its own frame
    pub fn bounds(&self) -> [f64; 6] {
        [
            0.0,
            f64::from(self.columns),
            0.0,
            f64::from(self.rows),
            0.0,
            1.0,
        ]
    }

    /// World position of the centre of pixel (`column`, `row`)
    pub fn index_to_world(&self, column: f64, row: f64) -> Point3 {
        let x = column * self.spacing.0;
        let y = row * self.spacing.1;
        [0, 1, 2].map(|i| self.origin[i] + x * self.right[i] + y * self.up[i])
    }
}

/// Aggregate geometry of all slices of a series.
///
/// The origin is the component-wise minimum of all slice origins. The
/// spacing is taken from the first slice only; `consistent_spacing` reports
/// whether every other slice agrees with it.
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesGeometry {
    pub origin: Point3,
    /// (x, y, z) where z is the slice thickness
    pub spacing: Vector3,
    pub bounds: [f64; 6],
    pub slices: Vec<PlaneGeometry>,
    pub consistent_spacing: bool,
}

impl Default for SeriesGeometry {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN,
            spacing: [DEFAULT_SPACING; 3],
            bounds: [0.0; 6],
            slices: Vec::new(),
            consistent_spacing: true,
        }
    }
}

impl SeriesGeometry {
    /// Folds the slice planes, in series order, into one geometry.
    pub fn from_planes<'a>(planes: impl IntoIterator<Item = &'a PlaneGeometry>) -> Self {
        let mut geometry = Self::default();
        for (index, plane) in planes.into_iter().enumerate() {
            if index == 0 {
                geometry.origin = plane.origin;
                geometry.spacing = [plane.spacing.0, plane.spacing.1, plane.thickness];
                geometry.bounds = plane.bounds();
            } else {
                for dim in 0..3 {
                    geometry.origin[dim] = geometry.origin[dim].min(plane.origin[dim]);
                }
                let spacing = [plane.spacing.0, plane.spacing.1, plane.thickness];
                if spacing
                    .iter()
                    .zip(geometry.spacing.iter())
                    .any(|(a, b)| (a - b).abs() > SPACING_TOLERANCE)
                {
                    geometry.consistent_spacing = false;
                }
            }
            geometry.slices.push(plane.clone());
        }
        geometry.bounds[5] = geometry.slices.len() as f64;
        geometry
    }

    pub fn number_of_slices(&self) -> usize {
        self.slices.len()
    }
}

fn parse_components(text: &str) -> Option<Vec<f64>> {
    split_values(text)
        .iter()
        .map(|part| part.parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect()
}

/// Parses an `ImagePositionPatient` style value.
pub fn parse_point(text: &str) -> Option<Point3> {
    match parse_components(text)?.as_slice() {
        &[x, y, z] => Some([x, y, z]),
        _ => None,
    }
}

/// Parses an `ImageOrientationPatient` style value into (right, up).
pub fn parse_orientation(text: &str) -> Option<(Vector3, Vector3)> {
    orientation_from_values(&parse_components(text)?)
}

pub(crate) fn orientation_from_values(values: &[f64]) -> Option<(Vector3, Vector3)> {
    match *values {
        [rx, ry, rz, ux, uy, uz] => Some(([rx, ry, rz], [ux, uy, uz])),
        _ => None,
    }
}

/// Parses a `PixelSpacing` value (row spacing, column spacing) into (x, y).
pub fn parse_spacing(text: &str) -> Option<(f64, f64)> {
    spacing_from_values(&parse_components(text)?)
}

pub(crate) fn spacing_from_values(values: &[f64]) -> Option<(f64, f64)> {
    match *values {
        [row_spacing, column_spacing] if row_spacing > 0.0 && column_spacing > 0.0 => {
            Some((column_spacing, row_spacing))
        }
        _ => None,
    }
}
