// q_shared.rs — vector math, planes and constants shared by the map, model and render code

// ============================================================
// Basic types
// ============================================================

pub type Vec2 = [f32; 2];
pub type Vec3 = [f32; 3];
pub type Vec4 = [f32; 4];
/// Column-major 4x4 matrix, element (row r, column c) lives at `c * 4 + r`.
pub type Mat4 = [f32; 16];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

pub const MAT4_IDENTITY: Mat4 = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

// angle indexes
pub const PITCH: usize = 0;
pub const YAW: usize = 1;
pub const ROLL: usize = 2;

pub const MAX_QPATH: usize = 64;

/// Half extent of the playable world on each axis.
pub const MAX_WORLD_WIDTH: f32 = 4096.0;

// ============================================================
// Plane types
// ============================================================

// 0-2 are axial planes
pub const PLANE_X: u8 = 0;
pub const PLANE_Y: u8 = 1;
pub const PLANE_Z: u8 = 2;

// 3-5 are non-axial planes snapped to the nearest
pub const PLANE_ANYX: u8 = 3;
pub const PLANE_ANYY: u8 = 4;
pub const PLANE_ANYZ: u8 = 5;

// planes (x&~1) and (x&~1)+1 are always opposites
pub const PLANE_NONE: u8 = 6;

// ============================================================
// Content and surface flags (as written by the map compiler)
// ============================================================

pub const CONTENTS_SOLID: i32 = 0x0001;
pub const CONTENTS_WINDOW: i32 = 0x0002;
pub const CONTENTS_WATER: i32 = 0x0020;
pub const CONTENTS_LEVEL_1: i32 = 0x0100;
pub const CONTENTS_LEVEL_8: i32 = 0x8000;
pub const CONTENTS_ACTORCLIP: i32 = 0x0001_0000;
pub const CONTENTS_WEAPONCLIP: i32 = 0x0200_0000;
pub const CONTENTS_STEPON: i32 = 0x4000_0000;

/// Marks an internal tree node in merged node/leaf arrays.
pub const CONTENTS_NODE: i32 = -1;

pub const SURF_LIGHT: i32 = 0x1;
pub const SURF_SLICK: i32 = 0x2;
pub const SURF_WARP: i32 = 0x8;
pub const SURF_TRANS33: i32 = 0x10;
pub const SURF_TRANS66: i32 = 0x20;
pub const SURF_FLOWING: i32 = 0x40;
pub const SURF_NODRAW: i32 = 0x80;
pub const SURF_PHONG: i32 = 0x400;
pub const SURF_ALPHATEST: i32 = 0x0200_0000;

// ============================================================
// Map levels
// ============================================================

/// Number of stacked gameplay levels a map may use.
pub const PATHFINDING_HEIGHT: usize = 8;
/// Highest submodel index that holds visible level geometry.
pub const LEVEL_LASTVISIBLE: usize = 255;
pub const LEVEL_WEAPONCLIP: usize = 256;
pub const LEVEL_ACTORCLIP: usize = 257;
pub const LEVEL_STEPON: usize = 258;
pub const LEVEL_MAX: usize = 259;
/// Submodels below this index are level models, the rest are inline brush models.
pub const NUM_REGULAR_MODELS: usize = LEVEL_MAX;

// ============================================================
// CPlane
// ============================================================

/// A plane as used at runtime: normal, distance and cached classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CPlane {
    pub normal: Vec3,
    pub dist: f32,
    /// One of the `PLANE_*` constants; used for the axial fast paths.
    pub plane_type: u8,
    /// Bit i set when `normal[i] < 0`; used by `box_on_plane_side`.
    pub signbits: u8,
}

impl Default for CPlane {
    fn default() -> Self {
        Self {
            normal: VEC3_ORIGIN,
            dist: 0.0,
            plane_type: PLANE_NONE,
            signbits: 0,
        }
    }
}

impl CPlane {
    pub fn new(normal: Vec3, dist: f32) -> Self {
        Self {
            normal,
            dist,
            plane_type: plane_type_for_normal(&normal),
            signbits: signbits_for_plane(&normal),
        }
    }

    /// Signed distance of `p` from the plane.
    pub fn distance(&self, p: &Vec3) -> f32 {
        if self.plane_type < 3 {
            p[self.plane_type as usize] - self.dist
        } else {
            dot_product(&self.normal, p) - self.dist
        }
    }
}

pub fn plane_type_for_normal(normal: &Vec3) -> u8 {
    if normal[0] == 1.0 || normal[0] == -1.0 {
        return PLANE_X;
    }
    if normal[1] == 1.0 || normal[1] == -1.0 {
        return PLANE_Y;
    }
    if normal[2] == 1.0 || normal[2] == -1.0 {
        return PLANE_Z;
    }

    let ax = normal[0].abs();
    let ay = normal[1].abs();
    let az = normal[2].abs();
    if ax >= ay && ax >= az {
        PLANE_ANYX
    } else if ay >= ax && ay >= az {
        PLANE_ANYY
    } else {
        PLANE_ANYZ
    }
}

pub fn signbits_for_plane(normal: &Vec3) -> u8 {
    let mut bits = 0u8;
    for (j, n) in normal.iter().enumerate() {
        if *n < 0.0 {
            bits |= 1 << j;
        }
    }
    bits
}

// ============================================================
// Vector math
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

#[inline]
pub fn cross_product(a: &Vec3, b: &Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub fn vector_length(v: &Vec3) -> f32 {
    dot_product(v, v).sqrt()
}

#[inline]
pub fn vector_is_zero(v: &Vec3) -> bool {
    v[0] == 0.0 && v[1] == 0.0 && v[2] == 0.0
}

/// Normalizes `v` in place and returns its previous length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

pub fn clear_bounds(mins: &mut Vec3, maxs: &mut Vec3) {
    *mins = [f32::MAX; 3];
    *maxs = [-f32::MAX; 3];
}

pub fn add_point_to_bounds(v: &Vec3, mins: &mut Vec3, maxs: &mut Vec3) {
    for i in 0..3 {
        if v[i] < mins[i] {
            mins[i] = v[i];
        }
        if v[i] > maxs[i] {
            maxs[i] = v[i];
        }
    }
}

pub fn radius_from_bounds(mins: &Vec3, maxs: &Vec3) -> f32 {
    let mut corner = [0.0f32; 3];
    for i in 0..3 {
        corner[i] = mins[i].abs().max(maxs[i].abs());
    }
    vector_length(&corner)
}

// ============================================================
// Angles and rotations
// ============================================================

/// Forward, right and up vectors for the given pitch/yaw/roll angles in degrees.
pub fn angle_vectors(angles: &Vec3) -> (Vec3, Vec3, Vec3) {
    let (sy, cy) = angles[YAW].to_radians().sin_cos();
    let (sp, cp) = angles[PITCH].to_radians().sin_cos();
    let (sr, cr) = angles[ROLL].to_radians().sin_cos();

    let forward = [cp * cy, cp * sy, -sp];
    let right = [
        -sr * sp * cy + cr * sy,
        -sr * sp * sy - cr * cy,
        -sr * cp,
    ];
    let up = [
        cr * sp * cy + sr * sy,
        cr * sp * sy - sr * cy,
        cr * cp,
    ];
    (forward, right, up)
}

/// Rotates `point` around the unit vector `dir` by `degrees` (right-handed).
pub fn rotate_point_around_vector(dir: &Vec3, point: &Vec3, degrees: f32) -> Vec3 {
    let (s, c) = degrees.to_radians().sin_cos();
    let cross = cross_product(dir, point);
    let along = dot_product(dir, point) * (1.0 - c);

    [
        point[0] * c + cross[0] * s + dir[0] * along,
        point[1] * c + cross[1] * s + dir[1] * along,
        point[2] * c + cross[2] * s + dir[2] * along,
    ]
}

/// Rotates `v` from world into the frame spanned by forward/right/up.
/// The right axis is flipped so the result is left-handed like entity space.
pub fn vector_rotate(forward: &Vec3, right: &Vec3, up: &Vec3, v: &Vec3) -> Vec3 {
    [
        dot_product(v, forward),
        -dot_product(v, right),
        dot_product(v, up),
    ]
}

// ============================================================
// Matrices
// ============================================================

/// `a * b` for column-major matrices.
pub fn matrix_multiply(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [0.0f32; 16];
    for col in 0..4 {
        for row in 0..4 {
            out[col * 4 + row] = (0..4).map(|k| a[k * 4 + row] * b[col * 4 + k]).sum();
        }
    }
    out
}

/// Transforms a point (w = 1) by a column-major matrix.
pub fn matrix_transform_point(m: &Mat4, p: &Vec3) -> Vec3 {
    [
        m[0] * p[0] + m[4] * p[1] + m[8] * p[2] + m[12],
        m[1] * p[0] + m[5] * p[1] + m[9] * p[2] + m[13],
        m[2] * p[0] + m[6] * p[1] + m[10] * p[2] + m[14],
    ]
}

#[inline]
pub fn matrix_origin(m: &Mat4) -> Vec3 {
    [m[12], m[13], m[14]]
}

// ============================================================
// Box tests
// ============================================================

/// Classifies a box against a plane: 1 = front, 2 = back, 3 = crossing.
pub fn box_on_plane_side(emins: &Vec3, emaxs: &Vec3, p: &CPlane) -> i32 {
    if p.plane_type < 3 {
        let t = p.plane_type as usize;
        if p.dist <= emins[t] {
            return 1;
        }
        if p.dist >= emaxs[t] {
            return 2;
        }
        return 3;
    }

    // pick the corners nearest and farthest along the normal
    let mut near = [0.0f32; 3];
    let mut far = [0.0f32; 3];
    for i in 0..3 {
        if p.signbits & (1 << i) != 0 {
            far[i] = emins[i];
            near[i] = emaxs[i];
        } else {
            far[i] = emaxs[i];
            near[i] = emins[i];
        }
    }
    let dist1 = dot_product(&p.normal, &far);
    let dist2 = dot_product(&p.normal, &near);

    let mut sides = 0;
    if dist1 >= p.dist {
        sides = 1;
    }
    if dist2 < p.dist {
        sides |= 2;
    }
    sides
}

// ============================================================
// Text parsing
// ============================================================

/// Splits off the next whitespace-delimited token, honouring `//` comments
/// and double-quoted strings. Returns the token and the remaining input, or
/// `None` once the input is exhausted.
pub fn com_parse(data: &str) -> Option<(&str, &str)> {
    let mut rest = data;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("//") {
            rest = after.find('\n').map_or("", |nl| &after[nl + 1..]);
            continue;
        }
        break;
    }
    if rest.is_empty() {
        return None;
    }

    if let Some(quoted) = rest.strip_prefix('"') {
        return Some(match quoted.find('"') {
            Some(end) => (&quoted[..end], &quoted[end + 1..]),
            None => (quoted, ""),
        });
    }

    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    Some((&rest[..end], &rest[end..]))
}

/// Path without its extension: `models/soldier/body.md2` -> `models/soldier/body`.
pub fn com_strip_extension(path: &str) -> &str {
    match path.rfind('.') {
        Some(dot) if !path[dot..].contains('/') => &path[..dot],
        _ => path,
    }
}

/// Directory part of a path including the trailing slash.
pub fn com_file_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(slash) => &path[..=slash],
        None => "",
    }
}

/// Reads a fixed-size, NUL-padded name field.
pub fn fixed_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: &Vec3, b: &Vec3) -> bool {
        (0..3).all(|i| (a[i] - b[i]).abs() < 1e-4)
    }

    // ---------------------------------------------------------
    // Vectors and planes
    // ---------------------------------------------------------

    #[test]
    fn test_vector_normalize_returns_length() {
        let mut v = [3.0, 0.0, 4.0];
        let len = vector_normalize(&mut v);
        assert_eq!(len, 5.0);
        assert!(approx(&v, &[0.6, 0.0, 0.8]));
    }

    #[test]
    fn test_plane_type_classification() {
        assert_eq!(plane_type_for_normal(&[0.0, 0.0, -1.0]), PLANE_Z);
        assert_eq!(plane_type_for_normal(&[0.8, 0.6, 0.0]), PLANE_ANYX);
        assert_eq!(plane_type_for_normal(&[0.0, 0.6, 0.8]), PLANE_ANYZ);
        assert_eq!(signbits_for_plane(&[-1.0, 0.5, -0.1]), 0b101);
    }

    #[test]
    fn test_plane_distance_axial_and_general() {
        let axial = CPlane::new([0.0, 1.0, 0.0], 10.0);
        assert_eq!(axial.distance(&[0.0, 15.0, 99.0]), 5.0);

        let n = [0.6, 0.8, 0.0];
        let general = CPlane::new(n, 1.0);
        assert!((general.distance(&[1.0, 1.0, 0.0]) - 0.4).abs() < 1e-5);
    }

    // ---------------------------------------------------------
    // Angles
    // ---------------------------------------------------------

    #[test]
    fn test_angle_vectors_identity() {
        let (f, r, u) = angle_vectors(&[0.0, 0.0, 0.0]);
        assert!(approx(&f, &[1.0, 0.0, 0.0]));
        assert!(approx(&r, &[0.0, -1.0, 0.0]));
        assert!(approx(&u, &[0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_angle_vectors_yaw_90() {
        let (f, r, _) = angle_vectors(&[0.0, 90.0, 0.0]);
        assert!(approx(&f, &[0.0, 1.0, 0.0]));
        assert!(approx(&r, &[1.0, 0.0, 0.0]));
    }

    #[test]
    fn test_rotate_point_around_vector() {
        let p = rotate_point_around_vector(&[0.0, 0.0, 1.0], &[1.0, 0.0, 0.0], 90.0);
        assert!(approx(&p, &[0.0, 1.0, 0.0]));
        let q = rotate_point_around_vector(&[0.0, 0.0, 1.0], &[1.0, 0.0, 0.0], -90.0);
        assert!(approx(&q, &[0.0, -1.0, 0.0]));
    }

    // ---------------------------------------------------------
    // Matrices
    // ---------------------------------------------------------

    #[test]
    fn test_matrix_multiply_identity() {
        let mut m = MAT4_IDENTITY;
        m[12] = 5.0;
        m[1] = 2.0;
        assert_eq!(matrix_multiply(&MAT4_IDENTITY, &m), m);
        assert_eq!(matrix_multiply(&m, &MAT4_IDENTITY), m);
    }

    #[test]
    fn test_matrix_multiply_composes_translations() {
        let mut a = MAT4_IDENTITY;
        a[12] = 1.0;
        let mut b = MAT4_IDENTITY;
        b[13] = 2.0;
        let c = matrix_multiply(&a, &b);
        assert_eq!(matrix_origin(&c), [1.0, 2.0, 0.0]);
        assert_eq!(matrix_transform_point(&c, &[1.0, 1.0, 1.0]), [2.0, 3.0, 1.0]);
    }

    // ---------------------------------------------------------
    // Box on plane side
    // ---------------------------------------------------------

    #[test]
    fn test_box_on_plane_side_axial() {
        let p = CPlane::new([1.0, 0.0, 0.0], 0.0);
        assert_eq!(box_on_plane_side(&[1.0, 0.0, 0.0], &[2.0, 1.0, 1.0], &p), 1);
        assert_eq!(box_on_plane_side(&[-2.0, 0.0, 0.0], &[-1.0, 1.0, 1.0], &p), 2);
        assert_eq!(box_on_plane_side(&[-1.0, 0.0, 0.0], &[1.0, 1.0, 1.0], &p), 3);
    }

    #[test]
    fn test_box_on_plane_side_general() {
        let mut n = [1.0, -1.0, 0.0];
        vector_normalize(&mut n);
        let p = CPlane::new(n, 0.0);
        assert_eq!(box_on_plane_side(&[5.0, -5.0, 0.0], &[6.0, -4.0, 1.0], &p), 1);
        assert_eq!(box_on_plane_side(&[-6.0, 4.0, 0.0], &[-5.0, 5.0, 1.0], &p), 2);
        assert_eq!(box_on_plane_side(&[-1.0, -1.0, 0.0], &[1.0, 1.0, 1.0], &p), 3);
    }

    // ---------------------------------------------------------
    // Parsing
    // ---------------------------------------------------------

    #[test]
    fn test_com_parse_tokens_and_comments() {
        let text = "walk 0 9 // trailing\n \"stand still\" 10";
        let (t1, rest) = com_parse(text).unwrap();
        assert_eq!(t1, "walk");
        let (t2, rest) = com_parse(rest).unwrap();
        assert_eq!(t2, "0");
        let (t3, rest) = com_parse(rest).unwrap();
        assert_eq!(t3, "9");
        let (t4, rest) = com_parse(rest).unwrap();
        assert_eq!(t4, "stand still");
        let (t5, rest) = com_parse(rest).unwrap();
        assert_eq!(t5, "10");
        assert!(com_parse(rest).is_none());
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(com_strip_extension("models/a/body.md2"), "models/a/body");
        assert_eq!(com_strip_extension("models/a.b/body"), "models/a.b/body");
        assert_eq!(com_file_path("models/a/body.md2"), "models/a/");
        assert_eq!(fixed_name(b"weapon\0\0\0"), "weapon");
    }
}
