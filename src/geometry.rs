//! Stroke geometry: centerline smoothing, ribbon meshing and bounds.

use bytemuck::NoUninit;

use crate::math::{lerp, vec2, Vec2d, Vec2f, Vec3f};

/// Corner-cutting passes applied to a finished stroke.
pub const SMOOTHING_ITERATIONS: usize = 2;

/// Interior joins never extend further than this many radii from the centerline.
pub const MITER_LIMIT: f64 = 4.0;

/// Lower bound on the miter/normal cosine before dividing by it.
const MIN_MITER_COS: f64 = 0.1;

/// Below this length, the summed segment normals are treated as cancelling out.
const DEGENERATE_NORMAL: f64 = 1e-9;

/// One vertex of a stroke's triangle strip, laid out for direct upload.
#[derive(Debug, Clone, Copy, PartialEq, NoUninit)]
#[repr(C)]
pub struct Vertex {
    pub position: Vec2f,
    pub color: Vec3f,
    /// `u` is 0 on the left edge and 1 on the right, `v` is the arc length.
    pub uv: Vec2f,
    /// World-space stroke diameter.
    pub thickness: f32,
    /// Arc length of the whole stroke, identical on every vertex once finalized.
    pub total_length: f32,
}

impl Vertex {
    fn new(position: Vec2d, color: Vec3f, u: f32, v: f64, thickness: f64, total: f64) -> Self {
        Self {
            position: position.to_f32(),
            color,
            uv: vec2(u, v as f32),
            thickness: thickness as f32,
            total_length: total as f32,
        }
    }
}

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2d,
    pub max: Vec2d,
}

impl Default for Aabb {
    /// Zero-sized box at the origin.
    fn default() -> Self {
        Self {
            min: vec2(0.0, 0.0),
            max: vec2(0.0, 0.0),
        }
    }
}

impl Aabb {
    pub fn new(min: Vec2d, max: Vec2d) -> Self {
        Self { min, max }
    }

    /// Closed-interval overlap test; boxes that only touch intersect.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x() <= other.max.x()
            && self.max.x() >= other.min.x()
            && self.min.y() <= other.max.y()
            && self.max.y() >= other.min.y()
    }
}

/// Computes the bounding box of a mesh.
///
/// An empty mesh yields the zero-sized box at the origin, which is
/// indistinguishable from real geometry there; check the vertex count first.
pub fn bounds_of(vertices: &[Vertex]) -> Aabb {
    let mut iter = vertices.iter().map(|v| v.position.to_f64());
    let Some(first) = iter.next() else {
        return Aabb::default();
    };

    iter.fold(Aabb::new(first, first), |b, p| Aabb {
        min: vec2(b.min.x().min(p.x()), b.min.y().min(p.y())),
        max: vec2(b.max.x().max(p.x()), b.max.y().max(p.y())),
    })
}

/// Chaikin corner cutting with pinned endpoints.
///
/// Every pass keeps the first and last point and replaces each segment by its
/// 25% and 75% points, except that the cut next to either endpoint is dropped
/// (the endpoint stands in for it). An `m`-point input therefore becomes
/// `2m - 2` points per pass.
pub fn smooth(points: &[Vec2d], iterations: usize) -> Vec<Vec2d> {
    let mut current = points.to_vec();
    if current.len() < 3 {
        return current;
    }

    for _ in 0..iterations {
        let last_segment = current.len() - 2;
        let mut next = Vec::with_capacity(2 * current.len() - 2);
        next.push(current[0]);
        for (i, pair) in current.windows(2).enumerate() {
            let (p0, p1) = (pair[0], pair[1]);
            if i > 0 {
                next.push(lerp(p0..=p1, 0.25f64));
            }
            if i < last_segment {
                next.push(lerp(p0..=p1, 0.75f64));
            }
        }
        next.push(current[current.len() - 1]);
        current = next;
    }

    current
}

/// A finished triangle-strip ribbon.
#[derive(Debug, Clone, Default)]
pub struct Ribbon {
    pub vertices: Vec<Vertex>,
    /// Arc length of the centerline (cap extensions excluded).
    pub length: f64,
}

/// Builds a mitered ribbon along `points`.
///
/// Consecutive points must be distinct: a zero-length segment has no
/// direction and poisons the mesh with NaNs. Fewer than two points produce an
/// empty ribbon.
pub fn mesh(points: &[Vec2d], thickness: f64, color: Vec3f) -> Ribbon {
    let n = points.len();
    if n < 2 {
        return Ribbon::default();
    }

    let radius = thickness / 2.0;
    let miter_limit = radius * MITER_LIMIT;
    let mut vertices = Vec::with_capacity(2 * n);
    let mut running = 0.0;

    let mut push_pair = |center: Vec2d, offset: Vec2d, v: f64| {
        vertices.push(Vertex::new(center + offset, color, 0.0, v, thickness, 0.0));
        vertices.push(Vertex::new(center - offset, color, 1.0, v, thickness, 0.0));
    };

    for (i, &curr) in points.iter().enumerate() {
        if i == 0 {
            let t = direction(curr, points[1]);
            push_pair(curr - t * radius, t.perp() * radius, -radius);
        } else if i == n - 1 {
            let prev = points[i - 1];
            running += curr.dist(prev);
            let t = direction(prev, curr);
            push_pair(curr + t * radius, t.perp() * radius, running + radius);
        } else {
            let prev = points[i - 1];
            running += curr.dist(prev);
            let offset = miter(direction(prev, curr), direction(curr, points[i + 1]), radius)
                .clamp_length(miter_limit);
            push_pair(curr, offset, running);
        }
    }

    for v in &mut vertices {
        v.total_length = running as f32;
    }

    Ribbon {
        vertices,
        length: running,
    }
}

/// Appends live-preview vertices for the segment `prev -> curr`.
///
/// The first segment also emits the start pair at `prev`. Preview segments are
/// unjoined rectangles; the finished stroke is remeshed with proper joins.
/// `length` is the arc length at `curr`.
pub fn extend_preview(
    vertices: &mut Vec<Vertex>,
    prev: Vec2d,
    curr: Vec2d,
    length: f64,
    thickness: f64,
    color: Vec3f,
) {
    let normal = direction(prev, curr).perp() * (thickness / 2.0);

    if vertices.is_empty() {
        vertices.push(Vertex::new(prev + normal, color, 0.0, 0.0, thickness, 0.0));
        vertices.push(Vertex::new(prev - normal, color, 1.0, 0.0, thickness, 0.0));
    }

    vertices.push(Vertex::new(curr + normal, color, 0.0, length, thickness, length));
    vertices.push(Vertex::new(curr - normal, color, 1.0, length, thickness, length));
}

fn direction(from: Vec2d, to: Vec2d) -> Vec2d {
    debug_assert!(from != to, "zero-length segment at {from:?}");
    (to - from).normalize()
}

/// Offset from the centerline to the left edge at a join between the
/// segments with unit tangents `t1` (incoming) and `t2` (outgoing).
fn miter(t1: Vec2d, t2: Vec2d, radius: f64) -> Vec2d {
    let n1 = t1.perp();
    let sum = n1 + t2.perp();

    // A full reversal cancels the normals; extend along the incoming
    // direction instead, which the miter limit then clamps.
    let dir = if sum.length() < DEGENERATE_NORMAL {
        t1
    } else {
        sum.normalize()
    };

    dir * (radius / dir.dot(n1).max(MIN_MITER_COS))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::math::vec3;

    const WHITE: Vec3f = vec3(1.0, 1.0, 1.0);

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    fn line(points: &[(f64, f64)]) -> Vec<Vec2d> {
        points.iter().map(|&(x, y)| vec2(x, y)).collect()
    }

    #[rstest]
    #[case(3, 1, 4)]
    #[case(3, 2, 6)]
    #[case(4, 1, 6)]
    #[case(5, 2, 14)]
    #[case(2, 2, 2)]
    #[case(1, 2, 1)]
    fn chaikin_point_count(#[case] n: usize, #[case] iterations: usize, #[case] expected: usize) {
        let points: Vec<Vec2d> = (0..n)
            .map(|i| vec2(i as f64, if i % 2 == 0 { 0.0 } else { 1.0 }))
            .collect();
        assert_eq!(smooth(&points, iterations).len(), expected);
    }

    #[test]
    fn chaikin_keeps_endpoints() {
        let points = line(&[(0.3, 0.7), (5.0, 9.0), (-2.0, 4.0), (8.1, -3.3)]);
        for iterations in 0..5 {
            let out = smooth(&points, iterations);
            assert_eq!(out.first(), points.first());
            assert_eq!(out.last(), points.last());
        }
    }

    #[test]
    fn chaikin_cuts_corners_at_quarters() {
        let out = smooth(&line(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0)]), 1);
        assert_eq!(out, line(&[(0.0, 0.0), (3.0, 0.0), (4.0, 1.0), (4.0, 4.0)]));
    }

    #[test]
    fn chaikin_is_deterministic() {
        let points = line(&[(0.0, 0.0), (1.0, 2.0), (3.0, 1.0), (4.0, 5.0)]);
        assert_eq!(
            smooth(&points, SMOOTHING_ITERATIONS),
            smooth(&points, SMOOTHING_ITERATIONS)
        );
    }

    #[test]
    fn chaikin_growth_is_linear_in_input() {
        let points: Vec<Vec2d> = (0..5000)
            .map(|i| vec2(i as f64, ((i * 7) % 13) as f64))
            .collect();
        let out = smooth(&points, SMOOTHING_ITERATIONS);
        assert_eq!(out.len(), 4 * points.len() - 6);
    }

    #[test]
    fn straight_ribbon_geometry() {
        let ribbon = mesh(&line(&[(0.0, 0.0), (5.0, 0.0), (10.0, 0.0)]), 2.0, WHITE);
        assert_eq!(ribbon.vertices.len(), 6);
        assert!(approx(ribbon.length, 10.0));

        for v in &ribbon.vertices {
            assert!(approx(v.position.y().abs() as f64, 1.0));
            assert_eq!(v.total_length, 10.0);
            assert_eq!(v.thickness, 2.0);
        }

        // caps extend one radius past each end
        assert!(approx(ribbon.vertices[0].position.x() as f64, -1.0));
        assert!(approx(ribbon.vertices[5].position.x() as f64, 11.0));

        let uvs: Vec<Vec2f> = ribbon.vertices.iter().map(|v| v.uv).collect();
        let expected: [Vec2f; 6] = [
            vec2(0.0, -1.0),
            vec2(1.0, -1.0),
            vec2(0.0, 5.0),
            vec2(1.0, 5.0),
            vec2(0.0, 11.0),
            vec2(1.0, 11.0),
        ];
        assert_eq!(uvs, expected);
    }

    #[test]
    fn left_edge_is_counter_clockwise_of_direction() {
        let ribbon = mesh(&line(&[(0.0, 0.0), (10.0, 0.0)]), 2.0, WHITE);
        assert!(ribbon.vertices[0].position.y() > 0.0);
        assert!(ribbon.vertices[1].position.y() < 0.0);
    }

    #[test]
    fn right_angle_join_is_mitered() {
        let ribbon = mesh(&line(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]), 2.0, WHITE);
        let corner = ribbon.vertices[2].position.to_f64();
        // 45 degree miter: sqrt(2) radii along the bisector
        assert!(approx(corner.dist(vec2(10.0, 0.0)), 2f64.sqrt()));
        assert!(approx(corner.x(), 9.0) && approx(corner.y(), 1.0));
    }

    #[rstest]
    #[case(&[(0.0, 0.0), (10.0, 0.0), (0.0, 0.0)])]
    #[case(&[(0.0, 0.0), (10.0, 0.0), (0.0, 0.01)])]
    #[case(&[(0.0, 0.0), (10.0, 0.0), (0.0, -0.5), (10.0, -1.0)])]
    fn miter_never_exceeds_limit(#[case] points: &[(f64, f64)]) {
        let points = line(points);
        let radius = 0.5;
        let ribbon = mesh(&points, radius * 2.0, WHITE);
        assert_eq!(ribbon.vertices.len(), 2 * points.len());

        for (i, center) in points.iter().enumerate().skip(1).take(points.len() - 2) {
            for v in &ribbon.vertices[2 * i..2 * i + 2] {
                let offset = v.position.to_f64().dist(*center);
                assert!(offset.is_finite());
                assert!(offset <= MITER_LIMIT * radius + 1e-6, "offset {offset}");
            }
        }
    }

    #[test]
    fn mesh_vertex_count_is_even() {
        for n in 0..8 {
            let points: Vec<Vec2d> =
                (0..n).map(|i| vec2(i as f64, (i % 3) as f64)).collect();
            let ribbon = mesh(&points, 1.0, WHITE);
            assert_eq!(ribbon.vertices.len() % 2, 0);
        }
    }

    #[test]
    fn bounds_contain_every_vertex() {
        let points = smooth(
            &line(&[(0.0, 0.0), (3.0, 7.0), (-4.0, 2.0), (6.0, -5.0), (1.0, 1.0)]),
            SMOOTHING_ITERATIONS,
        );
        let ribbon = mesh(&points, 0.8, vec3(1.0, 0.0, 0.0));
        let bounds = bounds_of(&ribbon.vertices);
        for v in &ribbon.vertices {
            let p = v.position.to_f64();
            assert!(bounds.min.x() <= p.x() && p.x() <= bounds.max.x());
            assert!(bounds.min.y() <= p.y() && p.y() <= bounds.max.y());
        }
    }

    #[test]
    fn empty_bounds_are_zero_box_at_origin() {
        assert_eq!(bounds_of(&[]), Aabb::default());
        assert_eq!(Aabb::default().min, vec2(0.0, 0.0));
        assert_eq!(Aabb::default().max, vec2(0.0, 0.0));
    }

    #[test]
    fn intersects_is_symmetric_and_closed() {
        let boxes = [
            Aabb::new(vec2(0.0, 0.0), vec2(1.0, 1.0)),
            Aabb::new(vec2(1.0, 1.0), vec2(2.0, 2.0)),
            Aabb::new(vec2(1.5, -3.0), vec2(1.75, 10.0)),
            Aabb::new(vec2(-5.0, -5.0), vec2(-4.0, -4.0)),
            Aabb::new(vec2(0.25, 0.25), vec2(0.5, 0.5)),
            Aabb::default(),
        ];
        for a in &boxes {
            for b in &boxes {
                assert_eq!(a.intersects(b), b.intersects(a), "{a:?} vs {b:?}");
            }
        }
        // touching corners count
        assert!(boxes[0].intersects(&boxes[1]));
        assert!(!boxes[0].intersects(&boxes[3]));
        // containment counts
        assert!(boxes[0].intersects(&boxes[4]));
    }

    #[test]
    fn preview_emits_start_pair_once() {
        let mut vertices = Vec::new();
        extend_preview(&mut vertices, vec2(0.0, 0.0), vec2(1.0, 0.0), 1.0, 2.0, WHITE);
        assert_eq!(vertices.len(), 4);
        extend_preview(&mut vertices, vec2(1.0, 0.0), vec2(2.0, 0.0), 2.0, 2.0, WHITE);
        assert_eq!(vertices.len(), 6);

        assert_eq!(vertices[0].uv, vec2(0.0, 0.0));
        assert_eq!(vertices[5].uv, vec2(1.0, 2.0));
        assert_eq!(vertices[4].position, vec2(2.0, 1.0));
    }
}
