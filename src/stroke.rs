use crate::{
    geometry::{self, Aabb, Vertex, SMOOTHING_ITERATIONS},
    math::{vec2, Vec2d, Vec3f},
    render::StrokeBuffer,
};

/// Points closer than `thickness / JITTER_DIVISOR` to the previous one are dropped.
const JITTER_DIVISOR: f64 = 10.0;

/// A single freehand stroke.
///
/// Raw points are appended while drawing and a cheap preview mesh is grown
/// alongside them; [`Stroke::update_geometry`] replaces it with the smoothed,
/// mitered ribbon once the stroke is finished.
///
/// The stroke exclusively owns its GPU vertex buffer. It is not `Clone`, and
/// moving it moves the buffer with it, so the buffer is released exactly once.
#[derive(Debug)]
pub struct Stroke {
    raw_points: Vec<Vec2d>,
    vertices: Vec<Vertex>,
    color: Vec3f,
    thickness: f64,
    eraser: bool,
    arc_length: f64,
    bounds: Aabb,
    buffer: Option<StrokeBuffer>,
    /// Set whenever `vertices` changes and the GPU copy is stale.
    dirty: bool,
}

impl Stroke {
    pub fn new(color: Vec3f, thickness: f64, eraser: bool) -> Self {
        Self {
            raw_points: Vec::new(),
            vertices: Vec::new(),
            color,
            thickness,
            eraser,
            arc_length: 0.0,
            bounds: Aabb::default(),
            buffer: None,
            dirty: false,
        }
    }

    /// Appends a world-space point, returning whether it was accepted.
    ///
    /// The first point is always accepted. Later points within
    /// `thickness / 10` of the last accepted point are ignored, which also
    /// guarantees the mesher never sees a zero-length segment.
    pub fn add_point(&mut self, x: f64, y: f64) -> bool {
        let point = vec2(x, y);
        let Some(&last) = self.raw_points.last() else {
            self.raw_points.push(point);
            return true;
        };

        let dist = point.dist(last);
        if dist < self.thickness / JITTER_DIVISOR {
            return false;
        }

        self.raw_points.push(point);
        self.arc_length += dist;
        geometry::extend_preview(
            &mut self.vertices,
            last,
            point,
            self.arc_length,
            self.thickness,
            self.color,
        );
        self.dirty = true;
        true
    }

    /// Rebuilds the render mesh from the raw points: smoothing, meshing and
    /// bounds. Strokes with fewer than two points are left untouched.
    pub fn update_geometry(&mut self) {
        if self.raw_points.len() < 2 {
            return;
        }

        let mut smoothed = geometry::smooth(&self.raw_points, SMOOTHING_ITERATIONS);
        // An exact reversal makes two neighbouring cuts coincide.
        smoothed.dedup();

        let ribbon = geometry::mesh(&smoothed, self.thickness, self.color);
        self.vertices = ribbon.vertices;
        self.arc_length = ribbon.length;
        self.bounds = geometry::bounds_of(&self.vertices);
        self.dirty = true;

        log::debug!(
            "finalized stroke: {} raw points, {} smoothed, {} vertices, length {:.4}",
            self.raw_points.len(),
            smoothed.len(),
            self.vertices.len(),
            self.arc_length,
        );
    }

    pub fn set_color(&mut self, color: Vec3f) {
        self.color = color;
        for v in &mut self.vertices {
            v.color = color;
        }
        self.dirty |= !self.vertices.is_empty();
    }

    pub fn set_thickness(&mut self, thickness: f64) {
        self.thickness = thickness;
        for v in &mut self.vertices {
            v.thickness = thickness as f32;
        }
        self.dirty |= !self.vertices.is_empty();
    }

    /// Drops all points and geometry, keeping color, thickness and the GPU buffer.
    pub fn clear(&mut self) {
        self.raw_points.clear();
        self.vertices.clear();
        self.arc_length = 0.0;
        self.bounds = Aabb::default();
        self.dirty = false;
    }

    /// No point has been accepted yet.
    pub fn is_empty(&self) -> bool {
        self.raw_points.is_empty()
    }

    /// Exactly one accepted point; drawn as a dot instead of a ribbon.
    pub fn is_dot(&self) -> bool {
        self.raw_points.len() == 1
    }

    pub fn raw_points(&self) -> &[Vec2d] {
        &self.raw_points
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn color(&self) -> Vec3f {
        self.color
    }

    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    pub fn is_eraser(&self) -> bool {
        self.eraser
    }

    pub fn arc_length(&self) -> f64 {
        self.arc_length
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub(crate) fn needs_upload(&self) -> bool {
        self.dirty
    }

    pub(crate) fn buffer(&self) -> Option<&StrokeBuffer> {
        self.buffer.as_ref()
    }

    /// Gives the GPU backend the buffer slot and marks the mesh as uploaded.
    pub(crate) fn buffer_for_upload(&mut self) -> (&[Vertex], &mut Option<StrokeBuffer>) {
        self.dirty = false;
        (&self.vertices, &mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::math::vec3;

    fn pen(thickness: f64) -> Stroke {
        Stroke::new(vec3(1.0, 1.0, 1.0), thickness, false)
    }

    #[test]
    fn first_point_is_always_accepted() {
        let mut stroke = pen(1.0);
        assert!(stroke.add_point(3.0, 4.0));
        assert!(stroke.is_dot());
        assert!(stroke.vertices().is_empty());
        assert_eq!(stroke.arc_length(), 0.0);
    }

    #[rstest]
    #[case(1.0 - 1e-9, false)]
    #[case(0.0, false)]
    #[case(1.0, true)]
    #[case(1.5, true)]
    fn jitter_filter_boundary(#[case] dist: f64, #[case] accepted: bool) {
        // thickness 10 puts the dead zone at exactly 1.0
        let mut stroke = pen(10.0);
        stroke.add_point(0.0, 0.0);
        assert_eq!(stroke.add_point(dist, 0.0), accepted);
        assert_eq!(stroke.raw_points().len(), if accepted { 2 } else { 1 });
    }

    #[test]
    fn distance_is_measured_from_last_accepted_point() {
        let mut stroke = pen(10.0);
        stroke.add_point(0.0, 0.0);
        assert!(!stroke.add_point(0.6, 0.0));
        assert!(!stroke.add_point(0.9, 0.0));
        assert!(stroke.add_point(1.0, 0.0));
    }

    #[test]
    fn preview_grows_with_accepted_points() {
        let mut stroke = pen(2.0);
        stroke.add_point(0.0, 0.0);
        stroke.add_point(1.0, 0.0);
        assert_eq!(stroke.vertices().len(), 4);
        stroke.add_point(2.0, 0.0);
        assert_eq!(stroke.vertices().len(), 6);
        assert_eq!(stroke.arc_length(), 2.0);
        assert!(stroke.needs_upload());
    }

    #[test]
    fn update_geometry_skips_short_strokes() {
        let mut stroke = pen(1.0);
        stroke.update_geometry();
        assert!(stroke.vertices().is_empty());

        stroke.add_point(5.0, 5.0);
        stroke.update_geometry();
        assert!(stroke.vertices().is_empty());
        assert_eq!(stroke.bounds(), Aabb::default());
    }

    #[test]
    fn horizontal_stroke_end_to_end() {
        let mut stroke = pen(2.0);
        for i in 0..=10 {
            assert!(stroke.add_point(i as f64, 0.0));
        }
        stroke.update_geometry();

        assert_eq!(stroke.vertices().len() % 2, 0);
        assert!((stroke.arc_length() - 10.0).abs() < 1e-9);
        for v in stroke.vertices() {
            assert!((v.position.y().abs() - 1.0).abs() < 1e-5);
            assert!((v.total_length - 10.0).abs() < 1e-5);
        }

        let bounds = stroke.bounds();
        assert!(bounds.min.dist(vec2(-1.0, -1.0)) < 1e-5);
        assert!(bounds.max.dist(vec2(11.0, 1.0)) < 1e-5);
    }

    #[test]
    fn reversal_stroke_meshes_without_nans() {
        let mut stroke = pen(1.0);
        for (x, y) in [(0.0, 0.0), (5.0, 0.0), (0.0, 0.0), (5.0, 0.0)] {
            stroke.add_point(x, y);
        }
        stroke.update_geometry();

        assert!(!stroke.vertices().is_empty());
        for v in stroke.vertices() {
            assert!(v.position.x().is_finite() && v.position.y().is_finite());
        }
    }

    #[test]
    fn set_thickness_updates_existing_vertices() {
        let mut stroke = pen(1.0);
        stroke.add_point(0.0, 0.0);
        stroke.add_point(1.0, 0.0);
        stroke.set_thickness(3.0);
        assert!(stroke.vertices().iter().all(|v| v.thickness == 3.0));
        assert_eq!(stroke.thickness(), 3.0);
    }

    #[test]
    fn clear_resets_geometry() {
        let mut stroke = pen(1.0);
        stroke.add_point(0.0, 0.0);
        stroke.add_point(1.0, 0.0);
        stroke.clear();
        assert!(stroke.is_empty());
        assert!(stroke.vertices().is_empty());
        assert_eq!(stroke.arc_length(), 0.0);
        assert!(!stroke.needs_upload());
    }

    #[test]
    fn moving_a_stroke_keeps_its_contents() {
        let mut stroke = pen(1.0);
        stroke.add_point(0.0, 0.0);
        stroke.add_point(1.0, 0.0);
        let moved = std::mem::replace(&mut stroke, pen(1.0));
        assert_eq!(moved.raw_points().len(), 2);
        assert!(stroke.is_empty());
        assert!(stroke.buffer().is_none());
    }
}
