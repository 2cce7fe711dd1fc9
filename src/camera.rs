use crate::{
    config::CameraConfig,
    geometry::Aabb,
    math::{lerp, vec2, Transform2, Vec2d},
};

/// Relative distance below which the animated camera snaps to its target.
const SETTLE_EPSILON: f64 = 1e-6;

/// Infinite-canvas camera.
///
/// The visible world region is centered on the view position and spans
/// `±aspect × zoom` horizontally and `±zoom` vertically. Pan and zoom requests
/// move a target; [`Camera::update`] eases the actual view towards it.
pub struct Camera {
    view_pos: Vec2d,
    target_view_pos: Vec2d,
    zoom: f64,
    target_zoom: f64,
    /// Viewport size in physical pixels.
    viewport: Vec2d,
    config: CameraConfig,
}

impl Camera {
    pub fn new(config: CameraConfig, width: u32, height: u32) -> Self {
        Self {
            view_pos: vec2(0.0, 0.0),
            target_view_pos: vec2(0.0, 0.0),
            zoom: 1.0,
            target_zoom: 1.0,
            viewport: vec2(f64::from(width.max(1)), f64::from(height.max(1))),
            config,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = vec2(f64::from(width.max(1)), f64::from(height.max(1)));
    }

    pub fn viewport(&self) -> Vec2d {
        self.viewport
    }

    pub fn aspect(&self) -> f64 {
        self.viewport.x() / self.viewport.y()
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// World-space region currently on screen.
    pub fn view_box(&self) -> Aabb {
        let half = vec2(self.aspect() * self.zoom, self.zoom);
        Aabb::new(self.view_pos - half, self.view_pos + half)
    }

    /// World to clip space.
    pub fn projection(&self) -> Transform2 {
        let view = self.view_box();
        Transform2::ortho(view.min, view.max)
    }

    /// Screen pixels (top-left origin, y down) to clip space.
    pub fn screen_to_ndc(&self, p: Vec2d) -> Vec2d {
        vec2(
            2.0 * p.x() / self.viewport.x() - 1.0,
            1.0 - 2.0 * p.y() / self.viewport.y(),
        )
    }

    /// The one screen-to-world mapping: through clip space and the inverse
    /// projection.
    pub fn screen_to_world(&self, p: Vec2d) -> Vec2d {
        self.projection().inverse().apply(self.screen_to_ndc(p))
    }

    /// Eases the view towards its target. Returns whether it is still moving.
    pub fn update(&mut self, dt: f64) -> bool {
        let t = (self.config.lerp_speed * dt).clamp(0.0, 1.0);
        self.zoom = lerp(self.zoom..=self.target_zoom, t);
        self.view_pos = lerp(self.view_pos..=self.target_view_pos, t);

        let zoom_settled = (self.zoom - self.target_zoom).abs() <= SETTLE_EPSILON * self.target_zoom;
        let pos_settled = self.view_pos.dist(self.target_view_pos) <= SETTLE_EPSILON * self.zoom;
        if zoom_settled && pos_settled {
            self.zoom = self.target_zoom;
            self.view_pos = self.target_view_pos;
            false
        } else {
            true
        }
    }

    /// Pans so that the canvas follows a pointer dragged by `delta` screen pixels.
    pub fn drag(&mut self, delta: Vec2d) {
        let scale = 2.0 * self.target_zoom;
        self.target_view_pos += vec2(
            -delta.x() / self.viewport.x() * scale * self.aspect(),
            delta.y() / self.viewport.y() * scale,
        );
    }

    /// Pans by wheel/touchpad scroll amounts.
    pub fn scroll(&mut self, delta: Vec2d) {
        let speed = self.config.pan_speed * self.target_zoom;
        self.target_view_pos += vec2(-delta.x() * speed, delta.y() * speed);
    }

    /// Zooms in (`direction > 0`) or out, keeping the world point under
    /// `anchor` (screen pixels) in place.
    pub fn zoom_at(&mut self, anchor: Vec2d, direction: f64) {
        if direction == 0.0 {
            return;
        }

        let world = self.screen_to_world(anchor);
        let step = if direction > 0.0 {
            self.config.zoom_in
        } else {
            self.config.zoom_out
        };
        self.target_zoom =
            (self.target_zoom * step).clamp(self.config.min_zoom, self.config.max_zoom);

        let ndc = self.screen_to_ndc(anchor);
        let half = vec2(self.aspect() * self.target_zoom, self.target_zoom);
        self.target_view_pos = world - ndc * half;
    }

    /// Background grid cell size: a power of ten, a tenth of the zoom's decade.
    pub fn grid_spacing(&self) -> f64 {
        10f64.powf(self.zoom.log10().floor()) * 0.1
    }

    pub fn reset(&mut self) {
        self.target_view_pos = vec2(0.0, 0.0);
        self.target_zoom = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera::new(CameraConfig::default(), 800, 400)
    }

    fn close(a: Vec2d, b: Vec2d) -> bool {
        a.dist(b) < 1e-9
    }

    #[test]
    fn view_box_spans_aspect_and_zoom() {
        let cam = camera();
        let view = cam.view_box();
        assert_eq!(view.min, vec2(-2.0, -1.0));
        assert_eq!(view.max, vec2(2.0, 1.0));
    }

    #[test]
    fn screen_corners_map_to_view_box() {
        let cam = camera();
        assert!(close(cam.screen_to_world(vec2(0.0, 0.0)), vec2(-2.0, 1.0)));
        assert!(close(cam.screen_to_world(vec2(800.0, 400.0)), vec2(2.0, -1.0)));
        assert!(close(cam.screen_to_world(vec2(400.0, 200.0)), vec2(0.0, 0.0)));
    }

    #[test]
    fn zoom_keeps_anchor_fixed() {
        let mut cam = camera();
        let anchor = vec2(600.0, 100.0);
        let before = cam.screen_to_world(anchor);

        cam.zoom_at(anchor, 1.0);
        // a full step lands exactly on the target
        cam.update(1.0);

        assert!(cam.zoom() < 1.0);
        assert!(close(cam.screen_to_world(anchor), before));
    }

    #[test]
    fn zoom_is_clamped() {
        let mut cam = camera();
        for _ in 0..500 {
            cam.zoom_at(vec2(400.0, 200.0), -1.0);
        }
        cam.update(1.0);
        assert_eq!(cam.zoom(), CameraConfig::default().max_zoom);
    }

    #[test]
    fn drag_follows_pointer() {
        let mut cam = camera();
        let grabbed = cam.screen_to_world(vec2(100.0, 100.0));
        cam.drag(vec2(50.0, 30.0));
        cam.update(1.0);
        assert!(close(cam.screen_to_world(vec2(150.0, 130.0)), grabbed));
    }

    #[test]
    fn update_eases_and_settles() {
        let mut cam = camera();
        cam.scroll(vec2(-10.0, 0.0));
        assert!(cam.update(0.01));
        assert!(cam.view_pos.x() > 0.0);

        let mut frames = 0;
        while cam.update(1.0 / 60.0) {
            frames += 1;
            assert!(frames < 10_000);
        }
        assert!(close(cam.view_pos, vec2(0.5, 0.0)));
    }

    #[test]
    fn grid_spacing_follows_zoom_decade() {
        let mut cam = camera();
        assert!((cam.grid_spacing() - 0.1).abs() < 1e-12);

        cam.zoom_at(vec2(400.0, 200.0), -1.0);
        cam.update(1.0);
        assert!((cam.grid_spacing() - 0.1).abs() < 1e-12);

        for _ in 0..30 {
            cam.zoom_at(vec2(400.0, 200.0), -1.0);
        }
        cam.update(1.0);
        assert!(cam.zoom() > 10.0);
        assert!(cam.grid_spacing() >= 1.0 - 1e-12);
    }

    #[test]
    fn reset_returns_home() {
        let mut cam = camera();
        cam.drag(vec2(300.0, -20.0));
        cam.zoom_at(vec2(10.0, 10.0), 1.0);
        cam.reset();
        cam.update(1.0);
        assert_eq!(cam.view_pos, vec2(0.0, 0.0));
        assert_eq!(cam.zoom(), 1.0);
    }
}
