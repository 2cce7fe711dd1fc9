use std::mem;

use crate::{
    geometry::Aabb,
    math::{Vec2d, Vec3f},
    stroke::Stroke,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawState {
    Idle,
    Drawing,
}

/// Brush settings applied to the next stroke.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolState {
    pub color: Vec3f,
    pub thickness: f64,
    pub eraser: bool,
}

/// Finished strokes in paint order, the redo stack and the stroke being drawn.
pub struct Canvas {
    strokes: Vec<Stroke>,
    redo: Vec<Stroke>,
    current: Stroke,
    state: DrawState,
    tool: ToolState,
}

impl Canvas {
    pub fn new(tool: ToolState) -> Self {
        Self {
            strokes: Vec::new(),
            redo: Vec::new(),
            current: Self::blank(&tool),
            state: DrawState::Idle,
            tool,
        }
    }

    fn blank(tool: &ToolState) -> Stroke {
        Stroke::new(tool.color, tool.thickness, tool.eraser)
    }

    /// Begins a new stroke at `pos`. Any redo history is discarded.
    pub fn start_drawing(&mut self, pos: Vec2d) {
        if !self.redo.is_empty() {
            log::debug!("discarding {} redoable strokes", self.redo.len());
            self.redo.clear();
        }

        self.current = Self::blank(&self.tool);
        self.current.add_point(pos.x(), pos.y());
        self.state = DrawState::Drawing;
    }

    /// Feeds a pointer sample to the in-progress stroke.
    pub fn on_drawing(&mut self, pos: Vec2d) -> bool {
        self.state == DrawState::Drawing && self.current.add_point(pos.x(), pos.y())
    }

    /// Finishes the in-progress stroke and appends it to the collection.
    pub fn end_drawing(&mut self) {
        if self.state != DrawState::Drawing {
            return;
        }
        self.state = DrawState::Idle;

        let mut stroke = mem::replace(&mut self.current, Self::blank(&self.tool));
        if stroke.is_empty() {
            return;
        }
        stroke.update_geometry();
        log::info!(
            "stroke #{} finished: {} points, length {:.3}",
            self.strokes.len() + 1,
            stroke.raw_points().len(),
            stroke.arc_length(),
        );
        self.strokes.push(stroke);
    }

    /// Throws away the in-progress stroke, e.g. because a pan gesture started.
    pub fn cancel_drawing(&mut self) {
        if self.state == DrawState::Drawing {
            log::debug!("stroke cancelled");
            self.current.clear();
            self.state = DrawState::Idle;
        }
    }

    pub fn undo(&mut self) -> bool {
        match self.strokes.pop() {
            Some(stroke) => {
                self.redo.push(stroke);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.redo.pop() {
            Some(stroke) => {
                self.strokes.push(stroke);
                true
            }
            None => false,
        }
    }

    /// Removes every stroke, including redo history.
    pub fn clear(&mut self) {
        self.cancel_drawing();
        self.strokes.clear();
        self.redo.clear();
    }

    /// Finished strokes to draw this frame, in paint order.
    ///
    /// Strokes whose bounds miss `view` are culled. Dots have no mesh and
    /// therefore no meaningful bounds, so they are always kept.
    pub fn visible(&self, view: Aabb) -> impl Iterator<Item = &Stroke> + '_ {
        self.strokes
            .iter()
            .filter(move |s| s.is_dot() || s.bounds().intersects(&view))
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn strokes_mut(&mut self) -> &mut [Stroke] {
        &mut self.strokes
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn current(&self) -> &Stroke {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut Stroke {
        &mut self.current
    }

    pub fn state(&self) -> DrawState {
        self.state
    }

    pub fn tool(&self) -> ToolState {
        self.tool
    }

    /// Changes the brush color; an in-progress stroke is recolored too.
    pub fn set_color(&mut self, color: Vec3f) {
        self.tool.color = color;
        self.current.set_color(color);
    }

    /// Changes the brush thickness; an in-progress stroke picks it up too.
    pub fn set_thickness(&mut self, thickness: f64) {
        self.tool.thickness = thickness;
        self.current.set_thickness(thickness);
    }

    /// Takes effect from the next stroke on.
    pub fn set_eraser(&mut self, eraser: bool) {
        self.tool.eraser = eraser;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{vec2, vec3};

    fn canvas() -> Canvas {
        Canvas::new(ToolState {
            color: vec3(1.0, 0.0, 0.0),
            thickness: 1.0,
            eraser: false,
        })
    }

    fn draw_line(canvas: &mut Canvas, from: (f64, f64), to: (f64, f64)) {
        canvas.start_drawing(vec2(from.0, from.1));
        for i in 1..=10 {
            let t = i as f64 / 10.0;
            canvas.on_drawing(vec2(
                from.0 + (to.0 - from.0) * t,
                from.1 + (to.1 - from.1) * t,
            ));
        }
        canvas.end_drawing();
    }

    fn first_points(canvas: &Canvas) -> Vec<Vec2d> {
        canvas.strokes().iter().map(|s| s.raw_points()[0]).collect()
    }

    #[test]
    fn drawing_state_machine() {
        let mut canvas = canvas();
        assert_eq!(canvas.state(), DrawState::Idle);
        assert!(!canvas.on_drawing(vec2(1.0, 1.0)));

        canvas.start_drawing(vec2(0.0, 0.0));
        assert_eq!(canvas.state(), DrawState::Drawing);
        assert!(canvas.on_drawing(vec2(1.0, 0.0)));

        canvas.end_drawing();
        assert_eq!(canvas.state(), DrawState::Idle);
        assert_eq!(canvas.strokes().len(), 1);
        assert!(canvas.current().is_empty());
    }

    #[test]
    fn finished_stroke_is_meshed_and_bounded() {
        let mut canvas = canvas();
        draw_line(&mut canvas, (0.0, 0.0), (10.0, 0.0));
        let stroke = &canvas.strokes()[0];
        assert!(!stroke.vertices().is_empty());
        let middle = vec2(5.0, 0.0);
        assert!(stroke.bounds().intersects(&Aabb::new(middle, middle)));
    }

    #[test]
    fn single_point_stroke_is_kept() {
        let mut canvas = canvas();
        canvas.start_drawing(vec2(2.0, 2.0));
        canvas.end_drawing();
        assert_eq!(canvas.strokes().len(), 1);
        assert!(canvas.strokes()[0].is_dot());
        assert!(canvas.strokes()[0].vertices().is_empty());
    }

    #[test]
    fn end_without_start_is_a_noop() {
        let mut canvas = canvas();
        canvas.end_drawing();
        assert!(canvas.strokes().is_empty());
    }

    #[test]
    fn undo_then_redo_restores_order() {
        let mut canvas = canvas();
        draw_line(&mut canvas, (0.0, 0.0), (1.0, 0.0));
        draw_line(&mut canvas, (0.0, 5.0), (1.0, 5.0));
        draw_line(&mut canvas, (0.0, 9.0), (1.0, 9.0));
        let before = first_points(&canvas);

        assert!(canvas.undo());
        assert!(canvas.undo());
        assert_eq!(canvas.strokes().len(), 1);
        assert_eq!(canvas.redo_len(), 2);

        assert!(canvas.redo());
        assert!(canvas.redo());
        assert!(!canvas.redo());
        assert_eq!(first_points(&canvas), before);
    }

    #[test]
    fn undo_redo_on_empty_stacks_are_noops() {
        let mut canvas = canvas();
        assert!(!canvas.undo());
        assert!(!canvas.redo());
    }

    #[test]
    fn new_stroke_clears_redo() {
        let mut canvas = canvas();
        draw_line(&mut canvas, (0.0, 0.0), (1.0, 0.0));
        canvas.undo();
        assert_eq!(canvas.redo_len(), 1);

        canvas.start_drawing(vec2(3.0, 3.0));
        assert_eq!(canvas.redo_len(), 0);
        assert!(!canvas.redo());
    }

    #[test]
    fn pan_cancels_in_progress_stroke() {
        let mut canvas = canvas();
        canvas.start_drawing(vec2(0.0, 0.0));
        canvas.on_drawing(vec2(1.0, 0.0));
        canvas.cancel_drawing();

        assert_eq!(canvas.state(), DrawState::Idle);
        assert!(canvas.current().is_empty());
        canvas.end_drawing();
        assert!(canvas.strokes().is_empty());
    }

    #[test]
    fn culling_keeps_intersecting_strokes_and_dots() {
        let mut canvas = canvas();
        draw_line(&mut canvas, (0.0, 0.0), (1.0, 0.0));
        draw_line(&mut canvas, (100.0, 100.0), (101.0, 100.0));
        canvas.start_drawing(vec2(500.0, 500.0));
        canvas.end_drawing();

        let view = Aabb::new(vec2(-2.0, -2.0), vec2(2.0, 2.0));
        let visible: Vec<_> = canvas.visible(view).map(|s| s.raw_points()[0]).collect();
        let expected: [Vec2d; 2] = [vec2(0.0, 0.0), vec2(500.0, 500.0)];
        assert_eq!(visible, expected);
    }

    #[test]
    fn culling_counts_touching_boxes() {
        let mut canvas = canvas();
        draw_line(&mut canvas, (0.0, 0.0), (10.0, 0.0));
        let bounds = canvas.strokes()[0].bounds();

        let touching = Aabb::new(bounds.max, bounds.max + vec2(5.0, 5.0));
        assert_eq!(canvas.visible(touching).count(), 1);
    }

    #[test]
    fn tool_changes_apply_to_new_strokes() {
        let mut canvas = canvas();
        canvas.set_color(vec3(0.0, 1.0, 0.0));
        canvas.set_thickness(4.0);
        canvas.set_eraser(true);
        canvas.start_drawing(vec2(0.0, 0.0));

        let current = canvas.current();
        assert_eq!(current.color(), vec3(0.0, 1.0, 0.0));
        assert_eq!(current.thickness(), 4.0);
        assert!(current.is_eraser());
    }

    #[test]
    fn clear_drops_everything() {
        let mut canvas = canvas();
        draw_line(&mut canvas, (0.0, 0.0), (1.0, 0.0));
        draw_line(&mut canvas, (0.0, 1.0), (1.0, 1.0));
        canvas.undo();
        canvas.clear();
        assert!(canvas.strokes().is_empty());
        assert_eq!(canvas.redo_len(), 0);
    }
}
