//! Screen-space toolbar and its hit-test index.

use std::{cmp::Ordering, collections::BTreeMap};

use crate::{
    config::ToolbarConfig,
    math::{vec3, Vec3f},
};

/// Screen-space rectangle, in pixels from the top-left corner.
///
/// Ordered by `x`, then `y`, so it can key a sorted map. Width and height do
/// not take part in the ordering: two regions at the same corner are the same
/// key.
#[derive(Debug, Clone, Copy)]
pub struct HitRegion {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl HitRegion {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// Closed on all four edges.
    pub fn contains(&self, px: f64, py: f64) -> bool {
        (self.x..=self.right()).contains(&px) && (self.y..=self.bottom()).contains(&py)
    }
}

impl Ord for HitRegion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.x
            .total_cmp(&other.x)
            .then_with(|| self.y.total_cmp(&other.y))
    }
}

impl PartialOrd for HitRegion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HitRegion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HitRegion {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Pen,
    Eraser,
}

/// How an element is painted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fill {
    Color(Vec3f),
    Icon(Icon),
}

#[derive(Debug)]
pub struct UiElement<A> {
    pub name: String,
    pub region: HitRegion,
    pub fill: Fill,
    pub action: A,
}

/// Ordered map of clickable regions.
///
/// When regions overlap, the one with the greatest `(x, y)` key wins.
#[derive(Debug)]
pub struct UiIndex<A> {
    elements: BTreeMap<HitRegion, UiElement<A>>,
    /// Widest region seen so far; bounds how far back a query has to scan.
    max_width: f64,
}

impl<A> Default for UiIndex<A> {
    fn default() -> Self {
        Self {
            elements: BTreeMap::new(),
            max_width: 0.0,
        }
    }
}

impl<A> UiIndex<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an element. Returns `false`, keeping the existing one, if another
    /// element already sits at the same `(x, y)`.
    pub fn add_element(&mut self, element: UiElement<A>) -> bool {
        let region = element.region;
        if let Some(existing) = self.elements.get(&region) {
            log::warn!(
                "UI element `{}` at ({}, {}) collides with `{}`, ignoring it",
                element.name,
                region.x,
                region.y,
                existing.name,
            );
            return false;
        }

        self.max_width = self.max_width.max(region.w);
        self.elements.insert(region, element);
        true
    }

    /// Finds the topmost element containing the point.
    pub fn hit(&self, px: f64, py: f64) -> Option<&UiElement<A>> {
        // Greatest key with x <= px, whatever its y.
        let probe = HitRegion::new(px, f64::INFINITY, 0.0, 0.0);
        self.elements
            .range(..=probe)
            .rev()
            .take_while(|(region, _)| region.x + self.max_width >= px)
            .map(|(_, element)| element)
            .find(|element| element.region.contains(px, py))
    }

    /// Runs `on_hit` with the action of the element under the point.
    /// Returns whether the click was consumed.
    pub fn handle_click(&self, px: f64, py: f64, on_hit: impl FnOnce(&A)) -> bool {
        match self.hit(px, py) {
            Some(element) => {
                log::debug!("click on `{}`", element.name);
                on_hit(&element.action);
                true
            }
            None => false,
        }
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut UiElement<A>> {
        self.elements.values_mut().find(|e| e.name == name)
    }

    /// Elements in key order.
    pub fn iter(&self) -> impl Iterator<Item = &UiElement<A>> + '_ {
        self.elements.values()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UiAction {
    SetColor(Vec3f),
    ToggleEraser,
}

pub const TOOL_BUTTON: &str = "tool";

/// Palette swatches laid out in rows of `columns`, plus the pen/eraser button.
pub fn build_toolbar(config: &ToolbarConfig) -> UiIndex<UiAction> {
    let mut index = UiIndex::new();
    let step = config.box_size + config.padding;
    let [ox, oy] = config.origin;

    for (i, &[r, g, b]) in config.palette.iter().enumerate() {
        let col = (i % config.columns) as f64;
        let row = (i / config.columns) as f64;
        let color = vec3(r, g, b);
        index.add_element(UiElement {
            name: format!("color{i}"),
            region: HitRegion::new(
                ox + col * step,
                oy + row * step,
                config.box_size,
                config.box_size,
            ),
            fill: Fill::Color(color),
            action: UiAction::SetColor(color),
        });
    }

    let [tx, ty] = config.tool_button;
    index.add_element(UiElement {
        name: TOOL_BUTTON.to_string(),
        region: HitRegion::new(tx, ty, config.box_size, config.box_size),
        fill: Fill::Icon(Icon::Pen),
        action: UiAction::ToggleEraser,
    });

    index
}
