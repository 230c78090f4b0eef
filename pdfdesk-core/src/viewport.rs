//! Scroll, zoom and layout state of the page view.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{PageSize, Rotation};

pub const MIN_ZOOM: f32 = 0.25;
pub const MAX_ZOOM: f32 = 4.0;
pub const ZOOM_PRESETS: [f32; 10] = [0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0, 2.5, 3.0, 4.0];

const ZOOM_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    SinglePage,
    #[default]
    Continuous,
    TwoPage,
}

impl ViewMode {
    pub fn next(self) -> Self {
        match self {
            ViewMode::SinglePage => ViewMode::Continuous,
            ViewMode::Continuous => ViewMode::TwoPage,
            ViewMode::TwoPage => ViewMode::SinglePage,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ViewMode::SinglePage => "single",
            ViewMode::Continuous => "continuous",
            ViewMode::TwoPage => "two-page",
        }
    }
}

/// A settled "current page" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageChange {
    pub page_index: usize,
    pub total: usize,
}

/// Where a page sits relative to the top-left corner of the viewport, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePlacement {
    pub page_index: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct ViewportSettings {
    pub page_gap: f32,
    pub lookahead_pages: usize,
    pub scroll_debounce: Duration,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            page_gap: 8.0,
            lookahead_pages: 1,
            scroll_debounce: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone)]
struct Row {
    top: f32,
    height: f32,
    width: f32,
    pages: Vec<usize>,
}

/// Maps scroll/zoom/rotation state to page positions, the required page set and the
/// debounced current page.
///
/// Layout units are pixels at the current zoom, one pixel per PDF point at 100%.
pub struct ViewportController {
    page_sizes: Vec<PageSize>,
    page_rotations: Vec<Rotation>,
    rotation: Rotation,
    zoom: f32,
    mode: ViewMode,
    width: f32,
    height: f32,
    scroll: f32,
    settings: ViewportSettings,
    rows: Vec<Row>,
    /// Page shown in single-page mode and target of the last explicit navigation.
    anchor: usize,
    /// Whether the current page follows `anchor` instead of the viewport center.
    navigated: bool,
    committed: usize,
    last_scroll: Option<Instant>,
}

impl ViewportController {
    pub fn new(page_sizes: Vec<PageSize>, settings: ViewportSettings) -> Self {
        let page_rotations = vec![Rotation::None; page_sizes.len()];
        let mut controller = Self {
            page_sizes,
            page_rotations,
            rotation: Rotation::None,
            zoom: 1.0,
            mode: ViewMode::default(),
            width: 0.0,
            height: 0.0,
            scroll: 0.0,
            settings,
            rows: Vec::new(),
            anchor: 0,
            navigated: false,
            committed: 0,
            last_scroll: None,
        };
        controller.relayout();
        controller
    }

    pub fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn view_mode(&self) -> ViewMode {
        self.mode
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll
    }

    pub fn viewport_size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    pub fn content_height(&self) -> f32 {
        self.rows.last().map_or(0.0, |row| row.top + row.height)
    }

    /// Rotation a page is rendered with: view rotation plus the page's own.
    pub fn effective_rotation(&self, page_index: usize) -> Rotation {
        let own = self
            .page_rotations
            .get(page_index)
            .copied()
            .unwrap_or_default();
        self.rotation.combine(own)
    }

    /// Page under the viewport center, or the last navigation target until the user scrolls.
    pub fn current_page(&self) -> usize {
        if self.mode == ViewMode::SinglePage || self.navigated {
            return self.anchor;
        }
        let center = self.scroll + self.height / 2.0;
        self.rows
            .get(self.row_at(center))
            .and_then(|row| row.pages.first().copied())
            .unwrap_or(0)
    }

    pub fn visible_pages(&self) -> Vec<usize> {
        let (first, last) = self.visible_rows();
        self.pages_in_rows(first, last).into_iter().collect()
    }

    /// Visible pages plus the look-ahead/behind buffer.
    pub fn required_pages(&self) -> BTreeSet<usize> {
        let count = self.page_count();
        if count == 0 {
            return BTreeSet::new();
        }
        let lookahead = self.settings.lookahead_pages;
        if self.mode == ViewMode::SinglePage {
            let first = self.anchor.saturating_sub(lookahead);
            let last = (self.anchor + lookahead).min(count - 1);
            return (first..=last).collect();
        }
        let (first, last) = self.visible_rows();
        let first = first.saturating_sub(lookahead);
        let last = (last + lookahead).min(self.rows.len().saturating_sub(1));
        self.pages_in_rows(first, last)
    }

    pub fn placements(&self) -> Vec<PagePlacement> {
        let (first, last) = self.visible_rows();
        let mut placements = Vec::new();
        for row in self.rows.iter().take(last + 1).skip(first) {
            let mut x = (self.width - row.width) / 2.0;
            for &page_index in &row.pages {
                let size = self.scaled_size(page_index);
                placements.push(PagePlacement {
                    page_index,
                    x,
                    y: row.top - self.scroll + (row.height - size.height) / 2.0,
                    width: size.width,
                    height: size.height,
                });
                x += size.width + self.settings.page_gap;
            }
        }
        placements
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.preserving_center(|viewport| {
            viewport.width = width.max(0.0);
            viewport.height = height.max(0.0);
        });
    }

    /// Scrolls to an absolute offset. The current-page signal waits for the debounce window.
    pub fn scroll_to(&mut self, offset: f32, now: Instant) {
        self.scroll = offset.clamp(0.0, self.max_scroll());
        self.navigated = false;
        self.last_scroll = Some(now);
    }

    pub fn scroll_by(&mut self, delta: f32, now: Instant) {
        self.scroll_to(self.scroll + delta, now);
    }

    /// Emits the settled current page once the scroll has been quiet for the debounce window.
    pub fn tick(&mut self, now: Instant) -> Option<PageChange> {
        if let Some(last) = self.last_scroll {
            if now.saturating_duration_since(last) < self.settings.scroll_debounce {
                return None;
            }
            self.last_scroll = None;
        }
        self.commit()
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        let zoom = if zoom.is_finite() {
            zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            1.0
        };
        if (zoom - self.zoom).abs() < f32::EPSILON {
            return;
        }
        debug!(from = self.zoom, to = zoom, "zoom changed");
        self.preserving_center(|viewport| viewport.zoom = zoom);
    }

    pub fn zoom_in(&mut self) {
        let next = ZOOM_PRESETS
            .iter()
            .copied()
            .find(|preset| *preset > self.zoom + ZOOM_EPSILON)
            .unwrap_or(MAX_ZOOM);
        self.set_zoom(next);
    }

    pub fn zoom_out(&mut self) {
        let next = ZOOM_PRESETS
            .iter()
            .rev()
            .copied()
            .find(|preset| *preset < self.zoom - ZOOM_EPSILON)
            .unwrap_or(MIN_ZOOM);
        self.set_zoom(next);
    }

    pub fn reset_zoom(&mut self) {
        self.set_zoom(1.0);
    }

    /// Zooms so the current row fills the viewport width.
    pub fn fit_width(&mut self) {
        let Some((width, _)) = self.current_row_extent() else {
            return;
        };
        if width > 0.0 && self.width > 0.0 {
            self.set_zoom(self.width / width);
        }
    }

    /// Zooms so the whole current row is visible.
    pub fn fit_page(&mut self) {
        let Some((width, height)) = self.current_row_extent() else {
            return;
        };
        if width > 0.0 && height > 0.0 && self.width > 0.0 && self.height > 0.0 {
            self.set_zoom((self.width / width).min(self.height / height));
        }
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.preserving_center(|viewport| viewport.rotation = rotation);
    }

    pub fn rotate_clockwise(&mut self) {
        self.set_rotation(self.rotation.clockwise());
    }

    pub fn rotate_counter_clockwise(&mut self) {
        self.set_rotation(self.rotation.counter_clockwise());
    }

    /// Mirrors a page-level rotation stored in the document.
    pub fn set_page_rotation(&mut self, page_index: usize, rotation: Rotation) {
        if page_index >= self.page_rotations.len() {
            return;
        }
        self.preserving_center(|viewport| viewport.page_rotations[page_index] = rotation);
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        if mode == self.mode {
            return;
        }
        let current = self.current_page();
        self.anchor = current;
        self.preserving_center(|viewport| viewport.mode = mode);
    }

    /// Jumps to `page_index` (clamped) and commits the change without debouncing.
    pub fn go_to_page(&mut self, page_index: usize) -> Option<PageChange> {
        let count = self.page_count();
        if count == 0 {
            return None;
        }
        let target = page_index.min(count - 1);
        self.anchor = target;
        self.navigated = true;
        self.last_scroll = None;
        if self.mode == ViewMode::SinglePage {
            self.relayout();
            self.scroll = 0.0;
        } else if let Some(row) = self.row_of_page(target) {
            self.scroll = self.rows[row].top.min(self.max_scroll());
        }
        self.commit()
    }

    pub fn next_page(&mut self, count: usize) -> Option<PageChange> {
        let step = count.max(1) * self.pages_per_step();
        self.go_to_page(self.current_page().saturating_add(step))
    }

    pub fn prev_page(&mut self, count: usize) -> Option<PageChange> {
        let step = count.max(1) * self.pages_per_step();
        self.go_to_page(self.current_page().saturating_sub(step))
    }

    pub fn first_page(&mut self) -> Option<PageChange> {
        self.go_to_page(0)
    }

    pub fn last_page(&mut self) -> Option<PageChange> {
        self.go_to_page(self.page_count().saturating_sub(1))
    }

    fn pages_per_step(&self) -> usize {
        if self.mode == ViewMode::TwoPage {
            2
        } else {
            1
        }
    }

    fn commit(&mut self) -> Option<PageChange> {
        let total = self.page_count();
        if total == 0 {
            return None;
        }
        let page_index = self.current_page();
        if page_index == self.committed {
            return None;
        }
        self.committed = page_index;
        debug!(page_index, total, "current page settled");
        Some(PageChange { page_index, total })
    }

    /// Applies a layout-changing update while keeping the same spot of the current page
    /// under the viewport center.
    fn preserving_center<F>(&mut self, update: F)
    where
        F: FnOnce(&mut Self),
    {
        let page = self.current_page();
        let fraction = self.row_of_page(page).and_then(|row| {
            let row = &self.rows[row];
            let center = self.scroll + self.height / 2.0;
            if self.navigated || row.height <= 0.0 {
                None
            } else {
                Some(((center - row.top) / row.height).clamp(0.0, 1.0))
            }
        });

        update(self);
        self.relayout();

        if let Some(row) = self.row_of_page(page) {
            let row = &self.rows[row];
            let offset = match fraction {
                Some(fraction) => row.top + fraction * row.height - self.height / 2.0,
                None => row.top,
            };
            self.scroll = offset.clamp(0.0, self.max_scroll());
        } else {
            self.scroll = self.scroll.clamp(0.0, self.max_scroll());
        }
    }

    fn relayout(&mut self) {
        let count = self.page_count();
        let groups: Vec<Vec<usize>> = match self.mode {
            ViewMode::SinglePage if count > 0 => vec![vec![self.anchor.min(count - 1)]],
            ViewMode::SinglePage => Vec::new(),
            ViewMode::Continuous => (0..count).map(|page| vec![page]).collect(),
            ViewMode::TwoPage => (0..count)
                .step_by(2)
                .map(|page| (page..(page + 2).min(count)).collect())
                .collect(),
        };

        self.rows.clear();
        let mut top = 0.0;
        for pages in groups {
            let sizes: Vec<PageSize> = pages.iter().map(|page| self.scaled_size(*page)).collect();
            let height = sizes.iter().map(|size| size.height).fold(0.0, f32::max);
            let width = sizes.iter().map(|size| size.width).sum::<f32>()
                + self.settings.page_gap * (sizes.len().saturating_sub(1)) as f32;
            self.rows.push(Row {
                top,
                height,
                width,
                pages,
            });
            top += height + self.settings.page_gap;
        }
    }

    fn scaled_size(&self, page_index: usize) -> PageSize {
        let size = self
            .page_sizes
            .get(page_index)
            .copied()
            .unwrap_or(PageSize::new(0.0, 0.0))
            .rotated(self.effective_rotation(page_index));
        PageSize::new(size.width * self.zoom, size.height * self.zoom)
    }

    /// Unzoomed extent of the row holding the current page.
    fn current_row_extent(&self) -> Option<(f32, f32)> {
        let row = &self.rows[self.row_of_page(self.current_page())?];
        Some((row.width / self.zoom, row.height / self.zoom))
    }

    fn max_scroll(&self) -> f32 {
        (self.content_height() - self.height).max(0.0)
    }

    fn row_of_page(&self, page_index: usize) -> Option<usize> {
        self.rows.iter().position(|row| row.pages.contains(&page_index))
    }

    fn row_at(&self, y: f32) -> usize {
        self.rows
            .partition_point(|row| row.top <= y)
            .saturating_sub(1)
    }

    fn visible_rows(&self) -> (usize, usize) {
        let first = self.row_at(self.scroll);
        let last = self.row_at(self.scroll + self.height.max(1.0));
        (first, last.max(first))
    }

    fn pages_in_rows(&self, first: usize, last: usize) -> BTreeSet<usize> {
        self.rows
            .iter()
            .take(last + 1)
            .skip(first)
            .flat_map(|row| row.pages.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letter(count: usize) -> ViewportController {
        let mut viewport = ViewportController::new(
            vec![PageSize::new(600.0, 800.0); count],
            ViewportSettings {
                page_gap: 10.0,
                ..ViewportSettings::default()
            },
        );
        viewport.resize(600.0, 400.0);
        viewport
    }

    #[test]
    fn settled_scroll_commits_once() {
        let mut viewport = letter(3);
        let start = Instant::now();
        // Three quick scroll events towards the last page.
        for (step, offset) in [500.0, 1200.0, 1800.0].into_iter().enumerate() {
            viewport.scroll_to(offset, start + Duration::from_millis(step as u64 * 50));
        }
        assert_eq!(viewport.tick(start + Duration::from_millis(200)), None);
        assert_eq!(
            viewport.tick(start + Duration::from_millis(400)),
            Some(PageChange {
                page_index: 2,
                total: 3
            })
        );
        assert_eq!(viewport.tick(start + Duration::from_millis(900)), None);
    }

    #[test]
    fn scrolling_back_to_the_same_page_is_silent() {
        let mut viewport = letter(3);
        let start = Instant::now();
        viewport.scroll_to(1000.0, start);
        viewport.scroll_to(0.0, start + Duration::from_millis(100));
        assert_eq!(viewport.tick(start + Duration::from_secs(1)), None);
    }

    #[test]
    fn required_pages_include_lookahead() {
        let mut viewport = letter(10);
        viewport.go_to_page(4);
        assert_eq!(viewport.visible_pages(), vec![4]);
        assert_eq!(
            viewport.required_pages(),
            BTreeSet::from([3, 4, 5])
        );
        viewport.first_page();
        assert_eq!(viewport.required_pages(), BTreeSet::from([0, 1]));
    }

    #[test]
    fn zoom_keeps_the_centered_page() {
        let mut viewport = letter(20);
        let now = Instant::now();
        viewport.scroll_to(7.0 * 810.0 + 100.0, now);
        assert_eq!(viewport.current_page(), 7);
        viewport.set_zoom(1.5);
        assert_eq!(viewport.current_page(), 7);
        viewport.zoom_out();
        viewport.zoom_out();
        assert_eq!(viewport.current_page(), 7);
        assert!((viewport.zoom() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zoom_steps_through_presets_and_clamps() {
        let mut viewport = letter(1);
        viewport.zoom_in();
        assert!((viewport.zoom() - 1.25).abs() < 1e-6);
        viewport.set_zoom(1.1);
        viewport.zoom_in();
        assert!((viewport.zoom() - 1.25).abs() < 1e-6);
        viewport.set_zoom(10.0);
        assert_eq!(viewport.zoom(), MAX_ZOOM);
        viewport.zoom_in();
        assert_eq!(viewport.zoom(), MAX_ZOOM);
        viewport.set_zoom(0.3);
        viewport.zoom_out();
        assert_eq!(viewport.zoom(), MIN_ZOOM);
        viewport.reset_zoom();
        assert_eq!(viewport.zoom(), 1.0);
    }

    #[test]
    fn navigation_commits_immediately_and_clamps() {
        let mut viewport = letter(5);
        assert_eq!(
            viewport.next_page(2),
            Some(PageChange {
                page_index: 2,
                total: 5
            })
        );
        assert_eq!(viewport.next_page(1).map(|change| change.page_index), Some(3));
        assert_eq!(viewport.go_to_page(99).map(|change| change.page_index), Some(4));
        assert_eq!(viewport.last_page(), None);
        assert_eq!(viewport.prev_page(10).map(|change| change.page_index), Some(0));
    }

    #[test]
    fn quarter_rotation_swaps_fit_width() {
        let mut viewport = letter(1);
        viewport.fit_width();
        assert!((viewport.zoom() - 1.0).abs() < 1e-6);
        viewport.rotate_clockwise();
        viewport.fit_width();
        assert!((viewport.zoom() - 0.75).abs() < 1e-6);
        assert_eq!(viewport.effective_rotation(0), Rotation::Quarter);
    }

    #[test]
    fn fit_page_shows_the_whole_page() {
        let mut viewport = letter(2);
        viewport.fit_page();
        assert!((viewport.zoom() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn page_rotation_combines_with_view_rotation() {
        let mut viewport = letter(2);
        viewport.set_page_rotation(1, Rotation::Quarter);
        viewport.rotate_clockwise();
        assert_eq!(viewport.effective_rotation(0), Rotation::Quarter);
        assert_eq!(viewport.effective_rotation(1), Rotation::Half);
    }

    #[test]
    fn two_page_mode_pairs_pages() {
        let mut viewport = letter(5);
        viewport.set_view_mode(ViewMode::TwoPage);
        assert_eq!(viewport.visible_pages(), vec![0, 1]);
        let placements = viewport.placements();
        assert_eq!(placements.len(), 2);
        assert!(placements[1].x > placements[0].x);
        assert_eq!(viewport.next_page(1).map(|change| change.page_index), Some(2));
        assert_eq!(
            viewport.required_pages(),
            BTreeSet::from([0, 1, 2, 3, 4])
        );
    }

    #[test]
    fn single_page_mode_lays_out_only_the_current_page() {
        let mut viewport = letter(4);
        viewport.go_to_page(2);
        viewport.set_view_mode(ViewMode::SinglePage);
        assert_eq!(viewport.current_page(), 2);
        assert_eq!(viewport.visible_pages(), vec![2]);
        assert_eq!(viewport.required_pages(), BTreeSet::from([1, 2, 3]));
        assert_eq!(viewport.content_height(), 800.0);
        assert_eq!(viewport.next_page(1).map(|change| change.page_index), Some(3));
        assert_eq!(viewport.visible_pages(), vec![3]);
    }

    #[test]
    fn empty_documents_have_no_pages() {
        let mut viewport = ViewportController::new(Vec::new(), ViewportSettings::default());
        assert!(viewport.required_pages().is_empty());
        assert_eq!(viewport.go_to_page(3), None);
        assert_eq!(viewport.tick(Instant::now()), None);
    }
}
