//! Virtualized list geometry with follow-tail scrolling.
//!
//! Rows start at an estimated height and switch to their measured height once
//! rendered. Offsets are prefix sums over the effective heights and are kept
//! current on every measurement, so range queries are a binary search.
//!
//! Auto-scroll is a single `user_has_scrolled` flag: scroll events away from the
//! bottom set it, returning within the bottom tolerance clears it, and new rows
//! only move the viewport while it is clear.

use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportOptions {
    /// Height assumed for rows that have not been measured yet.
    pub estimated_row_height: u32,
    /// Rows materialized on each side of the visible range.
    pub overscan: usize,
    /// Distance from the bottom below which the viewport counts as "at bottom".
    pub bottom_tolerance: u32,
}

impl Default for ViewportOptions {
    fn default() -> Self {
        Self {
            estimated_row_height: 6,
            overscan: 5,
            bottom_tolerance: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    Instant,
    Smooth,
}

/// Scroll request produced when the list moves to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollTarget {
    pub index: usize,
    /// Offset of the target row's top edge.
    pub item_offset: u32,
    /// Resolved scroll position (row aligned to the viewport's bottom edge).
    pub scroll_top: u32,
    pub behavior: ScrollBehavior,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualItem {
    pub index: usize,
    pub offset: u32,
    pub height: u32,
    pub measured: bool,
}

#[derive(Debug, Clone)]
pub struct VirtualList {
    options: ViewportOptions,
    measured: Vec<Option<u32>>,
    // offsets[i] is the top of row i; offsets[len] is the total height.
    offsets: Vec<u32>,
    viewport_height: u32,
    scroll_top: u32,
    user_has_scrolled: bool,
    last_target: Option<ScrollTarget>,
}

impl Default for VirtualList {
    fn default() -> Self {
        Self::new(ViewportOptions::default())
    }
}

impl VirtualList {
    pub fn new(options: ViewportOptions) -> Self {
        Self {
            options: ViewportOptions {
                estimated_row_height: options.estimated_row_height.max(1),
                overscan: options.overscan,
                bottom_tolerance: options.bottom_tolerance.max(1),
            },
            measured: Vec::new(),
            offsets: vec![0],
            viewport_height: 0,
            scroll_top: 0,
            user_has_scrolled: false,
            last_target: None,
        }
    }

    pub fn options(&self) -> ViewportOptions {
        self.options
    }

    pub fn len(&self) -> usize {
        self.measured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measured.is_empty()
    }

    pub fn viewport_height(&self) -> u32 {
        self.viewport_height
    }

    pub fn scroll_top(&self) -> u32 {
        self.scroll_top
    }

    pub fn user_has_scrolled(&self) -> bool {
        self.user_has_scrolled
    }

    pub fn total_height(&self) -> u32 {
        self.offsets[self.measured.len()]
    }

    pub fn max_scroll_top(&self) -> u32 {
        self.total_height().saturating_sub(self.viewport_height)
    }

    pub fn offset_of(&self, index: usize) -> Option<u32> {
        (index < self.measured.len()).then(|| self.offsets[index])
    }

    pub fn height_of(&self, index: usize) -> Option<u32> {
        self.measured
            .get(index)
            .map(|measured| measured.unwrap_or(self.options.estimated_row_height))
    }

    pub fn is_measured(&self, index: usize) -> bool {
        self.measured.get(index).is_some_and(Option::is_some)
    }

    /// Distance between the viewport's bottom edge and the end of the content.
    pub fn distance_from_bottom(&self) -> u32 {
        self.total_height()
            .saturating_sub(self.scroll_top)
            .saturating_sub(self.viewport_height)
    }

    pub fn is_at_bottom(&self) -> bool {
        self.distance_from_bottom() < self.options.bottom_tolerance
    }

    /// Grows or shrinks the row count. New rows start unmeasured.
    pub fn set_count(&mut self, count: usize) {
        let previous = self.measured.len();
        if count == previous {
            return;
        }

        self.measured.resize(count, None);
        self.rebuild_offsets_from(previous.min(count));
        self.clamp_scroll_top();
    }

    pub fn set_viewport_height(&mut self, height: u32) {
        self.viewport_height = height;
        self.clamp_scroll_top();
        self.pin_to_bottom_if_following();
    }

    /// Records the rendered height of a row. Returns whether layout changed.
    pub fn measure(&mut self, index: usize, height: u32) -> bool {
        let Some(slot) = self.measured.get_mut(index) else {
            return false;
        };
        if *slot == Some(height) {
            return false;
        }

        *slot = Some(height);
        self.rebuild_offsets_from(index);
        self.clamp_scroll_top();
        self.pin_to_bottom_if_following();
        true
    }

    /// Drops a row's measurement so the next render measures it again.
    pub fn invalidate(&mut self, index: usize) {
        let Some(slot) = self.measured.get_mut(index) else {
            return;
        };
        if slot.take().is_some() {
            self.rebuild_offsets_from(index);
            self.clamp_scroll_top();
        }
    }

    pub fn invalidate_all(&mut self) {
        self.measured.iter_mut().for_each(|slot| *slot = None);
        self.rebuild_offsets_from(0);
        self.clamp_scroll_top();
        self.pin_to_bottom_if_following();
    }

    /// Applies a scroll event coming from the view.
    pub fn on_scroll(&mut self, scroll_top: u32) {
        self.scroll_top = scroll_top.min(self.max_scroll_top());
        self.user_has_scrolled = !self.is_at_bottom();
    }

    /// Updates the row count after new rows arrived and, unless the user has
    /// scrolled away, scrolls to the last row. The first follow jumps; later
    /// ones animate.
    pub fn on_items_appended(&mut self, count: usize) -> Option<ScrollTarget> {
        self.set_count(count);
        if count == 0 || self.user_has_scrolled {
            return None;
        }

        let behavior = if self.last_target.is_some() {
            ScrollBehavior::Smooth
        } else {
            ScrollBehavior::Instant
        };
        self.scroll_to_index(count - 1, behavior)
    }

    /// Scrolls so that row `index` ends at the viewport's bottom edge.
    pub fn scroll_to_index(&mut self, index: usize, behavior: ScrollBehavior) -> Option<ScrollTarget> {
        let item_offset = self.offset_of(index)?;
        let item_end = self.offsets[index + 1];
        let scroll_top = item_end
            .saturating_sub(self.viewport_height)
            .min(self.max_scroll_top());

        self.scroll_top = scroll_top;
        let target = ScrollTarget {
            index,
            item_offset,
            scroll_top,
            behavior,
        };
        self.last_target = Some(target);
        Some(target)
    }

    /// Contiguous index range to materialize: the visible rows plus overscan.
    pub fn range(&self) -> Option<RangeInclusive<usize>> {
        let count = self.measured.len();
        if count == 0 {
            return None;
        }

        let first = self.row_at(self.scroll_top);
        let viewport_end = self
            .scroll_top
            .saturating_add(self.viewport_height.saturating_sub(1));
        let last = self.row_at(viewport_end).max(first);

        let lo = first.saturating_sub(self.options.overscan);
        let hi = last.saturating_add(self.options.overscan).min(count - 1);
        Some(lo..=hi)
    }

    pub fn virtual_items(&self) -> Vec<VirtualItem> {
        let Some(range) = self.range() else {
            return Vec::new();
        };

        range
            .map(|index| VirtualItem {
                index,
                offset: self.offsets[index],
                height: self.offsets[index + 1] - self.offsets[index],
                measured: self.is_measured(index),
            })
            .collect()
    }

    fn row_at(&self, position: u32) -> usize {
        let count = self.measured.len();
        // First offset strictly greater than `position`, minus one.
        let upper = self.offsets[..count].partition_point(|offset| *offset <= position);
        upper.saturating_sub(1).min(count.saturating_sub(1))
    }

    fn rebuild_offsets_from(&mut self, start: usize) {
        let count = self.measured.len();
        self.offsets.truncate(start + 1);
        let mut running = self.offsets[start];
        for index in start..count {
            let height = self.measured[index].unwrap_or(self.options.estimated_row_height);
            running = running.saturating_add(height);
            self.offsets.push(running);
        }
    }

    fn clamp_scroll_top(&mut self) {
        self.scroll_top = self.scroll_top.min(self.max_scroll_top());
    }

    fn pin_to_bottom_if_following(&mut self) {
        if !self.user_has_scrolled && self.last_target.is_some() {
            self.scroll_top = self.max_scroll_top();
        }
    }
}
