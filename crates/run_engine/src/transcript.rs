//! Virtualized transcript views over a session's message log.

use runview::{ScrollTarget, ViewportOptions, VirtualList};
use stream_protocol::RunId;

use crate::config::EngineConfig;
use crate::message_log::MessageLog;
use crate::render::render_message;
use crate::session::ExecutionSession;
use crate::visibility::DisplayFilter;

const MEASURE_PASSES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRow {
    /// Index into the message log.
    pub message_index: usize,
    /// Top edge of the row within the full transcript.
    pub offset: u32,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptFrame {
    /// Nothing to show and nothing running.
    Empty,
    /// Running but no displayable message yet.
    Loading,
    Rows {
        rows: Vec<RenderedRow>,
        scroll_top: u32,
        total_height: u32,
    },
}

/// One scroll container with its own measurements and follow-tail state.
#[derive(Debug, Clone)]
pub struct TranscriptView {
    options: ViewportOptions,
    list: VirtualList,
    filter: DisplayFilter,
    generation: Option<u64>,
    width: usize,
}

impl TranscriptView {
    pub fn new(options: ViewportOptions, width: usize) -> Self {
        Self {
            options,
            list: VirtualList::new(options),
            filter: DisplayFilter::new(),
            generation: None,
            width: width.max(1),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.viewport_options(), config.transcript_width)
    }

    pub fn list(&self) -> &VirtualList {
        &self.list
    }

    pub fn filter(&self) -> &DisplayFilter {
        &self.filter
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn user_has_scrolled(&self) -> bool {
        self.list.user_has_scrolled()
    }

    /// Resizes the viewport. A width change drops every row measurement.
    pub fn set_viewport(&mut self, height: u32, width: usize) {
        let width = width.max(1);
        if width != self.width {
            self.width = width;
            self.list.invalidate_all();
        }
        self.list.set_viewport_height(height);
    }

    pub fn on_scroll(&mut self, scroll_top: u32) {
        self.list.on_scroll(scroll_top);
    }

    /// Picks up new displayable messages. Returns the follow-tail scroll, if any.
    ///
    /// A log from a different run resets the view, including its scroll state.
    pub fn sync(&mut self, log: &MessageLog) -> Option<ScrollTarget> {
        if self.generation != Some(log.generation()) {
            self.generation = Some(log.generation());
            let viewport_height = self.list.viewport_height();
            self.list = VirtualList::new(self.options);
            self.list.set_viewport_height(viewport_height);
        }

        if !self.filter.sync(log) {
            return None;
        }
        self.list.on_items_appended(self.filter.len())
    }

    /// Renders the rows currently in the window, measuring them first.
    pub fn frame(&mut self, log: &MessageLog, running: bool) -> TranscriptFrame {
        self.sync(log);
        if self.filter.is_empty() {
            return if running {
                TranscriptFrame::Loading
            } else {
                TranscriptFrame::Empty
            };
        }

        // Measuring can move the window; settle it before rendering.
        for _ in 0..MEASURE_PASSES {
            let mut changed = false;
            for item in self.list.virtual_items() {
                if item.measured {
                    continue;
                }
                let lines = render_row(log, &self.filter, item.index, self.width);
                changed |= self.list.measure(item.index, height_of(&lines));
            }
            if !changed {
                break;
            }
        }

        let rows = self
            .list
            .virtual_items()
            .into_iter()
            .map(|item| RenderedRow {
                message_index: self.filter.indices()[item.index],
                offset: item.offset,
                lines: render_row(log, &self.filter, item.index, self.width),
            })
            .collect();

        TranscriptFrame::Rows {
            rows,
            scroll_top: self.list.scroll_top(),
            total_height: self.list.total_height(),
        }
    }
}

fn render_row(log: &MessageLog, filter: &DisplayFilter, row: usize, width: usize) -> Vec<String> {
    render_message(log, filter.indices()[row], width)
}

fn height_of(lines: &[String]) -> u32 {
    u32::try_from(lines.len()).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Normal,
    Fullscreen,
}

/// The run page: a normal and a fullscreen transcript over the same log.
#[derive(Debug, Clone)]
pub struct RunScreen {
    normal: TranscriptView,
    fullscreen: TranscriptView,
    mode: ViewMode,
}

/// Follow-tail scrolls produced by one [`RunScreen::sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenSync {
    pub normal: Option<ScrollTarget>,
    pub fullscreen: Option<ScrollTarget>,
}

impl RunScreen {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            normal: TranscriptView::from_config(config),
            fullscreen: TranscriptView::from_config(config),
            mode: ViewMode::Normal,
        }
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn toggle_fullscreen(&mut self) -> ViewMode {
        self.mode = match self.mode {
            ViewMode::Normal => ViewMode::Fullscreen,
            ViewMode::Fullscreen => ViewMode::Normal,
        };
        self.mode
    }

    pub fn normal(&self) -> &TranscriptView {
        &self.normal
    }

    pub fn normal_mut(&mut self) -> &mut TranscriptView {
        &mut self.normal
    }

    pub fn fullscreen(&self) -> &TranscriptView {
        &self.fullscreen
    }

    pub fn fullscreen_mut(&mut self) -> &mut TranscriptView {
        &mut self.fullscreen
    }

    pub fn active_mut(&mut self) -> &mut TranscriptView {
        match self.mode {
            ViewMode::Normal => &mut self.normal,
            ViewMode::Fullscreen => &mut self.fullscreen,
        }
    }

    /// Scroll event from whichever view is showing.
    pub fn on_scroll(&mut self, scroll_top: u32) {
        self.active_mut().on_scroll(scroll_top);
    }

    /// Syncs both views, shown or not, with the session's log.
    pub fn sync(&mut self, session: &ExecutionSession) -> ScreenSync {
        ScreenSync {
            normal: self.normal.sync(session.log()),
            fullscreen: self.fullscreen.sync(session.log()),
        }
    }

    pub fn frame(&mut self, session: &ExecutionSession) -> TranscriptFrame {
        let running = session.is_running();
        self.active_mut().frame(session.log(), running)
    }

    /// One-line status: state, run, elapsed time, tokens, and any error.
    pub fn status_line(session: &ExecutionSession) -> String {
        let run = session
            .run_id()
            .map_or_else(|| "-".to_string(), |run_id: RunId| run_id.to_string());
        let mut status = format!(
            "{:?} | run {run} | {}s | {} tokens",
            session.state(),
            session.elapsed_seconds(),
            session.tokens_used()
        );
        if let Some(error) = session.error() {
            status.push_str(" | ");
            status.push_str(error);
        }
        status
    }
}
