//! Viewport primitives for streaming agent transcripts.
//!
//! Invariant: row geometry is owned by one [`VirtualList`] per scroll
//! container. Two views over the same transcript keep two lists, never a shared
//! scroll state.
//!
//! # Public API Overview
//! - [`VirtualList`] tracks estimated and measured row heights, answers which rows
//!   intersect the viewport (plus overscan), and implements the follow-tail
//!   auto-scroll policy.
//! - [`wrap_text`] and [`visible_width`] measure plain text in terminal columns so
//!   callers can turn a transcript row into a height.

pub mod text;
pub mod viewport;

/// Virtualized list geometry and scroll policy.
pub use crate::viewport::{
    ScrollBehavior, ScrollTarget, ViewportOptions, VirtualItem, VirtualList,
};

/// Grapheme-aware wrapping helper.
pub use crate::text::wrap_text;
/// Truncation helper.
pub use crate::text::truncate_to_width;
/// Visible width helper.
pub use crate::text::visible_width;
