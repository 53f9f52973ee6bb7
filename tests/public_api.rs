#![allow(unused_imports)]

use runview::text::grapheme_width;
use runview::{
    truncate_to_width, visible_width, wrap_text, ScrollBehavior, ScrollTarget, ViewportOptions, VirtualItem,
    VirtualList,
};

#[test]
fn public_api_exports_compile() {}
