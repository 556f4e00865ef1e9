//! Incremental markdown rendering.
//!
//! A [`MarkdownRenderer`] accepts a reply as arbitrary text fragments and
//! drives a [`RenderTarget`] with block and span operations as soon as each
//! piece of structure is known. Nothing already emitted is ever revised, so a
//! target can paint output straight away.

mod html;
mod inline;
mod renderer;

pub use html::HtmlTarget;
pub use renderer::MarkdownRenderer;

use serde::{Deserialize, Serialize};

/// Kind of a block-level element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Paragraph,
    /// ATX heading, level 1 to 6
    Heading(u8),
    /// Fenced code block with its optional info string
    CodeBlock { language: Option<String> },
    BlockQuote,
    /// One item of a bullet (`ordered == false`) or numbered list
    ListItem { ordered: bool, number: Option<u64> },
    /// Thematic break (`---`)
    Rule,
}

/// Inline emphasis state of a span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanStyle {
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
}

/// A run of text sharing one style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub style: SpanStyle,
    /// Link destination when the text is a link label
    pub link: Option<String>,
}

/// Progress of the reply shown by a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderStatus {
    /// Request sent, nothing received yet
    Thinking,
    /// Text is arriving
    Streaming,
    /// The reply is complete
    Done,
    /// The role produced no reply; a failure marker was rendered
    Failed,
}

/// Receives the structure produced by a [`MarkdownRenderer`].
///
/// Calls arrive in document order. Blocks never nest: every `open_block` is
/// matched by a `close_block` before the next one opens. Adjacent spans may
/// share a style; targets decide whether to merge them.
pub trait RenderTarget: Send {
    fn set_status(&mut self, status: RenderStatus);

    fn open_block(&mut self, kind: &BlockKind);

    fn push_span(&mut self, span: &Span);

    /// Hard line break inside the current block.
    fn line_break(&mut self);

    fn close_block(&mut self, kind: &BlockKind);

    /// Discards everything rendered so far.
    ///
    /// Used when a partial stream is abandoned in favour of a fallback reply.
    fn reset(&mut self);
}
