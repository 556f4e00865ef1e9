use super::inline::InlineParser;
use super::{BlockKind, RenderStatus, RenderTarget, Span, SpanStyle};

/// What the rest of the current source line feeds once its kind is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineMode {
    Inline,
    Code,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LineKind {
    Blank,
    Text { start: usize },
    Heading { level: u8, start: usize },
    Quote { start: usize },
    ListItem { ordered: bool, number: Option<u64>, start: usize },
    Rule,
    FenceOpen { language: Option<String> },
    FenceClose,
    CodeLine,
}

/// Streams one reply into a [`RenderTarget`].
///
/// The start of each line is held until its block kind is decided (a `#`
/// could open a heading or be plain text); from then on the line is passed
/// through as it arrives. Feeding the same text in any chunking produces the
/// same sequence of target operations, up to how text is split into spans.
pub struct MarkdownRenderer<'t> {
    target: &'t mut dyn RenderTarget,
    line: String,
    mode: Option<LineMode>,
    block: Option<BlockKind>,
    inline: InlineParser,
    in_fence: bool,
    code: String,
    code_lines: usize,
    streaming: bool,
}

impl<'t> MarkdownRenderer<'t> {
    pub fn new(target: &'t mut dyn RenderTarget) -> Self {
        Self {
            target,
            line: String::new(),
            mode: None,
            block: None,
            inline: InlineParser::default(),
            in_fence: false,
            code: String::new(),
            code_lines: 0,
            streaming: false,
        }
    }

    /// Feeds the next fragment of the reply.
    pub fn write(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        if !self.streaming {
            self.streaming = true;
            self.target.set_status(RenderStatus::Streaming);
        }
        for c in fragment.chars() {
            self.push_char(c);
        }
        self.inline.flush(self.target);
        self.flush_code();
    }

    /// Completes the reply and marks the target done.
    pub fn end(mut self) {
        if !self.line.is_empty() || self.mode.is_some() {
            self.end_line();
        }
        self.close_block();
        self.in_fence = false;
        self.target.set_status(RenderStatus::Done);
    }

    /// Completes the reply with a failure marker instead of content.
    pub fn fail(mut self, marker: &str) {
        if !self.line.is_empty() || self.mode.is_some() {
            self.end_line();
        }
        self.close_block();
        self.open_block(BlockKind::Paragraph);
        self.target.push_span(&Span {
            text: marker.to_string(),
            style: SpanStyle::default(),
            link: None,
        });
        self.close_block();
        self.target.set_status(RenderStatus::Failed);
    }

    /// Abandons the reply and clears the target.
    pub fn abort(self) {
        self.target.reset();
    }

    fn push_char(&mut self, c: char) {
        match c {
            '\r' => {}
            '\n' => self.end_line(),
            _ => match self.mode {
                Some(LineMode::Inline) => self.inline.push(c, self.target),
                Some(LineMode::Code) => self.code.push(c),
                None => {
                    self.line.push(c);
                    self.classify(false);
                }
            },
        }
    }

    fn classify(&mut self, complete: bool) {
        let kind = if self.in_fence {
            classify_code_line(&self.line, complete)
        } else {
            classify_line(&self.line, complete)
        };
        if let Some(kind) = kind {
            self.apply(kind);
        }
    }

    fn apply(&mut self, kind: LineKind) {
        let line = std::mem::take(&mut self.line);
        match kind {
            LineKind::Blank => self.close_block(),
            LineKind::Rule => {
                self.close_block();
                self.target.open_block(&BlockKind::Rule);
                self.target.close_block(&BlockKind::Rule);
            }
            LineKind::FenceOpen { language } => {
                self.close_block();
                self.open_block(BlockKind::CodeBlock { language });
                self.in_fence = true;
                self.code_lines = 0;
            }
            LineKind::FenceClose => {
                self.close_block();
                self.in_fence = false;
            }
            LineKind::CodeLine => {
                if self.code_lines > 0 {
                    self.flush_code();
                    self.target.line_break();
                }
                self.code_lines += 1;
                self.code.push_str(&line);
                self.mode = Some(LineMode::Code);
            }
            LineKind::Heading { level, start } => {
                self.close_block();
                self.open_block(BlockKind::Heading(level));
                self.feed_inline(&line[start..]);
            }
            LineKind::Quote { start } => {
                if matches!(self.block, Some(BlockKind::BlockQuote)) {
                    self.target.line_break();
                } else {
                    self.close_block();
                    self.open_block(BlockKind::BlockQuote);
                }
                self.feed_inline(&line[start..]);
            }
            LineKind::ListItem {
                ordered,
                number,
                start,
            } => {
                self.close_block();
                self.open_block(BlockKind::ListItem { ordered, number });
                self.feed_inline(&line[start..]);
            }
            LineKind::Text { start } => {
                let continues = matches!(
                    self.block,
                    Some(BlockKind::Paragraph | BlockKind::BlockQuote | BlockKind::ListItem { .. })
                );
                if continues {
                    self.target.line_break();
                } else {
                    self.close_block();
                    self.open_block(BlockKind::Paragraph);
                }
                self.feed_inline(&line[start..]);
            }
        }
    }

    fn feed_inline(&mut self, text: &str) {
        self.mode = Some(LineMode::Inline);
        for c in text.chars() {
            self.inline.push(c, self.target);
        }
    }

    fn end_line(&mut self) {
        if self.mode.is_none() {
            self.classify(true);
        }
        match self.mode.take() {
            Some(LineMode::Inline) => {
                self.inline.end_line(self.target);
                if matches!(self.block, Some(BlockKind::Heading(_))) {
                    self.close_block();
                }
            }
            Some(LineMode::Code) => self.flush_code(),
            None => {}
        }
        self.line.clear();
    }

    fn open_block(&mut self, kind: BlockKind) {
        self.target.open_block(&kind);
        self.block = Some(kind);
    }

    fn close_block(&mut self) {
        if let Some(kind) = self.block.take() {
            self.inline.finish(self.target);
            self.flush_code();
            self.target.close_block(&kind);
        }
    }

    fn flush_code(&mut self) {
        if !self.code.is_empty() {
            self.target.push_span(&Span {
                text: std::mem::take(&mut self.code),
                style: SpanStyle {
                    code: true,
                    ..SpanStyle::default()
                },
                link: None,
            });
        }
    }
}

/// Decides the block kind of a line outside a code fence.
///
/// Returns `None` while the held prefix could still mean more than one
/// thing; with `complete` set the answer is always `Some`.
fn classify_line(line: &str, complete: bool) -> Option<LineKind> {
    let body = line.trim_start_matches([' ', '\t']);
    let indent = line.len() - body.len();
    let Some(first) = body.chars().next() else {
        return complete.then_some(LineKind::Blank);
    };
    let text = LineKind::Text { start: indent };

    match first {
        '#' => {
            let hashes = body.len() - body.trim_start_matches('#').len();
            let rest = &body[hashes..];
            if hashes > 6 {
                Some(text)
            } else if rest.is_empty() {
                complete.then_some(LineKind::Heading {
                    level: hashes as u8,
                    start: line.len(),
                })
            } else if rest.starts_with([' ', '\t']) {
                content_start(line, indent + hashes, complete).map(|start| LineKind::Heading {
                    level: hashes as u8,
                    start,
                })
            } else {
                Some(text)
            }
        }
        '>' => content_start(line, indent + 1, complete).map(|start| LineKind::Quote { start }),
        '`' => {
            let ticks = body.len() - body.trim_start_matches('`').len();
            if ticks >= 3 {
                if !complete {
                    return None;
                }
                let language = body[ticks..].split_whitespace().next().map(str::to_string);
                Some(LineKind::FenceOpen { language })
            } else if ticks == body.len() && !complete {
                None
            } else {
                Some(text)
            }
        }
        '-' | '*' | '_' | '+' => classify_bullet(line, indent, first, complete),
        c if c.is_ascii_digit() => classify_ordered(line, indent, complete),
        _ => Some(text),
    }
}

/// Lines starting with `-`, `*`, `_` or `+`: bullet item, rule or text.
fn classify_bullet(line: &str, indent: usize, marker: char, complete: bool) -> Option<LineKind> {
    let body = &line[indent..];
    let spaced = marker != '_' && body[1..].starts_with([' ', '\t']);
    let markers_only = body.chars().all(|c| c == marker || c == ' ' || c == '\t');

    if markers_only {
        if !complete {
            return None;
        }
        let count = body.chars().filter(|&c| c == marker).count();
        if marker != '+' && count >= 3 {
            return Some(LineKind::Rule);
        }
    }
    if spaced {
        return content_start(line, indent + 1, complete).map(|start| LineKind::ListItem {
            ordered: false,
            number: None,
            start,
        });
    }
    Some(LineKind::Text { start: indent })
}

/// Lines starting with a digit: `1.` / `1)` item or text.
fn classify_ordered(line: &str, indent: usize, complete: bool) -> Option<LineKind> {
    let body = &line[indent..];
    let digits = body.len() - body.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let text = Some(LineKind::Text { start: indent });
    if digits > 9 {
        return text;
    }

    let rest = &body[digits..];
    match rest.chars().next() {
        None => complete.then_some(LineKind::Text { start: indent }),
        Some('.' | ')') => {
            let after = &rest[1..];
            if after.is_empty() {
                complete.then_some(LineKind::Text { start: indent })
            } else if after.starts_with([' ', '\t']) {
                let number = body[..digits].parse().ok();
                content_start(line, indent + digits + 1, complete).map(|start| LineKind::ListItem {
                    ordered: true,
                    number,
                    start,
                })
            } else {
                text
            }
        }
        Some(_) => text,
    }
}

/// Decides a line inside a code fence: content or the closing fence.
fn classify_code_line(line: &str, complete: bool) -> Option<LineKind> {
    let body = line.trim_start_matches(' ');
    if line.len() - body.len() > 3 {
        return Some(LineKind::CodeLine);
    }
    let ticks = body.len() - body.trim_start_matches('`').len();
    let after = &body[ticks..];

    if ticks >= 3 && after.trim().is_empty() {
        return complete.then_some(LineKind::FenceClose);
    }
    if ticks == body.len() && !complete {
        return None;
    }
    Some(LineKind::CodeLine)
}

/// Offset of the first content character after a block marker ending at
/// `marker_end`. Waits while only whitespace follows the marker.
fn content_start(line: &str, marker_end: usize, complete: bool) -> Option<usize> {
    let trimmed = line[marker_end..].trim_start_matches([' ', '\t']);
    if trimmed.is_empty() && !complete {
        return None;
    }
    Some(line.len() - trimmed.len())
}
