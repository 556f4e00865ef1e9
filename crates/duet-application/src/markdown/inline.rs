//! Inline markup: emphasis, code spans and links.
//!
//! Characters are consumed one at a time. A character is held only while its
//! meaning still depends on what follows (an emphasis run, a backslash, a
//! link that is not yet closed); everything else becomes span text at once.

use super::{RenderTarget, Span, SpanStyle};

const MAX_LINK_LABEL: usize = 256;
const MAX_LINK_URL: usize = 2048;

/// A run of identical emphasis markers waiting for the next character.
#[derive(Debug, Clone, Copy)]
struct Run {
    marker: char,
    len: usize,
    before: Option<char>,
}

#[derive(Debug)]
enum LinkState {
    Label(String),
    AwaitUrl(String),
    Url { label: String, url: String },
}

impl LinkState {
    fn raw(&self) -> String {
        match self {
            LinkState::Label(label) => format!("[{label}"),
            LinkState::AwaitUrl(label) => format!("[{label}]"),
            LinkState::Url { label, url } => format!("[{label}]({url}"),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct InlineParser {
    style: SpanStyle,
    text: String,
    run: Option<Run>,
    escape: bool,
    link: Option<LinkState>,
    prev: Option<char>,
}

impl InlineParser {
    pub fn push(&mut self, c: char, out: &mut dyn RenderTarget) {
        if self.link.is_some() {
            self.push_link(c, out);
            return;
        }
        if self.escape {
            self.escape = false;
            self.literal(c);
            return;
        }
        if let Some(run) = self.run {
            if c == run.marker {
                self.run = Some(Run {
                    len: run.len + 1,
                    ..run
                });
                return;
            }
            self.resolve_run(Some(c), out);
        }
        if self.style.code {
            if c == '`' {
                self.set_style(SpanStyle { code: false, ..self.style }, out);
                self.prev = Some(c);
            } else {
                self.literal(c);
            }
            return;
        }

        match c {
            '\\' => self.escape = true,
            '`' => {
                self.set_style(SpanStyle { code: true, ..self.style }, out);
                self.prev = Some(c);
            }
            '*' | '_' => {
                self.run = Some(Run {
                    marker: c,
                    len: 1,
                    before: self.prev,
                })
            }
            '[' => {
                self.flush(out);
                self.link = Some(LinkState::Label(String::new()));
            }
            _ => self.literal(c),
        }
    }

    /// Emits buffered text without settling held markers.
    pub fn flush(&mut self, out: &mut dyn RenderTarget) {
        if !self.text.is_empty() {
            out.push_span(&Span {
                text: std::mem::take(&mut self.text),
                style: self.style,
                link: None,
            });
        }
    }

    /// Settles everything held at the end of a source line.
    ///
    /// Links do not span lines; emphasis and code state carry over to the
    /// next line of the same block.
    pub fn end_line(&mut self, out: &mut dyn RenderTarget) {
        loop {
            if self.link.is_some() {
                self.abort_link(out);
            } else if self.run.is_some() {
                self.resolve_run(None, out);
            } else if self.escape {
                self.escape = false;
                self.literal('\\');
            } else {
                break;
            }
        }
        self.flush(out);
        self.prev = Some(' ');
    }

    /// Ends the block: settles held input and drops any open emphasis.
    pub fn finish(&mut self, out: &mut dyn RenderTarget) {
        self.end_line(out);
        self.style = SpanStyle::default();
        self.prev = None;
    }

    fn literal(&mut self, c: char) {
        self.text.push(c);
        self.prev = Some(c);
    }

    fn set_style(&mut self, style: SpanStyle, out: &mut dyn RenderTarget) {
        if style != self.style {
            self.flush(out);
            self.style = style;
        }
    }

    fn resolve_run(&mut self, next: Option<char>, out: &mut dyn RenderTarget) {
        let Some(run) = self.run.take() else {
            return;
        };
        let next_space = next.is_none_or(char::is_whitespace);
        let prev_space = run.before.is_none_or(char::is_whitespace);
        let intraword = run.marker == '_'
            && run.before.is_some_and(char::is_alphanumeric)
            && next.is_some_and(char::is_alphanumeric);

        let mut style = self.style;
        let toggled = !intraword
            && match run.len {
                1 => toggle(&mut style.italic, prev_space, next_space),
                2 => toggle(&mut style.bold, prev_space, next_space),
                3 if style.bold != style.italic => {
                    style.bold = !style.bold;
                    style.italic = !style.italic;
                    true
                }
                3 => {
                    let allowed = if style.bold { !prev_space } else { !next_space };
                    if allowed {
                        style.bold = !style.bold;
                        style.italic = !style.italic;
                    }
                    allowed
                }
                _ => false,
            };

        if toggled {
            self.set_style(style, out);
            self.prev = Some(run.marker);
        } else {
            for _ in 0..run.len {
                self.literal(run.marker);
            }
        }
    }

    fn push_link(&mut self, c: char, out: &mut dyn RenderTarget) {
        let Some(state) = self.link.take() else {
            return;
        };
        match state {
            LinkState::Label(mut label) => {
                if c == ']' {
                    self.link = Some(LinkState::AwaitUrl(label));
                } else if c == '[' || label.chars().count() >= MAX_LINK_LABEL {
                    self.link = Some(LinkState::Label(label));
                    self.abort_link(out);
                    self.push(c, out);
                } else {
                    label.push(c);
                    self.link = Some(LinkState::Label(label));
                }
            }
            LinkState::AwaitUrl(label) => {
                if c == '(' {
                    self.link = Some(LinkState::Url {
                        label,
                        url: String::new(),
                    });
                } else {
                    self.link = Some(LinkState::AwaitUrl(label));
                    self.abort_link(out);
                    self.push(c, out);
                }
            }
            LinkState::Url { label, mut url } => {
                if c == ')' {
                    self.emit_link(label, url, out);
                } else if c.is_whitespace() || url.len() >= MAX_LINK_URL {
                    self.link = Some(LinkState::Url { label, url });
                    self.abort_link(out);
                    self.push(c, out);
                } else {
                    url.push(c);
                    self.link = Some(LinkState::Url { label, url });
                }
            }
        }
    }

    fn emit_link(&mut self, label: String, url: String, out: &mut dyn RenderTarget) {
        self.flush(out);
        let text = if label.is_empty() { url.clone() } else { label };
        out.push_span(&Span {
            text,
            style: self.style,
            link: Some(url),
        });
        self.prev = Some(')');
    }

    /// Gives up on a pending link: the opening bracket becomes text and the
    /// rest of the held input is parsed again.
    fn abort_link(&mut self, out: &mut dyn RenderTarget) {
        let Some(state) = self.link.take() else {
            return;
        };
        let raw = state.raw();
        let mut chars = raw.chars();
        if let Some(bracket) = chars.next() {
            self.literal(bracket);
        }
        for c in chars {
            self.push(c, out);
        }
    }
}

/// Opens or closes one emphasis flag if the run is flanked correctly.
fn toggle(flag: &mut bool, prev_space: bool, next_space: bool) -> bool {
    let allowed = if *flag { !prev_space } else { !next_space };
    if allowed {
        *flag = !*flag;
    }
    allowed
}
