use super::{BlockKind, RenderStatus, RenderTarget, Span};

/// Renders into an HTML string.
///
/// Adjacent spans with the same style are merged before they are written, so
/// the output does not depend on how the reply was chunked. Consecutive list
/// items share one `<ul>`/`<ol>`.
#[derive(Debug, Default)]
pub struct HtmlTarget {
    html: String,
    pending: Option<Span>,
    list: Option<bool>,
    in_code_block: bool,
    status: Option<RenderStatus>,
}

impl HtmlTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// The markup rendered so far.
    pub fn html(&self) -> String {
        let mut html = self.html.clone();
        if let Some(span) = &self.pending {
            html.push_str(&self.span_html(span));
        }
        html
    }

    pub fn status(&self) -> Option<RenderStatus> {
        self.status
    }

    fn flush(&mut self) {
        if let Some(span) = self.pending.take() {
            let html = self.span_html(&span);
            self.html.push_str(&html);
        }
    }

    fn close_list(&mut self) {
        match self.list.take() {
            Some(true) => self.html.push_str("</ol>"),
            Some(false) => self.html.push_str("</ul>"),
            None => {}
        }
    }

    fn span_html(&self, span: &Span) -> String {
        let mut html = escape(&span.text);
        if self.in_code_block {
            return html;
        }
        if span.style.code {
            html = format!("<code>{html}</code>");
        }
        if span.style.italic {
            html = format!("<em>{html}</em>");
        }
        if span.style.bold {
            html = format!("<strong>{html}</strong>");
        }
        if let Some(url) = &span.link {
            html = format!("<a href=\"{}\">{html}</a>", escape(url));
        }
        html
    }
}

impl RenderTarget for HtmlTarget {
    fn set_status(&mut self, status: RenderStatus) {
        if matches!(status, RenderStatus::Done | RenderStatus::Failed) {
            self.flush();
            self.close_list();
        }
        self.status = Some(status);
    }

    fn open_block(&mut self, kind: &BlockKind) {
        self.flush();
        if let BlockKind::ListItem { ordered, .. } = kind {
            if self.list != Some(*ordered) {
                self.close_list();
                self.html.push_str(if *ordered { "<ol>" } else { "<ul>" });
                self.list = Some(*ordered);
            }
            self.html.push_str("<li>");
            return;
        }

        self.close_list();
        match kind {
            BlockKind::Paragraph => self.html.push_str("<p>"),
            BlockKind::Heading(level) => self.html.push_str(&format!("<h{level}>")),
            BlockKind::CodeBlock { language } => {
                match language {
                    Some(language) => self
                        .html
                        .push_str(&format!("<pre><code class=\"language-{}\">", escape(language))),
                    None => self.html.push_str("<pre><code>"),
                }
                self.in_code_block = true;
            }
            BlockKind::BlockQuote => self.html.push_str("<blockquote>"),
            BlockKind::Rule => self.html.push_str("<hr>"),
            BlockKind::ListItem { .. } => {}
        }
    }

    fn push_span(&mut self, span: &Span) {
        if span.text.is_empty() {
            return;
        }
        if let Some(pending) = &mut self.pending {
            if pending.style == span.style && pending.link == span.link {
                pending.text.push_str(&span.text);
                return;
            }
        }
        self.flush();
        self.pending = Some(span.clone());
    }

    fn line_break(&mut self) {
        self.flush();
        self.html.push_str(if self.in_code_block { "\n" } else { "<br>" });
    }

    fn close_block(&mut self, kind: &BlockKind) {
        self.flush();
        match kind {
            BlockKind::Paragraph => self.html.push_str("</p>"),
            BlockKind::Heading(level) => self.html.push_str(&format!("</h{level}>")),
            BlockKind::CodeBlock { .. } => {
                self.html.push_str("</code></pre>");
                self.in_code_block = false;
            }
            BlockKind::BlockQuote => self.html.push_str("</blockquote>"),
            BlockKind::ListItem { .. } => self.html.push_str("</li>"),
            BlockKind::Rule => {}
        }
    }

    fn reset(&mut self) {
        self.html.clear();
        self.pending = None;
        self.list = None;
        self.in_code_block = false;
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
