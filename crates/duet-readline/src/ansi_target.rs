//! Terminal render target.
//!
//! Both roles stream at the same time, so each target writes whole lines
//! tagged with its role (`A│ `, `B│ `) into a shared sink. Lines of the two
//! replies may interleave but never mix.

use std::io::Write;
use std::sync::{Arc, Mutex};

use colored::{ColoredString, Colorize};
use duet_application::{BlockKind, RenderStatus, RenderTarget, Span};
use duet_core::prompt::RoleId;

/// Renders one role's reply as ANSI-styled, role-tagged lines.
pub struct AnsiTarget<W: Write + Send> {
    role: RoleId,
    out: Arc<Mutex<W>>,
    line: String,
    block: Option<BlockKind>,
    /// Continuation lines of the current block use this indent
    indent: &'static str,
    /// Destination of the link whose label is being printed
    link: Option<String>,
    blocks: usize,
    /// Consecutive list items are not separated by a blank line
    in_list: bool,
    /// Replay mode: no status lines
    quiet: bool,
}

impl<W: Write + Send> AnsiTarget<W> {
    pub fn new(role: RoleId, out: Arc<Mutex<W>>) -> Self {
        Self {
            role,
            out,
            line: String::new(),
            block: None,
            indent: "",
            link: None,
            blocks: 0,
            in_list: false,
            quiet: false,
        }
    }

    /// Suppresses progress lines, for replaying stored replies.
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    fn tag(&self) -> ColoredString {
        let tag = format!("{}│ ", self.role);
        match self.role {
            RoleId::A => tag.bright_magenta(),
            RoleId::B => tag.bright_cyan(),
        }
    }

    fn emit(&mut self, text: &str) {
        let line = format!("{}{}", self.tag(), text);
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        // A closed terminal has nowhere to report to.
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }

    fn close_link(&mut self) {
        if let Some(url) = self.link.take() {
            self.line.push_str(&format!(" ({})", url).bright_black().to_string());
        }
    }

    fn flush_line(&mut self) {
        self.close_link();
        let line = std::mem::take(&mut self.line);
        self.emit(&line);
    }

    fn note(&mut self, text: &str) {
        if !self.quiet {
            let line = text.bright_black().italic().to_string();
            self.emit(&line);
        }
    }
}

fn styled(span: &Span, block: Option<&BlockKind>) -> ColoredString {
    let mut text = span.text.normal();
    if matches!(block, Some(BlockKind::CodeBlock { .. })) {
        return text.green();
    }
    if matches!(block, Some(BlockKind::Heading(_))) {
        text = text.bold().underline();
    }
    if span.style.code {
        text = text.yellow();
    }
    if span.style.bold {
        text = text.bold();
    }
    if span.style.italic {
        text = text.italic();
    }
    if span.link.is_some() {
        text = text.underline().blue();
    }
    text
}

impl<W: Write + Send> RenderTarget for AnsiTarget<W> {
    fn set_status(&mut self, status: RenderStatus) {
        match status {
            RenderStatus::Thinking => self.note("thinking…"),
            RenderStatus::Streaming => {}
            RenderStatus::Done | RenderStatus::Failed => {
                if !self.line.is_empty() {
                    self.flush_line();
                }
            }
        }
    }

    fn open_block(&mut self, kind: &BlockKind) {
        let list_item = matches!(kind, BlockKind::ListItem { .. });
        if self.blocks > 0 && !(list_item && self.in_list) {
            self.emit("");
        }
        self.blocks += 1;
        self.in_list = list_item;
        self.indent = "";
        match kind {
            BlockKind::Paragraph | BlockKind::Heading(_) => {}
            BlockKind::CodeBlock { language } => {
                let fence = format!("```{}", language.as_deref().unwrap_or(""));
                let fence = fence.bright_black().to_string();
                self.emit(&fence);
            }
            BlockKind::BlockQuote => {
                self.indent = "▎ ";
                self.line.push_str(&"▎ ".bright_black().to_string());
            }
            BlockKind::ListItem { ordered, number } => {
                let marker = match (ordered, number) {
                    (true, Some(n)) => format!("{n}. "),
                    (true, None) => "1. ".to_string(),
                    (false, _) => "• ".to_string(),
                };
                self.indent = "  ";
                self.line.push_str(&marker);
            }
            BlockKind::Rule => self.line.push_str(&"─".repeat(24).bright_black().to_string()),
        }
        self.block = Some(kind.clone());
    }

    fn push_span(&mut self, span: &Span) {
        if self.link.is_some() && self.link != span.link {
            self.close_link();
        }
        let text = styled(span, self.block.as_ref()).to_string();
        self.line.push_str(&text);
        if span.link.is_some() {
            self.link = span.link.clone();
        }
    }

    fn line_break(&mut self) {
        self.flush_line();
        let indent = self.indent.bright_black().to_string();
        self.line.push_str(&indent);
    }

    fn close_block(&mut self, kind: &BlockKind) {
        self.flush_line();
        if matches!(kind, BlockKind::CodeBlock { .. }) {
            let fence = "```".bright_black().to_string();
            self.emit(&fence);
        }
        self.block = None;
        self.indent = "";
    }

    fn reset(&mut self) {
        self.line.clear();
        self.link = None;
        self.block = None;
        self.indent = "";
        self.blocks = 0;
        self.in_list = false;
        self.note("(partial reply discarded)");
    }
}

#[cfg(test)]
mod tests {
    use duet_application::MarkdownRenderer;

    use super::*;

    fn render(role: RoleId, fragments: &[&str], quiet: bool) -> String {
        colored::control::set_override(false);
        let out = Arc::new(Mutex::new(Vec::new()));
        let mut target = AnsiTarget::new(role, out.clone());
        if quiet {
            target = target.quiet();
        }
        target.set_status(RenderStatus::Thinking);
        let mut renderer = MarkdownRenderer::new(&mut target);
        for fragment in fragments {
            renderer.write(fragment);
        }
        renderer.end();
        drop(target);
        let bytes = out.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_lines_are_tagged_with_the_role() {
        let text = render(RoleId::B, &["I went to ", "school yesterday."], false);
        assert_eq!(text, "B│ thinking…\nB│ I went to school yesterday.\n");
    }

    #[test]
    fn test_blocks_and_lists() {
        let text = render(
            RoleId::A,
            &["# Tips\n", "- say **went**\n- use [past](https://ex.am/ple)\n"],
            true,
        );
        assert_eq!(
            text,
            "A│ Tips\nA│ \nA│ • say went\nA│ • use past (https://ex.am/ple)\n"
        );
    }

    #[test]
    fn test_code_block_keeps_fences() {
        let text = render(RoleId::A, &["```rust\nlet x = 1;\n```\n"], true);
        assert_eq!(text, "A│ ```rust\nA│ let x = 1;\nA│ ```\n");
    }

    #[test]
    fn test_reset_discards_partial_line() {
        colored::control::set_override(false);
        let out = Arc::new(Mutex::new(Vec::new()));
        let mut target = AnsiTarget::new(RoleId::A, out.clone());
        let mut renderer = MarkdownRenderer::new(&mut target);
        renderer.write("Half a sent");
        renderer.abort();

        let mut renderer = MarkdownRenderer::new(&mut target);
        renderer.fail(&RoleId::A.failure_marker());
        drop(target);

        let text = String::from_utf8(out.lock().unwrap().clone()).unwrap();
        assert_eq!(
            text,
            "A│ (partial reply discarded)\nA│ ❌ Conversation partner failed to respond\n"
        );
    }
}
