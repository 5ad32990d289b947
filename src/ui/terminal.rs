use std::io::{self, Write};

use ratatui::crossterm::{
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
};
use tracing::debug;

use crate::core::session::Renderer;

/// Line-oriented renderer: prompts, headers and fragments go straight to the
/// writer, flushed after every write so streamed text appears immediately.
pub struct TerminalRenderer<W: Write = io::Stdout> {
    out: W,
}

impl TerminalRenderer {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn styled(&mut self, color: Color, bold: bool, text: &str) -> io::Result<()> {
        queue!(self.out, SetForegroundColor(color))?;
        if bold {
            queue!(self.out, SetAttribute(Attribute::Bold))?;
        }
        queue!(
            self.out,
            Print(text),
            SetAttribute(Attribute::Reset),
            ResetColor
        )?;
        self.out.flush()
    }

    fn plain(&mut self, text: &str) -> io::Result<()> {
        queue!(self.out, Print(text))?;
        self.out.flush()
    }

    fn report(result: io::Result<()>) {
        if let Err(err) = result {
            debug!(error = %err, "Terminal write failed");
        }
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn user_prompt(&mut self) {
        Self::report(self.styled(Color::Green, true, "You: "));
    }

    fn assistant_header(&mut self, label: &str) {
        Self::report(self.styled(Color::Cyan, true, &format!("{label}: ")));
    }

    fn fragment(&mut self, text: &str) {
        Self::report(self.plain(text));
    }

    fn end_response(&mut self) {
        Self::report(self.plain("\n"));
    }

    fn info(&mut self, message: &str) {
        Self::report(self.styled(Color::Yellow, false, &format!("{message}\n")));
    }

    fn error(&mut self, message: &str) {
        Self::report(self.styled(Color::Red, false, &format!("{message}\n")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(renderer: TerminalRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn fragments_are_written_verbatim() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.assistant_header("Gemini");
        renderer.fragment("Hel");
        renderer.fragment("lo!");
        renderer.end_response();

        let output = rendered(renderer);
        assert!(output.contains("Gemini: "));
        assert!(output.ends_with("Hello!\n"));
    }

    #[test]
    fn errors_and_info_end_with_newline() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.error("boom");
        renderer.info("Interrupted.");

        let output = rendered(renderer);
        assert!(output.contains("boom\n"));
        assert!(output.contains("Interrupted.\n"));
    }

    #[test]
    fn prompt_is_styled() {
        let mut renderer = TerminalRenderer::new(Vec::new());
        renderer.user_prompt();

        let output = rendered(renderer);
        assert!(output.contains("You: "));
        assert!(output.contains('\u{1b}'));
    }
}
