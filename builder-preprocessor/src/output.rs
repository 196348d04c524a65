/// The output buffer, with optional line-control markers.
///
/// When line control is enabled, a `#line <N> "<file>"` marker is emitted
/// whenever the next output line is not the natural successor of the
/// previous one - that is, on entry into an included source and again on
/// return to the parent, as well as across lines skipped by conditionals.
#[derive(Debug)]
pub struct Output {
    buffer: String,
    line_control: bool,
    last: Option<(String, u32)>,
}

impl Output {
    pub fn new(line_control: bool) -> Self {
        Self {
            buffer: String::new(),
            line_control,
            last: None,
        }
    }

    pub fn emit_line(&mut self, text: &str, file: &str, line: u32) {
        if self.line_control {
            let natural = matches!(&self.last, Some((f, l)) if f == file && l + 1 == line);
            if !natural {
                self.buffer.push_str(&format!("#line {line} {file:?}\n"));
            }
        }
        self.buffer.push_str(text);
        self.buffer.push('\n');
        self.last = Some((file.to_owned(), line));
    }

    /// Finalizes the buffer. `trailing_newline` mirrors whether the top-level
    /// input ended with one, so pure passthrough reproduces the input
    /// exactly.
    pub fn finish(mut self, trailing_newline: bool) -> String {
        if !trailing_newline && self.buffer.ends_with('\n') {
            self.buffer.pop();
        }
        self.buffer
    }
}
