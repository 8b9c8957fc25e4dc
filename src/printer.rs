/// Line-oriented source builder with brace-aware indentation.
#[derive(Debug, Default)]
pub struct CodePrinter {
    output: String,
    indent_level: usize,
}

impl CodePrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line at the current indentation. Empty lines carry no
    /// trailing whitespace.
    pub fn line(&mut self, text: &str) -> &mut Self {
        if !text.is_empty() {
            self.output.push_str(&"    ".repeat(self.indent_level));
            self.output.push_str(text);
        }
        self.output.push('\n');
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.line("")
    }

    /// Open a `{` block.
    pub fn indent(&mut self) -> &mut Self {
        self.line("{");
        self.indent_level += 1;
        self
    }

    /// Close the current block with `}`.
    pub fn dedent(&mut self) -> &mut Self {
        self.dedent_with("}")
    }

    /// Close the current block with a custom closer such as `};`.
    pub fn dedent_with(&mut self, closer: &str) -> &mut Self {
        self.indent_level = self.indent_level.saturating_sub(1);
        self.line(closer)
    }

    pub fn indent_level(&self) -> usize {
        self.indent_level
    }

    pub fn is_empty(&self) -> bool {
        self.output.is_empty()
    }

    pub fn get(&self) -> &str {
        &self.output
    }

    /// Take the accumulated text and reset the printer.
    pub fn take(&mut self) -> String {
        self.indent_level = 0;
        std::mem::take(&mut self.output)
    }
}
