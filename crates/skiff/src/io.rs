//! Output abstraction for `console.log` and friends.
//!
//! The engine never writes to stdout directly; hosts choose where console
//! output goes by installing a [`PrintWriter`].

/// Receives console output lines.
pub trait PrintWriter {
    fn print(&mut self, line: &str);
}

/// Writes to the process stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn print(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Discards all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn print(&mut self, _line: &str) {}
}

/// Collects output lines into a string, for tests and embedders that want
/// the console transcript.
#[derive(Debug, Default)]
pub struct CollectPrint {
    lines: Vec<String>,
}

impl CollectPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.lines.join("\n")
    }
}

impl PrintWriter for CollectPrint {
    fn print(&mut self, line: &str) {
        self.lines.push(line.to_owned());
    }
}
