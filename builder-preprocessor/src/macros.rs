use builder_foundation::{
    diagnostics::{Diagnostic, DiagnosticSink},
    location::Location,
};
use indexmap::IndexMap;
use tracing::trace;

/// A macro definition. The body is the literal sequence of lines between
/// `@macro` and its matching `@endmacro`/`@end`, captured verbatim and
/// re-processed at every invocation.
#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<String>,
    /// Definition-site frame data: invocations report locations against the
    /// defining file, offset past the `@macro` line.
    pub file: String,
    pub path: String,
    pub repo_ref: Option<String>,
    pub repo_prefix: Option<String>,
    pub line: u32,
}

/// Registry from macro name to definition. Insertion order is preserved,
/// which keeps diagnostics deterministic.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: IndexMap<String, Macro>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a macro. Redefinition overwrites the previous definition
    /// with a warning.
    pub fn define(&mut self, definition: Macro, diagnostics: &mut dyn DiagnosticSink) {
        trace!(name = %definition.name, params = ?definition.params, "defined macro");
        let location = Location::new(definition.file.clone(), definition.line);
        if let Some(previous) = self.macros.insert(definition.name.clone(), definition) {
            diagnostics.emit(Diagnostic::warning(
                location,
                format!(
                    "macro `{}` is redefined; the definition at {}:{} is overwritten",
                    previous.name, previous.file, previous.line
                ),
            ));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }
}
