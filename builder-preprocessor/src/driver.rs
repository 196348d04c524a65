use std::collections::HashMap;

use builder_expr::{
    ast::Expr,
    env::Environment,
    eval::{evaluate, EvalContext, EvalError},
    parser,
    value::Value,
};
use builder_foundation::{
    diagnostics::DiagnosticSink,
    errors::{Error, ErrorKind},
    location::Location,
};
use builder_lexer::line::{classify, scan_splices, Keyword, LineKind, Segment};
use tracing::{debug, trace};

use crate::{
    dependencies::DependencyMap,
    include::{resolve_reference, IncludeFrame},
    macros::{Macro, MacroTable},
    output::Output,
    reader::{Credentials, ReadContext, ReaderRegistry},
};

/// Driver switches.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Emit `#line <N> "<file>"` markers so downstream compilers report
    /// errors against the original sources.
    pub generate_line_control: bool,
    /// Resolve relative includes found in remote sources against the remote
    /// prefix instead of the top-level local path.
    pub remote_relative_includes: bool,
    /// Memoize reads per resolved identifier within a single `execute`.
    pub cache_includes: bool,
    /// Empty the commit cache at `execute` entry.
    pub clear_cache: bool,
    /// Record the commit each remote reference resolves to into the
    /// dependency map.
    pub save_dependencies: bool,
}

/// The preprocessor driver.
///
/// One instance holds the reader registry, credentials, predefined globals,
/// the dependency map, and the commit cache. `execute` may be called
/// repeatedly; each call processes one top-level input with a fresh variable
/// environment and macro table, so its output is a pure function of the
/// input text and the dependency map.
pub struct Preprocessor {
    options: Options,
    readers: ReaderRegistry,
    credentials: Credentials,
    definitions: HashMap<String, Value>,
    dependencies: DependencyMap,
    commit_cache: HashMap<String, (String, String)>,
}

impl Preprocessor {
    pub fn new(readers: ReaderRegistry) -> Self {
        Self {
            options: Options::default(),
            readers,
            credentials: Credentials::default(),
            definitions: HashMap::new(),
            dependencies: DependencyMap::new(),
            commit_cache: HashMap::new(),
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_dependencies(mut self, dependencies: DependencyMap) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Predefines a global variable, visible to every subsequent `execute`.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.definitions.insert(name.into(), value);
    }

    /// The dependency map, including any pins recorded while
    /// `save_dependencies` was enabled.
    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    /// Preprocesses one top-level input. `file` is the input's displayable
    /// identifier and `path` the base for relative includes.
    pub fn execute(
        &mut self,
        source: &str,
        file: &str,
        path: &str,
        diagnostics: &mut dyn DiagnosticSink,
    ) -> Result<String, Error> {
        if self.options.clear_cache {
            self.commit_cache.clear();
        }
        let mut state = RunState {
            env: Environment::with_globals(self.definitions.clone()),
            macros: MacroTable::new(),
            frames: vec![],
            output: Output::new(self.options.generate_line_control),
            read_cache: HashMap::new(),
            diagnostics,
        };
        self.process_source(&mut state, source, IncludeFrame::top_level(file, path))?;
        Ok(state.output.finish(source.ends_with('\n')))
    }

    fn process_source(
        &mut self,
        state: &mut RunState<'_>,
        text: &str,
        frame: IncludeFrame,
    ) -> Result<(), Error> {
        state.frames.push(frame);
        let result = self.process_lines(state, text);
        state.frames.pop();
        result
    }

    fn process_lines(&mut self, state: &mut RunState<'_>, text: &str) -> Result<(), Error> {
        let lines: Vec<&str> = text.split('\n').collect();
        // A trailing newline produces one empty trailing piece, not a line.
        let line_count = if text.ends_with('\n') {
            lines.len() - 1
        } else {
            lines.len()
        };

        let mut conds: Vec<Cond> = vec![];
        let mut capture: Option<Capture> = None;
        // Macro definitions in dead branches are skipped without being
        // registered; this tracks the body of such a phantom definition so
        // conditionals inside it don't disturb the real condition stack.
        let mut dead_capture: Option<u32> = None;

        for (index, &raw_line) in lines[..line_count].iter().enumerate() {
            let line_no = state.frame().line_offset + index as u32 + 1;
            let kind = classify(raw_line);

            if let Some(mut active) = capture.take() {
                match &kind {
                    LineKind::Directive {
                        keyword: Keyword::Macro,
                        ..
                    } => {
                        return Err(state.error(line_no, ErrorKind::Syntax("nested macro".into())));
                    }
                    LineKind::Directive {
                        keyword: Keyword::EndMacro,
                        ..
                    } => self.finish_capture(state, active),
                    LineKind::Directive {
                        keyword: Keyword::End,
                        ..
                    } if active.cond_depth == 0 => self.finish_capture(state, active),
                    LineKind::Directive { keyword, .. } => {
                        match keyword {
                            Keyword::If => active.cond_depth += 1,
                            Keyword::EndIf | Keyword::End => {
                                active.cond_depth = active.cond_depth.saturating_sub(1)
                            }
                            _ => (),
                        }
                        active.body.push(raw_line.to_owned());
                        capture = Some(active);
                    }
                    LineKind::Text => {
                        active.body.push(raw_line.to_owned());
                        capture = Some(active);
                    }
                }
                continue;
            }

            if let Some(mut depth) = dead_capture.take() {
                if let LineKind::Directive { keyword, .. } = &kind {
                    match keyword {
                        // The phantom definition ends; nothing is registered.
                        Keyword::EndMacro => continue,
                        Keyword::End if depth == 0 => continue,
                        Keyword::End | Keyword::EndIf => depth = depth.saturating_sub(1),
                        Keyword::If => depth += 1,
                        _ => (),
                    }
                }
                dead_capture = Some(depth);
                continue;
            }

            let live = conds.iter().all(|cond| cond.active);

            let LineKind::Directive { keyword, args } = kind else {
                if live {
                    let rendered = self.render_text_line(state, raw_line, line_no)?;
                    let file = state.frame().file.clone();
                    state.output.emit_line(&rendered, &file, line_no);
                }
                continue;
            };

            match keyword {
                Keyword::If => {
                    let parent_live = live;
                    let taken = parent_live && self.eval_args(state, &args, line_no)?.is_truthy();
                    trace!(line_no, taken, "@if");
                    conds.push(Cond {
                        parent_live,
                        active: taken,
                        // A dead parent marks the frame as matched so no
                        // branch of it ever evaluates.
                        matched: taken || !parent_live,
                        seen_else: false,
                        open_line: line_no,
                    });
                }
                Keyword::ElseIf => {
                    let evaluate_branch = match conds.last() {
                        None => {
                            return Err(state.error(
                                line_no,
                                ErrorKind::Syntax("`@elseif` without `@if`".into()),
                            ));
                        }
                        Some(cond) if cond.seen_else => {
                            return Err(state.error(
                                line_no,
                                ErrorKind::Syntax("`@elseif` after `@else`".into()),
                            ));
                        }
                        Some(cond) => cond.parent_live && !cond.matched,
                    };
                    let taken = evaluate_branch && self.eval_args(state, &args, line_no)?.is_truthy();
                    let top = conds.last_mut().expect("presence was just checked");
                    top.active = taken;
                    top.matched = top.matched || taken;
                }
                Keyword::Else => {
                    let Some(top) = conds.last_mut() else {
                        return Err(state.error(
                            line_no,
                            ErrorKind::Syntax("`@else` without `@if`".into()),
                        ));
                    };
                    if top.seen_else {
                        return Err(
                            state.error(line_no, ErrorKind::Syntax("`@else` after `@else`".into()))
                        );
                    }
                    top.seen_else = true;
                    top.active = top.parent_live && !top.matched;
                    top.matched = true;
                }
                Keyword::EndIf => {
                    if conds.pop().is_none() {
                        return Err(state
                            .error(line_no, ErrorKind::Syntax("`@endif` without `@if`".into())));
                    }
                }
                Keyword::End => {
                    if conds.pop().is_none() {
                        return Err(state.error(
                            line_no,
                            ErrorKind::Syntax("`@end` without an open `@macro` or `@if`".into()),
                        ));
                    }
                }
                Keyword::Macro => {
                    if !live {
                        dead_capture = Some(0);
                        continue;
                    }
                    let (name, params) = parse_macro_header(&args)
                        .map_err(|message| state.error(line_no, ErrorKind::Syntax(message)))?;
                    capture = Some(Capture {
                        name,
                        params,
                        body: vec![],
                        line: line_no,
                        cond_depth: 0,
                    });
                }
                Keyword::EndMacro => {
                    if live {
                        return Err(state.error(
                            line_no,
                            ErrorKind::Syntax("`@endmacro` without `@macro`".into()),
                        ));
                    }
                }
                Keyword::Set => {
                    if live {
                        let (name, expr) = parse_set_args(&args)
                            .map_err(|message| state.error(line_no, ErrorKind::Syntax(message)))?;
                        let value = self.eval_args(state, expr, line_no)?;
                        trace!(name, %value, "@set");
                        state.env.set_global(name, value);
                    }
                }
                Keyword::Error => {
                    if live {
                        let value = self.eval_args(state, &args, line_no)?;
                        return Err(state
                            .error(line_no, ErrorKind::User(value.to_display_string())));
                    }
                }
                Keyword::Include => {
                    if live {
                        self.handle_include(state, &args, line_no)?;
                    }
                }
            }
        }

        if let Some(unclosed) = capture {
            return Err(state.error(
                unclosed.line,
                ErrorKind::Syntax(format!(
                    "missing `@endmacro` to close `@macro {}`",
                    unclosed.name
                )),
            ));
        }
        if let Some(unclosed) = conds.last() {
            return Err(state.error(
                unclosed.open_line,
                ErrorKind::Syntax("missing `@endif` to close `@if`".into()),
            ));
        }
        Ok(())
    }

    fn finish_capture(&mut self, state: &mut RunState<'_>, capture: Capture) {
        let frame = state.frame();
        let definition = Macro {
            name: capture.name,
            params: capture.params,
            body: capture.body,
            file: frame.file.clone(),
            path: frame.path.clone(),
            repo_ref: frame.repo_ref.clone(),
            repo_prefix: frame.repo_prefix.clone(),
            line: capture.line,
        };
        state.macros.define(definition, &mut *state.diagnostics);
    }

    fn handle_include(
        &mut self,
        state: &mut RunState<'_>,
        args: &str,
        line_no: u32,
    ) -> Result<(), Error> {
        let expr = parser::parse(args)
            .map_err(|e| state.error(line_no, ErrorKind::Expr(e.message)))?;

        // A bareword that names a macro is an invocation, not a source
        // reference.
        let invocation: Option<(&str, &[Expr])> = match &expr {
            Expr::Ident(name) => Some((name, &[])),
            Expr::Call { callee, args } => Some((callee, args)),
            _ => None,
        };
        if let Some((name, call_args)) = invocation {
            if let Some(definition) = state.macros.get(name).cloned() {
                return self.invoke_macro(state, definition, call_args, line_no);
            }
        }

        let reference = self.eval_expr(state, &expr, line_no)?.to_display_string();
        let resolved = resolve_reference(
            &reference,
            &state.frames,
            self.options.remote_relative_includes,
        );
        debug!(%reference, %resolved, "@include");

        let Some(reader_index) = self.readers.position(&resolved) else {
            return Err(state.error(line_no, ErrorKind::UnknownSource(resolved)));
        };
        if state
            .frames
            .iter()
            .any(|frame| frame.resolved_id.as_deref() == Some(resolved.as_str()))
        {
            return Err(state.error(line_no, ErrorKind::CircularInclude(resolved)));
        }

        let meta = self.readers.get(reader_index).parse_path(&resolved);
        let (text, commit_id) = self.read_source(state, reader_index, &resolved, line_no)?;

        if self.options.save_dependencies {
            if let Some(commit_id) = &commit_id {
                if self.dependencies.get(&resolved).is_none() {
                    debug!(%resolved, %commit_id, "recorded dependency pin");
                    self.dependencies.insert(resolved.clone(), commit_id.clone());
                }
            }
        }

        let frame = IncludeFrame {
            file: meta.file,
            path: meta.path,
            repo_ref: meta.repo_ref,
            repo_prefix: meta.repo_prefix,
            line_offset: 0,
            resolved_id: Some(resolved),
            included_at: Some(state.location(line_no)),
        };
        self.process_source(state, &text, frame)
    }

    /// Reads a resolved reference, consulting the per-execute memoization
    /// map and the commit cache before hitting the reader.
    fn read_source(
        &mut self,
        state: &mut RunState<'_>,
        reader_index: usize,
        resolved: &str,
        line_no: u32,
    ) -> Result<(String, Option<String>), Error> {
        if self.options.cache_includes {
            if let Some((text, commit_id)) = state.read_cache.get(resolved) {
                trace!(resolved, "include cache hit");
                return Ok((text.clone(), commit_id.clone()));
            }
        }
        if let Some((text, commit_id)) = self.commit_cache.get(resolved) {
            trace!(resolved, "commit cache hit");
            return Ok((text.clone(), Some(commit_id.clone())));
        }

        let result = {
            let ctx = ReadContext {
                dependencies: Some(&self.dependencies),
                credentials: &self.credentials,
            };
            self.readers.get(reader_index).read(resolved, &ctx)
        }
        .map_err(|cause| {
            state.error(
                line_no,
                ErrorKind::SourceReading {
                    reference: resolved.to_owned(),
                    cause,
                },
            )
        })?;

        if let Some(commit_id) = &result.commit_id {
            self.commit_cache
                .insert(resolved.to_owned(), (result.text.clone(), commit_id.clone()));
        }
        if self.options.cache_includes {
            state.read_cache.insert(
                resolved.to_owned(),
                (result.text.clone(), result.commit_id.clone()),
            );
        }
        Ok((result.text, result.commit_id))
    }

    fn invoke_macro(
        &mut self,
        state: &mut RunState<'_>,
        definition: Macro,
        args: &[Expr],
        line_no: u32,
    ) -> Result<(), Error> {
        if args.len() > definition.params.len() {
            return Err(state.error(
                line_no,
                ErrorKind::Type(format!(
                    "macro `{}` takes {} parameter(s) but {} argument(s) were given",
                    definition.name,
                    definition.params.len(),
                    args.len()
                )),
            ));
        }

        // Arguments evaluate in the caller's environment. Parameters without
        // a supplied argument stay unbound, so they read as null and
        // `defined(...)` reports them absent.
        let mut bindings = HashMap::new();
        for (param, arg) in definition.params.iter().zip(args) {
            bindings.insert(param.clone(), self.eval_expr(state, arg, line_no)?);
        }

        trace!(name = %definition.name, "expanding macro");
        let body = definition.body.join("\n");
        let frame = IncludeFrame {
            file: definition.file,
            path: definition.path,
            repo_ref: definition.repo_ref,
            repo_prefix: definition.repo_prefix,
            line_offset: definition.line,
            resolved_id: None,
            included_at: Some(state.location(line_no)),
        };

        state.env.push_scope(bindings);
        let result = self.process_source(state, &body, frame);
        state.env.pop_scope();
        result
    }

    fn render_text_line(
        &self,
        state: &RunState<'_>,
        raw_line: &str,
        line_no: u32,
    ) -> Result<String, Error> {
        let segments = scan_splices(raw_line).map_err(|e| {
            state.error_at_column(
                line_no,
                e.column,
                ErrorKind::Syntax("unterminated inline splice `@{`".into()),
            )
        })?;
        let mut rendered = String::with_capacity(raw_line.len());
        for segment in segments {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Splice { expr, column } => {
                    let expr = parser::parse(expr).map_err(|e| {
                        state.error_at_column(line_no, column, ErrorKind::Expr(e.message))
                    })?;
                    let value = self.eval_expr(state, &expr, line_no).map_err(|mut e| {
                        e.location.column = column;
                        e
                    })?;
                    rendered.push_str(&value.to_splice_string());
                }
            }
        }
        Ok(rendered)
    }

    fn eval_args(&self, state: &RunState<'_>, args: &str, line_no: u32) -> Result<Value, Error> {
        let expr = parser::parse(args)
            .map_err(|e| state.error(line_no, ErrorKind::Expr(e.message)))?;
        self.eval_expr(state, &expr, line_no)
    }

    fn eval_expr(&self, state: &RunState<'_>, expr: &Expr, line_no: u32) -> Result<Value, Error> {
        let frame = state.frame();
        let ctx = EvalContext {
            env: &state.env,
            file: &frame.file,
            path: &frame.path,
            line: line_no,
        };
        evaluate(expr, &ctx).map_err(|e| {
            state.error(
                line_no,
                match e {
                    EvalError::Type(message) => ErrorKind::Type(message),
                    EvalError::Name(name) => ErrorKind::Name(name),
                    EvalError::Expr(message) => ErrorKind::Expr(message),
                },
            )
        })
    }
}

/// Per-execute state threaded through the recursion.
struct RunState<'a> {
    env: Environment,
    macros: MacroTable,
    frames: Vec<IncludeFrame>,
    output: Output,
    read_cache: HashMap<String, (String, Option<String>)>,
    diagnostics: &'a mut dyn DiagnosticSink,
}

impl RunState<'_> {
    fn frame(&self) -> &IncludeFrame {
        self.frames
            .last()
            .expect("include frame stack must not be empty")
    }

    fn location(&self, line: u32) -> Location {
        Location::new(self.frame().file.clone(), line)
    }

    fn error(&self, line: u32, kind: ErrorKind) -> Error {
        Error::new(kind, self.location(line)).with_trace(self.trace())
    }

    fn error_at_column(&self, line: u32, column: u32, kind: ErrorKind) -> Error {
        Error::new(kind, self.location(line).with_column(column)).with_trace(self.trace())
    }

    fn trace(&self) -> Vec<Location> {
        self.frames
            .iter()
            .rev()
            .filter_map(|frame| frame.included_at.clone())
            .collect()
    }
}

/// One `@if`/`@elseif`/`@else` chain in flight.
struct Cond {
    /// Whether the chain sits inside live output at all. When false, no
    /// branch condition is evaluated.
    parent_live: bool,
    /// Whether the current branch emits output.
    active: bool,
    /// Whether some branch has already been taken.
    matched: bool,
    seen_else: bool,
    open_line: u32,
}

/// A macro body being captured.
struct Capture {
    name: String,
    params: Vec<String>,
    body: Vec<String>,
    line: u32,
    /// Conditionals opened inside the body, so `@end` closes the right
    /// construct.
    cond_depth: u32,
}

fn split_ident(input: &str) -> Option<(&str, &str)> {
    match input.chars().next() {
        Some('a'..='z' | 'A'..='Z' | '_') => (),
        _ => return None,
    }
    let end = input
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(input.len());
    Some((&input[..end], &input[end..]))
}

/// `NAME EXPR` or `NAME = EXPR`.
fn parse_set_args(args: &str) -> Result<(&str, &str), String> {
    let Some((name, rest)) = split_ident(args) else {
        return Err("`@set` expects a variable name".into());
    };
    let rest = rest.trim_start();
    let expr = rest.strip_prefix('=').unwrap_or(rest).trim();
    if expr.is_empty() {
        return Err(format!("`@set {name}` is missing a value expression"));
    }
    Ok((name, expr))
}

/// `NAME`, `NAME()`, or `NAME(p1, p2, ...)`.
fn parse_macro_header(args: &str) -> Result<(String, Vec<String>), String> {
    let Some((name, rest)) = split_ident(args) else {
        return Err("`@macro` expects a macro name".into());
    };
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok((name.to_owned(), vec![]));
    }
    let Some(inner) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) else {
        return Err(format!("malformed parameter list for `@macro {name}`"));
    };
    let inner = inner.trim();
    if inner.is_empty() {
        return Ok((name.to_owned(), vec![]));
    }
    let mut params = vec![];
    for param in inner.split(',') {
        let param = param.trim();
        match split_ident(param) {
            Some((ident, "")) => params.push(ident.to_owned()),
            _ => {
                return Err(format!(
                    "`{param}` is not a valid parameter name for `@macro {name}`"
                ))
            }
        }
    }
    Ok((name.to_owned(), params))
}
