//! Include frames and reference resolution.

use builder_foundation::location::Location;

/// Per-include state. A stack of these implements `__FILE__`, `__PATH__`,
/// `__LINE__` and recursion detection.
#[derive(Debug, Clone)]
pub struct IncludeFrame {
    /// Displayable identifier of the source (`__FILE__`).
    pub file: String,
    /// Base for relative includes (`__PATH__`).
    pub path: String,
    /// For Git frames, the requested ref.
    pub repo_ref: Option<String>,
    /// For Git frames, the reference up to the repository root.
    pub repo_prefix: Option<String>,
    /// Added to in-source line numbers; nonzero for macro-expansion frames,
    /// whose bodies start after the `@macro` line of the defining file.
    pub line_offset: u32,
    /// Identity used by the cycle guard. `None` for macro-expansion frames:
    /// macro recursion is bounded by conditionals, not by the guard.
    pub resolved_id: Option<String>,
    /// Where the `@include` that opened this frame is, for error traces.
    pub included_at: Option<Location>,
}

impl IncludeFrame {
    /// The frame for a top-level input.
    pub fn top_level(file: impl Into<String>, path: impl Into<String>) -> Self {
        let file = file.into();
        Self {
            resolved_id: Some(file.clone()),
            file,
            path: path.into(),
            repo_ref: None,
            repo_prefix: None,
            line_offset: 0,
            included_at: None,
        }
    }

    /// Whether this frame's source came from a remote reader.
    pub fn is_remote(&self) -> bool {
        self.repo_prefix.is_some()
            || self.path.starts_with("http://")
            || self.path.starts_with("https://")
    }
}

/// Whether a reference is absolute: it names a scheme of its own and is not
/// resolved against any frame.
pub fn has_scheme(reference: &str) -> bool {
    reference.starts_with("http://")
        || reference.starts_with("https://")
        || reference.starts_with("github:")
        || reference.starts_with("git-azure-repos:")
        || reference.starts_with("git-local:")
        || reference.starts_with("bitbucket-server:")
        || reference.contains(".git/")
}

/// Resolves an include reference against the frame stack.
///
/// Relative references resolve against the active frame's path. When the
/// active frame is remote, `remote_relative_includes` decides whether the
/// sibling is fetched from the same remote prefix or from the top-level
/// local path. References starting with `/` resolve against the repository
/// root inside a repo frame, and against the filesystem root otherwise.
pub fn resolve_reference(
    reference: &str,
    frames: &[IncludeFrame],
    remote_relative_includes: bool,
) -> String {
    if has_scheme(reference) {
        return reference.to_owned();
    }
    let frame = frames.last().expect("include frame stack must not be empty");

    if let Some(stripped) = reference.strip_prefix('/') {
        return match &frame.repo_prefix {
            Some(prefix) => with_repo_ref(join_normalize(prefix, stripped), frame),
            None => reference.to_owned(),
        };
    }

    if frame.is_remote() {
        if remote_relative_includes {
            with_repo_ref(join_normalize(&frame.path, reference), frame)
        } else {
            join_normalize(&frames[0].path, reference)
        }
    } else {
        join_normalize(&frame.path, reference)
    }
}

fn with_repo_ref(resolved: String, frame: &IncludeFrame) -> String {
    match &frame.repo_ref {
        Some(repo_ref) => format!("{resolved}@{repo_ref}"),
        None => resolved,
    }
}

/// Joins a relative reference onto a base and textually normalizes `.` and
/// `..` segments. Remote bases cannot be canonicalized on disk, so this is
/// pure path arithmetic.
pub fn join_normalize(base: &str, relative: &str) -> String {
    let joined = if base.is_empty() || base == "." {
        relative.to_owned()
    } else {
        format!("{base}/{relative}")
    };

    let mut parts: Vec<&str> = vec![];
    for segment in joined.split('/') {
        match segment {
            "." => (),
            ".." => match parts.last() {
                Some(&last) if !last.is_empty() && last != ".." && !last.contains(':') => {
                    parts.pop();
                }
                _ => parts.push(".."),
            },
            _ => parts.push(segment),
        }
    }
    parts.join("/")
}
