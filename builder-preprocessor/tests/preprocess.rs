//! End-to-end driver tests over in-memory sources.

use std::{cell::Cell, collections::HashMap, rc::Rc};

use builder_foundation::{diagnostics::Diagnostic, errors::ErrorKind};
use builder_preprocessor::{
    reader::{PathMeta, ReadContext, ReadError, ReadResult, Reader, ReaderRegistry},
    Options, Preprocessor,
};
use indoc::indoc;

/// Serves fixed texts for exact references, like a tiny read-only
/// filesystem. References use the `mem:` prefix so nothing touches disk.
struct MemReader {
    files: HashMap<String, String>,
    reads: Rc<Cell<usize>>,
}

impl MemReader {
    fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(name, text)| (name.to_string(), text.to_string()))
                .collect(),
            reads: Rc::new(Cell::new(0)),
        }
    }

    fn read_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.reads)
    }
}

impl Reader for MemReader {
    fn supports(&self, reference: &str) -> bool {
        reference.starts_with("mem:")
    }

    fn parse_path(&self, reference: &str) -> PathMeta {
        let path = match reference.rsplit_once('/') {
            Some((dir, _)) => dir.to_owned(),
            None => ".".to_owned(),
        };
        PathMeta::local(reference, path)
    }

    fn read(&self, reference: &str, _ctx: &ReadContext<'_>) -> Result<ReadResult, ReadError> {
        self.reads.set(self.reads.get() + 1);
        match self.files.get(reference) {
            Some(text) => Ok(ReadResult::text(text.clone())),
            None => Err(format!("no such entry: {reference}").into()),
        }
    }
}

/// A fake Git host: versioned texts per reference, where the last version is
/// the current head. Honors pins from the dependency map the way the real
/// Git reader does.
struct FakeGitReader {
    versions: HashMap<String, Vec<(String, String)>>,
}

impl FakeGitReader {
    fn new(versions: &[(&str, &[(&str, &str)])]) -> Self {
        Self {
            versions: versions
                .iter()
                .map(|(reference, history)| {
                    (
                        reference.to_string(),
                        history
                            .iter()
                            .map(|(commit, text)| (commit.to_string(), text.to_string()))
                            .collect(),
                    )
                })
                .collect(),
        }
    }
}

impl Reader for FakeGitReader {
    fn supports(&self, reference: &str) -> bool {
        reference.starts_with("fakegit:")
    }

    fn parse_path(&self, reference: &str) -> PathMeta {
        let without_ref = reference
            .rsplit_once('@')
            .map(|(head, _)| head)
            .unwrap_or(reference);
        let path = match without_ref.rsplit_once('/') {
            Some((dir, _)) => dir.to_owned(),
            None => ".".to_owned(),
        };
        PathMeta {
            file: without_ref.to_owned(),
            path,
            repo_ref: reference.rsplit_once('@').map(|(_, r)| r.to_owned()),
            repo_prefix: Some("fakegit:org/repo".to_owned()),
        }
    }

    fn read(&self, reference: &str, ctx: &ReadContext<'_>) -> Result<ReadResult, ReadError> {
        let history = self
            .versions
            .get(reference)
            .ok_or_else(|| format!("no such entry: {reference}"))?;
        let pinned = ctx
            .dependencies
            .and_then(|dependencies| dependencies.get(reference));
        let (commit, text) = match pinned {
            Some(pin) => history
                .iter()
                .find(|(commit, _)| commit == pin)
                .ok_or_else(|| format!("commit {pin} not found for {reference}"))?,
            None => history.last().ok_or("empty history")?,
        };
        Ok(ReadResult {
            text: text.clone(),
            commit_id: Some(commit.clone()),
        })
    }
}

fn preprocessor(files: &[(&str, &str)]) -> Preprocessor {
    let mut registry = ReaderRegistry::new();
    registry.register(MemReader::new(files));
    Preprocessor::new(registry)
}

fn run(source: &str) -> String {
    run_with_files(source, &[])
}

fn run_with_files(source: &str, files: &[(&str, &str)]) -> String {
    preprocessor(files)
        .execute(source, "main.nut", ".", &mut ())
        .expect("preprocessing must succeed")
}

fn run_err(source: &str) -> builder_foundation::errors::Error {
    run_err_with_files(source, &[])
}

fn run_err_with_files(source: &str, files: &[(&str, &str)]) -> builder_foundation::errors::Error {
    preprocessor(files)
        .execute(source, "main.nut", ".", &mut ())
        .expect_err("preprocessing must fail")
}

mod passthrough {
    use super::*;

    #[test]
    fn text_without_directives_is_identity() {
        let source = "line one\n  indented\n\nuser@example.com\n";
        assert_eq!(run(source), source);
    }

    #[test]
    fn identity_without_trailing_newline() {
        let source = "no newline at end";
        assert_eq!(run(source), source);
    }

    #[test]
    fn unknown_at_words_pass_through() {
        let source = "@repeat 3 times\n@SETTING value\n";
        assert_eq!(run(source), source);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(run(""), "");
    }

    #[test]
    fn crlf_content_survives() {
        let source = "a\r\nb\r\n";
        assert_eq!(run(source), source);
    }
}

mod set_and_splice {
    use super::*;

    #[test]
    fn set_then_splice() {
        // min() folds its arguments.
        let source = "@set SOMEVAR min(1,2,3)\n@{SOMEVAR}\n";
        assert_eq!(run(source), "1\n");
    }

    #[test]
    fn inline_splices_in_text() {
        let source = "@set name \"Someone\"\nHello, @{name}, the result is: @{123 * 456}.";
        assert_eq!(run(source), "Hello, Someone, the result is: 56088.");
    }

    #[test]
    fn reassignment_takes_effect_in_order() {
        let source = indoc! {"
            @set X 1
            @{X}
            @set X 2
            @{X}
        "};
        assert_eq!(run(source), "1\n2\n");
    }

    #[test]
    fn undefined_variable_splices_to_nothing() {
        assert_eq!(run("[@{nope}]\n"), "[]\n");
    }

    #[test]
    fn set_accepts_equals_sign() {
        assert_eq!(run("@set X = 40 + 2\n@{X}\n"), "42\n");
    }

    #[test]
    fn line_pseudo_variable_counts_source_lines() {
        let source = "first\n@{__LINE__}\n";
        assert_eq!(run(source), "first\n2\n");
    }

    #[test]
    fn file_pseudo_variable_names_the_input() {
        assert_eq!(run("@{__FILE__}\n"), "main.nut\n");
    }
}

mod conditionals {
    use super::*;

    #[test]
    fn exactly_one_branch_is_emitted() {
        // __FILE__ reflects the file being processed, so the chain picks
        // the branch matching the input's name.
        let source = indoc! {"
            @if __FILE__ == 'abc.ext'
            A
            @elseif __FILE__ == 'def.ext'
            B
            @else
            C
            @endif
        "};
        let output = preprocessor(&[])
            .execute(source, "def.ext", ".", &mut ())
            .unwrap();
        assert_eq!(output, "B\n");
    }

    #[test]
    fn else_branch_when_nothing_matches() {
        let source = indoc! {"
            @if false
            A
            @elseif false
            B
            @else
            C
            @endif
        "};
        assert_eq!(run(source), "C\n");
    }

    #[test]
    fn first_matching_branch_wins() {
        let source = indoc! {"
            @if true
            A
            @elseif true
            B
            @endif
        "};
        assert_eq!(run(source), "A\n");
    }

    #[test]
    fn nested_conditionals() {
        let source = indoc! {"
            @if true
            @if false
            hidden
            @else
            shown
            @endif
            @endif
        "};
        assert_eq!(run(source), "shown\n");
    }

    #[test]
    fn dead_branches_evaluate_nothing() {
        // The @error in the dead branch must not fire, and the nested
        // condition of the dead branch must not be evaluated.
        let source = indoc! {"
            @if false
            @error \"must not trigger\"
            @if 1 < 'uncomparable'
            @endif
            @endif
            ok
        "};
        assert_eq!(run(source), "ok\n");
    }

    #[test]
    fn set_in_dead_branch_is_skipped() {
        let source = indoc! {"
            @if false
            @set X 1
            @endif
            [@{X}]
        "};
        assert_eq!(run(source), "[]\n");
    }

    #[test]
    fn end_closes_a_conditional() {
        let source = indoc! {"
            @if true
            yes
            @end
        "};
        assert_eq!(run(source), "yes\n");
    }

    #[test]
    fn truthiness_coerces_conditions() {
        assert_eq!(run("@if ''\nA\n@else\nB\n@endif\n"), "B\n");
        assert_eq!(run("@if 'x'\nA\n@else\nB\n@endif\n"), "A\n");
        assert_eq!(run("@if 0\nA\n@else\nB\n@endif\n"), "B\n");
    }

    #[test]
    fn unclosed_if_is_a_syntax_error() {
        let error = run_err("@if true\nA\n");
        assert!(matches!(error.kind, ErrorKind::Syntax(_)));
        assert_eq!(error.location.line, 1);
    }

    #[test]
    fn stray_elseif_is_a_syntax_error() {
        let error = run_err("@elseif true\n");
        assert!(matches!(error.kind, ErrorKind::Syntax(_)));
    }

    #[test]
    fn stray_endif_is_a_syntax_error() {
        let error = run_err("@endif\n");
        assert!(matches!(error.kind, ErrorKind::Syntax(_)));
    }

    #[test]
    fn elseif_after_else_is_a_syntax_error() {
        let source = indoc! {"
            @if false
            @else
            @elseif true
            @endif
        "};
        let error = run_err(source);
        assert!(matches!(error.kind, ErrorKind::Syntax(_)));
    }
}

mod macros {
    use super::*;

    #[test]
    fn definition_expansion_and_defaults() {
        // Unsupplied parameters read as absent.
        let source = indoc! {r#"
            @macro m(a, b, c)
            Hello, @{a}!
            Roses are @{b},
            And violets are @{defined(c) ? c : "of unknown color"}.
            @end
            @include m("username", 123)
        "#};
        assert_eq!(
            run(source),
            "Hello, username!\nRoses are 123,\nAnd violets are of unknown color.\n"
        );
    }

    #[test]
    fn parameters_shadow_and_restore_outer_bindings() {
        let source = indoc! {r#"
            @set p "outer"
            @macro m(p)
            inner @{p}
            @end
            @include m("arg")
            after @{p}
        "#};
        assert_eq!(run(source), "inner arg\nafter outer\n");
    }

    #[test]
    fn arguments_evaluate_in_the_callers_environment() {
        let source = indoc! {"
            @set X 20
            @macro m(a)
            @{a}
            @end
            @include m(X * 2 + 2)
        "};
        assert_eq!(run(source), "42\n");
    }

    #[test]
    fn body_lines_report_definition_site_line_numbers() {
        let source = indoc! {"
            first
            @macro m()
            line @{__LINE__}
            @end
            @include m()
        "};
        // The body line is line 3 of the defining file.
        assert_eq!(run(source), "first\nline 3\n");
    }

    #[test]
    fn conditionals_inside_bodies_are_captured_whole() {
        let source = indoc! {"
            @macro m(flag)
            @if flag
            on
            @end
            @end
            @include m(true)
            @include m(false)
            done
        "};
        assert_eq!(run(source), "on\ndone\n");
    }

    #[test]
    fn macro_sees_globals_set_after_definition() {
        let source = indoc! {"
            @macro m()
            value @{G}
            @end
            @set G 7
            @include m()
        "};
        assert_eq!(run(source), "value 7\n");
    }

    #[test]
    fn redefinition_warns() {
        let source = indoc! {"
            @macro m()
            one
            @end
            @macro m()
            two
            @end
            @include m()
        "};
        let mut diagnostics: Vec<Diagnostic> = vec![];
        let output = preprocessor(&[])
            .execute(source, "main.nut", ".", &mut diagnostics)
            .unwrap();
        assert_eq!(output, "two\n");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("redefined"));
    }

    #[test]
    fn definitions_in_dead_branches_are_not_registered() {
        let source = indoc! {"
            @if false
            @macro m()
            hidden
            @end
            @endif
            @include m
        "};
        // `m` is unbound, evaluates to null, and no reader serves "null".
        let error = run_err(source);
        assert!(matches!(error.kind, ErrorKind::UnknownSource(_)));
    }

    #[test]
    fn nested_macro_definition_is_a_syntax_error() {
        let source = indoc! {"
            @macro outer()
            @macro inner()
            @end
            @end
        "};
        let error = run_err(source);
        assert!(matches!(error.kind, ErrorKind::Syntax(ref m) if m.contains("nested")));
    }

    #[test]
    fn unclosed_macro_is_a_syntax_error() {
        let error = run_err("@macro m()\nbody\n");
        assert!(matches!(error.kind, ErrorKind::Syntax(_)));
    }

    #[test]
    fn stray_endmacro_is_a_syntax_error() {
        let error = run_err("@endmacro\n");
        assert!(matches!(error.kind, ErrorKind::Syntax(_)));
    }

    #[test]
    fn too_many_arguments_is_a_type_error() {
        let source = indoc! {"
            @macro m(a)
            @{a}
            @end
            @include m(1, 2)
        "};
        let error = run_err(source);
        assert!(matches!(error.kind, ErrorKind::Type(_)));
    }
}

mod includes {
    use super::*;

    #[test]
    fn include_splices_the_source() {
        let output = run_with_files(
            "top\n@include \"mem:inc.nut\"\nbottom\n",
            &[("mem:inc.nut", "included\n")],
        );
        assert_eq!(output, "top\nincluded\nbottom\n");
    }

    #[test]
    fn includes_nest_depth_first() {
        let output = run_with_files(
            "@include \"mem:a.nut\"\n",
            &[
                ("mem:a.nut", "a1\n@include \"mem:b.nut\"\na2\n"),
                ("mem:b.nut", "b\n"),
            ],
        );
        assert_eq!(output, "a1\nb\na2\n");
    }

    #[test]
    fn relative_includes_resolve_against_the_including_file() {
        let output = run_with_files(
            "@include \"mem:lib/a.nut\"\n",
            &[
                ("mem:lib/a.nut", "@include \"b.nut\"\n"),
                ("mem:lib/b.nut", "sibling\n"),
            ],
        );
        assert_eq!(output, "sibling\n");
    }

    #[test]
    fn reference_can_come_from_a_variable() {
        let output = run_with_files(
            "@set which \"mem:x.nut\"\n@include which\n",
            &[("mem:x.nut", "picked\n")],
        );
        assert_eq!(output, "picked\n");
    }

    #[test]
    fn macros_defined_in_includes_are_visible_after() {
        let output = run_with_files(
            "@include \"mem:defs.nut\"\n@include greet(\"world\")\n",
            &[("mem:defs.nut", "@macro greet(who)\nhi @{who}\n@end\n")],
        );
        assert_eq!(output, "hi world\n");
    }

    #[test]
    fn sets_in_includes_write_the_global_scope() {
        let output = run_with_files(
            "@include \"mem:defs.nut\"\n@{FROM_INCLUDE}\n",
            &[("mem:defs.nut", "@set FROM_INCLUDE 5\n")],
        );
        assert_eq!(output, "5\n");
    }

    #[test]
    fn file_pseudo_variable_tracks_the_frame() {
        let output = run_with_files(
            "@{__FILE__}\n@include \"mem:inc.nut\"\n@{__FILE__}\n",
            &[("mem:inc.nut", "@{__FILE__}\n")],
        );
        assert_eq!(output, "main.nut\nmem:inc.nut\nmain.nut\n");
    }

    #[test]
    fn unknown_scheme_is_an_unknown_source_error() {
        let error = run_err("@include \"gopher://x\"\n");
        assert!(matches!(error.kind, ErrorKind::UnknownSource(_)));
    }

    #[test]
    fn missing_entry_is_a_source_reading_error() {
        let error = run_err_with_files("@include \"mem:absent.nut\"\n", &[]);
        assert!(matches!(error.kind, ErrorKind::SourceReading { .. }));
    }

    #[test]
    fn direct_self_include_is_circular() {
        let error = run_err_with_files(
            "@include \"mem:a.nut\"\n",
            &[("mem:a.nut", "@include \"mem:a.nut\"\n")],
        );
        assert!(matches!(error.kind, ErrorKind::CircularInclude(_)));
    }

    #[test]
    fn transitive_cycle_is_detected_and_output_stops() {
        let error = run_err_with_files(
            "@include \"mem:a.nut\"\n",
            &[
                ("mem:a.nut", "@include \"mem:b.nut\"\n"),
                ("mem:b.nut", "@include \"mem:a.nut\"\n"),
            ],
        );
        assert!(matches!(error.kind, ErrorKind::CircularInclude(_)));
    }

    #[test]
    fn errors_carry_the_include_trace() {
        let error = run_err_with_files(
            "@include \"mem:a.nut\"\n",
            &[("mem:a.nut", "@error 'boom'\n")],
        );
        assert!(matches!(error.kind, ErrorKind::User(_)));
        assert_eq!(error.location.file, "mem:a.nut");
        assert_eq!(error.location.line, 1);
        assert_eq!(error.trace.len(), 1);
        assert_eq!(error.trace[0].file, "main.nut");
    }

    #[test]
    fn include_memoization_reads_once_when_enabled() {
        let reader = MemReader::new(&[("mem:x.nut", "x\n")]);
        let reads = reader.read_counter();
        let mut registry = ReaderRegistry::new();
        registry.register(reader);
        let mut preprocessor = Preprocessor::new(registry).with_options(Options {
            cache_includes: true,
            ..Options::default()
        });
        let output = preprocessor
            .execute(
                "@include \"mem:x.nut\"\n@include \"mem:x.nut\"\n",
                "main.nut",
                ".",
                &mut (),
            )
            .unwrap();
        assert_eq!(output, "x\nx\n");
        assert_eq!(reads.get(), 1);
    }

    #[test]
    fn repeated_includes_read_again_without_caching() {
        let reader = MemReader::new(&[("mem:x.nut", "x\n")]);
        let reads = reader.read_counter();
        let mut registry = ReaderRegistry::new();
        registry.register(reader);
        let mut preprocessor = Preprocessor::new(registry);
        preprocessor
            .execute(
                "@include \"mem:x.nut\"\n@include \"mem:x.nut\"\n",
                "main.nut",
                ".",
                &mut (),
            )
            .unwrap();
        assert_eq!(reads.get(), 2);
    }
}

mod errors {
    use super::*;

    #[test]
    fn error_directive_reports_the_evaluated_text() {
        // Unset PLATFORM concatenates as "null".
        let error = run_err("@error \"Platform is \" + PLATFORM + \" is unsupported\"\n");
        match error.kind {
            ErrorKind::User(message) => {
                assert_eq!(message, "Platform is null is unsupported");
            }
            other => panic!("expected a user error, got {other:?}"),
        }
    }

    #[test]
    fn error_text_is_prefixed_with_the_location() {
        let error = run_err("ok\n@error 'stop'\n");
        assert_eq!(error.to_string(), "main.nut:2: stop");
    }

    #[test]
    fn unparseable_splice_is_an_expr_error() {
        let error = run_err("@{1 +}\n");
        assert!(matches!(error.kind, ErrorKind::Expr(_)));
    }

    #[test]
    fn unterminated_splice_is_a_syntax_error() {
        let error = run_err("text @{oops\n");
        assert!(matches!(error.kind, ErrorKind::Syntax(_)));
        assert_eq!(error.location.column, 6);
    }

    #[test]
    fn unknown_function_is_a_name_error() {
        let error = run_err("@{sqrt(2)}\n");
        assert!(matches!(error.kind, ErrorKind::Name(_)));
    }

    #[test]
    fn type_errors_surface_from_directives() {
        let error = run_err("@if 1 < 'x'\n@endif\n");
        assert!(matches!(error.kind, ErrorKind::Type(_)));
    }

    #[test]
    fn no_output_is_kept_on_error() {
        let result = preprocessor(&[]).execute("before\n@error 'x'\n", "main.nut", ".", &mut ());
        assert!(result.is_err());
    }
}

mod line_control {
    use super::*;

    fn run_with_line_control(source: &str, files: &[(&str, &str)]) -> String {
        let mut registry = ReaderRegistry::new();
        registry.register(MemReader::new(files));
        Preprocessor::new(registry)
            .with_options(Options {
                generate_line_control: true,
                ..Options::default()
            })
            .execute(source, "main.nut", ".", &mut ())
            .unwrap()
    }

    #[test]
    fn markers_wrap_included_sources() {
        let output = run_with_line_control(
            "top\n@include \"mem:inc.nut\"\nbottom\n",
            &[("mem:inc.nut", "in\n")],
        );
        assert_eq!(
            output,
            indoc! {r#"
                #line 1 "main.nut"
                top
                #line 1 "mem:inc.nut"
                in
                #line 3 "main.nut"
                bottom
            "#}
        );
    }

    #[test]
    fn markers_restate_position_after_skipped_branches() {
        let output = run_with_line_control("a\n@if false\nhidden\n@endif\nb\n", &[]);
        assert_eq!(
            output,
            indoc! {r#"
                #line 1 "main.nut"
                a
                #line 5 "main.nut"
                b
            "#}
        );
    }

    #[test]
    fn consecutive_lines_need_no_markers() {
        let output = run_with_line_control("a\nb\n", &[]);
        assert_eq!(output, "#line 1 \"main.nut\"\na\nb\n");
    }
}

mod dependencies {
    use super::*;

    fn git_preprocessor(reader: FakeGitReader, options: Options) -> Preprocessor {
        let mut registry = ReaderRegistry::new();
        registry.register(reader);
        Preprocessor::new(registry).with_options(options)
    }

    #[test]
    fn save_records_resolved_commits() {
        let reader = FakeGitReader::new(&[(
            "fakegit:org/repo/x.nut",
            &[("c1", "v1\n"), ("c2", "v2\n")],
        )]);
        let mut preprocessor = git_preprocessor(
            reader,
            Options {
                save_dependencies: true,
                ..Options::default()
            },
        );
        let output = preprocessor
            .execute(
                "@include \"fakegit:org/repo/x.nut\"\n",
                "main.nut",
                ".",
                &mut (),
            )
            .unwrap();
        assert_eq!(output, "v2\n");
        assert_eq!(
            preprocessor.dependencies().get("fakegit:org/repo/x.nut"),
            Some("c2")
        );
    }

    #[test]
    fn pin_round_trip_survives_head_movement() {
        let reference = "fakegit:org/repo/x.nut";

        // First run records the pin while the head is at c1.
        let mut first = git_preprocessor(
            FakeGitReader::new(&[(reference, &[("c1", "old\n")])]),
            Options {
                save_dependencies: true,
                ..Options::default()
            },
        );
        let first_output = first
            .execute("@include \"fakegit:org/repo/x.nut\"\n", "main.nut", ".", &mut ())
            .unwrap();
        let pinned = first.dependencies().clone();

        // The remote head moves to c2; a pinned run still reproduces the
        // original output.
        let mut second = git_preprocessor(
            FakeGitReader::new(&[(reference, &[("c1", "old\n"), ("c2", "new\n")])]),
            Options::default(),
        )
        .with_dependencies(pinned);
        let second_output = second
            .execute("@include \"fakegit:org/repo/x.nut\"\n", "main.nut", ".", &mut ())
            .unwrap();

        assert_eq!(first_output, "old\n");
        assert_eq!(second_output, first_output);
    }

    #[test]
    fn unpinned_run_follows_the_head() {
        let reader = FakeGitReader::new(&[(
            "fakegit:org/repo/x.nut",
            &[("c1", "old\n"), ("c2", "new\n")],
        )]);
        let mut preprocessor = git_preprocessor(reader, Options::default());
        let output = preprocessor
            .execute(
                "@include \"fakegit:org/repo/x.nut\"\n",
                "main.nut",
                ".",
                &mut (),
            )
            .unwrap();
        assert_eq!(output, "new\n");
    }

    #[test]
    fn references_without_commits_are_not_recorded() {
        let mut registry = ReaderRegistry::new();
        registry.register(MemReader::new(&[("mem:x.nut", "x\n")]));
        let mut preprocessor = Preprocessor::new(registry).with_options(Options {
            save_dependencies: true,
            ..Options::default()
        });
        preprocessor
            .execute("@include \"mem:x.nut\"\n", "main.nut", ".", &mut ())
            .unwrap();
        assert!(preprocessor.dependencies().is_empty());
    }

    #[test]
    fn remote_relative_includes_stay_in_the_repo() {
        let reader = FakeGitReader::new(&[
            (
                "fakegit:org/repo/src/a.nut@v1",
                &[("c1", "@include \"b.nut\"\n")],
            ),
            ("fakegit:org/repo/src/b.nut@v1", &[("c2", "sibling\n")]),
        ]);
        let mut registry = ReaderRegistry::new();
        registry.register(reader);
        let mut preprocessor = Preprocessor::new(registry).with_options(Options {
            remote_relative_includes: true,
            ..Options::default()
        });
        let output = preprocessor
            .execute(
                "@include \"fakegit:org/repo/src/a.nut@v1\"\n",
                "main.nut",
                ".",
                &mut (),
            )
            .unwrap();
        assert_eq!(output, "sibling\n");
    }

    #[test]
    fn determinism_two_runs_same_output() {
        let files = [
            ("mem:a.nut", "a @{X}\n"),
            ("mem:b.nut", "b\n"),
        ];
        let source = "@set X 3\n@include \"mem:a.nut\"\n@include \"mem:b.nut\"\n";
        assert_eq!(run_with_files(source, &files), run_with_files(source, &files));
    }
}
