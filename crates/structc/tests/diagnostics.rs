//! Layout error codes and their rendered diagnostics

use pretty_assertions::assert_eq;
use structc::types::ErrorCode;
use structc::{CompileError, DiagnosticReporter, FrontendConfig, LayoutConfig, Pipeline};

fn compile_error(source: &str) -> CompileError {
    Pipeline::default()
        .compile_source(source, "err.c")
        .expect_err("compilation should fail")
}

fn codes(err: &CompileError) -> Vec<&'static str> {
    err.flatten()
        .iter()
        .filter_map(|e| e.as_layout())
        .map(|e| e.code().as_str())
        .collect()
}

#[test]
fn every_layout_error_has_a_code() {
    let cases = [
        ("struct s { int a; int a; };", "E0101"),
        ("struct s { int a; }; int main(void) { struct s x; return x.nope; }", "E0102"),
        ("int main(void) { int x; return x.a; }", "E0103"),
        ("struct s { int a; }; int main(void) { struct s x; return x[1].a; }", "E0104"),
        ("char big[4611686018427387904][4];", "E0106"),
    ];
    for (source, code) in cases {
        assert_eq!(codes(&compile_error(source)), vec![code], "{}", source);
    }
}

#[test]
fn type_too_deep_respects_the_limit() {
    let config = FrontendConfig {
        layout: LayoutConfig::default().with_max_type_depth(2),
        ..FrontendConfig::default()
    };
    let pipeline = Pipeline::new(config);
    assert!(pipeline.compile_source("int *ok;", "deep.c").is_ok());
    let err = pipeline.compile_source("int **deep;", "deep.c").unwrap_err();
    assert_eq!(err.as_layout().map(|e| e.code()), Some(ErrorCode::TypeTooDeep));
}

#[test]
fn deep_declarators_are_reported_not_overflowed() {
    let handle = std::thread::Builder::new()
        .stack_size(64 << 20)
        .spawn(|| {
            let arrays = compile_error(&format!("int a{};", "[1]".repeat(5000)));
            let pointers = compile_error(&format!("int {}p;", "*".repeat(100_000)));
            let deep = compile_error(&format!("int {}p;", "*".repeat(100)));
            (arrays, pointers, deep)
        })
        .unwrap();
    let (arrays, pointers, deep) = handle.join().unwrap();
    assert!(matches!(arrays, CompileError::Parser { .. }), "{:?}", arrays);
    assert!(matches!(pointers, CompileError::Parser { .. }), "{:?}", pointers);
    assert_eq!(codes(&deep), vec!["E0105"]);

    let shallow = format!("int {}p;", "*".repeat(60));
    assert!(Pipeline::default().compile_source(&shallow, "deep.c").is_ok());
}

#[test]
fn oversized_structs_are_too_large() {
    let cases = [
        "struct s { int a[2305843009213693951]; int b[2305843009213693951]; int c; char d; };",
        "struct s { char a[9223372036854775807]; char b[9223372036854775807]; };",
        "struct s { int a; char b[9223372036854775803]; };",
    ];
    for source in cases {
        assert_eq!(codes(&compile_error(source)), vec!["E0106"], "{}", source);
    }
}

#[test]
fn errors_in_separate_functions_are_all_reported() {
    let err = compile_error(
        r"
        struct s { int a; };
        int f(void) { struct s x; return x.b; }
        int g(void) { int y; return y.a; }
        ",
    );
    assert_eq!(codes(&err), vec!["E0102", "E0103"]);
}

#[test]
fn rendered_diagnostic_points_at_member() {
    let source = "struct s { int a; };\nint main(void) { struct s x; return x.b; }\n";
    let err = compile_error(source);

    let mut reporter = DiagnosticReporter::new();
    let file_id = reporter.add_file("err.c", source);
    let text = reporter.render(file_id, &err);

    assert!(text.contains("error[E0102]"), "{}", text);
    assert!(text.contains("'b'"), "{}", text);
    assert!(text.contains("err.c:2:"), "{}", text);
}

#[test]
fn semantic_errors_are_not_layout_errors() {
    let err = compile_error("struct s { int a; }; struct s f(void) { struct s x; return x; }");
    assert!(codes(&err).is_empty());
    assert!(err.to_string().contains("returning a struct by value is not supported"));
}
