//! Error types and diagnostic reporting

use super::Span;
use crate::exec::ExecError;
use crate::types::LayoutError;
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, NoColor, StandardStream};
use thiserror::Error;

/// Compile error with source location
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Lexer error at {span:?}: {message}")]
    Lexer { message: String, span: Span },

    #[error("Parser error at {span:?}: {message}")]
    Parser { message: String, span: Span },

    #[error("Semantic error at {span:?}: {message}")]
    Semantic { message: String, span: Span },

    #[error("Type error at {span:?}: {message}")]
    Type { message: String, span: Span },

    #[error("Layout error [{}] at {:?}: {0}", .0.code(), .0.span())]
    Layout(#[from] LayoutError),

    #[error("Code generation error: {message}")]
    Codegen { message: String },

    #[error("Runtime error: {0}")]
    Runtime(#[from] ExecError),

    #[error("{} errors; first: {}", .0.len(), .0.first().map(ToString::to_string).unwrap_or_default())]
    Multiple(Vec<CompileError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    pub fn lexer(message: impl Into<String>, span: Span) -> Self {
        Self::Lexer {
            message: message.into(),
            span,
        }
    }

    pub fn parser(message: impl Into<String>, span: Span) -> Self {
        Self::Parser {
            message: message.into(),
            span,
        }
    }

    pub fn semantic(message: impl Into<String>, span: Span) -> Self {
        Self::Semantic {
            message: message.into(),
            span,
        }
    }

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        Self::Type {
            message: message.into(),
            span,
        }
    }

    pub fn codegen(message: impl Into<String>) -> Self {
        Self::Codegen {
            message: message.into(),
        }
    }

    /// Collapse a list of errors: one error stays as is
    pub fn from_many(mut errors: Vec<CompileError>) -> Self {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            Self::Multiple(errors)
        }
    }

    /// Every individual error, with `Multiple` flattened
    pub fn flatten(&self) -> Vec<&CompileError> {
        match self {
            CompileError::Multiple(errors) => errors.iter().flat_map(CompileError::flatten).collect(),
            other => vec![other],
        }
    }

    /// The layout error behind this error, if any
    pub fn as_layout(&self) -> Option<&LayoutError> {
        match self {
            CompileError::Layout(err) => Some(err),
            _ => None,
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Diagnostic reporter for pretty error output
pub struct DiagnosticReporter {
    files: SimpleFiles<String, String>,
    writer: StandardStream,
    config: term::Config,
}

impl DiagnosticReporter {
    pub fn new() -> Self {
        Self {
            files: SimpleFiles::new(),
            writer: StandardStream::stderr(ColorChoice::Auto),
            config: term::Config::default(),
        }
    }

    pub fn add_file(&mut self, name: impl Into<String>, source: impl Into<String>) -> usize {
        self.files.add(name.into(), source.into())
    }

    pub fn report_error(&self, file_id: usize, error: &CompileError) {
        for diagnostic in self.diagnostics(file_id, error) {
            let _ = term::emit(&mut self.writer.lock(), &self.config, &self.files, &diagnostic);
        }
    }

    /// Render an error without colors, as the terminal would show it
    pub fn render(&self, file_id: usize, error: &CompileError) -> String {
        let mut buffer = NoColor::new(Vec::new());
        for diagnostic in self.diagnostics(file_id, error) {
            let _ = term::emit(&mut buffer, &self.config, &self.files, &diagnostic);
        }
        String::from_utf8_lossy(&buffer.into_inner()).into_owned()
    }

    fn diagnostics(&self, file_id: usize, error: &CompileError) -> Vec<Diagnostic<usize>> {
        let labelled = |title: &str, message: &str, span: &Span| {
            Diagnostic::error()
                .with_message(title)
                .with_labels(vec![Label::primary(file_id, span.range()).with_message(message)])
        };

        match error {
            CompileError::Lexer { message, span } => vec![labelled("Lexer error", message, span)],
            CompileError::Parser { message, span } => vec![labelled("Syntax error", message, span)],
            CompileError::Semantic { message, span } => {
                vec![labelled("Semantic error", message, span)]
            }
            CompileError::Type { message, span } => vec![labelled("Type error", message, span)],

            CompileError::Layout(err) => {
                let mut labels = vec![Label::primary(file_id, err.span().range())];
                if let LayoutError::DuplicateMember { previous, .. } = err {
                    labels.push(
                        Label::secondary(file_id, previous.range())
                            .with_message("previous declaration is here"),
                    );
                }
                vec![
                    Diagnostic::error()
                        .with_message(err.to_string())
                        .with_code(err.code().as_str())
                        .with_labels(labels),
                ]
            }

            CompileError::Codegen { message } => {
                vec![Diagnostic::error().with_message(format!("Code generation error: {}", message))]
            }

            CompileError::Runtime(err) => {
                vec![Diagnostic::error().with_message(format!("Runtime error: {}", err))]
            }

            CompileError::Multiple(errors) => errors
                .iter()
                .flat_map(|err| self.diagnostics(file_id, err))
                .collect(),

            CompileError::Io(err) => {
                vec![Diagnostic::error().with_message(format!("IO error: {}", err))]
            }
        }
    }
}

impl Default for DiagnosticReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_duplicate_member() {
        let source = "struct s { int a; int a; };";
        let mut reporter = DiagnosticReporter::new();
        let file_id = reporter.add_file("dup.c", source);

        let error = CompileError::from(LayoutError::DuplicateMember {
            name: "a".to_string(),
            span: Span::new(22, 23),
            previous: Span::new(15, 16),
        });
        let text = reporter.render(file_id, &error);

        assert!(text.contains("error[E0101]: duplicate member 'a'"));
        assert!(text.contains("previous declaration is here"));
        assert!(text.contains("dup.c:1:23"));
    }

    #[test]
    fn test_multiple_flattens() {
        let error = CompileError::from_many(vec![
            CompileError::semantic("first", Span::new(0, 1)),
            CompileError::Multiple(vec![
                CompileError::parser("second", Span::new(1, 2)),
                CompileError::codegen("third"),
            ]),
        ]);
        assert_eq!(error.flatten().len(), 3);

        let single = CompileError::from_many(vec![CompileError::codegen("only")]);
        assert!(matches!(single, CompileError::Codegen { .. }));
    }
}
