//! Template variable inventory.
//!
//! Parses a template statically (nothing is rendered) and lists the context names it
//! reads. Names bound inside the template (`for` targets, `set`, macro parameters,
//! imports) and names the template engine provides are not part of the inventory.

mod analyzer;
mod lexer;
mod scanner;

use crate::domain::model::Template;
use serde::Serialize;
use std::collections::BTreeSet;

/// Malformed template; carries enough location to find the problem in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("syntax error in template '{template}' at line {line}, column {column}: {message}")]
pub struct TemplateSyntaxError {
    pub template: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
    /// The offending source line, trimmed.
    pub fragment: String,
}

/// Line (1-based), column (1-based, in chars) and trimmed line text for a byte offset.
fn locate(source: &str, offset: usize) -> (usize, usize, String) {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = source[line_start..offset].chars().count() + 1;
    let line_end = source[line_start..]
        .find('\n')
        .map(|i| line_start + i)
        .unwrap_or(source.len());
    (line, column, source[line_start..line_end].trim().to_string())
}

/// Variable inventory of raw template text, as sorted dotted paths.
pub fn analyze_source(name: &str, source: &str) -> Result<BTreeSet<String>, TemplateSyntaxError> {
    analyzer::analyze(source).map_err(|issue| {
        let (line, column, fragment) = locate(source, issue.offset);
        TemplateSyntaxError {
            template: name.to_string(),
            line,
            column,
            message: issue.message,
            fragment,
        }
    })
}

/// Variable inventory of a loaded template.
pub fn variables_of(template: &Template) -> Result<BTreeSet<String>, TemplateSyntaxError> {
    let names = analyze_source(&template.name, &template.source)?;
    tracing::trace!(
        service = %template.service,
        template = %template.name,
        count = names.len(),
        "template inventory built"
    );
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_of_service_template() {
        let template = Template::new(
            "web",
            "nginx.conf.j2",
            "server {\n  listen {{ service.port }};\n  server_name {{ host.ip }};\n}\n",
        );
        let names: Vec<String> = variables_of(&template).unwrap().into_iter().collect();
        assert_eq!(names, vec!["host.ip", "service.port"]);
    }

    #[test]
    fn test_empty_template_has_no_variables() {
        assert!(analyze_source("empty.j2", "").unwrap().is_empty());
        assert!(analyze_source("static.j2", "just text\n").unwrap().is_empty());
    }

    #[test]
    fn test_syntax_error_reports_line_and_fragment() {
        let source = "a: 1\nb: {{ service.port \nc: 3\n";
        let err = analyze_source("broken.j2", source).unwrap_err();
        assert_eq!(err.template, "broken.j2");
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 4);
        assert_eq!(err.fragment, "b: {{ service.port");
    }

    #[test]
    fn test_unclosed_if_points_at_opening_line() {
        let source = "x\n\n  {% if enabled %}\nyes\n";
        let err = analyze_source("cond.j2", source).unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.fragment, "{% if enabled %}");
        assert!(err.to_string().contains("cond.j2"));
    }

    #[test]
    fn test_non_ascii_is_a_syntax_error_not_a_crash() {
        let err = analyze_source("t.j2", "{{ name \nÜbersicht\n").unwrap_err();
        assert_eq!((err.line, err.column), (1, 1));
        assert_eq!(err.fragment, "{{ name");

        let err = analyze_source("t.j2", "{{ café }}").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("'é'"));
    }

    #[test]
    fn test_locate_counts_chars_not_bytes() {
        let (line, column, _) = locate("é{{", 2);
        assert_eq!((line, column), (1, 2));
    }
}
