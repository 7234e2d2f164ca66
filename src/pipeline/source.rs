//! Step file parsing
//!
//! A step file is a sequence of blocks separated by lines containing only
//! `'''`. Blocks alternate between code and markdown, starting with code:
//!
//! ```text
//! #!param n = 10
//! '''
//! # Title
//! '''
//! rows = range(n)
//! '''
//! '''
//! total = sum(rows)
//! ```
//!
//! An empty `'''`/`'''` pair therefore splits one code block into two steps.
//! A code line consisting of `return` ends the file. `#!param` lines declare
//! parameters and are not part of any step.

use crate::error::{Error, Result};
use crate::executor::calc::eval_literal;
use crate::executor::Parameters;

use super::params::{ParamDecl, ParamSchema};

const DELIMITER: &str = "'''";
const PARAM_DIRECTIVE: &str = "#!param";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Code,
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub kind: CellKind,
    pub source: String,
}

impl Cell {
    pub fn code(source: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Code,
            source: source.into(),
        }
    }

    pub fn markdown(source: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Markdown,
            source: source.into(),
        }
    }
}

/// Cells and parameter declarations read from a step file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepSource {
    pub cells: Vec<Cell>,
    pub schema: ParamSchema,
}

pub fn parse_step_source(text: &str) -> Result<StepSource> {
    let mut source = StepSource::default();
    let mut buffer = String::new();
    let mut inside_markdown = false;

    for (lineno, line) in text.lines().enumerate() {
        let trimmed = line.trim();

        if !inside_markdown && trimmed == "return" {
            tracing::debug!(line = lineno + 1, "return statement, ignoring the rest of the file");
            break;
        }

        let directive = trimmed
            .strip_prefix(PARAM_DIRECTIVE)
            .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace));
        if let (false, Some(rest)) = (inside_markdown, directive) {
            let decl = parse_param_directive(rest, lineno + 1)?;
            source.schema.declare(decl).map_err(|e| Error::Parse {
                line: lineno + 1,
                message: e.to_string(),
            })?;
            continue;
        }

        if trimmed == DELIMITER {
            flush(&mut source.cells, &buffer, inside_markdown);
            buffer.clear();
            inside_markdown = !inside_markdown;
            continue;
        }

        buffer.push_str(line);
        buffer.push('\n');
    }

    // An unterminated markdown block is kept as markdown
    flush(&mut source.cells, &buffer, inside_markdown);

    Ok(source)
}

fn flush(cells: &mut Vec<Cell>, buffer: &str, markdown: bool) {
    if buffer.trim().is_empty() {
        return;
    }
    if markdown {
        cells.push(Cell::markdown(buffer.trim_end()));
    } else {
        cells.push(Cell::code(buffer.trim()));
    }
}

fn parse_param_directive(rest: &str, line: usize) -> Result<ParamDecl> {
    let parse_error = |message: String| Error::Parse { line, message };

    let (name, default) = match rest.split_once('=') {
        Some((name, default)) => (name.trim(), Some(default.trim())),
        None => (rest.trim(), None),
    };

    let valid_name = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    if !valid_name {
        return Err(parse_error(format!("invalid parameter name '{}'", name)));
    }

    match default {
        None => Ok(ParamDecl::required(name)),
        Some(text) => {
            let value = eval_literal(text).map_err(|e| {
                parse_error(format!("invalid default for parameter '{}': {}", name, e))
            })?;
            Ok(ParamDecl::with_default(name, value))
        }
    }
}

/// Code cell that binds the run's parameters, `None` without parameters
pub fn parameter_cell(parameters: &Parameters) -> Option<Cell> {
    if parameters.is_empty() {
        return None;
    }
    let mut source = String::from("# Parameters:");
    for (name, value) in parameters {
        source.push('\n');
        source.push_str(&format!("{} = {}", name, value));
    }
    Some(Cell::code(source))
}

/// Insert the parameter cell: after a leading markdown title, otherwise first
pub fn with_parameter_cell(cells: &[Cell], parameters: &Parameters) -> Vec<Cell> {
    let mut cells = cells.to_vec();
    if let Some(cell) = parameter_cell(parameters) {
        let position = match cells.first() {
            Some(first) if first.kind == CellKind::Markdown => 1,
            _ => 0,
        };
        cells.insert(position, cell);
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Value;

    const NOTEBOOK: &str = r#"
'''
# This is markdown.
'''

thisisunique = 100
x = 10
y = 3
y

'''
# Title

This text is rendered as Markdown
'''

x + y

'''
'''

z = x + x
z
"#;

    #[test]
    fn test_blocks_alternate_code_and_markdown() {
        let source = parse_step_source(NOTEBOOK).unwrap();
        let kinds: Vec<CellKind> = source.cells.iter().map(|c| c.kind).collect();

        assert_eq!(
            kinds,
            vec![
                CellKind::Markdown,
                CellKind::Code,
                CellKind::Markdown,
                CellKind::Code,
                CellKind::Code
            ]
        );
        assert_eq!(source.cells[1].source, "thisisunique = 100\nx = 10\ny = 3\ny");
        assert_eq!(source.cells[4].source, "z = x + x\nz");
    }

    #[test]
    fn test_return_ends_file() {
        let source = parse_step_source("a = 1\nreturn\nb = 2\n").unwrap();
        assert_eq!(source.cells, vec![Cell::code("a = 1")]);
    }

    #[test]
    fn test_return_inside_markdown_is_text() {
        let source = parse_step_source("'''\nreturn\n'''\na = 1\n").unwrap();
        assert_eq!(source.cells.len(), 2);
        assert_eq!(source.cells[0], Cell::markdown("return"));
    }

    #[test]
    fn test_param_directives() {
        let text = "#!param alpha\n#!param a = 100\n#!param label = \"run\"\nalpha * a\n";
        let source = parse_step_source(text).unwrap();

        assert_eq!(source.cells, vec![Cell::code("alpha * a")]);
        let decls = source.schema.decls();
        assert_eq!(decls.len(), 3);
        assert!(decls[0].is_required());
        assert_eq!(decls[1].default, Some(Value::Int(100)));
        assert_eq!(decls[2].default, Some(Value::Str("run".to_string())));

        let source = parse_step_source("#!params are listed above\nx = 1\n").unwrap();
        assert!(source.schema.is_empty());
        assert_eq!(source.cells, vec![Cell::code("#!params are listed above\nx = 1")]);
    }

    #[test]
    fn test_invalid_param_directive() {
        let err = parse_step_source("x = 1\n#!param 9lives\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));

        let err = parse_step_source("#!param n = undefined\n").unwrap_err();
        assert!(err.to_string().contains("invalid default"));

        let err = parse_step_source("#!param n\n#!param n = 1\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }));
    }

    #[test]
    fn test_parameter_cell_position() {
        let mut params = Parameters::new();
        params.insert("b".to_string(), Value::Int(2));
        params.insert("a".to_string(), Value::Str("x".to_string()));

        let titled = vec![Cell::markdown("# Title"), Cell::code("a")];
        let cells = with_parameter_cell(&titled, &params);
        assert_eq!(cells[1], Cell::code("# Parameters:\na = \"x\"\nb = 2"));

        let untitled = vec![Cell::code("a")];
        let cells = with_parameter_cell(&untitled, &params);
        assert_eq!(cells[0].kind, CellKind::Code);
        assert!(cells[0].source.starts_with("# Parameters:"));

        assert_eq!(with_parameter_cell(&untitled, &Parameters::new()), untitled);
    }

    #[test]
    fn test_parameter_cell_binds_exact_values() {
        use crate::executor::{CalcExecutor, Executor};
        use crate::step::Step;

        let mut params = Parameters::new();
        params.insert("n".to_string(), Value::Int(i64::MIN));
        params.insert("label".to_string(), Value::Str("a\u{7f}\"b\"\nc\\".to_string()));
        params.insert("ratio".to_string(), Value::Float(0.1 + 0.2));

        let Some(cell) = parameter_cell(&params) else {
            panic!("expected a parameter cell");
        };
        let mut executor = CalcExecutor::new();
        executor.run(&Step::new(0, cell.source)).unwrap();

        for (name, value) in &params {
            assert_eq!(executor.get(name), Some(value), "{}", name);
        }
    }
}
