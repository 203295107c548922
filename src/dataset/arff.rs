//! ARFF export of labeled datasets, and a reader for the subset of ARFF the
//! export produces.
//!
//! Numeric columns are declared `NUMERIC`; every other column, the cluster
//! label included, is declared with its explicit category set. The cluster
//! label is always the last attribute and the identifier is never exported.

use super::{ColumnType, LabeledDataset};
use crate::error::{Result, SiftError};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Marker for a missing value.
const MISSING: &str = "?";

/// Declared type of an ARFF attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArffKind {
    Numeric,
    Nominal(Vec<String>),
}

/// One `@ATTRIBUTE` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArffAttribute {
    pub name: String,
    pub kind: ArffKind,
}

/// Parsed ARFF document. Cells are `None` where the file holds `?`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArffData {
    pub relation: String,
    pub attributes: Vec<ArffAttribute>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ArffData {
    /// Index of the attribute called `name`.
    #[must_use]
    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Values of one attribute across all rows.
    pub fn column(&self, index: usize) -> impl Iterator<Item = Option<&str>> {
        self.rows.iter().map(move |r| r[index].as_deref())
    }
}

/// Render a labeled dataset as ARFF text.
#[must_use]
pub fn render(relation: &str, labeled: &LabeledDataset, label_column: &str) -> String {
    let dataset = &labeled.dataset;
    let columns = dataset.frame().columns();
    let mut out = String::new();

    let _ = writeln!(out, "@RELATION {}", quote(&relation.to_uppercase()));

    for column in columns {
        let declared = match dataset.types().get(&column.name) {
            Some(ColumnType::Numeric) => "NUMERIC".to_string(),
            _ => category_set(column.values.iter().map(String::as_str)),
        };
        let _ = writeln!(out, "@ATTRIBUTE {} {}", quote(&column.name), declared);
    }

    let labels: Vec<String> = labeled.labels.iter().map(usize::to_string).collect();
    let label_set: BTreeSet<usize> = labeled.labels.iter().copied().collect();
    let _ = writeln!(
        out,
        "@ATTRIBUTE {} {{{}}}",
        quote(label_column),
        label_set
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(",")
    );

    out.push_str("@DATA\n");
    for (row, label) in labels.iter().enumerate() {
        let mut cells: Vec<String> = columns.iter().map(|c| cell(&c.values[row])).collect();
        cells.push(label.clone());
        out.push_str(&cells.join(","));
        out.push('\n');
    }

    out
}

/// Write the labeled export.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write(path: &Path, relation: &str, labeled: &LabeledDataset, label_column: &str) -> Result<()> {
    fs::write(path, render(relation, labeled, label_column))?;
    Ok(())
}

/// Read and parse an ARFF file.
///
/// # Errors
///
/// Returns [`SiftError::MissingFile`] or the errors of [`parse`].
pub fn read(path: &Path) -> Result<ArffData> {
    if !path.exists() {
        return Err(SiftError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    let content = fs::read_to_string(path)?;
    parse(&content).map_err(|e| match e {
        SiftError::DataFormat { message, .. } => {
            SiftError::data_format(path.display().to_string(), message)
        }
        other => other,
    })
}

/// Parse ARFF text.
///
/// # Errors
///
/// Returns [`SiftError::DataFormat`] on unsupported declarations, rows of
/// the wrong width or nominal values outside their declared set.
pub fn parse(content: &str) -> Result<ArffData> {
    let mut relation = String::new();
    let mut attributes: Vec<ArffAttribute> = Vec::new();
    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    let mut in_data = false;

    for (line_no, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('%') {
            continue;
        }
        let fail = |message: String| SiftError::data_format("arff", format!("line {}: {message}", line_no + 1));

        if in_data {
            let cells = split_quoted(line, ',');
            if cells.len() != attributes.len() {
                return Err(fail(format!(
                    "expected {} values, found {}",
                    attributes.len(),
                    cells.len()
                )));
            }
            let mut row = Vec::with_capacity(cells.len());
            for (value, attr) in cells.into_iter().zip(&attributes) {
                if value == MISSING {
                    row.push(None);
                    continue;
                }
                if let ArffKind::Nominal(categories) = &attr.kind {
                    if !categories.contains(&value) {
                        return Err(fail(format!(
                            "value '{value}' is not declared for '{}'",
                            attr.name
                        )));
                    }
                }
                row.push(Some(value));
            }
            rows.push(row);
            continue;
        }

        let (keyword, rest) = match line.split_once(char::is_whitespace) {
            Some((k, r)) => (k.to_ascii_uppercase(), r.trim()),
            None => (line.to_ascii_uppercase(), ""),
        };

        match keyword.as_str() {
            "@RELATION" => relation = unquote(rest),
            "@ATTRIBUTE" => {
                let (name, declared) = split_name(rest);
                let kind = parse_kind(declared.trim()).ok_or_else(|| {
                    fail(format!("unsupported attribute type '{}'", declared.trim()))
                })?;
                attributes.push(ArffAttribute { name, kind });
            }
            "@DATA" => in_data = true,
            other => return Err(fail(format!("unexpected keyword '{other}'"))),
        }
    }

    if !in_data {
        return Err(SiftError::data_format("arff", "no @DATA section"));
    }

    Ok(ArffData {
        relation,
        attributes,
        rows,
    })
}

// ----------------------------------------------------------------------------
// Internal helpers
// ----------------------------------------------------------------------------

fn category_set<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let categories: BTreeSet<&str> = values.filter(|v| !v.is_empty()).collect();
    let rendered: Vec<String> = categories.into_iter().map(quote).collect();
    format!("{{{}}}", rendered.join(","))
}

fn cell(value: &str) -> String {
    if value.is_empty() {
        MISSING.to_string()
    } else {
        quote(value)
    }
}

fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value == MISSING
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ',' | '\'' | '"' | '{' | '}' | '%'));
    if needs_quotes {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    } else {
        value.to_string()
    }
}

fn unquote(token: &str) -> String {
    let token = token.trim();
    if token.len() >= 2 && (token.starts_with('\'') || token.starts_with('"')) {
        let inner = &token[1..token.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(c);
            }
        }
        out
    } else {
        token.to_string()
    }
}

/// Split on `sep` outside quotes, unquoting each piece.
fn split_quoted(line: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote_char: Option<char> = None;
    let mut escaped = false;

    for c in line.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match (c, quote_char) {
            ('\\', Some(_)) => {
                current.push(c);
                escaped = true;
            }
            ('\'' | '"', None) => {
                quote_char = Some(c);
                current.push(c);
            }
            (q, Some(open)) if q == open => {
                quote_char = None;
                current.push(c);
            }
            (s, None) if s == sep => {
                parts.push(unquote(&current));
                current.clear();
            }
            _ => current.push(c),
        }
    }
    parts.push(unquote(&current));
    parts
}

/// Split an attribute declaration into its (unquoted) name and type.
fn split_name(rest: &str) -> (String, &str) {
    let rest = rest.trim_start();
    if let Some(open) = rest.chars().next().filter(|c| *c == '\'' || *c == '"') {
        let mut escaped = false;
        for (i, c) in rest.char_indices().skip(1) {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                return (unquote(&rest[..=i]), &rest[i + 1..]);
            }
        }
        (unquote(rest), "")
    } else {
        match rest.split_once(char::is_whitespace) {
            Some((name, declared)) => (name.to_string(), declared),
            None => (rest.to_string(), ""),
        }
    }
}

fn parse_kind(declared: &str) -> Option<ArffKind> {
    if declared.starts_with('{') && declared.ends_with('}') {
        let inner = declared[1..declared.len() - 1].trim();
        let categories = if inner.is_empty() {
            Vec::new()
        } else {
            split_quoted(inner, ',')
                .into_iter()
                .map(|s| s.trim().to_string())
                .collect()
        };
        return Some(ArffKind::Nominal(categories));
    }
    match declared.to_ascii_uppercase().as_str() {
        "NUMERIC" | "REAL" | "INTEGER" => Some(ArffKind::Numeric),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Clustering;
    use crate::testing::fixtures::demo_dataset;

    fn labeled() -> LabeledDataset {
        let ds = demo_dataset();
        let clustering = Clustering::new(ds.ids().to_vec(), vec![0, 1, 0, 1, 1], 0.3).unwrap();
        ds.label(&clustering).unwrap()
    }

    #[test]
    fn test_render_header() {
        let text = render("demo", &labeled(), "cluster_id");
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "@RELATION DEMO");
        assert_eq!(lines[1], "@ATTRIBUTE AGE NUMERIC");
        assert_eq!(lines[2], "@ATTRIBUTE SEX {F,M}");
        assert_eq!(lines[3], "@ATTRIBUTE MMSE NUMERIC");
        assert_eq!(lines[4], "@ATTRIBUTE APOE4 {0,1,2}");
        assert_eq!(lines[5], "@ATTRIBUTE HIPPO_VOL NUMERIC");
        assert_eq!(lines[6], "@ATTRIBUTE cluster_id {0,1}");
        assert_eq!(lines[7], "@DATA");
        assert_eq!(lines.len(), 8 + 5);
    }

    #[test]
    fn test_render_rows_end_with_label() {
        let text = render("demo", &labeled(), "cluster_id");
        let first_row = text.lines().nth(8).unwrap();
        assert!(first_row.starts_with("71,M,"));
        assert!(first_row.ends_with(",0"));
        assert!(!text.contains("p1"));
    }

    #[test]
    fn test_parse_rendered_export() {
        let parsed = parse(&render("demo", &labeled(), "cluster_id")).unwrap();

        assert_eq!(parsed.relation, "DEMO");
        assert_eq!(parsed.attributes.len(), 6);
        assert_eq!(parsed.attributes[5].name, "cluster_id");
        assert_eq!(
            parsed.attributes[5].kind,
            ArffKind::Nominal(vec!["0".into(), "1".into()])
        );
        assert_eq!(parsed.rows.len(), 5);
        assert_eq!(parsed.rows[0][1].as_deref(), Some("M"));
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("two words"), "'two words'");
        assert_eq!(quote("it's"), "'it\\'s'");
        assert_eq!(split_quoted("'a,b',c,'it\\'s'", ','), vec!["a,b", "c", "it's"]);
    }

    #[test]
    fn test_parse_quoted_attribute_name() {
        let text = "@relation x\n@attribute 'left hippo' numeric\n@attribute dx {'mild ci',ad}\n@data\n1.5,'mild ci'\n?,ad\n";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.attributes[0].name, "left hippo");
        assert_eq!(
            parsed.attributes[1].kind,
            ArffKind::Nominal(vec!["mild ci".into(), "ad".into()])
        );
        assert_eq!(parsed.rows[1][0], None);
    }

    #[test]
    fn test_parse_rejects_undeclared_category() {
        let text = "@relation x\n@attribute dx {a,b}\n@data\nc\n";
        assert!(matches!(parse(text).unwrap_err(), SiftError::DataFormat { .. }));
    }

    #[test]
    fn test_parse_rejects_ragged_row() {
        let text = "@relation x\n@attribute a numeric\n@attribute b numeric\n@data\n1\n";
        assert!(parse(text).is_err());
    }

    #[test]
    fn test_parse_rejects_string_attributes() {
        let text = "@relation x\n@attribute note string\n@data\n";
        assert!(parse(text).is_err());
    }
}
