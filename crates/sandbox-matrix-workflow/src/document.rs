//! Line-oriented view of a workflow file.
//!
//! Job blocks are located by scanning lines, never by parsing the file into a
//! structured model, so that every byte outside an edited value survives.
//!
//! A job block is a header line `- <job>:` followed by deeper-indented lines.
//! It ends at the first significant line (not blank, not a comment) indented
//! at or below the header.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const PARALLELISM_KEY: &str = "parallelism:";

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^(?P<indent>[ \t]*)-[ \t]+(?P<name>[^\s:#'"][^\s:]*):[ \t]*(?:#.*)?$"#)
            .expect("job header pattern is valid")
    })
}

/// Line content without a trailing carriage return.
pub(crate) fn content(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

pub(crate) fn indentation(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

fn is_insignificant(line: &str) -> bool {
    let trimmed = content(line).trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Parallelism as declared by a job block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DeclaredParallelism {
    /// `parallelism: <n>` is present.
    Explicit(usize),
    /// No declaration; the job runs with the default.
    Implicit(usize),
    /// A declaration whose value is not an integer, kept verbatim.
    Unparseable(String),
}

impl DeclaredParallelism {
    /// The executor count CI will actually use, when known.
    pub fn effective(&self) -> Option<usize> {
        match self {
            DeclaredParallelism::Explicit(n) | DeclaredParallelism::Implicit(n) => Some(*n),
            DeclaredParallelism::Unparseable(_) => None,
        }
    }

    pub fn is_implicit(&self) -> bool {
        matches!(self, DeclaredParallelism::Implicit(_))
    }

    fn parse(raw: &str) -> Self {
        let unquoted = raw
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| raw.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(raw);
        match unquoted.parse::<usize>() {
            Ok(n) => DeclaredParallelism::Explicit(n),
            Err(_) => DeclaredParallelism::Unparseable(raw.to_string()),
        }
    }
}

impl fmt::Display for DeclaredParallelism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredParallelism::Explicit(n) | DeclaredParallelism::Implicit(n) => write!(f, "{n}"),
            DeclaredParallelism::Unparseable(raw) => write!(f, "\"{raw}\""),
        }
    }
}

/// A `parallelism:` line inside a job block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelismLine {
    /// Zero-based line index.
    pub line: usize,
    /// Byte span of the value token within the line.
    pub value_start: usize,
    pub value_end: usize,
    pub raw: String,
}

impl ParallelismLine {
    fn scan(index: usize, line: &str) -> Self {
        let text = content(line);
        let after_key = indentation(text) + PARALLELISM_KEY.len();
        let value_start = after_key + indentation(&text[after_key..]);

        let tail = &text[value_start..];
        let comment = tail
            .char_indices()
            .find(|&(i, c)| {
                c == '#' && (i == 0 || tail[..i].ends_with([' ', '\t']))
            })
            .map(|(i, _)| i)
            .unwrap_or(tail.len());
        let value = tail[..comment].trim_end();

        Self {
            line: index,
            value_start,
            value_end: value_start + value.len(),
            raw: value.to_string(),
        }
    }

    pub fn declared(&self) -> DeclaredParallelism {
        DeclaredParallelism::parse(&self.raw)
    }

    /// Rewrite `original` with a new value, keeping indentation, any
    /// trailing comment and the line ending.
    pub fn rewrite(&self, original: &str, value: usize) -> String {
        let prefix = &original[..self.value_start];
        let rest = &original[self.value_end..];

        let mut line = String::with_capacity(original.len() + 4);
        line.push_str(prefix);
        if !prefix.ends_with([' ', '\t']) {
            line.push(' ');
        }
        line.push_str(&value.to_string());
        if rest.starts_with('#') {
            line.push(' ');
        }
        line.push_str(rest);
        line
    }
}

/// A located job block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobBlock {
    pub name: String,
    /// Zero-based index of the header line.
    pub header_line: usize,
    pub header_indent: usize,
    /// Indentation of the first significant body line, if any.
    pub body_indent: Option<usize>,
    /// Exclusive end of the block.
    pub end_line: usize,
    pub parallelism: Option<ParallelismLine>,
    name_column: usize,
}

impl JobBlock {
    /// Indentation for a key inserted into this block.
    pub fn insertion_indent(&self) -> usize {
        self.body_indent.unwrap_or(self.name_column + 2)
    }

    pub fn declared_parallelism(&self, default: usize) -> DeclaredParallelism {
        match &self.parallelism {
            Some(line) => line.declared(),
            None => DeclaredParallelism::Implicit(default),
        }
    }
}

/// Result of looking a job up by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobLookup {
    Found(JobBlock),
    Missing,
    /// More than one header carries the name; zero-based line indices.
    Ambiguous { lines: Vec<usize> },
}

#[derive(Debug, Clone)]
struct JobHeader {
    line: usize,
    indent: usize,
    name_column: usize,
    name: String,
}

/// A workflow file split into lines, with job headers indexed once.
#[derive(Debug, Clone)]
pub struct WorkflowDocument<'a> {
    lines: Vec<&'a str>,
    headers: Vec<JobHeader>,
}

impl<'a> WorkflowDocument<'a> {
    pub fn parse(text: &'a str) -> Self {
        let lines: Vec<&str> = text.split('\n').collect();
        let headers = lines
            .iter()
            .enumerate()
            .filter_map(|(index, line)| {
                let captures = header_pattern().captures(content(line))?;
                let indent = captures.name("indent")?.as_str().len();
                let name = captures.name("name")?;
                Some(JobHeader {
                    line: index,
                    indent,
                    name_column: name.start(),
                    name: name.as_str().to_string(),
                })
            })
            .collect();
        Self { lines, headers }
    }

    /// Lines as split on `\n`; a trailing `\r` stays with its line.
    pub fn lines(&self) -> &[&'a str] {
        &self.lines
    }

    /// Names of every job that opens a block, in file order.
    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.headers.iter().map(|h| h.name.as_str())
    }

    /// Whether the file uses CRLF line endings.
    pub fn uses_crlf(&self) -> bool {
        self.lines.first().is_some_and(|line| line.ends_with('\r'))
    }

    pub fn find_job(&self, name: &str) -> JobLookup {
        let matches: Vec<&JobHeader> = self.headers.iter().filter(|h| h.name == name).collect();
        match matches.as_slice() {
            [] => JobLookup::Missing,
            [header] => JobLookup::Found(self.scan_block(header)),
            many => JobLookup::Ambiguous {
                lines: many.iter().map(|h| h.line).collect(),
            },
        }
    }

    fn scan_block(&self, header: &JobHeader) -> JobBlock {
        let mut body_indent = None;
        let mut parallelism = None;
        let mut end_line = self.lines.len();

        for (index, line) in self.lines.iter().enumerate().skip(header.line + 1) {
            if is_insignificant(line) {
                continue;
            }
            let indent = indentation(line);
            if indent <= header.indent {
                end_line = index;
                break;
            }
            let block_indent = *body_indent.get_or_insert(indent);
            if parallelism.is_none()
                && indent == block_indent
                && content(line)
                    .trim_start_matches([' ', '\t'])
                    .starts_with(PARALLELISM_KEY)
            {
                parallelism = Some(ParallelismLine::scan(index, line));
            }
        }

        JobBlock {
            name: header.name.clone(),
            header_line: header.line,
            header_indent: header.indent,
            body_indent,
            end_line,
            parallelism,
            name_column: header.name_column,
        }
    }
}
