//! Segmentation of Python test files.
//!
//! A file is split into an ordered list of chunks whose concatenation is
//! byte-identical to the input: verbatim text (imports, helpers, comments,
//! blank lines) and test functions together with their decorators. Test
//! functions are top-level `def test*` / `async def test*` definitions and
//! the same definitions directly inside a top-level `class Test*`; the
//! latter are named `Class::method`, as in pytest node ids. Bracket depth,
//! line continuations and triple-quoted strings are tracked so that
//! multi-line decorators and docstrings never look like statements.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

fn test_def() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:async\s+)?def\s+(test\w*)").expect("valid regex"))
}

fn test_class() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^class\s+(Test\w*)").expect("valid regex"))
}

/// One test function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFunction {
    /// `test_name`, or `TestClass::test_name` for methods.
    pub name: String,
    /// Decorators, signature and body, exactly as in the file.
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Chunk {
    Verbatim(String),
    Test {
        func: TestFunction,
        /// A later definition with the same name replaces this one at import time.
        shadowed: bool,
        /// Index into `TestModule::classes` for methods.
        class: Option<usize>,
    },
}

/// Body layout of a `class Test*` holding at least one test method.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ClassScope {
    /// Leading whitespace of the class body.
    indent: String,
    /// The body has statements besides test methods.
    has_other_members: bool,
}

/// How to rewrite a test when re-rendering a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestEdit {
    Replace(String),
    Drop,
}

/// A parsed test file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestModule {
    chunks: Vec<Chunk>,
    classes: Vec<ClassScope>,
}

struct TestRange {
    first: usize,
    end: usize,
    name: String,
    class: Option<usize>,
}

impl TestModule {
    pub fn parse(text: &str) -> Self {
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        let statements = statement_starts(&lines);
        let top: Vec<usize> = statements.iter().filter(|s| s.indent == 0).map(|s| s.line).collect();

        let mut ranges: Vec<TestRange> = Vec::new();
        let mut classes: Vec<ClassScope> = Vec::new();
        let mut pending_decorator: Option<usize> = None;
        for (pos, &start) in top.iter().enumerate() {
            let line = lines[start];
            if line.starts_with('@') {
                pending_decorator.get_or_insert(start);
                continue;
            }
            let first = pending_decorator.take().unwrap_or(start);
            let next = top.get(pos + 1).copied().unwrap_or(lines.len());

            if let Some(name) = test_def().captures(line).map(|c| c[1].to_string()) {
                let end = trim_filler(&lines, start, next, 0);
                ranges.push(TestRange {
                    first,
                    end,
                    name,
                    class: None,
                });
            } else if let Some(class_name) = test_class().captures(line).map(|c| c[1].to_string()) {
                let body: Vec<&Statement> = statements.iter().filter(|s| s.line > start && s.line < next).collect();
                if let Some(scope) = class_methods(&lines, &body, next, &class_name, classes.len(), &mut ranges) {
                    classes.push(scope);
                }
            }
        }

        let mut chunks = Vec::new();
        let mut cursor = 0;
        for TestRange { first, end, name, class } in ranges {
            if first > cursor {
                chunks.push(Chunk::Verbatim(lines[cursor..first].concat()));
            }
            chunks.push(Chunk::Test {
                func: TestFunction {
                    name,
                    source: lines[first..end].concat(),
                },
                shadowed: false,
                class,
            });
            cursor = end;
        }
        if cursor < lines.len() {
            chunks.push(Chunk::Verbatim(lines[cursor..].concat()));
        }

        let mut last_definition: HashMap<String, usize> = HashMap::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            if let Chunk::Test { func, .. } = chunk {
                last_definition.insert(func.name.clone(), idx);
            }
        }
        for (idx, chunk) in chunks.iter_mut().enumerate() {
            if let Chunk::Test { func, shadowed, .. } = chunk {
                *shadowed = last_definition.get(&func.name) != Some(&idx);
            }
        }

        Self { chunks, classes }
    }

    /// Effective test functions (the last definition of each name), in file order.
    pub fn tests(&self) -> Vec<&TestFunction> {
        self.chunks
            .iter()
            .filter_map(|chunk| match chunk {
                Chunk::Test {
                    func,
                    shadowed: false,
                    ..
                } => Some(func),
                _ => None,
            })
            .collect()
    }

    pub fn test(&self, name: &str) -> Option<&TestFunction> {
        self.tests().into_iter().find(|t| t.name == name)
    }

    /// Reassemble the file unchanged.
    pub fn render(&self) -> String {
        self.render_with(&HashMap::new())
    }

    /// Reassemble the file, applying `edits` (keyed by test name) to the
    /// effective definition of each named test. Everything else is emitted
    /// verbatim.
    ///
    /// Replacements for methods are re-indented to the class body. A class
    /// whose only members are all dropped keeps a `pass` body.
    pub fn render_with(&self, edits: &HashMap<String, TestEdit>) -> String {
        let dropped = |func: &TestFunction, shadowed: bool| !shadowed && matches!(edits.get(&func.name), Some(TestEdit::Drop));

        let mut survivors = vec![0usize; self.classes.len()];
        for chunk in &self.chunks {
            if let Chunk::Test {
                func,
                shadowed,
                class: Some(c),
            } = chunk
            {
                if !dropped(func, *shadowed) {
                    survivors[*c] += 1;
                }
            }
        }

        let mut padded = vec![false; self.classes.len()];
        let mut out = String::new();
        for chunk in &self.chunks {
            match chunk {
                Chunk::Verbatim(text) => out.push_str(text),
                Chunk::Test { func, shadowed, class } => match edits.get(&func.name) {
                    Some(TestEdit::Replace(code)) if !shadowed => {
                        let indent = class.map(|c| self.classes[c].indent.as_str()).unwrap_or("");
                        out.push_str(&reindent(code.trim_end(), indent));
                        if func.source.ends_with('\n') {
                            out.push('\n');
                        }
                    }
                    Some(TestEdit::Drop) if !shadowed => {
                        if let Some(c) = *class {
                            let scope = &self.classes[c];
                            if survivors[c] == 0 && !scope.has_other_members && !padded[c] {
                                out.push_str(&scope.indent);
                                out.push_str("pass\n");
                                padded[c] = true;
                            }
                        }
                    }
                    _ => out.push_str(&func.source),
                },
            }
        }
        out
    }
}

/// Collect the test methods of one `class Test*` body into `ranges`.
///
/// `body` holds the statements between the class header and `class_end`.
fn class_methods(
    lines: &[&str],
    body: &[&Statement],
    class_end: usize,
    class_name: &str,
    class_idx: usize,
    ranges: &mut Vec<TestRange>,
) -> Option<ClassScope> {
    let body_indent = body.first()?.indent;
    let members: Vec<usize> = body.iter().filter(|s| s.indent == body_indent).map(|s| s.line).collect();

    let mut has_other_members = false;
    let mut found = 0;
    let mut pending_decorator: Option<usize> = None;
    for (pos, &start) in members.iter().enumerate() {
        let statement = lines[start].trim_start();
        if statement.starts_with('@') {
            pending_decorator.get_or_insert(start);
            continue;
        }
        let first = pending_decorator.take().unwrap_or(start);
        let Some(method) = test_def().captures(statement).map(|c| c[1].to_string()) else {
            has_other_members = true;
            continue;
        };
        let next = members.get(pos + 1).copied().unwrap_or(class_end);
        ranges.push(TestRange {
            first,
            end: trim_filler(lines, start, next, body_indent),
            name: format!("{class_name}::{method}"),
            class: Some(class_idx),
        });
        found += 1;
    }

    if found == 0 {
        return None;
    }
    let first_line = lines[members[0]];
    Some(ClassScope {
        indent: first_line[..leading_whitespace(first_line)].to_string(),
        has_other_members,
    })
}

/// Pull `end` back over trailing blank lines and comments indented at most `max_indent`.
fn trim_filler(lines: &[&str], start: usize, mut end: usize, max_indent: usize) -> usize {
    while end > start + 1 && is_trailing_filler(lines[end - 1], max_indent) {
        end -= 1;
    }
    end
}

/// Blank lines and comments after a body belong to the gap, not the function.
fn is_trailing_filler(line: &str, max_indent: usize) -> bool {
    line.trim().is_empty() || (line.trim_start().starts_with('#') && leading_whitespace(line) <= max_indent)
}

/// Byte length of the leading spaces and tabs.
fn leading_whitespace(line: &str) -> usize {
    line.bytes().take_while(|b| *b == b' ' || *b == b'\t').count()
}

/// Shift `code` so its least-indented line starts at `indent`.
fn reindent(code: &str, indent: &str) -> String {
    let common = code
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(leading_whitespace)
        .min()
        .unwrap_or(0);
    code.split_inclusive('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{indent}{}", &line[common.min(leading_whitespace(line))..])
            }
        })
        .collect()
}

#[derive(Default)]
struct ScanState {
    depth: usize,
    triple: Option<char>,
    continued: bool,
}

struct Statement {
    line: usize,
    indent: usize,
}

/// Lines that begin a statement, with their indentation.
fn statement_starts(lines: &[&str]) -> Vec<Statement> {
    let mut state = ScanState::default();
    let mut starts = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let at_statement = state.depth == 0 && state.triple.is_none() && !state.continued;
        let body = line.trim_start();
        if at_statement && !body.trim().is_empty() && !body.starts_with('#') {
            starts.push(Statement {
                line: idx,
                indent: leading_whitespace(line),
            });
        }
        scan_line(line, &mut state);
    }
    starts
}

fn scan_line(line: &str, state: &mut ScanState) {
    let chars: Vec<char> = line.trim_end_matches(['\n', '\r']).chars().collect();
    let mut i = 0;
    state.continued = false;

    while i < chars.len() {
        if let Some(q) = state.triple {
            if chars[i] == '\\' {
                i += 2;
            } else if chars[i] == q && chars.get(i + 1) == Some(&q) && chars.get(i + 2) == Some(&q) {
                state.triple = None;
                i += 3;
            } else {
                i += 1;
            }
            continue;
        }

        match chars[i] {
            '#' => return,
            '(' | '[' | '{' => state.depth += 1,
            ')' | ']' | '}' => state.depth = state.depth.saturating_sub(1),
            q @ ('"' | '\'') => {
                if chars.get(i + 1) == Some(&q) && chars.get(i + 2) == Some(&q) {
                    state.triple = Some(q);
                    i += 3;
                    continue;
                }
                i += 1;
                while i < chars.len() && chars[i] != q {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            '\\' if i + 1 == chars.len() => state.continued = true,
            _ => {}
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#""""Property-based tests for calc module.

def test_not_real():
    this is inside the module docstring
"""

import hypothesis
from hypothesis import given, strategies as st
from calc import add


def _helper(x):
    return x


@given(
    a=st.integers(),
    b=st.integers(),
)
def test_add_commutes(a, b):
    """add is commutative.

def test_also_not_real():
"""
    assert add(a, b) == add(b, a)


# identity
@given(st.integers())
def test_add_identity(a):
    text = "def test_fake(): ("
    assert add(a, 0) == a

class TestGroup:
    def test_method(self):
        pass

async def test_async_thing():
    assert True
"#;

    #[test]
    fn test_render_is_byte_identical() {
        let module = TestModule::parse(SAMPLE);
        assert_eq!(module.render(), SAMPLE);
    }

    #[test]
    fn test_finds_module_and_class_tests() {
        let module = TestModule::parse(SAMPLE);
        let names: Vec<&str> = module.tests().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "test_add_commutes",
                "test_add_identity",
                "TestGroup::test_method",
                "test_async_thing"
            ]
        );
    }

    const CLASS_FILE: &str = "\
import pytest


class TestCalc:
    \"\"\"Arithmetic.\"\"\"

    @pytest.mark.slow
    def test_add(self):
        assert 1 + 1 == 3

    # helpers below
    def helper(self):
        return 1

    async def test_sub(self):
        assert 2 - 1 == 1


class Helpers:
    def test_not_collected(self):
        pass


class TestOnly:
    def test_lonely(self):
        assert False
";

    #[test]
    fn test_class_methods_are_tests() {
        let module = TestModule::parse(CLASS_FILE);
        assert_eq!(module.render(), CLASS_FILE);
        let names: Vec<&str> = module.tests().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["TestCalc::test_add", "TestCalc::test_sub", "TestOnly::test_lonely"]);

        let add = module.test("TestCalc::test_add").expect("found");
        assert_eq!(
            add.source,
            "    @pytest.mark.slow\n    def test_add(self):\n        assert 1 + 1 == 3\n"
        );
        assert!(module.test("TestCalc::helper").is_none());
    }

    #[test]
    fn test_method_replacement_is_reindented() {
        let module = TestModule::parse(CLASS_FILE);
        let mut edits = HashMap::new();
        edits.insert(
            "TestCalc::test_add".to_string(),
            TestEdit::Replace("def test_add(self):\n    assert 1 + 1 == 2\n".to_string()),
        );
        let out = module.render_with(&edits);
        assert_eq!(
            out,
            CLASS_FILE.replace(
                "    @pytest.mark.slow\n    def test_add(self):\n        assert 1 + 1 == 3\n",
                "    def test_add(self):\n        assert 1 + 1 == 2\n"
            )
        );
        assert_eq!(TestModule::parse(&out).tests().len(), 3);
    }

    #[test]
    fn test_dropping_every_method_leaves_class_valid() {
        let module = TestModule::parse(CLASS_FILE);
        let mut edits = HashMap::new();
        edits.insert("TestOnly::test_lonely".to_string(), TestEdit::Drop);
        edits.insert("TestCalc::test_sub".to_string(), TestEdit::Drop);
        let out = module.render_with(&edits);
        assert!(out.ends_with("class TestOnly:\n    pass\n"));
        assert!(!out.contains("test_sub"));
        assert!(out.contains("    def helper(self):\n        return 1\n"));
    }

    #[test]
    fn test_function_source_includes_multiline_decorator() {
        let module = TestModule::parse(SAMPLE);
        let func = module.test("test_add_commutes").expect("found");
        assert!(func.source.starts_with("@given(\n    a=st.integers(),"));
        assert!(func.source.ends_with("assert add(a, b) == add(b, a)\n"));
        assert!(!func.source.contains("# identity"));
    }

    #[test]
    fn test_replace_keeps_everything_else_verbatim() {
        let module = TestModule::parse(SAMPLE);
        let mut edits = HashMap::new();
        edits.insert(
            "test_add_identity".to_string(),
            TestEdit::Replace("@given(st.integers())\ndef test_add_identity(a):\n    assert add(0, a) == a\n\n".to_string()),
        );
        let out = module.render_with(&edits);

        let original = module.test("test_add_identity").unwrap().source.clone();
        let expected = SAMPLE.replacen(
            &original,
            "@given(st.integers())\ndef test_add_identity(a):\n    assert add(0, a) == a\n",
            1,
        );
        assert_eq!(out, expected);
        assert!(out.contains(&module.test("test_add_commutes").unwrap().source));
    }

    #[test]
    fn test_drop_removes_only_that_test() {
        let module = TestModule::parse(SAMPLE);
        let mut edits = HashMap::new();
        edits.insert("test_async_thing".to_string(), TestEdit::Drop);
        let out = module.render_with(&edits);
        assert!(!out.contains("test_async_thing"));
        assert!(out.contains("class TestGroup:"));
        assert_eq!(TestModule::parse(&out).tests().len(), 3);
    }

    #[test]
    fn test_shadowed_definition_is_not_effective() {
        let text = "def test_x():\n    assert 1\n\n\ndef test_x():\n    assert 2\n";
        let module = TestModule::parse(text);
        let tests = module.tests();
        assert_eq!(tests.len(), 1);
        assert!(tests[0].source.contains("assert 2"));

        let mut edits = HashMap::new();
        edits.insert("test_x".to_string(), TestEdit::Replace("def test_x():\n    assert 3".to_string()));
        assert_eq!(
            module.render_with(&edits),
            "def test_x():\n    assert 1\n\n\ndef test_x():\n    assert 3\n"
        );
    }

    #[test]
    fn test_crlf_and_missing_final_newline() {
        let text = "import x\r\n\r\ndef test_a():\r\n    pass\r\n\r\ndef test_b():\r\n    pass";
        let module = TestModule::parse(text);
        assert_eq!(module.render(), text);
        assert_eq!(module.tests().len(), 2);
        assert_eq!(module.test("test_b").unwrap().source, "def test_b():\r\n    pass");
    }

    #[test]
    fn test_empty_file() {
        let module = TestModule::parse("");
        assert!(module.tests().is_empty());
        assert_eq!(module.render(), "");
    }
}
