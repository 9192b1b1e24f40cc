// Byte-range text edits over C# sources

use std::ops::Range;

use anyhow::Result;
use similar::TextDiff;

use crate::compiler::DeclarationSyntax;

const INDENT_UNIT: &str = "    ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub text: String,
}

impl TextEdit {
    pub fn replace(range: Range<usize>, text: impl Into<String>) -> Self {
        Self {
            range,
            text: text.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::replace(at..at, text)
    }

    pub fn delete(range: Range<usize>) -> Self {
        Self::replace(range, String::new())
    }
}

/// Apply non-overlapping edits; insertions at the same offset keep their order
pub fn apply_edits(source: &str, mut edits: Vec<TextEdit>) -> Result<String> {
    edits.sort_by(|a, b| a.range.start.cmp(&b.range.start).then(a.range.end.cmp(&b.range.end)));
    for pair in edits.windows(2) {
        if pair[0].range.end > pair[1].range.start {
            anyhow::bail!(
                "Overlapping edits at {:?} and {:?}",
                pair[0].range,
                pair[1].range
            );
        }
    }

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for edit in &edits {
        if edit.range.end > source.len() || !source.is_char_boundary(edit.range.start) {
            anyhow::bail!("Edit {:?} is outside the document", edit.range);
        }
        out.push_str(&source[cursor..edit.range.start]);
        out.push_str(&edit.text);
        cursor = edit.range.end;
    }
    out.push_str(&source[cursor..]);
    Ok(out)
}

/// Start of the line containing `byte`
pub fn line_start(source: &str, byte: usize) -> usize {
    source[..byte.min(source.len())]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// End of the line containing `byte`, newline included
pub fn line_end(source: &str, byte: usize) -> usize {
    source[byte.min(source.len())..]
        .find('\n')
        .map(|i| byte + i + 1)
        .unwrap_or(source.len())
}

/// Whole lines of a declaration plus the `///` comment block directly above it
pub fn declaration_lines(source: &str, span: &Range<usize>) -> Range<usize> {
    let mut start = line_start(source, span.start);
    let end = line_end(source, span.end.saturating_sub(1).max(span.start));

    while start > 0 {
        let previous = line_start(source, start - 1);
        if source[previous..start].trim_start().starts_with("///") {
            start = previous;
        } else {
            break;
        }
    }
    start..end
}

/// One declarator out of `int a, b;` together with its separating comma
pub fn declarator_removal(source: &str, declarator: &Range<usize>) -> Range<usize> {
    let after = &source[declarator.end..];
    let trimmed = after.trim_start();
    if trimmed.starts_with(',') {
        let comma = declarator.end + (after.len() - trimmed.len());
        let rest = &source[comma + 1..];
        let spaces = rest.len() - rest.trim_start_matches([' ', '\t']).len();
        return declarator.start..comma + 1 + spaces;
    }

    let before = &source[..declarator.start];
    let trimmed = before.trim_end();
    if trimmed.ends_with(',') {
        return trimmed.len() - 1..declarator.end;
    }
    declarator.clone()
}

/// Append one argument to an argument list spanning `(` to `)`
pub fn append_argument(source: &str, arguments: &Range<usize>, expression: &str) -> TextEdit {
    let close = arguments.end.saturating_sub(1);
    let inner = &source[arguments.start + 1..close];
    if inner.trim().is_empty() {
        return TextEdit::replace(arguments.start + 1..close, expression);
    }
    let at = arguments.start + 1 + inner.trim_end().len();
    TextEdit::insert(at, format!(", {}", expression))
}

/// Add a type to a declaration's base list, creating the list if needed
pub fn add_base_type(syntax: &DeclarationSyntax, name: &str) -> TextEdit {
    match &syntax.base_list {
        Some(list) => TextEdit::insert(list.end, format!(", {}", name)),
        None => TextEdit::insert(syntax.header_end, format!(" : {}", name)),
    }
}

fn indent_block(text: &str, indent: &str) -> String {
    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                "\n".to_string()
            } else {
                format!("{}{}\n", indent, line)
            }
        })
        .collect()
}

/// Insert member declarations before the closing brace of a type body
pub fn insert_members(source: &str, syntax: &DeclarationSyntax, members: &[String]) -> Result<TextEdit> {
    let body = syntax
        .body
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Declaration has no body to insert into"))?;
    let close = body.end.saturating_sub(1);
    if source.as_bytes().get(close) != Some(&b'}') {
        anyhow::bail!("Declaration body does not end with a closing brace");
    }

    let member_indent = format!("{}{}", syntax.indent, INDENT_UNIT);
    let rendered: Vec<String> = members.iter().map(|m| indent_block(m, &member_indent)).collect();
    let joined = rendered.join("\n");

    let start = line_start(source, close);
    if source[start..close].trim().is_empty() && start > body.start {
        let existing = source[body.start + 1..start].trim();
        let lead = if existing.is_empty() { "" } else { "\n" };
        return Ok(TextEdit::insert(start, format!("{}{}", lead, joined)));
    }

    // `{ }` or `{ int x; }` on one line
    let existing = source[body.start + 1..close].trim();
    let mut text = String::from("\n");
    if !existing.is_empty() {
        text.push_str(&member_indent);
        text.push_str(existing);
        text.push_str("\n\n");
    }
    text.push_str(&joined);
    text.push_str(&syntax.indent);
    Ok(TextEdit::replace(body.start + 1..close, text))
}

/// Collapse blank-line runs and drop blank lines hugging braces
pub fn tidy(source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());

    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            let previous = out.last().map(|l| l.trim());
            let next = lines[i + 1..].iter().map(|l| l.trim()).find(|l| !l.is_empty());
            let after_open = matches!(previous, Some(p) if p.ends_with('{'));
            let before_close = matches!(next, Some(n) if n.starts_with('}'));
            let repeated = matches!(previous, Some(""));
            if out.is_empty() || after_open || before_close || repeated || next.is_none() {
                continue;
            }
            out.push("");
        } else {
            out.push(line.trim_end());
        }
    }

    let mut tidied = out.join("\n");
    if !tidied.is_empty() {
        tidied.push('\n');
    }
    tidied
}

/// Unified diff between two versions of a file
pub fn unified_diff(path: &str, before: &str, after: &str) -> String {
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{}", path), &format!("b/{}", path))
        .to_string()
}
