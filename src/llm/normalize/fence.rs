//! Markdown code fence scanning.

const FENCE: &str = "```";

/// One fenced block. `body` is trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    pub language: Option<&'a str>,
    pub body: &'a str,
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '+' | '-' | '#' | '.')
}

/// Split an opening fence's remainder into (language tag, rest).
///
/// A tag only counts when followed by whitespace or the start of a JSON
/// value, so "```print(1)```" has no tag.
fn split_tag(after_fence: &str) -> (Option<&str>, &str) {
    let tag_len = after_fence
        .char_indices()
        .find(|(_, c)| !is_tag_char(*c))
        .map_or(after_fence.len(), |(i, _)| i);
    if tag_len == 0 {
        return (None, after_fence);
    }
    let rest = &after_fence[tag_len..];
    match rest.chars().next() {
        Some(c) if c.is_whitespace() || c == '{' || c == '[' => {
            (Some(&after_fence[..tag_len]), rest)
        }
        _ => (None, after_fence),
    }
}

/// All closed fenced blocks, in order of appearance.
pub fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = Vec::new();
    let mut cursor = 0;
    while let Some(open) = text[cursor..].find(FENCE) {
        let content_start = cursor + open + FENCE.len();
        let Some(close) = text[content_start..].find(FENCE) else {
            break;
        };
        let content_end = content_start + close;
        let (language, body) = split_tag(&text[content_start..content_end]);
        blocks.push(FencedBlock {
            language,
            body: body.trim(),
        });
        cursor = content_end + FENCE.len();
    }
    blocks
}

pub fn first_fenced_block(text: &str) -> Option<FencedBlock<'_>> {
    fenced_blocks(text).into_iter().next()
}
