//! Line-preferring text splitter that respects fenced code blocks.

use std::mem;
use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag};

/// Split `text` into ordered chunks of at most `max_chars` characters.
///
/// Breaks fall on line boundaries where possible. A fenced code block is never
/// broken if it fits in one chunk; a block longer than a chunk is cut between
/// its lines and every piece is re-fenced. Outside code blocks the chunks
/// concatenate back to exactly `text`.
pub fn split(text: &str, max_chars: usize) -> Vec<String> {
    let mut packer = Packer::new(max_chars.max(1));
    for segment in segments(text) {
        match segment {
            Segment::Line(line) => packer.push_line(line),
            Segment::Fence(block) => packer.push_fence(block),
        }
    }
    packer.finish()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

enum Segment<'a> {
    Line(&'a str),
    /// A whole fenced code block, from the start of its opening line to the end of its closing line
    Fence(&'a str),
}

/// Byte ranges of fenced code blocks, widened to whole lines
fn fence_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();
    for (event, range) in Parser::new(text).into_offset_iter() {
        if !matches!(event, Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(_)))) {
            continue;
        }
        let start = text[..range.start].rfind('\n').map_or(0, |i| i + 1);
        let end = if range.end == 0 || text[..range.end].ends_with('\n') {
            range.end
        } else {
            text[range.end..]
                .find('\n')
                .map_or(text.len(), |i| range.end + i + 1)
        };
        match ranges.last_mut() {
            Some(last) if start < last.end => last.end = last.end.max(end),
            _ => ranges.push(start..end),
        }
    }
    ranges
}

fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut pos = 0;
    for fence in fence_ranges(text) {
        if fence.start < pos {
            continue;
        }
        segments.extend(text[pos..fence.start].split_inclusive('\n').map(Segment::Line));
        segments.push(Segment::Fence(&text[fence.clone()]));
        pos = fence.end;
    }
    segments.extend(text[pos..].split_inclusive('\n').map(Segment::Line));
    segments
}

/// Byte offset at which to cut `s` so the head holds at most `max` characters.
///
/// Prefers cutting after whitespace when that keeps more than half the window.
fn cut_point(s: &str, max: usize) -> usize {
    let hard = s.char_indices().nth(max).map_or(s.len(), |(i, _)| i);
    let soft = s[..hard]
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8());
    match soft {
        Some(cut) if char_len(&s[..cut]) > max / 2 => cut,
        _ => hard,
    }
}

/// Cut `s` into pieces of at most `max` characters
fn hard_pieces(mut s: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    while char_len(s) > max {
        let cut = cut_point(s, max);
        pieces.push(&s[..cut]);
        s = &s[cut..];
    }
    if !s.is_empty() {
        pieces.push(s);
    }
    pieces
}

struct Packer {
    max: usize,
    chunks: Vec<String>,
    current: String,
    current_len: usize,
}

impl Packer {
    fn new(max: usize) -> Self {
        Self {
            max,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(mem::take(&mut self.current));
        }
        self.current_len = 0;
    }

    fn append(&mut self, s: &str, len: usize) {
        self.current.push_str(s);
        self.current_len += len;
    }

    /// Append `s` if it fits, otherwise start a new chunk with it. Returns false
    /// when `s` is larger than a whole chunk and nothing was appended.
    fn place(&mut self, s: &str) -> bool {
        let len = char_len(s);
        if self.current_len + len <= self.max {
            self.append(s, len);
            return true;
        }
        self.flush();
        if len <= self.max {
            self.append(s, len);
            return true;
        }
        false
    }

    fn push_line(&mut self, line: &str) {
        if self.place(line) {
            return;
        }
        let mut pieces = hard_pieces(line, self.max);
        let last = pieces.pop();
        self.chunks.extend(pieces.into_iter().map(str::to_string));
        if let Some(rest) = last {
            self.append(rest, char_len(rest));
        }
    }

    fn push_fence(&mut self, block: &str) {
        if self.place(block) {
            return;
        }
        match Fence::parse(block).and_then(|fence| fence.pieces(self.max)) {
            Some(pieces) => self.chunks.extend(pieces),
            None => {
                for line in block.split_inclusive('\n') {
                    self.push_line(line);
                }
            }
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

/// A fenced code block taken apart for re-fencing
struct Fence<'a> {
    open: String,
    body: Vec<&'a str>,
    close: String,
}

impl<'a> Fence<'a> {
    fn parse(block: &'a str) -> Option<Self> {
        let mut lines = block.split_inclusive('\n');
        let open = lines.next()?;
        let mut body: Vec<&str> = lines.collect();

        let trimmed = open.trim_start();
        let indent = &open[..open.len() - trimmed.len()];
        let marker_char = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
        let marker_len = trimmed.chars().take_while(|c| *c == marker_char).count();
        let marker = &trimmed[..marker_len];

        if let Some(last) = body.last() {
            let last = last.trim();
            if last.starts_with(marker) && last.chars().all(|c| c == marker_char) {
                body.pop();
            }
        }

        let open = if open.ends_with('\n') {
            open.to_string()
        } else {
            format!("{}\n", open)
        };
        Some(Self {
            open,
            body,
            close: format!("{}{}\n", indent, marker),
        })
    }

    /// Re-fenced pieces of at most `max` characters, or `None` if the fences
    /// alone leave no room for content
    fn pieces(&self, max: usize) -> Option<Vec<String>> {
        let overhead = char_len(&self.open) + char_len(&self.close) + 1;
        if overhead >= max || self.body.is_empty() {
            return None;
        }
        let budget = max - overhead;

        let mut pieces = Vec::new();
        let mut body = String::new();
        let mut body_len = 0;
        for line in &self.body {
            for part in hard_pieces(line, budget) {
                let len = char_len(part);
                if body_len + len > budget && !body.is_empty() {
                    pieces.push(self.wrap(&body));
                    body.clear();
                    body_len = 0;
                }
                body.push_str(part);
                body_len += len;
            }
        }
        if !body.is_empty() {
            pieces.push(self.wrap(&body));
        }
        Some(pieces)
    }

    fn wrap(&self, body: &str) -> String {
        let mut piece = self.open.clone();
        piece.push_str(body);
        if !body.ends_with('\n') {
            piece.push('\n');
        }
        piece.push_str(&self.close);
        piece
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_within(chunks: &[String], max: usize) {
        for chunk in chunks {
            assert!(
                char_len(chunk) <= max,
                "chunk of {} chars over {}",
                char_len(chunk),
                max
            );
        }
    }

    #[test]
    fn plain_text_round_trips() {
        let text: String = (0..250)
            .map(|i| format!("sentence number {i} in a long answer.\n"))
            .collect::<String>()
            .chars()
            .take(5000)
            .collect();
        assert_eq!(char_len(&text), 5000);

        let chunks = split(&text, 2000);
        assert_within(&chunks, 2000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
        assert!(chunks[0].ends_with('\n'));
    }

    #[test]
    fn single_long_line_is_cut() {
        let text = "x".repeat(5000);
        let chunks = split(&text, 2000);
        assert_eq!(
            chunks.iter().map(|c| char_len(c)).collect::<Vec<_>>(),
            vec![2000, 2000, 1000]
        );
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn long_line_prefers_word_breaks() {
        let text = "word ".repeat(30);
        let chunks = split(&text, 32);
        assert_within(&chunks, 32);
        assert!(chunks[..chunks.len() - 1].iter().all(|c| c.ends_with(' ')));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(30);
        let chunks = split(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert_within(&chunks, 10);
    }

    #[test]
    fn code_block_that_fits_stays_whole() {
        let code = "```rust\nfn main() {\n    println!(\"hi\");\n}\n```\n";
        let text = format!("{}{}{}", "intro line\n".repeat(5), code, "outro\n");
        let chunks = split(&text, 70);

        assert_within(&chunks, 70);
        assert!(chunks.iter().any(|c| c.contains(code)));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn oversized_code_block_is_refenced() {
        let body: String = (0..40).map(|i| format!("let v{i} = {i};\n")).collect();
        let text = format!("Here you go:\n```rust\n{}```\nDone.\n", body);
        let chunks = split(&text, 120);

        assert_within(&chunks, 120);
        assert_eq!(chunks.first().map(String::as_str), Some("Here you go:\n"));
        assert_eq!(chunks.last().map(String::as_str), Some("Done.\n"));
        let code_chunks = &chunks[1..chunks.len() - 1];
        assert!(code_chunks.len() > 1);
        for chunk in code_chunks {
            assert!(chunk.starts_with("```rust\n"));
            assert!(chunk.ends_with("\n```\n"));
        }
        let rejoined: String = code_chunks
            .iter()
            .map(|c| &c["```rust\n".len()..c.len() - "```\n".len()])
            .collect();
        assert_eq!(rejoined, body);
    }

    #[test]
    fn unclosed_fence_is_closed_per_piece() {
        let body = "line\n".repeat(20);
        let text = format!("~~~\n{}", body);
        let chunks = split(&text, 30);
        assert_within(&chunks, 30);
        assert!(chunks.iter().all(|c| c.starts_with("~~~\n") && c.ends_with("~~~\n")));
    }

    #[test]
    fn splitting_is_deterministic() {
        let text = format!("{}```\n{}```\n", "a b c d e f\n".repeat(40), "x\n".repeat(200));
        assert_eq!(split(&text, 100), split(&text, 100));
    }

    #[test]
    fn tiny_limit_still_bounds_fences() {
        let text = "```\ncode\n```\n";
        let chunks = split(text, 3);
        assert_within(&chunks, 3);
        assert_eq!(chunks.concat(), text);
    }
}
