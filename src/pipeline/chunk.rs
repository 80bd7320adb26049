//! Question-block detection and chunk planning.
//!
//! A question block starts at a line matching `[Q]N.` or `[Q]N)` followed by
//! whitespace and runs to the next such line. Blocks are grouped, in order,
//! into chunks of at most `chunk_size`; only the first chunk of a job carries
//! the manual's header banner.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Line-start question marker: optional `Q`, digits, `.` or `)`, whitespace.
/// A leading `**` is tolerated so bolded model output counts too.
static RE_QUESTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:\*\*)?[Qq]?(\d+)[.)](?:\*\*)?\s").unwrap());

/// One numbered question and its text span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionBlock {
    /// Number as written in the source; not necessarily contiguous.
    pub number: u32,
    /// From the marker up to the next marker or end of text.
    pub text: String,
}

/// An ordered, non-empty group of question blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub blocks: Vec<QuestionBlock>,
    /// Whether the prompt for this chunk asks for the header banner.
    pub include_header: bool,
}

impl Chunk {
    /// Source text of all blocks, in order.
    pub fn text(&self) -> String {
        let joined: String = self.blocks.iter().map(|b| b.text.as_str()).collect();
        joined.trim_end().to_string()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// `"Q3-Q6"` style label for logs.
    pub fn label(&self) -> String {
        match (self.blocks.first(), self.blocks.last()) {
            (Some(first), Some(last)) if self.blocks.len() > 1 => {
                format!("Q{}-Q{}", first.number, last.number)
            }
            (Some(only), _) => format!("Q{}", only.number),
            _ => "empty".to_string(),
        }
    }
}

/// Number of question markers in `text`.
pub fn count_questions(text: &str) -> usize {
    RE_QUESTION.find_iter(text).count()
}

/// Split `text` into question blocks.
///
/// Text before the first marker is kept as a prefix of the first block so
/// nothing is lost. Without any marker the whole text is one block
/// numbered 1.
pub fn extract_blocks(text: &str) -> Vec<QuestionBlock> {
    let starts: Vec<(usize, u32)> = RE_QUESTION
        .captures_iter(text)
        .filter_map(|c| {
            let whole = c.get(0)?;
            let number = c.get(1)?.as_str().parse().unwrap_or(u32::MAX);
            Some((whole.start(), number))
        })
        .collect();

    if starts.is_empty() {
        return vec![QuestionBlock {
            number: 1,
            text: text.to_string(),
        }];
    }

    if starts[0].0 > 0 {
        debug!(
            "{} chars before the first question kept with it",
            starts[0].0
        );
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &(start, number))| {
            let from = if i == 0 { 0 } else { start };
            let to = starts.get(i + 1).map_or(text.len(), |&(next, _)| next);
            QuestionBlock {
                number,
                text: text[from..to].to_string(),
            }
        })
        .collect()
}

/// Groups question blocks into bounded chunks.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPlanner {
    chunk_size: usize,
}

impl ChunkPlanner {
    /// `chunk_size` below 1 is treated as 1.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn plan_chunks(&self, text: &str) -> Vec<Chunk> {
        self.group(extract_blocks(text))
    }

    /// Group already-extracted blocks, preserving order.
    pub fn group(&self, blocks: Vec<QuestionBlock>) -> Vec<Chunk> {
        let mut chunks = Vec::with_capacity(blocks.len().div_ceil(self.chunk_size));
        let mut iter = blocks.into_iter().peekable();
        while iter.peek().is_some() {
            let blocks: Vec<QuestionBlock> = iter.by_ref().take(self.chunk_size).collect();
            chunks.push(Chunk {
                blocks,
                include_header: chunks.is_empty(),
            });
        }
        chunks
    }
}

/// Halve a chunk for adaptive retry, split point rounded up.
///
/// Returns the chunk unchanged (as the only element) when it has a single
/// block. Only the first half inherits the header flag.
pub fn split_in_half(chunk: &Chunk) -> Vec<Chunk> {
    if chunk.blocks.len() <= 1 {
        return vec![chunk.clone()];
    }
    let mid = chunk.blocks.len().div_ceil(2);
    vec![
        Chunk {
            blocks: chunk.blocks[..mid].to_vec(),
            include_header: chunk.include_header,
        },
        Chunk {
            blocks: chunk.blocks[mid..].to_vec(),
            include_header: false,
        },
    ]
}
