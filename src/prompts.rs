//! Prompts for turning worksheet chunks into manual text.
//!
//! Every prompt the generation stage sends lives here, so the layout the
//! renderer and the header-stripping merge rely on is defined in one place.
//! The line prefixes below (`Worksheet:`, `Syllabus Topics Covered:`,
//! `Key:`, `Solution:`) are matched again by [`crate::pipeline::postprocess`]
//! and [`crate::pipeline::latex`]; keep them in sync.

use crate::job::JobMeta;

/// Title line of the header banner.
pub const MANUAL_TITLE: &str = "Solutions Manual";

/// Answer-key banner line of the header banner.
pub const ANSWER_KEY_BANNER: &str = "Answer Key & Detailed Solutions";

/// System prompt sent with every chunk.
pub const MANUAL_SYSTEM_PROMPT: &str = r#"You are an experienced teacher writing the solutions manual for a printed worksheet.

Follow these rules precisely:

1. FIDELITY
   - Reproduce every question in the order given, with its original number
   - Never merge, skip, renumber or invent questions
   - The number of questions in your answer must equal the number in the worksheet

2. MATHEMATICS
   - Keep all math exactly as written: $inline$ and $$display$$ delimiters stay as they are
   - Write any new math you introduce as LaTeX inside $...$
   - Do not use Unicode math symbols; use LaTeX macros inside math instead

3. OUTPUT FORMAT
   - Plain text only; do NOT wrap the answer in ``` fences
   - Do NOT add commentary before or after the manual
   - Use the per-question layout you are given, nothing else"#;

/// Per-question layout, shown to the model verbatim.
const QUESTION_LAYOUT: &str = r#"For EACH question use exactly this layout:

<number>. <question text, unchanged>
(a) <option>
(b) <option>
(c) <option>
(d) <option>
Key: <correct option letter, or the final answer when there are no options>
Solution:
• <step 1>
• <step 2>
• <step 3>
• <step 4>
• <step 5>
• <optional step 6>

Leave out the option lines when the question has none. Write 5 or 6 bullet steps, one short line each."#;

/// Build the user prompt for one chunk.
///
/// The header banner block is requested only when `include_header` is set,
/// which the planner does for the first chunk of a job.
pub fn build_manual_prompt(meta: &JobMeta, chunk_text: &str, include_header: bool) -> String {
    let mut prompt = String::with_capacity(chunk_text.len() + 2048);

    prompt.push_str(&format!(
        "Program: {}\nSubject: {}\nChapter: {}\n\n",
        or_unspecified(&meta.program),
        or_unspecified(&meta.subject),
        or_unspecified(&meta.chapter),
    ));

    if include_header {
        prompt.push_str(&header_instructions(meta));
    } else {
        prompt.push_str(
            "This is a continuation. Do NOT repeat any title, worksheet or answer-key banner; \
             start directly with the first question.\n\n",
        );
    }

    prompt.push_str(QUESTION_LAYOUT);
    prompt.push_str("\n\nWorksheet questions:\n\"\"\"\n");
    prompt.push_str(chunk_text.trim());
    prompt.push_str("\n\"\"\"\n");
    prompt
}

fn header_instructions(meta: &JobMeta) -> String {
    format!(
        "Start the manual with exactly these four header lines:\n\
         {MANUAL_TITLE}: {program} {subject}\n\
         Worksheet: {chapter}\n\
         Syllabus Topics Covered: <comma-separated topics these questions test>\n\
         {ANSWER_KEY_BANNER}\n\n",
        program = meta.program.trim(),
        subject = meta.subject.trim(),
        chapter = or_unspecified(&meta.chapter),
    )
}

fn or_unspecified(s: &str) -> &str {
    let s = s.trim();
    if s.is_empty() {
        "(unspecified)"
    } else {
        s
    }
}
