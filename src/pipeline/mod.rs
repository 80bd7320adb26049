//! Pipeline stages for worksheet-to-manual conversion.
//!
//! Each submodule implements one transformation step so it can be tested
//! on its own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! buffer ──▶ extract ──▶ normalize ──▶ chunk ──▶ llm ──▶ postprocess ──▶ latex ──▶ compile
//! (docx/pdf) (pandoc,    (unicode,     (blocks)  (model) (clean,        (TeX)     (PDF, DOCX)
//!             pdfium,     watermarks)                     merge)
//!             OCR)
//! ```
//!
//! 1. [`extract`]: baseline text plus equation enrichment; the only stage
//!    that reads the input document
//! 2. [`normalize`]: deterministic, idempotent text cleanup
//! 3. [`chunk`]: question-block detection and grouping
//! 4. [`llm`]: completion calls with adaptive split and model fallback
//! 5. [`postprocess`]: response cleanup and header-aware merging
//! 6. [`latex`]: manual text to a complete LaTeX document
//! 7. [`compile`]: external compilers, each in its own scratch directory

pub mod chunk;
pub mod compile;
pub mod extract;
pub mod latex;
pub mod llm;
pub mod normalize;
pub mod postprocess;
