//! Context slicing, prompt assembly, and response parsing for the LLM
//! request pipeline.

pub mod prompt;
pub mod response_parser;
pub mod slicer;

pub use prompt::{Cacheability, ChatMessage, PromptAssembler, PromptSection, ONTOLOGY_SPEC};
pub use response_parser::{
    extract_all_complete_block_spans, extract_all_complete_blocks, is_inside_operations_block, parse_response,
    BlockSpan, ParsedResponse,
};
pub use slicer::{classify, estimate_tokens, ContextSlicer, GraphSlice, TaskTag};
