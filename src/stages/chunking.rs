//! Chunking stages
//!
//! All offsets and sizes are in characters, not bytes, so multi-byte text
//! never splits inside a code point.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::errors::{EvalError, Result};
use crate::strategy::registry::parse_stage_config;
use crate::strategy::{PipelineServices, Stage, StageType, StrategyContext};
use crate::types::{Chunk, Document};

/// Fixed-size window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct FixedSizeConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for FixedSizeConfig {
    fn default() -> Self {
        Self { size: 512, overlap: 50 }
    }
}

/// Paragraph-aggregating configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SemanticConfig {
    pub max_size: usize,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self { max_size: 1000 }
    }
}

/// Sliding window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct SlidingWindowConfig {
    pub size: usize,
    pub step: usize,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self { size: 512, step: 256 }
    }
}

fn make_chunk(doc: &Document, index: usize, chars: &[char], start: usize, end: usize) -> Chunk {
    let mut metadata = doc.metadata.clone();
    metadata.insert("chunkIndex".to_string(), json!(index));
    Chunk {
        id: format!("{}#chunk-{}", doc.id, index),
        content: chars[start..end].iter().collect(),
        parent_doc_id: doc.id.clone(),
        start_index: start,
        end_index: end,
        metadata,
    }
}

/// Windows of `size` characters whose starts are `step` apart.
///
/// The last window may be shorter; iteration stops once a window reaches
/// the end of the document.
pub fn window_chunks(doc: &Document, size: usize, step: usize) -> Vec<Chunk> {
    let chars: Vec<char> = doc.content.chars().collect();
    let mut chunks = Vec::new();
    if size == 0 || step == 0 {
        return chunks;
    }

    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(make_chunk(doc, chunks.len(), &chars, start, end));
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Fixed-size chunks advancing by `size - overlap`
pub fn fixed_size_chunks(doc: &Document, size: usize, overlap: usize) -> Vec<Chunk> {
    if overlap >= size {
        return Vec::new();
    }
    window_chunks(doc, size, size - overlap)
}

/// Character spans of blank-line separated paragraphs
fn paragraph_spans(chars: &[char]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    let mut line_start = 0;

    while line_start <= chars.len() {
        let line_end = chars[line_start..]
            .iter()
            .position(|c| *c == '\n')
            .map(|p| line_start + p)
            .unwrap_or(chars.len());

        let blank = chars[line_start..line_end].iter().all(|c| c.is_whitespace());
        if blank {
            if let Some(span) = current.take() {
                spans.push(span);
            }
        } else {
            current = Some(match current {
                Some((start, _)) => (start, line_end),
                None => (line_start, line_end),
            });
        }
        line_start = line_end + 1;
    }

    if let Some(span) = current {
        spans.push(span);
    }
    spans
}

/// Greedily merge whole paragraphs while the merged span stays within `max_size`.
///
/// A paragraph longer than `max_size` becomes its own chunk, never split.
pub fn semantic_chunks(doc: &Document, max_size: usize) -> Vec<Chunk> {
    let chars: Vec<char> = doc.content.chars().collect();
    let mut chunks = Vec::new();
    let mut group: Option<(usize, usize)> = None;

    for (start, end) in paragraph_spans(&chars) {
        group = match group {
            Some((group_start, group_end)) if end - group_start > max_size => {
                chunks.push(make_chunk(doc, chunks.len(), &chars, group_start, group_end));
                Some((start, end))
            }
            Some((group_start, _)) => Some((group_start, end)),
            None => Some((start, end)),
        };
    }

    if let Some((start, end)) = group {
        chunks.push(make_chunk(doc, chunks.len(), &chars, start, end));
    }
    chunks
}

fn write_chunks(ctx: &mut StrategyContext, stage: &str, chunk_fn: impl Fn(&Document) -> Vec<Chunk>) {
    let chunks: Vec<Chunk> = ctx.original_documents.iter().flat_map(chunk_fn).collect();
    ctx.stage_metadata.insert(
        stage.to_string(),
        json!({ "chunkCount": chunks.len(), "documentCount": ctx.original_documents.len() }),
    );
    ctx.chunks = Some(chunks);
}

pub struct FixedSizeChunker {
    config: FixedSizeConfig,
}

#[async_trait]
impl Stage for FixedSizeChunker {
    fn stage_type(&self) -> StageType {
        StageType::Chunking
    }

    fn name(&self) -> &str {
        "fixed-size"
    }

    async fn execute(&self, ctx: &mut StrategyContext, _services: &PipelineServices) -> Result<()> {
        let FixedSizeConfig { size, overlap } = self.config;
        write_chunks(ctx, self.name(), |doc| fixed_size_chunks(doc, size, overlap));
        Ok(())
    }
}

pub struct SemanticChunker {
    config: SemanticConfig,
}

#[async_trait]
impl Stage for SemanticChunker {
    fn stage_type(&self) -> StageType {
        StageType::Chunking
    }

    fn name(&self) -> &str {
        "semantic"
    }

    async fn execute(&self, ctx: &mut StrategyContext, _services: &PipelineServices) -> Result<()> {
        let max_size = self.config.max_size;
        write_chunks(ctx, self.name(), |doc| semantic_chunks(doc, max_size));
        Ok(())
    }
}

pub struct SlidingWindowChunker {
    config: SlidingWindowConfig,
}

#[async_trait]
impl Stage for SlidingWindowChunker {
    fn stage_type(&self) -> StageType {
        StageType::Chunking
    }

    fn name(&self) -> &str {
        "sliding-window"
    }

    async fn execute(&self, ctx: &mut StrategyContext, _services: &PipelineServices) -> Result<()> {
        let SlidingWindowConfig { size, step } = self.config;
        write_chunks(ctx, self.name(), |doc| window_chunks(doc, size, step));
        Ok(())
    }
}

pub fn build_fixed_size(value: &serde_json::Value) -> Result<Arc<dyn Stage>> {
    let config: FixedSizeConfig = parse_stage_config("fixed-size", value)?;
    if config.size == 0 {
        return Err(EvalError::ConfigError("fixed-size: size must be > 0".into()));
    }
    if config.overlap >= config.size {
        return Err(EvalError::ConfigError(format!(
            "fixed-size: overlap ({}) must be smaller than size ({})",
            config.overlap, config.size
        )));
    }
    Ok(Arc::new(FixedSizeChunker { config }))
}

pub fn build_semantic(value: &serde_json::Value) -> Result<Arc<dyn Stage>> {
    let config: SemanticConfig = parse_stage_config("semantic", value)?;
    if config.max_size == 0 {
        return Err(EvalError::ConfigError("semantic: maxSize must be > 0".into()));
    }
    Ok(Arc::new(SemanticChunker { config }))
}

pub fn build_sliding_window(value: &serde_json::Value) -> Result<Arc<dyn Stage>> {
    let config: SlidingWindowConfig = parse_stage_config("sliding-window", value)?;
    if config.size == 0 || config.step == 0 {
        return Err(EvalError::ConfigError("sliding-window: size and step must be > 0".into()));
    }
    Ok(Arc::new(SlidingWindowChunker { config }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TestCase;

    fn contents(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.content.as_str()).collect()
    }

    #[test]
    fn test_fixed_size_overlap() {
        let doc = Document::new("d", "abcdefghij");
        let chunks = fixed_size_chunks(&doc, 4, 1);
        assert_eq!(contents(&chunks), vec!["abcd", "defg", "ghij"]);
        assert_eq!(chunks[1].start_index, 3);
        assert_eq!(chunks[1].end_index, 7);
        assert_eq!(chunks[2].id, "d#chunk-2");
        assert_eq!(chunks[0].parent_doc_id, "d");
    }

    #[test]
    fn test_fixed_size_short_tail() {
        let doc = Document::new("d", "abcdefgh");
        let chunks = fixed_size_chunks(&doc, 5, 0);
        assert_eq!(contents(&chunks), vec!["abcde", "fgh"]);
    }

    #[test]
    fn test_empty_document_yields_no_chunks() {
        let doc = Document::new("d", "");
        assert!(fixed_size_chunks(&doc, 5, 1).is_empty());
        assert!(semantic_chunks(&doc, 5).is_empty());
        assert!(window_chunks(&doc, 5, 2).is_empty());
    }

    #[test]
    fn test_overlap_not_smaller_than_size_rejected() {
        let err = build_fixed_size(&json!({"size": 100, "overlap": 100})).err().unwrap();
        assert!(err.is_configuration());
        assert!(build_fixed_size(&json!({"size": 100, "overlap": 99})).is_ok());
    }

    #[test]
    fn test_multibyte_offsets() {
        let doc = Document::new("d", "héllo wörld");
        let chunks = fixed_size_chunks(&doc, 5, 0);
        assert_eq!(chunks[0].content, "héllo");
        assert_eq!(chunks[1].content, " wörl");
        assert_eq!(chunks[2].content, "d");
    }

    #[test]
    fn test_sliding_window_can_skip_content() {
        let doc = Document::new("d", "abcdefghij");
        let chunks = window_chunks(&doc, 2, 4);
        assert_eq!(contents(&chunks), vec!["ab", "ef", "ij"]);
    }

    #[test]
    fn test_sliding_window_dense_overlap() {
        let doc = Document::new("d", "abcde");
        let chunks = window_chunks(&doc, 3, 1);
        assert_eq!(contents(&chunks), vec!["abc", "bcd", "cde"]);
    }

    #[test]
    fn test_semantic_groups_paragraphs() {
        let doc = Document::new("d", "aaaa\n\nbbbb\n\ncccccccccc\n\ndd");
        let chunks = semantic_chunks(&doc, 10);
        assert_eq!(contents(&chunks), vec!["aaaa\n\nbbbb", "cccccccccc", "dd"]);
        assert_eq!(chunks[0].start_index, 0);
        assert_eq!(chunks[0].end_index, 10);
    }

    #[test]
    fn test_semantic_never_splits_long_paragraph() {
        let long = "x".repeat(50);
        let doc = Document::new("d", format!("short\n\n{long}\n\ntail"));
        let chunks = semantic_chunks(&doc, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].content, long);
    }

    #[test]
    fn test_semantic_blank_lines_with_whitespace() {
        let doc = Document::new("d", "first line\nsecond line\n   \nnext para");
        let chunks = semantic_chunks(&doc, 12);
        assert_eq!(contents(&chunks), vec!["first line\nsecond line", "next para"]);
    }

    #[tokio::test]
    async fn test_stage_writes_chunks_and_metadata() {
        let docs = Arc::new(vec![Document::new("d1", "abcdef"), Document::new("d2", "xy")]);
        let mut ctx = StrategyContext::new(&TestCase::new("q", "abc", ["d1"]), docs);
        let stage = build_sliding_window(&json!({"size": 4, "step": 2})).unwrap();
        stage.execute(&mut ctx, &PipelineServices::new()).await.unwrap();

        let chunks = ctx.chunks.as_ref().unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(ctx.stage_metadata["sliding-window"]["chunkCount"], 3);
    }
}
