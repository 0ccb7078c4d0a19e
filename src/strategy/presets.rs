//! Built-in strategy presets

use serde_json::json;

use crate::strategy::{StageConfig, StageType, StrategyDefinition};

const PRESETS: &[(&str, &str)] = &[
    ("baseline", "Plain vector retrieval over whole documents"),
    ("fixed-chunks", "Fixed-size chunks, then vector retrieval"),
    ("semantic-chunks", "Paragraph-aggregated chunks, then vector retrieval"),
    ("hybrid-bm25", "BM25 and vector retrieval fused with RRF"),
    ("llm-reranked", "Vector retrieval reranked by an LLM judge"),
    ("mmr-diversity", "Vector retrieval reranked with MMR for diversity"),
    ("full", "Semantic chunks, hybrid retrieval, RRF and MMR"),
];

/// Names of every preset, in display order
pub fn preset_names() -> Vec<&'static str> {
    PRESETS.iter().map(|(name, _)| *name).collect()
}

pub fn preset_description(name: &str) -> Option<&'static str> {
    PRESETS.iter().find(|(n, _)| *n == name).map(|(_, d)| *d)
}

fn vector(k: usize) -> StageConfig {
    StageConfig::new(StageType::Retrieval, "vector", json!({ "k": k }))
}

fn bm25(k: usize) -> StageConfig {
    StageConfig::new(StageType::Retrieval, "bm25", json!({ "k": k, "k1": 1.2, "b": 0.75 }))
}

/// Stage list for a preset
pub fn preset(name: &str) -> Option<StrategyDefinition> {
    let stages = match name {
        "baseline" => vec![vector(10)],
        "fixed-chunks" => vec![
            StageConfig::new(StageType::Chunking, "fixed-size", json!({ "size": 512, "overlap": 50 })),
            vector(10),
        ],
        "semantic-chunks" => vec![
            StageConfig::new(StageType::Chunking, "semantic", json!({ "maxSize": 1000 })),
            vector(10),
        ],
        "hybrid-bm25" => vec![
            vector(20),
            bm25(20),
            StageConfig::new(StageType::Fusion, "rrf", json!({ "k": 60, "topK": 10 })),
        ],
        "llm-reranked" => vec![
            vector(20),
            StageConfig::new(StageType::Reranking, "llm", json!({ "topK": 10 })),
        ],
        "mmr-diversity" => vec![
            vector(20),
            StageConfig::new(StageType::Reranking, "mmr", json!({ "lambda": 0.5, "topK": 10 })),
        ],
        "full" => vec![
            StageConfig::new(StageType::Chunking, "semantic", json!({ "maxSize": 1000 })),
            vector(50),
            bm25(50),
            StageConfig::new(StageType::Fusion, "rrf", json!({ "k": 60, "topK": 20 })),
            StageConfig::new(StageType::Reranking, "mmr", json!({ "lambda": 0.7, "topK": 10 })),
        ],
        _ => return None,
    };
    Some(StrategyDefinition::new(stages))
}
