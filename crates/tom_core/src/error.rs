//! 全局错误处理机制

use thiserror::Error;

use crate::kind::NodeKind;

/// ToMLoom 统一错误类型
#[derive(Error, Debug)]
pub enum TomError {
    #[error("{influencer} ({influencer_kind}) may not influence {influenced} ({influenced_kind})")]
    InfluencerNotAllowed {
        influenced: String,
        influenced_kind: NodeKind,
        influencer: String,
        influencer_kind: NodeKind,
    },

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Duplicate node name: {0}")]
    DuplicateNode(String),

    #[error("Parameter count mismatch: expected {expected}, got {got}")]
    ParameterCountMismatch { expected: usize, got: usize },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Missing ground truth for {node} at step {step}")]
    MissingGroundTruth { node: String, step: usize },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Snapshot taken at weight revision {captured} cannot restore revision {current}")]
    StaleSnapshot { captured: u64, current: u64 },

    #[error("Optimization error: {0}")]
    Optimization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 统一 Result 类型别名
pub type Result<T> = std::result::Result<T, TomError>;
