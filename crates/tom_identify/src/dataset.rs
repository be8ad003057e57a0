//! 参与者交互数据集
//!
//! 一个参与者可以有多个会话; 会话按顺序拼接重放, 步索引连续编号。

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

use tom_core::{LogEntry, Observation, ObservationLog, Result, StepKey, TomError};

/// 交互数据集
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionDataset {
    pub participant: String,
    pub sessions: Vec<Vec<Observation>>,
    /// 信念/目标/情绪节点的记录真值, 下标与步索引一致 (下标 0 为初始值)
    #[serde(default)]
    pub ground_truth: BTreeMap<String, Vec<f64>>,
}

impl InteractionDataset {
    /// 从 JSON 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let dataset: Self = serde_json::from_str(text)?;
        if dataset.sessions.iter().all(Vec::is_empty) {
            return Err(TomError::Dataset(format!(
                "participant {} has no observations",
                dataset.participant
            )));
        }
        Ok(dataset)
    }

    /// 拼接所有会话的观测日志; 插值只发生在会话内部
    pub fn observation_log(&self, interpolate: bool) -> Result<ObservationLog> {
        let mut log = ObservationLog::new();
        let mut offset = 0.0;
        for session in &self.sessions {
            let mut session_log = ObservationLog::from_observations(session.iter().cloned());
            if interpolate {
                session_log = session_log.with_midpoints();
            }
            for entry in session_log.iter() {
                log.push_entry(LogEntry {
                    key: StepKey(offset + entry.key.0),
                    ..entry.clone()
                })?;
            }
            offset += session.len() as f64;
        }
        Ok(log)
    }

    /// 每个会话在重放后占用的步索引范围
    pub fn session_ranges(&self, interpolate: bool) -> Vec<Range<usize>> {
        let mut start = 1;
        self.sessions
            .iter()
            .map(|s| {
                let len = if interpolate && !s.is_empty() { 2 * s.len() - 1 } else { s.len() };
                let range = start..start + len;
                start += len;
                range
            })
            .collect()
    }

    /// 真实观测总数
    pub fn total_observations(&self) -> usize {
        self.sessions.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> InteractionDataset {
        let obs = |d: f64| Observation {
            difficulty: d,
            ..Default::default()
        };
        InteractionDataset {
            participant: "p01".into(),
            sessions: vec![vec![obs(1.0), obs(3.0), obs(5.0)], vec![obs(2.0), obs(4.0)]],
            ground_truth: BTreeMap::new(),
        }
    }

    #[test]
    fn test_session_ranges() {
        let ds = dataset();
        assert_eq!(ds.session_ranges(false), vec![1..4, 4..6]);
        assert_eq!(ds.session_ranges(true), vec![1..6, 6..9]);
        assert_eq!(ds.total_observations(), 5);
    }

    #[test]
    fn test_log_interpolates_within_sessions() {
        let ds = dataset();
        let log = ds.observation_log(true).unwrap();
        assert_eq!(log.len(), 8);
        let flags: Vec<bool> = log.iter().map(|e| e.interpolated).collect();
        assert_eq!(flags, vec![false, true, false, true, false, false, true, false]);
        assert_eq!(log.get(StepKey(3.5)).map(|o| o.difficulty), Some(3.0));
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let json = r#"{"participant": "x", "sessions": [[]]}"#;
        let err = InteractionDataset::from_json(json).unwrap_err();
        assert!(matches!(err, TomError::Dataset(_)));
    }
}
