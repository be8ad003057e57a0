//! 交互观测记录 (Real-Life Data)
//!
//! 每个离散交互步产生一条观测; 模型需要更细的时间网格时,
//! 在两条真实观测之间插值出一条虚拟观测。

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TomError};

/// 步索引: 谜题编号 + 子步小数
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepKey(pub f64);

impl StepKey {
    /// 谜题整点
    pub fn puzzle(puzzle: u32) -> Self {
        Self(puzzle as f64)
    }

    /// 谜题中点 (虚拟观测)
    pub fn mid(puzzle: u32) -> Self {
        Self(puzzle as f64 + 0.5)
    }

    /// 谜题编号
    pub fn puzzle_number(self) -> u32 {
        self.0.floor().max(0.0) as u32
    }

    /// 子步小数
    pub fn fraction(self) -> f64 {
        self.0 - self.0.floor()
    }

    /// 两个步索引的中点
    pub fn midpoint(self, other: StepKey) -> Self {
        Self((self.0 + other.0) / 2.0)
    }
}

impl PartialEq for StepKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for StepKey {}

impl PartialOrd for StepKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StepKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// 单步交互观测
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Observation {
    /// 提示次数
    pub hints: u32,
    /// 每一步棋的错误尝试次数 (虚拟观测中为两侧均值, 可为小数)
    pub wrong_attempts: Vec<f64>,
    /// 谜题难度等级
    pub difficulty: f64,
    /// 被揭示的步数比例 [0,1]
    pub revealed_moves: f64,
    /// 解题用时 (秒)
    pub time_to_solve: f64,
    /// 机器人是否在帮助
    pub robot_helping: bool,
    /// 机器人是否提供奖励
    pub robot_offering_reward: bool,
    /// 是否发放奖励
    pub reward_given: bool,
    /// 是否跳过谜题
    pub skipped: bool,
}

impl Observation {
    /// 错误尝试总数
    pub fn total_wrong_attempts(&self) -> f64 {
        self.wrong_attempts.iter().sum()
    }

    /// 在两条真实观测之间构造一条虚拟观测
    ///
    /// 提示, 难度与用时取向上取整的均值; 错误尝试取算术均值不取整,
    /// 两侧步数不一致时合并为单个桶。
    pub fn interpolate(a: &Observation, b: &Observation) -> Observation {
        let wrong_attempts = if a.wrong_attempts.len() == b.wrong_attempts.len() {
            a.wrong_attempts
                .iter()
                .zip(&b.wrong_attempts)
                .map(|(x, y)| (x + y) / 2.0)
                .collect()
        } else {
            vec![(a.total_wrong_attempts() + b.total_wrong_attempts()) / 2.0]
        };

        Observation {
            hints: ceil_mean(a.hints as f64, b.hints as f64) as u32,
            wrong_attempts,
            difficulty: ceil_mean(a.difficulty, b.difficulty),
            revealed_moves: (a.revealed_moves + b.revealed_moves) / 2.0,
            time_to_solve: ceil_mean(a.time_to_solve, b.time_to_solve),
            robot_helping: a.robot_helping || b.robot_helping,
            robot_offering_reward: a.robot_offering_reward || b.robot_offering_reward,
            reward_given: a.reward_given || b.reward_given,
            skipped: a.skipped || b.skipped,
        }
    }
}

fn ceil_mean(a: f64, b: f64) -> f64 {
    ((a + b) / 2.0).ceil()
}

/// 观测日志条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub key: StepKey,
    pub observation: Observation,
    /// 是否为插值生成的虚拟观测
    pub interpolated: bool,
}

/// 单个交互会话的有序观测日志
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationLog {
    entries: Vec<LogEntry>,
}

impl ObservationLog {
    /// 创建空日志
    pub fn new() -> Self {
        Self::default()
    }

    /// 由按谜题顺序排列的观测构造, 第 i 条观测的步索引为 i
    pub fn from_observations(observations: impl IntoIterator<Item = Observation>) -> Self {
        let entries = observations
            .into_iter()
            .enumerate()
            .map(|(i, observation)| LogEntry {
                key: StepKey::puzzle(i as u32),
                observation,
                interpolated: false,
            })
            .collect();
        Self { entries }
    }

    /// 追加观测, 步索引必须严格递增
    pub fn push(&mut self, key: StepKey, observation: Observation) -> Result<()> {
        self.push_entry(LogEntry {
            key,
            observation,
            interpolated: false,
        })
    }

    /// 追加完整条目 (保留插值标记), 步索引必须严格递增
    pub fn push_entry(&mut self, entry: LogEntry) -> Result<()> {
        if let Some(last) = self.entries.last() {
            if entry.key <= last.key {
                return Err(TomError::Dataset(format!(
                    "step key {} does not follow {}",
                    entry.key, last.key
                )));
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    /// 按步索引检索
    pub fn get(&self, key: StepKey) -> Option<&Observation> {
        self.entries
            .binary_search_by(|e| e.key.cmp(&key))
            .ok()
            .map(|i| &self.entries[i].observation)
    }

    /// 在每对相邻真实观测之间插入一条虚拟观测
    pub fn with_midpoints(&self) -> ObservationLog {
        let mut entries = Vec::with_capacity(self.entries.len() * 2);
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                let prev = &self.entries[i - 1];
                entries.push(LogEntry {
                    key: prev.key.midpoint(entry.key),
                    observation: Observation::interpolate(&prev.observation, &entry.observation),
                    interpolated: true,
                });
            }
            entries.push(entry.clone());
        }
        ObservationLog { entries }
    }

    /// 遍历条目
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// 最后一条观测
    pub fn last(&self) -> Option<&Observation> {
        self.entries.last().map(|e| &e.observation)
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(hints: u32, wrong: Vec<f64>, difficulty: f64) -> Observation {
        Observation {
            hints,
            wrong_attempts: wrong,
            difficulty,
            revealed_moves: 0.5,
            time_to_solve: 31.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_interpolate_means() {
        let a = obs(1, vec![0.0, 1.0], 2.0);
        let mut b = obs(2, vec![1.0, 2.0], 3.0);
        b.revealed_moves = 0.0;
        b.time_to_solve = 40.0;
        b.robot_helping = true;

        let mid = Observation::interpolate(&a, &b);
        assert_eq!(mid.hints, 2);
        assert_eq!(mid.wrong_attempts, vec![0.5, 1.5]);
        assert_eq!(mid.difficulty, 3.0);
        assert_eq!(mid.revealed_moves, 0.25);
        assert_eq!(mid.time_to_solve, 36.0);
        assert!(mid.robot_helping);
        assert!(!mid.skipped);
    }

    #[test]
    fn test_interpolate_wrong_attempts_length_mismatch() {
        let a = obs(0, vec![1.0, 2.0], 1.0);
        let b = obs(0, vec![4.0], 1.0);
        let mid = Observation::interpolate(&a, &b);
        assert_eq!(mid.wrong_attempts, vec![3.5]);
        assert_eq!(mid.total_wrong_attempts(), 3.5);
    }

    #[test]
    fn test_log_with_midpoints() {
        let log = ObservationLog::from_observations(vec![
            obs(0, vec![], 1.0),
            obs(2, vec![], 3.0),
            obs(4, vec![], 5.0),
        ]);
        let fine = log.with_midpoints();
        assert_eq!(fine.len(), 5);
        assert_eq!(fine.get(StepKey::mid(0)).map(|o| o.hints), Some(1));
        assert_eq!(fine.get(StepKey::mid(1)).map(|o| o.difficulty), Some(4.0));
        assert!(fine.iter().nth(1).map(|e| e.interpolated).unwrap_or(false));
        assert_eq!(fine.get(StepKey::puzzle(2)).map(|o| o.hints), Some(4));
    }

    #[test]
    fn test_push_rejects_out_of_order() {
        let mut log = ObservationLog::new();
        assert!(log.push(StepKey(1.0), Observation::default()).is_ok());
        assert!(log.push(StepKey(0.5), Observation::default()).is_err());
        assert_eq!(StepKey(3.5).puzzle_number(), 3);
        assert_eq!(StepKey(3.5).fraction(), 0.5);
    }
}
