//! 训练/测试时间步划分
//!
//! 步索引与节点历史下标一致: 第 1 条观测对应步 1。
//! 动态划分在每个会话内按固定大小分组, 每组选出的训练步均匀分布:
//! 组长 n、训练数 k 时取组内位置 `floor((i + 0.5) · n / k)`。

use std::collections::BTreeSet;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use tom_core::{Result, TomError};

/// 划分策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SplitStrategy {
    /// 显式给出的索引
    Fixed { train: Vec<usize>, test: Vec<usize> },
    /// 按会话分组动态划分
    Dynamic {
        train_fraction: f64,
        group_size: usize,
        #[serde(default)]
        exclude_first: bool,
        #[serde(default)]
        exclude_last: bool,
    },
}

impl Default for SplitStrategy {
    fn default() -> Self {
        SplitStrategy::Dynamic {
            train_fraction: 0.8,
            group_size: 5,
            exclude_first: true,
            exclude_last: false,
        }
    }
}

/// 划分结果, 两个列表均升序且互不相交
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitStrategy {
    /// 在给定会话的步索引范围上划分
    pub fn split(&self, sessions: &[Range<usize>]) -> Result<TrainTestSplit> {
        match self {
            SplitStrategy::Fixed { train, test } => {
                let train_set: BTreeSet<usize> = train.iter().copied().collect();
                let test_set: BTreeSet<usize> = test.iter().copied().collect();
                if let Some(shared) = train_set.intersection(&test_set).next() {
                    return Err(TomError::InvalidSettings(format!(
                        "step {} is in both train and test sets",
                        shared
                    )));
                }
                Ok(TrainTestSplit {
                    train: train_set.into_iter().collect(),
                    test: test_set.into_iter().collect(),
                })
            }
            SplitStrategy::Dynamic {
                train_fraction,
                group_size,
                exclude_first,
                exclude_last,
            } => {
                if *group_size == 0 || !(0.0..=1.0).contains(train_fraction) {
                    return Err(TomError::InvalidSettings(format!(
                        "invalid dynamic split: fraction {}, group size {}",
                        train_fraction, group_size
                    )));
                }
                let mut out = TrainTestSplit::default();
                for session in sessions {
                    let mut steps: Vec<usize> = session.clone().collect();
                    if *exclude_first && !steps.is_empty() {
                        steps.remove(0);
                    }
                    if *exclude_last {
                        steps.pop();
                    }
                    for group in steps.chunks(*group_size) {
                        let n = group.len();
                        let k = ((train_fraction * n as f64).round() as usize).min(n);
                        let picks = spread(n, k);
                        for (pos, step) in group.iter().enumerate() {
                            if picks.contains(&pos) {
                                out.train.push(*step);
                            } else {
                                out.test.push(*step);
                            }
                        }
                    }
                }
                out.train.sort_unstable();
                out.test.sort_unstable();
                Ok(out)
            }
        }
    }
}

/// n 个位置中均匀选出 k 个
fn spread(n: usize, k: usize) -> Vec<usize> {
    (0..k).map(|i| ((i as f64 + 0.5) * n as f64 / k as f64).floor() as usize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spread_positions() {
        assert_eq!(spread(5, 4), vec![0, 1, 3, 4]);
        assert_eq!(spread(5, 1), vec![2]);
        assert_eq!(spread(4, 4), vec![0, 1, 2, 3]);
        assert!(spread(3, 0).is_empty());
    }

    #[test]
    fn test_dynamic_split_per_session() {
        let strategy = SplitStrategy::Dynamic {
            train_fraction: 0.8,
            group_size: 5,
            exclude_first: true,
            exclude_last: false,
        };
        let split = strategy.split(&[1..7, 7..13]).unwrap();
        // 每个会话去掉首步后剩 5 步, 训练取位置 0,1,3,4
        assert_eq!(split.train, vec![2, 3, 5, 6, 8, 9, 11, 12]);
        assert_eq!(split.test, vec![4, 10]);
    }

    #[test]
    fn test_exclude_last() {
        let strategy = SplitStrategy::Dynamic {
            train_fraction: 0.5,
            group_size: 2,
            exclude_first: false,
            exclude_last: true,
        };
        let split = strategy.split(&[1..6]).unwrap();
        // 每组两步, 训练取组内位置 1
        assert_eq!(split.train, vec![2, 4]);
        assert_eq!(split.test, vec![1, 3]);
    }

    #[test]
    fn test_fixed_overlap_rejected() {
        let strategy = SplitStrategy::Fixed {
            train: vec![1, 2, 3],
            test: vec![3, 4],
        };
        assert!(strategy.split(&[]).is_err());

        let strategy = SplitStrategy::Fixed {
            train: vec![3, 1],
            test: vec![4],
        };
        let split = strategy.split(&[]).unwrap();
        assert_eq!(split.train, vec![1, 3]);
    }

    #[test]
    fn test_json_tagged() {
        let json = r#"{"type": "dynamic", "train_fraction": 0.5, "group_size": 4}"#;
        let s: SplitStrategy = serde_json::from_str(json).unwrap();
        assert!(matches!(s, SplitStrategy::Dynamic { exclude_first: false, .. }));
    }
}
