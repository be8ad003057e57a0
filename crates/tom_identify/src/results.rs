//! 辨识结果表与持久化
//!
//! 每个辨识阶段产出一张结果表 (一行一次运行), 以 JSON 文件形式按表名保存。
//! 测试代价可以事后追加到已保存的表中。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use tom_core::{Result, TomError};

/// 单次运行的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_index: usize,
    pub seed: u64,
    pub final_cost: f64,
    pub parameters: Vec<f64>,
    #[serde(default)]
    pub cost_trace: Vec<f64>,
    #[serde(default)]
    pub pruned: bool,
    #[serde(default)]
    pub test_cost: Option<f64>,
}

/// 单个参数的辨识性报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterReport {
    pub name: String,
    /// 近优运行池中的均值
    pub mean: f64,
    /// 近优运行池中的方差
    pub variance: f64,
    /// 最优运行中的取值
    pub best: f64,
    pub identified: bool,
}

/// 结果表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsTable {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub parameter_names: Vec<String>,
    pub runs: Vec<RunResult>,
}

impl ResultsTable {
    pub fn new(name: impl Into<String>, parameter_names: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            parameter_names,
            runs: Vec::new(),
        }
    }

    pub fn push(&mut self, run: RunResult) {
        self.runs.push(run);
    }

    /// 最优运行; 未剪枝的运行优先
    pub fn best(&self) -> Option<&RunResult> {
        let by_cost = |a: &&RunResult, b: &&RunResult| a.final_cost.total_cmp(&b.final_cost);
        self.runs
            .iter()
            .filter(|r| !r.pruned)
            .min_by(by_cost)
            .or_else(|| self.runs.iter().min_by(by_cost))
    }

    /// 近优运行池: 代价不超过 best·(1 + rel_tol) + abs_tol 的未剪枝运行
    pub fn near_optimal(&self, rel_tol: f64, abs_tol: f64) -> Vec<&RunResult> {
        let Some(best) = self.best() else {
            return Vec::new();
        };
        let limit = best.final_cost * (1.0 + rel_tol) + abs_tol;
        self.runs
            .iter()
            .filter(|r| !r.pruned && r.final_cost <= limit)
            .collect()
    }

    /// 基于近优运行池内的方差判断每个参数是否被辨识
    pub fn identifiability(
        &self,
        rel_tol: f64,
        abs_tol: f64,
        variance_threshold: f64,
    ) -> Vec<ParameterReport> {
        let Some(best) = self.best() else {
            return Vec::new();
        };
        // 全部运行被剪枝时, 池中只剩最优运行
        let mut pool = self.near_optimal(rel_tol, abs_tol);
        if pool.is_empty() {
            pool.push(best);
        }
        let n = pool.len() as f64;

        self.parameter_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let values: Vec<f64> =
                    pool.iter().filter_map(|r| r.parameters.get(i).copied()).collect();
                let mean = values.iter().sum::<f64>() / n;
                let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                ParameterReport {
                    name: name.clone(),
                    mean,
                    variance,
                    best: best.parameters.get(i).copied().unwrap_or(f64::NAN),
                    identified: variance <= variance_threshold,
                }
            })
            .collect()
    }

    /// 按运行编号写入测试代价
    pub fn set_test_costs(&mut self, costs: &[(usize, f64)]) {
        for (index, cost) in costs {
            if let Some(run) = self.runs.iter_mut().find(|r| r.run_index == *index) {
                run.test_cost = Some(*cost);
            }
        }
    }
}

/// 结果表存储: 一个目录, 每张表一个 JSON 文件
#[derive(Debug, Clone)]
pub struct ResultsStore {
    dir: PathBuf,
}

impl ResultsStore {
    /// 打开 (必要时创建) 存储目录
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, name: &str) -> PathBuf {
        let file: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file))
    }

    /// 保存结果表, 覆盖同名表
    pub fn save(&self, table: &ResultsTable) -> Result<PathBuf> {
        let path = self.path_of(&table.name);
        std::fs::write(&path, serde_json::to_string_pretty(table)?)?;
        info!(
            "Saved results sheet {} ({} runs) to {}",
            table.name,
            table.runs.len(),
            path.display()
        );
        Ok(path)
    }

    /// 加载结果表
    pub fn load(&self, name: &str) -> Result<ResultsTable> {
        let path = self.path_of(name);
        if !path.exists() {
            return Err(TomError::Dataset(format!("results sheet {} not found", name)));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// 向已保存的结果表追加测试代价
    pub fn append_test_costs(&self, name: &str, costs: &[(usize, f64)]) -> Result<()> {
        let mut table = self.load(name)?;
        table.set_test_costs(costs);
        self.save(&table)?;
        Ok(())
    }

    /// 已保存的表名
    pub fn sheets(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(index: usize, cost: f64, parameters: Vec<f64>) -> RunResult {
        RunResult {
            run_index: index,
            seed: index as u64,
            final_cost: cost,
            parameters,
            cost_trace: vec![],
            pruned: false,
            test_cost: None,
        }
    }

    fn table() -> ResultsTable {
        let mut t = ResultsTable::new("phase", vec!["a".into(), "b".into()]);
        t.push(run(0, 0.100, vec![0.50, 0.9]));
        t.push(run(1, 0.101, vec![0.51, -0.9]));
        t.push(run(2, 0.500, vec![-0.8, 0.0]));
        let mut pruned = run(3, 0.01, vec![0.0, 0.0]);
        pruned.pruned = true;
        t.push(pruned);
        t
    }

    #[test]
    fn test_best_skips_pruned() {
        assert_eq!(table().best().map(|r| r.run_index), Some(0));
    }

    #[test]
    fn test_near_optimal_pool() {
        let t = table();
        let pool: Vec<usize> = t.near_optimal(0.05, 1e-9).iter().map(|r| r.run_index).collect();
        assert_eq!(pool, vec![0, 1]);
    }

    #[test]
    fn test_identifiability() {
        let reports = table().identifiability(0.05, 1e-9, 1e-3);
        assert_eq!(reports.len(), 2);
        assert!(reports[0].identified);
        assert!((reports[0].mean - 0.505).abs() < 1e-12);
        assert!(!reports[1].identified);
        assert_eq!(reports[1].best, 0.9);
    }

    #[test]
    fn test_store_round_trip_and_append() {
        let dir = std::env::temp_dir().join(format!("tom_results_{}", Uuid::new_v4()));
        let store = ResultsStore::open(&dir).unwrap();
        let t = table();
        store.save(&t).unwrap();

        store.append_test_costs("phase", &[(1, 0.25), (7, 1.0)]).unwrap();
        let loaded = store.load("phase").unwrap();
        assert_eq!(loaded.id, t.id);
        assert_eq!(loaded.runs[1].test_cost, Some(0.25));
        assert_eq!(loaded.runs[0].test_cost, None);
        assert_eq!(store.sheets().unwrap(), vec!["phase".to_string()]);
        assert!(store.load("missing").is_err());

        std::fs::remove_dir_all(dir).unwrap();
    }
}
