//! ToMLoom CLI - 离线参数辨识
//!
//! 用法:
//!   tom-identify --data p07.json [--participant p07] [--model chess_tutor|model.json]
//!                [--mode all|var_by_var|sep_per_1|sep_per_2|sep_per_3]
//!                [--split dynamic|fixed:1,2,3/4,5] [--settings settings.json]
//!                [--out results] [--parallel] [--optimizer gd|ga] [--seed 42]

use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tom_fcm::ModelBlueprint;
use tom_identify::{
    IdentificationMode, IdentificationReport, IdentificationSettings, Identifier,
    InteractionDataset, OptimizerKind, ResultsStore, SplitStrategy,
};

/// 命令行参数
#[derive(Debug)]
struct CliArgs {
    participant: Option<String>,
    data: PathBuf,
    model: String,
    mode: IdentificationMode,
    split: SplitStrategy,
    settings: Option<PathBuf>,
    out: PathBuf,
    parallel: bool,
    optimizer: Option<OptimizerKind>,
    seed: Option<u64>,
}

impl CliArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut participant = None;
        let mut data = None;
        let mut model = "chess_tutor".to_string();
        let mut mode = IdentificationMode::All;
        let mut split = SplitStrategy::default();
        let mut settings = None;
        let mut out = PathBuf::from("results");
        let mut parallel = false;
        let mut optimizer = None;
        let mut seed = None;

        let mut args = args.into_iter();
        while let Some(flag) = args.next() {
            if flag == "--parallel" {
                parallel = true;
                continue;
            }
            if flag == "--help" || flag == "-h" {
                print_usage();
                std::process::exit(0);
            }
            let value = args
                .next()
                .with_context(|| format!("missing value for {}", flag))?;
            match flag.as_str() {
                "--participant" => participant = Some(value),
                "--data" => data = Some(PathBuf::from(value)),
                "--model" => model = value,
                "--mode" => mode = value.parse()?,
                "--split" => split = parse_split(&value)?,
                "--settings" => settings = Some(PathBuf::from(value)),
                "--out" => out = PathBuf::from(value),
                "--optimizer" => optimizer = Some(value.parse()?),
                "--seed" => {
                    let parsed = value
                        .parse::<u64>()
                        .with_context(|| format!("invalid seed: {}", value))?;
                    seed = Some(parsed);
                }
                other => bail!("unknown flag: {}", other),
            }
        }

        Ok(Self {
            participant,
            data: data.context("--data is required")?,
            model,
            mode,
            split,
            settings,
            out,
            parallel,
            optimizer,
            seed,
        })
    }
}

/// `dynamic` 或 `fixed:<train,..>/<test,..>`
fn parse_split(value: &str) -> anyhow::Result<SplitStrategy> {
    if value == "dynamic" {
        return Ok(SplitStrategy::default());
    }
    let Some(lists) = value.strip_prefix("fixed:") else {
        bail!("unknown split: {}", value);
    };
    let (train, test) = lists.split_once('/').unwrap_or((lists, ""));
    let parse_list = |s: &str| -> anyhow::Result<Vec<usize>> {
        s.split(',')
            .filter(|p| !p.trim().is_empty())
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("invalid step index: {}", p))
            })
            .collect()
    };
    Ok(SplitStrategy::Fixed {
        train: parse_list(train)?,
        test: parse_list(test)?,
    })
}

fn print_usage() {
    println!("tom-identify --data <file.json> [--participant <id>]");
    println!("             [--model <chess_tutor|file.json>]");
    println!("             [--mode <all|var_by_var|sep_per_1|sep_per_2|sep_per_3>]");
    println!("             [--split <dynamic|fixed:<train,..>/<test,..>>]");
    println!("             [--settings <file.json>]");
    println!("             [--out <dir>] [--parallel] [--optimizer <gd|ga>] [--seed <n>]");
}

fn print_report(report: &IdentificationReport) {
    println!("Participant {} ({})", report.participant, report.mode);
    for phase in &report.phases {
        println!(
            "  phase {:<28} best cost {:.6e}  test cost {}",
            phase.name,
            phase.best_cost,
            phase.test_cost.map(|c| format!("{:.6e}", c)).unwrap_or_else(|| "-".into())
        );
    }
    println!("Parameters:");
    for (name, value) in report.parameter_names.iter().zip(&report.final_parameters) {
        let mark = if report.unidentified.contains(name) { " (unidentified)" } else { "" };
        println!("  {:<48} {:>10.6}{}", name, value, mark);
    }
    println!("Train cost: {:.6e}", report.train_cost);
    if let Some(test) = report.test_cost {
        println!("Test cost:  {:.6e}", test);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tom_cli=info,tom_identify=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse(std::env::args().skip(1))?;

    let mut settings = match &args.settings {
        Some(path) => IdentificationSettings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => IdentificationSettings::default(),
    };
    settings.parallel |= args.parallel;
    if let Some(optimizer) = args.optimizer {
        settings.optimizer = optimizer;
    }
    if let Some(seed) = args.seed {
        settings.seed = seed;
    }
    settings.validate()?;

    let mut dataset = InteractionDataset::load(&args.data)
        .with_context(|| format!("loading dataset from {}", args.data.display()))?;
    if let Some(participant) = &args.participant {
        dataset.participant = participant.clone();
    }

    let blueprint = if args.model == "chess_tutor" {
        ModelBlueprint::chess_tutor()
    } else {
        let text = std::fs::read_to_string(&args.model)
            .with_context(|| format!("reading model {}", args.model))?;
        ModelBlueprint::from_json(&text)?
    };

    tracing::info!(
        "Identifying {} ({} observations) with {} / {:?}",
        dataset.participant,
        dataset.total_observations(),
        args.mode,
        settings.optimizer
    );

    let mode = args.mode;
    let split = args.split.clone();
    let report = tokio::task::spawn_blocking(move || -> anyhow::Result<IdentificationReport> {
        let mut identifier = Identifier::from_dataset(&blueprint, &dataset, &split, settings)?;
        Ok(identifier.run(mode)?)
    })
    .await??;

    let store = ResultsStore::open(&args.out)?;
    for phase in &report.phases {
        store.save(&phase.table)?;
    }
    let summary_dir = store.dir().join("reports");
    std::fs::create_dir_all(&summary_dir)?;
    let mode_name = report.mode.as_str().to_lowercase();
    let summary = summary_dir.join(format!("{}_{}.json", report.participant, mode_name));
    std::fs::write(&summary, serde_json::to_string_pretty(&report)?)?;
    tracing::info!("Summary written to {}", summary.display());

    print_report(&report);
    Ok(())
}
