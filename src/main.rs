use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use cycle_lstm::calendar::{parse_date, read_period_file, records_from_arguments, PeriodRecord};
use cycle_lstm::config::AppConfig;
use cycle_lstm::dataset::{
    combine_training_sets, generate_synthetic, load_synthetic_data, make_train_test_sets,
    targets_as_days, write_synthetic, Sample,
};
use cycle_lstm::evaluation::{evaluate_predictions, regression_report, round_predictions};
use cycle_lstm::forecast::{format_projection, project_periods, Forecaster};
use cycle_lstm::phase::{day_of_cycle, describe_day, PhaseThresholds};
use cycle_lstm::{create_trainer, CycleModel, ModelMetadata, ModelPersistence, SavedModel};

#[derive(Parser)]
#[command(version, about = "Forecast menstrual cycles from calendar logs")]
pub struct CycleCli {
    /// JSON settings file; flags override its values
    #[arg(env = "CYCLE_LSTM_CONFIG", long, global = true)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub subcommand: CycleCommand,
}

#[derive(Subcommand)]
pub enum CycleCommand {
    ///
    /// Print the cycle records derived from a calendar log
    ///
    Parse {
        #[arg(long, env = "CYCLE_LSTM_CALENDAR")]
        calendar: Option<PathBuf>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    ///
    /// Write a synthetic (cycle, menstruation) history
    ///
    Synthesize {
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 500)]
        count: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
    ///
    /// Train a model on real and optional synthetic data, then save it
    ///
    Train {
        #[arg(long, env = "CYCLE_LSTM_CALENDAR")]
        calendar: Option<PathBuf>,
        #[arg(long)]
        synthetic: Option<PathBuf>,
        #[arg(long, env = "CYCLE_LSTM_MODEL")]
        model: Option<PathBuf>,
        #[arg(long)]
        epochs: Option<usize>,
        #[arg(long)]
        hidden_size: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    ///
    /// Exact-match accuracy of a saved model on the calendar's test split
    ///
    Evaluate {
        #[arg(long, env = "CYCLE_LSTM_CALENDAR")]
        calendar: Option<PathBuf>,
        #[arg(long, env = "CYCLE_LSTM_MODEL")]
        model: Option<PathBuf>,
    },
    ///
    /// Predict the next periods
    ///
    Predict {
        #[arg(long, env = "CYCLE_LSTM_MODEL")]
        model: Option<PathBuf>,
        #[arg(long, env = "CYCLE_LSTM_CALENDAR", conflicts_with = "period")]
        calendar: Option<PathBuf>,
        /// Period as START:END, oldest first (at least four)
        #[arg(long)]
        period: Vec<String>,
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    ///
    /// Show the current cycle phase
    ///
    Phase {
        #[arg(long, env = "CYCLE_LSTM_CALENDAR")]
        calendar: Option<PathBuf>,
        /// Start of the current period when no calendar is given
        #[arg(long)]
        last_start: Option<String>,
        /// Defaults to the local date
        #[arg(long)]
        today: Option<String>,
        /// Use the model's next cycle prediction as the cycle length
        #[arg(long)]
        model: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = CycleCli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref())?;

    match cli.subcommand {
        CycleCommand::Parse { calendar, json } => {
            let records = load_records(&calendar.unwrap_or(config.calendar_path))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    println!(
                        "{}\tcycle {:>3}\tmenstruation {:>2}",
                        record.start_date, record.cycle_length, record.menstruation_length
                    );
                }
            }
            Ok(())
        }
        CycleCommand::Synthesize { output, count, seed } => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let pairs = generate_synthetic(count, &config.synthetic, &mut rng)?;
            write_synthetic(&output, &pairs)?;
            info!("wrote {} synthetic cycles to {}", pairs.len(), output.display());
            Ok(())
        }
        CycleCommand::Train {
            calendar,
            synthetic,
            model,
            epochs,
            hidden_size,
            seed,
        } => {
            let mut config = config;
            if let Some(epochs) = epochs {
                config.training.epochs = epochs;
            }
            if let Some(hidden_size) = hidden_size {
                config.model.hidden_size = hidden_size;
            }
            if seed.is_some() {
                config.training.seed = seed;
            }
            config.validate()?;
            let calendar = calendar.unwrap_or_else(|| config.calendar_path.clone());
            let synthetic = synthetic.or_else(|| config.synthetic_path.clone());
            let model_path = model.unwrap_or_else(|| config.model_path.clone());
            train_command(&config, &calendar, synthetic.as_deref(), &model_path)
        }
        CycleCommand::Evaluate { calendar, model } => {
            let records = load_records(&calendar.unwrap_or_else(|| config.calendar_path.clone()))?;
            let (forecaster, metadata) = Forecaster::load(model.unwrap_or(config.model_path))?;
            info!(
                "loaded model `{}` trained for {} epochs",
                metadata.model_name, metadata.total_epochs
            );

            let split = make_train_test_sets(&records, &config.dataset)?;
            let predictions: Vec<_> = split
                .test
                .iter()
                .map(|s| forecaster.predict_window(&s.inputs))
                .collect();
            report_accuracy(&split.test, &predictions)?;
            Ok(())
        }
        CycleCommand::Predict {
            model,
            calendar,
            period,
            count,
        } => {
            let records = if period.is_empty() {
                load_records(&calendar.unwrap_or(config.calendar_path))?
            } else {
                records_from_arguments(period.as_slice())?
            };
            let (forecaster, _) = Forecaster::load(model.unwrap_or(config.model_path))?;

            let predictions = forecaster.forecast(&records, count)?;
            for prediction in &predictions {
                println!(
                    "Next period: {} to {} (cycle {} days, menstruation {} days)",
                    prediction.next_start,
                    prediction.next_end,
                    prediction.cycle_length,
                    prediction.menstruation_length
                );
            }
            Ok(())
        }
        CycleCommand::Phase {
            calendar,
            last_start,
            today,
            model,
        } => {
            let today = match today {
                Some(value) => cli_date(&value)?,
                None => Local::now().date_naive(),
            };

            let (last_start, mut thresholds, records) = match last_start {
                Some(value) => {
                    let date = cli_date(&value)?;
                    (date, PhaseThresholds::default(), Vec::new())
                }
                None => {
                    let records = load_records(&calendar.unwrap_or(config.calendar_path))?;
                    let last = records
                        .last()
                        .ok_or_else(|| anyhow!("calendar has no complete cycles"))?;
                    (last.start_date, PhaseThresholds::from_history(&records), records)
                }
            };

            if let Some(path) = model {
                let (forecaster, _) = Forecaster::load(path)?;
                match forecaster.predict_next(&records) {
                    Ok(prediction) => thresholds.cycle_length = prediction.cycle_length,
                    Err(e) => warn!("keeping averaged cycle length: {}", e),
                }
            }

            let day = day_of_cycle(last_start, today)?;
            println!("{}", describe_day(day, &thresholds)?);
            Ok(())
        }
    }
}

fn cli_date(value: &str) -> anyhow::Result<NaiveDate> {
    parse_date(value).ok_or_else(|| anyhow!("invalid date `{}`", value))
}

fn load_records(path: &Path) -> anyhow::Result<Vec<PeriodRecord>> {
    let records = read_period_file(path)
        .with_context(|| format!("reading calendar {}", path.display()))?;
    info!("read {} cycles from {}", records.len(), path.display());
    Ok(records)
}

fn report_accuracy(test: &[Sample], predictions: &[[f64; 2]]) -> anyhow::Result<()> {
    if test.is_empty() {
        warn!("no test samples to evaluate");
        return Ok(());
    }

    let accuracy = evaluate_predictions(&targets_as_days(test), &round_predictions(predictions))?;
    let truth: Vec<[f64; 2]> = test.iter().map(|s| s.target).collect();
    let report = regression_report(&truth, predictions)?;

    println!("Accuracy of menstrual cycle length prediction: {:.4}", accuracy.cycle_length);
    println!("Accuracy of menstruation length prediction: {:.4}", accuracy.menstruation_length);
    println!(
        "MAE: {:.2} / {:.2} days, MAPE: {:.1}% / {:.1}%",
        report.mae[0], report.mae[1], report.mape[0], report.mape[1]
    );
    Ok(())
}

fn train_command(
    config: &AppConfig,
    calendar: &Path,
    synthetic: Option<&Path>,
    model_path: &Path,
) -> anyhow::Result<()> {
    let records = load_records(calendar)?;
    let real = make_train_test_sets(&records, &config.dataset)?;

    let train_data = match synthetic {
        Some(path) => {
            let synthetic = load_synthetic_data(path, &config.dataset)
                .with_context(|| format!("reading synthetic data {}", path.display()))?;
            combine_training_sets(&synthetic.train, &real.train, config.real_tail)
        }
        None => real.train.clone(),
    };
    if train_data.is_empty() {
        bail!("not enough cycles to train: need at least four recorded cycles or a synthetic file");
    }

    let model = match config.training.seed {
        Some(seed) => {
            CycleModel::with_seed(config.model.hidden_size, config.model.num_layers, seed)
        }
        None => CycleModel::new(config.model.hidden_size, config.model.num_layers),
    };
    let mut trainer = create_trainer(model, &train_data, config.training.clone());
    let validation = (!real.test.is_empty()).then_some(real.test.as_slice());
    trainer.train(&train_data, validation)?;

    let predictions = trainer.predict_samples(&real.test);
    report_accuracy(&real.test, &predictions)?;

    if let (Some(last_known), Some(first)) = (real.last_known_period, predictions.first()) {
        let rounded = round_predictions(std::slice::from_ref(first));
        print!("{}", format_projection(&project_periods(last_known, &rounded)?));
    }

    let mut metadata = ModelMetadata::new("cycle_lstm", &trainer.model);
    metadata.total_epochs = config.training.epochs;
    metadata.final_loss = trainer.get_latest_metrics().map(|m| m.train_loss);
    metadata.accuracy = if real.test.is_empty() {
        None
    } else {
        Some(evaluate_predictions(&targets_as_days(&real.test), &round_predictions(&predictions))?)
    };

    if let Some(parent) = model_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let (model, normalizer) = trainer.into_parts();
    ModelPersistence::save(&SavedModel::new(&model, normalizer, metadata), model_path)?;
    println!("Model saved to {}", model_path.display());
    Ok(())
}
