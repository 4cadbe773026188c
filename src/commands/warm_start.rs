use crate::commands::progress_bar;
use crate::context::AppContext;
use crate::error::SkipReason;
use crate::models::{EntityOutcome, LabeledFrame, TickerDataset};
use crate::predictor::artifact::ArtifactStore;
use crate::predictor::ScorePredictor;
use crate::report::BatchReport;
use crate::split::DatasetSplitter;
use crate::universe::warm_start_universe;
use anyhow::Result;
use log::{info, warn};

/// Train and test partitions of a whole chunk, each shuffled with the
/// splitter seed.
#[derive(Debug, Clone, Default)]
pub struct PooledSplit {
    pub tickers: Vec<String>,
    pub train: LabeledFrame,
    pub test: LabeledFrame,
}

/// Splits every dataset in time order and pools the partitions.
pub fn pool_datasets(
    datasets: &[TickerDataset],
    splitter: &DatasetSplitter,
    report: &mut BatchReport,
) -> PooledSplit {
    let mut tickers = Vec::with_capacity(datasets.len());
    let mut train = LabeledFrame::default();
    let mut test = LabeledFrame::default();

    for dataset in datasets {
        if !train.feature_names.is_empty() && train.feature_names != dataset.feature_names {
            report.record_skip(
                &dataset.ticker,
                &SkipReason::Model("feature columns differ from the rest of the chunk".to_string()),
            );
            continue;
        }
        let frame = dataset.to_frame();
        let cut = splitter.split_index(frame.len());
        let appended = train
            .append(frame.slice(0, cut).labeled())
            .and_then(|_| test.append(frame.slice(cut, frame.len())));
        if let Err(err) = appended {
            report.record_skip(&dataset.ticker, &SkipReason::Model(format!("{:#}", err)));
            continue;
        }
        tickers.push(dataset.ticker.clone());
    }

    PooledSplit {
        tickers,
        train: splitter.shuffle(&train),
        test: splitter.shuffle(&test),
    }
}

/// Trains the shared model on one pooled chunk and logs the pooled
/// evaluation.
pub fn train_chunk(
    app: &AppContext,
    store: &mut ArtifactStore,
    pooled: &PooledSplit,
) -> Result<(), SkipReason> {
    let mut predictor = ScorePredictor::new(app.model_config().clone());
    predictor.warm_start_training(store, &pooled.train)?;
    info!("Training complete on {} samples", pooled.train.len());

    match predictor.evaluate_model(&pooled.test) {
        Ok(metrics) => info!(
            "Pooled evaluation on {} rows: accuracy {}%, precision {}%, recall {}%, f1 {}%, roc_auc {}%",
            pooled.test.len(),
            metrics.accuracy,
            metrics.precision,
            metrics.recall,
            metrics.f1,
            metrics.roc_auc
        ),
        Err(err) => warn!("Pooled evaluation skipped: {}", err),
    }
    Ok(())
}

pub async fn run(
    app: &AppContext,
    symbols: Option<Vec<String>>,
    skip_downloading: bool,
    chunk_size: Option<usize>,
) -> Result<BatchReport> {
    let tickers = symbols.unwrap_or_else(warm_start_universe);
    let chunk_size = chunk_size.unwrap_or(app.settings().chunk_size).max(1);
    info!(
        "Warm start training: {} tickers in chunks of {}",
        tickers.len(),
        chunk_size
    );

    let builder = app.dataset_builder(skip_downloading)?;
    let splitter = app.settings().splitter();
    let mut store = app.artifact_store();
    let mut report = BatchReport::new("warm-start");

    let pb = progress_bar(tickers.len())?;
    for chunk in tickers.chunks(chunk_size) {
        pb.set_message(format!("fetching {} tickers", chunk.len()));
        let outcomes = builder.build_chunk(chunk, skip_downloading).await;

        let mut datasets = Vec::with_capacity(outcomes.len());
        for (ticker, outcome) in outcomes {
            match outcome {
                EntityOutcome::Ready(dataset) => datasets.push(dataset),
                EntityOutcome::Skipped(reason) => {
                    warn!("{}: skipped ({})", ticker, reason);
                    report.record_skip(&ticker, &reason);
                }
            }
        }

        let pooled = pool_datasets(&datasets, &splitter, &mut report);
        if pooled.train.is_empty() {
            warn!("No usable training rows in this chunk");
            for ticker in &pooled.tickers {
                report.record_skip(
                    ticker,
                    &SkipReason::InsufficientData {
                        found: 0,
                        required: app.settings().min_aligned_rows,
                    },
                );
            }
        } else {
            pb.set_message(format!("training on {} rows", pooled.train.len()));
            match train_chunk(app, &mut store, &pooled) {
                Ok(()) => pooled
                    .tickers
                    .iter()
                    .for_each(|ticker| report.record_processed(ticker)),
                Err(reason) => {
                    warn!("Warm start training failed for this chunk: {}", reason);
                    for ticker in &pooled.tickers {
                        report.record_skip(ticker, &reason);
                    }
                }
            }
        }
        pb.inc(chunk.len() as u64);
    }
    pb.finish_and_clear();

    report.log_summary();
    Ok(report)
}
