use crate::commands::progress_bar;
use crate::config::ModelConfig;
use crate::context::AppContext;
use crate::error::SkipReason;
use crate::models::{EvaluationMetrics, TickerDataset};
use crate::predictor::artifact::ArtifactStore;
use crate::predictor::ScorePredictor;
use crate::report::BatchReport;
use crate::results::{QualityGate, ResultWriter};
use crate::split::DatasetSplitter;
use anyhow::{anyhow, Result};
use log::{debug, info, warn};

/// Fine-tunes a private copy of the stored model on the head of `dataset`
/// and evaluates it on the tail.
pub fn fine_tune_and_evaluate(
    model: &ModelConfig,
    store: &ArtifactStore,
    splitter: &DatasetSplitter,
    dataset: &TickerDataset,
) -> Result<EvaluationMetrics, SkipReason> {
    let split = splitter.split(&dataset.to_frame());
    if split.train.is_empty() {
        return Err(SkipReason::InsufficientData {
            found: dataset.labeled_len(),
            required: 2,
        });
    }

    let mut predictor = ScorePredictor::new(model.clone());
    predictor.fine_tune_model(store, &split.train)?;
    debug!(
        "{}: fine-tuned on {} rows ({} trees)",
        dataset.ticker,
        split.train.len(),
        predictor.classifier().num_trees()
    );
    predictor
        .evaluate_model(&split.test)
        .map_err(SkipReason::from)
}

/// Applies the quality gate and writes the result file when it passes.
pub fn publish(
    ticker: &str,
    metrics: &EvaluationMetrics,
    gate: &QualityGate,
    writer: &ResultWriter,
) -> Result<(), SkipReason> {
    if !gate.passes(metrics) {
        return Err(SkipReason::QualityGateFailed);
    }
    writer
        .write(ticker, metrics)
        .map(|path| debug!("{}: saved results to {}", ticker, path.display()))
        .map_err(|err| SkipReason::Model(format!("{:#}", err)))
}

pub async fn run(
    app: &AppContext,
    symbols: Option<Vec<String>>,
    skip_downloading: bool,
) -> Result<BatchReport> {
    let store = app.artifact_store();
    if !store.exists() {
        return Err(anyhow!(
            "No warm-start model at {}. Run warm-start first.",
            store.path().display()
        ));
    }

    let tickers = match symbols {
        Some(symbols) => symbols,
        None => {
            app.universe()
                .await?
                .symbols_with_min_market_cap(app.settings().min_market_cap)
                .await?
        }
    };
    info!("Fine-tuning and evaluating {} tickers", tickers.len());

    let builder = app.dataset_builder(skip_downloading)?;
    let splitter = app.settings().splitter();
    let gate = app.settings().quality_gate();
    let writer = app.result_writer();
    let mut report = BatchReport::new("fine-tune");

    let pb = progress_bar(tickers.len())?;
    for ticker in &tickers {
        pb.set_message(ticker.clone());
        let outcome = builder
            .build(ticker, skip_downloading)
            .await
            .into_dataset()
            .and_then(|dataset| fine_tune_and_evaluate(app.model_config(), &store, &splitter, &dataset))
            .and_then(|metrics| {
                report.record_processed(ticker);
                info!("{}: evaluation {:?}", ticker, metrics);
                publish(ticker, &metrics, &gate, &writer)
            });

        match outcome {
            Ok(()) => report.record_published(ticker),
            Err(reason) => {
                debug!("{}: {}", ticker, reason);
                report.record_skip(ticker, &reason);
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    report.log_summary();
    if report.published_count() == 0 {
        warn!("No results passed the quality gate");
    }
    Ok(report)
}
