use crate::context::AppContext;
use crate::models::LabeledFrame;
use crate::selection::{select_by_correlation, select_univariate, FeatureScore};
use anyhow::{anyhow, Result};
use clap::ValueEnum;
use log::info;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SelectionStrategy {
    /// Greedy pruning of features correlated with ones already kept
    Correlation,
    /// One-way ANOVA F score against the target
    Univariate,
}

impl SelectionStrategy {
    fn label(self) -> &'static str {
        match self {
            SelectionStrategy::Correlation => "correlation",
            SelectionStrategy::Univariate => "univariate",
        }
    }
}

pub fn select(
    frame: &LabeledFrame,
    strategy: SelectionStrategy,
    top_n: usize,
    threshold: f64,
) -> Vec<FeatureScore> {
    match strategy {
        SelectionStrategy::Correlation => select_by_correlation(frame, threshold, top_n),
        SelectionStrategy::Univariate => select_univariate(frame, top_n),
    }
}

pub async fn run(
    app: &AppContext,
    ticker: &str,
    strategy: SelectionStrategy,
    top_n: usize,
    threshold: f64,
    skip_downloading: bool,
) -> Result<Vec<FeatureScore>> {
    let builder = app.dataset_builder(skip_downloading)?;
    let dataset = builder
        .build(ticker, skip_downloading)
        .await
        .into_dataset()
        .map_err(|reason| anyhow!("{}: no dataset ({})", ticker, reason))?;

    let frame = dataset.to_frame();
    info!(
        "{}: ranking {} features over {} labeled rows ({} selection)",
        ticker,
        frame.feature_names.len(),
        frame.labeled_len(),
        strategy.label()
    );

    let selected = select(&frame, strategy, top_n, threshold);
    for (rank, feature) in selected.iter().enumerate() {
        match feature.p_value {
            Some(p_value) => info!(
                "{:>3}. {:<48} score {:>10.4}  p {:.4}",
                rank + 1,
                feature.name,
                feature.score,
                p_value
            ),
            None => info!("{:>3}. {:<48} score {:>10.4}", rank + 1, feature.name, feature.score),
        }
    }
    Ok(selected)
}
