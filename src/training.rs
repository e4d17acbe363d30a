use burn::{
    data::dataset::{
        vision::{MnistDataset, MnistItem},
        Dataset,
    },
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use serde::{Deserialize, Serialize};

use crate::{
    config::TrainingConfig,
    data::{mnist_loader, num_batches},
    evaluation::{evaluate, EvaluationReport},
    model::Cnn,
    MnistError,
};

/// Loss statistics of one pass over the training split.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// 1-based epoch number.
    pub epoch: usize,
    pub steps: usize,
    pub mean_loss: f64,
}

/// Trains a fresh model on `dataset` and returns it with one summary per epoch.
pub fn train<B, D>(
    config: &TrainingConfig,
    device: &B::Device,
    dataset: D,
) -> Result<(Cnn<B>, Vec<EpochSummary>), MnistError>
where
    B: AutodiffBackend,
    D: Dataset<MnistItem> + 'static,
{
    config.validate()?;
    if dataset.is_empty() {
        return Err(MnistError::EmptyDataset("training"));
    }

    B::seed(config.seed);

    let mut model = config.model.init::<B>(device);
    let mut optim = config.optimizer.init::<B, Cnn<B>>();

    let dataloader = mnist_loader::<B, _>(
        device.clone(),
        dataset,
        config.batch_size,
        config.seed,
        config.num_workers,
    );
    let total_steps = num_batches(dataloader.num_items(), config.batch_size);
    let mut summaries = Vec::with_capacity(config.num_epochs);

    log::info!(
        "Training on {} images for {} epochs ({} steps per epoch)",
        dataloader.num_items(),
        config.num_epochs,
        total_steps
    );

    for epoch in 1..=config.num_epochs {
        let mut loss_sum = 0.0;
        let mut steps = 0;

        for (iteration, batch) in dataloader.iter().enumerate() {
            let output = model.forward_classification(batch);
            let loss = output.loss.clone().into_scalar().elem::<f64>();

            // Gradients are consumed by the step, nothing carries over between batches.
            let grads = output.loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(config.learning_rate, model, grads);

            loss_sum += loss;
            steps += 1;

            let step = iteration + 1;
            if should_log(step, config.log_interval) {
                println!(
                    "{}",
                    progress_line(epoch, config.num_epochs, step, total_steps, loss)
                );
            }
        }

        let summary = EpochSummary {
            epoch,
            steps,
            mean_loss: loss_sum / steps as f64,
        };
        log::info!(
            "Epoch {}/{} done: {} steps, mean loss {:.4}",
            summary.epoch,
            config.num_epochs,
            summary.steps,
            summary.mean_loss
        );
        summaries.push(summary);
    }

    Ok((model, summaries))
}

/// Whether the 1-based training `step` prints a progress line.
pub fn should_log(step: usize, log_interval: usize) -> bool {
    step % log_interval == 0
}

/// Progress line printed during training, e.g.
/// `Epoch [1/10], Step[100/600], Loss: 0.1234`.
pub fn progress_line(
    epoch: usize,
    num_epochs: usize,
    step: usize,
    total_steps: usize,
    loss: f64,
) -> String {
    format!("Epoch [{epoch}/{num_epochs}], Step[{step}/{total_steps}], Loss: {loss:.4}")
}

/// Trains on the MNIST training split, then evaluates on the test split.
///
/// Both splits are downloaded and cached by burn on first use.
pub fn run<B: AutodiffBackend>(
    config: &TrainingConfig,
    device: B::Device,
) -> Result<EvaluationReport, MnistError> {
    log::info!("Using device {device:?}");

    let (model, _summaries) = train::<B, _>(config, &device, MnistDataset::train())?;

    // Inference backend: no autodiff graph is recorded.
    let model = model.valid();
    let report = evaluate::<B::InnerBackend, _>(&model, &device, MnistDataset::test(), config)?;

    println!("{report}");

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{tests::synthetic_items, MnistBatcher},
        model::CnnConfig,
        TestAutodiffBackend,
    };
    use burn::{
        data::{dataloader::batcher::Batcher, dataset::InMemDataset},
        optim::AdamConfig,
        tensor::backend::Backend,
    };

    fn small_config() -> TrainingConfig {
        TrainingConfig::new(CnnConfig::new().with_channels([4, 8]), AdamConfig::new())
            .with_batch_size(10)
            .with_num_epochs(2)
            .with_log_interval(2)
    }

    #[test]
    fn train_reports_one_summary_per_epoch() {
        let device = Default::default();
        let dataset = InMemDataset::new(synthetic_items(25));

        let (_model, summaries) =
            train::<TestAutodiffBackend, _>(&small_config(), &device, dataset).unwrap();

        assert_eq!(summaries.len(), 2);
        for (index, summary) in summaries.iter().enumerate() {
            assert_eq!(summary.epoch, index + 1);
            assert_eq!(summary.steps, 3);
            assert!(summary.mean_loss.is_finite());
            assert!(summary.mean_loss >= 0.0);
        }
    }

    #[test]
    fn progress_line_matches_reference_format() {
        assert_eq!(
            progress_line(1, 10, 100, 600, 0.123_456),
            "Epoch [1/10], Step[100/600], Loss: 0.1235"
        );
        assert_eq!(
            progress_line(10, 10, 600, 600, 2.0),
            "Epoch [10/10], Step[600/600], Loss: 2.0000"
        );
    }

    #[test]
    fn only_every_interval_step_is_logged() {
        let config = small_config();
        let total_steps = num_batches(25, config.batch_size);

        let logged = (1..=total_steps)
            .filter(|step| should_log(*step, config.log_interval))
            .collect::<Vec<_>>();

        assert_eq!(total_steps, 3);
        assert_eq!(logged, vec![2]);
    }

    #[test]
    fn reference_run_logs_six_steps_per_epoch() {
        let config = TrainingConfig::default();
        let total_steps = num_batches(60_000, config.batch_size);

        let logged = (1..=total_steps)
            .filter(|step| should_log(*step, config.log_interval))
            .collect::<Vec<_>>();

        assert_eq!(logged, vec![100, 200, 300, 400, 500, 600]);
    }

    #[test]
    fn epoch_summary_survives_json_round_trip() {
        let summary = EpochSummary {
            epoch: 3,
            steps: 600,
            mean_loss: 0.5,
        };

        let json = serde_json::to_string(&summary).unwrap();
        let decoded: EpochSummary = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, summary);
    }

    #[test]
    fn train_rejects_empty_dataset() {
        let device = Default::default();
        let dataset = InMemDataset::<MnistItem>::new(Vec::new());

        let result = train::<TestAutodiffBackend, _>(&small_config(), &device, dataset);

        assert!(matches!(result, Err(MnistError::EmptyDataset("training"))));
    }

    #[test]
    fn train_rejects_invalid_config() {
        let device = Default::default();
        let dataset = InMemDataset::new(synthetic_items(5));
        let config = small_config().with_batch_size(0);

        let result = train::<TestAutodiffBackend, _>(&config, &device, dataset);

        assert!(matches!(result, Err(MnistError::InvalidConfig(_))));
    }

    #[test]
    fn optimizer_steps_reduce_loss_on_a_fixed_batch() {
        let device = Default::default();
        let config = small_config();
        TestAutodiffBackend::seed(config.seed);

        let mut model = config.model.init::<TestAutodiffBackend>(&device);
        let mut optim = config
            .optimizer
            .init::<TestAutodiffBackend, Cnn<TestAutodiffBackend>>();
        let batch = MnistBatcher::<TestAutodiffBackend>::new(device).batch(synthetic_items(10));

        let mut losses = Vec::new();
        for _ in 0..20 {
            let output = model.forward_classification(batch.clone());
            losses.push(output.loss.clone().into_scalar().elem::<f64>());

            let grads = GradientsParams::from_grads(output.loss.backward(), &model);
            model = optim.step(config.learning_rate, model, grads);
        }

        let first = losses[0];
        let last = losses[losses.len() - 1];
        assert!(last < first, "loss went from {first} to {last}");
    }
}
