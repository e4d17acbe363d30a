use core::fmt;

use burn::{
    data::dataset::{vision::MnistItem, Dataset},
    prelude::*,
    tensor::ElementConversion,
};
use serde::{Deserialize, Serialize};

use crate::{config::TrainingConfig, data::mnist_loader, model::Cnn, MnistError};

/// Classification results over a whole dataset split.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub correct: usize,
    pub total: usize,
    /// Cross-entropy averaged over every image.
    pub mean_loss: f64,
}

impl EvaluationReport {
    /// Fraction of correctly classified images, in `[0, 1]`.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }

        self.correct as f64 / self.total as f64
    }
}

impl fmt::Display for EvaluationReport {
    /// The final line printed after evaluation, e.g.
    /// `Model accuracy on 10000 test images: 0.99`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Model accuracy on {} test images: {:.2}",
            self.total,
            self.accuracy()
        )
    }
}

/// Runs the model over `dataset` and accumulates the number of correct
/// predictions over every batch.
///
/// Pass a model on a non-autodiff backend (see `AutodiffModule::valid`) so no
/// gradient graph is built.
pub fn evaluate<B, D>(
    model: &Cnn<B>,
    device: &B::Device,
    dataset: D,
    config: &TrainingConfig,
) -> Result<EvaluationReport, MnistError>
where
    B: Backend,
    D: Dataset<MnistItem> + 'static,
{
    if dataset.is_empty() {
        return Err(MnistError::EmptyDataset("test"));
    }

    let dataloader = mnist_loader::<B, _>(
        device.clone(),
        dataset,
        config.batch_size,
        config.seed,
        config.num_workers,
    );

    let mut correct = 0;
    let mut total = 0;
    let mut loss_sum = 0.0;

    for batch in dataloader.iter() {
        let batch_size = batch.targets.dims()[0];
        let output = model.forward_classification(batch);

        loss_sum += output.loss.into_scalar().elem::<f64>() * batch_size as f64;
        correct += count_correct(output.output, output.targets);
        total += batch_size;
    }

    let report = EvaluationReport {
        correct,
        total,
        mean_loss: loss_sum / total as f64,
    };
    log::info!(
        "Evaluated {} images: {} correct, mean loss {:.4}",
        report.total,
        report.correct,
        report.mean_loss
    );

    Ok(report)
}

/// Counts the rows whose highest score is at the target class.
///
/// # Shapes
///   - Output `[batch_size, num_classes]`
///   - Targets `[batch_size]`
pub fn count_correct<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predictions = output.argmax(1).squeeze::<1>(1);
    let num_corrects = predictions.equal(targets).int().sum().into_scalar();

    num_corrects.elem::<i64>() as usize
}
