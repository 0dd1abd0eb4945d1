use anyhow::Result;

use crate::preprocess::{INPUT_SIZE, ImageTensor};

/// A loaded model mapping one normalized image to a probability per class.
///
/// Implementations are created once at startup and shared read-only between
/// requests, so `predict` takes `&self` and must be safe to call concurrently.
pub trait Classifier: Send + Sync {
    fn model_id(&self) -> &str;

    fn num_classes(&self) -> usize;

    /// Side of the square input the weights were trained on.
    fn input_size(&self) -> u32 {
        INPUT_SIZE
    }

    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>>;
}
