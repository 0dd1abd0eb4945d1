use anyhow::{Result, ensure};
use std::sync::Arc;

use crate::catalog::LabelCatalog;
use crate::classifier::Classifier;
use crate::preprocess::{InvalidImage, decode_and_normalize};
use crate::resolver::resolve;
use crate::types::PredictionResult;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidImage(#[from] InvalidImage),
    #[error("Inference failed: {0:#}")]
    Inference(anyhow::Error),
}

/// Decode, classify and name one uploaded image.
///
/// Holds the process-wide classifier and catalog; both are read-only once
/// built, so clones of the pipeline can run on any thread.
#[derive(Clone)]
pub struct Pipeline {
    classifier: Arc<dyn Classifier>,
    catalog: Arc<LabelCatalog>,
    image_size: u32,
}

impl Pipeline {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        catalog: Arc<LabelCatalog>,
        image_size: u32,
    ) -> Result<Self> {
        ensure!(
            image_size == classifier.input_size(),
            "Image size {} does not match the {}x{} input model {} was trained on",
            image_size,
            classifier.input_size(),
            classifier.input_size(),
            classifier.model_id()
        );
        ensure!(!catalog.is_empty(), "Label catalog is empty");
        ensure!(
            catalog.len() == classifier.num_classes(),
            "Catalog has {} labels but model {} outputs {} classes",
            catalog.len(),
            classifier.model_id(),
            classifier.num_classes()
        );
        ensure!(
            catalog.is_contiguous(),
            "Catalog ids must be contiguous starting at {}",
            catalog.base().offset()
        );

        Ok(Self {
            classifier,
            catalog,
            image_size,
        })
    }

    pub fn model_id(&self) -> &str {
        self.classifier.model_id()
    }

    /// Blocking; call from a thread that may block.
    pub fn run(&self, raw: &[u8]) -> Result<PredictionResult, PipelineError> {
        let input = decode_and_normalize(raw, self.image_size)?;
        tracing::debug!(shape = ?input.shape(), mean = input.mean(), "Image normalized");

        let probabilities = self
            .classifier
            .predict(&input)
            .map_err(PipelineError::Inference)?;

        let result = resolve(&probabilities, &self.catalog);
        tracing::debug!(
            class_id = result.class_id,
            class_name = %result.class_name,
            probability = result.probability,
            "Prediction resolved"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IdBase;
    use crate::classifier::testing::{FailingClassifier, FixedClassifier};
    use crate::preprocess::tests::solid_png;

    fn flowers() -> Arc<LabelCatalog> {
        Arc::new(LabelCatalog::oxford_flowers(IdBase::Zero).with_vietnamese_names())
    }

    #[test]
    fn classifies_a_valid_image() {
        let pipeline =
            Pipeline::new(Arc::new(FixedClassifier::peaked(53, 102)), flowers(), 224).unwrap();
        let result = pipeline.run(&solid_png(300, 200, [250, 200, 0])).unwrap();
        assert_eq!(result.class_id, 53);
        assert_eq!(result.class_name, "sunflower");
        assert_eq!(result.display_name, "Hoa Hướng Dương");
        assert_eq!(result.probability, 0.87);
        assert_eq!(pipeline.model_id(), "fixed-test-model");
    }

    #[test]
    fn undecodable_bytes_are_invalid_images() {
        let pipeline =
            Pipeline::new(Arc::new(FixedClassifier::peaked(0, 102)), flowers(), 224).unwrap();
        let err = pipeline.run(b"hello world").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage(_)));
        let err = pipeline.run(&[]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage(InvalidImage::Empty)));
    }

    #[test]
    fn classifier_failures_keep_their_message() {
        let pipeline = Pipeline::new(Arc::new(FailingClassifier), flowers(), 224).unwrap();
        let err = pipeline.run(&solid_png(10, 10, [0, 0, 0])).unwrap_err();
        assert!(matches!(err, PipelineError::Inference(_)));
        assert_eq!(err.to_string(), "Inference failed: model weights are not loaded");
    }

    #[test]
    fn catalog_must_match_model_width() {
        let short = Arc::new(LabelCatalog::from_ordered(["rose", "lotus"], IdBase::Zero));
        let err = Pipeline::new(Arc::new(FixedClassifier::peaked(0, 102)), short, 224)
            .err()
            .unwrap();
        assert!(err.to_string().contains("2 labels"));

        let gappy = Arc::new(LabelCatalog::new(
            [(0, "rose".to_string()), (5, "lotus".to_string())].into(),
            IdBase::Zero,
        ));
        assert!(Pipeline::new(Arc::new(FixedClassifier::peaked(0, 2)), gappy, 224).is_err());
    }

    #[test]
    fn image_size_must_match_model_input() {
        let err = Pipeline::new(Arc::new(FixedClassifier::peaked(0, 102)), flowers(), 256)
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "Image size 256 does not match the 224x224 input model fixed-test-model was trained on"
        );
        assert!(Pipeline::new(Arc::new(FixedClassifier::peaked(0, 102)), flowers(), 0).is_err());
    }
}
