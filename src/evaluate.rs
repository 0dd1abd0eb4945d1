use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::path::Path;

use crate::pipeline::{Pipeline, PipelineError};

#[derive(Debug, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub total: usize,
    pub correct: usize,
    pub skipped: usize,
    pub accuracy: f64,
}

/// Scores the pipeline over `dir/<class_id>/<image>` and reports top-1 accuracy.
///
/// Subdirectory names are class ids in the catalog's numbering. Files that do
/// not decode are counted as skipped; a classifier failure aborts the run.
#[tracing::instrument(skip(pipeline))]
pub fn evaluate_dir(pipeline: &Pipeline, dir: &Path) -> Result<EvaluationReport> {
    let mut report = EvaluationReport::default();

    let mut classes: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read evaluation directory {}", dir.display()))?
        .collect::<std::io::Result<_>>()?;
    classes.sort_by_key(|entry| entry.file_name());

    for class_dir in classes {
        if !class_dir.file_type()?.is_dir() {
            continue;
        }
        let name = class_dir.file_name();
        let Some(expected) = name.to_str().and_then(|n| n.parse::<u32>().ok()) else {
            tracing::warn!(dir = ?name, "Skipping directory without a numeric class id");
            continue;
        };

        for entry in std::fs::read_dir(class_dir.path())? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let raw = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;

            match pipeline.run(&raw) {
                Ok(result) => {
                    report.total += 1;
                    if result.class_id == expected {
                        report.correct += 1;
                    }
                }
                Err(PipelineError::InvalidImage(err)) => {
                    tracing::warn!(path = %path.display(), error = %err, "Skipping unreadable image");
                    report.skipped += 1;
                }
                Err(err @ PipelineError::Inference(_)) => {
                    return Err(err).with_context(|| format!("Failed on {}", path.display()));
                }
            }
        }
    }

    if report.total == 0 {
        bail!("No images found under {}", dir.display());
    }
    report.accuracy = report.correct as f64 / report.total as f64;
    tracing::info!(
        total = report.total,
        correct = report.correct,
        skipped = report.skipped,
        "Evaluation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{IdBase, LabelCatalog};
    use crate::classifier::testing::{FailingClassifier, FixedClassifier};
    use crate::preprocess::tests::solid_png;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("flora-eval-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn add_image(dir: &Path, class: &str, file: &str, bytes: &[u8]) {
        let class_dir = dir.join(class);
        std::fs::create_dir_all(&class_dir).unwrap();
        std::fs::write(class_dir.join(file), bytes).unwrap();
    }

    fn pipeline(classifier: Arc<dyn crate::classifier::Classifier>) -> Pipeline {
        let catalog = Arc::new(LabelCatalog::oxford_flowers(IdBase::Zero));
        Pipeline::new(classifier, catalog, 224).unwrap()
    }

    #[test]
    fn counts_hits_and_skips_unreadable_files() {
        let dir = scratch_dir();
        let png = solid_png(40, 40, [200, 10, 10]);
        add_image(&dir, "73", "a.png", &png);
        add_image(&dir, "73", "b.png", &png);
        add_image(&dir, "5", "c.png", &png);
        add_image(&dir, "5", "notes.jpg", b"plain text");
        add_image(&dir, "misc", "d.png", &png);
        std::fs::write(dir.join("README"), "ignored").unwrap();

        let pipeline = pipeline(Arc::new(FixedClassifier::peaked(73, 102)));
        let report = evaluate_dir(&pipeline, &dir).unwrap();
        assert_eq!(
            report,
            EvaluationReport {
                total: 3,
                correct: 2,
                skipped: 1,
                accuracy: 2.0 / 3.0,
            }
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_or_failing_runs_are_errors() {
        let dir = scratch_dir();
        let pipeline_ok = pipeline(Arc::new(FixedClassifier::peaked(0, 102)));
        assert!(evaluate_dir(&pipeline_ok, &dir).is_err());

        add_image(&dir, "0", "a.png", &solid_png(10, 10, [0, 0, 0]));
        let failing = pipeline(Arc::new(FailingClassifier));
        let err = evaluate_dir(&failing, &dir).unwrap_err();
        assert!(format!("{err:#}").contains("model weights are not loaded"));

        assert!(evaluate_dir(&pipeline_ok, &dir.join("missing")).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
