use anyhow::{Result, bail};
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{D, DType, Device, Module};
use candle_nn::ops::softmax;
use candle_nn::{Func, VarBuilder};
use candle_transformers::models::resnet;
use hf_hub::{Repo, RepoType, api::tokio::Api};
use std::path::PathBuf;

use crate::classifier::Classifier;
use crate::config::Architecture;
use crate::preprocess::ImageTensor;

pub struct ResnetClassifier {
    model: Func<'static>,
    device: Device,
    model_id: String,
    num_classes: usize,
}

#[derive(Debug, Clone)]
pub struct ResnetConfig {
    pub model_id: Option<String>,
    pub model_path: Option<PathBuf>,
    pub revision: String,
    pub model_name: String,
    pub architecture: Architecture,
    pub num_classes: usize,
    pub use_pth: bool,
    pub cpu: bool,
}

impl ResnetClassifier {
    fn device(cpu: bool) -> Result<Device> {
        if cpu {
            Ok(Device::Cpu)
        } else if metal_is_available() {
            tracing::info!("Using metal acceleration");
            Ok(Device::new_metal(0)?)
        } else if cuda_is_available() {
            tracing::info!("Using CUDA GPU acceleration");
            Ok(Device::new_cuda(0)?)
        } else {
            tracing::info!(
                "CUDA not available, running on CPU. To run on GPU, build with `--features cuda`"
            );
            Ok(Device::Cpu)
        }
    }

    fn weights_name(use_pth: bool) -> &'static str {
        if use_pth {
            "pytorch_model.bin"
        } else {
            "model.safetensors"
        }
    }

    #[tracing::instrument(skip(config), fields(model_id = ?config.model_id, arch = ?config.architecture, cpu = config.cpu))]
    pub async fn new(config: ResnetConfig) -> Result<Self> {
        if config.num_classes == 0 {
            bail!("A classifier needs at least one class");
        }
        let device = Self::device(config.cpu)?;

        // Weights come from the Hugging Face API or from a local directory
        let weights_filename = match (&config.model_path, &config.model_id) {
            (Some(base_path), _) => {
                if !base_path.is_dir() {
                    bail!("Model path {} is not a directory.", base_path.display());
                }
                base_path.join(Self::weights_name(config.use_pth))
            }
            (None, Some(model_id)) => {
                let repo =
                    Repo::with_revision(model_id.clone(), RepoType::Model, config.revision.clone());
                let api = Api::new()?.repo(repo);
                api.get(Self::weights_name(config.use_pth)).await?
            }
            (None, None) => bail!("Either model_id or model_path must be specified"),
        };
        tracing::debug!(weights = %weights_filename.display(), "Resolved weights");

        let vb = if config.use_pth {
            VarBuilder::from_pth(&weights_filename, DType::F32, &device)?
        } else {
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], DType::F32, &device)? }
        };

        Self::build(
            config.architecture,
            config.num_classes,
            vb,
            device,
            config.model_name,
        )
    }

    fn build(
        architecture: Architecture,
        num_classes: usize,
        vb: VarBuilder<'static>,
        device: Device,
        model_id: String,
    ) -> Result<Self> {
        let model = match architecture {
            Architecture::Resnet18 => resnet::resnet18(num_classes, vb)?,
            Architecture::Resnet34 => resnet::resnet34(num_classes, vb)?,
            Architecture::Resnet50 => resnet::resnet50(num_classes, vb)?,
            Architecture::Resnet101 => resnet::resnet101(num_classes, vb)?,
            Architecture::Resnet152 => resnet::resnet152(num_classes, vb)?,
        };

        Ok(Self {
            model,
            device,
            model_id,
            num_classes,
        })
    }
}

impl Classifier for ResnetClassifier {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    #[tracing::instrument(skip(self, input), fields(side = input.side()))]
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        // NHWC in, the convolutions want NCHW
        let pixels = input
            .to_tensor(&self.device)?
            .permute((0, 3, 1, 2))?
            .contiguous()?;

        let logits = self.model.forward(&pixels)?;
        let scores = softmax(&logits, D::Minus1)?.squeeze(0)?.to_vec1::<f32>()?;

        if scores.len() != self.num_classes {
            bail!(
                "Model produced {} scores, expected {}",
                scores.len(),
                self.num_classes
            );
        }
        Ok(scores)
    }
}
