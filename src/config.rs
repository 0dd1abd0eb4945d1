use clap::{Parser, ValueEnum};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::catalog::IdBase;
use crate::preprocess::INPUT_SIZE;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Server host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port to bind to
    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Model ID from Hugging Face Hub
    #[arg(long, env = "MODEL_ID")]
    pub model_id: Option<String>,

    /// Local path to model directory
    #[arg(long, env = "MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Model revision/branch on Hugging Face
    #[arg(long, env = "MODEL_REVISION", default_value = "main")]
    pub model_revision: String,

    /// Name reported by the health endpoint. Defaults to the model id or directory name
    #[arg(long, env = "MODEL_NAME")]
    pub model_name: Option<String>,

    /// Backbone the weights were trained with
    #[arg(long, env = "ARCHITECTURE", value_enum, default_value = "resnet50")]
    pub architecture: Architecture,

    /// Width of the classifier output
    #[arg(long, env = "NUM_CLASSES", default_value = "102")]
    pub num_classes: usize,

    /// Use PyTorch weights instead of safetensors
    #[arg(long, env = "USE_PTH")]
    pub use_pth: bool,

    /// Run on CPU instead of GPU
    #[arg(long, env = "CPU_ONLY")]
    pub cpu_only: bool,

    /// Side of the square input. Must equal the classifier's trained input size
    /// (224 for the bundled ResNet binding); a mismatch aborts startup
    #[arg(long, env = "IMAGE_SIZE", default_value_t = INPUT_SIZE)]
    pub image_size: u32,

    /// Maximum accepted upload size in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value = "10485760")]
    pub max_upload_bytes: usize,

    /// Label file: JSON object `{"1": "pink primrose"}` or one name per line
    #[arg(long, env = "LABELS")]
    pub labels: Option<PathBuf>,

    /// Labels mapping in format "0=pink primrose,1=hard-leaved pocket orchid"
    #[arg(long, env = "ID2LABEL")]
    pub id2label: Option<String>,

    /// Whether class ids start at 0 or 1
    #[arg(long, env = "ID_BASE", value_enum, default_value = "zero")]
    pub id_base: IdBase,

    /// Translation table with one `fragment=Display Name` per line
    #[arg(long, env = "TRANSLATIONS")]
    pub translations: Option<PathBuf>,

    /// Report the canonical species name as the display name
    #[arg(long, env = "NO_TRANSLATE")]
    pub no_translate: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,

    /// Classify a single local image, print the result and exit
    #[arg(long)]
    pub predict: Option<PathBuf>,

    /// Score a directory of `<class_id>/<image>` samples, print accuracy and exit
    #[arg(long, conflicts_with = "predict")]
    pub evaluate: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Architecture {
    Resnet18,
    Resnet34,
    Resnet50,
    Resnet101,
    Resnet152,
}

impl Config {
    pub fn parse_id2label(&self) -> Option<BTreeMap<u32, String>> {
        self.id2label.as_deref().map(parse_id2label)
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn model_name(&self) -> String {
        if let Some(name) = &self.model_name {
            return name.clone();
        }
        if let Some(id) = &self.model_id {
            return id.clone();
        }
        self.model_path
            .as_ref()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

fn parse_id2label(labels: &str) -> BTreeMap<u32, String> {
    labels
        .split(',')
        .filter_map(|pair| {
            let (id, label) = pair.split_once('=')?;
            let id = id.trim().parse().ok()?;
            Some((id, label.trim().to_string()))
        })
        .collect()
}
