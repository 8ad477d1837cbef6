/// Model capability and the MLP classifier used by the runner
use candle_core::{DType, Device, Tensor, Var};

use crate::{ALError, Result};

pub mod linear;

pub use linear::ResettableLinear;

/// What the active learning loop needs from a classifier
///
/// `forward` and `reset` are mandatory. Loss prediction and embeddings are
/// optional capabilities used by the learning-loss and core-set strategies;
/// the defaults report `UnsupportedModel`.
pub trait Model {
    /// Raw class scores: input [batch, features] -> [batch, num_classes]
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// Reinitialize every trainable parameter
    fn reset(&mut self) -> Result<()>;

    /// Variables to optimize
    fn trainable_vars(&self) -> Vec<Var>;

    /// Number of output classes
    fn num_classes(&self) -> usize;

    fn supports_loss_prediction(&self) -> bool {
        false
    }

    /// Predicted per-example loss: [batch, features] -> [batch]
    fn predict_loss(&self, _input: &Tensor) -> Result<Tensor> {
        Err(ALError::UnsupportedModel("loss prediction"))
    }

    fn supports_embedding(&self) -> bool {
        false
    }

    /// Feature embedding: [batch, features] -> [batch, embed_dim]
    fn embed(&self, _input: &Tensor) -> Result<Tensor> {
        Err(ALError::UnsupportedModel("embedding"))
    }
}

/// MLP shape
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MlpConfig {
    /// Input feature width
    pub input_dim: usize,
    /// Hidden layer widths
    pub hidden_sizes: Vec<usize>,
    /// Number of output classes
    pub num_classes: usize,
    /// Hidden width of the loss-prediction head (None = no head)
    pub loss_head_size: Option<usize>,
}

impl MlpConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 || self.num_classes == 0 {
            return Err(ALError::Config(
                "input_dim and num_classes must be > 0".to_string(),
            ));
        }
        if self.hidden_sizes.iter().any(|&h| h == 0) || self.loss_head_size == Some(0) {
            return Err(ALError::Config(
                "layer sizes must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Width of the representation fed to the output head
    pub fn embed_dim(&self) -> usize {
        self.hidden_sizes.last().copied().unwrap_or(self.input_dim)
    }
}

/// Loss-prediction head: embed -> hidden (ReLU) -> scalar
struct LossHead {
    hidden: ResettableLinear,
    out: ResettableLinear,
}

/// Feed-forward classifier with ReLU hidden layers
///
/// The last hidden activation doubles as the embedding for core-set
/// selection; an optional loss head supports learning-loss selection.
pub struct MlpClassifier {
    config: MlpConfig,
    hidden: Vec<ResettableLinear>,
    head: ResettableLinear,
    loss_head: Option<LossHead>,
}

impl MlpClassifier {
    /// Create new classifier with random parameters
    pub fn new(config: MlpConfig, device: &Device) -> Result<Self> {
        config.validate()?;
        let dtype = DType::F32;

        let mut hidden = Vec::with_capacity(config.hidden_sizes.len());
        let mut width = config.input_dim;
        for &size in &config.hidden_sizes {
            hidden.push(ResettableLinear::new(width, size, dtype, device)?);
            width = size;
        }

        let head = ResettableLinear::new(width, config.num_classes, dtype, device)?;

        let loss_head = match config.loss_head_size {
            Some(size) => Some(LossHead {
                hidden: ResettableLinear::new(width, size, dtype, device)?,
                out: ResettableLinear::new(size, 1, dtype, device)?,
            }),
            None => None,
        };

        Ok(Self {
            config,
            hidden,
            head,
            loss_head,
        })
    }

    pub fn config(&self) -> &MlpConfig {
        &self.config
    }

    fn features(&self, input: &Tensor) -> Result<Tensor> {
        let mut xs = input.clone();
        for layer in &self.hidden {
            xs = layer.forward(&xs)?.relu()?;
        }
        Ok(xs)
    }

    fn layers(&self) -> impl Iterator<Item = &ResettableLinear> {
        self.hidden
            .iter()
            .chain(std::iter::once(&self.head))
            .chain(self.loss_head.iter().flat_map(|h| [&h.hidden, &h.out]))
    }
}

impl Model for MlpClassifier {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let features = self.features(input)?;
        Ok(self.head.forward(&features)?)
    }

    fn reset(&mut self) -> Result<()> {
        for layer in self.layers() {
            layer.reset()?;
        }
        Ok(())
    }

    fn trainable_vars(&self) -> Vec<Var> {
        self.layers().flat_map(ResettableLinear::vars).collect()
    }

    fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    fn supports_loss_prediction(&self) -> bool {
        self.loss_head.is_some()
    }

    fn predict_loss(&self, input: &Tensor) -> Result<Tensor> {
        let head = self
            .loss_head
            .as_ref()
            .ok_or(ALError::UnsupportedModel("loss prediction"))?;

        let features = self.features(input)?;
        let hidden = head.hidden.forward(&features)?.relu()?;
        Ok(head.out.forward(&hidden)?.squeeze(1)?)
    }

    fn supports_embedding(&self) -> bool {
        true
    }

    fn embed(&self, input: &Tensor) -> Result<Tensor> {
        self.features(input)
    }
}
