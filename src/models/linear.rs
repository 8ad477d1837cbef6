/// Linear layer that owns its variables and can reinitialize them in place
use candle_core::{DType, Device, Result, Tensor, Var};
use candle_nn::{init, Init};

/// Fully connected layer `y = x W^T + b`
///
/// Weights use Kaiming normal init, bias uniform in `±1/sqrt(in_features)`
/// (same as candle-nn's `Linear`).
pub struct ResettableLinear {
    weight: Var,
    bias: Var,
    in_features: usize,
    out_features: usize,
}

impl ResettableLinear {
    /// Create new layer with freshly initialized parameters
    pub fn new(in_features: usize, out_features: usize, dtype: DType, device: &Device) -> Result<Self> {
        let weight = init::DEFAULT_KAIMING_NORMAL.var((out_features, in_features), dtype, device)?;
        let bias = Self::bias_init(in_features).var(out_features, dtype, device)?;

        Ok(Self {
            weight,
            bias,
            in_features,
            out_features,
        })
    }

    fn bias_init(in_features: usize) -> Init {
        let bound = 1. / (in_features as f64).sqrt();
        Init::Uniform {
            lo: -bound,
            up: bound,
        }
    }

    /// Draw new weight and bias values, keeping the same variables
    pub fn reset(&self) -> Result<()> {
        let dtype = self.weight.dtype();
        let device = self.weight.device().clone();

        let weight = init::DEFAULT_KAIMING_NORMAL.var((self.out_features, self.in_features), dtype, &device)?;
        self.weight.set(weight.as_tensor())?;

        let bias = Self::bias_init(self.in_features).var(self.out_features, dtype, &device)?;
        self.bias.set(bias.as_tensor())
    }

    /// Forward pass: input [batch, in_features] -> [batch, out_features]
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let weight_t = self.weight.t()?;
        input.broadcast_matmul(&weight_t)?.broadcast_add(self.bias.as_tensor())
    }

    /// Trainable variables (weight, bias)
    pub fn vars(&self) -> Vec<Var> {
        vec![self.weight.clone(), self.bias.clone()]
    }
}
