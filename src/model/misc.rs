use crate::common::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    Relu,
    LeakyRelu { negative_slope: f64 },
}

impl Activation {
    pub fn leaky_relu(negative_slope: f64) -> Self {
        Self::LeakyRelu { negative_slope }
    }
}

impl nn::Module for Activation {
    fn forward(&self, xs: &Tensor) -> Tensor {
        match *self {
            Self::Relu => xs.relu(),
            Self::LeakyRelu { negative_slope } => xs.relu() - (-xs).relu() * negative_slope,
        }
    }
}

/// The output activation of the discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeActivation {
    /// Independent probability per attribute.
    Sigmoid,
    /// A single distribution over all attributes. Each row sums to one.
    Softmax,
}

impl Default for AttributeActivation {
    fn default() -> Self {
        Self::Sigmoid
    }
}
