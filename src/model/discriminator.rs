use super::{
    encoder_decoder::{check_latent, LATENT_CHANNELS},
    misc::AttributeActivation,
};
use crate::common::*;

#[derive(Debug, Clone)]
pub struct DiscriminatorInit {
    pub num_attr: usize,
    pub activation: AttributeActivation,
    pub dropout: f64,
}

impl DiscriminatorInit {
    pub fn new(num_attr: usize) -> Self {
        Self {
            num_attr,
            activation: Default::default(),
            dropout: 0.3,
        }
    }

    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>) -> Result<Discriminator> {
        let path = path.borrow();
        let Self {
            num_attr,
            activation,
            dropout,
        } = self;
        ensure!(num_attr > 0, "num_attr must be positive");
        ensure!(
            (0.0..1.0).contains(&dropout),
            "dropout must lie in [0, 1), but get {}",
            dropout
        );

        let conv = nn::conv2d(
            path / "conv",
            LATENT_CHANNELS,
            LATENT_CHANNELS,
            2,
            nn::ConvConfig {
                stride: 2,
                padding: 0,
                ..Default::default()
            },
        );
        let fc1 = nn::linear(
            path / "fc1",
            LATENT_CHANNELS,
            LATENT_CHANNELS,
            Default::default(),
        );
        let fc2 = nn::linear(
            path / "fc2",
            LATENT_CHANNELS,
            num_attr as i64,
            Default::default(),
        );

        Ok(Discriminator {
            conv,
            fc1,
            fc2,
            activation,
            dropout,
        })
    }
}

/// Predicts `[batch, num_attr]` attributes from `[batch, 512, 2, 2]` latent codes.
#[derive(Debug)]
pub struct Discriminator {
    conv: nn::Conv2D,
    fc1: nn::Linear,
    fc2: nn::Linear,
    activation: AttributeActivation,
    dropout: f64,
}

impl Discriminator {
    pub fn activation(&self) -> AttributeActivation {
        self.activation
    }

    pub fn forward_t(&self, latent: &Tensor, train: bool) -> Result<Tensor> {
        let Self {
            ref conv,
            ref fc1,
            ref fc2,
            activation,
            dropout,
        } = *self;
        check_latent(latent)?;

        let xs = latent
            .apply(conv)
            .relu()
            .view([-1, LATENT_CHANNELS])
            .apply(fc1)
            .relu()
            .dropout(dropout, train);
        let logits = xs.apply(fc2);

        let output = match activation {
            AttributeActivation::Softmax => logits
                .relu()
                .dropout(dropout, train)
                .softmax(-1, Kind::Float),
            AttributeActivation::Sigmoid => logits.sigmoid(),
        };

        Ok(output)
    }
}
