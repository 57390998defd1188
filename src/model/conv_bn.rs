use super::misc::Activation;
use crate::common::*;

/// A (transposed) convolution followed by optional batch norm and an activation.
#[derive(Debug, Clone)]
pub struct ConvBnInit {
    pub ksize: usize,
    pub stride: usize,
    pub padding: usize,
    pub transposed: bool,
    pub batch_norm: bool,
    pub activation: Activation,
}

impl ConvBnInit {
    /// Halves the spatial resolution.
    pub fn down_sample(activation: Activation) -> Self {
        Self {
            ksize: 4,
            stride: 2,
            padding: 1,
            transposed: false,
            batch_norm: true,
            activation,
        }
    }

    /// Doubles the spatial resolution.
    pub fn up_sample(activation: Activation) -> Self {
        Self {
            transposed: true,
            ..Self::down_sample(activation)
        }
    }

    /// Keeps the spatial resolution.
    pub fn same(transposed: bool, activation: Activation) -> Self {
        Self {
            ksize: 3,
            stride: 1,
            padding: 1,
            transposed,
            batch_norm: true,
            activation,
        }
    }

    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>, in_c: usize, out_c: usize) -> ConvBn {
        let path = path.borrow();
        let Self {
            ksize,
            stride,
            padding,
            transposed,
            batch_norm,
            activation,
        } = self;
        let in_c = in_c as i64;
        let out_c = out_c as i64;
        let ksize = ksize as i64;

        let seq = if transposed {
            nn::seq_t().add(nn::conv_transpose2d(
                path / "conv_transpose",
                in_c,
                out_c,
                ksize,
                nn::ConvTransposeConfig {
                    stride: stride as i64,
                    padding: padding as i64,
                    ..Default::default()
                },
            ))
        } else {
            nn::seq_t().add(nn::conv2d(
                path / "conv",
                in_c,
                out_c,
                ksize,
                nn::ConvConfig {
                    stride: stride as i64,
                    padding: padding as i64,
                    ..Default::default()
                },
            ))
        };

        let seq = if batch_norm {
            seq.add(nn::batch_norm2d(path / "bn", out_c, Default::default()))
        } else {
            seq
        };
        let seq = seq.add(activation);

        ConvBn { seq }
    }
}

#[derive(Debug)]
pub struct ConvBn {
    seq: nn::SequentialT,
}

impl nn::ModuleT for ConvBn {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        self.seq.forward_t(xs, train)
    }
}
