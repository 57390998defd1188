use super::{
    attribute::concat_attributes,
    conv_bn::{ConvBn, ConvBnInit},
    misc::Activation,
};
use crate::{common::*, error::FaderError};

pub const IMAGE_CHANNELS: i64 = 3;
pub const IMAGE_SIZE: i64 = 128;
pub const LATENT_CHANNELS: i64 = 512;
pub const LATENT_SIZE: i64 = 2;

const NUM_STAGES: usize = 7;
const ENCODER_CHANNELS: [usize; NUM_STAGES + 1] = [3, 16, 32, 64, 128, 256, 512, 512];
const DECODER_CHANNELS: [usize; NUM_STAGES + 1] = [512, 512, 256, 128, 64, 32, 16, 3];
const LEAKY_RELU_SLOPE: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct EncoderDecoderInit {
    pub num_attr: usize,
}

impl EncoderDecoderInit {
    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>) -> Result<EncoderDecoder> {
        let path = path.borrow();
        let Self { num_attr } = self;
        ensure!(num_attr > 0, "num_attr must be positive");

        // 128 -> 64 -> 32 -> 16 -> 8 -> 4 -> 2, then a 2x2 refinement
        let encoder = ENCODER_CHANNELS
            .iter()
            .tuple_windows()
            .enumerate()
            .fold(nn::seq_t(), |seq, (index, (&in_c, &out_c))| {
                let activation = Activation::leaky_relu(LEAKY_RELU_SLOPE);
                let init = if index + 1 < NUM_STAGES {
                    ConvBnInit::down_sample(activation)
                } else {
                    ConvBnInit::same(false, activation)
                };
                seq.add(init.build(path / format!("encoder_{}", index), in_c, out_c))
            });

        // 2 -> 4 -> 8 -> 16 -> 32 -> 64 -> 128, then the 128x128 output stage
        let decoder: Vec<_> = DECODER_CHANNELS
            .iter()
            .tuple_windows()
            .enumerate()
            .map(|(index, (&in_c, &out_c))| {
                let init = if index + 1 < NUM_STAGES {
                    ConvBnInit::up_sample(Activation::Relu)
                } else {
                    ConvBnInit {
                        batch_norm: false,
                        ..ConvBnInit::same(true, Activation::Relu)
                    }
                };
                init.build(path / format!("decoder_{}", index), in_c + num_attr, out_c)
            })
            .collect();

        Ok(EncoderDecoder {
            num_attr: num_attr as i64,
            encoder,
            decoder,
        })
    }
}

#[derive(Debug)]
pub struct EncoderDecoder {
    num_attr: i64,
    encoder: nn::SequentialT,
    decoder: Vec<ConvBn>,
}

impl EncoderDecoder {
    pub fn num_attr(&self) -> usize {
        self.num_attr as usize
    }

    /// Maps `[batch, 3, 128, 128]` images to `[batch, 512, 2, 2]` latent codes.
    pub fn encode_t(&self, image: &Tensor, train: bool) -> Result<Tensor> {
        check_image(image)?;
        Ok(self.encoder.forward_t(image, train))
    }

    /// Reconstructs `[batch, 3, 128, 128]` images conditioned on `[batch, num_attr]` attributes.
    pub fn decode_t(&self, latent: &Tensor, attrs: &Tensor, train: bool) -> Result<Tensor> {
        let batch_size = check_latent(latent)?;
        check_attributes(attrs, batch_size, self.num_attr)?;

        self.decoder
            .iter()
            .try_fold(latent.shallow_clone(), |xs, stage| -> Result<_> {
                let xs = concat_attributes(&xs, attrs)?;
                Ok(stage.forward_t(&xs, train))
            })
    }

    /// Returns the latent code together with the reconstruction.
    pub fn forward_t(&self, image: &Tensor, attrs: &Tensor, train: bool) -> Result<(Tensor, Tensor)> {
        let batch_size = check_image(image)?;
        check_attributes(attrs, batch_size, self.num_attr)?;

        let latent = self.encode_t(image, train)?;
        let recon = self.decode_t(&latent, attrs, train)?;
        Ok((latent, recon))
    }
}

/// Checks a `[batch, 3, 128, 128]` image batch and returns the batch size.
pub fn check_image(image: &Tensor) -> Result<i64> {
    let expected = || format!("[batch, {}, {}, {}]", IMAGE_CHANNELS, IMAGE_SIZE, IMAGE_SIZE);
    let (b, c, h, w) = image
        .size4()
        .map_err(|_| FaderError::shape_mismatch("image", expected(), image.size()))?;
    if b == 0 {
        return Err(FaderError::EmptyBatch.into());
    }
    if (c, h, w) != (IMAGE_CHANNELS, IMAGE_SIZE, IMAGE_SIZE) {
        return Err(FaderError::shape_mismatch("image", expected(), image.size()).into());
    }
    Ok(b)
}

pub fn check_latent(latent: &Tensor) -> Result<i64> {
    let expected = || format!("[batch, {}, {}, {}]", LATENT_CHANNELS, LATENT_SIZE, LATENT_SIZE);
    let (b, c, h, w) = latent
        .size4()
        .map_err(|_| FaderError::shape_mismatch("latent", expected(), latent.size()))?;
    if b == 0 {
        return Err(FaderError::EmptyBatch.into());
    }
    if (c, h, w) != (LATENT_CHANNELS, LATENT_SIZE, LATENT_SIZE) {
        return Err(FaderError::shape_mismatch("latent", expected(), latent.size()).into());
    }
    Ok(b)
}

pub fn check_attributes(attrs: &Tensor, batch_size: i64, num_attr: i64) -> Result<()> {
    if attrs.size() != [batch_size, num_attr] {
        return Err(FaderError::shape_mismatch(
            "attributes",
            format!("[{}, {}]", batch_size, num_attr),
            attrs.size(),
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_decoder_shape_test() -> Result<()> {
        let num_attr = 39;
        let vs = nn::VarStore::new(Device::Cpu);
        let model = EncoderDecoderInit { num_attr }.build(&vs.root())?;

        for &bs in &[1, 2, 3] {
            let image = Tensor::rand(&[bs, 3, 128, 128], FLOAT_CPU);
            let attrs = Tensor::rand(&[bs, num_attr as i64], FLOAT_CPU);
            let (latent, recon) = model.forward_t(&image, &attrs, true)?;

            ensure!(latent.size() == vec![bs, 512, 2, 2], "incorrect latent shape");
            ensure!(recon.size() == vec![bs, 3, 128, 128], "incorrect reconstruction shape");
            ensure!(f64::from(recon.min()) >= 0.0, "reconstruction must be rectified");
        }

        Ok(())
    }

    #[test]
    fn minimal_dims_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let model = EncoderDecoderInit { num_attr: 1 }.build(&vs.root())?;

        let image = Tensor::rand(&[1, 3, 128, 128], FLOAT_CPU);
        let attrs = Tensor::ones(&[1, 1], FLOAT_CPU);
        let (latent, recon) = model.forward_t(&image, &attrs, true)?;
        ensure!(latent.size() == vec![1, 512, 2, 2]);
        ensure!(recon.size() == vec![1, 3, 128, 128]);

        Ok(())
    }

    #[test]
    fn shape_mismatch_test() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let model = EncoderDecoderInit { num_attr: 4 }.build(&vs.root())?;

        let is_shape_mismatch = |err: Error| {
            matches!(
                err.downcast_ref::<FaderError>(),
                Some(FaderError::ShapeMismatch { .. })
            )
        };

        // wrong attribute length
        let image = Tensor::rand(&[2, 3, 128, 128], FLOAT_CPU);
        let attrs = Tensor::rand(&[2, 5], FLOAT_CPU);
        ensure!(is_shape_mismatch(model.forward_t(&image, &attrs, false).unwrap_err()));

        // wrong channels
        let image = Tensor::rand(&[2, 1, 128, 128], FLOAT_CPU);
        let attrs = Tensor::rand(&[2, 4], FLOAT_CPU);
        ensure!(is_shape_mismatch(model.forward_t(&image, &attrs, false).unwrap_err()));

        // wrong resolution
        let image = Tensor::rand(&[2, 3, 64, 64], FLOAT_CPU);
        ensure!(is_shape_mismatch(model.forward_t(&image, &attrs, false).unwrap_err()));

        // empty batch
        let image = Tensor::rand(&[0, 3, 128, 128], FLOAT_CPU);
        let attrs = Tensor::rand(&[0, 4], FLOAT_CPU);
        let err = model.forward_t(&image, &attrs, false).unwrap_err();
        ensure!(err.downcast_ref::<FaderError>() == Some(&FaderError::EmptyBatch));

        Ok(())
    }
}
