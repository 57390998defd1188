use crate::{
    common::*,
    config::Config,
    dataset::{Batch, DataSource},
    model::{
        bce_loss, check_attributes, check_latent, mse_loss, AttributeActivation, Discriminator,
        DiscriminatorInit, EncoderDecoder, EncoderDecoderInit,
    },
    FILE_STRFTIME,
};

#[derive(Debug, Clone)]
pub struct FaderTrainerInit {
    pub num_attr: usize,
    pub attribute_activation: AttributeActivation,
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub adversarial_weight: f64,
    pub adversarial_backprop: bool,
    pub device: Device,
}

impl FaderTrainerInit {
    pub fn new(num_attr: usize, device: Device) -> Self {
        Self {
            num_attr,
            attribute_activation: Default::default(),
            learning_rate: 1e-3,
            beta1: 0.5,
            beta2: 0.999,
            adversarial_weight: 1.0,
            adversarial_backprop: false,
            device,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let Config { model, train, .. } = config;

        Self {
            num_attr: model.num_attr.get(),
            attribute_activation: model.attribute_activation,
            learning_rate: train.learning_rate.raw(),
            beta1: train.beta1.raw(),
            beta2: train.beta2.raw(),
            adversarial_weight: train.adversarial_weight.raw(),
            adversarial_backprop: train.adversarial_backprop,
            device: train.device,
        }
    }

    pub fn build(self) -> Result<FaderTrainer> {
        let Self {
            num_attr,
            attribute_activation,
            learning_rate,
            beta1,
            beta2,
            adversarial_weight,
            adversarial_backprop,
            device,
        } = self;
        ensure!(learning_rate > 0.0, "learning_rate must be positive");
        ensure!(
            adversarial_weight >= 0.0,
            "adversarial_weight must be non-negative"
        );

        // each network owns its parameters and its optimizer
        let autoencoder_vs = nn::VarStore::new(device);
        let autoencoder =
            EncoderDecoderInit { num_attr }.build(&autoencoder_vs.root() / "encoder_decoder")?;
        let autoencoder_opt = nn::adam(beta1, beta2, 0.).build(&autoencoder_vs, learning_rate)?;

        let discriminator_vs = nn::VarStore::new(device);
        let discriminator = DiscriminatorInit {
            activation: attribute_activation,
            ..DiscriminatorInit::new(num_attr)
        }
        .build(&discriminator_vs.root() / "discriminator")?;
        let discriminator_opt =
            nn::adam(beta1, beta2, 0.).build(&discriminator_vs, learning_rate)?;

        Ok(FaderTrainer {
            num_attr,
            device,
            adversarial_weight,
            adversarial_backprop,
            autoencoder_vs,
            autoencoder,
            autoencoder_opt,
            discriminator_vs,
            discriminator,
            discriminator_opt,
        })
    }
}

/// Scalar losses of one training iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLoss {
    /// `reconstruction_loss + adversarial_weight * adversarial_loss`
    pub autoencoder_loss: f64,
    pub reconstruction_loss: f64,
    pub adversarial_loss: f64,
    pub discriminator_loss: f64,
}

impl StepLoss {
    pub fn is_finite(&self) -> bool {
        self.autoencoder_loss.is_finite() && self.discriminator_loss.is_finite()
    }
}

/// Mean losses over a validation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationLoss {
    pub reconstruction_loss: f64,
    pub discriminator_loss: f64,
    pub num_examples: usize,
}

#[derive(Debug)]
pub struct AutoencoderStepOutput {
    /// The latent code of the batch, detached from the autoencoder graph.
    pub latent: Tensor,
    /// The reconstruction, detached from the autoencoder graph.
    pub reconstruction: Tensor,
    pub autoencoder_loss: f64,
    pub reconstruction_loss: f64,
    pub adversarial_loss: f64,
}

#[derive(Debug)]
pub struct StepOutput {
    pub loss: StepLoss,
    pub reconstruction: Tensor,
}

#[derive(Debug)]
pub struct FaderTrainer {
    num_attr: usize,
    device: Device,
    adversarial_weight: f64,
    adversarial_backprop: bool,
    autoencoder_vs: nn::VarStore,
    autoencoder: EncoderDecoder,
    autoencoder_opt: nn::Optimizer,
    discriminator_vs: nn::VarStore,
    discriminator: Discriminator,
    discriminator_opt: nn::Optimizer,
}

impl FaderTrainer {
    pub fn num_attr(&self) -> usize {
        self.num_attr
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn autoencoder(&self) -> &EncoderDecoder {
        &self.autoencoder
    }

    pub fn discriminator(&self) -> &Discriminator {
        &self.discriminator
    }

    pub fn autoencoder_vs(&self) -> &nn::VarStore {
        &self.autoencoder_vs
    }

    pub fn discriminator_vs(&self) -> &nn::VarStore {
        &self.discriminator_vs
    }

    /// Runs the autoencoder update followed by the discriminator update on one batch.
    pub fn step(&mut self, batch: &Batch) -> Result<StepOutput> {
        let AutoencoderStepOutput {
            latent,
            reconstruction,
            autoencoder_loss,
            reconstruction_loss,
            adversarial_loss,
        } = self.autoencoder_step(batch)?;
        let discriminator_loss = self.discriminator_step(&latent, &batch.y_true)?;

        Ok(StepOutput {
            loss: StepLoss {
                autoencoder_loss,
                reconstruction_loss,
                adversarial_loss,
                discriminator_loss,
            },
            reconstruction,
        })
    }

    /// Updates the encoder-decoder on the reconstruction error plus the adversarial term
    /// that pushes the discriminator prediction towards `1 - y_target`.
    pub fn autoencoder_step(&mut self, batch: &Batch) -> Result<AutoencoderStepOutput> {
        batch.validate(self.num_attr)?;
        let Batch {
            image,
            y_true,
            y_target,
        } = batch;

        self.autoencoder_opt.zero_grad();
        let (latent, recon) = self.autoencoder.forward_t(image, y_true, true)?;
        let reconstruction_loss = mse_loss(&recon, image);
        let adversarial_target = y_target.neg() + 1.0;

        let adversarial_loss = self.adversarial_term(&latent, &adversarial_target)?;

        let loss = &reconstruction_loss + &adversarial_loss * self.adversarial_weight;
        loss.backward();
        self.autoencoder_opt.step();

        Ok(AutoencoderStepOutput {
            latent: latent.detach(),
            reconstruction: recon.detach(),
            autoencoder_loss: f64::from(&loss),
            reconstruction_loss: f64::from(&reconstruction_loss),
            adversarial_loss: f64::from(&adversarial_loss),
        })
    }

    /// The BCE between the discriminator prediction on `latent` and `target`.
    ///
    /// By default the prediction is computed on a detached latent and detached again,
    /// so the term carries no gradient. With `adversarial_backprop`, gradients reach
    /// the encoder through the discriminator, whose parameters stay frozen.
    fn adversarial_term(&mut self, latent: &Tensor, target: &Tensor) -> Result<Tensor> {
        if self.adversarial_backprop {
            self.discriminator_vs.freeze();
            let loss = self
                .discriminator
                .forward_t(latent, true)
                .map(|pred| bce_loss(&pred, target));
            self.discriminator_vs.unfreeze();
            loss
        } else {
            let pred = tch::no_grad(|| self.discriminator.forward_t(&latent.detach(), true))?;
            Ok(bce_loss(&pred.detach(), target))
        }
    }

    /// Updates the discriminator to predict `y_true` from a latent code.
    ///
    /// The discriminator runs a fresh forward pass on a detached copy of `latent`,
    /// so no graph node of the autoencoder step is backpropagated twice.
    pub fn discriminator_step(&mut self, latent: &Tensor, y_true: &Tensor) -> Result<f64> {
        let batch_size = check_latent(latent)?;
        check_attributes(y_true, batch_size, self.num_attr as i64)?;

        self.discriminator_opt.zero_grad();
        let pred = self.discriminator.forward_t(&latent.detach(), true)?;
        let loss = bce_loss(&pred, y_true);
        loss.backward();
        self.discriminator_opt.step();

        Ok(f64::from(&loss))
    }

    /// Computes mean losses over a data source in evaluation mode.
    pub fn evaluate<S>(&self, source: &S, batch_size: usize) -> Result<ValidationLoss>
    where
        S: DataSource + ?Sized,
    {
        let device = self.device;

        let (recon_sum, disc_sum, count) = tch::no_grad(|| -> Result<_> {
            source.batches(batch_size, None)?.try_fold(
                (0.0, 0.0, 0),
                |(recon_sum, disc_sum, count), batch| -> Result<_> {
                    let batch = batch?.to_device(device);
                    batch.validate(self.num_attr)?;
                    let Batch { image, y_true, .. } = &batch;

                    let (latent, recon) = self.autoencoder.forward_t(image, y_true, false)?;
                    let pred = self.discriminator.forward_t(&latent, false)?;
                    let size = batch.batch_size() as usize;
                    let recon_loss = f64::from(mse_loss(&recon, image));
                    let disc_loss = f64::from(bce_loss(&pred, y_true));

                    Ok((
                        recon_sum + recon_loss * size as f64,
                        disc_sum + disc_loss * size as f64,
                        count + size,
                    ))
                },
            )
        })?;

        Ok(ValidationLoss {
            reconstruction_loss: recon_sum / count as f64,
            discriminator_loss: disc_sum / count as f64,
            num_examples: count,
        })
    }

    /// Saves both parameter sets to the checkpoint directory.
    pub fn save_checkpoint(&self, checkpoint_dir: impl AsRef<Path>, epoch: usize) -> Result<()> {
        let checkpoint_dir = checkpoint_dir.as_ref();
        let timestamp = Local::now().format(FILE_STRFTIME);

        let path = checkpoint_dir.join(format!("encoder_decoder_{}_{:06}.ckpt", timestamp, epoch));
        self.autoencoder_vs.save(&path)?;

        let path = checkpoint_dir.join(format!("discriminator_{}_{:06}.ckpt", timestamp, epoch));
        self.discriminator_vs.save(&path)?;

        Ok(())
    }
}
