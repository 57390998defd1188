mod state;
mod trainer;
mod utils;

pub use state::*;
pub use trainer::*;
pub use utils::*;

use crate::{
    common::*,
    config::Config,
    dataset::{DataSource, FaceSplit},
    error::FaderError,
    message::LogMessage,
};

/// Loop settings that do not affect the networks.
#[derive(Debug, Clone)]
pub struct EpochOptions {
    pub batch_size: usize,
    pub max_epochs: usize,
    pub save_image_steps: Option<NonZeroUsize>,
    pub save_checkpoint_epochs: Option<NonZeroUsize>,
    pub checkpoint_dir: Option<PathBuf>,
}

impl EpochOptions {
    pub fn from_config(config: &Config, checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            batch_size: config.train.batch_size.get(),
            max_epochs: config.train.max_epochs.get(),
            save_image_steps: config.logging.save_image_steps,
            save_checkpoint_epochs: config.logging.save_checkpoint_epochs,
            checkpoint_dir: Some(checkpoint_dir.into()),
        }
    }
}

/// Runs the epoch and batch loops.
///
/// Every report goes through `report`. Training stops early, without error, once
/// `report` returns `false`.
pub fn run_epochs<T, V, F>(
    trainer: &mut FaderTrainer,
    train_set: &T,
    valid_set: &V,
    options: &EpochOptions,
    rng: &mut StdRng,
    mut report: F,
) -> Result<TrainingState>
where
    T: DataSource + ?Sized,
    V: DataSource + ?Sized,
    F: FnMut(LogMessage) -> bool,
{
    let EpochOptions {
        batch_size,
        max_epochs,
        save_image_steps,
        save_checkpoint_epochs,
        ref checkpoint_dir,
    } = *options;
    let device = trainer.device();
    ensure!(
        train_set.num_attr() == trainer.num_attr(),
        "the training set has {} attributes, but the model expects {}",
        train_set.num_attr(),
        trainer.num_attr()
    );

    let mut state = TrainingState::default();
    let mut rate_counter = RateCounter::with_second_interval();

    while state.epoch < max_epochs {
        let epoch = state.next_epoch();

        for batch in train_set.batches(batch_size, Some(&mut *rng))? {
            let batch = batch?.to_device(device);
            let StepOutput {
                loss,
                reconstruction,
            } = trainer.step(&batch)?;
            let step = state.next_iteration();

            if !loss.is_finite() {
                error!("training diverged at iteration {}: {:?}", step, loss);
                return Err(FaderError::DivergedTraining {
                    iteration: step,
                    autoencoder_loss: loss.autoencoder_loss,
                    discriminator_loss: loss.discriminator_loss,
                }
                .into());
            }

            rate_counter.add(1.0);
            if let Some(rate) = rate_counter.rate() {
                info!(
                    "epoch {}\tstep {}\tautoencoder_loss {:.5}\tdiscriminator_loss {:.5}\t{:.2} iter/s",
                    epoch, step, loss.autoencoder_loss, loss.discriminator_loss, rate
                );
            } else {
                debug!(
                    "epoch {}\tstep {}\tautoencoder_loss {:.5}\tdiscriminator_loss {:.5}",
                    epoch, step, loss.autoencoder_loss, loss.discriminator_loss
                );
            }

            if !report(LogMessage::Loss { epoch, step, loss }) {
                warn!("the logging worker stopped, finishing training early");
                return Ok(state);
            }

            if let Some(steps) = save_image_steps {
                if step % steps.get() == 0 {
                    let msg = LogMessage::Image {
                        step,
                        true_image: batch.image.detach().to_device(Device::Cpu),
                        fake_image: reconstruction.clamp(0.0, 1.0).to_device(Device::Cpu),
                    };
                    if !report(msg) {
                        warn!("the logging worker stopped, finishing training early");
                        return Ok(state);
                    }
                }
            }
        }

        // validation
        let improved = if valid_set.is_empty() {
            false
        } else {
            let loss = trainer.evaluate(valid_set, batch_size)?;
            let improved = state.update_best_valid_loss(loss.reconstruction_loss);
            info!(
                "epoch {}\tvalid reconstruction_loss {:.5}\tdiscriminator_loss {:.5}{}",
                epoch,
                loss.reconstruction_loss,
                loss.discriminator_loss,
                if improved { "\t(best)" } else { "" }
            );

            let msg = LogMessage::Validation {
                epoch,
                step: state.iteration,
                loss,
            };
            if !report(msg) {
                warn!("the logging worker stopped, finishing training early");
                return Ok(state);
            }
            improved
        };

        // checkpoint
        if let (Some(epochs), Some(checkpoint_dir)) = (save_checkpoint_epochs, checkpoint_dir) {
            if epoch % epochs.get() == 0 || improved {
                trainer.save_checkpoint(checkpoint_dir, epoch)?;
                info!("saved checkpoint for epoch {}", epoch);
            }
        }
    }

    Ok(state)
}

/// Trains on the given splits and sends reports to the logging worker.
///
/// Runs on a blocking thread.
pub fn training_worker(
    config: Arc<Config>,
    train_set: FaceSplit,
    valid_set: FaceSplit,
    checkpoint_dir: impl AsRef<Path>,
    log_tx: mpsc::Sender<LogMessage>,
) -> Result<()> {
    let seed = config.train.seed;
    if let Some(seed) = seed {
        tch::manual_seed(seed as i64);
    }
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut trainer = FaderTrainerInit::from_config(&config).build()?;
    info!(
        "training on {} examples, validating on {} examples",
        train_set.len(),
        valid_set.len()
    );

    let options = EpochOptions::from_config(&config, checkpoint_dir.as_ref());
    let state = run_epochs(
        &mut trainer,
        &train_set,
        &valid_set,
        &options,
        &mut rng,
        |msg| log_tx.blocking_send(msg).is_ok(),
    )?;

    info!(
        "training finished after {} epochs and {} iterations",
        state.epoch, state.iteration
    );
    if let Some(best) = state.best_valid_loss {
        info!("best validation reconstruction_loss {:.5}", best);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{TargetKind, TensorDataset};

    fn make_dataset(len: i64, num_attr: i64) -> Result<TensorDataset> {
        TensorDataset::new(
            Tensor::rand(&[len, 3, 128, 128], FLOAT_CPU),
            Tensor::rand(&[len, num_attr], FLOAT_CPU).round(),
            TargetKind::Flip,
        )
    }

    fn options(max_epochs: usize) -> EpochOptions {
        EpochOptions {
            batch_size: 2,
            max_epochs,
            save_image_steps: NonZeroUsize::new(2),
            save_checkpoint_epochs: None,
            checkpoint_dir: None,
        }
    }

    #[test]
    fn run_epochs_test() -> Result<()> {
        let mut trainer = FaderTrainerInit::new(3, Device::Cpu).build()?;
        let train_set = make_dataset(3, 3)?;
        let valid_set = make_dataset(2, 3)?;
        let mut rng = StdRng::seed_from_u64(0);

        let mut messages = vec![];
        let state = run_epochs(
            &mut trainer,
            &train_set,
            &valid_set,
            &options(2),
            &mut rng,
            |msg| {
                messages.push(msg);
                true
            },
        )?;

        // 2 batches per epoch
        ensure!(state.epoch == 2 && state.iteration == 4);
        ensure!(state.best_valid_loss.is_some());

        let num_loss = messages
            .iter()
            .filter(|msg| matches!(msg, LogMessage::Loss { .. }))
            .count();
        let num_valid = messages
            .iter()
            .filter(|msg| matches!(msg, LogMessage::Validation { .. }))
            .count();
        let num_image = messages
            .iter()
            .filter(|msg| matches!(msg, LogMessage::Image { .. }))
            .count();
        ensure!((num_loss, num_valid, num_image) == (4, 2, 2));

        for msg in &messages {
            if let LogMessage::Image { fake_image, .. } = msg {
                ensure!(f64::from(fake_image.min()) >= 0.0 && f64::from(fake_image.max()) <= 1.0);
            }
        }

        Ok(())
    }

    #[test]
    fn stop_when_report_fails_test() -> Result<()> {
        let mut trainer = FaderTrainerInit::new(2, Device::Cpu).build()?;
        let train_set = make_dataset(4, 2)?;
        let valid_set = make_dataset(1, 2)?;
        let mut rng = StdRng::seed_from_u64(0);

        let state = run_epochs(
            &mut trainer,
            &train_set,
            &valid_set,
            &options(5),
            &mut rng,
            |_| false,
        )?;
        ensure!(state.epoch == 1 && state.iteration == 1);

        Ok(())
    }

    #[test]
    fn diverged_training_test() -> Result<()> {
        let mut trainer = FaderTrainerInit::new(2, Device::Cpu).build()?;
        let train_set = TensorDataset::new(
            Tensor::full(&[2, 3, 128, 128], f64::NAN, FLOAT_CPU),
            Tensor::ones(&[2, 2], FLOAT_CPU),
            TargetKind::Same,
        )?;
        let valid_set = make_dataset(1, 2)?;
        let mut rng = StdRng::seed_from_u64(0);

        let err = run_epochs(
            &mut trainer,
            &train_set,
            &valid_set,
            &options(1),
            &mut rng,
            |_| true,
        )
        .unwrap_err();
        ensure!(matches!(
            err.downcast_ref::<FaderError>(),
            Some(FaderError::DivergedTraining { iteration: 1, .. })
        ));

        Ok(())
    }

    #[test]
    fn checkpoint_on_improvement_test() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut trainer = FaderTrainerInit::new(2, Device::Cpu).build()?;
        let train_set = make_dataset(2, 2)?;
        let valid_set = make_dataset(2, 2)?;
        let mut rng = StdRng::seed_from_u64(0);

        let options = EpochOptions {
            save_image_steps: None,
            save_checkpoint_epochs: NonZeroUsize::new(100),
            checkpoint_dir: Some(dir.path().to_owned()),
            ..options(1)
        };
        run_epochs(
            &mut trainer,
            &train_set,
            &valid_set,
            &options,
            &mut rng,
            |_| true,
        )?;

        // the first validation is always an improvement
        ensure!(fs::read_dir(dir.path())?.count() == 2);

        Ok(())
    }

    #[test]
    fn num_attr_mismatch_test() -> Result<()> {
        let mut trainer = FaderTrainerInit::new(3, Device::Cpu).build()?;
        let train_set = make_dataset(2, 2)?;
        let mut rng = StdRng::seed_from_u64(0);

        let result = run_epochs(
            &mut trainer,
            &train_set,
            &train_set,
            &options(1),
            &mut rng,
            |_| true,
        );
        ensure!(result.is_err());

        Ok(())
    }
}
