use crate::{
    common::*,
    message::LogMessage,
    train::{StepLoss, ValidationLoss},
};
use tfrecord::{EventAsyncWriter, EventWriterConfig};

/// Writes training reports as TensorBoard events under `log_dir/events`.
///
/// Returns once every sender is dropped.
pub async fn logging_worker(
    log_dir: impl AsRef<Path>,
    mut log_rx: mpsc::Receiver<LogMessage>,
) -> Result<()> {
    let event_dir = log_dir.as_ref().join("events");
    tokio::fs::create_dir_all(&event_dir).await?;

    let mut event_writer = {
        let event_path_prefix = event_dir
            .join("fader-net")
            .into_os_string()
            .into_string()
            .map_err(|path| format_err!("non-UTF-8 event path {:?}", path))?;

        EventAsyncWriter::from_prefix(event_path_prefix, "", EventWriterConfig::default()).await?
    };

    while let Some(msg) = log_rx.recv().await {
        match msg {
            LogMessage::Loss { step, loss, .. } => {
                let step = step as i64;
                let StepLoss {
                    autoencoder_loss,
                    reconstruction_loss,
                    adversarial_loss,
                    discriminator_loss,
                } = loss;

                event_writer
                    .write_scalar("loss/autoencoder", step, autoencoder_loss as f32)
                    .await?;
                event_writer
                    .write_scalar("loss/reconstruction", step, reconstruction_loss as f32)
                    .await?;
                event_writer
                    .write_scalar("loss/adversarial", step, adversarial_loss as f32)
                    .await?;
                event_writer
                    .write_scalar("loss/discriminator", step, discriminator_loss as f32)
                    .await?;
            }
            LogMessage::Validation { epoch, step, loss } => {
                let step = step as i64;
                let ValidationLoss {
                    reconstruction_loss,
                    discriminator_loss,
                    ..
                } = loss;

                event_writer
                    .write_scalar("valid/reconstruction", step, reconstruction_loss as f32)
                    .await?;
                event_writer
                    .write_scalar("valid/discriminator", step, discriminator_loss as f32)
                    .await?;
                event_writer
                    .write_scalar("params/epoch", step, epoch as f32)
                    .await?;
            }
            LogMessage::Image {
                step,
                true_image,
                fake_image,
            } => {
                let step = step as i64;

                event_writer
                    .write_image_list("image/true", step, true_image)
                    .await?;
                event_writer
                    .write_image_list("image/reconstruction", step, fake_image)
                    .await?;
            }
        }
    }

    Ok(())
}
