use thiserror::Error;

/// Fatal conditions raised by the models and the training loop.
///
/// They travel inside [anyhow::Error] and can be recovered with
/// `err.downcast_ref::<FaderError>()`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FaderError {
    #[error("shape mismatch on {what}: expected {expected}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        actual: Vec<i64>,
    },
    #[error("the data source yields no examples")]
    EmptyBatch,
    #[error(
        "training diverged at iteration {iteration}: \
         autoencoder loss = {autoencoder_loss}, discriminator loss = {discriminator_loss}"
    )]
    DivergedTraining {
        iteration: usize,
        autoencoder_loss: f64,
        discriminator_loss: f64,
    },
}

impl FaderError {
    pub fn shape_mismatch(what: &'static str, expected: impl ToString, actual: Vec<i64>) -> Self {
        Self::ShapeMismatch {
            what,
            expected: expected.to_string(),
            actual,
        }
    }
}
