use crate::{
    common::*,
    train::{StepLoss, ValidationLoss},
};

#[derive(Debug)]
pub enum LogMessage {
    Loss {
        epoch: usize,
        step: usize,
        loss: StepLoss,
    },
    Validation {
        epoch: usize,
        step: usize,
        loss: ValidationLoss,
    },
    Image {
        step: usize,
        true_image: Tensor,
        fake_image: Tensor,
    },
}
