mod attribute;
mod conv_bn;
mod discriminator;
mod encoder_decoder;
mod loss;
mod misc;

pub use attribute::*;
pub use conv_bn::*;
pub use discriminator::*;
pub use encoder_decoder::*;
pub use loss::*;
pub use misc::*;
