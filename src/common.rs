pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use chrono::Local;
pub use futures::future::FutureExt;
pub use itertools::Itertools;
pub use noisy_float::prelude::*;
pub use rand::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    fs, iter,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
};
pub use tch::{
    kind::FLOAT_CPU,
    nn::{self, ModuleT, OptimizerConfig},
    Device, Kind, Reduction, Tensor,
};
pub use tch_tensor_like::TensorLike;
pub use tokio::sync::mpsc;
pub use tracing::{debug, error, info, warn};

pub type Fallible<T> = Result<T>;
