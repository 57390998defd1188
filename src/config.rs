use crate::{common::*, dataset::TargetKind, model::AttributeActivation};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: Dataset,
    pub model: Model,
    pub train: Training,
    pub logging: Logging,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file '{}'", path.display()))?;
        let config: Self = json5::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let Self {
            dataset, model, train, ..
        } = self;

        let Split {
            train_ratio,
            valid_ratio,
        } = dataset.split;
        ensure!(
            train_ratio.raw() > 0.0
                && valid_ratio.raw() >= 0.0
                && (train_ratio + valid_ratio).raw() <= 1.0,
            "invalid split ratios: train = {}, valid = {}",
            train_ratio,
            valid_ratio
        );

        if let Some(attributes) = &dataset.attributes {
            ensure!(
                attributes.len() == model.num_attr.get(),
                "{} attributes are selected, but num_attr = {}",
                attributes.len(),
                model.num_attr
            );
        }

        ensure!(train.learning_rate.raw() > 0.0, "learning_rate must be positive");
        ensure!(
            (0.0..1.0).contains(&train.beta1.raw()) && (0.0..1.0).contains(&train.beta2.raw()),
            "beta1 and beta2 must lie in [0, 1)"
        );
        ensure!(
            train.adversarial_weight.raw() >= 0.0,
            "adversarial_weight must be non-negative"
        );

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub dataset_dir: PathBuf,
    #[serde(default = "default_attributes_file")]
    pub attributes_file: PathBuf,
    /// Attribute columns to use, in order. All columns are used if omitted.
    #[serde(default)]
    pub attributes: Option<Vec<String>>,
    #[serde(default)]
    pub split: Split,
    #[serde(default)]
    pub target: TargetKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Split {
    pub train_ratio: R64,
    pub valid_ratio: R64,
}

impl Default for Split {
    fn default() -> Self {
        Self {
            train_ratio: r64(0.8),
            valid_ratio: r64(0.1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub num_attr: NonZeroUsize,
    #[serde(default)]
    pub attribute_activation: AttributeActivation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Training {
    pub batch_size: NonZeroUsize,
    pub max_epochs: NonZeroUsize,
    pub learning_rate: R64,
    #[serde(default = "default_beta1")]
    pub beta1: R64,
    #[serde(default = "default_beta2")]
    pub beta2: R64,
    #[serde(default = "default_adversarial_weight")]
    pub adversarial_weight: R64,
    /// Let the adversarial term backpropagate into the encoder through a
    /// frozen discriminator.
    #[serde(default)]
    pub adversarial_backprop: bool,
    #[serde(with = "tch_serde::serde_device")]
    pub device: Device,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub log_dir: PathBuf,
    #[serde(default)]
    pub save_image_steps: Option<NonZeroUsize>,
    #[serde(default)]
    pub save_checkpoint_epochs: Option<NonZeroUsize>,
}

fn default_attributes_file() -> PathBuf {
    PathBuf::from("list_attr_celeba.csv")
}

fn default_beta1() -> R64 {
    r64(0.5)
}

fn default_beta2() -> R64 {
    r64(0.999)
}

fn default_adversarial_weight() -> R64 {
    r64(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        dataset: {
            dataset_dir: "data/celeba",
            split: { train_ratio: 0.7, valid_ratio: 0.2 },
            target: "flip",
        },
        model: {
            num_attr: 39,
        },
        train: {
            batch_size: 32,
            max_epochs: 1000,
            learning_rate: 1e-3,
            device: "cpu",
        },
        logging: {
            log_dir: "logs",
            save_checkpoint_epochs: 10,
        },
    }"#;

    #[test]
    fn parse_config_test() -> Result<()> {
        let config: Config = json5::from_str(CONFIG)?;
        config.validate()?;

        ensure!(config.model.num_attr.get() == 39);
        ensure!(config.model.attribute_activation == AttributeActivation::Sigmoid);
        ensure!(config.dataset.target == TargetKind::Flip);
        ensure!(config.dataset.attributes_file == Path::new("list_attr_celeba.csv"));
        ensure!(config.train.beta1.raw() == 0.5);
        ensure!(config.train.beta2.raw() == 0.999);
        ensure!(config.train.adversarial_weight.raw() == 1.0);
        ensure!(!config.train.adversarial_backprop);
        ensure!(config.train.device == Device::Cpu);
        ensure!(config.logging.save_image_steps.is_none());
        ensure!(config.logging.save_checkpoint_epochs.map(|n| n.get()) == Some(10));

        Ok(())
    }

    #[test]
    fn reject_bad_split_test() -> Result<()> {
        let mut config: Config = json5::from_str(CONFIG)?;
        config.dataset.split.valid_ratio = r64(0.5);
        ensure!(config.validate().is_err());
        Ok(())
    }

    #[test]
    fn reject_attribute_count_mismatch_test() -> Result<()> {
        let mut config: Config = json5::from_str(CONFIG)?;
        config.dataset.attributes = Some(vec!["Smiling".into(), "Male".into()]);
        ensure!(config.validate().is_err());
        Ok(())
    }

    #[test]
    fn load_demo_config_test() -> Result<()> {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.json5");
        let config = Config::load(&path)?;
        ensure!(config.model.num_attr.get() == 39);
        ensure!(config.dataset.attributes.as_ref().map(|names| names.len()) == Some(39));
        ensure!(config.dataset.target == TargetKind::Flip);
        Ok(())
    }
}
