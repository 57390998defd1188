pub mod common;
pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod message;
pub mod model;
pub mod train;

pub(crate) const FILE_STRFTIME: &str = "%Y-%m-%d-%H-%M-%S.%3f%z";

use crate::{
    common::*,
    dataset::{DataSource, FaceDatasetInit},
};

pub async fn start(config: config::Config) -> Result<()> {
    // data logging
    let start_time = Local::now();
    let log_dir = config
        .logging
        .log_dir
        .join(format!("{}", start_time.format(FILE_STRFTIME)));
    let checkpoint_dir = log_dir.join("checkpoints");

    tokio::fs::create_dir_all(&checkpoint_dir).await?;
    info!("logging to '{}'", log_dir.display());

    // load dataset
    let (train_set, valid_set, test_set) = {
        let config::Dataset {
            ref dataset_dir,
            ref attributes_file,
            ref attributes,
            target,
            split,
        } = config.dataset;

        let dataset = FaceDatasetInit {
            dir: dataset_dir,
            attributes_file: attributes_file.clone(),
            attributes: attributes.clone(),
            target,
        }
        .load()
        .await?;
        info!(
            "loaded {} images with attributes {:?}",
            dataset.len(),
            dataset.attribute_names()
        );

        let mut rng = match config.train.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        dataset.split_train_val_test(split.train_ratio.raw(), split.valid_ratio.raw(), &mut rng)?
    };
    info!(
        "split sizes: train = {}, valid = {}, test = {}",
        train_set.len(),
        valid_set.len(),
        test_set.len()
    );

    let config = Arc::new(config);
    let (log_tx, log_rx) = tokio::sync::mpsc::channel(2);

    // training worker
    let train_fut = {
        let config = config.clone();
        let checkpoint_dir = checkpoint_dir.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            train::training_worker(config, train_set, valid_set, checkpoint_dir, log_tx)
        })
        .map(|result| Fallible::Ok(result??))
    };

    let log_fut = {
        let log_dir = log_dir.clone();

        tokio::task::spawn(logging::logging_worker(log_dir, log_rx))
            .map(|result| Fallible::Ok(result??))
    };

    // run all tasks
    futures::try_join!(train_fut, log_fut)?;

    Ok(())
}
