use crate::{
    common::*,
    error::FaderError,
    model::{check_attributes, check_image, IMAGE_CHANNELS, IMAGE_SIZE},
};
use futures::stream::{self, TryStreamExt};

/// How the target attributes `y_target` are derived from `y_true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Reconstruct with the true attributes.
    Same,
    /// Every attribute is inverted.
    Flip,
    /// Attributes are permuted across the examples of a batch.
    Shuffle,
}

impl Default for TargetKind {
    fn default() -> Self {
        Self::Same
    }
}

impl TargetKind {
    pub fn make_target(self, y_true: &Tensor) -> Tensor {
        match self {
            Self::Same => y_true.copy(),
            Self::Flip => y_true.neg() + 1.0,
            Self::Shuffle => {
                let batch_size = y_true.size()[0];
                let perm = Tensor::randperm(batch_size, (Kind::Int64, y_true.device()));
                y_true.index_select(0, &perm)
            }
        }
    }
}

/// An `(image, y_true, y_target)` triple of a batch.
#[derive(Debug, TensorLike)]
pub struct Batch {
    pub image: Tensor,
    pub y_true: Tensor,
    pub y_target: Tensor,
}

impl Batch {
    pub fn new(image: Tensor, y_true: Tensor, target: TargetKind) -> Self {
        let y_target = target.make_target(&y_true);
        Self {
            image,
            y_true,
            y_target,
        }
    }

    pub fn batch_size(&self) -> i64 {
        self.image.size()[0]
    }

    pub fn validate(&self, num_attr: usize) -> Result<()> {
        let Self {
            image,
            y_true,
            y_target,
        } = self;

        let batch_size = check_image(image)?;
        check_attributes(y_true, batch_size, num_attr as i64)?;
        check_attributes(y_target, batch_size, num_attr as i64)?;
        Ok(())
    }
}

pub type BatchIter<'a> = Box<dyn Iterator<Item = Result<Batch>> + 'a>;

/// A finite, ordered collection of examples that can be iterated in batches.
pub trait DataSource {
    fn len(&self) -> usize;

    fn num_attr(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over the examples in batches. The order is shuffled if `rng` is given.
    /// The last batch may be smaller than `batch_size`.
    fn batches<'a>(&'a self, batch_size: usize, rng: Option<&mut StdRng>) -> Result<BatchIter<'a>>;
}

fn batch_indices(len: usize, batch_size: usize, rng: Option<&mut StdRng>) -> Result<Vec<Vec<usize>>> {
    ensure!(batch_size > 0, "batch_size must be positive");
    if len == 0 {
        return Err(FaderError::EmptyBatch.into());
    }

    let mut order: Vec<_> = (0..len).collect();
    if let Some(rng) = rng {
        order.shuffle(rng);
    }

    let batches = order
        .into_iter()
        .chunks(batch_size)
        .into_iter()
        .map(|chunk| chunk.collect())
        .collect();
    Ok(batches)
}

/// Examples held in memory as `[n, 3, 128, 128]` images and `[n, num_attr]` attributes.
#[derive(Debug)]
pub struct TensorDataset {
    images: Tensor,
    attributes: Tensor,
    target: TargetKind,
}

impl TensorDataset {
    pub fn new(images: Tensor, attributes: Tensor, target: TargetKind) -> Result<Self> {
        let len = check_image(&images)?;
        let (_, num_attr) = attributes.size2().map_err(|_| {
            FaderError::shape_mismatch("attributes", "[n, num_attr]", attributes.size())
        })?;
        check_attributes(&attributes, len, num_attr)?;

        Ok(Self {
            images,
            attributes,
            target,
        })
    }
}

impl DataSource for TensorDataset {
    fn len(&self) -> usize {
        self.images.size()[0] as usize
    }

    fn num_attr(&self) -> usize {
        self.attributes.size()[1] as usize
    }

    fn batches<'a>(&'a self, batch_size: usize, rng: Option<&mut StdRng>) -> Result<BatchIter<'a>> {
        let indices = batch_indices(self.len(), batch_size, rng)?;
        let device = self.images.device();

        let iter = indices.into_iter().map(move |indices| {
            let indices: Vec<_> = indices.into_iter().map(|index| index as i64).collect();
            let indices = Tensor::of_slice(&indices).to_device(device);
            let image = self.images.index_select(0, &indices);
            let y_true = self.attributes.index_select(0, &indices);
            Ok(Batch::new(image, y_true, self.target))
        });

        Ok(Box::new(iter))
    }
}

#[derive(Debug, Clone)]
pub struct FaceDatasetInit<P>
where
    P: AsRef<Path>,
{
    pub dir: P,
    pub attributes_file: PathBuf,
    pub attributes: Option<Vec<String>>,
    pub target: TargetKind,
}

impl<P> FaceDatasetInit<P>
where
    P: AsRef<Path>,
{
    /// Loads an attribute table whose first column names an image file under `dir`
    /// and whose other columns hold -1/0/1 attribute labels.
    pub async fn load(self) -> Result<FaceDataset> {
        let Self {
            dir,
            attributes_file,
            attributes,
            target,
        } = self;
        let dir = dir.as_ref().to_owned();
        let attributes_path = dir.join(&attributes_file);

        let mut reader = csv::Reader::from_path(&attributes_path).with_context(|| {
            format!(
                "unable to open attribute file '{}'",
                attributes_path.display()
            )
        })?;
        let header: Vec<String> = reader.headers()?.iter().map(|name| name.to_owned()).collect();
        ensure!(
            header.len() >= 2,
            "attribute file '{}' has no attribute columns",
            attributes_path.display()
        );

        // column indices of the selected attributes
        let columns: Vec<usize> = match &attributes {
            Some(names) => names
                .iter()
                .map(|name| {
                    header[1..]
                        .iter()
                        .position(|col| col == name)
                        .map(|pos| pos + 1)
                        .ok_or_else(|| format_err!("attribute '{}' is not found", name))
                })
                .collect::<Result<_>>()?,
            None => (1..header.len()).collect(),
        };
        let attribute_names: Vec<String> = columns.iter().map(|&col| header[col].clone()).collect();

        let entries: Vec<FaceEntry> = reader
            .records()
            .enumerate()
            .map(|(line, record)| -> Result<_> {
                let record = record?;
                let image_id = record
                    .get(0)
                    .ok_or_else(|| format_err!("empty record at line {}", line + 2))?;
                let attributes: Vec<f32> = columns
                    .iter()
                    .map(|&col| -> Result<_> {
                        let text = record.get(col).ok_or_else(|| {
                            format_err!("missing column {} at line {}", col, line + 2)
                        })?;
                        parse_label(text.trim())
                            .with_context(|| format!("invalid label at line {}", line + 2))
                    })
                    .collect::<Result<_>>()?;

                Ok(FaceEntry {
                    path: dir.join(image_id),
                    attributes,
                })
            })
            .collect::<Result<_>>()?;

        if entries.is_empty() {
            return Err(FaderError::EmptyBatch.into());
        }
        info!(
            "{} images with {} attributes",
            entries.len(),
            attribute_names.len()
        );

        // check image files concurrently
        stream::iter(entries.iter().map(Fallible::Ok))
            .try_for_each_concurrent(None, |entry| async move {
                let metadata = tokio::fs::metadata(&entry.path)
                    .await
                    .with_context(|| format!("unable to access '{}'", entry.path.display()))?;
                ensure!(metadata.is_file(), "'{}' is not a file", entry.path.display());
                Fallible::Ok(())
            })
            .await?;

        Ok(FaceDataset {
            attribute_names,
            entries: entries.into(),
            target,
        })
    }
}

fn parse_label(text: &str) -> Result<f32> {
    let value = match text {
        "-1" | "0" => 0.0,
        "1" => 1.0,
        _ => bail!("expect -1, 0 or 1, but get '{}'", text),
    };
    Ok(value)
}

#[derive(Debug, Clone)]
struct FaceEntry {
    path: PathBuf,
    attributes: Vec<f32>,
}

#[derive(Debug)]
pub struct FaceDataset {
    attribute_names: Vec<String>,
    entries: Arc<[FaceEntry]>,
    target: TargetKind,
}

impl FaceDataset {
    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Partitions the examples into disjoint train, validation and test splits.
    pub fn split_train_val_test(
        &self,
        train_ratio: f64,
        valid_ratio: f64,
        rng: &mut StdRng,
    ) -> Result<(FaceSplit, FaceSplit, FaceSplit)> {
        ensure!(
            train_ratio > 0.0 && valid_ratio >= 0.0 && train_ratio + valid_ratio <= 1.0,
            "invalid split ratios: train = {}, valid = {}",
            train_ratio,
            valid_ratio
        );

        let len = self.entries.len();
        let num_train = ((len as f64 * train_ratio).floor() as usize).max(1);
        let num_valid = ((len as f64 * valid_ratio).floor() as usize).min(len - num_train);

        let mut order: Vec<_> = (0..len).collect();
        order.shuffle(rng);
        let test_indices = order.split_off(num_train + num_valid);
        let valid_indices = order.split_off(num_train);
        let train_indices = order;

        let make_split = |indices: Vec<usize>| FaceSplit {
            entries: self.entries.clone(),
            indices,
            num_attr: self.attribute_names.len(),
            target: self.target,
        };

        Ok((
            make_split(train_indices),
            make_split(valid_indices),
            make_split(test_indices),
        ))
    }
}

/// A subset of a [FaceDataset]. Images are loaded from disk batch by batch.
#[derive(Debug, Clone)]
pub struct FaceSplit {
    entries: Arc<[FaceEntry]>,
    indices: Vec<usize>,
    num_attr: usize,
    target: TargetKind,
}

impl FaceSplit {
    fn load_batch(&self, indices: &[usize]) -> Result<Batch> {
        let examples = indices.iter().map(|&index| -> Result<_> {
            let entry = &self.entries[self.indices[index]];
            let image = tch::vision::image::load_and_resize(&entry.path, IMAGE_SIZE, IMAGE_SIZE)
                .with_context(|| format!("unable to load '{}'", entry.path.display()))?;
            ensure!(
                image.size() == [IMAGE_CHANNELS, IMAGE_SIZE, IMAGE_SIZE],
                "'{}' is not an RGB image",
                entry.path.display()
            );
            Ok((image, Tensor::of_slice(&entry.attributes)))
        });
        let (images, attributes): (Vec<_>, Vec<_>) =
            itertools::process_results(examples, |iter| iter.unzip())?;

        let image = Tensor::stack(&images, 0).to_kind(Kind::Float) / 255.0;
        let y_true = Tensor::stack(&attributes, 0);
        Ok(Batch::new(image, y_true, self.target))
    }
}

impl DataSource for FaceSplit {
    fn len(&self) -> usize {
        self.indices.len()
    }

    fn num_attr(&self) -> usize {
        self.num_attr
    }

    fn batches<'a>(&'a self, batch_size: usize, rng: Option<&mut StdRng>) -> Result<BatchIter<'a>> {
        let indices = batch_indices(self.len(), batch_size, rng)?;
        let iter = indices
            .into_iter()
            .map(move |indices| self.load_batch(&indices));
        Ok(Box::new(iter))
    }
}
