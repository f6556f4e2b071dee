use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use image::{Rgb, RgbImage};
use ndarray::Array3;
use serde_pickle::{DeOptions, HashableValue, Value};

use super::errors::LoadError;

pub const URL: &str = "https://www.cs.toronto.edu/~kriz/cifar-100-python.tar.gz";
pub const MD5: &str = "eb9058c3a382ffc7106e4002c42a8d85";
pub const FILENAME: &str = "cifar-100-python.tar.gz";

pub const TRAIN_FILE: &str = "cifar-100-python/train";
pub const TEST_FILE: &str = "cifar-100-python/test";
pub const NUM_TRAIN_EXAMPLES: usize = 50_000;
pub const NUM_TEST_EXAMPLES: usize = 10_000;

pub const IMG_HEIGHT: usize = 32;
pub const IMG_WIDTH: usize = 32;
pub const IMG_CHANNELS: usize = 3;
const IMG_LEN: usize = IMG_CHANNELS * IMG_HEIGHT * IMG_WIDTH;

/// One loaded image with its labels. The image is `(32, 32, 3)`, HWC layout,
/// and `name` is the pickled filename with its extension stripped.
pub struct Sample {
    pub image: Array3<u8>,
    pub coarse: u8,
    pub fine: u8,
    pub name: String,
}

impl Sample {
    pub fn coarse_name(&self) -> &'static str {
        COARSE_LABEL_NAMES[self.coarse as usize]
    }

    pub fn fine_name(&self) -> &'static str {
        FINE_LABEL_NAMES[self.fine as usize]
    }

    pub fn to_image(&self) -> RgbImage {
        RgbImage::from_fn(IMG_WIDTH as u32, IMG_HEIGHT as u32, |x, y| {
            let x = x as usize;
            let y = y as usize;
            Rgb([
                self.image[[y, x, 0]],
                self.image[[y, x, 1]],
                self.image[[y, x, 2]],
            ])
        })
    }
}

pub struct Batch {
    pub samples: Vec<Sample>,
}

impl Batch {
    /// Loads one pickled batch file and reshapes every flat 3072-byte row
    /// into a `(32, 32, 3)` image.
    pub fn load<P: AsRef<Path>>(path: P, expected: usize) -> Result<Self, LoadError> {
        let f = File::open(path)?;
        let value = serde_pickle::value_from_reader(BufReader::new(f), DeOptions::new())?;
        Self::from_value(&value, expected)
    }

    fn from_value(value: &Value, expected: usize) -> Result<Self, LoadError> {
        let dict = match value {
            Value::Dict(d) => d,
            _ => return Err(LoadError::Malformed("batch pickle is not a dict")),
        };
        let coarse = int_list(lookup(dict, "coarse_labels")?)?;
        let fine = int_list(lookup(dict, "fine_labels")?)?;
        let names = string_list(lookup(dict, "filenames")?)?;
        let rows = image_rows(lookup(dict, "data")?)?;

        let n = coarse.len();
        if fine.len() != n || names.len() != n || rows.len() != n {
            return Err(LoadError::LengthMismatch {
                coarse: coarse.len(),
                fine: fine.len(),
                names: names.len(),
                data: rows.len(),
            });
        }
        if n != expected {
            return Err(LoadError::CountMismatch {
                expected,
                found: n,
            });
        }

        let mut samples = Vec::with_capacity(n);
        for (((coarse, fine), name), row) in
            coarse.into_iter().zip(fine).zip(names).zip(&rows)
        {
            samples.push(Sample {
                image: reshape_row(row)?,
                coarse,
                fine,
                name: strip_extension(&name).to_string(),
            });
        }
        Ok(Self { samples })
    }
}

/// Reshapes a channel-major `(3, 32, 32)` byte row into HWC `(32, 32, 3)`.
fn reshape_row(row: &[u8]) -> Result<Array3<u8>, LoadError> {
    if row.len() != IMG_LEN {
        return Err(LoadError::BadImageLen {
            expected: IMG_LEN,
            found: row.len(),
        });
    }
    Ok(Array3::from_shape_fn(
        (IMG_HEIGHT, IMG_WIDTH, IMG_CHANNELS),
        |(y, x, c)| row[c * IMG_HEIGHT * IMG_WIDTH + y * IMG_WIDTH + x],
    ))
}

fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => name,
    }
}

fn lookup<'a>(
    dict: &'a BTreeMap<HashableValue, Value>,
    key: &'static str,
) -> Result<&'a Value, LoadError> {
    // python2-era pickles key the dict with bytes, re-pickled ones with str
    dict.get(&HashableValue::Bytes(key.as_bytes().to_vec()))
        .or_else(|| dict.get(&HashableValue::String(key.to_string())))
        .ok_or(LoadError::MissingKey(key))
}

fn int_list(value: &Value) -> Result<Vec<u8>, LoadError> {
    let items = match value {
        Value::List(items) => items,
        _ => return Err(LoadError::Malformed("label array is not a list")),
    };
    items
        .iter()
        .map(|item| match item {
            Value::I64(n) if (0..=255).contains(n) => Ok(*n as u8),
            _ => Err(LoadError::Malformed("label entry is not a small integer")),
        })
        .collect()
}

fn string_list(value: &Value) -> Result<Vec<String>, LoadError> {
    let items = match value {
        Value::List(items) => items,
        _ => return Err(LoadError::Malformed("filename array is not a list")),
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            Value::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
            _ => Err(LoadError::Malformed("filename entry is not a string")),
        })
        .collect()
}

fn image_rows(value: &Value) -> Result<Vec<Vec<u8>>, LoadError> {
    match value {
        // a flat buffer of concatenated rows
        Value::Bytes(flat) => {
            if flat.len() % IMG_LEN != 0 {
                return Err(LoadError::BadImageLen {
                    expected: IMG_LEN,
                    found: flat.len() % IMG_LEN,
                });
            }
            Ok(flat.chunks_exact(IMG_LEN).map(|c| c.to_vec()).collect())
        }
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::Bytes(b) => Ok(b.clone()),
                Value::List(row) => row
                    .iter()
                    .map(|v| match v {
                        Value::I64(n) if (0..=255).contains(n) => Ok(*n as u8),
                        _ => Err(LoadError::Malformed("pixel is not a byte")),
                    })
                    .collect(),
                _ => Err(LoadError::Malformed("image row is not a byte buffer")),
            })
            .collect(),
        _ => Err(LoadError::Malformed("image array is not bytes or a list")),
    }
}

#[rustfmt::skip]
pub const COARSE_LABEL_NAMES: [&str; 20] = [
    "aquatic_mammals", "fish", "flowers", "food_containers",
    "fruit_and_vegetables", "household_electrical_devices",
    "household_furniture", "insects", "large_carnivores",
    "large_man-made_outdoor_things", "large_natural_outdoor_scenes",
    "large_omnivores_and_herbivores", "medium_mammals",
    "non-insect_invertebrates", "people", "reptiles", "small_mammals",
    "trees", "vehicles_1", "vehicles_2",
];

#[rustfmt::skip]
pub const FINE_LABEL_NAMES: [&str; 100] = [
    "apple", "aquarium_fish", "baby", "bear", "beaver",
    "bed", "bee", "beetle", "bicycle", "bottle",
    "bowl", "boy", "bridge", "bus", "butterfly",
    "camel", "can", "castle", "caterpillar", "cattle",
    "chair", "chimpanzee", "clock", "cloud", "cockroach",
    "couch", "crab", "crocodile", "cup", "dinosaur",
    "dolphin", "elephant", "flatfish", "forest", "fox",
    "girl", "hamster", "house", "kangaroo", "keyboard",
    "lamp", "lawn_mower", "leopard", "lion", "lizard",
    "lobster", "man", "maple_tree", "motorcycle", "mountain",
    "mouse", "mushroom", "oak_tree", "orange", "orchid",
    "otter", "palm_tree", "pear", "pickup_truck", "pine_tree",
    "plain", "plate", "poppy", "porcupine", "possum",
    "rabbit", "raccoon", "ray", "road", "rocket",
    "rose", "sea", "seal", "shark", "shrew",
    "skunk", "skyscraper", "snail", "snake", "spider",
    "squirrel", "streetcar", "sunflower", "sweet_pepper", "table",
    "tank", "telephone", "television", "tiger", "tractor",
    "train", "trout", "tulip", "turtle", "wardrobe",
    "whale", "willow_tree", "wolf", "woman", "worm",
];
