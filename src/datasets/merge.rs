use std::{collections::BTreeMap, path::Path};

use ndarray::Array3;

use super::{
    cifar100::{Batch, Sample, NUM_TEST_EXAMPLES, NUM_TRAIN_EXAMPLES},
    errors::LoadError,
};

type NameMap = BTreeMap<String, Array3<u8>>;
type FineMap = BTreeMap<String, NameMap>;

/// Samples grouped as coarse key -> fine key -> name -> image. Label keys
/// are two-digit zero-padded strings, so iteration order is lexicographic.
#[derive(Default)]
pub struct GroupedTree {
    groups: BTreeMap<String, FineMap>,
}

impl GroupedTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts one sample; an existing (coarse, fine, name) entry is
    /// silently overwritten.
    pub fn insert(&mut self, coarse: u8, fine: u8, name: &str, image: Array3<u8>) {
        self.groups
            .entry(format!("{coarse:02}"))
            .or_default()
            .entry(format!("{fine:02}"))
            .or_default()
            .insert(name.to_string(), image);
    }

    pub fn get(&self, coarse: &str, fine: &str, name: &str) -> Option<&Array3<u8>> {
        self.groups.get(coarse)?.get(fine)?.get(name)
    }

    /// Number of leaves, i.e. distinct (coarse, fine, name) triples.
    pub fn len(&self) -> usize {
        self.groups
            .values()
            .flat_map(|fines| fines.values())
            .map(|names| names.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Flattened leaves in sorted (coarse, fine, name) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str, &Array3<u8>)> {
        self.groups.iter().flat_map(|(coarse, fines)| {
            fines.iter().flat_map(move |(fine, names)| {
                names
                    .iter()
                    .map(move |(name, img)| (coarse.as_str(), fine.as_str(), name.as_str(), img))
            })
        })
    }
}

pub fn group<I: IntoIterator<Item = Sample>>(samples: I) -> GroupedTree {
    let mut tree = GroupedTree::new();
    for sample in samples {
        let Sample {
            image,
            coarse,
            fine,
            name,
        } = sample;
        tree.insert(coarse, fine, &name, image);
    }
    tree
}

/// Loads the two pickled batches and groups them, train samples first so a
/// colliding test sample wins.
pub fn merge<P: AsRef<Path>, Q: AsRef<Path>>(
    train_path: P,
    test_path: Q,
) -> Result<GroupedTree, LoadError> {
    let train = Batch::load(train_path, NUM_TRAIN_EXAMPLES)?;
    let test = Batch::load(test_path, NUM_TEST_EXAMPLES)?;
    Ok(group(train.samples.into_iter().chain(test.samples)))
}

/// Serializes the tree into an HDF5 file, truncating any previous store.
/// With `normalize` the pixels are written as `f32` in `[0, 1]`.
pub fn write_store<P: AsRef<Path>>(
    tree: &GroupedTree,
    path: P,
    normalize: bool,
) -> hdf5::Result<()> {
    let file = hdf5::File::create(path)?;
    for (coarse_key, fines) in &tree.groups {
        let coarse_group = file.create_group(coarse_key)?;
        for (fine_key, names) in fines {
            let fine_group = coarse_group.create_group(fine_key)?;
            for (name, img) in names {
                if normalize {
                    let scaled = img.mapv(|p| p as f32 / 255.0);
                    fine_group
                        .new_dataset_builder()
                        .with_data(&scaled)
                        .create(name.as_str())?;
                } else {
                    fine_group
                        .new_dataset_builder()
                        .with_data(img)
                        .create(name.as_str())?;
                }
            }
        }
    }
    Ok(())
}

/// Reads an unnormalized store back into a tree.
pub fn read_store<P: AsRef<Path>>(path: P) -> hdf5::Result<GroupedTree> {
    let file = hdf5::File::open(path)?;
    let mut tree = GroupedTree::new();
    for coarse_key in file.member_names()? {
        let coarse_group = file.group(&coarse_key)?;
        let fines = tree.groups.entry(coarse_key).or_default();
        for fine_key in coarse_group.member_names()? {
            let fine_group = coarse_group.group(&fine_key)?;
            let names = fines.entry(fine_key).or_default();
            for name in fine_group.member_names()? {
                let img = fine_group
                    .dataset(&name)?
                    .read_dyn::<u8>()?
                    .into_dimensionality::<ndarray::Ix3>()
                    .map_err(|e| hdf5::Error::Internal(e.to_string()))?;
                names.insert(name, img);
            }
        }
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::cifar100::{IMG_CHANNELS, IMG_HEIGHT, IMG_WIDTH};

    fn make_image(seed: u8) -> Array3<u8> {
        Array3::from_shape_fn((IMG_HEIGHT, IMG_WIDTH, IMG_CHANNELS), |(y, x, c)| {
            (y * 32 + x + c) as u8 ^ seed
        })
    }

    fn make_sample(coarse: u8, fine: u8, name: &str, seed: u8) -> Sample {
        Sample {
            image: make_image(seed),
            coarse,
            fine,
            name: name.to_string(),
        }
    }

    fn temp_store(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("cifar100-prep-{}-{name}.h5", std::process::id()))
    }

    #[test]
    fn keys_are_zero_padded_two_digits() {
        let tree = group(vec![
            make_sample(3, 7, "a", 1),
            make_sample(19, 99, "b", 2),
        ]);
        assert!(tree.get("03", "07", "a").is_some());
        assert!(tree.get("19", "99", "b").is_some());
        assert!(tree.get("3", "7", "a").is_none());
    }

    #[test]
    fn leaf_count_is_train_plus_test_without_collisions() {
        let train: Vec<_> = (0..6).map(|i| make_sample(0, i, &format!("t{i}"), i)).collect();
        let test: Vec<_> = (0..4).map(|i| make_sample(1, i, &format!("e{i}"), i)).collect();
        let (n_train, n_test) = (train.len(), test.len());
        let tree = group(train.into_iter().chain(test));
        assert_eq!(tree.len(), n_train + n_test);
    }

    #[test]
    fn collision_keeps_the_later_sample() {
        let tree = group(vec![
            make_sample(2, 5, "dup", 1),
            make_sample(2, 5, "dup", 2),
        ]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get("02", "05", "dup").unwrap(), &make_image(2));
    }

    #[test]
    fn iteration_is_lexicographic() {
        let tree = group(vec![
            make_sample(10, 1, "z", 0),
            make_sample(2, 1, "a", 0),
            make_sample(2, 1, "b", 0),
            make_sample(2, 0, "c", 0),
        ]);
        let paths: Vec<_> = tree
            .iter()
            .map(|(c, f, n, _)| format!("{c}/{f}/{n}"))
            .collect();
        assert_eq!(paths, ["02/00/c", "02/01/a", "02/01/b", "10/01/z"]);
    }

    #[test]
    fn store_round_trip_is_bit_identical() {
        let tree = group(vec![
            make_sample(0, 0, "first", 10),
            make_sample(0, 1, "second", 20),
            make_sample(7, 42, "third", 30),
        ]);
        let path = temp_store("roundtrip");
        write_store(&tree, &path, false).unwrap();
        let restored = read_store(&path).unwrap();

        assert_eq!(restored.len(), tree.len());
        for (coarse, fine, name, img) in tree.iter() {
            assert_eq!(restored.get(coarse, fine, name).unwrap(), img);
        }
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn normalized_store_holds_floats_in_unit_range() {
        let tree = group(vec![make_sample(1, 2, "pixel", 0)]);
        let path = temp_store("normalized");
        write_store(&tree, &path, true).unwrap();

        let file = hdf5::File::open(&path).unwrap();
        let ds = file
            .group("01")
            .unwrap()
            .group("02")
            .unwrap()
            .dataset("pixel")
            .unwrap();
        let arr = ds.read_dyn::<f32>().unwrap();
        let src = tree.get("01", "02", "pixel").unwrap();
        for (got, &want) in arr.iter().zip(src.iter()) {
            assert!((got - want as f32 / 255.0).abs() < 1e-6);
        }
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn rewriting_replaces_the_store() {
        let path = temp_store("rewrite");
        write_store(&group(vec![make_sample(0, 0, "old", 1)]), &path, false).unwrap();
        write_store(&group(vec![make_sample(1, 1, "new", 2)]), &path, false).unwrap();

        let restored = read_store(&path).unwrap();
        assert_eq!(restored.len(), 1);
        assert!(restored.get("00", "00", "old").is_none());
        assert!(restored.get("01", "01", "new").is_some());
        std::fs::remove_file(&path).unwrap();
    }
}
