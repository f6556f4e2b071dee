use std::{env, error::Error, path::PathBuf};

use cifar100_prep::datasets::{
    cifar100,
    download::{fetch, verify_md5, Extract},
    merge,
};

const STORE_FILE: &str = "cifar100.h5";

fn datasets_dir() -> Result<PathBuf, Box<dyn Error>> {
    let root = env::var("DATASETS_DIR")
        .map_err(|_| "DATASETS_DIR environment variable is not set")?;
    Ok(PathBuf::from(root).join("cifar100"))
}

fn download() -> Result<(), Box<dyn Error>> {
    println!("download() running ...");
    let ds_dir = datasets_dir()?;
    fetch(
        cifar100::URL,
        &ds_dir,
        cifar100::FILENAME,
        Some(Extract::Auto),
    )?;
    verify_md5(ds_dir.join(cifar100::FILENAME), cifar100::MD5)?;
    Ok(())
}

fn mix() -> Result<(), Box<dyn Error>> {
    println!("mix() running ...");
    let ds_dir = datasets_dir()?;
    let tree = merge::merge(
        ds_dir.join(cifar100::TRAIN_FILE),
        ds_dir.join(cifar100::TEST_FILE),
    )?;
    let store = ds_dir.join(STORE_FILE);
    merge::write_store(&tree, &store, false)?;
    println!("Wrote {} samples to {}", tree.len(), store.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let verb = env::args().nth(1).unwrap_or_default();
    match verb.as_str() {
        "download" => download(),
        "mix" => mix(),
        "run" => {
            download()?;
            mix()
        }
        _ => Err("usage: cifar100-prep <download|mix|run>".into()),
    }
}
