use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
    process::Command,
};

use curl::easy::Easy;
use flate2::read::GzDecoder;

#[derive(Debug)]
pub enum FetchError {
    IoError(std::io::Error),
    CurlError(curl::Error),
    ZipError(zip::result::ZipError),
    UnsupportedProtocol(String),
    UnsupportedFormat(String),
    Md5Mismatch,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:?}", self))
    }
}

impl std::error::Error for FetchError {}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e)
    }
}

impl From<curl::Error> for FetchError {
    fn from(e: curl::Error) -> Self {
        Self::CurlError(e)
    }
}

impl From<zip::result::ZipError> for FetchError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::ZipError(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    Zip,
    Rar,
}

impl ArchiveFormat {
    pub fn parse(s: &str) -> Result<Self, FetchError> {
        match s {
            "tar" => Ok(Self::Tar),
            "tar.gz" | "tgz" => Ok(Self::TarGz),
            "zip" => Ok(Self::Zip),
            "rar" => Ok(Self::Rar),
            _ => Err(FetchError::UnsupportedFormat(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Extract {
    Auto,
    Format(ArchiveFormat),
}

/// Joins every extension segment after the first dot, so
/// `cifar-100-python.tar.gz` resolves to the `tar.gz` format.
pub fn infer_format(filename: &str) -> Result<ArchiveFormat, FetchError> {
    let chain = match filename.split_once('.') {
        Some((_, rest)) => rest,
        None => "",
    };
    ArchiveFormat::parse(chain)
}

/// Downloads `url` to `dst_dir/filename`, creating `dst_dir` if needed.
///
/// Returns immediately if the file is already present; the archive is then
/// assumed to have been extracted by the earlier run. Protocol and extract
/// format are validated before any I/O happens.
pub fn fetch<P: AsRef<Path>>(
    url: &str,
    dst_dir: P,
    filename: &str,
    extract: Option<Extract>,
) -> Result<(), FetchError> {
    let dst_dir = dst_dir.as_ref();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(FetchError::UnsupportedProtocol(url.to_string()));
    }
    let format = match extract {
        Some(Extract::Auto) => Some(infer_format(filename)?),
        Some(Extract::Format(f)) => Some(f),
        None => None,
    };

    fs::create_dir_all(dst_dir)?;
    let filepath = dst_dir.join(filename);
    if filepath.exists() {
        println!("File {} already exists, skipping download.", filepath.display());
        return Ok(());
    }

    println!("Downloading {url} to {}", filepath.display());
    download_http(url, &filepath)?;
    if let Some(format) = format {
        extract_archive(&filepath, dst_dir, format)?;
    }
    Ok(())
}

fn download_http(url: &str, filepath: &Path) -> Result<(), FetchError> {
    let mut easy = Easy::new();
    easy.url(url)?;
    easy.progress(true)?;
    easy.follow_location(true)?;

    let mut out = BufWriter::new(File::create(filepath)?);
    let mut received: u64 = 0;
    let mut write_err: Option<std::io::Error> = None;
    let performed = {
        let mut dl = easy.transfer();
        let pb = indicatif::ProgressBar::new(1);
        dl.progress_function(move |total_dl, cur_dl, _, _| {
            pb.set_length(total_dl as u64);
            pb.set_position(cur_dl as u64);
            true
        })?;
        dl.write_function(|data| match out.write_all(data) {
            Ok(()) => {
                received += data.len() as u64;
                Ok(data.len())
            }
            Err(e) => {
                // returning a short count aborts the transfer
                write_err = Some(e);
                Ok(0)
            }
        })?;
        dl.perform()
    };
    if let Some(e) = write_err {
        return Err(FetchError::IoError(e));
    }
    performed?;
    out.flush()?;

    let expected = easy.content_length_download().unwrap_or(-1.0);
    if expected > 0.0 && received != expected as u64 {
        println!(
            "Warning: expected {} bytes but received {received}.",
            expected as u64
        );
    }
    Ok(())
}

pub fn verify_md5<P: AsRef<Path>>(path: P, md5: &str) -> Result<(), FetchError> {
    println!("Verifying hash is {md5}");
    let bytes = fs::read(path)?;
    let digest = md5::compute(&bytes);
    if format!("{:?}", digest) != md5 {
        return Err(FetchError::Md5Mismatch);
    }
    Ok(())
}

fn extract_archive(filepath: &Path, dst_dir: &Path, format: ArchiveFormat) -> Result<(), FetchError> {
    println!("Extracting {} using {:?} format", filepath.display(), format);
    match format {
        ArchiveFormat::Tar => {
            let f = File::open(filepath)?;
            let mut archive = tar::Archive::new(BufReader::new(f));
            archive.unpack(dst_dir)?;
        }
        ArchiveFormat::TarGz => {
            let f = File::open(filepath)?;
            let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(f)));
            archive.unpack(dst_dir)?;
        }
        ArchiveFormat::Zip => {
            let f = File::open(filepath)?;
            zip::ZipArchive::new(f)?.extract(dst_dir)?;
        }
        ArchiveFormat::Rar => {
            // needs the non-free rar module of p7zip on the system
            let status = Command::new("7z")
                .arg("x")
                .arg(filepath)
                .arg(format!("-o{}", dst_dir.display()))
                .status()?;
            if !status.success() {
                println!("Error extracting rar {}: {status}", filepath.display());
            }
        }
    }
    Ok(())
}
