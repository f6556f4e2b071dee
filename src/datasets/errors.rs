#[derive(Debug)]
pub enum LoadError {
    IoError(std::io::Error),
    PickleError(serde_pickle::Error),
    MissingKey(&'static str),
    Malformed(&'static str),
    LengthMismatch {
        coarse: usize,
        fine: usize,
        names: usize,
        data: usize,
    },
    CountMismatch {
        expected: usize,
        found: usize,
    },
    BadImageLen {
        expected: usize,
        found: usize,
    },
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{:?}", self))
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e)
    }
}

impl From<serde_pickle::Error> for LoadError {
    fn from(e: serde_pickle::Error) -> Self {
        Self::PickleError(e)
    }
}
