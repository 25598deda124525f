use clap::ValueEnum;

/// Attribute used to order the images of a loaded series
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    InstanceNumber,
    SliceLocation,
    TablePosition,
    None,
}

/// How [`SeriesReader::update`](crate::series_reader::SeriesReader::update)
/// waits for the background workers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdateMode {
    /// Return once every file has been processed
    #[default]
    Blocking,
    /// Return as soon as the first file has been processed, keep loading in
    /// the background
    MinimalContinuing,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    PartiallyComplete,
    Completed,
    Cancelled,
}

/// Coarse type family of a value representation, deciding which accessors
/// can interpret a value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueFamily {
    Textual,
    NumericText,
    Sequence,
    Binary,
}
