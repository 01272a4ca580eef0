use std::path::Path;

use silo_hub::Listing;

/// Keeps entries matching the configuration name and the split. The two
/// filters are orthogonal; applying them in either order gives the same
/// listing.
pub fn by_config_and_split(
    listing: Listing,
    config_name: Option<&str>,
    split: Option<&str>,
) -> Listing {
    by_split(by_config(listing, config_name), split)
}

/// Configuration files conventionally live under a directory named after
/// the configuration (`sst2/train.parquet`), so the whole path is matched.
pub fn by_config(listing: Listing, config_name: Option<&str>) -> Listing {
    match config_name {
        Some(name) => listing
            .into_iter()
            .filter(|(filename, _)| filename.contains(name))
            .collect(),
        None => listing,
    }
}

/// Splits are encoded in the basename (`train.csv`, `train-00000.parquet`),
/// so directories and extensions are ignored.
pub fn by_split(listing: Listing, split: Option<&str>) -> Listing {
    match split {
        Some(split) => listing
            .into_iter()
            .filter(|(filename, _)| basename(filename).contains(split))
            .collect(),
        None => listing,
    }
}

fn basename(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename)
}
