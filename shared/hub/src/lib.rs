mod cache;
mod client;
mod env;
mod error;
mod info;
mod repo;

pub use cache::{
    cached_download, content_path, encode_etag, encode_url, head_download, metadata_path,
    DownloadMode, FetchOptions, HeadInfo, VerificationMode, CACHE_SUBDIR,
};
pub use client::{HubClient, HubResponse};
pub use env::{
    default_cache_dir, default_token, offline_default, CACHE_DIR_VAR, OFFLINE_VAR, TOKEN_VAR,
};
pub use error::HubError;
pub use info::{
    get_dataset_config_names, get_dataset_info, get_dataset_infos, get_dataset_split_names,
    DatasetInfo, Feature, SplitInfo,
};
pub use repo::{
    cache_scope, Listing, RemoteRepo, Repository, DEFAULT_ENDPOINT, DEFAULT_REVISION,
};
