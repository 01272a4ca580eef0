use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{bearer_header, error_for_status, HubClient};
use crate::env;
use crate::error::HubError;
use crate::repo::RemoteRepo;

/// One column of a dataset configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: Option<String>,
    pub dtype: Option<String>,
}

/// One named partition and its advertised size.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitInfo {
    pub name: Option<String>,
    pub num_examples: Option<u64>,
}

/// Metadata for one configuration of a dataset, as published on the card.
/// Missing fields stay `None`; unrecognized keys are ignored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub config_name: Option<String>,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub license: Option<String>,
    pub citation: Option<String>,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub splits: Vec<SplitInfo>,
}

impl DatasetInfo {
    pub fn from_value(value: &Value) -> Result<Self, HubError> {
        serde_json::from_value(value.clone())
            .map_err(|err| HubError::BadConfig(format!("malformed dataset_info entry: {err}")))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Raw dataset metadata from the hub's info endpoint.
pub async fn get_dataset_info(
    client: &HubClient,
    repo: &RemoteRepo,
) -> Result<serde_json::Map<String, Value>, HubError> {
    let url = repo.info_url();
    let mut headers = HeaderMap::new();
    if let Some(token) = env::valid_token(repo.auth_token.as_deref()) {
        headers.insert(AUTHORIZATION, bearer_header(token)?);
    }
    let response = client.request(Method::GET, &url, headers).await?;
    if !(200..300).contains(&response.status) {
        return Err(error_for_status(response.status, &response.headers, &url));
    }
    let value: Value = serde_json::from_slice(&response.body).map_err(|err| {
        HubError::BadConfig(format!(
            "failed parsing dataset info of {}: {err}",
            repo.repo_id
        ))
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(HubError::BadConfig(format!(
            "dataset info of {} is not a JSON object",
            repo.repo_id
        ))),
    }
}

/// Parsed `cardData.dataset_info` entries. The card publishes either an
/// array of configurations or a single object; both are accepted.
pub async fn get_dataset_infos(
    client: &HubClient,
    repo: &RemoteRepo,
) -> Result<Vec<DatasetInfo>, HubError> {
    let raw = get_dataset_info(client, repo).await?;
    match raw.get("cardData").and_then(|card| card.get("dataset_info")) {
        Some(value) => parse_dataset_infos(value),
        None => Ok(Vec::new()),
    }
}

pub async fn get_dataset_split_names(
    client: &HubClient,
    repo: &RemoteRepo,
) -> Result<Vec<String>, HubError> {
    let infos = get_dataset_infos(client, repo).await?;
    let mut names: Vec<String> = Vec::new();
    for info in &infos {
        for split in &info.splits {
            if let Some(name) = &split.name {
                if !names.iter().any(|seen| seen == name) {
                    names.push(name.clone());
                }
            }
        }
    }
    Ok(names)
}

pub async fn get_dataset_config_names(
    client: &HubClient,
    repo: &RemoteRepo,
) -> Result<Vec<String>, HubError> {
    let infos = get_dataset_infos(client, repo).await?;
    let mut names: Vec<String> = Vec::new();
    for info in &infos {
        if let Some(name) = &info.config_name {
            if !names.iter().any(|seen| seen == name) {
                names.push(name.clone());
            }
        }
    }
    Ok(names)
}

fn parse_dataset_infos(value: &Value) -> Result<Vec<DatasetInfo>, HubError> {
    match value {
        Value::Array(items) => items.iter().map(DatasetInfo::from_value).collect(),
        Value::Object(_) => Ok(vec![DatasetInfo::from_value(value)?]),
        _ => Err(HubError::BadConfig(
            "dataset_info is neither an object nor an array".into(),
        )),
    }
}
