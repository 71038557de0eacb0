use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle position of a build as reported by TeamCity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BuildState {
    Queued,
    Running,
    Finished,
    #[default]
    Unknown,
}

impl From<String> for BuildState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "finished" => Self::Finished,
            _ => Self::Unknown,
        }
    }
}

impl From<BuildState> for String {
    fn from(value: BuildState) -> Self {
        value.to_string()
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Unknown => "unknown",
        })
    }
}

/// Outcome of a build. `ERROR` builds count as failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BuildStatus {
    Success,
    Failure,
    #[default]
    Unknown,
}

impl From<String> for BuildStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "SUCCESS" => Self::Success,
            "FAILURE" | "ERROR" => Self::Failure,
            _ => Self::Unknown,
        }
    }
}

impl From<BuildStatus> for String {
    fn from(value: BuildStatus) -> Self {
        value.to_string()
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// A queued or running build, refreshed in place while it is watched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    pub id: i64,
    /// Server-relative locator used to re-fetch this build
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub build_type_id: String,
    #[serde(default)]
    pub state: BuildState,
    #[serde(default)]
    pub status: BuildStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
}

impl BuildRecord {
    /// Task identifier carried in the locator, e.g. `21766` for `.../buildQueue/id:21766`.
    pub fn task_id(&self) -> Option<&str> {
        self.href
            .split_once(':')
            .map(|(_, id)| id)
            .filter(|id| !id.is_empty())
    }

    /// Copies the fields that change over a build's lifetime. Identity
    /// (`id`, `href`, `build_type_id`) is kept.
    pub fn update_from(&mut self, latest: BuildRecord) {
        self.state = latest.state;
        self.status = latest.status;
        if latest.status_text.is_some() {
            self.status_text = latest.status_text;
        }
        if latest.branch_name.is_some() {
            self.branch_name = latest.branch_name;
        }
        if latest.number.is_some() {
            self.number = latest.number;
        }
        if latest.web_url.is_some() {
            self.web_url = latest.web_url;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == BuildState::Finished
    }
}

/// What to build: a build configuration and the branch to build it on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub config_id: String,
    pub branch: String,
}

impl BuildRequest {
    pub fn new(config_id: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            config_id: config_id.into(),
            branch: branch.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.config_id.trim().is_empty() && !self.branch.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTypeSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Response from TeamCity for the build configuration listing.
#[derive(Debug, Deserialize)]
pub(super) struct BuildTypesResponse {
    #[serde(default, rename = "buildType")]
    pub build_types: Vec<BuildTypeSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct ArtifactFile {
    pub name: String,
}

/// Response from TeamCity for a build's top level artifacts.
#[derive(Debug, Deserialize)]
pub(super) struct ArtifactsResponse {
    #[serde(default)]
    pub file: Vec<ArtifactFile>,
}

/// Body posted to the build queue.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct QueueBuildBody<'a> {
    pub build_type: BuildTypeRef<'a>,
    pub branch_name: &'a str,
    pub properties: Properties<'a>,
}

#[derive(Debug, Serialize)]
pub(super) struct BuildTypeRef<'a> {
    pub id: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct Properties<'a> {
    pub property: Vec<Property<'a>>,
}

#[derive(Debug, Serialize)]
pub(super) struct Property<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl<'a> QueueBuildBody<'a> {
    pub fn new(config_id: &'a str, branch: &'a str, params: &'a BTreeMap<String, String>) -> Self {
        Self {
            build_type: BuildTypeRef { id: config_id },
            branch_name: branch,
            properties: Properties {
                property: params
                    .iter()
                    .map(|(name, value)| Property { name, value })
                    .collect(),
            },
        }
    }
}

/// Extracts `<version>` from an artifact named `<name>.v<version>.zip`.
pub fn parse_artifact_version(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(".zip")?;
    let (name, version) = stem.rsplit_once(".v")?;
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some(version.to_string())
}
