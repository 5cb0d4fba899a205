// Payload shapes returned by the platform. Everything is transient: built
// from one response, rendered, dropped. Fields the API sometimes omits or
// nulls are optional or defaulted rather than failing the whole decode.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One row of the machine listing.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineSummary {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub difficulty_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub auth_user_in_user_owns: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub auth_user_in_root_owns: bool,
}

/// Full machine profile.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub active: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub retired: bool,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub difficulty_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub auth_user_in_user_owns: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub auth_user_in_root_owns: bool,
    #[serde(default)]
    pub auth_user_first_user_time: Option<String>,
    #[serde(default)]
    pub auth_user_first_root_time: Option<String>,
    #[serde(default)]
    pub own_rank: Option<Value>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default, rename = "info_status")]
    pub description: Option<String>,
}

/// The season-scoped release arena machine.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReleaseMachine {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub difficulty_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_owned_user: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_owned_root: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub play_info: PlayInfo,
    #[serde(default, rename = "info_status")]
    pub description: Option<String>,
}

impl ReleaseMachine {
    pub fn is_spawned(&self) -> bool {
        self.play_info.is_spawned
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PlayInfo {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_spawned: bool,
}

/// One row of the sherlock listing.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Sherlock {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub category_id: Option<u64>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_owned: bool,
    #[serde(default)]
    pub release_date: Option<String>,
}

/// The `play` view of a sherlock.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SherlockDetail {
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub creators: Vec<Creator>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Creator {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Task {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub masked_flag: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub completed: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SherlockProgress {
    #[serde(default, rename = "progress", deserialize_with = "nullable")]
    pub percentage: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub total_tasks: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub tasks_answered: u64,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_owned: bool,
}

/// Reply to a mutating call. `success` is only present on the v5 shape.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct MutationReply {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: String,
}

/// Date part of an ISO-8601 timestamp: `2024-03-02T19:00:00Z` -> `2024-03-02`.
pub fn date_only(timestamp: &str) -> &str {
    timestamp.split('T').next().unwrap_or(timestamp)
}

/// The API is inconsistent about booleans: `true`, `1`, `"1"` and null all
/// show up for the same field.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        _ => false,
    })
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
