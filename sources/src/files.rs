//! Local files a tenant may use in place of, or in addition to, the upstream sources.

use crate::errors::SourceError;
use generator::webapi::Endpoint;
use ini::{Ini, ParseOption};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Reads a topology file: a JSON array of endpoints in the WebAPI shape.
pub fn load_topology_file(path: &Path) -> Result<Vec<Endpoint>, SourceError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&contents).map_err(|source| SourceError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Deserialize)]
struct AgentsFile {
    #[serde(default)]
    agents: BTreeMap<String, Subscriptions>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Subscriptions {
    List(Vec<String>),
    Joined(String),
}

impl Subscriptions {
    fn into_vec(self) -> Vec<String> {
        let items = match self {
            Subscriptions::List(items) => items,
            Subscriptions::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        };

        items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }
}

/// Reads the agents file, mapping each agent to the subscriptions it must carry.
///
/// `.ini` and `.conf` files carry the mapping in an `[AGENTS]` section, anything
/// else is YAML with an `agents:` key.
pub fn load_agents_file(path: &Path) -> Result<BTreeMap<String, Vec<String>>, SourceError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_ini = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "ini" || ext == "conf");
    if is_ini {
        return agents_from_ini(path, &contents);
    }

    let file: AgentsFile = serde_yaml::from_str(&contents).map_err(|source| SourceError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(file
        .agents
        .into_iter()
        .map(|(agent, subscriptions)| (agent, subscriptions.into_vec()))
        .collect())
}

fn agents_from_ini(path: &Path, contents: &str) -> Result<BTreeMap<String, Vec<String>>, SourceError> {
    let options = ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..Default::default()
    };
    let ini = Ini::load_from_str_opt(contents, options).map_err(|source| SourceError::IniParse {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(ini
        .section(Some("AGENTS"))
        .map(|agents| {
            agents
                .iter()
                .map(|(agent, subscriptions)| {
                    let subscriptions = Subscriptions::Joined(subscriptions.to_string());
                    (agent.to_string(), subscriptions.into_vec())
                })
                .collect()
        })
        .unwrap_or_default())
}
