//! Persisted node facts: one YAML file per node.
//!
//! Extracted facts are written as `{nodes: {<nodename>: ...}, version}` with
//! one file per node. Loading merges every file in a directory back into a
//! single structure; mixing fact-format versions is a hard error.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Version written into fact files this client generates.
pub const FACT_VERSION: &str = "batfish_v0";

/// Facts about a set of nodes, as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facts {
    pub nodes: BTreeMap<String, Value>,
    pub version: String,
}

impl Facts {
    pub fn new(nodes: BTreeMap<String, Value>) -> Facts {
        Facts {
            nodes,
            version: FACT_VERSION.to_string(),
        }
    }
}

/// Writes one `<node>.yml` per node under `dir`, creating it if needed.
pub fn write_facts(dir: &Path, facts: &Facts) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for (node, data) in &facts.nodes {
        let single = Facts {
            nodes: BTreeMap::from([(node.clone(), data.clone())]),
            version: facts.version.clone(),
        };
        let rendered = serde_yaml::to_string(&single)
            .map_err(|e| Error::Deserialization(format!("facts for {}: {}", node, e)))?;
        std::fs::write(dir.join(format!("{}.yml", node)), rendered)?;
    }
    Ok(())
}

/// Loads every fact file in `dir` and merges them into one structure.
///
/// Two files with differing `version` strings are a hard error, not a
/// best-effort merge.
pub fn load_facts(dir: &Path) -> Result<Facts> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yml") | Some("yaml")
            )
        })
        .collect();
    paths.sort();

    let mut merged: Option<Facts> = None;
    for path in paths {
        let text = std::fs::read_to_string(&path)?;
        let facts: Facts = serde_yaml::from_str(&text)
            .map_err(|e| Error::Deserialization(format!("{}: {}", path.display(), e)))?;
        match &mut merged {
            None => merged = Some(facts),
            Some(accumulated) => {
                if accumulated.version != facts.version {
                    return Err(Error::Deserialization(format!(
                        "fact version mismatch: {} has version {}, expected {}",
                        path.display(),
                        facts.version,
                        accumulated.version
                    )));
                }
                accumulated.nodes.extend(facts.nodes);
            }
        }
    }
    merged.ok_or_else(|| {
        Error::Validation(format!("no fact files found in {}", dir.display()))
    })
}
