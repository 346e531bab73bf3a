// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! INI configuration loading.
//!
//! The base file may pull in more files through `include` (explicit
//! paths) and `include_dir` (recursive `*.ini` walk) in the `[gaffer]`
//! section; later files override earlier ones key by key. Endpoint and
//! process sections are collected across all files in declaration order.

use gaffer_core::{JobName, JobSpec, NameError, DEFAULT_GROUP};
use gaffer_keys::KeysConfig;
use gaffer_supervisor::{FlapGuard, ManagerConfig};
use indexmap::IndexMap;
use ini::Ini;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Listen backlog used when an endpoint does not set one.
pub const DEFAULT_BACKLOG: u32 = 128;

/// Socket name of the default endpoint, created in the system temp
/// directory when the config declares no endpoint at all.
pub const DEFAULT_SOCKET_NAME: &str = "gaffer.sock";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("invalid bind URI: {0:?} (expected tcp://host:port or unix:/path)")]
    InvalidBind(String),

    #[error("invalid value for {key:?} in [{section}]: {value:?}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },

    #[error(transparent)]
    Name(#[from] NameError),
}

/// Where an endpoint listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bind {
    /// `tcp://host:port`; the host is resolved at bind time.
    Tcp(String),
    /// `unix:/path`
    Unix(PathBuf),
}

impl Bind {
    pub fn parse(uri: &str) -> Result<Self, ConfigError> {
        if let Some(addr) = uri.strip_prefix("tcp://") {
            if addr.is_empty() {
                return Err(ConfigError::InvalidBind(uri.to_string()));
            }
            return Ok(Bind::Tcp(addr.to_string()));
        }
        if let Some(path) = uri.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(ConfigError::InvalidBind(uri.to_string()));
            }
            return Ok(Bind::Unix(PathBuf::from(path)));
        }
        Err(ConfigError::InvalidBind(uri.to_string()))
    }
}

impl std::fmt::Display for Bind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bind::Tcp(addr) => write!(f, "tcp://{addr}"),
            Bind::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// One `[endpoint:<name>]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub name: String,
    pub bind: Bind,
    pub backlog: u32,
    pub certfile: Option<PathBuf>,
    pub keyfile: Option<PathBuf>,
}

impl EndpointConfig {
    /// The section carries TLS material. Termination is delegated to
    /// the fronting transport layer; the bundled listener warns and
    /// serves plaintext.
    pub fn tls_requested(&self) -> bool {
        self.certfile.is_some() || self.keyfile.is_some()
    }
}

/// Fully loaded daemon configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory of the base config file; anchors the key database.
    pub config_dir: PathBuf,
    pub endpoints: Vec<EndpointConfig>,
    /// Declared jobs, in declaration order.
    pub processes: Vec<(JobName, JobSpec)>,
    /// When false every request is served under the dummy key.
    pub auth: bool,
    pub keys: KeysConfig,
    pub manager: ManagerConfig,
    pub log_file: Option<PathBuf>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let docs = read_with_includes(path)?;
        let config_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self::from_docs(&docs, config_dir)
    }

    fn from_docs(docs: &[Ini], config_dir: PathBuf) -> Result<Self, ConfigError> {
        let auth = get_bool(docs, "gaffer", "auth")?.unwrap_or(false);
        let keys = KeysConfig {
            backend: get_str(docs, "gaffer", "keys_backend")
                .unwrap_or_else(|| "default".to_string()),
            dbname: get_str(docs, "gaffer", "keys_dbname").unwrap_or_else(|| "keys.db".to_string()),
            config_dir: config_dir.clone(),
        };
        let manager = ManagerConfig {
            flap: FlapGuard {
                max_restarts: get_u32(docs, "gaffer", "restart_limit")?.unwrap_or(5) as usize,
                window: Duration::from_secs(
                    get_u32(docs, "gaffer", "restart_window_secs")?.unwrap_or(60).into(),
                ),
            },
            stop_grace: Duration::from_secs(
                get_u32(docs, "gaffer", "stop_grace_secs")?.unwrap_or(10).into(),
            ),
        };
        let log_file = get_str(docs, "gaffer", "log_file").map(PathBuf::from);

        Ok(Self {
            config_dir,
            endpoints: parse_endpoints(docs)?,
            processes: parse_processes(docs)?,
            auth,
            keys,
            manager,
            log_file,
        })
    }
}

/// The default endpoint used when the config declares none: a unix
/// socket in the system temp directory.
pub fn default_endpoint() -> EndpointConfig {
    EndpointConfig {
        name: "default".to_string(),
        bind: Bind::Unix(std::env::temp_dir().join(DEFAULT_SOCKET_NAME)),
        backlog: DEFAULT_BACKLOG,
        certfile: None,
        keyfile: None,
    }
}

/// Load the base file plus everything `include` / `include_dir` names.
/// Unreadable include files are skipped with a warning, matching the
/// lenient merge behavior of the original format.
fn read_with_includes(path: &Path) -> Result<Vec<Ini>, ConfigError> {
    let base = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut include_paths = Vec::new();
    if let Some(gaffer) = base.section(Some("gaffer")) {
        if let Some(includes) = gaffer.get("include") {
            include_paths.extend(includes.split_whitespace().map(PathBuf::from));
        }
        if let Some(dirs) = gaffer.get("include_dir") {
            for dir in dirs.split_whitespace() {
                collect_ini_files(Path::new(dir), &mut include_paths);
            }
        }
    }

    let mut docs = vec![base];
    for include in include_paths {
        match Ini::load_from_file(&include) {
            Ok(doc) => docs.push(doc),
            Err(e) => {
                tracing::warn!(path = %include.display(), error = %e, "skipping unreadable include");
            }
        }
    }
    Ok(docs)
}

/// Recursively gather `*.ini` files under `dir`, in directory order.
fn collect_ini_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        tracing::warn!(path = %dir.display(), "skipping unreadable include_dir");
        return;
    };
    let mut entries: Vec<_> = entries.filter_map(Result::ok).map(|e| e.path()).collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_ini_files(&path, out);
        } else if path.extension().is_some_and(|ext| ext == "ini") {
            out.push(path);
        }
    }
}

/// Last value wins across included files.
fn get_str(docs: &[Ini], section: &str, key: &str) -> Option<String> {
    docs.iter()
        .rev()
        .find_map(|doc| doc.section(Some(section)).and_then(|s| s.get(key)))
        .map(str::to_string)
}

fn get_bool(docs: &[Ini], section: &str, key: &str) -> Result<Option<bool>, ConfigError> {
    match get_str(docs, section, key) {
        Some(value) => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue {
                section: section.to_string(),
                key: key.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

fn get_u32(docs: &[Ini], section: &str, key: &str) -> Result<Option<u32>, ConfigError> {
    match get_str(docs, section, key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                section: section.to_string(),
                key: key.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Merge every `<prefix><name>` section across the loaded files into one
/// key/value map per name. A later file overrides only the keys it
/// names, matching how the original format's parser re-reads includes
/// into the same parser object.
fn merge_sections(docs: &[Ini], prefix: &str) -> IndexMap<String, IndexMap<String, String>> {
    let mut sections: IndexMap<String, IndexMap<String, String>> = IndexMap::new();
    for doc in docs {
        for (section, props) in doc.iter() {
            let Some(name) = section.and_then(|s| s.strip_prefix(prefix)) else {
                continue;
            };
            let merged = sections.entry(name.to_string()).or_default();
            for (key, value) in props.iter() {
                merged.insert(key.to_string(), value.to_string());
            }
        }
    }
    sections
}

fn parse_endpoints(docs: &[Ini]) -> Result<Vec<EndpointConfig>, ConfigError> {
    let declared: Vec<String> = get_str(docs, "gaffer", "http_endpoints")
        .map(|names| {
            names
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut endpoints = Vec::new();
    for (name, props) in merge_sections(docs, "endpoint:") {
        if !declared.iter().any(|d| d == &name) {
            continue;
        }
        let Some(uri) = props.get("bind") else {
            continue;
        };
        let backlog = match props.get("backlog") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                section: format!("endpoint:{name}"),
                key: "backlog".to_string(),
                value: value.to_string(),
            })?,
            None => DEFAULT_BACKLOG,
        };
        endpoints.push(EndpointConfig {
            bind: Bind::parse(uri)?,
            backlog,
            certfile: props.get("certfile").map(PathBuf::from),
            keyfile: props.get("keyfile").map(PathBuf::from),
            name,
        });
    }

    if endpoints.is_empty() {
        return Ok(vec![default_endpoint()]);
    }
    Ok(endpoints)
}

fn parse_processes(docs: &[Ini]) -> Result<Vec<(JobName, JobSpec)>, ConfigError> {
    let mut processes = Vec::new();
    for (name, props) in merge_sections(docs, "process:") {
        let section_name = format!("process:{name}");
        // an empty or missing cmd disables the section
        let Some(cmd) = props.get("cmd").filter(|c| !c.trim().is_empty()) else {
            continue;
        };

        let mut spec = JobSpec::new(cmd.as_str());
        let mut group = DEFAULT_GROUP.to_string();
        for (key, value) in &props {
            match key.as_str() {
                "cmd" => {}
                "group" => group = value.to_string(),
                "args" => spec.args = value.split_whitespace().map(str::to_string).collect(),
                "cwd" => spec.cwd = Some(PathBuf::from(value)),
                "uid" => spec.uid = Some(parse_num(&section_name, key, value)?),
                "gid" => spec.gid = Some(parse_num(&section_name, key, value)?),
                "detach" => {
                    spec.detach = parse_bool(value).ok_or_else(|| ConfigError::InvalidValue {
                        section: section_name.clone(),
                        key: key.to_string(),
                        value: value.to_string(),
                    })?;
                }
                "numprocesses" => {
                    spec.numprocesses = parse_num(&section_name, key, value)?;
                }
                "start" => {
                    spec.start = parse_bool(value).ok_or_else(|| ConfigError::InvalidValue {
                        section: section_name.clone(),
                        key: key.to_string(),
                        value: value.to_string(),
                    })?;
                }
                _ => {
                    if let Some(env_name) = key.strip_prefix("env:") {
                        spec.env.insert(env_name.to_string(), value.to_string());
                    }
                }
            }
        }

        let job_name = JobName::new(group, name)?;
        processes.push((job_name, spec));
    }
    Ok(processes)
}

fn parse_num(section: &str, key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
