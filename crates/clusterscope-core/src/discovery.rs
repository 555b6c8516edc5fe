use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use kube::config::Kubeconfig;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    Gke,
    Eks,
    Aks,
    Kind,
    Minikube,
    K3s,
    DockerDesktop,
    Generic,
}

impl Provider {
    /// Best-effort guess from the kubeconfig path and context name.
    pub fn infer(path: &Path, context: &str) -> Self {
        let probe = format!("{} {}", path.display(), context).to_lowercase();
        if probe.contains("gke") {
            Self::Gke
        } else if probe.contains("eks") {
            Self::Eks
        } else if probe.contains("aks") {
            Self::Aks
        } else if probe.contains("kind") {
            Self::Kind
        } else if probe.contains("minikube") {
            Self::Minikube
        } else if probe.contains("k3d") || probe.contains("k3s") {
            Self::K3s
        } else if probe.contains("docker") {
            Self::DockerDesktop
        } else {
            Self::Generic
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Gke => "gke",
            Self::Eks => "eks",
            Self::Aks => "aks",
            Self::Kind => "kind",
            Self::Minikube => "minikube",
            Self::K3s => "k3s",
            Self::DockerDesktop => "docker-desktop",
            Self::Generic => "generic",
        };
        f.write_str(label)
    }
}

/// A kubeconfig context as found on disk. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextDescriptor {
    pub name: String,
    pub cluster: String,
    pub namespace: Option<String>,
    pub server: Option<String>,
    pub source: PathBuf,
    pub provider: Provider,
}

/// Where kubeconfig files are looked up, in priority order.
#[derive(Debug, Clone, Default)]
pub struct KubeconfigSources {
    kubeconfig_env: Option<OsString>,
    home: Option<PathBuf>,
    extra: Vec<String>,
}

impl KubeconfigSources {
    pub fn new(kubeconfig_env: Option<OsString>, home: Option<PathBuf>, extra: Vec<String>) -> Self {
        Self { kubeconfig_env, home, extra }
    }

    pub fn from_env(extra: &[String]) -> Self {
        Self::new(std::env::var_os("KUBECONFIG"), dirs::home_dir(), extra.to_vec())
    }

    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        let home = self.home.as_deref();
        let mut candidates = Vec::new();

        if let Some(paths) = &self.kubeconfig_env {
            for path in std::env::split_paths(paths).filter(|p| !p.as_os_str().is_empty()) {
                if let Some(expanded) = expand_path(&path.to_string_lossy(), home) {
                    candidates.push(expanded);
                }
            }
        }

        if let Some(home) = home {
            let kube_dir = home.join(".kube");
            candidates.push(kube_dir.join("config"));
            candidates.extend(yaml_files_in(&kube_dir));
            candidates.extend(yaml_files_in(&kube_dir.join("config.d")));
        }

        candidates.extend(self.extra.iter().filter_map(|raw| expand_path(raw, home)));

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|path| path.is_file())
            .filter(|path| seen.insert(std::fs::canonicalize(path).unwrap_or_else(|_| path.clone())))
            .collect()
    }

    /// Contexts across all candidate files, first occurrence of a name wins.
    pub fn discover(&self) -> Vec<ContextDescriptor> {
        let mut names = HashSet::new();
        let mut found = Vec::new();

        for path in self.candidate_paths() {
            let contexts = match contexts_in(&path) {
                Ok(contexts) => contexts,
                Err(e) => {
                    debug!(path = %path.display(), "Skipping kubeconfig: {e}");
                    continue;
                }
            };
            for descriptor in contexts {
                if names.insert(descriptor.name.clone()) {
                    found.push(descriptor);
                } else {
                    debug!(context = %descriptor.name, path = %path.display(), "Duplicate context ignored");
                }
            }
        }

        found
    }
}

pub fn contexts_in(path: &Path) -> Result<Vec<ContextDescriptor>> {
    let kubeconfig = Kubeconfig::read_from(path)?;

    let descriptors = kubeconfig
        .contexts
        .iter()
        .map(|named| {
            let context = named.context.as_ref();
            let cluster = context.map(|c| c.cluster.clone()).unwrap_or_default();
            let server = kubeconfig
                .clusters
                .iter()
                .find(|c| c.name == cluster)
                .and_then(|c| c.cluster.as_ref())
                .and_then(|c| c.server.clone());

            ContextDescriptor {
                name: named.name.clone(),
                namespace: context.and_then(|c| c.namespace.clone()),
                server,
                source: path.to_path_buf(),
                provider: Provider::infer(path, &named.name),
                cluster,
            }
        })
        .collect();

    Ok(descriptors)
}

/// Expands `$VAR`, `${VAR}` and a leading `~`. Returns `None` for blank input.
pub fn expand_path(raw: &str, home: Option<&Path>) -> Option<PathBuf> {
    let expanded = expand_env(raw.trim());
    if expanded.is_empty() {
        return None;
    }

    if let Some(rest) = expanded.strip_prefix('~') {
        if let Some(home) = home {
            let rest = rest.trim_start_matches(['/', '\\']);
            return Some(if rest.is_empty() { home.to_path_buf() } else { home.join(rest) });
        }
    }

    Some(PathBuf::from(expanded))
}

fn expand_env(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }

        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if braced && chars.peek() == Some(&'}') {
            chars.next();
        }

        if name.is_empty() {
            out.push('$');
            if braced {
                out.push('{');
            }
            continue;
        }
        out.push_str(&std::env::var(&name).unwrap_or_default());
    }

    out
}

fn yaml_files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml")))
        .collect();
    files.sort();
    files
}
