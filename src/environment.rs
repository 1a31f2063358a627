use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::info;

use crate::artifact::ArtifactLocation;

/// Layer IDs share one counter so every layer built in the process is distinct
static LAYER_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("artifact {path} is no longer a readable file")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("an execution environment is already installed (layer {installed})")]
    AlreadyInstalled { installed: u64 },
}

/// One layer of plugin code resolution, chained to the layer it was built on
#[derive(Debug)]
pub struct ExecutionEnvironment {
    id: u64,
    parent: Option<Arc<ExecutionEnvironment>>,
    artifacts: Vec<ArtifactLocation>,
}

impl ExecutionEnvironment {
    /// The environment the process starts with: nothing beyond what the
    /// interpreter already sees
    pub fn root() -> Arc<Self> {
        Arc::new(Self::layer(None, Vec::new()))
    }

    fn layer(parent: Option<Arc<ExecutionEnvironment>>, artifacts: Vec<ArtifactLocation>) -> Self {
        Self {
            id: LAYER_COUNTER.fetch_add(1, Ordering::SeqCst),
            parent,
            artifacts,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn parent(&self) -> Option<&Arc<ExecutionEnvironment>> {
        self.parent.as_ref()
    }

    /// Number of layers below this one
    pub fn depth(&self) -> usize {
        self.parent.as_ref().map_or(0, |parent| parent.depth() + 1)
    }

    /// Artifacts contributed by this layer alone
    pub fn artifacts(&self) -> &[ArtifactLocation] {
        &self.artifacts
    }

    /// Artifacts of this layer followed by those of every parent layer
    pub fn all_artifacts(&self) -> Vec<&ArtifactLocation> {
        let mut all: Vec<&ArtifactLocation> = self.artifacts.iter().collect();
        if let Some(parent) = &self.parent {
            all.extend(parent.all_artifacts());
        }
        all
    }

    /// Find the archive providing `module_name`, nearest layer first
    pub fn resolve(&self, module_name: &str) -> Option<&ArtifactLocation> {
        self.artifacts
            .iter()
            .find(|artifact| artifact.module_name() == module_name)
            .or_else(|| {
                self.parent
                    .as_ref()
                    .and_then(|parent| parent.resolve(module_name))
            })
    }

    /// Module search path entries in resolution order
    pub fn search_path(&self) -> Vec<PathBuf> {
        self.all_artifacts()
            .into_iter()
            .map(|artifact| artifact.path().to_path_buf())
            .collect()
    }
}

/// Build one new layer over `parent` from a flat artifact collection
///
/// Scan results from several directories are expected to be merged by the caller
/// and land in this single layer. Repeated paths are collapsed.
pub fn build_layered_environment(
    parent: Arc<ExecutionEnvironment>,
    artifacts: impl IntoIterator<Item = ArtifactLocation>,
) -> Result<ExecutionEnvironment, EnvironmentError> {
    let mut seen = BTreeSet::new();
    let mut layer = Vec::new();

    for artifact in artifacts {
        if !seen.insert(artifact.path().to_path_buf()) {
            continue;
        }

        let metadata = fs::metadata(artifact.path()).map_err(|source| EnvironmentError::Unreadable {
            path: artifact.path().to_path_buf(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(EnvironmentError::Unreadable {
                path: artifact.path().to_path_buf(),
                source: std::io::Error::other("not a regular file"),
            });
        }

        layer.push(artifact);
    }

    Ok(ExecutionEnvironment::layer(Some(parent), layer))
}

/// Holds the execution environment installed during bootstrap
///
/// Created once by the entry point and passed by reference to each bootstrap
/// step. The environment can be installed exactly once.
#[derive(Debug, Default)]
pub struct BootstrapContext {
    environment: OnceLock<Arc<ExecutionEnvironment>>,
}

impl BootstrapContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(
        &self,
        environment: ExecutionEnvironment,
    ) -> Result<Arc<ExecutionEnvironment>, EnvironmentError> {
        if let Some(installed) = self.environment.get() {
            return Err(EnvironmentError::AlreadyInstalled {
                installed: installed.id(),
            });
        }

        let environment = Arc::new(environment);
        self.environment
            .set(Arc::clone(&environment))
            .map_err(|_| EnvironmentError::AlreadyInstalled {
                installed: self.environment.get().map_or(0, |env| env.id()),
            })?;

        info!(
            layer = environment.id(),
            artifacts = environment.artifacts().len(),
            "installed execution environment"
        );
        Ok(environment)
    }

    /// The installed environment, if bootstrap got that far
    pub fn environment(&self) -> Option<&Arc<ExecutionEnvironment>> {
        self.environment.get()
    }
}
