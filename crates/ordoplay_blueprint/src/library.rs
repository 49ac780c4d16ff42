// SPDX-License-Identifier: MIT OR Apache-2.0
//! Loading and caching of nested graphs.
//!
//! Function-call nodes refer to other graphs by library path. Before a
//! graph is instantiated, [`GraphLibrary::preload`] fetches every graph it
//! calls (recursively), builds one [`CallableGraph`] per path and caches it.
//! The cache is write-once per path; cached callables are immutable and
//! shared by every call site.

use crate::callable::CallableGraph;
use crate::compiler::CompileError;
use crate::dag::LinkPolicy;
use crate::graph::{Graph, GraphDescription, GraphError};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Error loading a nested graph
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Source could not provide the graph
    #[error("Failed to fetch `{path}`: {source}")]
    Fetch {
        /// Library path
        path: String,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Graph text is malformed
    #[error("Failed to parse `{path}`: {source}")]
    Parse {
        /// Library path
        path: String,
        /// Decoding error
        source: GraphError,
    },

    /// Graph calls itself, directly or through other graphs
    #[error("Graph `{path}` calls itself through {}", .chain.join(" -> "))]
    Recursive {
        /// Library path
        path: String,
        /// Load chain that led back to `path`
        chain: Vec<String>,
    },

    /// Graph does not compile as a function body
    #[error("Graph `{path}` is not a valid function: {source}")]
    Invalid {
        /// Library path
        path: String,
        /// Compile failure
        source: Box<CompileError>,
    },
}

/// Storage that can provide graph text by library path
pub trait GraphSource: Send + Sync {
    /// Fetch the JSON description stored at `path`
    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, io::Result<String>>;
}

/// Graphs stored as files below a root directory
#[derive(Debug, Clone)]
pub struct FsGraphSource {
    root: PathBuf,
}

impl FsGraphSource {
    /// Resolve library paths relative to `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl GraphSource for FsGraphSource {
    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, io::Result<String>> {
        let full_path = self.root.join(path);
        async move { tokio::fs::read_to_string(full_path).await }.boxed()
    }
}

/// Graphs held in memory, keyed by path
#[derive(Debug, Default)]
pub struct MemoryGraphSource {
    graphs: RwLock<HashMap<String, String>>,
}

impl MemoryGraphSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Store graph text under `path`
    pub fn insert(&self, path: impl Into<String>, text: impl Into<String>) {
        self.graphs.write().insert(path.into(), text.into());
    }
}

impl GraphSource for MemoryGraphSource {
    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, io::Result<String>> {
        let result = self.graphs.read().get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no graph stored at `{path}`"))
        });
        futures::future::ready(result).boxed()
    }
}

/// Cache of callable graphs, keyed by library path
pub struct GraphLibrary {
    source: Arc<dyn GraphSource>,
    policy: LinkPolicy,
    loaded: RwLock<HashMap<String, Arc<CallableGraph>>>,
    failed: RwLock<HashMap<String, String>>,
}

impl GraphLibrary {
    /// Create an empty library over `source`
    pub fn new(source: Arc<dyn GraphSource>, policy: LinkPolicy) -> Self {
        Self {
            source,
            policy,
            loaded: RwLock::new(HashMap::new()),
            failed: RwLock::new(HashMap::new()),
        }
    }

    /// Cached callable for `path`
    pub fn get(&self, path: &str) -> Option<Arc<CallableGraph>> {
        self.loaded.read().get(path).cloned()
    }

    /// Number of cached callables
    pub fn len(&self) -> usize {
        self.loaded.read().len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.loaded.read().is_empty()
    }

    /// Load `path` and everything it calls
    pub async fn load(&self, path: &str) -> Result<Arc<CallableGraph>, LoadError> {
        self.load_chain(path.to_string(), Vec::new()).await
    }

    fn load_chain<'a>(
        &'a self,
        path: String,
        chain: Vec<String>,
    ) -> BoxFuture<'a, Result<Arc<CallableGraph>, LoadError>> {
        async move {
            if let Some(callable) = self.get(&path) {
                tracing::debug!("Graph library hit: {path}");
                return Ok(callable);
            }
            if chain.contains(&path) {
                return Err(LoadError::Recursive { path, chain });
            }
            tracing::debug!("Graph library miss: {path}");

            let text = self.source.fetch(&path).await.map_err(|source| LoadError::Fetch {
                path: path.clone(),
                source,
            })?;
            let description = GraphDescription::from_json(&text).map_err(|source| {
                LoadError::Parse {
                    path: path.clone(),
                    source,
                }
            })?;

            let mut chain = chain;
            chain.push(path.clone());
            for callee in description.call_paths() {
                self.load_chain(callee.to_string(), chain.clone()).await?;
            }

            let graph = self.instantiate(&description).map_err(|source| LoadError::Parse {
                path: path.clone(),
                source,
            })?;
            let callable =
                CallableGraph::new(path.clone(), graph, self.policy).map_err(|source| {
                    LoadError::Invalid {
                        path: path.clone(),
                        source: Box::new(source),
                    }
                })?;

            let callable = self
                .loaded
                .write()
                .entry(path)
                .or_insert_with(|| Arc::new(callable))
                .clone();
            Ok(callable)
        }
        .boxed()
    }

    /// Load every graph `description` calls.
    ///
    /// Failures are logged and remembered; the matching call nodes become
    /// unresolved and fail only the roots that reach them.
    pub async fn preload(&self, description: &GraphDescription) {
        for path in description.call_paths() {
            if self.get(path).is_some() {
                continue;
            }
            if let Err(err) = self.load(path).await {
                tracing::error!("Failed to load nested graph {path}: {err}");
                self.failed.write().insert(path.to_string(), err.to_string());
            }
        }
    }

    /// Build a graph whose calls resolve against this library
    pub fn instantiate(&self, description: &GraphDescription) -> Result<Graph, GraphError> {
        Graph::from_description(description, |path| {
            self.get(path).ok_or_else(|| {
                self.failed
                    .read()
                    .get(path)
                    .cloned()
                    .unwrap_or_else(|| "not loaded".to_string())
            })
        })
    }

    /// Preload, then instantiate
    pub async fn load_graph(&self, description: &GraphDescription) -> Result<Graph, GraphError> {
        self.preload(description).await;
        self.instantiate(description)
    }
}
