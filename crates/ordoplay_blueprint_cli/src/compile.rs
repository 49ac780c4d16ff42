// SPDX-License-Identifier: MIT OR Apache-2.0
//! One compile pass: load a graph, resolve nested graphs, compile and assemble.

use anyhow::{Context, Result};
use ordoplay_blueprint::{
    Compiler, CompilerSettings, FsGraphSource, GraphDescription, GraphLibrary, MaterialAssembler,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Inputs of a compile pass
#[derive(Debug, Clone)]
pub struct CompileJob {
    /// Graph description (JSON)
    pub graph_path: PathBuf,
    /// Directory nested graph paths are resolved against
    pub library_root: PathBuf,
    /// Effective compiler settings
    pub settings: CompilerSettings,
    /// Where to write the WGSL module; stdout when unset
    pub out: Option<PathBuf>,
}

/// Outcome of a compile pass
#[derive(Debug, Clone)]
pub struct CompileReport {
    /// Structural hash of the graph, hex
    pub hash: String,
    /// Generated WGSL module
    pub source: String,
    /// Entry functions, one per compiled root
    pub functions: Vec<String>,
    /// One message per failed root
    pub failures: Vec<String>,
}

impl CompileReport {
    /// Whether every root compiled
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl CompileJob {
    /// Run the pass and write the module to `out` when set
    pub async fn run(&self) -> Result<CompileReport> {
        let text = tokio::fs::read_to_string(&self.graph_path)
            .await
            .with_context(|| format!("Failed to read graph {:?}", self.graph_path))?;
        let description = GraphDescription::from_json(&text)
            .with_context(|| format!("Failed to parse graph {:?}", self.graph_path))?;

        let source = FsGraphSource::new(&self.library_root);
        let library = GraphLibrary::new(Arc::new(source), self.settings.link_policy);
        let graph = library
            .load_graph(&description)
            .await
            .context("Failed to instantiate graph")?;
        tracing::debug!("Loaded {} nested graph(s)", library.len());

        let report = {
            let compiled = Compiler::new(self.settings.clone())
                .compile(&graph)
                .context("Graph does not compile")?;
            let failures: Vec<String> = compiled
                .failures()
                .map(|(root, err)| format!("root {root}: {err}"))
                .collect();
            for failure in &failures {
                tracing::error!("Compile failed for {failure}");
            }

            let shader = MaterialAssembler::new(self.settings.target.clone())
                .assemble(&compiled)
                .context("Failed to assemble shader")?;
            CompileReport {
                hash: compiled.hash.to_string(),
                source: shader.source,
                functions: shader.functions,
                failures,
            }
        };

        if let Some(out) = &self.out {
            tokio::fs::write(out, &report.source)
                .await
                .with_context(|| format!("Failed to write {:?}", out))?;
            tracing::info!("Wrote {} function(s) to {:?}", report.functions.len(), out);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordoplay_blueprint::LinkPolicy;

    const SURFACE: &str = r#"{
        "name": "surface",
        "nodes": [
            { "id": 1, "node": { "kind": "constant", "value": { "Scalar": 0.25 }, "parameter": "roughness" } },
            { "id": 2, "node": { "kind": "function_call", "path": "lib/tint.json" } },
            { "id": 3, "locked": true, "node": { "kind": "output", "block": "Surface" } }
        ],
        "links": [
            { "startNodeId": 1, "startSlotId": 0, "endNodeId": 3, "endSlotId": 2 },
            { "startNodeId": 2, "startSlotId": 0, "endNodeId": 3, "endSlotId": 0 }
        ]
    }"#;

    const TINT: &str = r#"{
        "name": "tint",
        "nodes": [
            { "id": 1, "node": { "kind": "constant", "value": { "Vec3": [1.0, 0.5, 0.25] } } },
            { "id": 2, "node": { "kind": "function_output", "name": "color" } }
        ],
        "links": [
            { "startNodeId": 1, "startSlotId": 0, "endNodeId": 2, "endSlotId": 0 }
        ]
    }"#;

    fn job(dir: &std::path::Path) -> CompileJob {
        CompileJob {
            graph_path: dir.join("surface.json"),
            library_root: dir.to_path_buf(),
            settings: CompilerSettings::default(),
            out: Some(dir.join("surface.wgsl")),
        }
    }

    #[tokio::test]
    async fn test_compile_writes_module() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("surface.json"), SURFACE).unwrap();
        std::fs::write(dir.path().join("lib/tint.json"), TINT).unwrap();

        let report = job(dir.path()).run().await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.functions, vec!["surface_3".to_string()]);
        assert_eq!(report.hash.len(), 64);

        let written = std::fs::read_to_string(dir.path().join("surface.wgsl")).unwrap();
        assert_eq!(written, report.source);
        assert!(written.contains("out.roughness = material.roughness;"));
        assert!(written.contains("out.base_color = vec3<f32>(1.0, 0.5, 0.25);"));
    }

    #[tokio::test]
    async fn test_missing_nested_graph_fails_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("surface.json"), SURFACE).unwrap();

        let report = job(dir.path()).run().await.unwrap();
        assert!(!report.is_success());
        assert!(report.failures[0].starts_with("root #3"));
        assert!(report.functions.is_empty());
    }

    #[tokio::test]
    async fn test_missing_graph_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = job(dir.path());
        job.settings.link_policy = LinkPolicy::Strict;
        let err = job.run().await.unwrap_err();
        assert!(err.to_string().contains("Failed to read graph"));
    }
}
