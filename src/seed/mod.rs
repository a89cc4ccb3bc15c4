use std::path::Path;

use anyhow::{Context, Result};

use crate::api::service::learn;
use crate::config::AppConfig;
use crate::store::traits::DocumentStore;

/// Induces every `{type}.json` sample in the configured samples directory
/// into the persisted spec. The file stem names the base type. Runs before
/// the service is constructed; does nothing when no directory is set.
pub async fn load_samples<S: DocumentStore>(store: &S, cnf: &AppConfig) -> Result<()> {
    let Some(dir) = &cnf.samples.dir else {
        return Ok(());
    };

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read samples directory {}", dir))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    entries.sort();

    for path in entries {
        let base_type = match base_type_of(&path) {
            Some(name) => name,
            None => continue,
        };
        let sample = std::fs::read(&path)
            .with_context(|| format!("failed to read sample {}", path.display()))?;
        learn(store, cnf, &sample, &base_type)
            .await
            .with_context(|| format!("failed to induce sample {}", path.display()))?;
        log::info!("mounted API for sample type {}", base_type);
    }
    Ok(())
}

fn base_type_of(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn no_samples_dir_is_a_no_op() {
        let cnf = AppConfig::default();
        let store = MemoryStore::new();
        load_samples(&store, &cnf).await.unwrap();

        let spec = store
            .load_definition(&cnf.spec_template())
            .await
            .unwrap();
        assert!(spec.paths.is_empty());
    }

    #[test]
    fn base_type_comes_from_the_file_stem() {
        assert_eq!(
            base_type_of(Path::new("/tmp/samples/ticket.json")),
            Some("ticket".to_string())
        );
    }
}
