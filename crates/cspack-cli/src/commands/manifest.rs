use std::path::Path;

pub fn manifest(path: &Path) -> anyhow::Result<()> {
    let written = cspack_build::write_manifests(path)?;
    tracing::debug!(count = written.len(), "manifest documents written");
    for file in &written {
        println!("Wrote {}", file.display());
    }
    Ok(())
}
