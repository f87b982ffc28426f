use std::path::Path;

/// Build the service package for the service rooted at `path`.
pub fn package(path: &Path) -> anyhow::Result<()> {
    if !path.is_dir() {
        anyhow::bail!("service root '{}' is not a directory", path.display());
    }

    println!("Packaging service at {}...", path.display());
    tracing::debug!(
        config = %path.join(cspack_core::CONFIG_FILE_NAME).display(),
        "loading service config"
    );
    let diagnostics = cspack_build::create_package(path)?;

    if let Some(out) = diagnostics.out {
        print!("{out}");
    }
    if let Some(err) = diagnostics.err {
        eprint!("{err}");
    }
    println!("Package created.");
    Ok(())
}
