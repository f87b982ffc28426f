use std::path::Path;

use cspack_build::container::{CONTAINER_CONTENT_TYPE, ContainerReader, PartInfo, content_type_for};
use serde::Serialize;

#[derive(Serialize)]
struct PartRow {
    uri: String,
    content_type: &'static str,
    size: u64,
    compressed_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    parts: Option<Vec<PartRow>>,
}

#[derive(Serialize)]
struct Report {
    file: String,
    part_count: usize,
    parts: Vec<PartRow>,
}

/// List the parts of a package, optionally descending into role containers.
pub fn inspect(file: &Path, roles: bool, json: bool) -> anyhow::Result<()> {
    let mut reader = ContainerReader::from_path(file)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {e}", file.display()))?;

    let mut rows = Vec::with_capacity(reader.part_count());
    for info in reader.parts()? {
        let nested = if roles && content_type_for(&info.uri) == CONTAINER_CONTENT_TYPE {
            let bytes = reader.read_part(&info.uri)?;
            let mut inner = ContainerReader::open(bytes)?;
            Some(inner.parts()?.into_iter().map(|p| row(p, None)).collect())
        } else {
            None
        };
        rows.push(row(info, nested));
    }

    let report = Report {
        file: file.display().to_string(),
        part_count: rows.len(),
        parts: rows,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} ({} parts)", report.file, report.part_count);
    for part in &report.parts {
        print_row(part, 1);
        for nested in part.parts.iter().flatten() {
            print_row(nested, 2);
        }
    }
    Ok(())
}

fn row(info: PartInfo, parts: Option<Vec<PartRow>>) -> PartRow {
    PartRow {
        content_type: content_type_for(&info.uri),
        uri: info.uri,
        size: info.size,
        compressed_size: info.compressed_size,
        parts,
    }
}

fn print_row(part: &PartRow, depth: usize) {
    println!(
        "{:indent$}{:<48} {:>10} {}",
        "",
        part.uri,
        part.size,
        part.content_type,
        indent = depth * 2
    );
}
