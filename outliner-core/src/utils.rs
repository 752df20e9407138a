use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;

use crate::entities::DocumentRecord;

pub(crate) fn sanitize_doc_name(doc_name: &str) -> String {
    doc_name
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                Some(c)
            } else if c.is_whitespace() {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
}

/// Base name of a document: its file name without the extension.
pub fn doc_stem(doc_id: &str) -> String {
    Path::new(doc_id)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| sanitize_doc_name(doc_id))
}

/// `<output_dir>/<base>.json` for a document id.
pub fn record_path(output_dir: &Path, doc_id: &str) -> PathBuf {
    output_dir.join(format!("{}.json", doc_stem(doc_id)))
}

/// Writes the record as pretty printed JSON, replacing any previous file.
pub fn save_document_record(
    record: &DocumentRecord,
    output_dir: &Path,
    doc_id: &str,
) -> anyhow::Result<PathBuf> {
    let file_out = record_path(output_dir, doc_id);
    let file = File::create(&file_out)
        .with_context(|| format!("can't create {}", file_out.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, record)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(file_out)
}
