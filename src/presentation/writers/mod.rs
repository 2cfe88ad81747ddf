use crate::domain::{ports::OutputWriter, report::Report};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use self::{markdown::MarkdownWriter, tsv::TsvWriter};

pub mod content;
pub mod markdown;
pub mod tsv;

/// Register available writers - add new ones without touching main.rs
pub fn all_writers(generated_at: DateTime<Utc>) -> Vec<Box<dyn OutputWriter>> {
    vec![Box::new(TsvWriter), Box::new(MarkdownWriter::new(generated_at))]
}

pub fn writer_for(format: &str, generated_at: DateTime<Utc>) -> Option<Box<dyn OutputWriter>> {
    match format {
        "tsv" => Some(Box::new(TsvWriter)),
        "md" | "markdown" => Some(Box::new(MarkdownWriter::new(generated_at))),
        _ => None,
    }
}

/// Writes `content` to `<dir>/<file_name>`.
///
/// The content goes to a hidden temporary file in the same directory first
/// and is renamed into place, so the final path either holds a complete
/// file or does not exist.
pub fn write_text(dir: &Path, file_name: &str, content: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let path = dir.join(file_name);
    let tmp = stage(dir, file_name, content)?;
    if let Err(e) = fs::rename(&tmp, &path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to move report into {}", path.display()));
    }
    Ok(path)
}

/// Writes `report` once per writer, all or nothing.
///
/// Every format is rendered before anything touches the disk. All files are
/// then staged as temporaries and renamed into place; if any step fails, the
/// temporaries and the files already renamed are removed.
pub fn write_all(
    writers: &[Box<dyn OutputWriter>],
    report: &Report,
    dir: &Path,
    stem: &str,
) -> Result<Vec<PathBuf>> {
    let mut rendered = Vec::with_capacity(writers.len());
    for writer in writers {
        let content = writer
            .format(report)
            .with_context(|| format!("Failed to render {} as {}", stem, writer.extension()))?;
        rendered.push((format!("{}.{}", stem, writer.extension()), content));
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(rendered.len());
    for (file_name, content) in &rendered {
        match stage(dir, file_name, content) {
            Ok(tmp) => staged.push((tmp, dir.join(file_name))),
            Err(e) => {
                discard(staged.iter().map(|(tmp, _)| tmp));
                return Err(e);
            }
        }
    }

    let mut written: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for (i, (tmp, path)) in staged.iter().enumerate() {
        if let Err(e) = fs::rename(tmp, path) {
            discard(staged[i..].iter().map(|(tmp, _)| tmp));
            discard(written.iter());
            return Err(e).with_context(|| format!("Failed to move report into {}", path.display()));
        }
        written.push(path.clone());
    }
    Ok(written)
}

fn stage(dir: &Path, file_name: &str, content: &str) -> Result<PathBuf> {
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));
    if let Err(e) = fs::write(&tmp, content) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to write {}", tmp.display()));
    }
    Ok(tmp)
}

fn discard<'a>(paths: impl Iterator<Item = &'a PathBuf>) {
    for path in paths {
        let _ = fs::remove_file(path);
    }
}
