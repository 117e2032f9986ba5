//! Record Transformation
//!
//! Converts a stable capture file into a cleaned, bulk-ingestion-ready record file:
//! 1. **Decode** → the external dissector exports line-delimited bulk pairs
//!    into an intermediate `.json` next to the capture
//! 2. **Clean** → every line loses the deprecated `,"_type":"doc"` fragment and
//!    is written to `cleaned_packets_NNNN.json` in the cleaned directory
//! 3. **Tidy** → the intermediate file is removed; the capture itself stays

pub mod decoder;
pub mod sequence;

use crate::error::{PipelineError, PipelineResult};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info, warn};

pub use decoder::{CaptureDecoder, TsharkDecoder};
pub use sequence::SequenceCounter;

/// Type tag rejected by current bulk APIs
pub const DEPRECATED_TYPE_TAG: &str = ",\"_type\":\"doc\"";

/// Remove every occurrence of the deprecated type tag from one line
pub fn strip_type_tag(line: &str) -> Cow<'_, str> {
    if line.contains(DEPRECATED_TYPE_TAG) {
        Cow::Owned(line.replace(DEPRECATED_TYPE_TAG, ""))
    } else {
        Cow::Borrowed(line)
    }
}

/// Byte-level variant of [`strip_type_tag`] for lines that may not be valid UTF-8.
/// Returns the cleaned line and how many tags were removed.
pub fn strip_type_tag_bytes(line: &[u8]) -> (Cow<'_, [u8]>, usize) {
    let tag = DEPRECATED_TYPE_TAG.as_bytes();
    let mut stripped: Option<Vec<u8>> = None;
    let mut removed = 0;
    let mut copied_up_to = 0;
    let mut i = 0;

    while i + tag.len() <= line.len() {
        if &line[i..i + tag.len()] == tag {
            let buf = stripped.get_or_insert_with(|| Vec::with_capacity(line.len()));
            buf.extend_from_slice(&line[copied_up_to..i]);
            i += tag.len();
            copied_up_to = i;
            removed += 1;
        } else {
            i += 1;
        }
    }

    match stripped {
        Some(mut buf) => {
            buf.extend_from_slice(&line[copied_up_to..]);
            (Cow::Owned(buf), removed)
        }
        None => (Cow::Borrowed(line), 0),
    }
}

/// Where the decoder writes its output for `raw`: same directory, `.json` extension
pub fn intermediate_path(raw: &Path) -> PathBuf {
    let candidate = raw.with_extension("json");
    if candidate == raw {
        return raw.with_extension("decoded.json");
    }
    candidate
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanStats {
    pub lines: usize,
    pub tags_removed: usize,
}

/// Copy `input` to `output` line by line, stripping the type tag.
///
/// Works on raw bytes: line endings and non UTF-8 content pass through untouched.
pub async fn clean_records(input: &Path, output: &Path) -> PipelineResult<CleanStats> {
    let reader = fs::File::open(input).await?;
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(fs::File::create(output).await?);

    let mut stats = CleanStats::default();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        stats.lines += 1;
        let (cleaned, removed) = strip_type_tag_bytes(&line);
        stats.tags_removed += removed;
        writer.write_all(&cleaned).await?;
    }

    writer.flush().await?;
    writer.into_inner().sync_all().await?;
    Ok(stats)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutcome {
    pub raw_path: PathBuf,
    pub cleaned_path: PathBuf,
    pub stats: CleanStats,
}

pub struct RecordTransformer {
    decoder: Box<dyn CaptureDecoder>,
    cleaned_dir: PathBuf,
    counter: SequenceCounter,
}

impl RecordTransformer {
    /// Numbering resumes after the highest cleaned file already in `cleaned_dir`
    pub fn new(decoder: Box<dyn CaptureDecoder>, cleaned_dir: PathBuf) -> PipelineResult<Self> {
        let counter = SequenceCounter::from_directory(&cleaned_dir)?;
        Ok(Self::with_counter(decoder, cleaned_dir, counter))
    }

    pub fn with_counter(
        decoder: Box<dyn CaptureDecoder>,
        cleaned_dir: PathBuf,
        counter: SequenceCounter,
    ) -> Self {
        Self {
            decoder,
            cleaned_dir,
            counter,
        }
    }

    pub fn next_counter(&self) -> u32 {
        self.counter.peek()
    }

    /// Decode and clean `raw_path`. The counter only advances on success.
    pub async fn transform(&mut self, raw_path: &Path) -> PipelineResult<TransformOutcome> {
        let intermediate = intermediate_path(raw_path);

        if let Err(e) = self.decoder.decode(raw_path, &intermediate).await {
            remove_if_present(&intermediate).await;
            return Err(e);
        }

        let cleaned_path = self.cleaned_dir.join(self.counter.current_file_name());
        let mut staging = cleaned_path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        let stats = match clean_records(&intermediate, &staging).await {
            Ok(stats) => stats,
            Err(e) => {
                remove_if_present(&staging).await;
                return Err(PipelineError::DecodeFailed {
                    path: raw_path.to_path_buf(),
                    reason: format!("cleaning {} failed: {}", intermediate.display(), e),
                });
            }
        };

        if let Err(e) = fs::rename(&staging, &cleaned_path).await {
            remove_if_present(&staging).await;
            remove_if_present(&intermediate).await;
            return Err(e.into());
        }
        self.counter.advance();

        if let Err(e) = fs::remove_file(&intermediate).await {
            warn!(
                "Failed to remove intermediate file {}: {}",
                intermediate.display(),
                e
            );
        }

        info!(
            "Cleaned {} -> {} ({} lines, {} type tags removed)",
            raw_path.display(),
            cleaned_path.display(),
            stats.lines,
            stats.tags_removed
        );

        Ok(TransformOutcome {
            raw_path: raw_path.to_path_buf(),
            cleaned_path,
            stats,
        })
    }
}

async fn remove_if_present(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}
