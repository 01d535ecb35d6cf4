// file: src/archive/streamer.rs
// description: lazy in-memory extraction of payload members from zip archives
// reference: https://docs.rs/zip

use crate::error::{PipelineError, Result};
use futures::Stream;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// One payload member read fully into memory.
#[derive(Debug, Clone)]
pub struct ArchiveMember {
    pub name: String,
    pub content: Vec<u8>,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectionResult {
    pub archive: String,
    pub payload_members: usize,
    pub success: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberMetadata {
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveMetadata {
    pub archive: String,
    pub file_size: u64,
    pub members: Vec<MemberMetadata>,
    pub total_uncompressed_size: u64,
}

/// Opens archives below `root` and yields members whose name ends with the
/// payload extension. Nothing is written to disk.
#[derive(Debug, Clone)]
pub struct ArchiveStreamer {
    root: PathBuf,
    extension: String,
}

impl ArchiveStreamer {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn archive_path(&self, archive_id: &str) -> PathBuf {
        self.root.join(archive_id)
    }

    fn is_payload(&self, name: &str) -> bool {
        !name.ends_with('/') && name.ends_with(&self.extension)
    }

    fn open(&self, archive_id: &str) -> Result<ZipArchive<File>> {
        let path = self.archive_path(archive_id);
        if !path.is_file() {
            return Err(PipelineError::NotFound(path));
        }

        let file = File::open(&path)?;
        ZipArchive::new(file).map_err(|e| PipelineError::corrupt(archive_id, e))
    }

    fn payload_names(&self, archive: &ZipArchive<File>) -> Vec<String> {
        archive
            .file_names()
            .filter(|name| self.is_payload(name))
            .map(str::to_string)
            .collect()
    }

    /// Blocking lazy iterator over the payload members of `archive_id`.
    /// Fails before yielding anything when the archive is missing or cannot
    /// be read as a zip container.
    pub fn members(&self, archive_id: &str) -> Result<ArchiveMembers> {
        let archive = self.open(archive_id)?;
        let names = self.payload_names(&archive);

        if names.is_empty() {
            warn!("No {} members found in {}", self.extension, archive_id);
        } else {
            info!("Found {} {} members in {}", names.len(), self.extension, archive_id);
        }

        Ok(ArchiveMembers {
            archive_id: archive_id.to_string(),
            archive,
            names: names.into_iter(),
        })
    }

    /// Async counterpart of [`members`](Self::members). The archive is opened
    /// and read on the blocking pool; at most one member is buffered ahead of
    /// the consumer.
    pub async fn stream(&self, archive_id: &str) -> Result<MemberStream> {
        let streamer = self.clone();
        let id = archive_id.to_string();

        let members = tokio::task::spawn_blocking(move || streamer.members(&id))
            .await
            .map_err(|e| PipelineError::corrupt(archive_id, format!("open task failed: {}", e)))??;

        let (tx, rx) = mpsc::channel(1);
        let producer = tokio::task::spawn_blocking(move || {
            for member in members {
                if tx.blocking_send(member).is_err() {
                    break;
                }
            }
        });

        Ok(MemberStream {
            rx,
            _producer: producer,
        })
    }

    /// Counts payload members without reading their content.
    pub fn inspect(&self, archive_id: &str) -> InspectionResult {
        let mut result = InspectionResult {
            archive: archive_id.to_string(),
            payload_members: 0,
            success: false,
            message: None,
        };

        match self.open(archive_id) {
            Ok(archive) => {
                result.payload_members = self.payload_names(&archive).len();
                result.success = result.payload_members > 0;
                if !result.success {
                    result.message = Some(format!(
                        "No {} members found in {}",
                        self.extension, archive_id
                    ));
                }
            }
            Err(e) => {
                warn!("Inspection of {} failed: {}", archive_id, e);
                result.message = Some(e.to_string());
            }
        }

        result
    }

    pub fn metadata(&self, archive_id: &str) -> Result<ArchiveMetadata> {
        let mut archive = self.open(archive_id)?;
        let file_size = std::fs::metadata(self.archive_path(archive_id))?.len();
        let names = self.payload_names(&archive);

        let mut members = Vec::with_capacity(names.len());
        for name in names {
            let entry = match archive.by_name(&name) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry {} in {}: {}", name, archive_id, e);
                    continue;
                }
            };
            let compressed_size = entry.compressed_size();
            let uncompressed_size = entry.size();
            let compression_ratio = if uncompressed_size > 0 {
                (1.0 - compressed_size as f64 / uncompressed_size as f64) * 100.0
            } else {
                0.0
            };
            members.push(MemberMetadata {
                name,
                compressed_size,
                uncompressed_size,
                compression_ratio,
            });
        }

        let total_uncompressed_size = members.iter().map(|m| m.uncompressed_size).sum();

        Ok(ArchiveMetadata {
            archive: archive_id.to_string(),
            file_size,
            members,
            total_uncompressed_size,
        })
    }
}

/// Pull-based iterator over the payload members of one open archive.
/// Members that fail to read are logged and skipped.
pub struct ArchiveMembers {
    archive_id: String,
    archive: ZipArchive<File>,
    names: std::vec::IntoIter<String>,
}

impl ArchiveMembers {
    fn read(&mut self, name: &str) -> std::result::Result<ArchiveMember, String> {
        let mut entry = self.archive.by_name(name).map_err(|e| e.to_string())?;
        let mut content = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut content).map_err(|e| e.to_string())?;

        Ok(ArchiveMember {
            name: name.to_string(),
            size: content.len() as u64,
            content,
        })
    }
}

impl Iterator for ArchiveMembers {
    type Item = ArchiveMember;

    fn next(&mut self) -> Option<ArchiveMember> {
        while let Some(name) = self.names.next() {
            match self.read(&name) {
                Ok(member) => {
                    debug!("Read {} from {} ({} bytes)", member.name, self.archive_id, member.size);
                    return Some(member);
                }
                Err(e) => warn!("Failed to read {} from {}: {}", name, self.archive_id, e),
            }
        }
        None
    }
}

/// Async stream of members fed by a blocking reader task.
pub struct MemberStream {
    rx: mpsc::Receiver<ArchiveMember>,
    _producer: JoinHandle<()>,
}

impl Stream for MemberStream {
    type Item = ArchiveMember;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{corrupt_member, write_zip};
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, ArchiveStreamer) {
        let temp = TempDir::new().unwrap();
        write_zip(
            temp.path(),
            "A.zip",
            &[
                ("1.xml", b"<cv id=\"1\"/>"),
                ("notes.txt", b"skip me"),
                ("nested/", b""),
                ("nested/2.xml", b"<cv id=\"2\"/>"),
                ("3.xml", b""),
            ],
        );
        let streamer = ArchiveStreamer::new(temp.path(), ".xml");
        (temp, streamer)
    }

    #[test]
    fn test_members_filters_payload_in_listing_order() {
        let (_temp, streamer) = fixture();
        let members: Vec<_> = streamer.members("A.zip").unwrap().collect();

        let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["1.xml", "nested/2.xml", "3.xml"]);
        assert_eq!(members[0].content, b"<cv id=\"1\"/>");
        assert_eq!(members[0].size, 12);
        assert_eq!(members[2].size, 0);
    }

    #[test]
    fn test_unreadable_member_is_skipped() {
        let temp = TempDir::new().unwrap();
        write_zip(
            temp.path(),
            "C.zip",
            &[
                ("1.xml", b"<cv id=\"1\"/>"),
                ("2.xml", b"<cv id=\"2\"/>"),
                ("3.xml", b"<cv id=\"3\"/>"),
            ],
        );
        corrupt_member(temp.path(), "C.zip", "2.xml");

        let streamer = ArchiveStreamer::new(temp.path(), ".xml");
        let names: Vec<_> = streamer
            .members("C.zip")
            .unwrap()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["1.xml", "3.xml"]);
    }

    #[test]
    fn test_missing_archive_is_not_found() {
        let (_temp, streamer) = fixture();
        assert!(matches!(
            streamer.members("B.zip"),
            Err(PipelineError::NotFound(_))
        ));
    }

    #[test]
    fn test_garbage_archive_is_corrupt() {
        let (temp, streamer) = fixture();
        std::fs::write(temp.path().join("bad.zip"), b"definitely not a zip").unwrap();
        assert!(matches!(
            streamer.members("bad.zip"),
            Err(PipelineError::ArchiveCorrupt { .. })
        ));
    }

    #[test]
    fn test_inspect_counts_without_reading() {
        let (temp, streamer) = fixture();
        let result = streamer.inspect("A.zip");
        assert!(result.success);
        assert_eq!(result.payload_members, 3);

        write_zip(temp.path(), "empty.zip", &[("readme.md", b"# hi")]);
        let empty = streamer.inspect("empty.zip");
        assert!(!empty.success);
        assert_eq!(empty.payload_members, 0);
        assert!(empty.message.unwrap().contains("No .xml members"));

        let missing = streamer.inspect("B.zip");
        assert!(!missing.success);
        assert!(missing.message.is_some());
    }

    #[test]
    fn test_metadata_reports_sizes() {
        let (_temp, streamer) = fixture();
        let metadata = streamer.metadata("A.zip").unwrap();
        assert_eq!(metadata.members.len(), 3);
        assert_eq!(metadata.total_uncompressed_size, 24);
        assert!(metadata.file_size > 0);
        assert_eq!(metadata.members[2].compression_ratio, 0.0);
    }

    #[tokio::test]
    async fn test_stream_yields_same_members() {
        let (_temp, streamer) = fixture();
        let mut stream = streamer.stream("A.zip").await.unwrap();

        let mut names = Vec::new();
        while let Some(member) = stream.next().await {
            names.push(member.name);
        }
        assert_eq!(names, vec!["1.xml", "nested/2.xml", "3.xml"]);
    }

    #[tokio::test]
    async fn test_stream_fails_before_yield_for_missing_archive() {
        let (_temp, streamer) = fixture();
        assert!(matches!(
            streamer.stream("B.zip").await,
            Err(PipelineError::NotFound(_))
        ));
    }
}
