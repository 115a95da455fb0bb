use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    ops::Range,
    path::{Path, PathBuf},
};

use crate::error::{ClientError, ClientResult};

const MEGABYTE: u64 = 1024 * 1024;
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 5 * MEGABYTE;
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 500 * MEGABYTE;
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[".pdf", ".txt", ".md"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub allowed_extensions: Vec<String>,
    pub max_file_size: u64,
    pub chunk_size: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE_BYTES,
            chunk_size: DEFAULT_CHUNK_SIZE_BYTES,
        }
    }
}

impl UploadPolicy {
    /// Checks the extension and the size of `source`. Never touches the network.
    pub fn validate(&self, source: &UploadSource) -> ClientResult<()> {
        let extension = file_extension(&source.name);
        let allowed = self
            .allowed_extensions
            .iter()
            .any(|ext| ext.to_lowercase() == extension);
        if !allowed {
            return Err(ClientError::UnsupportedExtension {
                allowed: self.allowed_extensions.clone(),
            });
        }

        if source.size > self.max_file_size {
            return Err(ClientError::FileTooLarge {
                size: source.size,
                max_bytes: self.max_file_size,
            });
        }

        Ok(())
    }
}

/// Lowercased suffix starting at the last `.` of `name`, or `""` when there is none.
pub fn file_extension(name: &str) -> String {
    name.rfind('.')
        .map(|idx| name[idx..].to_lowercase())
        .unwrap_or_default()
}

/// A local file selected for upload.
#[derive(Debug, Clone)]
pub struct UploadSource {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

impl UploadSource {
    pub fn from_path(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            name,
            size,
        })
    }
}

/// Number of chunks needed for `file_size` bytes. An empty file sends none.
pub fn chunk_count(file_size: u64, chunk_size: u64) -> u64 {
    file_size.div_ceil(chunk_size)
}

/// Byte range of chunk `index`, clamped to the end of the file.
pub fn chunk_range(index: u64, chunk_size: u64, file_size: u64) -> Range<u64> {
    let start = index * chunk_size;
    let end = file_size.min(start + chunk_size);
    start..end
}

/// State of one chunked upload, discarded once it finishes or fails.
#[derive(Debug)]
pub struct UploadSession {
    source: UploadSource,
    chunk_size: u64,
    total_chunks: u64,
    uploaded_chunks: u64,
    temp_id: Option<String>,
}

impl UploadSession {
    pub fn new(source: UploadSource, chunk_size: u64) -> Self {
        let total_chunks = chunk_count(source.size, chunk_size);
        Self {
            source,
            chunk_size,
            total_chunks,
            uploaded_chunks: 0,
            temp_id: None,
        }
    }

    pub fn source(&self) -> &UploadSource {
        &self.source
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }

    pub fn uploaded_chunks(&self) -> u64 {
        self.uploaded_chunks
    }

    pub fn temp_id(&self) -> Option<&str> {
        self.temp_id.as_deref()
    }

    /// Index of the next chunk to send, or `None` once every chunk went out.
    pub fn next_chunk(&self) -> Option<u64> {
        (self.uploaded_chunks < self.total_chunks).then_some(self.uploaded_chunks)
    }

    /// Reads chunk `index` from `file` into a fresh buffer.
    pub fn read_chunk(&self, file: &mut File, index: u64) -> ClientResult<Vec<u8>> {
        let range = chunk_range(index, self.chunk_size, self.source.size);
        let mut buffer = vec![0u8; (range.end - range.start) as usize];
        file.seek(SeekFrom::Start(range.start))?;
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Records an accepted chunk. The first token the server hands out sticks.
    pub fn record_chunk(&mut self, temp_id: Option<String>) {
        if self.temp_id.is_none() {
            self.temp_id = temp_id;
        }
        self.uploaded_chunks = (self.uploaded_chunks + 1).min(self.total_chunks);
    }
}
