//! Sorted-table writer — streaming single-file and split-file writes.
//!
//! The writer consumes an **ordered** record stream and never holds more
//! than one block's worth of bookkeeping in memory for a single-file
//! write, or one output file's buffer for a split write. File ids are
//! freshly allocated ULIDs, so a level directory listing sorts into
//! creation order.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, info, warn};
use ulid::Generator;

use super::{
    FileId, INDEX_EXT, IndexEntry, TableError, TableRecord, data_path, index_path, level_dir,
};

/// Writes ordered record streams into new immutable sorted tables.
///
/// File ids come from a per-writer monotonic ULID generator, so files
/// written back-to-back — even within one millisecond — still sort into
/// creation order.
pub struct TableWriter {
    root: PathBuf,
    ids: Mutex<Generator>,
}

impl std::fmt::Debug for TableWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableWriter")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl TableWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ids: Mutex::new(Generator::new()),
        }
    }

    /// Allocates the next file id, strictly above every id this writer
    /// handed out before.
    fn next_file_id(&self) -> Result<FileId, TableError> {
        let mut ids = self
            .ids
            .lock()
            .map_err(|_| TableError::Internal("file id generator lock poisoned".into()))?;
        loop {
            match ids.generate() {
                Ok(id) => return Ok(id.to_string()),
                // Random component overflowed within one millisecond;
                // the next tick resolves it.
                Err(_) => std::hint::spin_loop(),
            }
        }
    }

    /// Streams `records` into a freshly allocated file under
    /// `L<level>/`, grouping every `block_size` records into a block and
    /// emitting one index entry per block.
    ///
    /// The stream must be ascending by key; the writer does not re-sort.
    /// Returns `Ok(None)` for an empty stream — no files are created.
    pub fn write<I>(
        &self,
        level: u32,
        block_size: usize,
        records: I,
    ) -> Result<Option<(PathBuf, FileId)>, TableError>
    where
        I: IntoIterator<Item = Result<TableRecord, TableError>>,
    {
        let mut records = records.into_iter();

        // Allocate nothing until the stream proves non-empty.
        let first = match records.next() {
            Some(record) => record?,
            None => return Ok(None),
        };

        let folder = level_dir(&self.root, level);
        fs::create_dir_all(&folder)?;

        let file_id = self.next_file_id()?;
        let data = data_path(&folder, &file_id);
        let mut out = BufWriter::new(File::create(&data)?);

        let mut index: Vec<IndexEntry> = Vec::new();
        let mut block_num: u64 = 0;
        let mut block_first_key = first.key.clone();
        let mut block_start: u64 = 0;
        let mut block_count: u64 = 0;
        let mut written: u64 = 0;

        for record in std::iter::once(Ok(first)).chain(records) {
            let record = record?;

            if block_count == block_size as u64 {
                index.push(IndexEntry {
                    block: block_num,
                    first_key: block_first_key,
                    offset: block_start,
                    record_count: block_count,
                });
                block_num += 1;
                block_start = written;
                block_first_key = record.key.clone();
                block_count = 0;
            }

            let mut line = serde_json::to_vec(&record)?;
            line.push(b'\n');
            out.write_all(&line)?;
            written += line.len() as u64;
            block_count += 1;
        }

        // Trailing block.
        index.push(IndexEntry {
            block: block_num,
            first_key: block_first_key,
            offset: block_start,
            record_count: block_count,
        });
        out.flush()?;

        let mut idx_out = BufWriter::new(File::create(index_path(&folder, &file_id))?);
        for entry in &index {
            let mut line = serde_json::to_vec(entry)?;
            line.push(b'\n');
            idx_out.write_all(&line)?;
        }
        idx_out.flush()?;

        info!(
            level,
            %file_id,
            blocks = index.len(),
            bytes = written,
            "sorted table written"
        );

        Ok(Some((data, file_id)))
    }

    /// Streams one long ordered sequence into **multiple** files.
    ///
    /// A new output file starts whenever the next record's key reaches
    /// the next entry of `split_keys` (ascending), and whenever the
    /// current buffer holds `blocks_per_file × block_size` records. The
    /// last non-empty buffer is flushed at end of stream. Returns the
    /// produced file ids in creation order.
    pub fn write_split<I>(
        &self,
        level: u32,
        records: I,
        split_keys: &[String],
        block_size: usize,
        blocks_per_file: usize,
    ) -> Result<Vec<FileId>, TableError>
    where
        I: IntoIterator<Item = Result<TableRecord, TableError>>,
    {
        let max_records_per_file = blocks_per_file * block_size;

        let mut split_idx = 0;
        let mut file_ids: Vec<FileId> = Vec::new();
        let mut buffer: Vec<TableRecord> = Vec::new();

        for record in records {
            let record = record?;

            while split_idx < split_keys.len() && record.key >= split_keys[split_idx] {
                if !buffer.is_empty() {
                    self.flush_buffer(level, block_size, &mut buffer, &mut file_ids)?;
                }
                split_idx += 1;
            }

            buffer.push(record);
            if buffer.len() >= max_records_per_file {
                self.flush_buffer(level, block_size, &mut buffer, &mut file_ids)?;
            }
        }

        if !buffer.is_empty() {
            self.flush_buffer(level, block_size, &mut buffer, &mut file_ids)?;
        }

        debug!(level, files = file_ids.len(), "split write complete");
        Ok(file_ids)
    }

    /// Best-effort unlink of a file's data and index parts. A missing
    /// file is not an error; any other failure propagates.
    pub fn remove_file(&self, level: u32, file_id: &str) -> Result<(), TableError> {
        let folder = level_dir(&self.root, level);

        for path in [data_path(&folder, file_id), index_path(&folder, file_id)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(TableError::Io(e)),
            }
        }

        Ok(())
    }

    /// Removes every file at `level` whose id is not in `keep`, then
    /// returns the largest kept id.
    ///
    /// This is the retention step after compaction: output files that
    /// were superseded mid-run (or orphaned by a crash) are reaped here.
    pub fn preserve_files(
        &self,
        level: u32,
        keep: &[FileId],
    ) -> Result<Option<FileId>, TableError> {
        let folder = level_dir(&self.root, level);

        if folder.exists() {
            for entry in fs::read_dir(&folder)? {
                let entry = entry?;
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                let Some(file_id) = name.strip_suffix(INDEX_EXT) else {
                    continue;
                };
                if keep.iter().any(|kept| kept == file_id) {
                    continue;
                }

                warn!(level, file_id, "reaping unreferenced sorted table");
                self.remove_file(level, file_id)?;
            }
        }

        Ok(keep.iter().max().cloned())
    }

    fn flush_buffer(
        &self,
        level: u32,
        block_size: usize,
        buffer: &mut Vec<TableRecord>,
        file_ids: &mut Vec<FileId>,
    ) -> Result<(), TableError> {
        if let Some((_, file_id)) = self.write(level, block_size, buffer.drain(..).map(Ok))? {
            file_ids.push(file_id);
        }
        Ok(())
    }
}
