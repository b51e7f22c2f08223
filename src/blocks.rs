
// imports
use crate::error::{Result, WackyError};
use crate::progress::ScanProgress;

use flate2::read::GzDecoder;
use log::{debug, error, info};
use memmap2::Mmap;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Marker closing every sentence of the corpus.
pub const SENTENCE_END: &[u8; 4] = b"</s>";

/// Buffers at or below this size are scanned as a single block.
pub const MIN_SPLIT_SIZE: usize = 1024;

/// A byte range of a corpus buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {

    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn slice<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.offset..self.end()]
    }
}

/// Splits `buf` into `num_blocks` spans whose inner boundaries sit just past a `</s>` marker.
///
/// The spans partition the buffer with no gap or overlap. When no marker follows an ideal
/// boundary, the remaining spans are empty.
pub fn split_blocks(buf: &[u8], num_blocks: usize) -> Vec<Span> {

    let size = buf.len();
    if num_blocks <= 1 || size <= MIN_SPLIT_SIZE {
        return vec![Span { offset: 0, len: size }];
    }

    let step = size / num_blocks;
    let mut boundaries = Vec::with_capacity(num_blocks + 1);
    boundaries.push(0);

    let mut previous = 0;
    for i in 1..num_blocks {
        let boundary = next_sentence_end(buf, (i * step).max(previous));
        boundaries.push(boundary);
        previous = boundary;
    }
    boundaries.push(size);

    boundaries
        .windows(2)
        .map(|w| Span { offset: w[0], len: w[1] - w[0] })
        .collect()
}

// position just past the first marker at or after `from`, clipped to the buffer
fn next_sentence_end(buf: &[u8], from: usize) -> usize {
    if from >= buf.len() {
        return buf.len();
    }
    buf[from..]
        .windows(SENTENCE_END.len())
        .position(|w| w == SENTENCE_END)
        .map(|p| from + p + SENTENCE_END.len())
        .unwrap_or(buf.len())
}

/// Corpus bytes, memory mapped or inflated from a `.gz` file.
pub enum CorpusBuffer {
    Mapped(Mmap),
    Inflated(Vec<u8>),
}

impl CorpusBuffer {

    pub fn open(path: &Path) -> Result<Self> {

        let file = File::open(path)?;
        if path.extension().map_or(false, |ext| ext == "gz") {
            let mut reader = GzDecoder::new(BufReader::new(file));
            let mut buf: Vec<u8> = Vec::new();
            reader.read_to_end(&mut buf)?;
            return Ok(CorpusBuffer::Inflated(buf));
        }

        // SAFETY: corpus files are read-only inputs for the whole run
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(CorpusBuffer::Mapped(mmap))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            CorpusBuffer::Mapped(mmap) => &mmap[..],
            CorpusBuffer::Inflated(buf) => buf.as_slice(),
        }
    }
}

/// Lists the regular files of the corpus directory in name order.
pub fn list_corpus_files(corpus_dir: &Path) -> Result<Vec<PathBuf>> {

    if !corpus_dir.is_dir() {
        return Err(WackyError::missing(format!("corpus directory {} does not exist", corpus_dir.display())));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(corpus_dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// The fixed-size pool every scanning pass and the scorer run in.
pub fn worker_pool(num_threads: usize) -> Result<ThreadPool> {
    Ok(ThreadPoolBuilder::new().num_threads(num_threads.max(1)).build()?)
}

/// Runs `work` over the blocks of every file, one worker per block.
///
/// A file that cannot be opened is reported and skipped, the others are still scanned.
/// Must be called from inside the pass's thread pool.
pub fn scan_files<F>(files: &[PathBuf], num_blocks: usize, progress: &ScanProgress, work: F)
where
    F: Fn(&[u8]) + Sync,
{
    for file_path in files {

        let corpus = match CorpusBuffer::open(file_path) {
            Ok(corpus) => corpus,
            Err(e) => {
                error!("skipping {}: {}", file_path.display(), e);
                continue;
            }
        };

        let buf = corpus.as_bytes();
        let spans = split_blocks(buf, num_blocks);
        info!("reading {} ({} bytes, {} blocks)", file_path.display(), buf.len(), spans.len());
        for (i, span) in spans.iter().enumerate() {
            debug!("block {}: offset {} size {}", i, span.offset, span.len);
        }

        progress.add_total(buf.len());
        spans.par_iter().for_each(|span| {
            work(span.slice(buf));
            progress.advance(span.len);
        });
    }
}


#[cfg(test)]
mod tests {

    use super::{split_blocks, Span, MIN_SPLIT_SIZE, SENTENCE_END};

    fn assert_partition(spans: &[Span], size: usize) {
        let mut offset = 0;
        for span in spans {
            assert_eq!(span.offset, offset);
            offset = span.end();
        }
        assert_eq!(offset, size);
    }

    #[test]
    fn boundaries_follow_sentence_ends() {

        let sentence = "<s>\nthe\tthe\tDT\t1\t2\tNMOD\ncat\tcat\tNN\t2\t3\tSBJ\nsat\tsit\tVV\t3\t0\tROOT\n</s>\n";
        let buf = sentence.repeat(200).into_bytes();

        for num_blocks in [2, 3, 7, 16] {
            let spans = split_blocks(&buf, num_blocks);
            assert_eq!(spans.len(), num_blocks);
            assert_partition(&spans, buf.len());
            for span in &spans[1..] {
                if span.offset < buf.len() {
                    assert_eq!(&buf[span.offset - 4..span.offset], SENTENCE_END);
                }
            }
        }
    }

    #[test]
    fn small_buffers_are_not_split() {

        let buf = vec![b'a'; MIN_SPLIT_SIZE];
        assert_eq!(split_blocks(&buf, 8), vec![Span { offset: 0, len: MIN_SPLIT_SIZE }]);
        assert_eq!(split_blocks(&[], 8), vec![Span { offset: 0, len: 0 }]);
    }

    #[test]
    fn scan_stops_at_the_end_without_marker() {

        let buf = vec![b'a'; 4 * MIN_SPLIT_SIZE];
        let spans = split_blocks(&buf, 4);
        assert_partition(&spans, buf.len());
        assert_eq!(spans[0].len, buf.len());
        assert!(spans[1..].iter().all(|span| span.len == 0));
    }
}
