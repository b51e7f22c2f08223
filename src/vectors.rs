
// imports
use crate::basis::Basis;
use crate::blocks::scan_files;
use crate::config::files_handling::{create_writer, open_lines, ReadFile, SaveFile};
use crate::corpus::{lines, ScanOptions, Sentences, Token};
use crate::dictionary::Dictionary;
use crate::error::{Result, WackyError};
use crate::progress::ScanProgress;

use log::info;
use ndarray::{Array2, Axis};
use ndarray_npy::write_npy;
use ndarray_stats::QuantileExt;
use rayon::ThreadPool;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Sentence tokens need a form column.
const MIN_VECTOR_COLUMNS: usize = 2;


/// Token lines found in and out of the dictionary over the whole corpus.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenTotals {
    pub total: usize,
    pub unk: usize,
}

impl TokenTotals {

    pub fn scan(pool: &ThreadPool,
        files: &[PathBuf],
        dictionary: &Dictionary,
        options: &ScanOptions,
        progress: &ScanProgress) -> TokenTotals {

        let total = AtomicUsize::new(0);
        let unk = AtomicUsize::new(0);
        pool.install(|| {
            scan_files(files, pool.current_num_threads(), progress, |block| {
                let counts = TokenTotals::count_block(block, dictionary, options);
                total.fetch_add(counts.total, Ordering::Relaxed);
                unk.fetch_add(counts.unk, Ordering::Relaxed);
            })
        });

        let totals = TokenTotals { total: total.into_inner(), unk: unk.into_inner() };
        info!("{} tokens in the dictionary, {} out of it", totals.total, totals.unk);
        totals
    }

    pub fn count_block(block: &[u8], dictionary: &Dictionary, options: &ScanOptions) -> TokenTotals {

        let mut totals = TokenTotals::default();
        for line in lines(block) {
            let token = Token::parse(line);
            if token.columns() < MIN_VECTOR_COLUMNS {
                continue;
            }
            let known = token.form(options.lemma_time)
                .and_then(|form| dictionary.id(&form))
                .map_or(false, |id| !dictionary.is_unk(id));
            if known {
                totals.total += 1;
            } else {
                totals.unk += 1;
            }
        }
        totals
    }
}


/// Windowed co-occurrence counts of every dictionary id against the basis.
///
/// Cells live in one flat row-major buffer and are incremented atomically, two blocks may
/// touch the same word.
pub struct CooccurrenceCounter {
    cells: Vec<AtomicU32>,
    positions: Vec<Option<usize>>,
    rows: usize,
    basis_size: usize,
    window_size: usize,
}

impl CooccurrenceCounter {

    pub fn new(dictionary: &Dictionary, basis: &Basis, window_size: usize) -> Self {

        let rows = dictionary.len();
        let basis_size = basis.len();
        let cells = (0..rows * basis_size).map(|_| AtomicU32::new(0)).collect();
        Self {
            cells,
            positions: basis.positions(rows),
            rows,
            basis_size,
            window_size,
        }
    }

    /// Counts the corpus and returns the raw count matrix, dictionary rows by basis columns.
    pub fn scan(pool: &ThreadPool,
        files: &[PathBuf],
        dictionary: &Dictionary,
        basis: &Basis,
        options: &ScanOptions,
        window_size: usize,
        progress: &ScanProgress) -> Result<Array2<f32>> {

        let counter = CooccurrenceCounter::new(dictionary, basis, window_size);
        info!("counting co-occurrences into a {} x {} matrix, window {}", counter.rows, counter.basis_size, window_size);

        pool.install(|| {
            scan_files(files, pool.current_num_threads(), progress, |block| counter.count_block(block, dictionary, options))
        });
        counter.into_counts()
    }

    pub fn count_block(&self, block: &[u8], dictionary: &Dictionary, options: &ScanOptions) {

        for sentence in Sentences::new(block, MIN_VECTOR_COLUMNS) {
            let ids: Vec<usize> = sentence
                .iter()
                .map(|token| match token.form(options.lemma_time) {
                    Some(form) => dictionary.id_or_unk(&form),
                    None => dictionary.unk_id(),
                })
                .collect();
            self.count_sentence(&ids);
        }
    }

    pub fn count_sentence(&self, ids: &[usize]) {

        let n = ids.len();
        for (i, word) in ids.iter().enumerate() {
            let from = i.saturating_sub(self.window_size);
            let to = i.saturating_add(self.window_size).min(n.saturating_sub(1));
            for j in from..=to {
                if j == i {
                    continue;
                }
                if let Some(b) = self.positions.get(ids[j]).copied().flatten() {
                    self.cells[word * self.basis_size + b].fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub fn into_counts(self) -> Result<Array2<f32>> {
        let cells: Vec<f32> = self.cells
            .into_iter()
            .map(|cell| cell.into_inner() as f32)
            .collect();
        Ok(Array2::from_shape_vec((self.rows, self.basis_size), cells)?)
    }
}


/// Converts raw counts into PMI: `ln((count[w][b] / freq[b]) / (freq[w] / total))`.
///
/// A zero count or frequency gives 0. With `rows`, only those dictionary ids are converted and
/// the other rows are left at 0.
pub fn pmi(counts: &Array2<f32>,
    word_freqs: &[usize],
    basis: &Basis,
    total: usize,
    rows: Option<&HashSet<usize>>) -> Array2<f32> {

    let basis_freqs: Vec<f32> = basis.ids()
        .iter()
        .map(|id| word_freqs.get(*id).copied().unwrap_or(0) as f32)
        .collect();
    let total = total as f32;

    let mut out = Array2::<f32>::zeros(counts.raw_dim());
    for (w, (mut out_row, count_row)) in out.axis_iter_mut(Axis(0)).zip(counts.axis_iter(Axis(0))).enumerate() {

        if rows.map_or(false, |rows| !rows.contains(&w)) {
            continue;
        }
        let word_freq = word_freqs.get(w).copied().unwrap_or(0) as f32;
        if word_freq == 0.0 || total == 0.0 {
            continue;
        }

        for (b, (cell, count)) in out_row.iter_mut().zip(count_row.iter()).enumerate() {
            let basis_freq = basis_freqs.get(b).copied().unwrap_or(0.0);
            if *count == 0.0 || basis_freq == 0.0 {
                continue;
            }
            *cell = ((count / basis_freq) / (word_freq / total)).ln();
        }
    }

    if let (Ok(max), Ok(min)) = (out.max(), out.min()) {
        info!("pmi values range from {} to {}", min, max);
    }
    out
}

pub fn export_npy(file_path: &Path, vectors: &Array2<f32>) -> Result<()> {
    write_npy(file_path, vectors)?;
    Ok(())
}

// one line per dictionary id, space separated
impl SaveFile for Array2<f32> {
    fn save_file(&self, output_dir: &Path, file_name: &str) -> Result<()> {
        let mut f = create_writer(output_dir, file_name)?;
        for row in self.axis_iter(Axis(0)) {
            let line = row.iter().map(|x| x.to_string()).collect::<Vec<String>>().join(" ");
            writeln!(f, "{}", line)?;
        }
        f.flush()?;
        Ok(())
    }
}

impl ReadFile for Array2<f32> {
    type Item = Self;
    fn read_file(file_path: &Path) -> Result<Self::Item> {

        let mut values: Vec<f32> = Vec::new();
        let mut width: Option<usize> = None;
        let mut rows = 0;

        for (i, line) in open_lines(file_path)?.enumerate() {
            let line = line?;
            let row = line.split_whitespace()
                .map(|x| x.parse::<f32>())
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| WackyError::invalid_format(file_path, i + 1, e.to_string()))?;

            match width {
                Some(width) if width != row.len() => {
                    return Err(WackyError::invalid_format(file_path, i + 1,
                        format!("expected {} values, found {}", width, row.len())));
                },
                Some(_) => {},
                None => width = Some(row.len()),
            }
            values.extend(row);
            rows += 1;
        }

        Ok(Array2::from_shape_vec((rows, width.unwrap_or(0)), values)?)
    }
}


#[cfg(test)]
mod tests {

    use super::{pmi, CooccurrenceCounter, TokenTotals};
    use crate::basis::Basis;
    use crate::blocks::{split_blocks, worker_pool};
    use crate::config::files_handling::{read_input, save_output};
    use crate::config::DEFAULT_IGNORES;
    use crate::corpus::ScanOptions;
    use crate::dictionary::{Dictionary, FrequencyCounter};
    use crate::progress::ScanProgress;
    use ndarray::{array, Array2};
    use std::collections::HashSet;
    use std::fs;

    // dogs bark. cats bark. dogs chase cats.
    const CORPUS: &str = "<s>\n\
        dogs\tdog\tNNS\t1\t2\tSBJ\n\
        bark\tbark\tVVP\t2\t0\tROOT\n\
        </s>\n<s>\n\
        cats\tcat\tNNS\t1\t2\tSBJ\n\
        bark\tbark\tVVP\t2\t0\tROOT\n\
        </s>\n<s>\n\
        dogs\tdog\tNNS\t1\t2\tSBJ\n\
        chase\tchase\tVVP\t2\t0\tROOT\n\
        cats\tcat\tNNS\t3\t2\tOBJ\n\
        </s>\n";

    fn options() -> ScanOptions {
        ScanOptions {
            lemma_time: true,
            ignores: DEFAULT_IGNORES.iter().map(|w| w.to_string()).collect(),
        }
    }

    fn build() -> (Dictionary, Vec<usize>, Basis, Array2<f32>) {

        let counter = FrequencyCounter::new();
        counter.count_block(CORPUS.as_bytes(), &options());
        let (table, _) = counter.into_parts();
        let dictionary = Dictionary::from_ranked(&table.ranked(), 10);
        let freqs = dictionary.frequencies(&table);

        let basis = Basis::from_ids(vec![dictionary.id("bark").unwrap(), dictionary.id("dog").unwrap()]);
        let counter = CooccurrenceCounter::new(&dictionary, &basis, 2);
        counter.count_block(CORPUS.as_bytes(), &dictionary, &options());
        (dictionary, freqs, basis, counter.into_counts().unwrap())
    }

    #[test]
    fn totals_split_known_and_unknown() {

        let (dictionary, _, _, _) = build();
        let text = format!("{}<s>\nzebras\tzebra\tNNS\t1\t0\tROOT\n</s>\n", CORPUS);
        let totals = TokenTotals::count_block(text.as_bytes(), &dictionary, &options());
        assert_eq!(totals, TokenTotals { total: 7, unk: 1 });
    }

    #[test]
    fn raw_counts_follow_the_window() {

        let (dictionary, _, _, counts) = build();
        assert_eq!(dictionary.words(), &["bark", "cat", "chase", "dog", "UNK"]);

        // rows bark, cat, chase, dog, UNK against columns bark, dog
        let golden: Array2<f32> = array![
            [0.0, 1.0],
            [1.0, 1.0],
            [0.0, 1.0],
            [1.0, 0.0],
            [0.0, 0.0],
        ];
        assert_eq!(counts, golden);

        // window 1 loses cat -> dog across chase
        let basis = Basis::from_ids(vec![3]);
        let counter = CooccurrenceCounter::new(&dictionary, &basis, 1);
        counter.count_sentence(&[3, 2, 1]);
        counter.count_sentence(&[1, 1, 4]);
        let counts = counter.into_counts().unwrap();
        assert_eq!(counts.column(0).to_vec(), vec![0.0, 0.0, 1.0, 0.0, 0.0]);

        // an unbounded window covers the whole sentence
        let counter = CooccurrenceCounter::new(&dictionary, &basis, usize::MAX);
        counter.count_sentence(&[1, 2, 3, 0]);
        let counts = counter.into_counts().unwrap();
        assert_eq!(counts.column(0).to_vec(), vec![1.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn parallel_scan_matches_single_block() {

        let (dictionary, _, basis, counts) = build();
        let dir = tempfile::tempdir().unwrap();
        let corpus = CORPUS.repeat(40);
        assert!(split_blocks(corpus.as_bytes(), 4).iter().filter(|span| span.len > 0).count() > 1);
        fs::write(dir.path().join("part1"), &corpus).unwrap();
        fs::write(dir.path().join("part2"), &corpus).unwrap();
        let files = vec![dir.path().join("part1"), dir.path().join("part2")];

        let pool = worker_pool(4).unwrap();
        let progress = ScanProgress::new();
        let parallel = CooccurrenceCounter::scan(&pool, &files, &dictionary, &basis, &options(), 2, &progress).unwrap();
        assert_eq!(parallel, &counts * 80.0);
        assert_eq!(progress.done(), 2 * corpus.len());

        let totals = TokenTotals::scan(&pool, &files, &dictionary, &options(), &ScanProgress::new());
        assert_eq!(totals, TokenTotals { total: 7 * 80, unk: 0 });
    }

    #[test]
    fn pmi_matches_reference() {

        let (_, freqs, basis, counts) = build();
        let vectors = pmi(&counts, &freqs, &basis, 7, None);

        let a = 1.75f32.ln();
        let b = 3.5f32.ln();
        let golden: Array2<f32> = array![
            [0.0, a],
            [a, a],
            [0.0, b],
            [a, 0.0],
            [0.0, 0.0],
        ];
        for (x, y) in vectors.iter().zip(golden.iter()) {
            assert!((x - y).abs() < 1e-6, "{} != {}", x, y);
        }
        assert!(vectors.iter().all(|x| x.is_finite()));

        // restricted conversion leaves other rows at zero
        let rows: HashSet<usize> = [2].into_iter().collect();
        let restricted = pmi(&counts, &freqs, &basis, 7, Some(&rows));
        assert!((restricted[[2, 1]] - b).abs() < 1e-6);
        assert_eq!(restricted[[1, 0]], 0.0);

        // a zero total never produces inf or nan
        assert!(pmi(&counts, &freqs, &basis, 0, None).iter().all(|x| *x == 0.0));
    }

    #[test]
    fn raw_vectors_reload() {

        let (_, _, _, counts) = build();
        let dir = tempfile::tempdir().unwrap();
        save_output(dir.path(), "word_vectors.txt", &counts).unwrap();

        let text = std::fs::read_to_string(dir.path().join("word_vectors.txt")).unwrap();
        assert!(text.starts_with("0 1\n1 1\n"));
        assert_eq!(read_input::<Array2<f32>>(&dir.path().join("word_vectors.txt")).unwrap(), counts);

        std::fs::write(dir.path().join("ragged.txt"), "1 2\n3\n").unwrap();
        assert!(read_input::<Array2<f32>>(&dir.path().join("ragged.txt")).is_err());
    }
}
