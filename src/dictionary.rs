
// imports
use crate::blocks::scan_files;
use crate::config::files_handling::{create_writer, open_lines, ReadFile, SaveFile};
use crate::corpus::{lines, ScanOptions, Token, BASIS_POS};
use crate::error::{Result, WackyError};
use crate::progress::ScanProgress;

use log::info;
use rayon::ThreadPool;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

/// Sentinel closing the dictionary, the id of every out-of-vocabulary word.
pub const UNK: &str = "UNK";

/// Lines shorter than this are not counted.
const MIN_COUNT_COLUMNS: usize = 3;


/// Word counts shared by the workers of the frequency pass.
///
/// A new word is inserted under the write lock, an existing one is incremented atomically
/// under the read lock.
pub struct FrequencyCounter {
    counts: RwLock<HashMap<String, AtomicUsize>>,
    allowed: Mutex<HashSet<String>>,
}

impl FrequencyCounter {

    pub fn new() -> Self {
        Self {
            counts: RwLock::new(HashMap::new()),
            allowed: Mutex::new(HashSet::new()),
        }
    }

    /// Scans every corpus file and returns the frequency table and the allowed-basis words.
    pub fn scan(pool: &ThreadPool, files: &[PathBuf], options: &ScanOptions, progress: &ScanProgress) -> (FrequencyTable, HashSet<String>) {

        let counter = FrequencyCounter::new();
        pool.install(|| {
            scan_files(files, pool.current_num_threads(), progress, |block| counter.count_block(block, options))
        });

        let (table, allowed) = counter.into_parts();
        info!("counted {} distinct words ({} tokens), {} allowed basis words", table.len(), table.total(), allowed.len());
        (table, allowed)
    }

    /// Counts the words of one block, merging into the shared map once the block is done.
    pub fn count_block(&self, block: &[u8], options: &ScanOptions) {

        let mut local: HashMap<String, usize> = HashMap::new();
        let mut allowed: HashSet<String> = HashSet::new();

        for line in lines(block) {
            let token = Token::parse(line);
            if token.columns() < MIN_COUNT_COLUMNS {
                continue;
            }
            let word = match options.word(&token) {
                Some(word) => word,
                None => continue,
            };
            if token.pos_in(&BASIS_POS) && !allowed.contains(&word) {
                allowed.insert(word.clone());
            }
            *local.entry(word).or_insert(0) += 1;
        }

        for (word, count) in local {
            self.add(word, count);
        }

        if !allowed.is_empty() {
            self.allowed.lock().unwrap_or_else(PoisonError::into_inner).extend(allowed);
        }
    }

    fn add(&self, word: String, count: usize) {

        {
            let counts = self.counts.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = counts.get(&word) {
                existing.fetch_add(count, Ordering::Relaxed);
                return;
            }
        }

        // another worker may have inserted the word since the read lock was released
        let mut counts = self.counts.write().unwrap_or_else(PoisonError::into_inner);
        counts.entry(word)
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn into_parts(self) -> (FrequencyTable, HashSet<String>) {

        let counts = self.counts.into_inner().unwrap_or_else(PoisonError::into_inner);
        let allowed = self.allowed.into_inner().unwrap_or_else(PoisonError::into_inner);
        let counts = counts.into_iter()
            .map(|(word, count)| (word, count.into_inner()))
            .collect();
        (FrequencyTable { counts }, allowed)
    }
}

impl Default for FrequencyCounter {
    fn default() -> Self {
        Self::new()
    }
}


/// Corpus-wide occurrence count of every counted word.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrequencyTable {
    counts: HashMap<String, usize>,
}

impl FrequencyTable {

    pub fn from_counts(counts: HashMap<String, usize>) -> Self {
        Self { counts }
    }

    pub fn get(&self, word: &str) -> usize {
        self.counts.get(word).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Words by descending count. Equal counts are ordered by word to keep runs reproducible.
    pub fn ranked(&self) -> Vec<(String, usize)> {
        let mut ranked: Vec<(String, usize)> = self.counts
            .iter()
            .map(|(word, count)| (word.to_owned(), *count))
            .collect();
        ranked.sort_by(|(a, x), (b, y)| y.cmp(x).then_with(|| a.cmp(b)));
        ranked
    }
}

// lines of "word, count", most frequent first
impl SaveFile for FrequencyTable {
    fn save_file(&self, output_dir: &Path, file_name: &str) -> Result<()> {
        let mut f = create_writer(output_dir, file_name)?;
        for (word, count) in self.ranked() {
            writeln!(f, "{}, {}", word, count)?;
        }
        f.flush()?;
        Ok(())
    }
}

impl ReadFile for FrequencyTable {
    type Item = Self;
    fn read_file(file_path: &Path) -> Result<Self::Item> {

        let mut counts = HashMap::new();
        for (i, line) in open_lines(file_path)?.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let (word, count) = line.rsplit_once(", ")
                .ok_or_else(|| WackyError::invalid_format(file_path, i + 1, "expected \"word, count\""))?;
            let count = count.trim().parse::<usize>()
                .map_err(|e| WackyError::invalid_format(file_path, i + 1, e.to_string()))?;
            counts.insert(word.to_owned(), count);
        }
        Ok(Self { counts })
    }
}


/// Dense ids over the most frequent words, alphabetical, closed by [`UNK`].
#[derive(Clone, Debug, PartialEq)]
pub struct Dictionary {
    words: Vec<String>,
    ids: HashMap<String, usize>,
}

impl Dictionary {

    /// Keeps the `vocab_size` first entries of a frequency ranking.
    pub fn from_ranked(ranked: &[(String, usize)], vocab_size: usize) -> Self {

        let mut words: Vec<String> = ranked
            .iter()
            .take(vocab_size)
            .map(|(word, _)| word.to_owned())
            .collect();
        words.sort();
        words.push(UNK.to_string());

        info!("using {} most common words out of {}", words.len() - 1, ranked.len());
        Dictionary::from_words(words)
    }

    fn from_words(words: Vec<String>) -> Self {
        let ids = words
            .iter()
            .enumerate()
            .map(|(i, word)| (word.to_owned(), i))
            .collect();
        Self { words, ids }
    }

    pub fn id(&self, word: &str) -> Option<usize> {
        self.ids.get(word).copied()
    }

    pub fn id_or_unk(&self, word: &str) -> usize {
        self.id(word).unwrap_or_else(|| self.unk_id())
    }

    pub fn unk_id(&self) -> usize {
        self.words.len() - 1
    }

    pub fn is_unk(&self, id: usize) -> bool {
        id == self.unk_id()
    }

    pub fn word(&self, id: usize) -> Option<&str> {
        self.words.get(id).map(|word| word.as_str())
    }

    /// Number of ids, sentinel included.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.len() <= 1
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Frequency of every id, zero for the sentinel.
    pub fn frequencies(&self, table: &FrequencyTable) -> Vec<usize> {
        self.words
            .iter()
            .enumerate()
            .map(|(i, word)| if self.is_unk(i) { 0 } else { table.get(word) })
            .collect()
    }
}

impl SaveFile for Dictionary {
    fn save_file(&self, output_dir: &Path, file_name: &str) -> Result<()> {
        let mut f = create_writer(output_dir, file_name)?;
        for word in &self.words {
            writeln!(f, "{}", word)?;
        }
        f.flush()?;
        Ok(())
    }
}

impl ReadFile for Dictionary {
    type Item = Self;
    fn read_file(file_path: &Path) -> Result<Self::Item> {

        let mut words = Vec::new();
        for line in open_lines(file_path)? {
            let line = line?;
            let word = line.trim();
            if !word.is_empty() {
                words.push(word.to_owned());
            }
        }

        if words.last().map(|w| w.as_str()) != Some(UNK) {
            return Err(WackyError::invalid_format(file_path, words.len(), format!("dictionary does not end with {}", UNK)));
        }
        Ok(Dictionary::from_words(words))
    }
}


#[cfg(test)]
mod tests {

    use super::{Dictionary, FrequencyCounter, FrequencyTable, UNK};
    use crate::blocks::{scan_files, worker_pool};
    use crate::config::files_handling::{read_input, save_output};
    use crate::config::DEFAULT_IGNORES;
    use crate::corpus::ScanOptions;
    use crate::progress::ScanProgress;
    use std::fs;

    const CORPUS: &str = "<text id=1>\n<s>\n\
        The\tthe\tDT\t1\t2\tNMOD\n\
        Cats\tcat\tNNS\t2\t3\tSBJ\n\
        chased\tchase\tVVD\t3\t0\tROOT\n\
        dogs\tdog\tNNS\t4\t3\tOBJ\n\
        .\t.\tSENT\t5\t3\tP\n\
        </s>\n<s>\n\
        the\tthe\tDT\t1\t2\tNMOD\n\
        cat\tcat\tNN\t2\t3\tSBJ\n\
        slept\tsleep\tVVD\t3\t0\tROOT\n\
        quietly\tquietly\tRB\t4\t3\tADV\n\
        </s>\n</text>\n";

    fn options(lemma_time: bool) -> ScanOptions {
        ScanOptions {
            lemma_time,
            ignores: DEFAULT_IGNORES.iter().map(|w| w.to_string()).collect(),
        }
    }

    #[test]
    fn counts_qualifying_tokens() {

        let counter = FrequencyCounter::new();
        counter.count_block(CORPUS.as_bytes(), &options(true));
        let (table, allowed) = counter.into_parts();

        assert_eq!(table.get("the"), 2);
        assert_eq!(table.get("cat"), 2);
        assert_eq!(table.get("chase"), 1);
        assert_eq!(table.get("."), 0);
        // the, cat, chase, dog, the, cat, sleep, quietly
        assert_eq!(table.total(), 8);

        let mut allowed: Vec<String> = allowed.into_iter().collect();
        allowed.sort();
        assert_eq!(allowed, vec!["cat", "chase", "dog", "quietly", "sleep"]);

        let counter = FrequencyCounter::new();
        counter.count_block(CORPUS.as_bytes(), &options(false));
        let (table, _) = counter.into_parts();
        assert_eq!(table.get("cats"), 1);
        assert_eq!(table.get("chased"), 1);
    }

    #[test]
    fn parallel_scan_matches_single_block() {

        let dir = tempfile::tempdir().unwrap();
        let corpus = CORPUS.repeat(50);
        fs::write(dir.path().join("part1"), &corpus).unwrap();
        fs::write(dir.path().join("part2"), &corpus).unwrap();
        let files = vec![dir.path().join("part1"), dir.path().join("part2")];

        let pool = worker_pool(4).unwrap();
        let progress = ScanProgress::new();
        let (table, _) = FrequencyCounter::scan(&pool, &files, &options(true), &progress);

        assert_eq!(table.get("the"), 200);
        assert_eq!(table.get("quietly"), 100);
        assert_eq!(table.total(), 800);
        assert_eq!(progress.done(), 2 * corpus.len());

        // a missing file is skipped
        let counter = FrequencyCounter::new();
        let with_missing = vec![dir.path().join("absent"), dir.path().join("part1")];
        pool.install(|| scan_files(&with_missing, 4, &progress, |block| counter.count_block(block, &options(true))));
        assert_eq!(counter.into_parts().0.get("the"), 100);
    }

    #[test]
    fn dictionary_is_alphabetical_with_sentinel() {

        let counter = FrequencyCounter::new();
        counter.count_block(CORPUS.as_bytes(), &options(true));
        let (table, _) = counter.into_parts();

        let ranked = table.ranked();
        assert_eq!(ranked[0], ("cat".to_string(), 2));
        assert_eq!(ranked[1], ("the".to_string(), 2));

        let dictionary = Dictionary::from_ranked(&ranked, 4);
        assert_eq!(dictionary.len(), 5);
        assert_eq!(dictionary.words(), &["cat", "chase", "dog", "the", UNK]);
        for (i, word) in dictionary.words().iter().enumerate() {
            assert_eq!(dictionary.id(word), Some(i));
        }
        assert_eq!(dictionary.id_or_unk("sleep"), dictionary.unk_id());
        assert_eq!(dictionary.frequencies(&table), vec![2, 1, 1, 2, 0]);

        let large = Dictionary::from_ranked(&ranked, 100);
        assert_eq!(large.len(), table.len() + 1);
    }

    #[test]
    fn artifacts_reload() {

        let dir = tempfile::tempdir().unwrap();
        let counter = FrequencyCounter::new();
        counter.count_block(CORPUS.as_bytes(), &options(true));
        let (table, _) = counter.into_parts();
        let dictionary = Dictionary::from_ranked(&table.ranked(), 3);

        save_output(dir.path(), "freq.txt", &table).unwrap();
        save_output(dir.path(), "dictionary.txt", &dictionary).unwrap();

        let text = fs::read_to_string(dir.path().join("freq.txt")).unwrap();
        assert!(text.starts_with("cat, 2\nthe, 2\n"));

        assert_eq!(read_input::<FrequencyTable>(&dir.path().join("freq.txt")).unwrap(), table);
        assert_eq!(read_input::<Dictionary>(&dir.path().join("dictionary.txt")).unwrap(), dictionary);

        fs::write(dir.path().join("broken.txt"), "cat\ndog\n").unwrap();
        assert!(read_input::<Dictionary>(&dir.path().join("broken.txt")).is_err());
    }
}
