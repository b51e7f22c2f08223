
// imports
use crate::blocks::scan_files;
use crate::config::files_handling::{create_writer, open_lines, ReadFile, SaveFile};
use crate::corpus::{Sentences, Token, ARGUMENT_POS, OBJECT_REL, SUBJECT_REL};
use crate::dictionary::Dictionary;
use crate::error::{Result, WackyError};
use crate::progress::ScanProgress;

use log::info;
use rayon::ThreadPool;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Dependency lines carry surface, lemma, POS, index, head and relation.
const DEPENDENCY_COLUMNS: usize = 6;


/// Follows head links from `start` to the first verb accepted by `accept`.
///
/// Gives up at the root, on a missing index, or after as many hops as the sentence has
/// tokens, so cyclic heads terminate.
pub fn governing_verb<'s, 'a, F>(sentence: &'s [Token<'a>], start: usize, accept: F) -> Option<&'s Token<'a>>
where
    F: Fn(&Token<'a>) -> bool,
{
    let mut target = start;
    for _ in 0..sentence.len() {
        if target == 0 {
            return None;
        }
        let token = sentence
            .iter()
            .find(|token| token.is_dependency() && token.index() == Some(target))?;
        if token.is_verb() && accept(token) {
            return Some(token);
        }
        target = token.head()?;
    }
    None
}

/// An argument attached to the verb governing it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub verb: usize,
    /// Position of the verb token in its sentence, shared attachments pair up on it.
    pub verb_index: usize,
    pub argument: usize,
}

/// Nominal arguments of relation `rel` in a sentence, with their governing verbs.
pub fn attachments(sentence: &[Token], rel: &str, dictionary: &Dictionary, lemma_time: bool) -> Vec<Attachment> {

    let known = |token: &Token| -> Option<usize> {
        token.form(lemma_time)
            .and_then(|form| dictionary.id(&form))
            .filter(|id| !dictionary.is_unk(*id))
    };

    let mut found = Vec::new();
    for token in sentence {
        if !token.is_dependency() || !token.relation_is(rel) || !token.pos_in(&ARGUMENT_POS) {
            continue;
        }
        let (argument, head) = match (known(token), token.head()) {
            (Some(argument), Some(head)) => (argument, head),
            _ => continue,
        };
        let verb = governing_verb(sentence, head, |candidate| known(candidate).is_some());
        if let Some(verb) = verb {
            if let (Some(verb_id), Some(verb_index)) = (known(verb), verb.index()) {
                found.push(Attachment { verb: verb_id, verb_index, argument });
            }
        }
    }
    found
}


/// Per-verb argument lists indexed by dictionary id: `<verb_id> <arg_id> ...` on disk.
///
/// The pair table interleaves subject and object ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelationTable {
    rows: Vec<Vec<usize>>,
}

impl RelationTable {

    pub fn with_len(len: usize) -> Self {
        Self { rows: vec![Vec::new(); len] }
    }

    pub fn from_rows(rows: Vec<Vec<usize>>) -> Self {
        Self { rows }
    }

    pub fn get(&self, verb: usize) -> &[usize] {
        self.rows.get(verb).map(|row| row.as_slice()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of verbs with at least one argument.
    pub fn verbs(&self) -> usize {
        self.rows.iter().filter(|row| !row.is_empty()).count()
    }

    pub fn entries(&self) -> usize {
        self.rows.iter().map(|row| row.len()).sum()
    }

    fn into_rows(self, len: usize) -> Vec<Vec<usize>> {
        let mut rows = self.rows;
        rows.resize(len.max(rows.len()), Vec::new());
        rows
    }
}

impl SaveFile for RelationTable {
    fn save_file(&self, output_dir: &Path, file_name: &str) -> Result<()> {
        let mut f = create_writer(output_dir, file_name)?;
        for (verb, row) in self.rows.iter().enumerate() {
            if row.is_empty() {
                continue;
            }
            write!(f, "{}", verb)?;
            for argument in row {
                write!(f, " {}", argument)?;
            }
            writeln!(f)?;
        }
        f.flush()?;
        Ok(())
    }
}

impl ReadFile for RelationTable {
    type Item = Self;
    fn read_file(file_path: &Path) -> Result<Self::Item> {

        let mut rows: Vec<Vec<usize>> = Vec::new();
        for (i, line) in open_lines(file_path)?.enumerate() {
            let line = line?;
            let ids = line.split_whitespace()
                .map(|x| x.parse::<usize>())
                .collect::<std::result::Result<Vec<usize>, _>>()
                .map_err(|e| WackyError::invalid_format(file_path, i + 1, e.to_string()))?;

            let (verb, arguments) = match ids.split_first() {
                Some((verb, arguments)) => (*verb, arguments),
                None => continue,
            };
            if rows.len() <= verb {
                rows.resize(verb + 1, Vec::new());
            }
            rows[verb].extend_from_slice(arguments);
        }
        Ok(Self { rows })
    }
}

/// The three argument tables of a corpus.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Relations {
    pub subjects: RelationTable,
    pub objects: RelationTable,
    pub pairs: RelationTable,
}


/// Argument lists shared by the workers of the extraction pass, one lock per verb.
pub struct VerbRelations {
    subjects: Vec<Mutex<Vec<usize>>>,
    objects: Vec<Mutex<Vec<usize>>>,
    pairs: Vec<Mutex<Vec<usize>>>,
    unique_subjects: bool,
    unique_objects: bool,
}

impl VerbRelations {

    pub fn new(len: usize, unique_subjects: bool, unique_objects: bool) -> Self {
        Self::from_relations(Relations::default(), len, unique_subjects, unique_objects)
    }

    /// Continues from tables of an earlier pass.
    pub fn from_relations(relations: Relations, len: usize, unique_subjects: bool, unique_objects: bool) -> Self {

        let arena = |table: RelationTable| -> Vec<Mutex<Vec<usize>>> {
            table.into_rows(len).into_iter().map(Mutex::new).collect()
        };
        Self {
            subjects: arena(relations.subjects),
            objects: arena(relations.objects),
            pairs: arena(relations.pairs),
            unique_subjects,
            unique_objects,
        }
    }

    pub fn scan(&self,
        pool: &ThreadPool,
        files: &[PathBuf],
        dictionary: &Dictionary,
        lemma_time: bool,
        progress: &ScanProgress) {

        pool.install(|| {
            scan_files(files, pool.current_num_threads(), progress, |block| self.extract_block(block, dictionary, lemma_time))
        });
    }

    pub fn extract_block(&self, block: &[u8], dictionary: &Dictionary, lemma_time: bool) {
        for sentence in Sentences::new(block, DEPENDENCY_COLUMNS) {
            self.extract_sentence(&sentence, dictionary, lemma_time);
        }
    }

    pub fn extract_sentence(&self, sentence: &[Token], dictionary: &Dictionary, lemma_time: bool) {

        let subjects = attachments(sentence, SUBJECT_REL, dictionary, lemma_time);
        let objects = attachments(sentence, OBJECT_REL, dictionary, lemma_time);

        for subject in &subjects {
            push(&self.subjects, subject.verb, &[subject.argument], self.unique_subjects);
        }
        for object in &objects {
            push(&self.objects, object.verb, &[object.argument], self.unique_objects);
        }

        // sentences are short, pair every subject with every object of the same verb token
        let unique_pairs = self.unique_subjects || self.unique_objects;
        for object in &objects {
            for subject in subjects.iter().filter(|s| s.verb_index == object.verb_index) {
                push(&self.pairs, object.verb, &[subject.argument, object.argument], unique_pairs);
            }
        }
    }

    pub fn into_relations(self) -> Relations {

        let table = |arena: Vec<Mutex<Vec<usize>>>| -> RelationTable {
            RelationTable::from_rows(arena
                .into_iter()
                .map(|row| row.into_inner().unwrap_or_else(PoisonError::into_inner))
                .collect())
        };
        let relations = Relations {
            subjects: table(self.subjects),
            objects: table(self.objects),
            pairs: table(self.pairs),
        };
        info!("{} verbs with subjects, {} with objects, {} with subject-object pairs",
            relations.subjects.verbs(), relations.objects.verbs(), relations.pairs.verbs());
        relations
    }
}

// appends `entry` to the verb's row, skipping it in unique mode when already present
fn push(arena: &[Mutex<Vec<usize>>], verb: usize, entry: &[usize], unique: bool) {

    let row = match arena.get(verb) {
        Some(row) => row,
        None => return,
    };
    let mut row = row.lock().unwrap_or_else(PoisonError::into_inner);
    if unique && row.chunks(entry.len()).any(|chunk| chunk == entry) {
        return;
    }
    row.extend_from_slice(entry);
}


/// How often a verb occurs with and without a direct object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerbStat {
    pub verb: String,
    pub object_hits: usize,
    pub alone_hits: usize,
}

impl VerbStat {
    pub fn total_hits(&self) -> usize {
        self.object_hits + self.alone_hits
    }

    pub fn is_transitive(&self) -> bool {
        self.object_hits > self.alone_hits
    }
}

/// Transitivity statistics over a fixed list of verbs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimStats {
    pub stats: Vec<VerbStat>,
}

impl SimStats {

    pub fn scan(pool: &ThreadPool,
        files: &[PathBuf],
        verbs: &[String],
        lemma_time: bool,
        progress: &ScanProgress) -> SimStats {

        let counter = StatsCounter::new(verbs);
        pool.install(|| {
            scan_files(files, pool.current_num_threads(), progress, |block| counter.count_block(block, lemma_time))
        });
        counter.into_stats()
    }

    pub fn classify(&self) -> Transitivity {
        let mut transitivity = Transitivity::default();
        for stat in &self.stats {
            if stat.is_transitive() {
                transitivity.transitive.insert(stat.verb.to_owned());
            } else {
                transitivity.intransitive.insert(stat.verb.to_owned());
            }
        }
        info!("{} transitive and {} intransitive verbs", transitivity.transitive.len(), transitivity.intransitive.len());
        transitivity
    }
}

struct StatsCounter {
    verbs: Vec<String>,
    index: HashMap<String, usize>,
    object_hits: Vec<AtomicUsize>,
    alone_hits: Vec<AtomicUsize>,
}

impl StatsCounter {

    fn new(verbs: &[String]) -> Self {
        let mut unique: Vec<String> = Vec::new();
        let mut index = HashMap::new();
        for verb in verbs {
            if !index.contains_key(verb) {
                index.insert(verb.to_owned(), unique.len());
                unique.push(verb.to_owned());
            }
        }
        Self {
            object_hits: (0..unique.len()).map(|_| AtomicUsize::new(0)).collect(),
            alone_hits: (0..unique.len()).map(|_| AtomicUsize::new(0)).collect(),
            verbs: unique,
            index,
        }
    }

    fn count_block(&self, block: &[u8], lemma_time: bool) {
        for sentence in Sentences::new(block, DEPENDENCY_COLUMNS) {
            self.count_sentence(&sentence, lemma_time);
        }
    }

    fn count_sentence(&self, sentence: &[Token], lemma_time: bool) {

        // occurrences of the listed verbs, by form
        let mut occurrences: Vec<(usize, String)> = Vec::new();
        let mut objects: Vec<&Token> = Vec::new();
        for token in sentence.iter().filter(|token| token.is_dependency()) {
            if token.is_verb() {
                if let Some(form) = token.form(lemma_time) {
                    if let Some(i) = self.index.get(&form) {
                        occurrences.push((*i, form));
                    }
                }
            } else if token.relation_is(OBJECT_REL) {
                objects.push(token);
            }
        }
        if occurrences.is_empty() {
            return;
        }

        let mut governing: HashSet<String> = HashSet::new();
        for object in objects {
            let verb = object.head().and_then(|head| governing_verb(sentence, head, |_| true));
            if let Some(form) = verb.and_then(|verb| verb.form(lemma_time)) {
                governing.insert(form);
            }
        }

        for (i, form) in occurrences {
            if governing.contains(&form) {
                self.object_hits[i].fetch_add(1, Ordering::Relaxed);
            } else {
                self.alone_hits[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn into_stats(self) -> SimStats {
        let stats = self.verbs
            .into_iter()
            .zip(self.object_hits.into_iter().zip(self.alone_hits))
            .map(|(verb, (object_hits, alone_hits))| VerbStat {
                verb,
                object_hits: object_hits.into_inner(),
                alone_hits: alone_hits.into_inner(),
            })
            .collect();
        SimStats { stats }
    }
}

// "<verb> <object_hits> <alone_hits> <total_hits>"
impl SaveFile for SimStats {
    fn save_file(&self, output_dir: &Path, file_name: &str) -> Result<()> {
        let mut f = create_writer(output_dir, file_name)?;
        for stat in &self.stats {
            writeln!(f, "{} {} {} {}", stat.verb, stat.object_hits, stat.alone_hits, stat.total_hits())?;
        }
        f.flush()?;
        Ok(())
    }
}

impl ReadFile for SimStats {
    type Item = Self;
    fn read_file(file_path: &Path) -> Result<Self::Item> {

        let mut stats = Vec::new();
        for (i, line) in open_lines(file_path)?.enumerate() {
            let line = line?;
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.is_empty() {
                continue;
            }
            if cols.len() < 3 {
                return Err(WackyError::invalid_format(file_path, i + 1, "expected verb, object hits and alone hits"));
            }
            let hits = |col: &str| col.parse::<usize>()
                .map_err(|e| WackyError::invalid_format(file_path, i + 1, e.to_string()));
            stats.push(VerbStat {
                verb: cols[0].to_owned(),
                object_hits: hits(cols[1])?,
                alone_hits: hits(cols[2])?,
            });
        }
        Ok(Self { stats })
    }
}

/// Verbs split by whether they mostly take a direct object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transitivity {
    pub transitive: HashSet<String>,
    pub intransitive: HashSet<String>,
}

impl Transitivity {

    pub fn is_transitive(&self, verb: &str) -> bool {
        self.transitive.contains(verb)
    }

    pub fn is_intransitive(&self, verb: &str) -> bool {
        self.intransitive.contains(verb)
    }
}
