
// imports
use crate::config::files_handling::{open_lines, ReadFile};
use crate::config::EvalMode;
use crate::dictionary::Dictionary;
use crate::error::{Result, WackyError};
use crate::math::{SimilarityMeasure, VectorMath};
use crate::relations::{Relations, Transitivity};

use log::{info, warn};
use ndarray::{Array1, Array2, ArrayView1, Axis, Zip};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

pub const INTRANSITIVE_COLUMNS: [&str; 13] = [
    "base_sim", "add_sim", "min_sim", "max_sim", "add_add_sim", "add_mul_sim", "min_add_sim",
    "min_mul_sim", "max_add_sim", "max_mul_sim", "krn_sim", "krn_add_sim", "krn_mul_sim",
];

pub const TRANSITIVE_COLUMNS: [&str; 7] = [
    "base_sim", "sbj_obj_sim", "sbj_obj_add", "sbj_obj_mul", "sum_sbj_obj", "sum_sbj_obj_mul", "sum_sbj_obj_add",
];

pub const ALL_COLUMNS: [&str; 7] = [
    "base_sim", "sum_sim", "sum_add_sim", "sum_mul_sim", "krn_sim", "krn_add_sim", "krn_mul_sim",
];

pub fn columns(mode: EvalMode) -> &'static [&'static str] {
    match mode {
        EvalMode::Intransitive => &INTRANSITIVE_COLUMNS,
        EvalMode::Transitive => &TRANSITIVE_COLUMNS,
        EvalMode::All => &ALL_COLUMNS,
    }
}

/// Results header: both verbs, every composition score, then the human score.
pub fn header(mode: EvalMode) -> Vec<&'static str> {
    let mut header = vec!["verb0", "verb1"];
    header.extend_from_slice(columns(mode));
    header.push("human_sim");
    header
}


/// Two verbs and their human similarity score.
#[derive(Clone, Debug, PartialEq)]
pub struct VerbPair {
    pub verb0: String,
    pub verb1: String,
    pub score: f32,
}

/// Distinct verbs of the gold pairs, in file order.
pub fn distinct_verbs(pairs: &[VerbPair]) -> Vec<String> {
    let mut seen = HashSet::new();
    pairs.iter()
        .flat_map(|pair| [&pair.verb0, &pair.verb1])
        .filter(|verb| seen.insert(verb.as_str()))
        .map(|verb| verb.to_owned())
        .collect()
}

// "verb0 verb1 [POS] score ...", the score is the fourth column when there is one
impl ReadFile for Vec<VerbPair> {
    type Item = Self;
    fn read_file(file_path: &Path) -> Result<Self::Item> {

        let mut pairs = Vec::new();
        for line in open_lines(file_path)? {
            let line = line?;
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 3 {
                continue;
            }
            let score = if cols.len() > 3 { cols[3] } else { cols[2] };
            if let Ok(score) = score.parse::<f32>() {
                pairs.push(VerbPair {
                    verb0: cols[0].to_lowercase(),
                    verb1: cols[1].to_lowercase(),
                    score,
                });
            }
        }
        info!("read {} verb pairs from {}", pairs.len(), file_path.display());
        Ok(pairs)
    }
}


/// PMI vectors and argument tables the compositions read from.
#[derive(Clone, Copy)]
pub struct VerbSpace<'a> {
    pub vectors: &'a Array2<f32>,
    pub dictionary: &'a Dictionary,
    pub relations: &'a Relations,
}

impl<'a> VerbSpace<'a> {

    fn width(&self) -> usize {
        self.vectors.ncols()
    }

    fn row(&self, id: usize) -> Array1<f32> {
        if id < self.vectors.nrows() {
            self.vectors.row(id).to_owned()
        } else {
            Array1::zeros(self.width())
        }
    }

    fn sum(&self, ids: &[usize]) -> Array1<f32> {
        let mut sum = Array1::zeros(self.width());
        for id in ids.iter().filter(|id| **id < self.vectors.nrows()) {
            sum += &self.vectors.row(*id);
        }
        sum
    }

    // elementwise min and max over the argument vectors, zeros without arguments
    fn min_max(&self, ids: &[usize]) -> (Array1<f32>, Array1<f32>) {

        let mut rows = ids.iter()
            .filter(|id| **id < self.vectors.nrows())
            .map(|id| self.vectors.row(*id));
        let first = match rows.next() {
            Some(first) => first,
            None => return (Array1::zeros(self.width()), Array1::zeros(self.width())),
        };

        let mut min = first.to_owned();
        let mut max = first.to_owned();
        for row in rows {
            Zip::from(&mut min).and(&mut max).and(&row).for_each(|lo, hi, x| {
                *lo = lo.min(*x);
                *hi = hi.max(*x);
            });
        }
        (min, max)
    }

    // Σ (subject + object) over interleaved pairs, unpaired arguments are left out
    fn sum_pairs(&self, pairs: &[usize]) -> Array1<f32> {
        let mut sum = Array1::zeros(self.width());
        for pair in pairs.chunks_exact(2) {
            sum += &self.row(pair[0]);
            sum += &self.row(pair[1]);
        }
        sum
    }

    // Σ subject ⊗ object over interleaved pairs
    fn sum_outer_pairs<M: VectorMath + ?Sized>(&self, math: &M, pairs: &[usize]) -> Array1<f32> {
        let mut krn = Array1::zeros(self.width() * self.width());
        for pair in pairs.chunks_exact(2) {
            krn += &math.outer(self.row(pair[0]).view(), self.row(pair[1]).view());
        }
        krn
    }
}

/// The 13 intransitive compositions of a verb, in [`INTRANSITIVE_COLUMNS`] order.
pub fn intransitive<M: VectorMath + ?Sized>(math: &M, space: &VerbSpace, verb: usize) -> Vec<Array1<f32>> {

    let base = space.row(verb);
    let subjects = space.relations.subjects.get(verb);
    let add = space.sum(subjects);
    let (min, max) = space.min_max(subjects);
    let krn = math.outer(add.view(), add.view());
    let krn_base = math.outer(base.view(), base.view());

    let add_add = math.add(add.view(), base.view());
    let add_mul = math.mul(add.view(), base.view());
    let min_add = math.add(min.view(), base.view());
    let min_mul = math.mul(min.view(), base.view());
    let max_add = math.add(max.view(), base.view());
    let max_mul = math.mul(max.view(), base.view());
    let krn_add = math.add(krn.view(), krn_base.view());
    let krn_mul = math.mul(krn.view(), krn_base.view());

    vec![base, add, min, max, add_add, add_mul, min_add, min_mul, max_add, max_mul, krn, krn_add, krn_mul]
}

/// The 7 transitive compositions of a verb, in [`TRANSITIVE_COLUMNS`] order.
pub fn transitive<M: VectorMath + ?Sized>(math: &M, space: &VerbSpace, verb: usize) -> Vec<Array1<f32>> {

    let base = space.row(verb);
    let krn = space.sum_outer_pairs(math, space.relations.pairs.get(verb));
    let krn_base = math.outer(base.view(), base.view());
    let sum = space.sum_pairs(space.relations.pairs.get(verb));

    let krn_add = math.add(krn.view(), krn_base.view());
    let krn_mul = math.mul(krn.view(), krn_base.view());
    let sum_mul = math.mul(sum.view(), base.view());
    let sum_add = math.add(sum.view(), base.view());

    vec![base, krn, krn_add, krn_mul, sum, sum_mul, sum_add]
}

/// The 7 compositions of mixed evaluation, in [`ALL_COLUMNS`] order.
///
/// Transitive verbs compose their (subject, object) pairs, the others their subjects only.
pub fn mixed<M: VectorMath + ?Sized>(math: &M, space: &VerbSpace, verb: usize, is_transitive: bool) -> Vec<Array1<f32>> {

    let base = space.row(verb);
    let (sum, krn) = if is_transitive {
        let pairs = space.relations.pairs.get(verb);
        (space.sum_pairs(pairs), space.sum_outer_pairs(math, pairs))
    } else {
        let sum = space.sum(space.relations.subjects.get(verb));
        let krn = math.outer(sum.view(), sum.view());
        (sum, krn)
    };
    let krn_base = math.outer(base.view(), base.view());

    let sum_add = math.add(sum.view(), base.view());
    let sum_mul = math.mul(sum.view(), base.view());
    let krn_add = math.add(krn.view(), krn_base.view());
    let krn_mul = math.mul(krn.view(), krn_base.view());

    vec![base, sum, sum_add, sum_mul, krn, krn_add, krn_mul]
}


/// Scores gold verb pairs under one evaluation mode.
pub struct Evaluator<'a, M: VectorMath> {
    math: M,
    space: VerbSpace<'a>,
    transitivity: &'a Transitivity,
    measure: SimilarityMeasure,
    mode: EvalMode,
}

impl<'a, M: VectorMath> Evaluator<'a, M> {

    pub fn new(math: M, space: VerbSpace<'a>, transitivity: &'a Transitivity, measure: SimilarityMeasure, mode: EvalMode) -> Self {
        Self { math, space, transitivity, measure, mode }
    }

    fn verb_id(&self, verb: &str) -> Option<usize> {
        self.space.dictionary.id(verb).filter(|id| !self.space.dictionary.is_unk(*id))
    }

    /// True when both verbs are known and belong to the mode's class.
    pub fn selects(&self, pair: &VerbPair) -> bool {

        for verb in [&pair.verb0, &pair.verb1] {
            if self.verb_id(verb).is_none() {
                warn!("skipping pair {} {}: {} is not in the dictionary", pair.verb0, pair.verb1, verb);
                return false;
            }
        }
        match self.mode {
            EvalMode::Intransitive => self.transitivity.is_intransitive(&pair.verb0) && self.transitivity.is_intransitive(&pair.verb1),
            EvalMode::Transitive => self.transitivity.is_transitive(&pair.verb0) && self.transitivity.is_transitive(&pair.verb1),
            EvalMode::All => true,
        }
    }

    pub fn compose(&self, verb: &str) -> Option<Vec<Array1<f32>>> {
        let id = self.verb_id(verb)?;
        let compositions = match self.mode {
            EvalMode::Intransitive => intransitive(&self.math, &self.space, id),
            EvalMode::Transitive => transitive(&self.math, &self.space, id),
            EvalMode::All => mixed(&self.math, &self.space, id, self.transitivity.is_transitive(verb)),
        };
        Some(compositions)
    }

    /// One score per composition, in [`columns`] order.
    pub fn score(&self, pair: &VerbPair) -> Option<Vec<f32>> {
        let first = self.compose(&pair.verb0)?;
        let second = self.compose(&pair.verb1)?;
        Some(first.iter()
            .zip(second.iter())
            .map(|(u, v)| self.measure.score(&self.math, u.view(), v.view()))
            .collect())
    }

    /// Scores the selected pairs on the pool, one static slice per worker, and appends one
    /// CSV row per pair to `results_file`. Returns the number of rows written.
    pub fn run(&self, pool: &ThreadPool, pairs: &[VerbPair], results_file: &Path) -> Result<usize> {

        let selected: Vec<&VerbPair> = pairs.iter().filter(|pair| self.selects(pair)).collect();
        info!("evaluating {} of {} pairs in {} mode", selected.len(), pairs.len(), self.mode.name());

        if let Some(parent) = results_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(results_file)?;
        writer.write_record(header(self.mode))?;
        writer.flush()?;
        let writer = Mutex::new(writer);

        let workers = pool.current_num_threads().max(1);
        let slice_size = ((selected.len() + workers - 1) / workers).max(1);

        pool.install(|| {
            selected.par_chunks(slice_size).try_for_each(|slice| -> Result<()> {
                for pair in slice {
                    let scores = match self.score(pair) {
                        Some(scores) => scores,
                        None => continue,
                    };
                    let mut record = vec![pair.verb0.to_owned(), pair.verb1.to_owned()];
                    record.extend(scores.iter().map(|s| s.to_string()));
                    record.push(pair.score.to_string());

                    // whole rows only, workers never interleave within one
                    let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
                    writer.write_record(&record)?;
                    writer.flush()?;
                }
                Ok(())
            })
        })?;

        info!("wrote results to {}", results_file.display());
        Ok(selected.len())
    }
}


/// The `k` dictionary words closest to `word`, best first.
pub fn find_k_most_similar<M: VectorMath + ?Sized>(math: &M,
    measure: SimilarityMeasure,
    vectors: &Array2<f32>,
    dictionary: &Dictionary,
    word: &str,
    k: usize) -> Result<Vec<(String, f32)>> {

    let id = dictionary.id(word)
        .filter(|id| !dictionary.is_unk(*id) && *id < vectors.nrows())
        .ok_or_else(|| WackyError::UnknownWord(word.to_owned()))?;
    let target: ArrayView1<f32> = vectors.row(id);

    let mut scores: Vec<(usize, f32)> = vectors
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(i, _)| *i != id && !dictionary.is_unk(*i))
        .map(|(i, row)| (i, measure.score(math, target, row)))
        .collect();

    // sort by most similar in descending order
    scores.sort_by(|(_, s), (_, t)| t.total_cmp(s));

    Ok(scores
        .into_iter()
        .take(k)
        .filter_map(|(i, score)| dictionary.word(i).map(|w| (w.to_owned(), score)))
        .collect())
}
