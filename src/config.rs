
// imports
use crate::corpus::ScanOptions;
use crate::error::{Result, WackyError};
use crate::math::SimilarityMeasure;

use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Display;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub mod files_handling;

/// Tokens never counted, whatever their columns say.
pub const DEFAULT_IGNORES: [&str; 12] = [
    ",", "-", ".", "@card@", "<text", "<s>xt", "</s>SENT", "<s>>SENT", "<s>", "</s>", "<text>", "</text>",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalMode {
    Intransitive,
    Transitive,
    All,
}

impl EvalMode {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "intransitive" => Ok(EvalMode::Intransitive),
            "transitive" => Ok(EvalMode::Transitive),
            "all" => Ok(EvalMode::All),
            other => Err(WackyError::InvalidConfig(format!("unrecognized evaluate mode {}", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EvalMode::Intransitive => "intransitive",
            EvalMode::Transitive => "transitive",
            EvalMode::All => "all",
        }
    }
}

#[derive(Clone, Debug)]
pub struct JsonEval {
    pub mode: EvalMode,
    pub results_file: PathBuf,
    pub similarity: SimilarityMeasure,
}

impl Display for JsonEval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evaluation parameters:
        mode: {},
        results_file: {},
        similarity: {:?}",
        self.mode.name(), self.results_file.display(), self.similarity)
    }
}

#[derive(Clone, Debug)]
pub struct JsonTypes {
    pub corpus_dir: PathBuf,
    pub output_dir: PathBuf,
    pub vocab_size: usize,
    pub basis_size: usize,
    pub ignore_window: usize,
    pub window_size: usize,
    pub lemma_time: bool,
    pub unique_subjects: bool,
    pub unique_objects: bool,
    pub num_threads: usize,
    pub read_in: bool,
    pub word_ignores: HashSet<String>,
    pub insist_file: Option<PathBuf>,
    pub build_counts: bool,
    pub build_vectors: bool,
    pub build_relations: bool,
    pub simverb_file: Option<PathBuf>,
    pub sim_stats: bool,
    pub export_npy: bool,
    pub json_eval: Option<JsonEval>,
}

impl Display for JsonTypes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "using parameters:
        corpus_dir: {}
        output_dir: {}
        vocab_size: {}
        basis_size: {}
        ignore_window: {}
        window_size: {}
        lemma_time: {}
        unique_subjects: {}
        unique_objects: {}
        num_threads: {}
        read_in: {}
        stages: counts={} vectors={} relations={} sim_stats={}",
        self.corpus_dir.display(), self.output_dir.display(), self.vocab_size, self.basis_size,
        self.ignore_window, self.window_size, self.lemma_time, self.unique_subjects, self.unique_objects,
        self.num_threads, self.read_in, self.build_counts, self.build_vectors, self.build_relations, self.sim_stats)?;
        if let Some(json_eval) = &self.json_eval {
            write!(f, "\n        {}", json_eval)?;
        }
        Ok(())
    }
}

impl JsonTypes {

    /// Parameters with every optional value at its default.
    pub fn with_dirs(corpus_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            corpus_dir: corpus_dir.into(),
            output_dir: output_dir.into(),
            vocab_size: 500000,
            basis_size: 5000,
            ignore_window: 100,
            window_size: 3,
            lemma_time: true,
            unique_subjects: false,
            unique_objects: false,
            num_threads: rayon::current_num_threads(),
            read_in: false,
            word_ignores: DEFAULT_IGNORES.iter().map(|w| w.to_string()).collect(),
            insist_file: None,
            build_counts: false,
            build_vectors: false,
            build_relations: false,
            simverb_file: None,
            sim_stats: false,
            export_npy: false,
            json_eval: None,
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            lemma_time: self.lemma_time,
            ignores: self.word_ignores.clone(),
        }
    }
}

pub struct Config {
    params: JsonTypes
}

impl Config {

    pub fn get_params(&self) -> JsonTypes {
        self.params.clone()
    }

    pub fn new(args: &[String]) -> Result<Config> {

        if args.len() != 2 {
            return Err(WackyError::InvalidConfig("input should be a path to json file only".to_string()));
        }

        // parse input json
        let f = BufReader::new(File::open(&args[1])?);
        let json: Value = serde_json::from_reader(f)?;

        Ok(Self { params: Config::from_json(&json)? })
    }

    pub fn from_json(json: &Value) -> Result<JsonTypes> {

        // corpus and output directories have no defaults
        let corpus_dir = get_str(json, "corpus_dir")?
            .ok_or_else(|| WackyError::InvalidConfig("corpus_dir was not supplied through json".to_string()))?;
        let output_dir = get_str(json, "output_dir")?
            .ok_or_else(|| WackyError::InvalidConfig("output_dir was not supplied through json".to_string()))?;

        // handle default vs input parameters
        let mut params = JsonTypes::with_dirs(corpus_dir, &output_dir);
        if let Some(vocab_size) = get_usize(json, "vocab_size")? { params.vocab_size = vocab_size }
        if let Some(basis_size) = get_usize(json, "basis_size")? { params.basis_size = basis_size }
        if let Some(ignore_window) = get_usize(json, "ignore_window")? { params.ignore_window = ignore_window }
        if let Some(window_size) = get_usize(json, "window_size")? { params.window_size = window_size }
        if let Some(lemma_time) = get_bool(json, "lemma_time")? { params.lemma_time = lemma_time }
        if let Some(unique) = get_bool(json, "unique_subjects")? { params.unique_subjects = unique }
        if let Some(unique) = get_bool(json, "unique_objects")? { params.unique_objects = unique }
        if let Some(num_threads) = get_usize(json, "num_threads")? { params.num_threads = num_threads.max(1) }
        if let Some(read_in) = get_bool(json, "read_in")? { params.read_in = read_in }
        if let Some(build) = get_bool(json, "build_counts")? { params.build_counts = build }
        if let Some(build) = get_bool(json, "build_vectors")? { params.build_vectors = build }
        if let Some(build) = get_bool(json, "build_relations")? { params.build_relations = build }
        if let Some(sim_stats) = get_bool(json, "sim_stats")? { params.sim_stats = sim_stats }
        if let Some(export_npy) = get_bool(json, "export_npy")? { params.export_npy = export_npy }
        params.insist_file = get_str(json, "insist_file")?.map(PathBuf::from);
        params.simverb_file = get_str(json, "simverb_file")?.map(PathBuf::from);

        if let Some(ignores) = json.get("word_ignores") {
            let ignores = ignores.as_array()
                .ok_or_else(|| WackyError::InvalidConfig("word_ignores should be an array of strings".to_string()))?;
            params.word_ignores = ignores.iter()
                .map(|w| w.as_str().map(|w| w.to_string())
                    .ok_or_else(|| WackyError::InvalidConfig("word_ignores should be an array of strings".to_string())))
                .collect::<Result<HashSet<String>>>()?;
        }

        if let Some(mode) = get_str(json, "evaluate")? {
            let mode = EvalMode::parse(&mode)?;
            let results_file = match get_str(json, "results_file")? {
                Some(results_file) => PathBuf::from(results_file),
                None => Path::new(&output_dir).join(format!("results_{}.csv", mode.name())),
            };
            let similarity = match get_str(json, "similarity")? {
                Some(name) => SimilarityMeasure::parse(&name)?,
                None => SimilarityMeasure::Cosine,
            };
            params.json_eval = Some(JsonEval { mode, results_file, similarity });
        }

        Ok(params)
    }

}

fn get_str(json: &Value, key: &str) -> Result<Option<String>> {
    match json.get(key) {
        Some(value) => value.as_str()
            .map(|s| Some(s.to_owned()))
            .ok_or_else(|| WackyError::InvalidConfig(format!("given {} is not a string", key))),
        None => Ok(None),
    }
}

fn get_usize(json: &Value, key: &str) -> Result<Option<usize>> {
    match json.get(key) {
        Some(value) => value.as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| WackyError::InvalidConfig(format!("given {} is not a non-negative integer", key))),
        None => Ok(None),
    }
}

fn get_bool(json: &Value, key: &str) -> Result<Option<bool>> {
    match json.get(key) {
        Some(value) => value.as_bool()
            .map(Some)
            .ok_or_else(|| WackyError::InvalidConfig(format!("given {} is not boolean", key))),
        None => Ok(None),
    }
}


#[cfg(test)]
mod tests {

    use super::{Config, EvalMode};
    use crate::math::SimilarityMeasure;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn defaults_and_overrides() {

        let json = json!({
            "corpus_dir": "ukwac",
            "output_dir": "out",
            "vocab_size": 1000,
            "lemma_time": false,
            "evaluate": "transitive",
            "similarity": "angular"
        });

        let params = Config::from_json(&json).unwrap();
        assert_eq!(params.vocab_size, 1000);
        assert_eq!(params.basis_size, 5000);
        assert_eq!(params.window_size, 3);
        assert!(!params.lemma_time);
        assert!(params.word_ignores.contains("@card@"));

        let json_eval = params.json_eval.unwrap();
        assert_eq!(json_eval.mode, EvalMode::Transitive);
        assert_eq!(json_eval.similarity, SimilarityMeasure::Angular);
        assert_eq!(json_eval.results_file, PathBuf::from("out").join("results_transitive.csv"));
    }

    #[test]
    fn wrong_types_are_errors() {

        assert!(Config::from_json(&json!({"output_dir": "out"})).is_err());
        assert!(Config::from_json(&json!({"corpus_dir": "c", "output_dir": "o", "window_size": "three"})).is_err());
        assert!(Config::from_json(&json!({"corpus_dir": "c", "output_dir": "o", "evaluate": "both"})).is_err());
    }
}
