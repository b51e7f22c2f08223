
// imports
use crate::basis::Basis;
use crate::blocks::{list_corpus_files, worker_pool};
use crate::config::files_handling::{self, read_input, save_output};
use crate::config::{Config, JsonEval, JsonTypes};
use crate::dictionary::{Dictionary, FrequencyCounter, FrequencyTable};
use crate::error::{Result, WackyError};
use crate::math::NdMath;
use crate::progress::ScanProgress;
use crate::relations::{RelationTable, Relations, SimStats, Transitivity, VerbRelations};
use crate::similarity::{distinct_verbs, Evaluator, VerbPair, VerbSpace};
use crate::vectors::{self, CooccurrenceCounter, TokenTotals};

use log::info;
use ndarray::Array2;
use rayon::ThreadPool;
use std::collections::HashSet;
use std::env;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// State threaded through the stages of one run.
pub struct Context {
    pub params: JsonTypes,
    pub pool: ThreadPool,
    pub frequencies: FrequencyTable,
    pub allowed: HashSet<String>,
    pub dictionary: Dictionary,
    pub basis: Basis,
    pub totals: Option<TokenTotals>,
    pub counts: Option<Array2<f32>>,
    pub relations: Option<Relations>,
    pub transitivity: Option<Transitivity>,
    files: Option<Vec<PathBuf>>,
}

impl Context {

    fn output(&self, file_name: &str) -> PathBuf {
        self.params.output_dir.join(file_name)
    }

    fn corpus_files(&mut self) -> Result<Vec<PathBuf>> {
        if let Some(files) = &self.files {
            return Ok(files.clone());
        }
        let files = list_corpus_files(&self.params.corpus_dir)?;
        info!("found {} corpus files in {}", files.len(), self.params.corpus_dir.display());
        self.files = Some(files.clone());
        Ok(files)
    }

    fn total_count(&self) -> Result<usize> {
        match self.totals {
            Some(totals) => Ok(totals.total),
            None => read_input::<usize>(&self.output(files_handling::TOTAL_COUNT_FILE)),
        }
    }
}

/// Logs a scanning pass every 10%.
fn logged_progress(stage: &'static str) -> ScanProgress {
    let reported = AtomicUsize::new(0);
    ScanProgress::with_callback(move |done, total| {
        if total == 0 {
            return;
        }
        let decile = (done * 10 / total).min(10);
        if decile > reported.fetch_max(decile, Ordering::Relaxed) {
            info!("{}: {}%", stage, decile * 10);
        }
    })
}

pub struct Pipeline {}

impl Pipeline {

    // runs the stages in order -
    // -> frequencies, dictionary and basis (scanned or read in)
    // -> optional token totals, co-occurrence vectors and relation tables
    // -> optional transitivity statistics and evaluation

    pub fn run() -> std::result::Result<(), Box<dyn Error>> {

        info!("entering program...");
        let args: Vec<String> = env::args().collect();

        info!("building parameters...");
        let params = Config::new(&args)?.get_params();
        info!("{}", params);

        Pipeline::run_with(params)?;
        Ok(())
    }

    pub fn run_with(params: JsonTypes) -> Result<Context> {

        Pipeline::check_preconditions(&params)?;
        let pool = worker_pool(params.num_threads)?;

        let timer = Instant::now();
        let mut ctx = Pipeline::dictionary_stage(params, pool)?;
        info!("dictionary of {} words and basis of {} ready, took {} seconds ...",
            ctx.dictionary.len(), ctx.basis.len(), timer.elapsed().as_secs());

        if ctx.params.build_counts {
            let timer = Instant::now();
            Pipeline::totals_stage(&mut ctx)?;
            info!("finished token totals, took {} seconds ...", timer.elapsed().as_secs());
        }

        if ctx.params.build_vectors {
            let timer = Instant::now();
            Pipeline::vectors_stage(&mut ctx)?;
            info!("finished word vectors, took {} seconds ...", timer.elapsed().as_secs());
        }

        if ctx.params.build_relations {
            let timer = Instant::now();
            Pipeline::relations_stage(&mut ctx)?;
            info!("finished verb relations, took {} seconds ...", timer.elapsed().as_secs());
        }

        if ctx.params.sim_stats {
            let timer = Instant::now();
            Pipeline::sim_stats_stage(&mut ctx)?;
            info!("finished transitivity statistics, took {} seconds ...", timer.elapsed().as_secs());
        }

        if let Some(json_eval) = ctx.params.json_eval.clone() {
            let timer = Instant::now();
            Pipeline::evaluation_stage(&mut ctx, &json_eval)?;
            info!("finished evaluation, took {} seconds ...", timer.elapsed().as_secs());
        }

        Ok(ctx)
    }

    /// Fails before any scan when a requested stage is missing one of its inputs.
    pub fn check_preconditions(params: &JsonTypes) -> Result<()> {

        let out = |file_name: &str| params.output_dir.join(file_name);
        let require = |path: &Path, why: &str| -> Result<()> {
            if path.is_file() {
                Ok(())
            } else {
                Err(WackyError::missing(format!("{} does not exist, {}", path.display(), why)))
            }
        };

        let scans = !params.read_in || params.build_counts || params.build_vectors
            || params.build_relations || params.sim_stats;
        if scans && !params.corpus_dir.is_dir() {
            return Err(WackyError::missing(format!("corpus directory {} does not exist", params.corpus_dir.display())));
        }

        if params.read_in {
            for file_name in [files_handling::FREQ_FILE, files_handling::ALLOWED_FILE, files_handling::DICTIONARY_FILE] {
                require(&out(file_name), "needed to read in the dictionary")?;
            }
        }
        if let Some(insist_file) = &params.insist_file {
            require(insist_file, "insist_file was given")?;
        }

        if params.sim_stats || params.json_eval.is_some() {
            match &params.simverb_file {
                Some(simverb_file) => require(simverb_file, "verb pairs are needed")?,
                None => return Err(WackyError::missing("simverb_file is needed for sim_stats and evaluate")),
            }
        }

        if params.json_eval.is_some() {
            if !params.build_vectors {
                require(&out(files_handling::WORD_VECTORS_FILE), "build_vectors is off")?;
            }
            if !params.build_counts {
                require(&out(files_handling::TOTAL_COUNT_FILE), "build_counts is off")?;
            }
            if !params.sim_stats {
                require(&out(files_handling::SIM_STATS_FILE), "sim_stats is off")?;
            }
            if !params.build_relations {
                for file_name in [files_handling::VERB_SUBJECTS_FILE, files_handling::VERB_OBJECTS_FILE, files_handling::VERB_SBJ_OBJ_FILE] {
                    require(&out(file_name), "build_relations is off")?;
                }
            }
        }

        if params.export_npy && !params.build_vectors {
            return Err(WackyError::InvalidConfig("export_npy needs build_vectors".to_string()));
        }
        if params.export_npy && !params.build_counts {
            require(&out(files_handling::TOTAL_COUNT_FILE), "export_npy converts counts to pmi")?;
        }

        Ok(())
    }

    fn dictionary_stage(params: JsonTypes, pool: ThreadPool) -> Result<Context> {

        let output_dir = params.output_dir.clone();
        let mut files = None;

        let (frequencies, allowed, dictionary) = if params.read_in {
            info!("reading in frequencies and dictionary from {}", output_dir.display());
            let frequencies = read_input::<FrequencyTable>(&output_dir.join(files_handling::FREQ_FILE))?;
            let allowed = read_input::<HashSet<String>>(&output_dir.join(files_handling::ALLOWED_FILE))?;
            let dictionary = read_input::<Dictionary>(&output_dir.join(files_handling::DICTIONARY_FILE))?;
            (frequencies, allowed, dictionary)
        } else {
            let corpus_files = list_corpus_files(&params.corpus_dir)?;
            info!("counting words in {} files with {} workers", corpus_files.len(), pool.current_num_threads());

            let progress = logged_progress("frequencies");
            let (frequencies, allowed) = FrequencyCounter::scan(&pool, &corpus_files, &params.scan_options(), &progress);
            let dictionary = Dictionary::from_ranked(&frequencies.ranked(), params.vocab_size);

            save_output(&output_dir, files_handling::FREQ_FILE, &frequencies)?;
            save_output(&output_dir, files_handling::ALLOWED_FILE, &allowed)?;
            save_output(&output_dir, files_handling::DICTIONARY_FILE, &dictionary)?;
            files = Some(corpus_files);
            (frequencies, allowed, dictionary)
        };

        let basis_file = output_dir.join(files_handling::BASIS_FILE);
        let basis = if params.read_in && basis_file.is_file() {
            read_input::<Basis>(&basis_file)?
        } else {
            let insist = match &params.insist_file {
                Some(insist_file) => read_input::<Vec<String>>(insist_file)?,
                None => Vec::new(),
            };
            let basis = Basis::select(&frequencies.ranked(), &dictionary, &allowed, &insist,
                params.basis_size, params.ignore_window);
            save_output(&output_dir, files_handling::BASIS_FILE, &basis)?;
            basis
        };
        basis.check(&dictionary)?;

        Ok(Context {
            params,
            pool,
            frequencies,
            allowed,
            dictionary,
            basis,
            totals: None,
            counts: None,
            relations: None,
            transitivity: None,
            files,
        })
    }

    fn totals_stage(ctx: &mut Context) -> Result<()> {

        let files = ctx.corpus_files()?;
        let progress = logged_progress("token totals");
        let totals = TokenTotals::scan(&ctx.pool, &files, &ctx.dictionary, &ctx.params.scan_options(), &progress);

        save_output(&ctx.params.output_dir, files_handling::UNK_COUNT_FILE, &totals.unk)?;
        save_output(&ctx.params.output_dir, files_handling::TOTAL_COUNT_FILE, &totals.total)?;
        ctx.totals = Some(totals);
        Ok(())
    }

    fn vectors_stage(ctx: &mut Context) -> Result<()> {

        if ctx.basis.is_empty() {
            return Err(WackyError::missing("the basis is empty, no vectors can be built"));
        }

        let files = ctx.corpus_files()?;
        let progress = logged_progress("word vectors");
        let counts = CooccurrenceCounter::scan(&ctx.pool, &files, &ctx.dictionary, &ctx.basis,
            &ctx.params.scan_options(), ctx.params.window_size, &progress)?;
        save_output(&ctx.params.output_dir, files_handling::WORD_VECTORS_FILE, &counts)?;

        if ctx.params.export_npy {
            let freqs = ctx.dictionary.frequencies(&ctx.frequencies);
            let pmi = vectors::pmi(&counts, &freqs, &ctx.basis, ctx.total_count()?, None);
            vectors::export_npy(&ctx.output(files_handling::WORD_VECTORS_NPY), &pmi)?;
            info!("exported pmi vectors to {}", files_handling::WORD_VECTORS_NPY);
        }

        ctx.counts = Some(counts);
        Ok(())
    }

    fn read_relations(ctx: &Context) -> Result<Relations> {
        Ok(Relations {
            subjects: read_input::<RelationTable>(&ctx.output(files_handling::VERB_SUBJECTS_FILE))?,
            objects: read_input::<RelationTable>(&ctx.output(files_handling::VERB_OBJECTS_FILE))?,
            pairs: read_input::<RelationTable>(&ctx.output(files_handling::VERB_SBJ_OBJ_FILE))?,
        })
    }

    fn relations_stage(ctx: &mut Context) -> Result<()> {

        // tables of an earlier pass are extended, not replaced
        let previous = if ctx.params.read_in && ctx.output(files_handling::VERB_SUBJECTS_FILE).is_file() {
            info!("appending to the verb tables in {}", ctx.params.output_dir.display());
            Pipeline::read_relations(ctx)?
        } else {
            Relations::default()
        };

        let files = ctx.corpus_files()?;
        let relations = VerbRelations::from_relations(previous, ctx.dictionary.len(),
            ctx.params.unique_subjects, ctx.params.unique_objects);
        let progress = logged_progress("verb relations");
        relations.scan(&ctx.pool, &files, &ctx.dictionary, ctx.params.lemma_time, &progress);
        let relations = relations.into_relations();

        let output_dir = &ctx.params.output_dir;
        save_output(output_dir, files_handling::VERB_SUBJECTS_FILE, &relations.subjects)?;
        save_output(output_dir, files_handling::VERB_OBJECTS_FILE, &relations.objects)?;
        save_output(output_dir, files_handling::VERB_SBJ_OBJ_FILE, &relations.pairs)?;
        ctx.relations = Some(relations);
        Ok(())
    }

    fn verb_pairs(ctx: &Context) -> Result<Vec<VerbPair>> {
        match &ctx.params.simverb_file {
            Some(simverb_file) => read_input::<Vec<VerbPair>>(simverb_file),
            None => Err(WackyError::missing("simverb_file was not given")),
        }
    }

    fn sim_stats_stage(ctx: &mut Context) -> Result<()> {

        let verbs = distinct_verbs(&Pipeline::verb_pairs(ctx)?);
        let files = ctx.corpus_files()?;
        let progress = logged_progress("transitivity statistics");
        let stats = SimStats::scan(&ctx.pool, &files, &verbs, ctx.params.lemma_time, &progress);

        save_output(&ctx.params.output_dir, files_handling::SIM_STATS_FILE, &stats)?;
        ctx.transitivity = Some(stats.classify());
        Ok(())
    }

    fn evaluation_stage(ctx: &mut Context, json_eval: &JsonEval) -> Result<()> {

        info!("{}", json_eval);
        let pairs = Pipeline::verb_pairs(ctx)?;

        if ctx.transitivity.is_none() {
            let stats = read_input::<SimStats>(&ctx.output(files_handling::SIM_STATS_FILE))?;
            ctx.transitivity = Some(stats.classify());
        }
        if ctx.relations.is_none() {
            ctx.relations = Some(Pipeline::read_relations(ctx)?);
        }
        if ctx.counts.is_none() {
            ctx.counts = Some(read_input::<Array2<f32>>(&ctx.output(files_handling::WORD_VECTORS_FILE))?);
        }

        let (counts, relations, transitivity) = match (&ctx.counts, &ctx.relations, &ctx.transitivity) {
            (Some(counts), Some(relations), Some(transitivity)) => (counts, relations, transitivity),
            _ => return Err(WackyError::missing("evaluation inputs were not loaded")),
        };
        if counts.dim() != (ctx.dictionary.len(), ctx.basis.len()) {
            return Err(WackyError::missing(format!(
                "{} is {:?}, the dictionary and basis need ({}, {})", files_handling::WORD_VECTORS_FILE,
                counts.dim(), ctx.dictionary.len(), ctx.basis.len())));
        }

        // only the gold verbs and their arguments are converted
        let mut rows: HashSet<usize> = HashSet::new();
        for verb in distinct_verbs(&pairs) {
            if let Some(id) = ctx.dictionary.id(&verb) {
                rows.insert(id);
                rows.extend(relations.subjects.get(id));
                rows.extend(relations.objects.get(id));
            }
        }
        info!("converting {} rows to pmi", rows.len());

        let freqs = ctx.dictionary.frequencies(&ctx.frequencies);
        let pmi = vectors::pmi(counts, &freqs, &ctx.basis, ctx.total_count()?, Some(&rows));

        let space = VerbSpace { vectors: &pmi, dictionary: &ctx.dictionary, relations };
        let evaluator = Evaluator::new(NdMath, space, transitivity, json_eval.similarity, json_eval.mode);
        evaluator.run(&ctx.pool, &pairs, &json_eval.results_file)?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {

    use super::Pipeline;
    use crate::config::files_handling::{read_input, DICTIONARY_FILE, TOTAL_COUNT_FILE, VERB_SUBJECTS_FILE};
    use crate::config::{EvalMode, JsonEval, JsonTypes};
    use crate::dictionary::Dictionary;
    use crate::error::WackyError;
    use crate::math::SimilarityMeasure;
    use crate::relations::RelationTable;
    use std::fs;
    use std::path::Path;

    const CORPUS: &str = "<text id=1>\n<s>\n\
        the\tthe\tDT\t1\t2\t-\n\
        cat\tcat\tNN\t2\t3\tSBJ\n\
        sat\tsit\tVV\t3\t0\tROOT\n\
        </s>\n<s>\n\
        the\tthe\tDT\t1\t2\t-\n\
        dog\tdog\tNN\t2\t3\tSBJ\n\
        ran\trun\tVV\t3\t0\tROOT\n\
        </s>\n</text>\n";

    fn params(root: &Path) -> JsonTypes {

        let corpus_dir = root.join("corpus");
        fs::create_dir_all(&corpus_dir).unwrap();
        fs::write(corpus_dir.join("ukwac_1.txt"), CORPUS).unwrap();

        let mut params = JsonTypes::with_dirs(corpus_dir, root.join("out"));
        params.vocab_size = 10;
        params.basis_size = 10;
        params.ignore_window = 0;
        params.num_threads = 2;
        params
    }

    #[test]
    fn end_to_end_tables() {

        let dir = tempfile::tempdir().unwrap();
        let mut params = params(dir.path());
        params.build_counts = true;
        params.build_vectors = true;
        params.build_relations = true;

        let ctx = Pipeline::run_with(params.clone()).unwrap();
        for word in ["cat", "dog", "sit", "run"] {
            assert_eq!(ctx.frequencies.get(word), 1);
        }
        assert_eq!(ctx.frequencies.get("the"), 2);
        assert_eq!(ctx.dictionary.words(), &["cat", "dog", "run", "sit", "the", "UNK"]);
        assert_eq!(ctx.basis.len(), 4);
        assert_eq!(ctx.totals.unwrap().total, 6);

        let id = |w: &str| ctx.dictionary.id(w).unwrap();
        let relations = ctx.relations.as_ref().unwrap();
        assert_eq!(relations.subjects.get(id("sit")), &[id("cat")]);
        assert_eq!(relations.subjects.get(id("run")), &[id("dog")]);
        assert_eq!(relations.objects.entries(), 0);

        let out = &params.output_dir;
        assert_eq!(read_input::<usize>(&out.join(TOTAL_COUNT_FILE)).unwrap(), 6);
        assert_eq!(read_input::<Dictionary>(&out.join(DICTIONARY_FILE)).unwrap(), ctx.dictionary);

        // reading in and extracting again appends to the saved tables
        params.read_in = true;
        params.build_counts = false;
        params.build_vectors = false;
        let again = Pipeline::run_with(params.clone()).unwrap();
        assert_eq!(again.dictionary, ctx.dictionary);
        assert_eq!(again.basis, ctx.basis);
        let subjects = read_input::<RelationTable>(&out.join(VERB_SUBJECTS_FILE)).unwrap();
        assert_eq!(subjects.get(id("sit")), &[id("cat"), id("cat")]);
    }

    #[test]
    fn evaluation_writes_results() {

        let dir = tempfile::tempdir().unwrap();
        let simverb_file = dir.path().join("simverb.txt");
        fs::write(&simverb_file, "sit run V 5.0 NONE\nsit fly V 2.0 NONE\n").unwrap();

        let mut params = params(dir.path());
        params.build_counts = true;
        params.build_vectors = true;
        params.build_relations = true;
        params.sim_stats = true;
        params.export_npy = true;
        params.simverb_file = Some(simverb_file);
        let results_file = dir.path().join("results.csv");
        params.json_eval = Some(JsonEval {
            mode: EvalMode::Intransitive,
            results_file: results_file.clone(),
            similarity: SimilarityMeasure::Cosine,
        });

        let ctx = Pipeline::run_with(params.clone()).unwrap();
        let transitivity = ctx.transitivity.as_ref().unwrap();
        assert!(transitivity.is_intransitive("sit"));
        assert!(transitivity.is_intransitive("run"));
        assert!(params.output_dir.join("word_vectors.npy").is_file());

        let text = fs::read_to_string(&results_file).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("verb0,verb1,base_sim,add_sim"));
        assert!(lines[1].starts_with("sit,run,"));
        assert!(lines[1].ends_with(",5"));
    }

    #[test]
    fn missing_inputs_fail_fast() {

        let dir = tempfile::tempdir().unwrap();
        let mut params = params(dir.path());
        params.read_in = true;
        match Pipeline::run_with(params) {
            Err(WackyError::MissingPrecondition(_)) => {},
            other => panic!("expected a missing precondition, got {:?}", other.err()),
        }

        let mut params = JsonTypes::with_dirs(dir.path().join("absent"), dir.path().join("out"));
        params.build_vectors = true;
        assert!(matches!(Pipeline::run_with(params), Err(WackyError::MissingPrecondition(_))));

        let mut params = self::params(dir.path());
        params.json_eval = Some(JsonEval {
            mode: EvalMode::All,
            results_file: dir.path().join("results.csv"),
            similarity: SimilarityMeasure::Cosine,
        });
        assert!(matches!(Pipeline::run_with(params), Err(WackyError::MissingPrecondition(_))));
    }
}
