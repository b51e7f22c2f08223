use log::error;
use ndarray::Array2;
use std::{env, error::Error, process};
use wacky_vectors::basis::Basis;
use wacky_vectors::dictionary::{Dictionary, FrequencyTable};
use wacky_vectors::files_handling::{self, read_input};
use wacky_vectors::math::{NdMath, SimilarityMeasure};
use wacky_vectors::{find_k_most_similar, vectors, Config};


// prints the k dictionary words closest to each given word, using the pmi vectors
// of a finished run. Its arguments are the run's json config, k, then the words:
// example: ... config.json 10 dog house eat

fn main() {

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        error!("{}", e);
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 {
        return Err("arguments should be a path to the json config, k, and at least one word".into());
    }
    let k: usize = args[2].parse()?;

    let params = Config::new(&args[..2])?.get_params();
    let measure = params.json_eval.as_ref().map_or(SimilarityMeasure::Cosine, |json_eval| json_eval.similarity);

    // read in the artifacts of the run
    let out = &params.output_dir;
    let dictionary = read_input::<Dictionary>(&out.join(files_handling::DICTIONARY_FILE))?;
    let frequencies = read_input::<FrequencyTable>(&out.join(files_handling::FREQ_FILE))?;
    let basis = read_input::<Basis>(&out.join(files_handling::BASIS_FILE))?;
    let total = read_input::<usize>(&out.join(files_handling::TOTAL_COUNT_FILE))?;
    let counts = read_input::<Array2<f32>>(&out.join(files_handling::WORD_VECTORS_FILE))?;

    let freqs = dictionary.frequencies(&frequencies);
    let pmi = vectors::pmi(&counts, &freqs, &basis, total, None);

    for word in &args[3..] {
        println!("searching {} most similar words to {}", k, word);
        let similarities = find_k_most_similar(&NdMath, measure, &pmi, &dictionary, &word.to_lowercase(), k)?;
        for (i, (similar, score)) in similarities.iter().enumerate() {
            println!("{} : {} ? {} = {}", i, word, similar, score);
        }
        println!();
    }

    Ok(())
}
