
// imports
use crate::error::{Result, WackyError};

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;

// artifacts kept in the working directory
pub const DICTIONARY_FILE: &str = "dictionary.txt";
pub const FREQ_FILE: &str = "freq.txt";
pub const ALLOWED_FILE: &str = "allowed.txt";
pub const BASIS_FILE: &str = "basis.txt";
pub const WORD_VECTORS_FILE: &str = "word_vectors.txt";
pub const WORD_VECTORS_NPY: &str = "word_vectors.npy";
pub const VERB_SUBJECTS_FILE: &str = "verb_subjects.txt";
pub const VERB_OBJECTS_FILE: &str = "verb_objects.txt";
pub const VERB_SBJ_OBJ_FILE: &str = "verb_sbj_obj.txt";
pub const UNK_COUNT_FILE: &str = "unk_count.txt";
pub const TOTAL_COUNT_FILE: &str = "total_count.txt";
pub const SIM_STATS_FILE: &str = "sim_stats.txt";


pub fn read_input<R: ReadFile>(file_path: &Path) -> Result<<R as ReadFile>::Item> {
    if !file_path.is_file() {
        return Err(WackyError::missing(format!("{} does not exist", file_path.display())));
    }
    <R as ReadFile>::read_file(file_path)
}

pub fn save_output<S: SaveFile + ?Sized>(output_dir: &Path, file_name: &str, item: &S) -> Result<()> {

    // create output folder
    fs::create_dir_all(output_dir)?;
    item.save_file(output_dir, file_name)
}

pub trait ReadFile {
    type Item;
    fn read_file(file_path: &Path) -> Result<Self::Item>;
}

pub trait SaveFile {
    fn save_file(&self, output_dir: &Path, file_name: &str) -> Result<()>;
}

pub(crate) fn open_lines(file_path: &Path) -> Result<Lines<BufReader<File>>> {
    Ok(BufReader::new(File::open(file_path)?).lines())
}

pub(crate) fn create_writer(output_dir: &Path, file_name: &str) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(output_dir.join(file_name))?))
}

// single integer files, unk_count.txt and total_count.txt
impl ReadFile for usize {
    type Item = Self;
    fn read_file(file_path: &Path) -> Result<Self::Item> {
        for (i, line) in open_lines(file_path)?.enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return line.parse::<usize>()
                .map_err(|e| WackyError::invalid_format(file_path, i + 1, e.to_string()));
        }
        Err(WackyError::invalid_format(file_path, 0, "file holds no count"))
    }
}

impl SaveFile for usize {
    fn save_file(&self, output_dir: &Path, file_name: &str) -> Result<()> {
        let mut f = create_writer(output_dir, file_name)?;
        writeln!(f, "{}", self)?;
        f.flush()?;
        Ok(())
    }
}

// line-delimited word sets, allowed.txt
impl ReadFile for HashSet<String> {
    type Item = Self;
    fn read_file(file_path: &Path) -> Result<Self::Item> {
        let mut words = HashSet::new();
        for line in open_lines(file_path)? {
            let line = line?;
            let word = line.trim();
            if !word.is_empty() {
                words.insert(word.to_owned());
            }
        }
        Ok(words)
    }
}

impl SaveFile for HashSet<String> {
    fn save_file(&self, output_dir: &Path, file_name: &str) -> Result<()> {
        let mut sorted: Vec<&String> = self.iter().collect();
        sorted.sort();
        let mut f = create_writer(output_dir, file_name)?;
        for word in sorted {
            writeln!(f, "{}", word)?;
        }
        f.flush()?;
        Ok(())
    }
}

// line-delimited words where order matters, the insist words
impl ReadFile for Vec<String> {
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
        Ok(words)
    }
}
