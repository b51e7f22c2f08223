
// imports
use crate::config::files_handling::{create_writer, open_lines, ReadFile, SaveFile};
use crate::dictionary::Dictionary;
use crate::error::{Result, WackyError};

use log::{info, warn};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

/// Dictionary ids serving as vector dimensions, in dimension order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Basis {
    ids: Vec<usize>,
}

impl Basis {

    pub fn from_ids(ids: Vec<usize>) -> Self {
        Self { ids }
    }

    /// Picks up to `basis_size` dimensions.
    ///
    /// Insisted words in the dictionary come first, matched lower-cased like corpus words.
    /// The ranking then contributes the words that are in the dictionary and in `allowed`,
    /// skipping the `ignore_window` most frequent of them.
    pub fn select(ranked: &[(String, usize)],
        dictionary: &Dictionary,
        allowed: &HashSet<String>,
        insist: &[String],
        basis_size: usize,
        ignore_window: usize) -> Self {

        let mut ids: Vec<usize> = Vec::with_capacity(basis_size);
        let mut taken: HashSet<usize> = HashSet::new();

        for word in insist {
            if ids.len() >= basis_size {
                break;
            }
            match dictionary.id(&word.to_lowercase()) {
                Some(id) if !dictionary.is_unk(id) => {
                    if taken.insert(id) {
                        ids.push(id);
                    }
                },
                _ => warn!("insisted basis word {} is not in the dictionary", word),
            }
        }

        let qualifying = ranked
            .iter()
            .filter(|(word, _)| allowed.contains(word))
            .filter_map(|(word, _)| dictionary.id(word))
            .filter(|id| !dictionary.is_unk(*id))
            .skip(ignore_window);

        for id in qualifying {
            if ids.len() >= basis_size {
                break;
            }
            if taken.insert(id) {
                ids.push(id);
            }
        }

        info!("selected {} basis words ({} insisted)", ids.len(), insist.len().min(ids.len()));
        Self { ids }
    }

    pub fn ids(&self) -> &[usize] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Basis position of every dictionary id, the first one when an id repeats.
    pub fn positions(&self, dictionary_len: usize) -> Vec<Option<usize>> {
        let mut positions = vec![None; dictionary_len];
        for (b, id) in self.ids.iter().enumerate() {
            if let Some(slot) = positions.get_mut(*id) {
                if slot.is_none() {
                    *slot = Some(b);
                }
            }
        }
        positions
    }

    /// Fails when a dimension falls outside the dictionary.
    pub fn check(&self, dictionary: &Dictionary) -> Result<()> {
        match self.ids.iter().find(|id| **id >= dictionary.len()) {
            Some(id) => Err(WackyError::InvalidConfig(format!(
                "basis id {} is outside a dictionary of {} words", id, dictionary.len()))),
            None => Ok(()),
        }
    }
}

impl SaveFile for Basis {
    fn save_file(&self, output_dir: &Path, file_name: &str) -> Result<()> {
        let mut f = create_writer(output_dir, file_name)?;
        for id in &self.ids {
            writeln!(f, "{}", id)?;
        }
        f.flush()?;
        Ok(())
    }
}

impl ReadFile for Basis {
    type Item = Self;
    fn read_file(file_path: &Path) -> Result<Self::Item> {
        let mut ids = Vec::new();
        for (i, line) in open_lines(file_path)?.enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let id = line.parse::<usize>()
                .map_err(|e| WackyError::invalid_format(file_path, i + 1, e.to_string()))?;
            ids.push(id);
        }
        Ok(Self { ids })
    }
}
