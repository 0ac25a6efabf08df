use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// An image file and the index of the artist it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    pub path: PathBuf,
    pub label: usize,
}

/// Artist names in label order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRegistry {
    names: Vec<String>,
}

impl ClassRegistry {
    /// Builds a registry from unordered names. Labels follow lexicographic order.
    pub fn new(mut names: Vec<String>) -> Self {
        names.sort();
        names.dedup();
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.binary_search_by(|probe| probe.as_str().cmp(name)).ok()
    }

    pub fn name(&self, label: usize) -> Option<&str> {
        self.names.get(label).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|err| Error::io(path, err))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Train/test partition of an [`ArtworkIndex`].
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub train: Vec<Sample>,
    pub test: Vec<Sample>,
}

/// Every sample found under a dataset root, labelled by folder.
#[derive(Debug, Clone)]
pub struct ArtworkIndex {
    pub samples: Vec<Sample>,
    pub classes: ClassRegistry,
}

impl ArtworkIndex {
    /// Scans `root/<artist>/<image>`.
    ///
    /// Only directories directly under `root` become classes and only regular
    /// files inside them become samples. Files are not opened here, so a broken
    /// image only surfaces when it is loaded. Artists listed in `caps` keep at
    /// most that many files (the first ones by file name).
    pub fn scan(root: &Path, caps: &HashMap<String, usize>) -> Result<Self> {
        info!("Indexing dataset at {}", root.display());

        // Registry names are lossy; the walk keeps the real directory paths.
        let mut dirs = HashMap::new();
        for entry in fs::read_dir(root).map_err(|err| Error::io(root, err))? {
            let entry = entry.map_err(|err| Error::io(root, err))?;
            let path = entry.path();
            if path.is_dir() {
                dirs.insert(entry.file_name().to_string_lossy().into_owned(), path);
            }
        }

        let classes = ClassRegistry::new(dirs.keys().cloned().collect());
        info!("Found {} classes", classes.len());

        let per_class: Vec<Vec<Sample>> = classes
            .names()
            .par_iter()
            .enumerate()
            .map(|(label, name)| -> Result<Vec<Sample>> {
                let dir = dirs.get(name).map_or_else(|| root.join(name), PathBuf::clone);
                let mut paths = list_files(&dir)?;
                if let Some(&cap) = caps.get(name) {
                    paths.truncate(cap);
                }
                debug!("Class '{}' (label {}): {} images", name, label, paths.len());

                Ok(paths
                    .into_iter()
                    .map(|path| Sample { path, label })
                    .collect())
            })
            .collect::<Result<_>>()?;

        let samples: Vec<Sample> = per_class.into_iter().flatten().collect();
        info!("Indexed {} samples", samples.len());

        Ok(Self { samples, classes })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples per label.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.classes.len()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }

    /// Partitions the samples with a single seeded permutation.
    ///
    /// The train side receives `floor(len * train_ratio)` samples and the test
    /// side the remainder.
    pub fn split(&self, train_ratio: f64, seed: u64) -> Result<DatasetSplit> {
        if !(train_ratio > 0.0 && train_ratio <= 1.0) {
            return Err(Error::Config(format!(
                "train ratio must be in (0, 1], got {train_ratio}"
            )));
        }

        let mut order: Vec<usize> = (0..self.samples.len()).collect();
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));

        let train_len = (self.samples.len() as f64 * train_ratio) as usize;
        let (train, test) = order.split_at(train_len);
        let pick = |indices: &[usize]| -> Vec<Sample> {
            indices.iter().map(|&i| self.samples[i].clone()).collect()
        };

        let split = DatasetSplit {
            train: pick(train),
            test: pick(test),
        };
        info!(
            "Split {} samples into {} train / {} test",
            self.samples.len(),
            split.train.len(),
            split.test.len()
        );

        Ok(split)
    }
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|err| Error::io(dir, err))? {
        let entry = entry.map_err(|err| Error::io(dir, err))?;
        let path = entry.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use tempfile::TempDir;

    use super::*;

    fn touch_class(root: &Path, name: &str, count: usize) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            fs::write(dir.join(format!("{i:03}.jpg")), b"").unwrap();
        }
    }

    fn caps(entries: &[(&str, usize)]) -> HashMap<String, usize> {
        entries
            .iter()
            .map(|(name, cap)| (name.to_string(), *cap))
            .collect()
    }

    #[test]
    fn labels_follow_sorted_folder_names() {
        let root = TempDir::new().unwrap();
        touch_class(root.path(), "Pablo_Picasso", 2);
        touch_class(root.path(), "Claude_Monet", 1);
        touch_class(root.path(), "Edgar_Degas", 3);
        fs::write(root.path().join("notes.txt"), b"stray").unwrap();

        let index = ArtworkIndex::scan(root.path(), &HashMap::new()).unwrap();

        assert_eq!(
            index.classes.names(),
            ["Claude_Monet", "Edgar_Degas", "Pablo_Picasso"]
        );
        assert_eq!(index.classes.index_of("Pablo_Picasso"), Some(2));
        assert_eq!(index.class_counts(), vec![1, 3, 2]);
        assert!(index
            .samples
            .iter()
            .all(|s| s.path.parent().unwrap().ends_with(index.classes.name(s.label).unwrap())));
    }

    #[test]
    fn capped_classes_are_truncated_exactly() {
        let root = TempDir::new().unwrap();
        touch_class(root.path(), "Vincent_van_Gogh", 12);
        touch_class(root.path(), "Edgar_Degas", 3);
        touch_class(root.path(), "Rembrandt", 9);

        let caps = caps(&[("Vincent_van_Gogh", 5), ("Edgar_Degas", 5)]);
        let index = ArtworkIndex::scan(root.path(), &caps).unwrap();

        let counts = index.class_counts();
        let label = |name| index.classes.index_of(name).unwrap();
        assert_eq!(counts[label("Vincent_van_Gogh")], 5);
        assert_eq!(counts[label("Edgar_Degas")], 3);
        assert_eq!(counts[label("Rembrandt")], 9);

        let kept: Vec<_> = index
            .samples
            .iter()
            .filter(|s| s.label == label("Vincent_van_Gogh"))
            .map(|s| s.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(kept, ["000.jpg", "001.jpg", "002.jpg", "003.jpg", "004.jpg"]);
    }

    #[test]
    fn empty_class_folder_keeps_its_label() {
        let root = TempDir::new().unwrap();
        touch_class(root.path(), "Alpha", 2);
        touch_class(root.path(), "Beta", 0);

        let index = ArtworkIndex::scan(root.path(), &HashMap::new()).unwrap();

        assert_eq!(index.classes.len(), 2);
        assert_eq!(index.class_counts(), vec![2, 0]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn nested_directories_are_not_samples() {
        let root = TempDir::new().unwrap();
        touch_class(root.path(), "Alpha", 2);
        fs::create_dir_all(root.path().join("Alpha").join("sketches")).unwrap();

        let index = ArtworkIndex::scan(root.path(), &HashMap::new()).unwrap();

        assert_eq!(index.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_class_folder_is_indexed() {
        let root = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        touch_class(root.path(), "Alpha", 1);
        touch_class(elsewhere.path(), "Beta", 2);
        std::os::unix::fs::symlink(elsewhere.path().join("Beta"), root.path().join("Beta")).unwrap();

        let index = ArtworkIndex::scan(root.path(), &HashMap::new()).unwrap();

        assert_eq!(index.classes.names(), ["Alpha", "Beta"]);
        assert_eq!(index.class_counts(), vec![1, 2]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_class_folder_is_walked() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let root = TempDir::new().unwrap();
        let dir = root.path().join(OsStr::from_bytes(b"Caf\xe9"));
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("000.jpg"), b"").unwrap();

        let index = ArtworkIndex::scan(root.path(), &HashMap::new()).unwrap();

        assert_eq!(index.classes.names(), ["Caf\u{FFFD}"]);
        assert_eq!(index.samples[0].path, dir.join("000.jpg"));
    }

    #[test]
    fn missing_root_is_an_io_error() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("nope");

        let err = ArtworkIndex::scan(&missing, &HashMap::new()).unwrap_err();

        assert!(matches!(err, Error::Io { path, .. } if path == missing));
    }

    #[test]
    fn split_is_disjoint_complete_and_reproducible() {
        let root = TempDir::new().unwrap();
        touch_class(root.path(), "Alpha", 17);
        touch_class(root.path(), "Beta", 6);
        let index = ArtworkIndex::scan(root.path(), &HashMap::new()).unwrap();

        let first = index.split(0.8, 7).unwrap();
        let second = index.split(0.8, 7).unwrap();

        assert_eq!(first.train.len(), 18);
        assert_eq!(first.test.len(), 5);
        assert_eq!(first.train, second.train);
        assert_eq!(first.test, second.test);

        let train: HashSet<_> = first.train.iter().collect();
        let test: HashSet<_> = first.test.iter().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), index.len());
    }

    #[test]
    fn ten_samples_split_eight_two() {
        let root = TempDir::new().unwrap();
        touch_class(root.path(), "Alpha", 5);
        touch_class(root.path(), "Beta", 5);
        let index = ArtworkIndex::scan(root.path(), &HashMap::new()).unwrap();

        let split = index.split(0.8, 42).unwrap();

        assert_eq!((split.train.len(), split.test.len()), (8, 2));
    }

    #[test]
    fn split_rejects_invalid_ratio() {
        let index = ArtworkIndex {
            samples: vec![],
            classes: ClassRegistry::new(vec![]),
        };

        assert!(matches!(index.split(0.0, 1), Err(Error::Config(_))));
        assert!(matches!(index.split(1.5, 1), Err(Error::Config(_))));
    }

    #[test]
    fn registry_survives_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("classes.json");
        let registry = ClassRegistry::new(vec!["b".into(), "a".into()]);

        registry.save(&path).unwrap();

        assert_eq!(ClassRegistry::load(&path).unwrap(), registry);
    }
}
