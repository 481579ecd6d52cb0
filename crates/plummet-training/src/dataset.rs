//! Bounded, deterministically split, persistent sample store.
//!
//! The store is append-only from the caller's point of view: batches are
//! added, and once the configured capacity is exceeded the oldest whole
//! admission batches are evicted. Because eviction happens in fixed-size
//! chunks, a sample's position modulo the chunk size never changes, and the
//! train/validation partition — which is keyed on exactly that position —
//! stays stable as the retained window slides.
//!
//! Records are opaque here: serialization goes through a caller-supplied
//! encode/decode pair, one JSON record per line.

use std::{
    fs::{self, File},
    io::{self, BufRead as _, BufReader, BufWriter, Write as _},
    path::{Path, PathBuf},
};

use rand::{Rng, seq::SliceRandom as _};

/// Size of one admission/eviction chunk, and the length of the rotating
/// window the partition rule is keyed on.
pub const ADMISSION_BATCH: usize = 144;

/// Step of the low-discrepancy partition walk; 89/144 is a ratio of
/// consecutive Fibonacci numbers, close to the golden ratio, which keeps the
/// validation picks well spread through each window.
const GOLDEN_STEP: f64 = 89.0 / 144.0;

/// Deterministic pseudo-uniform value for the record at position `i`.
#[expect(clippy::cast_precision_loss)]
fn window_position(i: usize) -> f64 {
    (((i % ADMISSION_BATCH) as f64) * GOLDEN_STEP) % 1.0
}

pub type EncodeFn<T> = Box<dyn Fn(&T) -> serde_json::Value + Send + Sync>;
pub type DecodeFn<T> = Box<dyn Fn(&serde_json::Value) -> Result<T, DatasetError> + Send + Sync>;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum DatasetError {
    /// The configured capacity is smaller than one admission batch.
    #[display("max_size must be at least {ADMISSION_BATCH} records, got {got}")]
    CapacityTooSmall { got: usize },
    /// Multi-shard load found nothing to load. Distinct from an I/O failure:
    /// the caller asked to merge shards and there are none.
    #[display("no dataset shards matching {prefix}-*.jsonl in {}", dir.display())]
    NoShards { prefix: String, dir: PathBuf },
    #[display("I/O error on dataset file {}", path.display())]
    Io {
        path: PathBuf,
        source: io::Error,
    },
    #[display("malformed JSON record at {}:{line}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
    /// A record parsed as JSON but the caller's decoder rejected it.
    #[display("failed to decode dataset record: {message}")]
    Decode { message: String },
}

/// A train/validation view over stored records.
#[derive(Debug)]
pub struct SplitSample<'a, T> {
    pub training: Vec<&'a T>,
    pub validation: Vec<&'a T>,
}

/// Capacity-bounded ordered collection of samples with a deterministic
/// train/validation partition and newline-delimited JSON persistence.
pub struct SplitDataSet<T> {
    name: String,
    dir: PathBuf,
    max_size: usize,
    records: Vec<T>,
    encode: EncodeFn<T>,
    decode: DecodeFn<T>,
}

impl<T> SplitDataSet<T> {
    /// Creates an empty store persisting to `<dir>/<name>.jsonl`.
    pub fn new(
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
        max_size: usize,
        encode: EncodeFn<T>,
        decode: DecodeFn<T>,
    ) -> Result<Self, DatasetError> {
        if max_size < ADMISSION_BATCH {
            return Err(DatasetError::CapacityTooSmall { got: max_size });
        }
        Ok(Self {
            name: name.into(),
            dir: dir.into(),
            max_size,
            records: Vec::new(),
            encode,
            decode,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// The retained records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[T] {
        &self.records
    }

    /// Appends a batch, then evicts oldest whole admission batches until the
    /// stored count is back within capacity.
    pub fn add(&mut self, items: Vec<T>) {
        self.records.extend(items);
        self.trim();
    }

    fn trim(&mut self) {
        let excess = self.records.len().saturating_sub(self.max_size);
        if excess > 0 {
            let batches = excess.div_ceil(ADMISSION_BATCH);
            self.records.drain(..batches * ADMISSION_BATCH);
        }
    }

    /// Assigns every stored record to training or validation.
    ///
    /// The assignment is a pure function of the record's position in the
    /// rotating admission window, so repeated calls on an unchanged store —
    /// and calls after whole-batch eviction — agree on membership.
    #[must_use]
    pub fn partition(&self, validation_fraction: f64) -> SplitSample<'_, T> {
        let mut training = Vec::new();
        let mut validation = Vec::new();
        for (i, record) in self.records.iter().enumerate() {
            if window_position(i) < validation_fraction {
                validation.push(record);
            } else {
                training.push(record);
            }
        }
        SplitSample {
            training,
            validation,
        }
    }

    /// Draws a random subset of `size` records respecting the validation
    /// fraction, without replacement, shuffled within each partition.
    ///
    /// `size` is clamped to the stored count, and each partition's draw to
    /// that partition's size.
    #[expect(clippy::cast_precision_loss, clippy::cast_sign_loss)]
    #[expect(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn sample<R>(
        &self,
        validation_fraction: f64,
        size: usize,
        rng: &mut R,
    ) -> SplitSample<'_, T>
    where
        R: Rng + ?Sized,
    {
        let size = size.min(self.len());
        let validation_take = (size as f64 * validation_fraction).ceil() as usize;
        let training_take = size - validation_take;

        let mut split = self.partition(validation_fraction);
        let validation_take = validation_take.min(split.validation.len());
        let training_take = training_take.min(split.training.len());

        let training = split
            .training
            .partial_shuffle(rng, training_take)
            .0
            .to_vec();
        let validation = split
            .validation
            .partial_shuffle(rng, validation_take)
            .0
            .to_vec();
        SplitSample {
            training,
            validation,
        }
    }

    fn file_path(&self) -> PathBuf {
        self.dir.join(format!("{}.jsonl", self.name))
    }

    /// Writes all records to `<dir>/<name>.jsonl`, one JSON record per line.
    pub fn save(&self) -> Result<(), DatasetError> {
        let path = self.file_path();
        fs::create_dir_all(&self.dir).map_err(|source| DatasetError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let file = File::create(&path).map_err(|source| DatasetError::Io {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        for record in &self.records {
            let value = (self.encode)(record);
            writeln!(writer, "{value}").map_err(|source| DatasetError::Io {
                path: path.clone(),
                source,
            })?;
        }
        writer.flush().map_err(|source| DatasetError::Io {
            path: path.clone(),
            source,
        })
    }

    /// Replaces the stored records with the contents of `<dir>/<name>.jsonl`.
    ///
    /// A missing file is an ordinary first-run condition and yields an empty
    /// store. A malformed record propagates an error and leaves the store
    /// unchanged.
    pub fn load(&mut self) -> Result<(), DatasetError> {
        let path = self.file_path();
        match self.read_records(&path)? {
            Some(records) => self.records = records,
            None => self.records.clear(),
        }
        self.trim();
        Ok(())
    }

    /// Merges every shard matching `<dir>/<name>-*.jsonl`, in sorted
    /// filename order.
    ///
    /// Shards are how independent generator runs persist their output
    /// side by side. Finding no shard at all is an error — the caller asked
    /// for a merge and silently producing an empty dataset would hide a
    /// misconfigured path.
    pub fn load_multi(&mut self) -> Result<(), DatasetError> {
        let prefix = format!("{}-", self.name);
        let mut shard_paths = Vec::new();
        match fs::read_dir(&self.dir) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry.map_err(|source| DatasetError::Io {
                        path: self.dir.clone(),
                        source,
                    })?;
                    let file_name = entry.file_name();
                    let Some(file_name) = file_name.to_str() else {
                        continue;
                    };
                    if file_name.starts_with(&prefix) && file_name.ends_with(".jsonl") {
                        shard_paths.push(entry.path());
                    }
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(DatasetError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        }
        shard_paths.sort();

        if shard_paths.is_empty() {
            return Err(DatasetError::NoShards {
                prefix: self.name.clone(),
                dir: self.dir.clone(),
            });
        }

        let mut merged = Vec::new();
        for path in shard_paths {
            if let Some(records) = self.read_records(&path)? {
                merged.extend(records);
            }
        }
        self.records = merged;
        self.trim();
        Ok(())
    }

    /// Reads and decodes one `.jsonl` file; `None` when the file is absent.
    fn read_records(&self, path: &Path) -> Result<Option<Vec<T>>, DatasetError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(DatasetError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut records = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| DatasetError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let value: serde_json::Value =
                serde_json::from_str(&line).map_err(|source| DatasetError::Malformed {
                    path: path.to_path_buf(),
                    line: i + 1,
                    source,
                })?;
            records.push((self.decode)(&value)?);
        }
        Ok(Some(records))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;

    fn u32_store(name: &str, dir: &Path, max_size: usize) -> SplitDataSet<u32> {
        SplitDataSet::new(
            name,
            dir,
            max_size,
            Box::new(|x: &u32| serde_json::json!(x)),
            Box::new(|value: &serde_json::Value| {
                value
                    .as_u64()
                    .and_then(|x| u32::try_from(x).ok())
                    .ok_or_else(|| DatasetError::Decode {
                        message: format!("expected u32, got {value}"),
                    })
            }),
        )
        .unwrap()
    }

    fn temp_dir(tag: &str) -> PathBuf {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "plummet-dataset-{}-{}-{tag}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst),
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_capacity_below_batch_size_is_rejected() {
        let dir = temp_dir("capacity");
        let result = SplitDataSet::<u32>::new(
            "s",
            &dir,
            ADMISSION_BATCH - 1,
            Box::new(|x: &u32| serde_json::json!(x)),
            Box::new(|_| Ok(0)),
        );
        assert!(matches!(
            result,
            Err(DatasetError::CapacityTooSmall { .. })
        ));
    }

    #[test]
    fn test_add_evicts_whole_batches() {
        let dir = temp_dir("evict");
        let mut store = u32_store("s", &dir, 2 * ADMISSION_BATCH);

        store.add((0..400).collect());
        // Excess of 112 rounds up to one whole batch of 144.
        assert_eq!(store.len(), 400 - ADMISSION_BATCH);
        assert_eq!(store.records()[0], 144);

        store.add((400..500).collect());
        assert!(store.len() <= store.max_size());
        // Oldest records went first, newest survived.
        assert_eq!(*store.records().last().unwrap(), 499);
    }

    #[test]
    fn test_partition_is_stable() {
        let dir = temp_dir("stable");
        let mut store = u32_store("s", &dir, 10 * ADMISSION_BATCH);
        store.add((0..500).collect());

        let first: Vec<u32> = store.partition(0.2).validation.into_iter().copied().collect();
        let second: Vec<u32> = store.partition(0.2).validation.into_iter().copied().collect();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_partition_membership_survives_eviction() {
        let dir = temp_dir("sliding");
        let mut store = u32_store("s", &dir, 2 * ADMISSION_BATCH);
        store.add((0..2 * ADMISSION_BATCH as u32).collect());

        let before: Vec<u32> = store.partition(0.25).validation.into_iter().copied().collect();

        // One more batch slides the window by exactly one admission batch.
        store.add((288..288 + ADMISSION_BATCH as u32).collect());
        let after: Vec<u32> = store.partition(0.25).validation.into_iter().copied().collect();

        let surviving: Vec<u32> = before.iter().copied().filter(|&x| x >= 144).collect();
        let after_overlap: Vec<u32> = after.iter().copied().filter(|&x| x < 288).collect();
        assert_eq!(surviving, after_overlap);
    }

    #[test]
    fn test_partition_fraction_is_roughly_respected() {
        let dir = temp_dir("fraction");
        let mut store = u32_store("s", &dir, 10 * ADMISSION_BATCH);
        store.add((0..(10 * ADMISSION_BATCH as u32)).collect());

        let split = store.partition(0.2);
        let fraction = split.validation.len() as f64 / store.len() as f64;
        assert!((fraction - 0.2).abs() < 0.05, "{fraction}");
    }

    #[test]
    fn test_sample_respects_sizes_and_partitions() {
        let dir = temp_dir("sample");
        let mut store = u32_store("s", &dir, 10 * ADMISSION_BATCH);
        store.add((0..1000).collect());
        let mut rng = Pcg32::seed_from_u64(9);

        let sample = store.sample(0.2, 100, &mut rng);
        assert_eq!(sample.validation.len(), 20);
        assert_eq!(sample.training.len(), 80);

        // Without replacement: no duplicates within a partition.
        let mut seen: Vec<u32> = sample.training.iter().copied().copied().collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 80);

        // Every drawn record must come from the matching partition.
        let full = store.partition(0.2);
        let validation_set: Vec<u32> = full.validation.into_iter().copied().collect();
        assert!(sample.validation.iter().all(|x| validation_set.contains(*x)));
    }

    #[test]
    fn test_sample_clamps_oversized_requests() {
        let dir = temp_dir("clamp");
        let mut store = u32_store("s", &dir, 10 * ADMISSION_BATCH);
        store.add((0..50).collect());
        let mut rng = Pcg32::seed_from_u64(10);

        let sample = store.sample(0.2, 1000, &mut rng);
        assert_eq!(sample.training.len() + sample.validation.len(), 50);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = temp_dir("roundtrip");
        let mut store = u32_store("s", &dir, 10 * ADMISSION_BATCH);
        store.add((0..300).collect());
        store.save().unwrap();

        let mut restored = u32_store("s", &dir, 10 * ADMISSION_BATCH);
        restored.load().unwrap();
        assert_eq!(restored.records(), store.records());
    }

    #[test]
    fn test_load_missing_file_yields_empty_store() {
        let dir = temp_dir("missing");
        let mut store = u32_store("nothing-here", &dir, 10 * ADMISSION_BATCH);
        store.add(vec![1, 2, 3]);
        store.load().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_propagates_corrupt_records() {
        let dir = temp_dir("corrupt");
        fs::write(dir.join("s.jsonl"), "1\n2\nnot json\n4\n").unwrap();

        let mut store = u32_store("s", &dir, 10 * ADMISSION_BATCH);
        store.add(vec![7]);
        let err = store.load().unwrap_err();
        assert!(matches!(err, DatasetError::Malformed { line: 3, .. }));
        // The store is left as it was, not partially populated.
        assert_eq!(store.records(), [7]);
    }

    #[test]
    fn test_load_multi_merges_shards_in_name_order() {
        let dir = temp_dir("shards");
        fs::write(dir.join("s-a.jsonl"), "1\n2\n").unwrap();
        fs::write(dir.join("s-b.jsonl"), "3\n").unwrap();
        fs::write(dir.join("other.jsonl"), "99\n").unwrap();

        let mut store = u32_store("s", &dir, 10 * ADMISSION_BATCH);
        store.load_multi().unwrap();
        assert_eq!(store.records(), [1, 2, 3]);
    }

    #[test]
    fn test_load_multi_without_shards_is_an_error() {
        let dir = temp_dir("noshards");
        let mut store = u32_store("s", &dir, 10 * ADMISSION_BATCH);
        assert!(matches!(
            store.load_multi(),
            Err(DatasetError::NoShards { .. })
        ));

        // Same for a directory that does not exist at all.
        let mut store = u32_store("s", dir.join("absent").as_path(), 10 * ADMISSION_BATCH);
        assert!(matches!(
            store.load_multi(),
            Err(DatasetError::NoShards { .. })
        ));
    }
}
