use std::collections::{BTreeMap, BTreeSet, HashMap};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::common_structs::MetadataRow;
use crate::error::{EdemaError, Result};

/// Parameters of the patient-level train/test split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitOptions {
    /// Share of images that should end up in the train split
    pub train_share: f64,
    /// Number of shuffles tried, trial `i` shuffles with seed `i`
    pub n_split_trials: usize,
    /// Reject splits in which a class is missing from train or test
    pub ensure_all_classes_in_splits: bool,
}

impl Default for SplitOptions {
    fn default() -> Self {
        SplitOptions {
            train_share: 0.8,
            n_split_trials: 500,
            ensure_all_classes_in_splits: true,
        }
    }
}

/// Share of metadata rows of every class in each split
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassDistribution {
    pub train: BTreeMap<i64, f64>,
    pub test: BTreeMap<i64, f64>,
}

impl ClassDistribution {
    /// Sum of squared differences of the class shares, over classes found in both splits
    pub fn score(&self) -> f64 {
        self.train
            .iter()
            .filter_map(|(class, train)| self.test.get(class).map(|test| (train - test).powi(2)))
            .sum()
    }

    fn covers_all_classes(&self) -> bool {
        self.train.keys().eq(self.test.keys())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSplit {
    pub train_subjects: BTreeSet<String>,
    pub test_subjects: BTreeSet<String>,
    /// Indices into the unique image paths in order of first appearance
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub class_distribution: ClassDistribution,
    pub score: f64,
    /// Trial, and seed, the split comes from
    pub trial: usize,
}

/// Unique image paths of `metadata` mapped to their index, in order of first appearance
pub fn image_indices(metadata: &[MetadataRow]) -> HashMap<&str, usize> {
    let mut indices = HashMap::new();
    for row in metadata {
        let next = indices.len();
        indices.entry(row.img_path.as_str()).or_insert(next);
    }
    indices
}

/// Splits the dataset by patient so no subject has images in both splits, picking
/// among `n_split_trials` shuffles the one whose class shares differ least between
/// train and test.
pub fn split_dataset(metadata: &[MetadataRow], options: &SplitOptions) -> Result<DatasetSplit> {
    let mut best: Option<(usize, f64, BTreeSet<String>, BTreeSet<String>, ClassDistribution)> =
        None;

    for trial in 0..options.n_split_trials {
        let (train_subjects, test_subjects) = split_subjects(metadata, options.train_share, trial);
        if train_subjects.is_empty() || test_subjects.is_empty() {
            debug!("Trial {}: one of the splits is empty", trial);
            continue;
        }

        let distribution = ClassDistribution {
            train: class_shares(metadata, &train_subjects),
            test: class_shares(metadata, &test_subjects),
        };
        if options.ensure_all_classes_in_splits && !distribution.covers_all_classes() {
            debug!("Trial {}: a class is missing from one of the splits", trial);
            continue;
        }

        let score = distribution.score();
        if best.as_ref().map_or(true, |(_, best_score, ..)| score < *best_score) {
            best = Some((trial, score, train_subjects, test_subjects, distribution));
        }
    }

    let (trial, score, train_subjects, test_subjects, class_distribution) =
        best.ok_or(EdemaError::SplitTrialsExhausted {
            n_split_trials: options.n_split_trials,
        })?;

    let indices = image_indices(metadata);
    let split_indices = |subjects: &BTreeSet<String>| -> Vec<usize> {
        let set: BTreeSet<usize> = metadata
            .iter()
            .filter(|row| subjects.contains(&row.subject_id))
            .map(|row| indices[row.img_path.as_str()])
            .collect();
        set.into_iter().collect()
    };
    let train_indices = split_indices(&train_subjects);
    let test_indices = split_indices(&test_subjects);

    info!(
        "Best split from trial {} with score {:.6}: {} train images of {} subjects, {} test images of {} subjects",
        trial,
        score,
        train_indices.len(),
        train_subjects.len(),
        test_indices.len(),
        test_subjects.len()
    );
    Ok(DatasetSplit {
        train_subjects,
        test_subjects,
        train_indices,
        test_indices,
        class_distribution,
        score,
        trial,
    })
}

/// Shuffles the rows with the trial seed and assigns subjects by the cumulative share
/// of unique images they bring.
fn split_subjects(
    metadata: &[MetadataRow],
    train_share: f64,
    trial: usize,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut order: Vec<usize> = (0..metadata.len()).collect();
    order.shuffle(&mut StdRng::seed_from_u64(trial as u64));

    let mut subjects: Vec<(&str, BTreeSet<&str>)> = vec![];
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for row in order.iter().map(|i| &metadata[*i]) {
        let subject = row.subject_id.as_str();
        let pos = *positions.entry(subject).or_insert_with(|| {
            subjects.push((subject, BTreeSet::new()));
            subjects.len() - 1
        });
        subjects[pos].1.insert(row.img_path.as_str());
    }

    let total: usize = subjects.iter().map(|(_, images)| images.len()).sum();
    let mut train = BTreeSet::new();
    let mut test = BTreeSet::new();
    let mut cumulative = 0;
    for (subject, images) in subjects {
        cumulative += images.len();
        if (cumulative as f64 / total as f64) < train_share {
            train.insert(subject.to_string());
        } else {
            test.insert(subject.to_string());
        }
    }
    (train, test)
}

fn class_shares(metadata: &[MetadataRow], subjects: &BTreeSet<String>) -> BTreeMap<i64, f64> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    let mut total = 0;
    for row in metadata.iter().filter(|r| subjects.contains(&r.subject_id)) {
        *counts.entry(row.class_key()).or_insert(0) += 1;
        total += 1;
    }
    counts
        .into_iter()
        .map(|(class, count)| (class, count as f64 / total as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(subject: usize, image: usize, class_id: i64) -> MetadataRow {
        MetadataRow {
            img_path: format!("img_{}.png", image),
            subject_id: format!("subject_{}", subject),
            class_name: format!("class {}", class_id),
            class_id: Some(class_id),
            feature: Some("Kerley".to_string()),
            x1: None,
            y1: None,
            x2: None,
            y2: None,
            mask: None,
            points: None,
        }
    }

    /// 30 subjects with one or two images each, three classes spread over subjects
    fn metadata() -> Vec<MetadataRow> {
        let mut rows = vec![];
        let mut image = 0;
        for subject in 0..30 {
            for _ in 0..(1 + subject % 2) {
                // two annotation rows per image
                rows.push(row(subject, image, (subject % 3) as i64));
                rows.push(row(subject, image, (subject % 3) as i64));
                image += 1;
            }
        }
        rows
    }

    #[test]
    fn split_is_patient_disjoint_and_complete() {
        let rows = metadata();
        let split = split_dataset(&rows, &SplitOptions::default()).unwrap();
        assert!(split.train_subjects.is_disjoint(&split.test_subjects));
        assert_eq!(split.train_subjects.len() + split.test_subjects.len(), 30);

        let n_images = image_indices(&rows).len();
        let train: BTreeSet<usize> = split.train_indices.iter().copied().collect();
        let test: BTreeSet<usize> = split.test_indices.iter().copied().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), n_images);
        assert_eq!(split.class_distribution.train.len(), 3);
        assert_eq!(split.class_distribution.test.len(), 3);
        assert!(split.score >= 0.);
    }

    #[test]
    fn split_is_deterministic() {
        let rows = metadata();
        let options = SplitOptions {
            n_split_trials: 50,
            ..Default::default()
        };
        assert_eq!(
            split_dataset(&rows, &options).unwrap(),
            split_dataset(&rows, &options).unwrap()
        );
    }

    #[test]
    fn class_of_a_single_patient_cannot_be_in_both_splits() {
        let mut rows = metadata();
        rows.push(row(99, 999, 7));
        let result = split_dataset(&rows, &SplitOptions::default());
        assert!(matches!(
            result,
            Err(EdemaError::SplitTrialsExhausted { n_split_trials: 500 })
        ));

        let relaxed = SplitOptions {
            ensure_all_classes_in_splits: false,
            ..Default::default()
        };
        let split = split_dataset(&rows, &relaxed).unwrap();
        assert!(split.train_subjects.is_disjoint(&split.test_subjects));
    }

    #[test]
    fn no_trials_is_an_error() {
        let options = SplitOptions {
            n_split_trials: 0,
            ..Default::default()
        };
        assert!(matches!(
            split_dataset(&metadata(), &options),
            Err(EdemaError::SplitTrialsExhausted { n_split_trials: 0 })
        ));
    }

    #[test]
    fn indices_follow_first_appearance() {
        let rows = vec![row(0, 5, 0), row(0, 2, 0), row(1, 5, 1)];
        let indices = image_indices(&rows);
        assert_eq!(indices["img_5.png"], 0);
        assert_eq!(indices["img_2.png"], 1);
        assert_eq!(indices.len(), 2);
    }
}
