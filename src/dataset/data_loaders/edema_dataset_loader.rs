use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::DatasetOptions;
use crate::dataset::annotations::{extract_annotations, group_by_image};
use crate::dataset::common_structs::{read_metadata_file, Annotation, MetadataRow};
use crate::dataset::masks::{resize_and_create_masks, ResizedSample};
use crate::dataset::DataLoader;
use crate::error::{EdemaError, Result};

/// An image of the dataset with the metadata rows that annotate it
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetItem {
    /// Path relative to the image directory, as written in the metadata
    pub img_path: String,
    pub rows: Vec<MetadataRow>,
}

impl DatasetItem {
    /// Annotation built from the rows of this image only
    pub fn annotation(&self) -> Result<Annotation> {
        let rows: Vec<&MetadataRow> = self.rows.iter().collect();
        extract_annotations(&rows)
    }
}

/// Annotated images, indexed in order of first appearance in the metadata, the same
/// indexing the dataset split uses.
#[derive(Debug, Clone)]
pub struct EdemaDataset {
    img_dir: PathBuf,
    items: Vec<DatasetItem>,
    options: DatasetOptions,
}

impl EdemaDataset {
    pub fn from_metadata<T: AsRef<Path>>(
        rows: &[MetadataRow],
        img_dir: T,
        options: DatasetOptions,
    ) -> EdemaDataset {
        let items: Vec<DatasetItem> = group_by_image(rows)
            .into_iter()
            .map(|(img_path, group)| DatasetItem {
                img_path: img_path.to_string(),
                rows: group.into_iter().cloned().collect(),
            })
            .collect();
        info!(
            "Grouped {} metadata rows into {} images",
            rows.len(),
            items.len()
        );
        EdemaDataset {
            img_dir: img_dir.as_ref().to_owned(),
            items,
            options,
        }
    }

    pub fn from_metadata_file<T: AsRef<Path>, U: AsRef<Path>>(
        metadata_path: T,
        img_dir: U,
        options: DatasetOptions,
    ) -> Result<EdemaDataset> {
        let rows = read_metadata_file(metadata_path)?;
        Ok(EdemaDataset::from_metadata(&rows, img_dir, options))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, idx: usize) -> Option<&DatasetItem> {
        self.items.get(idx)
    }

    pub fn items(&self) -> &[DatasetItem] {
        &self.items
    }

    pub fn options(&self) -> &DatasetOptions {
        &self.options
    }

    /// Loads an image and builds its resized masks
    pub fn get(&self, idx: usize) -> Result<ResizedSample> {
        let item = self.items.get(idx).ok_or(EdemaError::IndexOutOfRange {
            index: idx,
            len: self.items.len(),
        })?;
        let annotation = item.annotation()?;
        let path = self.img_dir.join(&item.img_path);
        debug!("Loading {}", path.display());
        let img = image::open(&path)?;
        resize_and_create_masks(
            &img,
            &annotation,
            self.options.target_size,
            self.options.linelike_finding_width,
        )
    }

    /// Loader over a subset of the dataset, e.g. the train indices of a split
    pub fn loader(&self, indices: Vec<usize>) -> EdemaDataLoader<'_> {
        EdemaDataLoader {
            dataset: self,
            indices,
            next_element_index: 0,
        }
    }
}

pub struct EdemaDataLoader<'a> {
    dataset: &'a EdemaDataset,
    indices: Vec<usize>,
    next_element_index: usize,
}

impl<'a> Iterator for EdemaDataLoader<'a> {
    type Item = Result<ResizedSample>;
    fn next(&mut self) -> Option<Self::Item> {
        let idx = *self.indices.get(self.next_element_index)?;
        self.next_element_index += 1;
        Some(self.dataset.get(idx))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.indices.len() - self.next_element_index;
        (remaining, Some(remaining))
    }
}

impl<'a> DataLoader for EdemaDataLoader<'a> {
    fn next_element_index(&self) -> usize {
        self.next_element_index
    }

    fn max_elem_index(&self) -> usize {
        self.indices.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn row(img: &str, class_name: &str, feature: &str, points: &str) -> MetadataRow {
        MetadataRow {
            img_path: img.to_string(),
            subject_id: img.to_string(),
            class_name: class_name.to_string(),
            class_id: Some(0),
            feature: Some(feature.to_string()),
            x1: None,
            y1: None,
            x2: None,
            y2: None,
            mask: None,
            points: Some(points.to_string()),
        }
    }

    fn dataset(dir: &Path) -> EdemaDataset {
        RgbImage::from_pixel(40, 20, Rgb([200, 100, 50]))
            .save(dir.join("a.png"))
            .unwrap();
        RgbImage::from_pixel(20, 20, Rgb([10, 10, 10]))
            .save(dir.join("b.png"))
            .unwrap();
        let rows = vec![
            row("a.png", "Interstitial edema", "Kerley", "[[0, 10], [39, 10]]"),
            row("b.png", "No edema", "Heart", "[[1, 1], [5, 5], [1, 5]]"),
            row("a.png", "Interstitial edema", "Heart", "[[1, 1], [5, 5], [1, 5]]"),
        ];
        let options = DatasetOptions {
            target_size: (16, 16),
            linelike_finding_width: 3,
        };
        EdemaDataset::from_metadata(&rows, dir, options)
    }

    #[test]
    fn groups_rows_into_items() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dataset(dir.path());
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.item(0).unwrap().img_path, "a.png");
        assert_eq!(
            dataset.item(1).unwrap().annotation().unwrap(),
            Annotation::NoFindings
        );
        assert!(matches!(
            dataset.get(2),
            Err(EdemaError::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn loader_yields_resized_samples() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dataset(dir.path());
        let mut loader = dataset.loader(vec![1, 0]);
        assert_eq!(loader.max_elem_index(), 2);

        let first = loader.next().unwrap().unwrap();
        assert_eq!(loader.next_element_index(), 1);
        assert_eq!(first.image.dimensions(), (16, 16));
        assert_eq!(first.masks.findings[0], 1);

        let second = loader.next().unwrap().unwrap();
        assert_eq!(second.masks.default_mask_value, 1);
        assert!(second.masks.masks.iter().all(|m| m.dimensions() == (16, 16)));
        // the 40x20 image is padded above and below with zeros
        assert_eq!(second.image.get_pixel(8, 0)[0], 0.);
        assert!(loader.next().is_none());
    }

    #[test]
    fn broken_rows_only_fail_their_image() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["good.png", "bad.png"] {
            RgbImage::from_pixel(20, 20, Rgb([120, 120, 120]))
                .save(dir.path().join(name))
                .unwrap();
        }
        let rows = vec![
            row("good.png", "Interstitial edema", "Kerley", "[[0, 10], [19, 10]]"),
            row("bad.png", "Interstitial edema", "Kerley", "[[1, 2], [3]]"),
        ];
        let options = DatasetOptions {
            target_size: (16, 16),
            linelike_finding_width: 3,
        };
        let dataset = EdemaDataset::from_metadata(&rows, dir.path(), options);
        assert_eq!(dataset.len(), 2);
        assert!(dataset.get(0).is_ok());
        assert!(matches!(
            dataset.get(1),
            Err(EdemaError::InvalidCoordinates(_))
        ));

        let results: Vec<_> = dataset.loader(vec![0, 1]).collect();
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
