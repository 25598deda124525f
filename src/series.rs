use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::geometry::SeriesGeometry;
use crate::image::Image;
use crate::priority_lock::{HighPriorityGuard, LowPriorityGuard, PriorityLock};
use crate::sort_criterion::SortCriterion;

/// Images of a series together with their aggregate geometry, as seen
/// through one of the series' lock handles.
#[derive(Default)]
pub struct SeriesContent {
    images: Vec<Arc<Image>>,
    geometry: SeriesGeometry,
    sort_criterion: Option<Arc<dyn SortCriterion>>,
}

impl SeriesContent {
    /// Images in load order, or in sort order once a criterion was applied
    pub fn images(&self) -> &[Arc<Image>] {
        &self.images
    }

    pub fn geometry(&self) -> &SeriesGeometry {
        &self.geometry
    }

    pub fn sort_criterion(&self) -> Option<&Arc<dyn SortCriterion>> {
        self.sort_criterion.as_ref()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    fn update_geometry(&mut self) {
        let was_consistent = self.geometry.consistent_spacing;
        self.geometry = SeriesGeometry::from_planes(
            self.images
                .iter()
                .filter_map(|image| image.plane_geometry()),
        );
        if was_consistent && !self.geometry.consistent_spacing {
            warn!(
                "Slices of the series have different spacings, using {:?} of the first slice",
                self.geometry.spacing
            );
        }
    }

    fn update_sorting(&mut self) {
        if let Some(criterion) = &self.sort_criterion {
            self.images
                .sort_by(|left, right| criterion.compare(left, right));
        }
    }
}

impl fmt::Debug for SeriesContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeriesContent")
            .field("images", &self.images.len())
            .field("geometry", &self.geometry)
            .field("sort_criterion", &self.sort_criterion)
            .finish()
    }
}

/// Ordered collection of images forming one acquisition.
///
/// A series is shared between loader threads, which append through the low
/// priority handle, and a renderer, which reads through the high priority
/// handle. Appending does not sort; the order follows the sort criterion
/// only after [`Series::set_sort_criterion`] was applied following the last
/// append.
#[derive(Debug, Default)]
pub struct Series {
    content: PriorityLock<SeriesContent>,
    modified: AtomicU64,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, image: Image) {
        self.add_all([image]);
    }

    /// Appends `images` in one critical section.
    pub fn add_all(&self, images: impl IntoIterator<Item = Image>) {
        {
            let mut content = self.content.low_priority();
            let before = content.images.len();
            content.images.extend(images.into_iter().map(Arc::new));
            if content.images.len() == before {
                return;
            }
            content.update_geometry();
        }
        self.modified();
    }

    /// Stores `criterion` and immediately re-sorts the current images.
    pub fn set_sort_criterion(&self, criterion: Arc<dyn SortCriterion>) {
        {
            let mut content = self.content.low_priority();
            content.sort_criterion = Some(criterion);
            content.update_sorting();
            content.update_geometry();
        }
        self.modified();
    }

    pub fn sort_criterion(&self) -> Option<Arc<dyn SortCriterion>> {
        self.content.high_priority().sort_criterion.clone()
    }

    /// Snapshot of the current images
    pub fn all_images(&self) -> Vec<Arc<Image>> {
        self.content.high_priority().images.clone()
    }

    pub fn number_of_images(&self) -> usize {
        self.content.high_priority().len()
    }

    pub fn geometry(&self) -> SeriesGeometry {
        self.content.high_priority().geometry.clone()
    }

    /// Access for rendering; preferred over pending low priority users
    pub fn acquire_high_priority_access(&self) -> HighPriorityGuard<'_, SeriesContent> {
        self.content.high_priority()
    }

    /// Access for background work; yields to pending high priority users
    pub fn acquire_low_priority_access(&self) -> LowPriorityGuard<'_, SeriesContent> {
        self.content.low_priority()
    }

    /// Incremented on every change to images, order or geometry
    pub fn modified_count(&self) -> u64 {
        self.modified.load(Ordering::Acquire)
    }

    fn modified(&self) {
        self.modified.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::dicom_dataset::DicomTagStore;
    use crate::geometry::PlaneGeometry;
    use crate::image::PixelData;
    use crate::sort_criterion::{SortByImagePosition, SortByTag};
    use dicom::core::{DataElement, PrimitiveValue, VR};
    use dicom::object::InMemDicomObject;
    use dicom_dictionary_std::tags;
    use ndarray::Array2;
    use std::thread;

    fn image_at(x: f64, z: f64, instance: &str) -> Image {
        let object = InMemDicomObject::from_element_iter([DataElement::new(
            tags::INSTANCE_NUMBER,
            VR::IS,
            PrimitiveValue::from(instance),
        )]);
        let mut image = Image::new(Dataset::new(DicomTagStore::from_object(object)));
        image.set_plane_geometry(
            PlaneGeometry {
                origin: [x, 0.0, z],
                ..PlaneGeometry::default()
            }
            .with_extent(2, 2),
        );
        image
            .set_pixel_data(PixelData::new(Array2::zeros((2, 2))))
            .expect("plane was set");
        image
    }

    fn instance_numbers(series: &Series) -> Vec<f64> {
        use crate::dataset::TagStore;
        series
            .all_images()
            .iter()
            .map(|image| {
                image
                    .get_as_double(tags::INSTANCE_NUMBER.into())
                    .expect("instance number present")
            })
            .collect()
    }

    #[test]
    fn aggregate_origin_is_minimum_of_slices() {
        let series = Series::new();
        series.add(image_at(0.0, 0.0, "1"));
        series.add(image_at(5.0, 0.0, "2"));
        series.add(image_at(-2.0, 0.0, "3"));

        let geometry = series.geometry();
        assert_eq!(geometry.origin[0], -2.0);
        assert_eq!(geometry.number_of_slices(), 3);
        assert_eq!(series.number_of_images(), 3);
    }

    #[test]
    fn add_marks_modified() {
        let series = Series::new();
        let before = series.modified_count();
        series.add(image_at(0.0, 0.0, "1"));
        assert!(series.modified_count() > before);

        let unchanged = series.modified_count();
        series.add_all(std::iter::empty());
        assert_eq!(series.modified_count(), unchanged);
    }

    #[test]
    fn images_keep_insertion_order_until_sorted() {
        let series = Series::new();
        series.add_all([
            image_at(0.0, 0.0, "3"),
            image_at(0.0, 1.0, "1"),
            image_at(0.0, 2.0, "2"),
        ]);
        assert_eq!(instance_numbers(&series), vec![3.0, 1.0, 2.0]);

        series.set_sort_criterion(Arc::new(SortByTag::ascending(tags::INSTANCE_NUMBER)));
        assert_eq!(instance_numbers(&series), vec![1.0, 2.0, 3.0]);

        series.add(image_at(0.0, 3.0, "0"));
        assert_eq!(instance_numbers(&series), vec![1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn sorting_twice_is_deterministic() {
        let series = Series::new();
        series.add_all(
            ["4", "2", "2", "9", "1"]
                .into_iter()
                .map(|n| image_at(0.0, 0.0, n)),
        );
        let criterion: Arc<dyn SortCriterion> =
            Arc::new(SortByTag::ascending(tags::INSTANCE_NUMBER));
        series.set_sort_criterion(Arc::clone(&criterion));
        let first: Vec<u64> = series.all_images().iter().map(|i| i.id()).collect();
        series.set_sort_criterion(criterion);
        let second: Vec<u64> = series.all_images().iter().map(|i| i.id()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn sorting_by_position_updates_geometry_order() {
        let series = Series::new();
        series.add_all([image_at(0.0, 10.0, "1"), image_at(0.0, -10.0, "2")]);
        series.set_sort_criterion(Arc::new(SortByImagePosition));
        let geometry = series.geometry();
        assert_eq!(geometry.slices[0].origin[2], -10.0);
        assert_eq!(geometry.origin[2], -10.0);
    }

    #[test]
    fn snapshot_is_independent_of_later_appends() {
        let series = Series::new();
        series.add(image_at(0.0, 0.0, "1"));
        let snapshot = series.all_images();
        series.add(image_at(0.0, 1.0, "2"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(series.number_of_images(), 2);
    }

    #[test]
    fn concurrent_appends_are_all_kept() {
        let series = Arc::new(Series::new());
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let series = Arc::clone(&series);
                thread::spawn(move || {
                    for i in 0..25 {
                        series.add(image_at(f64::from(t), f64::from(i), "1"));
                    }
                })
            })
            .collect();
        for _ in 0..10 {
            let content = series.acquire_high_priority_access();
            assert_eq!(content.geometry().number_of_slices(), content.len());
        }
        for writer in writers {
            writer.join().expect("writer should finish");
        }
        assert_eq!(series.number_of_images(), 100);
    }
}
