use std::collections::VecDeque;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use web_time::Instant;

use crate::enums::{LoadState, SortBy, UpdateMode};
use crate::image_reader::ImageReader;
use crate::series::Series;

/// Loader threads used when no other count is configured. Loading is
/// dominated by I/O, so a small pool suffices.
pub const DEFAULT_WORKER_COUNT: usize = 5;

#[derive(Debug, Error)]
pub enum SeriesReaderError {
    #[error("Index out of range in SeriesReader::output({index}), {len} output(s) available")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("No DICOM files found in {0}")]
    NoFiles(PathBuf),

    #[error("Could not start loader threads: {0}")]
    ThreadPool(#[from] ThreadPoolBuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Snapshot of the loading progress of one update
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub files_loaded: usize,
    pub files_total: usize,
    pub complete: bool,
}

/// Called from a loader thread after every processed file
pub type ProgressListener = Arc<dyn Fn(Progress) + Send + Sync>;

#[derive(Clone, Debug)]
pub struct SeriesReaderOptions {
    pub worker_count: usize,
    /// Order applied to the output once every file is loaded
    pub sort_by: SortBy,
}

impl Default for SeriesReaderOptions {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            sort_by: SortBy::None,
        }
    }
}

struct RunStatus {
    progress: Progress,
    active_workers: usize,
}

/// State shared between the loader threads of one update.
///
/// `status` is never held while the output series is locked.
struct LoadRun {
    queue: Mutex<VecDeque<PathBuf>>,
    files_total: usize,
    /// Files whose images are in the output, counted before `status`
    files_read: AtomicUsize,
    status: Mutex<RunStatus>,
    changed: Condvar,
    cancelled: AtomicBool,
    output: Arc<Series>,
    image_reader: ImageReader,
    listeners: Vec<ProgressListener>,
    sort_by: SortBy,
    started: Instant,
}

impl LoadRun {
    fn status(&self) -> MutexGuard<'_, RunStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_file(&self) -> Option<PathBuf> {
        if self.cancelled.load(Ordering::Acquire) {
            return None;
        }
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn work(&self) {
        let _exit = WorkerExit(self);
        while let Some(path) = self.next_file() {
            self.process_file(&path);
        }
    }

    fn process_file(&self, path: &Path) {
        guarded(&format!("Loading {}", path.display()), || {
            let images = self.image_reader.read_file(path);
            if images.is_empty() {
                warn!("No images loaded from {}", path.display());
            }
            self.output.add_all(images);
        });

        // the last file read finishes the series before anyone can see the
        // load as complete
        if self.files_read.fetch_add(1, Ordering::AcqRel) + 1 == self.files_total {
            guarded("Sorting the series", || self.finish_series());
        }

        let progress = {
            let mut status = self.status();
            status.progress.files_loaded += 1;
            status.progress.complete = status.progress.files_loaded == status.progress.files_total;
            status.progress
        };
        self.changed.notify_all();
        debug!(
            "Processed {} ({}/{})",
            path.display(),
            progress.files_loaded,
            progress.files_total
        );

        for listener in &self.listeners {
            guarded("A progress listener", || listener(progress));
        }
    }

    fn finish_series(&self) {
        if let Some(criterion) = self.sort_by.criterion() {
            self.output.set_sort_criterion(Arc::from(criterion));
        }
        info!(
            "Loaded {} image(s) from {} file(s) in {:?}",
            self.output.number_of_images(),
            self.files_total,
            self.started.elapsed()
        );
    }

    fn wait_while(&self, condition: impl Fn(&RunStatus) -> bool) -> Progress {
        let status = self
            .changed
            .wait_while(self.status(), |status| condition(status))
            .unwrap_or_else(PoisonError::into_inner);
        status.progress
    }
}

/// Runs `task`, logging a panic instead of unwinding through the worker so
/// that the file still counts as processed.
fn guarded(what: &str, task: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!("{what} panicked");
    }
}

/// Marks a worker as finished even when it stopped unexpectedly.
struct WorkerExit<'a>(&'a LoadRun);

impl Drop for WorkerExit<'_> {
    fn drop(&mut self) {
        let mut status = self.0.status();
        status.active_workers = status.active_workers.saturating_sub(1);
        drop(status);
        self.0.changed.notify_all();
    }
}

/// Loads a list of files into a [`Series`] on a pool of background threads.
///
/// All images of one update end up in a single output series, regardless of
/// the DICOM series the files belong to.
pub struct SeriesReader {
    filenames: Vec<PathBuf>,
    options: SeriesReaderOptions,
    listeners: Vec<ProgressListener>,
    pool: Option<Arc<ThreadPool>>,
    build_pool: fn(usize) -> Result<ThreadPool, ThreadPoolBuildError>,
    run: Option<Arc<LoadRun>>,
}

impl Default for SeriesReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesReader {
    pub fn new() -> Self {
        Self::with_options(SeriesReaderOptions::default())
    }

    pub fn with_options(options: SeriesReaderOptions) -> Self {
        Self {
            filenames: Vec::new(),
            options,
            listeners: Vec::new(),
            pool: None,
            build_pool: build_loader_pool,
            run: None,
        }
    }

    /// Reader for every `.dcm` file directly inside `path`
    pub fn from_directory(
        path: impl AsRef<Path>,
        options: SeriesReaderOptions,
    ) -> Result<Self, SeriesReaderError> {
        let mut paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(SeriesReaderError::NoFiles(path.as_ref().to_path_buf()));
        }
        paths.sort();

        let mut reader = Self::with_options(options);
        reader.set_filenames(paths);
        Ok(reader)
    }

    pub fn set_filename(&mut self, filename: impl Into<PathBuf>) {
        self.set_filenames([filename.into()]);
    }

    pub fn set_filenames(&mut self, filenames: impl IntoIterator<Item = impl Into<PathBuf>>) {
        self.filenames = filenames.into_iter().map(Into::into).collect();
    }

    pub fn filenames(&self) -> &[PathBuf] {
        &self.filenames
    }

    pub fn options(&self) -> &SeriesReaderOptions {
        &self.options
    }

    pub fn add_progress_listener(&mut self, listener: impl Fn(Progress) + Send + Sync + 'static) {
        self.listeners.push(Arc::new(listener));
    }

    /// Same as `update(UpdateMode::MinimalContinuing)`
    pub fn minimal_continuing_update(&mut self) -> Result<LoadState, SeriesReaderError> {
        self.update(UpdateMode::MinimalContinuing)
    }

    /// Starts loading the configured files into a fresh output series.
    ///
    /// A load still running from a previous update is cancelled; its
    /// workers finish their current file and write only to the old output.
    pub fn update(&mut self, mode: UpdateMode) -> Result<LoadState, SeriesReaderError> {
        self.cancel();

        let files_total = self.filenames.len();
        let worker_count = self.options.worker_count.max(1).min(files_total);
        let pool = if worker_count > 0 {
            Some(self.pool()?)
        } else {
            None
        };

        let run = Arc::new(LoadRun {
            queue: Mutex::new(self.filenames.iter().cloned().collect()),
            files_total,
            files_read: AtomicUsize::new(0),
            status: Mutex::new(RunStatus {
                progress: Progress {
                    files_loaded: 0,
                    files_total,
                    complete: files_total == 0,
                },
                active_workers: worker_count,
            }),
            changed: Condvar::new(),
            cancelled: AtomicBool::new(false),
            output: Arc::new(Series::new()),
            image_reader: ImageReader::new(),
            listeners: self.listeners.clone(),
            sort_by: self.options.sort_by,
            started: Instant::now(),
        });
        self.run = Some(Arc::clone(&run));

        let Some(pool) = pool else {
            return Ok(self.state());
        };

        info!("Loading {files_total} file(s) with {worker_count} worker(s)");
        for _ in 0..worker_count {
            let run = Arc::clone(&run);
            pool.spawn(move || run.work());
        }

        match mode {
            UpdateMode::Blocking => {
                run.wait_while(|status| status.active_workers > 0);
            }
            UpdateMode::MinimalContinuing => {
                run.wait_while(|status| {
                    status.progress.files_loaded == 0 && status.active_workers > 0
                });
            }
        }
        Ok(self.state())
    }

    /// Progress of the current update, safe to poll from any thread
    pub fn progress(&self) -> Progress {
        self.run
            .as_ref()
            .map(|run| run.status().progress)
            .unwrap_or_default()
    }

    pub fn state(&self) -> LoadState {
        let Some(run) = &self.run else {
            return LoadState::Idle;
        };
        let status = run.status();
        if status.progress.complete {
            LoadState::Completed
        } else if run.cancelled.load(Ordering::Acquire) && status.active_workers == 0 {
            LoadState::Cancelled
        } else if status.progress.files_loaded > 0 {
            LoadState::PartiallyComplete
        } else {
            LoadState::Loading
        }
    }

    /// Asks the workers of the current update to stop after their current
    /// file. Images loaded so far stay in the output.
    pub fn cancel(&self) {
        if let Some(run) = &self.run {
            if !run.status().progress.complete && !run.cancelled.swap(true, Ordering::AcqRel) {
                info!("Cancelling running load");
            }
        }
    }

    /// Blocks until every worker of the current update has finished.
    pub fn wait(&self) -> Progress {
        match &self.run {
            Some(run) => run.wait_while(|status| status.active_workers > 0),
            None => Progress::default(),
        }
    }

    pub fn number_of_outputs(&self) -> usize {
        usize::from(self.run.is_some())
    }

    pub fn output(&self, index: usize) -> Result<Arc<Series>, SeriesReaderError> {
        match &self.run {
            Some(run) if index == 0 => Ok(Arc::clone(&run.output)),
            _ => Err(SeriesReaderError::IndexOutOfRange {
                index,
                len: self.number_of_outputs(),
            }),
        }
    }

    fn pool(&mut self) -> Result<Arc<ThreadPool>, SeriesReaderError> {
        if let Some(pool) = &self.pool {
            return Ok(Arc::clone(pool));
        }
        let pool = Arc::new((self.build_pool)(self.options.worker_count.max(1))?);
        self.pool = Some(Arc::clone(&pool));
        Ok(pool)
    }
}

fn build_loader_pool(worker_count: usize) -> Result<ThreadPool, ThreadPoolBuildError> {
    ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .thread_name(|index| format!("series-loader-{index}"))
        .panic_handler(|_| error!("A series loader thread panicked"))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_reader_has_no_output() {
        let reader = SeriesReader::new();
        assert_eq!(reader.state(), LoadState::Idle);
        assert_eq!(reader.progress(), Progress::default());
        assert_eq!(reader.number_of_outputs(), 0);
        assert!(matches!(
            reader.output(0),
            Err(SeriesReaderError::IndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn empty_file_list_completes_immediately() {
        let mut reader = SeriesReader::new();
        let state = reader.update(UpdateMode::MinimalContinuing).expect("should update");
        assert_eq!(state, LoadState::Completed);
        assert_eq!(
            reader.progress(),
            Progress {
                files_loaded: 0,
                files_total: 0,
                complete: true
            }
        );
        let series = reader.output(0).expect("one output");
        assert_eq!(series.number_of_images(), 0);
        assert!(reader.output(1).is_err());
    }

    #[test]
    fn unreadable_files_still_count_as_processed() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let paths: Vec<_> = (0..3)
            .map(|i| {
                let path = dir.path().join(format!("{i}.dcm"));
                fs::write(&path, b"garbage").expect("should write");
                path
            })
            .collect();

        let mut reader = SeriesReader::new();
        reader.set_filenames(paths);
        let state = reader.update(UpdateMode::Blocking).expect("should update");
        assert_eq!(state, LoadState::Completed);
        assert_eq!(reader.progress().files_loaded, 3);
        assert_eq!(reader.output(0).expect("one output").number_of_images(), 0);
    }

    #[test]
    fn panicking_listener_does_not_stall_the_load() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let paths: Vec<_> = (0..3)
            .map(|i| {
                let path = dir.path().join(format!("{i}.dcm"));
                fs::write(&path, b"garbage").expect("should write");
                path
            })
            .collect();

        let mut reader = SeriesReader::with_options(SeriesReaderOptions {
            worker_count: 1,
            sort_by: SortBy::InstanceNumber,
        });
        reader.add_progress_listener(|progress| {
            if progress.files_loaded == 1 {
                panic!("listener failure");
            }
        });
        reader.set_filenames(paths);
        let state = reader.update(UpdateMode::Blocking).expect("should update");

        assert_eq!(state, LoadState::Completed);
        assert_eq!(
            reader.progress(),
            Progress {
                files_loaded: 3,
                files_total: 3,
                complete: true
            }
        );
    }

    #[test]
    fn failed_pool_start_publishes_no_run() {
        let mut reader = SeriesReader::new();
        reader.build_pool = |_| {
            // the global pool exists once queried, so it cannot be built again
            let _ = rayon::current_num_threads();
            ThreadPoolBuilder::new()
                .build_global()
                .and_then(|()| ThreadPoolBuilder::new().build())
        };
        reader.set_filenames(["a.dcm", "b.dcm"]);

        assert!(matches!(
            reader.update(UpdateMode::Blocking),
            Err(SeriesReaderError::ThreadPool(_))
        ));
        assert_eq!(reader.state(), LoadState::Idle);
        assert_eq!(reader.wait(), Progress::default());
        assert_eq!(reader.number_of_outputs(), 0);
    }

    #[test]
    fn from_directory_without_dicom_files_fails() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        fs::write(dir.path().join("notes.txt"), b"hello").expect("should write");
        assert!(matches!(
            SeriesReader::from_directory(dir.path(), SeriesReaderOptions::default()),
            Err(SeriesReaderError::NoFiles(_))
        ));
    }

    #[test]
    fn set_filename_replaces_list() {
        let mut reader = SeriesReader::new();
        reader.set_filenames(["a.dcm", "b.dcm"]);
        reader.set_filename("c.dcm");
        assert_eq!(reader.filenames(), &[PathBuf::from("c.dcm")]);
    }
}
