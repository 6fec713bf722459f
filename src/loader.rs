use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use image::{DynamicImage, ImageFormat};
use tracing::{debug, info, warn};

use crate::error::{TextMarkError, TextMarkResult};

/// A decoded source image plus the bytes it came from, kept for session records.
#[derive(Clone)]
pub struct SourceImage {
    pub image: Arc<DynamicImage>,
    pub bytes: Arc<Vec<u8>>,
    pub path: Option<PathBuf>,
}

impl SourceImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn file_name(&self) -> Option<String> {
        self.path
            .as_ref()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
    }
}

pub fn decode_bytes(bytes: Vec<u8>, path: Option<PathBuf>) -> TextMarkResult<SourceImage> {
    let format = image::guess_format(&bytes).map_err(|err| TextMarkError::Decode(err.to_string()))?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
        return Err(TextMarkError::Decode(format!(
            "{format:?} is not supported, use PNG or JPEG"
        )));
    }
    let image = image::load_from_memory_with_format(&bytes, format)
        .map_err(|err| TextMarkError::Decode(err.to_string()))?;
    Ok(SourceImage {
        image: Arc::new(image),
        bytes: Arc::new(bytes),
        path,
    })
}

pub fn read_image_file(path: &Path) -> TextMarkResult<SourceImage> {
    let bytes = fs::read(path)?;
    decode_bytes(bytes, Some(path.to_path_buf()))
}

/// Soft limit check: an oversized file is reported but still loaded.
pub fn check_size(path: &Path, limit: u64) -> Option<TextMarkError> {
    let size = fs::metadata(path).ok()?.len();
    (size > limit).then(|| TextMarkError::OversizedFile {
        path: path.to_path_buf(),
        size,
        limit,
    })
}

pub enum LoaderEvent {
    Loaded(SourceImage),
    Failed { path: PathBuf, error: TextMarkError },
}

struct Tagged {
    token: u64,
    event: LoaderEvent,
}

pub struct LoadTicket {
    pub token: u64,
    pub warning: Option<TextMarkError>,
}

/// Decodes on worker threads. Only the most recent request may deliver a
/// result; anything older that finishes later is dropped in [`ImageLoader::poll`].
pub struct ImageLoader {
    tx: Sender<Tagged>,
    rx: Receiver<Tagged>,
    latest: u64,
    pending: bool,
    size_limit: u64,
}

impl ImageLoader {
    pub fn new(size_limit: u64) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            latest: 0,
            pending: false,
            size_limit,
        }
    }

    pub fn open(&mut self, path: PathBuf) -> LoadTicket {
        self.latest += 1;
        self.pending = true;
        let token = self.latest;

        let warning = check_size(&path, self.size_limit);
        if let Some(warning) = warning.as_ref() {
            warn!("{warning}");
        }

        info!(token, path = %path.display(), "loading image");
        let tx = self.tx.clone();
        thread::spawn(move || {
            let event = match read_image_file(&path) {
                Ok(source) => LoaderEvent::Loaded(source),
                Err(error) => LoaderEvent::Failed { path, error },
            };
            let _ = tx.send(Tagged { token, event });
        });

        LoadTicket { token, warning }
    }

    pub fn is_loading(&self) -> bool {
        self.pending
    }

    pub fn poll(&mut self) -> Option<LoaderEvent> {
        while let Ok(tagged) = self.rx.try_recv() {
            if tagged.token != self.latest {
                debug!(token = tagged.token, latest = self.latest, "dropping stale decode");
                continue;
            }
            self.pending = false;
            return Some(tagged.event);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use image::{DynamicImage, ImageFormat, RgbaImage};

    use super::{check_size, decode_bytes, ImageLoader, LoaderEvent, SourceImage, Tagged};
    use crate::error::TextMarkError;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(RgbaImage::new(width, height))
            .write_to(&mut buffer, ImageFormat::Png)
            .expect("encode png");
        buffer.into_inner()
    }

    fn wait_for(loader: &mut ImageLoader) -> LoaderEvent {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(event) = loader.poll() {
                return event;
            }
            assert!(Instant::now() < deadline, "loader did not finish");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn decode_keeps_native_dimensions() {
        let source = decode_bytes(png_bytes(31, 17), None).expect("decode");
        assert_eq!((source.width(), source.height()), (31, 17));
    }

    #[test]
    fn decode_rejects_garbage() {
        let result = decode_bytes(b"not an image".to_vec(), None);
        assert!(matches!(result, Err(TextMarkError::Decode(_))));
    }

    #[test]
    fn stale_results_are_dropped() {
        let mut loader = ImageLoader::new(u64::MAX);
        loader.latest = 2;
        loader.pending = true;

        let source = decode_bytes(png_bytes(4, 4), None).expect("decode");
        let stale = SourceImage {
            image: Arc::clone(&source.image),
            bytes: Arc::clone(&source.bytes),
            path: None,
        };
        loader
            .tx
            .send(Tagged {
                token: 1,
                event: LoaderEvent::Loaded(stale),
            })
            .expect("send");
        assert!(loader.poll().is_none());
        assert!(loader.is_loading());

        loader
            .tx
            .send(Tagged {
                token: 2,
                event: LoaderEvent::Loaded(source),
            })
            .expect("send");
        assert!(matches!(loader.poll(), Some(LoaderEvent::Loaded(_))));
        assert!(!loader.is_loading());
    }

    #[test]
    fn open_loads_from_disk_and_warns_on_size() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("photo.png");
        std::fs::write(&path, png_bytes(20, 10)).expect("write png");

        let mut loader = ImageLoader::new(8);
        let ticket = loader.open(path.clone());
        assert!(matches!(
            ticket.warning,
            Some(TextMarkError::OversizedFile { .. })
        ));

        match wait_for(&mut loader) {
            LoaderEvent::Loaded(source) => {
                assert_eq!((source.width(), source.height()), (20, 10));
                assert_eq!(source.file_name().as_deref(), Some("photo.png"));
            }
            LoaderEvent::Failed { error, .. } => panic!("unexpected failure: {error}"),
        }
        assert!(check_size(&path, u64::MAX).is_none());
    }

    #[test]
    fn newer_request_wins_over_older_one() {
        let dir = tempfile::tempdir().expect("temp dir");
        let first = dir.path().join("first.png");
        let second = dir.path().join("second.png");
        std::fs::write(&first, png_bytes(8, 8)).expect("write first");
        std::fs::write(&second, png_bytes(16, 4)).expect("write second");

        let mut loader = ImageLoader::new(u64::MAX);
        loader.open(first);
        loader.open(second);

        match wait_for(&mut loader) {
            LoaderEvent::Loaded(source) => assert_eq!(source.width(), 16),
            LoaderEvent::Failed { error, .. } => panic!("unexpected failure: {error}"),
        }
    }

    #[test]
    fn missing_file_reports_failure() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut loader = ImageLoader::new(u64::MAX);
        loader.open(dir.path().join("missing.png"));
        assert!(matches!(
            wait_for(&mut loader),
            LoaderEvent::Failed {
                error: TextMarkError::Io(_),
                ..
            }
        ));
    }
}
