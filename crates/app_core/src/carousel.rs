//! Image carousel and its auto-hiding thumbnail strip

use crate::config::TimingConfig;
use crate::timer::DelayedAction;
use app_proto::FileStat;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Called with the newly active image whenever the carousel moves
pub type PreviewCallback = Arc<dyn Fn(&FileStat) + Send + Sync>;

/// Keys the carousel reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarouselKey {
    Left,
    Right,
}

/// Steps through the images of one directory
pub struct ImageCarousel {
    images: Vec<FileStat>,
    index: usize,
    on_change: Option<PreviewCallback>,
}

impl std::fmt::Debug for ImageCarousel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCarousel")
            .field("images", &self.images.len())
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl ImageCarousel {
    /// Carousel over the images in `listing`, starting at `current`
    ///
    /// Returns `None` when the listing holds no images.
    pub fn new(listing: &[FileStat], current: &str) -> Option<Self> {
        let images: Vec<FileStat> = listing.iter().filter(|f| f.is_image()).cloned().collect();
        if images.is_empty() {
            return None;
        }
        let index = images.iter().position(|f| f.name == current).unwrap_or(0);
        Some(Self {
            images,
            index,
            on_change: None,
        })
    }

    pub fn with_callback(mut self, on_change: PreviewCallback) -> Self {
        self.on_change = Some(on_change);
        self
    }

    pub fn images(&self) -> &[FileStat] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> &FileStat {
        &self.images[self.index]
    }

    /// Returns whether the index moved
    pub fn key(&mut self, key: CarouselKey) -> bool {
        match key {
            CarouselKey::Left => self.set_index(self.index.saturating_sub(1)),
            CarouselKey::Right => self.set_index(self.index + 1),
        }
    }

    pub fn click_thumbnail(&mut self, index: usize) -> bool {
        self.set_index(index)
    }

    fn set_index(&mut self, index: usize) -> bool {
        let index = index.min(self.images.len() - 1);
        if index == self.index {
            return false;
        }
        self.index = index;
        if let Some(on_change) = &self.on_change {
            on_change(&self.images[index]);
        }
        true
    }
}

/// Visibility of the thumbnail strip under a preview
///
/// Pointer movement is sampled at most once per sample window: the first
/// movement is taken right away and the last one seen during the window is
/// taken when it closes. A sample shows the strip and arms the hide timer;
/// a sample taken inside the strip disarms it instead, so the strip stays
/// up while the pointer rests on it.
#[derive(Clone)]
pub struct ThumbnailStrip {
    visible: Arc<watch::Sender<bool>>,
    sampler: DelayedAction,
    hide: DelayedAction,
    pending: Arc<Mutex<Option<bool>>>,
    sample_delay: Duration,
    hide_delay: Duration,
}

impl ThumbnailStrip {
    pub fn new(timing: &TimingConfig) -> Self {
        let (visible, _) = watch::channel(false);
        Self {
            visible: Arc::new(visible),
            sampler: DelayedAction::new(),
            hide: DelayedAction::new(),
            pending: Arc::new(Mutex::new(None)),
            sample_delay: timing.pointer_sample(),
            hide_delay: timing.thumbnail_hide(),
        }
    }

    pub fn is_visible(&self) -> bool {
        *self.visible.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.visible.subscribe()
    }

    /// Report pointer movement inside the preview container
    pub fn pointer_moved(&self, inside_strip: bool) {
        if self.sampler.is_armed() {
            *self.pending.lock() = Some(inside_strip);
            return;
        }

        self.sample(inside_strip);
        let strip = self.clone();
        self.sampler.arm(self.sample_delay, async move {
            let last = strip.pending.lock().take();
            if let Some(inside_strip) = last {
                strip.sample(inside_strip);
            }
        });
    }

    /// Hide immediately and forget pending samples
    pub fn reset(&self) {
        self.sampler.disarm();
        self.hide.disarm();
        self.pending.lock().take();
        self.visible.send_if_modified(|shown| std::mem::replace(shown, false));
    }

    fn sample(&self, inside_strip: bool) {
        self.visible.send_if_modified(|shown| !std::mem::replace(shown, true));
        if inside_strip {
            self.hide.disarm();
            return;
        }
        let visible = Arc::clone(&self.visible);
        self.hide.arm(self.hide_delay, async move {
            visible.send_if_modified(|shown| std::mem::replace(shown, false));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(names: &[&str]) -> Vec<FileStat> {
        names.iter().map(|n| FileStat::file(n, 1)).collect()
    }

    #[test]
    fn test_filters_images_and_starts_at_current() {
        let mut listing = images(&["a.png", "notes.txt", "b.JPG", "c.gif"]);
        listing.push(FileStat::dir("photos.png"));

        let carousel = ImageCarousel::new(&listing, "b.JPG").unwrap();
        assert_eq!(carousel.len(), 3);
        assert_eq!(carousel.index(), 1);
        assert_eq!(carousel.current().name, "b.JPG");

        assert!(ImageCarousel::new(&images(&["x.txt"]), "x.txt").is_none());
    }

    #[test]
    fn test_keys_clamp_at_both_ends() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut carousel = ImageCarousel::new(&images(&["1.png", "2.png", "3.png"]), "1.png")
            .unwrap()
            .with_callback(Arc::new(move |f: &FileStat| sink.lock().push(f.name.clone())));

        assert!(!carousel.key(CarouselKey::Left));
        assert_eq!(carousel.index(), 0);

        for _ in 0..10 {
            carousel.key(CarouselKey::Right);
        }
        assert_eq!(carousel.index(), 2);

        // Only real moves reach the callback
        assert_eq!(*seen.lock(), vec!["2.png", "3.png"]);
    }

    #[test]
    fn test_click_thumbnail() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut carousel = ImageCarousel::new(&images(&["1.png", "2.png", "3.png"]), "3.png")
            .unwrap()
            .with_callback(Arc::new(move |f: &FileStat| sink.lock().push(f.name.clone())));

        assert!(carousel.click_thumbnail(0));
        assert!(!carousel.click_thumbnail(0));
        assert_eq!(carousel.current().name, "1.png");
        assert_eq!(*seen.lock(), vec!["1.png"]);
    }

    async fn advance(ms: u64) {
        tokio::time::advance(Duration::from_millis(ms)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_strip_shows_then_hides() {
        let strip = ThumbnailStrip::new(&TimingConfig::default());

        assert!(!strip.is_visible());
        strip.pointer_moved(false);
        assert!(strip.is_visible());

        advance(1999).await;
        assert!(strip.is_visible());
        advance(1).await;
        assert!(!strip.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_motion_shows_strip() {
        let strip = ThumbnailStrip::new(&TimingConfig::default());

        // One event per frame for three seconds
        for _ in 0..190 {
            strip.pointer_moved(false);
            assert!(strip.is_visible());
            advance(16).await;
        }

        advance(2100).await;
        assert!(!strip.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_move_in_window_is_sampled() {
        let strip = ThumbnailStrip::new(&TimingConfig::default());

        strip.pointer_moved(false);
        advance(50).await;
        strip.pointer_moved(true);
        advance(50).await;

        // The trailing sample came from inside the strip
        advance(5000).await;
        assert!(strip.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_movement_keeps_strip_visible() {
        let strip = ThumbnailStrip::new(&TimingConfig::default());

        strip.pointer_moved(false);
        advance(100).await;
        for _ in 0..5 {
            advance(1500).await;
            strip.pointer_moved(false);
        }
        advance(100).await;
        assert!(strip.is_visible());

        advance(2000).await;
        assert!(!strip.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pointer_inside_strip_disarms_hide() {
        let strip = ThumbnailStrip::new(&TimingConfig::default());

        strip.pointer_moved(false);
        advance(1000).await;
        strip.pointer_moved(true);
        advance(100).await;

        advance(10_000).await;
        assert!(strip.is_visible());

        strip.pointer_moved(false);
        advance(2100).await;
        assert!(!strip.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_hides() {
        let strip = ThumbnailStrip::new(&TimingConfig::default());
        strip.pointer_moved(false);
        advance(100).await;

        strip.reset();
        assert!(!strip.is_visible());
        advance(5000).await;
        assert!(!strip.is_visible());
    }
}
