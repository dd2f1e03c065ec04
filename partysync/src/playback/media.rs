//! Media element seam: the video playing in a party page.

use std::sync::{Arc, Mutex};

use crate::events::EventSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaEvent {
    /// A seek completed, whether user or programmatic.
    Seeked,
    /// Playback started or resumed after buffering.
    Playing,
}

pub trait MediaElement: Send + Sync {
    /// Playback position in seconds.
    fn current_time(&self) -> f64;

    fn set_current_time(&self, seconds: f64);

    fn events(&self) -> EventSource<MediaEvent>;
}

/// A page that may or may not contain a media element.
pub trait MediaPage: Send + Sync {
    fn media(&self) -> Option<Arc<dyn MediaElement>>;
}

#[derive(Default)]
struct MediaState {
    position: f64,
    applied: Vec<f64>,
}

/// Scriptable media element.
#[derive(Clone, Default)]
pub struct MemoryMedia {
    state: Arc<Mutex<MediaState>>,
    events: EventSource<MediaEvent>,
}

impl MemoryMedia {
    pub fn new(position: f64) -> Self {
        let media = Self::default();
        media.state.lock().unwrap().position = position;
        media
    }

    /// The user drags the seek bar.
    pub fn user_seek(&self, seconds: f64) {
        self.state.lock().unwrap().position = seconds;
        self.events.emit(&MediaEvent::Seeked);
    }

    pub fn start_playing(&self) {
        self.events.emit(&MediaEvent::Playing);
    }

    /// Positions set through [`MediaElement::set_current_time`], in order.
    pub fn applied(&self) -> Vec<f64> {
        self.state.lock().unwrap().applied.clone()
    }

    /// The element is removed from the page.
    pub fn detach(&self) {
        self.events.close();
    }
}

impl MediaElement for MemoryMedia {
    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().position
    }

    fn set_current_time(&self, seconds: f64) {
        {
            let mut state = self.state.lock().unwrap();
            state.position = seconds;
            state.applied.push(seconds);
        }
        self.events.emit(&MediaEvent::Seeked);
    }

    fn events(&self) -> EventSource<MediaEvent> {
        self.events.clone()
    }
}

/// Page with an optional [`MemoryMedia`].
#[derive(Clone, Default)]
pub struct MemoryPage {
    media: Option<MemoryMedia>,
}

impl MemoryPage {
    pub fn with_media(media: MemoryMedia) -> Self {
        Self { media: Some(media) }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl MediaPage for MemoryPage {
    fn media(&self) -> Option<Arc<dyn MediaElement>> {
        self.media
            .clone()
            .map(|media| Arc::new(media) as Arc<dyn MediaElement>)
    }
}
