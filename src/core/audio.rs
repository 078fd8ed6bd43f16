use log::debug;

/// Opaque handle to a playing keysound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SoundHandle(pub u64);

/// Requested playback of one keysound.
#[derive(Clone, Debug, PartialEq)]
pub struct SoundCue<'a> {
    pub sound: &'a str,
    pub start_offset_s: f64,
    pub volume_percent: u8,
    pub pan_percent: i8,
    // Hidden-lane sounds go to their own channel.
    pub hidden: bool,
}

/// Playback side of the engine. All calls are fire-and-forget.
pub trait AudioSink {
    fn play_sound(&mut self, cue: SoundCue<'_>) -> Option<SoundHandle>;
    fn stop_sound(&mut self, handle: SoundHandle);
    fn play_backing_track(&mut self, start_offset_s: f64);
    fn seek_video(&mut self, offset_s: f64);
    /// Mixer-wide: keysounds are sped up along with the backing track.
    fn set_playback_speed(&mut self, factor: f64);
    /// Length of a decoded clip, `None` if it never loaded.
    fn clip_length_s(&self, sound: &str) -> Option<f64>;
}

/// Sink for headless runs: every clip is considered loaded and silent.
#[derive(Debug, Default)]
pub struct NullAudio {
    next_handle: u64,
}

impl AudioSink for NullAudio {
    fn play_sound(&mut self, cue: SoundCue<'_>) -> Option<SoundHandle> {
        if cue.sound.is_empty() {
            return None;
        }
        self.next_handle = self.next_handle.wrapping_add(1);
        Some(SoundHandle(self.next_handle))
    }

    fn stop_sound(&mut self, _handle: SoundHandle) {}

    fn play_backing_track(&mut self, start_offset_s: f64) {
        debug!("Backing track (null) from {start_offset_s:.3}s");
    }

    fn seek_video(&mut self, _offset_s: f64) {}

    fn set_playback_speed(&mut self, _factor: f64) {}

    fn clip_length_s(&self, _sound: &str) -> Option<f64> {
        Some(0.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AudioCall {
    Play { sound: String, start_offset_s: f64, hidden: bool, handle: SoundHandle },
    Stop(SoundHandle),
    BackingTrack(f64),
    SeekVideo(f64),
    Speed(f64),
}

/// Sink that records every call, with fixed clip lengths.
#[derive(Debug, Default)]
pub struct RecordingAudio {
    pub calls: Vec<AudioCall>,
    pub clip_length_s: f64,
    pub missing: Vec<String>,
    next_handle: u64,
}

impl RecordingAudio {
    pub fn with_clip_length(clip_length_s: f64) -> Self {
        Self { clip_length_s, ..Self::default() }
    }

    pub fn played(&self) -> impl Iterator<Item = (&str, f64, bool)> + '_ {
        self.calls.iter().filter_map(|c| match c {
            AudioCall::Play { sound, start_offset_s, hidden, .. } => {
                Some((sound.as_str(), *start_offset_s, *hidden))
            }
            _ => None,
        })
    }

    pub fn stopped(&self) -> impl Iterator<Item = SoundHandle> + '_ {
        self.calls.iter().filter_map(|c| match c {
            AudioCall::Stop(h) => Some(*h),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl AudioSink for RecordingAudio {
    fn play_sound(&mut self, cue: SoundCue<'_>) -> Option<SoundHandle> {
        if cue.sound.is_empty() {
            return None;
        }
        self.next_handle = self.next_handle.wrapping_add(1);
        let handle = SoundHandle(self.next_handle);
        self.calls.push(AudioCall::Play {
            sound: cue.sound.to_string(),
            start_offset_s: cue.start_offset_s,
            hidden: cue.hidden,
            handle,
        });
        Some(handle)
    }

    fn stop_sound(&mut self, handle: SoundHandle) {
        self.calls.push(AudioCall::Stop(handle));
    }

    fn play_backing_track(&mut self, start_offset_s: f64) {
        self.calls.push(AudioCall::BackingTrack(start_offset_s));
    }

    fn seek_video(&mut self, offset_s: f64) {
        self.calls.push(AudioCall::SeekVideo(offset_s));
    }

    fn set_playback_speed(&mut self, factor: f64) {
        self.calls.push(AudioCall::Speed(factor));
    }

    fn clip_length_s(&self, sound: &str) -> Option<f64> {
        if self.missing.iter().any(|m| m == sound) {
            None
        } else {
            Some(self.clip_length_s)
        }
    }
}
