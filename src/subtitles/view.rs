use crate::subtitles::reader::Subtitle;

/// Tracks which subtitle the current playing position falls into.
///
/// Positions normally move forward in small steps, so lookup is a short
/// directional scan from the previous hit instead of a search from scratch.
pub struct SubtitleView {
    subtitles: Vec<Subtitle>,
    cursor: usize,
}

impl SubtitleView {
    pub fn new(subtitles: Vec<Subtitle>) -> Self {
        Self { subtitles, cursor: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.subtitles.is_empty()
    }

    /// Updates the view with the current position in milliseconds and
    /// returns the text that should be displayed, if any.
    pub fn set_position(&mut self, pos: i64) -> Option<&str> {
        if self.subtitles.is_empty() {
            return None;
        }

        while self.cursor > 0 && pos < self.subtitles[self.cursor].start_time {
            self.cursor -= 1;
        }
        while self.cursor + 1 < self.subtitles.len() && pos > self.subtitles[self.cursor].end_time {
            self.cursor += 1;
        }

        let subtitle = &self.subtitles[self.cursor];
        if subtitle.start_time <= pos && pos <= subtitle.end_time {
            Some(&subtitle.text)
        } else {
            None
        }
    }
}
