//! Frame timing and drop statistics

/// Nanoseconds between frames at `fps_num / fps_den` frames per second
pub fn frame_time_ns(fps_num: u32, fps_den: u32) -> u64 {
    if fps_num == 0 {
        return 0;
    }
    (1_000_000_000.0 * fps_den as f64 / fps_num as f64) as u64
}

/// Share of frame intervals lost to skips, in percent.
///
/// `total_frames` counts delivered passes only, so the denominator is
/// delivered plus skipped.
pub fn skip_percentage(skipped_frames: u64, total_frames: u64) -> f64 {
    let intervals = skipped_frames + total_frames;
    if intervals == 0 {
        return 0.0;
    }
    skipped_frames as f64 / intervals as f64 * 100.0
}

/// Snapshot of an output's counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoOutputStats {
    pub total_frames: u64,
    pub skipped_frames: u64,
    pub available_frames: usize,
    pub cache_size: usize,
    pub consumers: usize,
}

/// Skip summary logged when the last consumer disconnects
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkipReport {
    pub skipped: u64,
    /// Delivered plus skipped passes
    pub intervals: u64,
    pub percentage: f64,
}

impl VideoOutputStats {
    pub fn skip_percentage(&self) -> f64 {
        skip_percentage(self.skipped_frames, self.total_frames)
    }

    /// `None` when nothing was skipped
    pub fn skip_report(&self) -> Option<SkipReport> {
        (self.skipped_frames > 0).then(|| SkipReport {
            skipped: self.skipped_frames,
            intervals: self.skipped_frames + self.total_frames,
            percentage: self.skip_percentage(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_time() {
        assert_eq!(frame_time_ns(30, 1), 33_333_333);
        assert_eq!(frame_time_ns(60, 1), 16_666_666);
        assert_eq!(frame_time_ns(30000, 1001), 33_366_666);
        assert_eq!(frame_time_ns(0, 1), 0);
    }

    #[test]
    fn test_skip_percentage() {
        assert_eq!(skip_percentage(0, 0), 0.0);
        assert_eq!(skip_percentage(0, 10), 0.0);
        assert_eq!(skip_percentage(1, 3), 25.0);
        assert_eq!(skip_percentage(5, 95), 5.0);
        assert_eq!(skip_percentage(4, 0), 100.0);
    }

    #[test]
    fn test_skip_report() {
        let mut stats = VideoOutputStats {
            total_frames: 3,
            skipped_frames: 0,
            available_frames: 4,
            cache_size: 4,
            consumers: 0,
        };
        assert_eq!(stats.skip_report(), None);

        stats.skipped_frames = 1;
        assert_eq!(
            stats.skip_report(),
            Some(SkipReport {
                skipped: 1,
                intervals: 4,
                percentage: 25.0,
            })
        );
    }
}
