//! The fixed web-compatible output profile.

use serde::Serialize;

/// Output encoding settings shared by every job.
///
/// H.264 Baseline with AAC stereo in a fast-start MP4 plays back on
/// practically every browser and mobile device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputProfile {
    pub video_codec: &'static str,
    pub video_profile: &'static str,
    pub level: &'static str,
    pub crf: u8,
    pub max_video_bitrate_kbps: u32,
    pub buffer_size_kbps: u32,
    pub pixel_format: &'static str,
    pub audio_codec: &'static str,
    pub audio_channels: u8,
    pub audio_bitrate_kbps: u32,
    pub container: &'static str,
}

impl OutputProfile {
    pub fn web_baseline() -> Self {
        Self {
            video_codec: "libx264",
            video_profile: "baseline",
            level: "3.0",
            crf: 23,
            max_video_bitrate_kbps: 2500,
            buffer_size_kbps: 5000,
            pixel_format: "yuv420p",
            audio_codec: "aac",
            audio_channels: 2,
            audio_bitrate_kbps: 128,
            container: "mp4",
        }
    }

    /// Sets the video bitrate ceiling; the VBV buffer follows at twice the rate.
    pub fn with_max_video_bitrate(mut self, kbps: u32) -> Self {
        self.max_video_bitrate_kbps = kbps;
        self.buffer_size_kbps = kbps.saturating_mul(2);
        self
    }

    /// Encoder arguments placed between the input and the output path.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.video_codec.to_string(),
            "-profile:v".to_string(),
            self.video_profile.to_string(),
            "-level".to_string(),
            self.level.to_string(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-maxrate".to_string(),
            format!("{}k", self.max_video_bitrate_kbps),
            "-bufsize".to_string(),
            format!("{}k", self.buffer_size_kbps),
            "-pix_fmt".to_string(),
            self.pixel_format.to_string(),
            "-c:a".to_string(),
            self.audio_codec.to_string(),
            "-ac".to_string(),
            self.audio_channels.to_string(),
            "-b:a".to_string(),
            format!("{}k", self.audio_bitrate_kbps),
            // moov atom before mdat
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-f".to_string(),
            self.container.to_string(),
        ]
    }
}

impl Default for OutputProfile {
    fn default() -> Self {
        Self::web_baseline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_baseline_args() {
        let args = OutputProfile::web_baseline().to_ffmpeg_args().join(" ");
        assert_eq!(
            args,
            "-c:v libx264 -profile:v baseline -level 3.0 -crf 23 -maxrate 2500k -bufsize 5000k \
             -pix_fmt yuv420p -c:a aac -ac 2 -b:a 128k -movflags +faststart -f mp4"
        );
    }

    #[test]
    fn test_bitrate_ceiling_scales_buffer() {
        let profile = OutputProfile::web_baseline().with_max_video_bitrate(1200);
        let args = profile.to_ffmpeg_args();
        assert!(args.contains(&"1200k".to_string()));
        assert!(args.contains(&"2400k".to_string()));
    }
}
