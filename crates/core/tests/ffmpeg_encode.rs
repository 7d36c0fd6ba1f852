//! End-to-end tests against a real ffmpeg.
//!
//! Each test returns early when ffmpeg/ffprobe are not installed, unless
//! `REELPRESS_REQUIRE_FFMPEG` is set, in which case a missing engine fails.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use reelpress_core::{
    EncodeError, EncodeRequest, Encoder, EventBus, FailureClass, FfmpegEncoder, JobQueue,
    JobStatus, JobStore, RetryConfig, SqliteJobQueue, WorkerConfig, WorkerPool,
};

const REQUIRE_FFMPEG_ENV: &str = "REELPRESS_REQUIRE_FFMPEG";

fn ffmpeg_available() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|bin| {
        Command::new(bin)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    })
}

fn require_ffmpeg_set() -> bool {
    std::env::var(REQUIRE_FFMPEG_ENV).is_ok_and(|v| !v.is_empty() && v != "0")
}

/// Whether the test should run. Panics when the engine is required but missing.
fn engine_ready(test: &str) -> bool {
    if ffmpeg_available() {
        return true;
    }
    assert!(
        !require_ffmpeg_set(),
        "{} is set but ffmpeg/ffprobe are not on PATH",
        REQUIRE_FFMPEG_ENV
    );
    eprintln!("SKIPPED {}: ffmpeg not installed", test);
    false
}

/// Two seconds of test pattern with a stereo tone, in a non-web container.
fn make_source(path: &Path) {
    let status = Command::new("ffmpeg")
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            "testsrc=duration=2:size=320x240:rate=25",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=440:duration=2",
            "-ac",
            "2",
            "-c:v",
            "mpeg4",
            "-c:a",
            "pcm_s16le",
            "-shortest",
        ])
        .arg(path)
        .status()
        .expect("failed to run ffmpeg");
    assert!(status.success(), "failed to generate test source");
}

fn request(id: &str, input: &Path, output: &Path) -> EncodeRequest {
    EncodeRequest {
        job_id: id.to_string(),
        input_location: input.display().to_string(),
        output_location: output.display().to_string(),
        attempt: 1,
    }
}

#[tokio::test]
async fn test_encode_produces_fast_start_web_mp4() {
    if !engine_ready("test_encode_produces_fast_start_web_mp4") {
        return;
    }

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("source.mov");
    let output = dir.path().join("nested").join("v1.mp4");
    make_source(&input);

    let encoder = FfmpegEncoder::with_defaults();
    encoder.validate().await.unwrap();

    let mut handle = encoder
        .start(request("v1", &input, &output))
        .await
        .unwrap();

    let mut last_percent = 0;
    while let Some(progress) = handle.next_progress().await {
        assert!(progress.percent >= last_percent, "progress went backwards");
        assert!(progress.percent <= 100);
        last_percent = progress.percent;
    }
    let result = handle.wait().await.unwrap();
    assert_eq!(result.output_path, output);
    assert!(result.output_size_bytes > 0);

    let info = encoder.probe(&output.display().to_string()).await.unwrap();
    assert_eq!(info.video_codec.as_deref(), Some("h264"));
    assert!(info
        .video_profile
        .as_deref()
        .is_some_and(|p| p.contains("Baseline")));
    assert_eq!(info.pixel_format.as_deref(), Some("yuv420p"));
    assert_eq!(info.audio_codec.as_deref(), Some("aac"));
    assert_eq!(info.audio_channels, Some(2));

    // Fast start: the moov atom precedes the media data
    let bytes = std::fs::read(&output).unwrap();
    let moov = bytes.windows(4).position(|w| w == b"moov").expect("moov atom");
    let mdat = bytes.windows(4).position(|w| w == b"mdat").expect("mdat atom");
    assert!(moov < mdat, "moov at {} after mdat at {}", moov, mdat);

    // Only the finished output remains next to it
    let leftovers: Vec<_> = std::fs::read_dir(output.parent().unwrap())
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(leftovers.len(), 1);
}

#[tokio::test]
async fn test_missing_input_is_input_failure() {
    if !engine_ready("test_missing_input_is_input_failure") {
        return;
    }

    let dir = TempDir::new().unwrap();
    let encoder = FfmpegEncoder::with_defaults();

    let err = encoder
        .start(request(
            "missing",
            &dir.path().join("nope.mov"),
            &dir.path().join("out.mp4"),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.class(), FailureClass::Input);
    assert!(!dir.path().join("out.mp4").exists());
}

#[tokio::test]
async fn test_corrupt_input_is_input_failure() {
    if !engine_ready("test_corrupt_input_is_input_failure") {
        return;
    }

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("garbage.mov");
    std::fs::write(&input, b"this is not a video").unwrap();

    let encoder = FfmpegEncoder::with_defaults();
    let err = encoder
        .start(request("corrupt", &input, &dir.path().join("out.mp4")))
        .await
        .unwrap_err();
    assert!(matches!(err, EncodeError::InputUnreadable { .. }));
    assert_eq!(err.class(), FailureClass::Input);
}

#[tokio::test]
async fn test_killed_encode_leaves_no_partial() {
    if !engine_ready("test_killed_encode_leaves_no_partial") {
        return;
    }

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("source.mov");
    let output = dir.path().join("out").join("killed.mp4");
    make_source(&input);

    let encoder = FfmpegEncoder::with_defaults();
    let mut handle = encoder
        .start(request("killed", &input, &output))
        .await
        .unwrap();
    handle.kill();

    let result = handle.wait().await;
    // A very fast machine may finish before the kill lands
    if let Err(err) = result {
        assert_eq!(err.class(), FailureClass::TransientEngine);
        let leftovers = std::fs::read_dir(output.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}

#[tokio::test]
async fn test_pool_encodes_with_real_ffmpeg() {
    if !engine_ready("test_pool_encodes_with_real_ffmpeg") {
        return;
    }

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("source.mov");
    make_source(&input);
    let output = dir.path().join("web.mp4");

    let queue = Arc::new(
        SqliteJobQueue::new(&dir.path().join("queue.db"), Default::default())
            .unwrap()
            .with_retry(RetryConfig::immediate(3)),
    );
    let pool = WorkerPool::new(
        WorkerConfig::default().with_dequeue_wait_ms(100),
        queue.clone(),
        Arc::new(FfmpegEncoder::with_defaults()),
    )
    .with_events(EventBus::default());

    queue
        .enqueue(
            reelpress_core::EnqueueRequest::new(
                input.display().to_string(),
                output.display().to_string(),
            )
            .with_id("web"),
        )
        .await
        .unwrap();
    pool.start(1).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
    let job = loop {
        let job = queue.get("web").unwrap().unwrap();
        if job.is_terminal() || tokio::time::Instant::now() > deadline {
            break job;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };
    pool.shutdown(Duration::from_secs(5)).await;

    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.last_error);
    assert_eq!(job.progress_percent, 100);
    assert!(output.exists());
}
