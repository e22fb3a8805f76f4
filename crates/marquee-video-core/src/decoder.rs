//! FFmpeg-based decoder backend.
//!
//! Decoding goes through FFmpeg (ffmpeg-next) when the `ffmpeg` cargo
//! feature is enabled. Frames are converted to tightly packed RGBA on the
//! decode thread so the presentation layer never touches pixel formats.
//!
//! Without the feature a placeholder implementation generates moving
//! test-pattern frames. This keeps builds and unit tests independent of
//! system FFmpeg libraries, and gives the widget something to render
//! during UI development.
//!
//! # System requirements (with the `ffmpeg` feature)
//!
//! - **macOS**: `brew install ffmpeg`
//! - **Linux**: `apt install libavcodec-dev libavformat-dev libavutil-dev libswscale-dev`

#[cfg(feature = "ffmpeg")]
mod real_impl {
    use std::time::Duration;

    use ffmpeg_next as ffmpeg;
    use ffmpeg_next::ffi;

    use crate::video::{
        CpuFrame, VideoDecoderBackend, VideoError, VideoFrame, VideoMetadata, VideoTransform,
    };

    /// FFmpeg-based video decoder.
    pub struct FfmpegDecoder {
        /// Input format context
        input: ffmpeg::format::context::Input,
        /// Video stream index
        video_stream_index: usize,
        /// Video decoder
        decoder: ffmpeg::decoder::Video,
        /// Video scaler for RGBA conversion
        scaler: Option<ffmpeg::software::scaling::Context>,
        /// Video metadata
        metadata: VideoMetadata,
        /// Stream time base (numerator, denominator)
        time_base: (i32, i32),
        /// Whether EOF has been reached
        eof_reached: bool,
        /// Packet iterator state
        packet_iter_finished: bool,
    }

    impl FfmpegDecoder {
        /// Creates a new FFmpeg decoder for the given URL or file path.
        pub fn new(url: &str) -> Result<Self, VideoError> {
            // ffmpeg::init() is safe to call multiple times
            ffmpeg::init()
                .map_err(|e| VideoError::DecoderInit(format!("FFmpeg init failed: {e}")))?;

            let input = ffmpeg::format::input(&url)
                .map_err(|e| VideoError::OpenFailed(format!("Failed to open {url}: {e}")))?;

            // A source without a video stream opens fine but is not playable
            let video_stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| VideoError::NotPlayable(url.to_string()))?;

            let video_stream_index = video_stream.index();
            let time_base = video_stream.time_base();

            let codec_params = video_stream.parameters();
            let context = ffmpeg::codec::context::Context::from_parameters(codec_params)
                .map_err(|e| {
                    VideoError::DecoderInit(format!("Failed to create codec context: {e}"))
                })?;

            let decoder = context
                .decoder()
                .video()
                .map_err(|e| VideoError::DecoderInit(format!("Failed to open decoder: {e}")))?;

            let duration = if input.duration() > 0 {
                Some(Duration::from_micros(
                    (input.duration() as f64 * 1_000_000.0 / ffi::AV_TIME_BASE as f64) as u64,
                ))
            } else {
                None
            };

            let frame_rate = video_stream.avg_frame_rate().0 as f64
                / video_stream.avg_frame_rate().1.max(1) as f64;

            // Stream start time, converted from stream time_base units
            let start_time = {
                let st = video_stream.start_time();
                if st >= 0 && time_base.1 > 0 {
                    let us = st as i128 * time_base.0 as i128 * 1_000_000 / time_base.1 as i128;
                    Some(Duration::from_micros(us.max(0) as u64))
                } else {
                    None
                }
            };

            // Preferred display transform from the container's rotate tag
            let transform = video_stream
                .metadata()
                .get("rotate")
                .and_then(|r| r.parse::<i32>().ok())
                .map(VideoTransform::from_degrees)
                .unwrap_or_default();

            let metadata = VideoMetadata {
                width: decoder.width(),
                height: decoder.height(),
                duration,
                frame_rate: if frame_rate.is_finite() && frame_rate > 0.0 {
                    frame_rate as f32
                } else {
                    30.0
                },
                codec: decoder
                    .codec()
                    .map(|c| c.name().to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                pixel_aspect_ratio: {
                    let sar = decoder.aspect_ratio();
                    if sar.0 > 0 && sar.1 > 0 {
                        sar.0 as f32 / sar.1 as f32
                    } else {
                        1.0
                    }
                },
                start_time,
                transform,
            };

            tracing::info!(
                "Video: {}x{}, duration: {:?}, fps: {:.2}, codec: {}, transform: {:?}",
                metadata.width,
                metadata.height,
                metadata.duration,
                metadata.frame_rate,
                metadata.codec,
                metadata.transform
            );

            Ok(Self {
                input,
                video_stream_index,
                decoder,
                scaler: None,
                metadata,
                time_base: (time_base.0, time_base.1),
                eof_reached: false,
                packet_iter_finished: false,
            })
        }

        fn pts_to_duration(&self, pts: i64) -> Duration {
            if pts < 0 || self.time_base.1 == 0 {
                return Duration::ZERO;
            }
            let seconds = (pts as f64) * (self.time_base.0 as f64) / (self.time_base.1 as f64);
            Duration::from_secs_f64(seconds.max(0.0))
        }

        fn ensure_scaler(
            &mut self,
            width: u32,
            height: u32,
            src_format: ffmpeg::format::Pixel,
        ) -> Result<(), VideoError> {
            let dst_format = ffmpeg::format::Pixel::RGBA;

            // Recreate the scaler if format OR dimensions changed
            let needs_recreate = self.scaler.as_ref().is_none_or(|s| {
                let input = s.input();
                input.format != src_format || input.width != width || input.height != height
            });

            if needs_recreate {
                let scaler = ffmpeg::software::scaling::Context::get(
                    src_format,
                    width,
                    height,
                    dst_format,
                    width,
                    height,
                    ffmpeg::software::scaling::Flags::BILINEAR,
                )
                .map_err(|e| VideoError::DecodeFailed(format!("Failed to create scaler: {e}")))?;

                self.scaler = Some(scaler);
            }

            Ok(())
        }

        fn frame_to_cpu_frame(
            &mut self,
            frame: &ffmpeg::frame::Video,
        ) -> Result<CpuFrame, VideoError> {
            let src_format = frame.format();
            let width = frame.width();
            let height = frame.height();

            self.ensure_scaler(width, height, src_format)?;

            let Some(scaler) = self.scaler.as_mut() else {
                return Err(VideoError::DecodeFailed(
                    "Scaler not initialized".to_string(),
                ));
            };

            let mut rgba_frame = ffmpeg::frame::Video::empty();
            scaler
                .run(frame, &mut rgba_frame)
                .map_err(|e| VideoError::DecodeFailed(format!("Scaling failed: {e}")))?;

            // Copy row by row; the stride may include padding
            let out_width = rgba_frame.width();
            let out_height = rgba_frame.height();
            let stride = rgba_frame.stride(0);
            let data = rgba_frame.data(0);

            let mut pixels = Vec::with_capacity((out_width * out_height * 4) as usize);
            for y in 0..out_height as usize {
                let row_start = y * stride;
                let row_end = row_start + (out_width as usize * 4);
                pixels.extend_from_slice(&data[row_start..row_end]);
            }

            Ok(CpuFrame::new(out_width, out_height, pixels))
        }
    }

    // SAFETY: FfmpegDecoder is only accessed from a single thread (the
    // decode thread). The raw FFmpeg contexts are not thread-safe, but the
    // pump architecture guarantees exclusive single-threaded access.
    unsafe impl Send for FfmpegDecoder {}

    impl VideoDecoderBackend for FfmpegDecoder {
        fn open(url: &str) -> Result<Self, VideoError>
        where
            Self: Sized,
        {
            Self::new(url)
        }

        fn decode_next(&mut self) -> Result<Option<VideoFrame>, VideoError> {
            if self.eof_reached {
                return Ok(None);
            }

            let mut decoded_frame = ffmpeg::frame::Video::empty();

            loop {
                match self.decoder.receive_frame(&mut decoded_frame) {
                    Ok(()) => {
                        let pts = decoded_frame.pts().unwrap_or(0);
                        let duration = self.pts_to_duration(pts);
                        let cpu_frame = self.frame_to_cpu_frame(&decoded_frame)?;
                        return Ok(Some(VideoFrame::new(duration, cpu_frame)));
                    }
                    Err(ffmpeg::Error::Eof) => {
                        self.eof_reached = true;
                        return Ok(None);
                    }
                    Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                        // Decoder wants more input
                        if self.packet_iter_finished {
                            self.decoder.send_eof().ok();
                            self.packet_iter_finished = false;
                            continue;
                        }

                        let mut found_packet = false;
                        for (stream, packet) in self.input.packets() {
                            if stream.index() != self.video_stream_index {
                                continue;
                            }
                            self.decoder.send_packet(&packet).map_err(|e| {
                                VideoError::DecodeFailed(format!("Send packet failed: {e}"))
                            })?;
                            found_packet = true;
                            break;
                        }

                        if !found_packet {
                            self.packet_iter_finished = true;
                        }
                    }
                    Err(e) => return Err(VideoError::DecodeFailed(format!("Decode error: {e}"))),
                }
            }
        }

        fn seek(&mut self, position: Duration) -> Result<(), VideoError> {
            // input.seek() expects timestamps in AV_TIME_BASE (microseconds)
            let timestamp = position.as_micros() as i64;

            // RangeFull lets FFmpeg land on the nearest keyframe
            self.input
                .seek(timestamp, ..)
                .map_err(|e| VideoError::SeekFailed(format!("Seek failed: {e}")))?;

            self.decoder.flush();
            self.eof_reached = false;
            self.packet_iter_finished = false;

            Ok(())
        }

        fn metadata(&self) -> &VideoMetadata {
            &self.metadata
        }

        fn is_eof(&self) -> bool {
            self.eof_reached
        }
    }
}

#[cfg(not(feature = "ffmpeg"))]
mod placeholder_impl {
    use std::time::Duration;

    use crate::video::{
        CpuFrame, VideoDecoderBackend, VideoError, VideoFrame, VideoMetadata, VideoTransform,
    };

    const WIDTH: u32 = 640;
    const HEIGHT: u32 = 360;
    const FRAME_RATE: f32 = 30.0;
    const DURATION: Duration = Duration::from_secs(12);

    /// Placeholder decoder used when the `ffmpeg` feature is disabled.
    ///
    /// Generates a moving gradient so the widget pipeline can be exercised
    /// without system FFmpeg.
    pub struct FfmpegDecoder {
        metadata: VideoMetadata,
        current_pts: Duration,
        eof_reached: bool,
    }

    impl FfmpegDecoder {
        pub fn new(url: &str) -> Result<Self, VideoError> {
            tracing::warn!(
                "FfmpegDecoder: using placeholder frames for {}. \
                 Enable the 'ffmpeg' feature for real decoding.",
                url
            );

            let metadata = VideoMetadata {
                width: WIDTH,
                height: HEIGHT,
                duration: Some(DURATION),
                frame_rate: FRAME_RATE,
                codec: "placeholder".to_string(),
                pixel_aspect_ratio: 1.0,
                start_time: None,
                transform: VideoTransform::Identity,
            };

            Ok(Self {
                metadata,
                current_pts: Duration::ZERO,
                eof_reached: false,
            })
        }

        fn generate_test_frame(&self) -> CpuFrame {
            let mut pixels = Vec::with_capacity((WIDTH * HEIGHT * 4) as usize);
            let frame_num = (self.current_pts.as_secs_f32() * FRAME_RATE) as u8;

            for y in 0..HEIGHT {
                for x in 0..WIDTH {
                    let r = ((x as f32 / WIDTH as f32) * 255.0) as u8;
                    let g = ((y as f32 / HEIGHT as f32) * 255.0) as u8;
                    let b = frame_num.wrapping_mul(3);
                    pixels.extend_from_slice(&[r, g, b, 255]);
                }
            }

            CpuFrame::new(WIDTH, HEIGHT, pixels)
        }
    }

    impl VideoDecoderBackend for FfmpegDecoder {
        fn open(url: &str) -> Result<Self, VideoError>
        where
            Self: Sized,
        {
            Self::new(url)
        }

        fn decode_next(&mut self) -> Result<Option<VideoFrame>, VideoError> {
            if self.eof_reached {
                return Ok(None);
            }

            if self.current_pts >= DURATION {
                self.eof_reached = true;
                return Ok(None);
            }

            let frame = VideoFrame::new(self.current_pts, self.generate_test_frame());
            self.current_pts += self.metadata.frame_duration();
            Ok(Some(frame))
        }

        fn seek(&mut self, position: Duration) -> Result<(), VideoError> {
            self.current_pts = position.min(DURATION);
            self.eof_reached = false;
            Ok(())
        }

        fn metadata(&self) -> &VideoMetadata {
            &self.metadata
        }

        fn is_eof(&self) -> bool {
            self.eof_reached
        }
    }
}

#[cfg(feature = "ffmpeg")]
pub use real_impl::FfmpegDecoder;

#[cfg(not(feature = "ffmpeg"))]
pub use placeholder_impl::FfmpegDecoder;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::VideoDecoderBackend;

    #[cfg(feature = "ffmpeg")]
    #[test]
    fn test_open_nonexistent_fails() {
        let result = FfmpegDecoder::new("/nonexistent/video.mp4");
        assert!(result.is_err());
    }

    #[cfg(not(feature = "ffmpeg"))]
    mod placeholder {
        use super::*;
        use std::time::Duration;

        #[test]
        fn test_placeholder_metadata() {
            let decoder = FfmpegDecoder::new("test.mp4").unwrap();
            let meta = decoder.metadata();
            assert_eq!(meta.width, 640);
            assert_eq!(meta.height, 360);
            assert!(meta.duration.is_some());
        }

        #[test]
        fn test_placeholder_frames_advance() {
            let mut decoder = FfmpegDecoder::new("test.mp4").unwrap();
            let first = decoder.decode_next().unwrap().unwrap();
            let second = decoder.decode_next().unwrap().unwrap();
            assert_eq!(first.pts, Duration::ZERO);
            assert!(second.pts > first.pts);
            assert_eq!(first.dimensions(), (640, 360));
        }

        #[test]
        fn test_placeholder_eof_and_seek() {
            let mut decoder = FfmpegDecoder::new("test.mp4").unwrap();
            decoder.seek(Duration::from_secs(60)).unwrap();
            // Seek clamps to duration; the next decode hits EOF
            assert!(decoder.decode_next().unwrap().is_none());
            assert!(decoder.is_eof());

            // Seeking back to the start resumes decoding (loop reset)
            decoder.seek(Duration::ZERO).unwrap();
            assert!(!decoder.is_eof());
            assert!(decoder.decode_next().unwrap().is_some());
        }
    }
}
