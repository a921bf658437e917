use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use fieldrec_foundation::AudioError;

use crate::constants::{FRAME_SIZE_SAMPLES, SAMPLE_RATE_HZ, SAMPLE_SHIFT};
use crate::source::BlockSource;

/// Ring between the stream callback and `read_block`, sized for ~0.5 s.
const RING_CAPACITY: usize = FRAME_SIZE_SAMPLES * 8;

/// How long `open` waits for the stream to come up.
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Real microphone input via cpal.
///
/// cpal streams are not `Send`, so the stream lives on a keeper thread
/// spawned at open time; its callback converts whatever format the host
/// negotiated into the peripheral's left-justified 24-in-32 framing and
/// parks the samples in a ring. `read_block` drains the ring at frame
/// granularity, which keeps the source itself free to move between the
/// per-session capture threads.
pub struct CpalSource {
    ring: Consumer<i32>,
    stop: Arc<AtomicBool>,
    keeper: Option<JoinHandle<()>>,
    device_name: String,
}

impl CpalSource {
    /// Opens `preferred_device` (or the default input device) at the fixed
    /// 16 kHz mono rate and starts capturing immediately.
    pub fn open(preferred_device: Option<String>) -> Result<Self, AudioError> {
        let (producer, ring) = RingBuffer::<i32>::new(RING_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let keeper_stop = stop.clone();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let keeper = thread::Builder::new()
            .name("mic-stream".to_string())
            .spawn(move || {
                match build_input_stream(preferred_device.as_deref(), producer) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        // Hold the stream alive until the source is dropped.
                        while !keeper_stop.load(Ordering::SeqCst) {
                            thread::sleep(Duration::from_millis(100));
                        }
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| AudioError::Fatal(format!("Failed to spawn mic-stream thread: {}", e)))?;

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(device_name)) => {
                info!("Microphone stream running on '{}'", device_name);
                Ok(Self {
                    ring,
                    stop,
                    keeper: Some(keeper),
                    device_name,
                })
            }
            Ok(Err(e)) => {
                let _ = keeper.join();
                Err(e)
            }
            Err(_) => {
                stop.store(true, Ordering::SeqCst);
                Err(AudioError::NoDataTimeout {
                    duration: OPEN_TIMEOUT,
                })
            }
        }
    }
}

impl BlockSource for CpalSource {
    fn read_block(&mut self, out: &mut [i32], timeout: Duration) -> Result<usize, AudioError> {
        let deadline = Instant::now() + timeout;
        while self.ring.slots() < out.len() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }

        let wanted = self.ring.slots().min(out.len());
        let mut filled = 0;
        while filled < wanted {
            match self.ring.pop() {
                Ok(sample) => {
                    out[filled] = sample;
                    filled += 1;
                }
                Err(_) => break,
            }
        }
        Ok(filled)
    }

    fn describe(&self) -> String {
        format!("cpal input '{}'", self.device_name)
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(keeper) = self.keeper.take() {
            let _ = keeper.join();
        }
    }
}

fn build_input_stream(
    preferred: Option<&str>,
    mut producer: Producer<i32>,
) -> Result<(cpal::Stream, String), AudioError> {
    let host = cpal::default_host();
    let device = match preferred {
        Some(name) => host
            .input_devices()
            .map_err(|e| AudioError::Fatal(format!("Failed to enumerate input devices: {}", e)))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| AudioError::DeviceNotFound {
                name: Some(name.to_string()),
            })?,
        None => host
            .default_input_device()
            .ok_or(AudioError::DeviceNotFound { name: None })?,
    };
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let sample_format = device.default_input_config()?.sample_format();
    let config = StreamConfig {
        channels: 1,
        sample_rate: SampleRate(SAMPLE_RATE_HZ),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_fn = |err: cpal::StreamError| {
        error!("Audio stream error: {}", err);
    };

    // Everything is normalized to the 24-in-32 framing the writer expects,
    // so a `>> 8` downstream always recovers a 16-bit value.
    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                push_converted(&mut producer, data.iter().map(|&s| (s as i32) << SAMPLE_SHIFT));
            },
            err_fn,
            None,
        )?,
        SampleFormat::I32 => device.build_input_stream(
            &config,
            move |data: &[i32], _: &cpal::InputCallbackInfo| {
                push_converted(&mut producer, data.iter().map(|&s| (s >> 16) << SAMPLE_SHIFT));
            },
            err_fn,
            None,
        )?,
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                push_converted(
                    &mut producer,
                    data.iter().map(|&s| (s as i32 - 32768) << SAMPLE_SHIFT),
                );
            },
            err_fn,
            None,
        )?,
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                push_converted(
                    &mut producer,
                    data.iter().map(|&s| {
                        let clamped = s.clamp(-1.0, 1.0);
                        ((clamped * 32767.0).round() as i32) << SAMPLE_SHIFT
                    }),
                );
            },
            err_fn,
            None,
        )?,
        other => {
            return Err(AudioError::FormatNotSupported {
                format: format!("{:?}", other),
            });
        }
    };

    stream.play()?;
    Ok((stream, name))
}

fn push_converted(producer: &mut Producer<i32>, samples: impl Iterator<Item = i32>) {
    let mut discarded = 0usize;
    for sample in samples {
        if producer.push(sample).is_err() {
            discarded += 1;
        }
    }
    if discarded > 0 {
        warn!("Mic ring full, discarded {} samples", discarded);
    }
}
