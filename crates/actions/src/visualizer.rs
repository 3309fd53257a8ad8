//! AudioVisualizer: a live spectrum analyzer across the grid.
//!
//! Audio is captured from an input device, split into eight frequency bands
//! (one per column) and each column is lit from the bottom row up in
//! proportion to the loudest bin in its band.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream};
use launchgrid_core::{
    parse_args, unknown_action, ActionContext, ActionError, ActionGroup, ActionSlot,
    GridPosition, Handler, LedColor, GRID_SIZE,
};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::Deserialize;

const CHUNK_SIZE: usize = 1024;
const REFRESH_INTERVAL: Duration = Duration::from_millis(50);

/// Band edges in Hz, lower bound inclusive.
const FREQUENCY_RANGES: [(f32, f32); GRID_SIZE] = [
    (20.0, 78.0),
    (78.0, 312.0),
    (312.0, 625.0),
    (625.0, 1250.0),
    (1250.0, 2500.0),
    (2500.0, 5000.0),
    (5000.0, 10000.0),
    (10000.0, 20000.0),
];

/// Peak magnitude that fills a column, in 16-bit sample units.
const AMPLITUDE_REFERENCE: [f32; GRID_SIZE] = [
    1_750_000.0,
    750_000.0,
    400_000.0,
    320_000.0,
    200_000.0,
    80_000.0,
    30_000.0,
    5_000.0,
];

const COLOR_SCHEME: [u8; GRID_SIZE] = [10, 20, 30, 40, 50, 60, 70, 80];

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VisualizerArgs {
    /// Input device name (substring match); the host default when unset
    #[serde(default)]
    pub device: Option<String>,
    /// Column colors, left to right
    #[serde(default)]
    pub colors: Option<[LedColor; GRID_SIZE]>,
    /// Per-column magnitude that lights the whole column
    #[serde(default)]
    pub reference: Option<[f32; GRID_SIZE]>,
}

pub struct AudioVisualizer;

impl ActionGroup for AudioVisualizer {
    fn name(&self) -> &'static str {
        "AudioVisualizer"
    }

    fn build(
        &self,
        args: &serde_json::Value,
        slots: &[ActionSlot],
        context: &ActionContext,
    ) -> Result<Vec<Handler>, ActionError> {
        let args: VisualizerArgs = parse_args(self.name(), args)?;
        let reference = args.reference.unwrap_or(AMPLITUDE_REFERENCE);
        if reference.iter().any(|r| !(r.is_finite() && *r > 0.0)) {
            return Err(ActionError::InvalidArgs {
                group: self.name().to_string(),
                message: "reference amplitudes must be positive".to_string(),
            });
        }
        let colors = args.colors.unwrap_or_else(default_colors);

        slots
            .iter()
            .map(|slot| match slot.name.as_str() {
                "run" => {
                    if !slot.exclusive {
                        log::warn!(
                            "AudioVisualizer at {} draws over the whole grid; bind it as exclusive",
                            slot.position
                        );
                    }
                    let context = context.clone();
                    let device = args.device.clone();
                    Ok(Arc::new(move || {
                        if let Err(e) = run(&context, device.as_deref(), colors, reference) {
                            log::error!("Audio visualizer stopped: {}", e);
                        }
                    }) as Handler)
                }
                _ => Err(unknown_action(self.name(), slot)),
            })
            .collect()
    }
}

fn default_colors() -> [LedColor; GRID_SIZE] {
    COLOR_SCHEME.map(|c| LedColor::new(c).unwrap_or(LedColor::OFF))
}

fn run(
    context: &ActionContext,
    device_name: Option<&str>,
    colors: [LedColor; GRID_SIZE],
    reference: [f32; GRID_SIZE],
) -> Result<(), anyhow::Error> {
    let device = find_device(device_name)?;
    let (stream, sample_rate, samples) = open_capture(&device)?;
    stream.play()?;
    log::info!("Audio visualizer capturing at {} Hz", sample_rate);

    let analyzer = SpectrumAnalyzer::new(sample_rate);
    let stop = context.stop_signal();
    let mut buffer: Vec<f32> = Vec::with_capacity(CHUNK_SIZE * 2);
    let mut last_frame: Option<Instant> = None;

    while !stop.is_set() {
        match samples.recv_timeout(REFRESH_INTERVAL) {
            Ok(chunk) => buffer.extend(chunk),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("audio stream closed"));
            }
        }
        let too_soon = last_frame.is_some_and(|t| t.elapsed() < REFRESH_INTERVAL);
        if buffer.len() < CHUNK_SIZE || too_soon {
            // Keep only the newest chunk while waiting for the next frame
            if buffer.len() > CHUNK_SIZE {
                buffer.drain(..buffer.len() - CHUNK_SIZE);
            }
            continue;
        }

        let window = &buffer[buffer.len() - CHUNK_SIZE..];
        let heights = column_heights(&analyzer.band_peaks(window), &reference);
        draw(context, &heights, &colors);
        buffer.clear();
        last_frame = Some(Instant::now());
    }

    drop(stream);
    Ok(())
}

/// Find the capture device by name, falling back to the host default.
fn find_device(name: Option<&str>) -> Result<Device, anyhow::Error> {
    let host = cpal::default_host();

    if let Some(wanted) = name {
        for device in host.input_devices()? {
            if let Ok(name) = device.name() {
                if name.contains(wanted) {
                    log::info!("Found audio device: {}", name);
                    return Ok(device);
                }
            }
        }
        log::warn!("Audio device '{}' not found, using default", wanted);
    }

    host.default_input_device()
        .ok_or_else(|| anyhow!("No default input device available"))
}

/// Start a mono capture stream, delivering chunks scaled to 16-bit units.
fn open_capture(device: &Device) -> Result<(Stream, u32, Receiver<Vec<f32>>), anyhow::Error> {
    let supported = device.default_input_config()?;
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let channels = usize::from(config.channels).max(1);
    let sample_rate = config.sample_rate;
    let (tx, rx) = mpsc::sync_channel::<Vec<f32>>(16);

    let on_error = |err: cpal::StreamError| log::error!("Audio stream error: {}", err);
    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.try_send(downmix(data, channels, |s| s * 32768.0));
            },
            on_error,
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let _ = tx.try_send(downmix(data, channels, f32::from));
            },
            on_error,
            None,
        )?,
        other => return Err(anyhow!("Unsupported sample format {:?}", other)),
    };

    Ok((stream, sample_rate, rx))
}

fn downmix<T: Copy>(data: &[T], channels: usize, scale: impl Fn(T) -> f32) -> Vec<f32> {
    data.chunks(channels)
        .map(|frame| frame.iter().map(|s| scale(*s)).sum::<f32>() / frame.len() as f32)
        .collect()
}

fn draw(context: &ActionContext, heights: &[usize; GRID_SIZE], colors: &[LedColor; GRID_SIZE]) {
    let device = context.device();
    for pos in GridPosition::all() {
        let col = usize::from(pos.col());
        let color = if usize::from(pos.row()) < heights[col] {
            colors[col]
        } else {
            LedColor::OFF
        };
        device.set_color(pos, color);
    }
}

/// Rows lit per column: row `r` is lit when the band's level exceeds `r / 8`.
pub fn column_heights(
    peaks: &[f32; GRID_SIZE],
    reference: &[f32; GRID_SIZE],
) -> [usize; GRID_SIZE] {
    std::array::from_fn(|col| {
        let intensity = peaks[col] / reference[col];
        (0..GRID_SIZE)
            .filter(|row| intensity > *row as f32 / GRID_SIZE as f32)
            .count()
    })
}

/// Forward FFT over fixed-size chunks, reduced to per-band peaks.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    bands: [Vec<usize>; GRID_SIZE],
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: u32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(CHUNK_SIZE);
        let bin_width = sample_rate as f32 / CHUNK_SIZE as f32;
        let bands = FREQUENCY_RANGES.map(|(low, high)| {
            (0..CHUNK_SIZE / 2)
                .filter(|bin| {
                    let freq = *bin as f32 * bin_width;
                    freq >= low && freq < high
                })
                .collect()
        });
        Self { fft, bands }
    }

    /// Loudest bin magnitude in each band; 0 for bands with no bins.
    pub fn band_peaks(&self, samples: &[f32]) -> [f32; GRID_SIZE] {
        let mut buffer: Vec<Complex<f32>> = (0..CHUNK_SIZE)
            .map(|i| Complex::new(samples.get(i).copied().unwrap_or(0.0), 0.0))
            .collect();
        self.fft.process(&mut buffer);

        std::array::from_fn(|col| {
            self.bands[col]
                .iter()
                .map(|&bin| buffer[bin].norm())
                .fold(0.0, f32::max)
        })
    }
}
