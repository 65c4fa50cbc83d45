//! rodio-backed sample store with a dedicated playback thread.
//!
//! Samples are decoded up front into memory. Playback commands go over a
//! channel to the audio thread, which owns the output stream (rodio's
//! stream handle cannot leave the thread that opened it).

use super::audio::{SampleError, SampleStore, resolve_sample_path};
use crate::models::chart::{Chart, Sample, SampleId, SampleSource};
use crate::system::bus::AudioCommand;
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use rodio::buffer::SamplesBuffer;
use rodio::source::ChannelVolume;
use rodio::{Decoder, OutputStream, Sink, Source};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type SampleMap = Arc<Mutex<HashMap<SampleId, SamplesBuffer<i16>>>>;

/// Decodes one file. A rate other than 1.0 is baked into the buffer's
/// sample rate, which changes pitch along with speed.
fn decode(path: &Path, rate: f64) -> Result<SamplesBuffer<i16>, SampleError> {
    let decode_error = |reason: String| SampleError::Decode {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::open(path).map_err(|e| decode_error(e.to_string()))?;
    let decoder = Decoder::new(BufReader::new(file)).map_err(|e| decode_error(e.to_string()))?;
    let channels = decoder.channels();
    let sample_rate = ((decoder.sample_rate() as f64 * rate).round() as u32).max(1);
    let data: Vec<i16> = decoder.collect();
    Ok(SamplesBuffer::new(channels, sample_rate, data))
}

fn load_one(directory: &Path, sample: &Sample, rate: f64) -> Option<SamplesBuffer<i16>> {
    let name = match &sample.source {
        SampleSource::File(name) => name,
        SampleSource::Container { file, entry } => {
            log::warn!(
                "AUDIO: {}",
                SampleError::ResourceMissing(format!("{}#{}", file, entry))
            );
            return None;
        }
    };
    let result = resolve_sample_path(directory, name).and_then(|path| decode(&path, rate));
    match result {
        Ok(buffer) => Some(buffer),
        Err(e) => {
            log::warn!("AUDIO: {}", e);
            None
        }
    }
}

/// Splits stereo gain for `pan` in `[-1, 1]`.
fn pan_gains(pan: f32) -> Vec<f32> {
    let pan = pan.clamp(-1.0, 1.0);
    vec![(1.0 - pan).min(1.0), (1.0 + pan).min(1.0)]
}

struct AudioWorker {
    samples: SampleMap,
    playing: HashMap<SampleId, Vec<Sink>>,
}

impl AudioWorker {
    fn handle_command(&mut self, handle: &rodio::OutputStreamHandle, cmd: AudioCommand) -> bool {
        self.playing.retain(|_, sinks| {
            sinks.retain(|s| !s.empty());
            !sinks.is_empty()
        });

        match cmd {
            AudioCommand::Play { id, volume, pan } => {
                let Some(buffer) = self.samples.lock().get(&id).cloned() else {
                    return true;
                };
                let Ok(sink) = Sink::try_new(handle) else {
                    log::error!("AUDIO: Failed to create sink");
                    return true;
                };
                sink.set_volume(volume);
                sink.append(ChannelVolume::new(buffer, pan_gains(pan)));
                self.playing.entry(id).or_default().push(sink);
            }
            AudioCommand::Stop { id } => {
                if let Some(sinks) = self.playing.remove(&id) {
                    for sink in sinks {
                        sink.stop();
                    }
                }
            }
            AudioCommand::StopAll => {
                for (_, sinks) in self.playing.drain() {
                    for sink in sinks {
                        sink.stop();
                    }
                }
            }
            AudioCommand::Shutdown => return false,
        }
        true
    }
}

fn run_audio_thread(samples: SampleMap, rx: Receiver<AudioCommand>) {
    log::info!("AUDIO: Thread started");
    let stream = match OutputStream::try_default() {
        Ok(stream) => Some(stream),
        Err(e) => {
            log::warn!("AUDIO: No audio device found ({}), running in silent mode", e);
            None
        }
    };

    let mut worker = AudioWorker {
        samples,
        playing: HashMap::new(),
    };
    while let Ok(cmd) = rx.recv() {
        let keep_going = match &stream {
            Some((_stream, handle)) => worker.handle_command(handle, cmd),
            None => !matches!(cmd, AudioCommand::Shutdown),
        };
        if !keep_going {
            break;
        }
    }
    log::info!("AUDIO: Thread stopped");
}

/// Sample store playing through the default output device.
pub struct RodioSampleStore {
    rate: f64,
    samples: SampleMap,
    loaded_hash: Option<String>,
    cmd_tx: Sender<AudioCommand>,
    thread: Option<JoinHandle<()>>,
}

impl RodioSampleStore {
    /// Spawns the audio thread. Samples are resampled for `rate`.
    pub fn new(rate: f64) -> std::io::Result<Self> {
        let samples: SampleMap = Arc::new(Mutex::new(HashMap::new()));
        let (cmd_tx, cmd_rx) = unbounded();
        let thread_samples = samples.clone();
        let thread = thread::Builder::new()
            .name("Audio Thread".to_string())
            .spawn(move || run_audio_thread(thread_samples, cmd_rx))?;
        Ok(Self {
            rate,
            samples,
            loaded_hash: None,
            cmd_tx,
            thread: Some(thread),
        })
    }

    pub fn loaded_count(&self) -> usize {
        self.samples.lock().len()
    }
}

impl SampleStore for RodioSampleStore {
    fn load(&mut self, chart: &Chart, pitch_preserve: bool) {
        if self.loaded_hash.as_deref() == Some(chart.hash.as_str()) {
            log::info!("AUDIO: Samples for {} already loaded", chart.hash);
            return;
        }
        self.samples.lock().clear();

        let rate = self.rate;
        if rate != 1.0 && pitch_preserve {
            log::info!("AUDIO: Pitch-preserving resample unavailable, changing speed instead");
        }

        if rate == 1.0 {
            let mut map = self.samples.lock();
            for sample in &chart.samples {
                if let Some(buffer) = load_one(&chart.directory, sample, rate) {
                    map.insert(sample.id, buffer);
                }
            }
        } else {
            let workers = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
            let chunk = chart.samples.len().div_ceil(workers).max(1);
            let samples = &self.samples;
            thread::scope(|scope| {
                for part in chart.samples.chunks(chunk) {
                    scope.spawn(move || {
                        for sample in part {
                            if let Some(buffer) = load_one(&chart.directory, sample, rate) {
                                samples.lock().insert(sample.id, buffer);
                            }
                        }
                    });
                }
            });
        }

        log::info!(
            "AUDIO: Loaded {}/{} samples",
            self.loaded_count(),
            chart.samples.len()
        );
        self.loaded_hash = Some(chart.hash.clone());
    }

    fn play(&mut self, id: SampleId, volume: f32, pan: f32) {
        let _ = self.cmd_tx.send(AudioCommand::Play { id, volume, pan });
    }

    fn stop(&mut self, id: SampleId) {
        let _ = self.cmd_tx.send(AudioCommand::Stop { id });
    }

    fn stop_all(&mut self) {
        let _ = self.cmd_tx.send(AudioCommand::StopAll);
    }
}

impl Drop for RodioSampleStore {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(AudioCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pan_gains() {
        assert_eq!(pan_gains(0.0), vec![1.0, 1.0]);
        assert_eq!(pan_gains(1.0), vec![0.0, 1.0]);
        assert_eq!(pan_gains(-0.5), vec![1.0, 0.5]);
    }
}
