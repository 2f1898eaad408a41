//! Integration tests for mezcla-io WAV loading and the waveout backend.

use std::sync::Arc;

use mezcla_core::{
    Backend, ContextAttributes, Engine, EngineSettings, Format, ParamValue, SourceParam,
};
use mezcla_io::{WaveBackend, read_wav, write_wav};
use tempfile::tempdir;

const FRAMES: usize = 64;

type FileWriter = hound::WavWriter<std::io::BufWriter<std::fs::File>>;

fn write_spec(path: &std::path::Path, spec: hound::WavSpec, write: impl FnOnce(&mut FileWriter)) {
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    write(&mut writer);
    writer.finalize().unwrap();
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[test]
fn mono_16_bit_loads_verbatim() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mono.wav");
    let samples: Vec<i16> = (0..100).map(|i| i * 300 - 15000).collect();
    write_wav(&path, &samples, 1, 22050).unwrap();

    let (data, format, frequency) = read_wav(&path).unwrap();
    assert_eq!(format, Format::Mono16);
    assert_eq!(frequency, 22050);
    let loaded: Vec<i16> = data
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    assert_eq!(loaded, samples);
}

#[test]
fn stereo_float_loads_as_float() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("float.wav");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 48000,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    write_spec(&path, spec, |w| {
        for s in [0.5f32, -0.5, 0.25, -0.25] {
            w.write_sample(s).unwrap();
        }
    });

    let (data, format, frequency) = read_wav(&path).unwrap();
    assert_eq!(format, Format::StereoFloat32);
    assert_eq!(frequency, 48000);
    assert_eq!(data.len(), 16);
    assert_eq!(f32::from_le_bytes([data[4], data[5], data[6], data[7]]), -0.5);
}

#[test]
fn wide_integer_truncates_to_16_bit() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wide.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    write_spec(&path, spec, |w| {
        w.write_sample(0x12_3456i32).unwrap();
        w.write_sample(-0x40_0000i32).unwrap();
    });

    let (data, format, _) = read_wav(&path).unwrap();
    assert_eq!(format, Format::Mono16);
    assert_eq!(i16::from_le_bytes([data[0], data[1]]), 0x1234);
    assert_eq!(i16::from_le_bytes([data[2], data[3]]), -0x4000);
}

#[test]
fn more_than_two_channels_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("surround.wav");
    write_wav(&path, &[0; 12], 6, 44100).unwrap();
    assert!(matches!(
        read_wav(&path),
        Err(mezcla_io::Error::UnsupportedFormat(_))
    ));
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    assert!(read_wav(dir.path().join("absent.wav")).is_err());
}

// ---------------------------------------------------------------------------
// Waveout backend
// ---------------------------------------------------------------------------

#[test]
fn waveout_records_synchronous_mix() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.wav");
    let engine = Engine::with_backends(
        EngineSettings {
            mix_frames: FRAMES,
            sync: true,
            devices: vec!["waveout".into()],
            ..EngineSettings::default()
        },
        vec![Arc::new(WaveBackend::new(&path)) as Arc<dyn Backend>],
    );
    let ctx = engine.create_context(&ContextAttributes::default()).unwrap();

    let pcm: Vec<u8> = std::iter::repeat_n(777i16, FRAMES * 3)
        .flat_map(|s| s.to_le_bytes())
        .collect();
    let buffer = engine.gen_buffers(1).unwrap()[0];
    engine.buffer_data(buffer, Format::Mono16, &pcm, 44100).unwrap();
    let src = engine.gen_sources(1).unwrap()[0];
    engine
        .set_source(src, SourceParam::Buffer, ParamValue::Buffer(buffer))
        .unwrap();
    engine.play_source(src).unwrap();
    for _ in 0..4 {
        engine.process_context(ctx).unwrap();
    }
    engine.destroy_context(ctx).unwrap();

    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().sample_rate, 44100);
    assert_eq!(reader.spec().bits_per_sample, 16);
    let samples: Vec<i16> = reader.into_samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(samples.len(), FRAMES * 2 * 4);
    let played = FRAMES * 2 * 3;
    assert!(samples[..played].iter().all(|&s| s == 777));
    assert!(samples[played..].iter().all(|&s| s == 0));
}

#[test]
fn waveout_cannot_capture() {
    let dir = tempdir().unwrap();
    let engine = Engine::with_backends(
        EngineSettings {
            sync: true,
            devices: vec!["waveout".into()],
            ..EngineSettings::default()
        },
        vec![Arc::new(WaveBackend::new(dir.path().join("o.wav"))) as Arc<dyn Backend>],
    );
    let attrs = ContextAttributes {
        capture: true,
        backend: Some("waveout".into()),
        ..ContextAttributes::default()
    };
    assert!(engine.create_context(&attrs).is_err());
}
