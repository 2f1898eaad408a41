//! Integration tests for the mezcla engine.
//!
//! Drives the public `Engine` API end to end: context lifecycle, source
//! transitions, queue handling across ticks, streaming and callback buffers,
//! the background mixer and runtime teardown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mezcla_core::engine::BufferAppendDataFn;
use mezcla_core::{
    Backend, BufferId, CallbackError, CallbackRequest, ContextAttributes, ContextId, Engine,
    EngineSettings, Error, Format, ListenerParam, MemoryBackend, MemoryHandle, ParamValue,
    SourceId, SourceParam, SourceState,
};

const FRAMES: usize = 64;
/// Bytes per channel mixed per tick.
const BL: usize = FRAMES * 2;

fn settings() -> EngineSettings {
    EngineSettings {
        mix_frames: FRAMES,
        sync: true,
        devices: vec!["memory".into()],
        ..EngineSettings::default()
    }
}

/// Engine with one synchronous context writing to memory.
fn sync_engine() -> (Engine, ContextId, MemoryHandle) {
    let backend = MemoryBackend::new();
    let handle = backend.handle();
    let engine = Engine::with_backends(settings(), vec![Arc::new(backend) as Arc<dyn Backend>]);
    let ctx = engine.create_context(&ContextAttributes::default()).unwrap();
    (engine, ctx, handle)
}

fn mono16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn buffer_of(engine: &Engine, value: i16, frames: usize) -> BufferId {
    let id = engine.gen_buffers(1).unwrap()[0];
    engine
        .buffer_data(id, Format::Mono16, &mono16(&vec![value; frames]), 44100)
        .unwrap();
    id
}

fn source_with(engine: &Engine, buffer: BufferId) -> SourceId {
    let src = engine.gen_sources(1).unwrap()[0];
    engine
        .set_source(src, SourceParam::Buffer, ParamValue::Buffer(buffer))
        .unwrap();
    src
}

fn int(engine: &Engine, src: SourceId, param: SourceParam) -> i64 {
    engine.get_source(src, param).unwrap().as_int().unwrap()
}

// ============================================================================
// 1. Source transitions
// ============================================================================

#[test]
fn play_without_buffer_is_illegal() {
    let (engine, _, _) = sync_engine();
    let src = engine.gen_sources(1).unwrap()[0];
    assert_eq!(
        engine.play_source(src),
        Err(Error::IllegalCommand("source has no buffer"))
    );
    assert_eq!(engine.source_state(src), Ok(SourceState::Initial));
    assert_eq!(
        engine.take_error(),
        Some(Error::IllegalCommand("source has no buffer"))
    );
}

#[test]
fn batch_delete_with_invalid_id_touches_nothing() {
    let (engine, _, _) = sync_engine();
    let ids = engine.gen_sources(3).unwrap();
    let err = engine
        .delete_sources(&[ids[0], SourceId(999), ids[2]])
        .unwrap_err();
    assert_eq!(
        err,
        Error::InvalidName {
            kind: "source",
            id: 999
        }
    );
    assert!(ids.iter().all(|&id| engine.is_source(id)));

    engine.delete_sources(&ids).unwrap();
    assert!(ids.iter().all(|&id| !engine.is_source(id)));
}

#[test]
fn batch_play_validates_every_id_first() {
    let (engine, _, _) = sync_engine();
    let buffer = buffer_of(&engine, 100, FRAMES);
    let a = source_with(&engine, buffer);
    let bare = engine.gen_sources(1).unwrap()[0];
    assert!(engine.play_sources(&[a, bare]).is_err());
    assert_eq!(engine.source_state(a), Ok(SourceState::Initial));
    assert_eq!(engine.active_mix_sources(), 0);
}

#[test]
fn playing_source_cannot_be_deleted_or_rebound() {
    let (engine, _, _) = sync_engine();
    let buffer = buffer_of(&engine, 100, FRAMES * 4);
    let src = source_with(&engine, buffer);
    engine.play_source(src).unwrap();

    assert_eq!(
        engine.delete_sources(&[src]),
        Err(Error::IllegalCommand("cannot delete a playing source"))
    );
    assert!(matches!(
        engine.set_source(src, SourceParam::Buffer, ParamValue::Buffer(BufferId::NONE)),
        Err(Error::IllegalCommand(_))
    ));

    engine.pause_source(src).unwrap();
    assert!(engine.delete_sources(&[src]).is_err());
    engine.stop_source(src).unwrap();
    engine.delete_sources(&[src]).unwrap();
}

#[test]
fn pause_resume_stop_rewind() {
    let (engine, ctx, _) = sync_engine();
    let buffer = buffer_of(&engine, 100, FRAMES * 4);
    let src = source_with(&engine, buffer);

    engine.play_source(src).unwrap();
    engine.process_context(ctx).unwrap();
    assert_eq!(engine.source_cursor(src), Ok(BL));

    engine.pause_source(src).unwrap();
    engine.process_context(ctx).unwrap();
    assert_eq!(engine.source_cursor(src), Ok(BL));
    assert!(engine.last_mix().iter().all(|&s| s == 0));
    assert_eq!(engine.active_mix_sources(), 1);

    engine.play_source(src).unwrap();
    engine.process_context(ctx).unwrap();
    assert_eq!(engine.source_cursor(src), Ok(2 * BL));

    engine.stop_source(src).unwrap();
    assert_eq!(engine.source_state(src), Ok(SourceState::Stopped));
    assert_eq!(engine.active_mix_sources(), 0);
    assert_eq!(int(&engine, src, SourceParam::BuffersProcessed), 1);

    engine.rewind_source(src).unwrap();
    assert_eq!(engine.source_state(src), Ok(SourceState::Stopped));

    engine.play_source(src).unwrap();
    engine.rewind_source(src).unwrap();
    assert_eq!(engine.source_state(src), Ok(SourceState::Initial));
    assert_eq!(engine.source_cursor(src), Ok(0));
    assert_eq!(int(&engine, src, SourceParam::BuffersProcessed), 0);
}

// ============================================================================
// 2. Mixing
// ============================================================================

#[test]
fn one_tick_reaches_the_device() {
    let (engine, ctx, handle) = sync_engine();
    let buffer = buffer_of(&engine, 1234, FRAMES * 2);
    let src = source_with(&engine, buffer);
    engine.play_source(src).unwrap();
    engine.process_context(ctx).unwrap();

    let mix = engine.last_mix();
    assert_eq!(mix.len(), FRAMES * 2);
    assert!(mix.iter().all(|&s| s == 1234));
    assert_eq!(handle.recorded_i16(), mix);
    assert_eq!(handle.writes(), 1);
}

#[test]
fn two_sources_sum_and_clamp() {
    let (engine, ctx, _) = sync_engine();
    let a = source_with(&engine, buffer_of(&engine, 20000, FRAMES));
    let b = source_with(&engine, buffer_of(&engine, 20000, FRAMES));
    engine.play_sources(&[a, b]).unwrap();
    engine.process_context(ctx).unwrap();
    assert!(engine.last_mix().iter().all(|&s| s == i16::MAX));
}

#[test]
fn looping_cursor_wraps_after_five_ticks() {
    let (engine, ctx, _) = sync_engine();
    let buffer = buffer_of(&engine, 7, FRAMES * 4);
    let src = source_with(&engine, buffer);
    engine
        .set_source(src, SourceParam::Looping, ParamValue::Bool(true))
        .unwrap();
    engine.play_source(src).unwrap();
    for _ in 0..5 {
        engine.process_context(ctx).unwrap();
    }
    assert_eq!(engine.source_cursor(src), Ok((5 * BL) % (4 * BL)));
    assert_eq!(engine.source_state(src), Ok(SourceState::Playing));
    assert_eq!(engine.active_mix_sources(), 1);
}

#[test]
fn short_looping_buffer_repeats() {
    let (engine, ctx, _) = sync_engine();
    let id = engine.gen_buffers(1).unwrap()[0];
    engine
        .buffer_data(id, Format::Mono16, &mono16(&[1, 2, 3]), 44100)
        .unwrap();
    let src = source_with(&engine, id);
    engine
        .set_source(src, SourceParam::Looping, ParamValue::Bool(true))
        .unwrap();
    engine.play_source(src).unwrap();
    engine.process_context(ctx).unwrap();

    let left: Vec<i16> = engine.last_mix().iter().step_by(2).copied().collect();
    let expected: Vec<i16> = [1, 2, 3].iter().copied().cycle().take(FRAMES).collect();
    assert_eq!(left, expected);
    assert_eq!(engine.source_cursor(src), Ok((FRAMES % 3) * 2));
}

#[test]
fn queue_advances_then_stops() {
    let (engine, ctx, _) = sync_engine();
    let a = buffer_of(&engine, 1000, FRAMES);
    let b = buffer_of(&engine, 2000, FRAMES);
    let src = engine.gen_sources(1).unwrap()[0];
    engine.queue_buffers(src, &[a]).unwrap();
    engine.queue_buffers(src, &[b]).unwrap();
    assert_eq!(int(&engine, src, SourceParam::BuffersQueued), 2);

    engine.play_source(src).unwrap();
    engine.process_context(ctx).unwrap();
    assert!(engine.last_mix().iter().all(|&s| s == 1000));
    assert_eq!(int(&engine, src, SourceParam::BuffersProcessed), 1);
    assert_eq!(
        engine.get_source(src, SourceParam::Buffer),
        Ok(ParamValue::Buffer(b))
    );

    engine.process_context(ctx).unwrap();
    assert!(engine.last_mix().iter().all(|&s| s == 2000));
    assert_eq!(engine.source_state(src), Ok(SourceState::Stopped));
    assert_eq!(int(&engine, src, SourceParam::BuffersProcessed), 2);
    assert_eq!(engine.active_mix_sources(), 0);

    assert_eq!(engine.unqueue_buffers(src, 2), Ok(vec![a, b]));
    assert_eq!(int(&engine, src, SourceParam::BuffersQueued), 0);
}

#[test]
fn queue_boundary_reads_into_next_buffer() {
    let (engine, ctx, _) = sync_engine();
    let a = buffer_of(&engine, 1000, FRAMES / 2);
    let b = buffer_of(&engine, 2000, FRAMES * 2);
    let src = engine.gen_sources(1).unwrap()[0];
    engine.queue_buffers(src, &[a, b]).unwrap();
    engine.play_source(src).unwrap();
    engine.process_context(ctx).unwrap();

    let left: Vec<i16> = engine.last_mix().iter().step_by(2).copied().collect();
    assert!(left[..FRAMES / 2].iter().all(|&s| s == 1000));
    assert!(left[FRAMES / 2..].iter().all(|&s| s == 2000));
    assert_eq!(engine.source_cursor(src), Ok(FRAMES));
    assert_eq!(int(&engine, src, SourceParam::BuffersProcessed), 1);
}

#[test]
fn pitched_source_crosses_queue_boundary_without_gap() {
    let (engine, ctx, _) = sync_engine();
    let a = buffer_of(&engine, 1000, 40);
    let b = buffer_of(&engine, 2000, 400);
    let src = engine.gen_sources(1).unwrap()[0];
    engine.queue_buffers(src, &[a, b]).unwrap();
    engine
        .set_source(src, SourceParam::Pitch, ParamValue::Float(1.001))
        .unwrap();
    engine.play_source(src).unwrap();
    engine.process_context(ctx).unwrap();

    let left: Vec<i16> = engine.last_mix().iter().step_by(2).copied().collect();
    assert!(left[..39].iter().all(|&s| s == 1000));
    assert!(left[40..].iter().all(|&s| s == 2000), "got {:?}", &left[36..]);
    assert!(!left.contains(&0));
    assert_eq!(int(&engine, src, SourceParam::BuffersProcessed), 1);
    // 64.064 frames read: 24 of them from the second buffer.
    assert_eq!(engine.source_cursor(src), Ok(24 * 2));

    engine.process_context(ctx).unwrap();
    let left: Vec<i16> = engine.last_mix().iter().step_by(2).copied().collect();
    assert!(left.iter().all(|&s| s == 2000));
    assert_eq!(engine.source_state(src), Ok(SourceState::Playing));
}

#[test]
fn unqueue_more_than_processed_fails() {
    let (engine, _, _) = sync_engine();
    let a = buffer_of(&engine, 1, FRAMES);
    let src = engine.gen_sources(1).unwrap()[0];
    engine.queue_buffers(src, &[a]).unwrap();
    assert_eq!(
        engine.unqueue_buffers(src, 1),
        Err(Error::InvalidValue("more buffers than processed"))
    );
    assert_eq!(
        engine.queue_buffers(src, &[BufferId(77)]),
        Err(Error::InvalidName {
            kind: "buffer",
            id: 77
        })
    );
    assert_eq!(int(&engine, src, SourceParam::BuffersQueued), 1);
}

#[test]
fn suspended_context_is_silent() {
    let (engine, ctx, _) = sync_engine();
    let src = source_with(&engine, buffer_of(&engine, 500, FRAMES * 4));
    engine.play_source(src).unwrap();
    engine.suspend_context(ctx).unwrap();
    // Processing resumes the context.
    engine.process_context(ctx).unwrap();
    assert_eq!(engine.source_cursor(src), Ok(BL));
}

#[test]
fn listener_gain_scales_output() {
    let (engine, ctx, _) = sync_engine();
    engine
        .set_listener(ListenerParam::Gain, ParamValue::Float(0.5))
        .unwrap();
    let src = source_with(&engine, buffer_of(&engine, 1000, FRAMES));
    engine.play_source(src).unwrap();
    engine.process_context(ctx).unwrap();
    assert!(engine.last_mix().iter().all(|&s| s == 500));
}

#[test]
fn deleted_buffer_keeps_playing_until_released() {
    let (engine, ctx, _) = sync_engine();
    let buffer = buffer_of(&engine, 300, FRAMES * 4);
    let src = source_with(&engine, buffer);
    engine.play_source(src).unwrap();
    engine.delete_buffers(&[buffer]).unwrap();
    assert!(!engine.is_buffer(buffer));

    engine.process_context(ctx).unwrap();
    assert!(engine.last_mix().iter().all(|&s| s == 300));

    engine.stop_source(src).unwrap();
    engine.delete_sources(&[src]).unwrap();
    assert!(!engine.is_buffer(buffer));
}

#[test]
fn buffer_data_refused_while_playing() {
    let (engine, _, _) = sync_engine();
    let buffer = buffer_of(&engine, 1, FRAMES);
    let src = source_with(&engine, buffer);
    engine.play_source(src).unwrap();
    assert_eq!(
        engine.buffer_data(buffer, Format::Mono16, &mono16(&[1, 2]), 44100),
        Err(Error::IllegalCommand("buffer is being played"))
    );
}

#[test]
fn buffer_info_reports_upload() {
    let (engine, _, _) = sync_engine();
    let id = engine.gen_buffers(1).unwrap()[0];
    let stereo8 = [128u8, 255, 0, 128];
    engine.buffer_data(id, Format::Stereo8, &stereo8, 44100).unwrap();
    let info = engine.buffer_info(id).unwrap();
    assert_eq!(info.bits, 8);
    assert_eq!(info.channels, 2);
    assert_eq!(info.frequency, 44100);
    assert_eq!(info.size, 4);
}

// ============================================================================
// 3. Streaming and callback buffers
// ============================================================================

#[test]
fn streaming_buffer_tracks_stream_position() {
    let (engine, ctx, _) = sync_engine();
    let id = engine.gen_streaming_buffers(1).unwrap()[0];
    let appended = engine
        .buffer_append_data(id, Format::Mono16, &mono16(&vec![400; FRAMES * 2]), 44100)
        .unwrap();
    assert_eq!(appended, 2 * BL);
    let src = source_with(&engine, id);
    engine.play_source(src).unwrap();

    engine.process_context(ctx).unwrap();
    assert!(engine.last_mix().iter().all(|&s| s == 400));
    assert_eq!(int(&engine, src, SourceParam::ByteOffset), BL as i64);

    engine.process_context(ctx).unwrap();
    engine.process_context(ctx).unwrap();
    // Starved streams stay playing and mix silence.
    assert!(engine.last_mix().iter().all(|&s| s == 0));
    assert_eq!(engine.source_state(src), Ok(SourceState::Playing));
    assert_eq!(int(&engine, src, SourceParam::ByteOffset), 2 * BL as i64);
}

#[test]
fn stream_wrap_discards_played_data() {
    let (engine, ctx, _) = sync_engine();
    let id = engine.gen_streaming_buffers(1).unwrap()[0];
    engine.set_stream_wrap(id, true).unwrap();
    engine
        .buffer_append_data(id, Format::Mono16, &mono16(&vec![1; FRAMES * 3]), 44100)
        .unwrap();
    let src = source_with(&engine, id);
    engine.play_source(src).unwrap();
    engine.process_context(ctx).unwrap();
    assert_eq!(int(&engine, src, SourceParam::ByteOffset), 0);
    assert_eq!(engine.buffer_info(id).unwrap().size, 2 * BL);
}

#[test]
fn callback_buffer_short_fill_stops_source() {
    let (engine, ctx, _) = sync_engine();
    let id = engine.gen_buffers(1).unwrap()[0];
    let mut calls = 0;
    engine
        .buffer_data_with_callback(
            id,
            Box::new(move |mut req: CallbackRequest<'_>| -> Result<usize, CallbackError> {
                calls += 1;
                let frames = req.out.len() / req.channels;
                let give = if calls == 1 { frames } else { frames / 2 };
                req.out[..give * req.channels].fill(300);
                Ok(give)
            }),
            Format::Mono16,
        )
        .unwrap();
    let src = source_with(&engine, id);
    engine.play_source(src).unwrap();

    engine.process_context(ctx).unwrap();
    assert!(engine.last_mix().iter().all(|&s| s == 300));
    assert_eq!(engine.source_state(src), Ok(SourceState::Playing));

    engine.process_context(ctx).unwrap();
    let mix = engine.last_mix();
    assert!(mix[..FRAMES].iter().all(|&s| s == 300));
    assert!(mix[FRAMES..].iter().all(|&s| s == 0));
    assert_eq!(engine.source_state(src), Ok(SourceState::Stopped));
}

#[test]
fn failing_callback_removes_source() {
    let (engine, ctx, _) = sync_engine();
    let id = engine.gen_buffers(1).unwrap()[0];
    engine
        .buffer_data_with_callback(
            id,
            Box::new(|_req: CallbackRequest<'_>| -> Result<usize, CallbackError> {
                Err(CallbackError("decoder gone".into()))
            }),
            Format::Stereo16,
        )
        .unwrap();
    let src = source_with(&engine, id);
    engine.play_source(src).unwrap();
    engine.process_context(ctx).unwrap();
    assert!(engine.last_mix().iter().all(|&s| s == 0));
    assert_eq!(engine.source_state(src), Ok(SourceState::Stopped));
    assert_eq!(engine.active_mix_sources(), 0);
}

// ============================================================================
// 4. Extensions and runtime lifecycle
// ============================================================================

fn first() -> i32 {
    1
}

fn second() -> i32 {
    2
}

#[test]
fn duplicate_extension_keeps_first() {
    let engine = Engine::new(settings());
    assert!(engine.register_extension("mzAnswer", first as fn() -> i32));
    assert!(!engine.register_extension("mzAnswer", second as fn() -> i32));
    let f = engine.proc_address_as::<fn() -> i32>("mzAnswer").unwrap();
    assert_eq!(f(), 1);
}

#[test]
fn builtins_follow_runtime_lifecycle() {
    let (engine, ctx, _) = sync_engine();
    assert!(engine.is_extension_present("MEZCLA_loki_streaming"));
    assert!(engine.is_extension_present("MEZCLA_capture"));
    let append = engine
        .proc_address_as::<BufferAppendDataFn>("mzBufferAppendData")
        .unwrap();
    let id = engine.gen_streaming_buffers(1).unwrap()[0];
    assert_eq!(
        append(&engine, id, Format::Mono16, &mono16(&[1, 2]), 44100),
        Ok(4)
    );

    engine.destroy_context(ctx).unwrap();
    assert!(!engine.is_extension_present("MEZCLA_loki_streaming"));
    assert!(engine.extension_names().is_empty());
    assert!(!engine.is_buffer(id));
    assert_eq!(engine.gen_buffers(1), Err(Error::IllegalCommand("no context has been created")));

    let ctx = engine.create_context(&ContextAttributes::default()).unwrap();
    assert!(engine.is_extension_present("MEZCLA_loki_streaming"));
    assert!(!engine.is_buffer(id));
    assert_eq!(engine.current_context(), Some(ctx));
}

#[test]
fn current_context_switches() {
    let (engine, first, _) = sync_engine();
    let second = engine.create_context(&ContextAttributes::default()).unwrap();
    assert_eq!(engine.current_context(), Some(first));
    let in_first = engine.gen_sources(1).unwrap()[0];

    engine.make_context_current(Some(second)).unwrap();
    assert!(!engine.is_source(in_first));
    assert!(engine.make_context_current(Some(ContextId(99))).is_err());
    assert_eq!(engine.current_context(), Some(second));

    engine.destroy_context(second).unwrap();
    assert_eq!(engine.current_context(), None);
    assert_eq!(
        engine.gen_sources(1),
        Err(Error::IllegalCommand("no current context"))
    );
    assert_eq!(engine.contexts(), vec![first]);
}

#[test]
fn first_error_wins_until_taken() {
    let (engine, _, _) = sync_engine();
    let _ = engine.play_source(SourceId(5));
    let _ = engine.set_doppler_factor(-1.0);
    assert_eq!(
        engine.take_error(),
        Some(Error::InvalidName { kind: "source", id: 5 })
    );
    assert_eq!(engine.take_error(), None);
}

// ============================================================================
// 5. Background mixer and capture
// ============================================================================

fn wait_for(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn async_context_is_mixed_in_background() {
    let backend = MemoryBackend::new();
    let handle = backend.handle();
    let engine = Engine::with_backends(
        EngineSettings {
            sync: false,
            ..settings()
        },
        vec![Arc::new(backend) as Arc<dyn Backend>],
    );
    let ctx = engine.create_context(&ContextAttributes::default()).unwrap();
    assert!(engine.is_mixer_thread_running());

    let src = source_with(&engine, buffer_of(&engine, 900, FRAMES * 4));
    engine
        .set_source(src, SourceParam::Looping, ParamValue::Bool(true))
        .unwrap();
    engine.play_source(src).unwrap();
    wait_for(|| {
        handle
            .take_recorded()
            .chunks_exact(2)
            .any(|b| i16::from_le_bytes([b[0], b[1]]) == 900)
    });

    engine.with_mixer_paused(|| {
        let writes = handle.writes();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(handle.writes(), writes);
    });

    engine.destroy_context(ctx).unwrap();
    assert!(!engine.is_mixer_thread_running());
}

#[test]
fn default_engine_mixes_in_real_time() {
    let engine = Engine::new(EngineSettings::default());
    let ctx = engine.create_context(&ContextAttributes::default()).unwrap();
    assert_eq!(engine.is_context_sync(ctx), Ok(false));

    // A quarter second at the default 44.1 kHz mixing rate.
    let src = source_with(&engine, buffer_of(&engine, 100, 11025));
    let start = Instant::now();
    engine.play_source(src).unwrap();
    wait_for(|| engine.source_state(src) == Ok(SourceState::Stopped));
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_millis(150),
        "0.25s of audio finished after {elapsed:?}"
    );

    engine.destroy_context(ctx).unwrap();
}

#[test]
fn capture_replays_device_input() {
    let backend = MemoryBackend::new();
    let handle = backend.handle();
    let engine = Engine::with_backends(settings(), vec![Arc::new(backend) as Arc<dyn Backend>]);
    engine
        .create_context(&ContextAttributes {
            capture: true,
            ..ContextAttributes::default()
        })
        .unwrap();
    assert_eq!(engine.capture_settings().unwrap().channels, 1);

    handle.push_capture(&[1, 0, 2, 0]);
    engine.capture_start().unwrap();
    let mut out = [0u8; 8];
    assert_eq!(engine.capture_samples(&mut out), Ok(4));
    assert_eq!(&out[..4], &[1, 0, 2, 0]);
    engine.capture_stop().unwrap();
}

#[test]
fn capture_without_device_is_illegal() {
    let (engine, _, _) = sync_engine();
    assert_eq!(
        engine.capture_start(),
        Err(Error::IllegalCommand("context has no capture device"))
    );
}
