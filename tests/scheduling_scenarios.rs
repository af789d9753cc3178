//! End-to-end scheduling scenarios
//!
//! Drives the engine with a manual clock and a recording sink, the way the
//! heartbeat would, and checks what reaches the sink.

use backbeat::midi::event::MidiEvent;
use backbeat::midi::output::SinkRecord;
use backbeat::sequencer::transport::ClockPosition;
use backbeat::{
    ChordDefinition, ClockPhase, ClockSnapshot, EventSource, InMemoryLibrary, ManualTimeSource,
    NoteScheduler, Pattern, PatternKind, PatternRow, PerformanceConfig, PerformanceEngine,
    PlayOutcome, QuantizationMode, RecordingSink, Tempo, TimeSignature, TimeSource, TransportClock,
    next_quantization_time,
};
use rand::Rng;
use std::sync::Arc;

const KICK: u8 = 36;
const SNARE: u8 = 38;
const HAT: u8 = 42;

fn library() -> Arc<InMemoryLibrary> {
    Arc::new(
        InMemoryLibrary::new()
            .with_pattern(
                Pattern::new("Kicks", PatternKind::Percussion, 2, 8)
                    .with_row(PatternRow::from_hits(KICK, "x.x.x.x.")),
            )
            .with_pattern(
                Pattern::new("Snares", PatternKind::Percussion, 2, 8)
                    .with_row(PatternRow::from_hits(SNARE, "..x...x.")),
            )
            .with_pattern(
                Pattern::new("Hats", PatternKind::Percussion, 2, 8)
                    .with_row(PatternRow::from_hits(HAT, "xxxxxxxx")),
            )
            .with_pattern(
                Pattern::new("Strum", PatternKind::Strum, 1, 4)
                    .with_row(PatternRow::from_hits(1, "x.x."))
                    .with_row(PatternRow::from_hits(2, "x.x.")),
            )
            .with_chord(ChordDefinition::frets(
                "C",
                &[None, Some(3), Some(2), Some(0), Some(1), Some(0)],
            )),
    )
}

fn new_engine_with(config: PerformanceConfig) -> (PerformanceEngine, ManualTimeSource, RecordingSink) {
    let time = ManualTimeSource::new(0.0);
    let sink = RecordingSink::new();
    let library = library();
    let engine = PerformanceEngine::new(
        Box::new(sink.clone()),
        Arc::new(time.clone()),
        library.clone(),
        library,
        config.resolve(),
    );
    (engine, time, sink)
}

fn new_engine() -> (PerformanceEngine, ManualTimeSource, RecordingSink) {
    new_engine_with(PerformanceConfig::default())
}

/// Tick every 10 ms from the current time up to `until`
fn run_until(engine: &mut PerformanceEngine, time: &ManualTimeSource, until: f64) {
    let from = time.now();
    let steps = ((until - from) / 0.01).floor().max(0.0) as usize;
    for i in 1..=steps {
        time.set(from + i as f64 * 0.01);
        engine.tick();
    }
    time.set(until);
    engine.tick();
}

fn note_ons(sink: &RecordingSink) -> Vec<(f64, u8)> {
    sink.scheduled()
        .iter()
        .filter_map(|timed| match timed.event {
            MidiEvent::NoteOn { note, .. } => Some((timed.time, note)),
            _ => None,
        })
        .collect()
}

#[test]
fn count_in_lasts_exactly_one_measure() {
    let mut rng = rand::thread_rng();
    let signatures = [
        TimeSignature::four_four(),
        TimeSignature::three_four(),
        TimeSignature::six_eight(),
    ];

    for _ in 0..200 {
        let bpm = rng.gen_range(40.0..=240.0);
        let ts = signatures[rng.gen_range(0..signatures.len())];
        let start = rng.gen_range(0.0..1000.0);
        let beats = ts.beats_per_measure() as i64;

        let mut clock = TransportClock::default();
        clock.start(start, Tempo::new(bpm), ts);

        let at_start = clock.position(start);
        assert_eq!(at_start.phase, ClockPhase::CountIn);
        assert_eq!((at_start.measure, at_start.beat), (-1, -beats));

        let measure = clock.measure_duration();
        let after = clock.position(start + measure);
        assert_eq!(after.phase, ClockPhase::Running, "bpm {bpm} {ts}");
        assert_eq!((after.measure, after.beat), (0, 0), "bpm {bpm} {ts}");

        let last_count_in = clock.position(start + measure - clock.beat_duration() * 0.5);
        assert_eq!(last_count_in.phase, ClockPhase::CountIn);
        assert_eq!(last_count_in.beat, -1);

        clock.stop();
        assert_eq!(clock.position(start + measure), ClockPosition::initial(&ts));
    }
}

#[test]
fn stop_from_any_state_silences_everything() {
    // Stopped
    let (mut engine, _time, sink) = new_engine();
    engine.stop();
    assert!(!engine.is_playing());
    assert_eq!(sink.panic_count(), 1);

    // Count-in
    let (mut engine, time, sink) = new_engine();
    engine.play("Kicks").unwrap();
    run_until(&mut engine, &time, 0.7);
    engine.stop();
    assert!(!engine.is_playing());
    assert_eq!(engine.scheduler().pending_count(), 0);
    assert_eq!(sink.panic_count(), 1);

    // Running with a queued swap and a chord in flight
    let (mut engine, time, sink) = new_engine();
    engine.play("Kicks").unwrap();
    run_until(&mut engine, &time, 2.3);
    engine.play("Snares").unwrap();
    engine.play_chord("C", "Strum").unwrap();
    run_until(&mut engine, &time, 2.6);
    assert!(engine.scheduler().sounding_count() > 0);

    engine.stop();
    assert!(!engine.is_playing());
    assert_eq!(engine.scheduler().pending_count(), 0);
    assert_eq!(engine.scheduler().sounding_count(), 0);
    assert_eq!(sink.panic_count(), 1);
    assert_eq!(engine.progress().queued_pattern, None);

    // Nothing from the old session after the panic
    let after_panic = sink.records().len();
    run_until(&mut engine, &time, 8.0);
    assert_eq!(sink.records().len(), after_panic);
    assert_eq!(sink.records().last(), Some(&SinkRecord::Panic));
}

#[test]
fn swap_takes_effect_at_next_measure() {
    let (mut engine, time, sink) = new_engine();
    engine.play("Kicks").unwrap();
    run_until(&mut engine, &time, 2.9);

    assert_eq!(engine.play("Snares").unwrap(), PlayOutcome::Queued);
    assert_eq!(engine.progress().queued_pattern.as_deref(), Some("Snares"));
    run_until(&mut engine, &time, 7.9);

    let hits = note_ons(&sink);
    let measure_zero: Vec<u8> = hits
        .iter()
        .filter(|(t, _)| *t >= 2.0 && *t < 4.0)
        .map(|(_, n)| *n)
        .collect();
    assert_eq!(measure_zero, vec![KICK; 4]);

    let later: Vec<u8> = hits.iter().filter(|(t, _)| *t >= 4.0).map(|(_, n)| *n).collect();
    assert_eq!(later, vec![SNARE; 4]);
    assert_eq!(engine.progress().active_pattern.as_deref(), Some("Snares"));
    assert_eq!(engine.progress().queued_pattern, None);
}

#[test]
fn only_the_last_queued_pattern_plays() {
    let (mut engine, time, sink) = new_engine();
    engine.play("Kicks").unwrap();
    run_until(&mut engine, &time, 2.4);

    engine.play("Snares").unwrap();
    run_until(&mut engine, &time, 3.1);
    engine.play("Hats").unwrap();
    run_until(&mut engine, &time, 5.9);

    let after: Vec<u8> = note_ons(&sink)
        .into_iter()
        .filter(|(t, _)| *t >= 4.0)
        .map(|(_, n)| n)
        .collect();
    assert!(!after.is_empty());
    assert!(after.iter().all(|n| *n == HAT));
}

#[test]
fn events_reach_the_sink_in_time_order() {
    let (mut engine, time, sink) = new_engine();
    engine.play("Hats").unwrap();
    engine.play_chord("C", "Strum").unwrap();
    run_until(&mut engine, &time, 6.0);

    let times: Vec<f64> = sink.scheduled().iter().map(|e| e.time).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn quantized_times_are_aligned_and_never_early() {
    let mut rng = rand::thread_rng();

    for _ in 0..500 {
        let bpm = rng.gen_range(40.0..=240.0);
        let beats = [3u32, 4, 6][rng.gen_range(0..3)];
        let start = rng.gen_range(0.0..100.0);
        let clock = ClockSnapshot {
            start_time: start,
            is_running: true,
            tempo_bpm: bpm,
            beats_per_measure: beats,
        };
        let now = start + rng.gen_range(0.0..60.0);

        let measure = next_quantization_time(QuantizationMode::Measure, &clock, now);
        assert!(measure >= now);
        let slots = (measure - start) / clock.measure_duration();
        assert!((slots - slots.round()).abs() < 1e-6);

        let half = next_quantization_time(QuantizationMode::HalfMeasure, &clock, now);
        assert!(half >= now && half <= measure + 1e-9);

        assert_eq!(next_quantization_time(QuantizationMode::None, &clock, now), now);
    }

    let t0 = 12.5;
    let clock = ClockSnapshot {
        start_time: t0,
        is_running: true,
        tempo_bpm: 120.0,
        beats_per_measure: 4,
    };
    assert_eq!(
        next_quantization_time(QuantizationMode::Measure, &clock, t0 + 1.3),
        t0 + 2.0
    );
}

#[test]
fn cancelling_fired_or_cancelled_events_is_a_no_op() {
    let sink = RecordingSink::new();
    let scheduler = NoteScheduler::new(Box::new(sink.clone()));
    let fired = scheduler.schedule_note_on(60, 100, 0, 0.5);
    let cancelled = scheduler.schedule_note_off(60, 0, 2.0);

    scheduler.process_due(1.0);
    assert!(scheduler.cancel(cancelled));
    assert!(!scheduler.cancel(cancelled));
    assert!(!scheduler.cancel(fired));
    assert!(!scheduler.cancel(9_999));
    assert_eq!(sink.scheduled().len(), 1);
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn unquantized_chord_while_stopped_sounds_now() {
    let (mut engine, time, sink) = new_engine_with(PerformanceConfig {
        quantization: QuantizationMode::None,
        ..PerformanceConfig::default()
    });
    time.set(4.2);
    let trigger = engine.play_chord("C", "Strum").unwrap();
    assert_eq!(trigger.start, 4.2);

    engine.tick();
    let first = note_ons(&sink);
    assert!(!first.is_empty());
    assert!(first.iter().all(|(t, _)| *t == 4.2));
}

#[test]
fn chord_quantized_to_loop_measure() {
    let (mut engine, time, sink) = new_engine_with(PerformanceConfig {
        quantization: QuantizationMode::Measure,
        ..PerformanceConfig::default()
    });
    engine.play("Kicks").unwrap();
    run_until(&mut engine, &time, 2.5);

    let trigger = engine.play_chord("C", "Strum").unwrap();
    assert_eq!(trigger.start, 4.0);
    run_until(&mut engine, &time, 4.5);

    let chord_notes: Vec<f64> = note_ons(&sink)
        .into_iter()
        .filter(|(_, n)| *n != KICK && *n < 76)
        .map(|(t, _)| t)
        .collect();
    assert_eq!(chord_notes.first(), Some(&4.0));
}

#[test]
fn long_stall_skips_ahead_without_a_burst_of_measures() {
    let (mut engine, time, _sink) = new_engine();
    engine.play("Kicks").unwrap();
    engine.tick();

    // Heartbeat stalls for 15 measures
    time.set(30.0);
    engine.tick();

    let progress = engine.progress();
    assert_eq!(progress.phase, ClockPhase::Running);
    assert_eq!(progress.measure, 14);
    assert!(engine.scheduler().stats().late > 0);

    let pending: Vec<f64> = engine
        .scheduler()
        .pending_events()
        .iter()
        .filter(|e| e.source == EventSource::Loop)
        .map(|e| e.time)
        .collect();
    assert!(!pending.is_empty());
    assert!(pending.iter().all(|t| *t >= 32.0 && *t < 34.0));
}

#[test]
fn count_in_clicks_precede_the_loop() {
    let (mut engine, time, sink) = new_engine();
    engine.play("Kicks").unwrap();
    run_until(&mut engine, &time, 2.0);

    let hits = note_ons(&sink);
    let clicks: Vec<(f64, u8)> = hits.iter().copied().filter(|(t, _)| *t < 2.0).collect();
    assert_eq!(clicks, vec![(0.0, 76), (0.5, 77), (1.0, 77), (1.5, 77)]);
    assert_eq!(hits.last(), Some(&(2.0, KICK)));
}

#[test]
fn count_in_can_be_silent() {
    let (mut engine, time, sink) = new_engine_with(PerformanceConfig {
        count_in: false,
        ..PerformanceConfig::default()
    });
    engine.play("Kicks").unwrap();
    run_until(&mut engine, &time, 1.9);
    assert!(sink.scheduled().is_empty());
    assert_eq!(engine.progress().phase, ClockPhase::CountIn);
}

#[test]
fn preview_runs_outside_the_session() {
    let (mut engine, time, sink) = new_engine();
    time.set(1.0);
    let end = engine.preview("Snares").unwrap();
    assert_eq!(end, 3.0);
    assert!(!engine.is_playing());

    run_until(&mut engine, &time, 3.5);
    let hits = note_ons(&sink);
    assert_eq!(hits, vec![(1.5, SNARE), (2.5, SNARE)]);
    assert_eq!(engine.scheduler().sounding_count(), 0);
}
