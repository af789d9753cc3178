//! Edge case tests and robustness validation
//!
//! Extreme tempos, empty patterns, unknown names and odd times must never
//! panic the engine or leave notes sounding.

use backbeat::messaging::channels::NotificationConsumer;
use backbeat::{
    ChordDefinition, EngineError, InMemoryLibrary, InstrumentPreset, Key, ManualTimeSource,
    NotificationCategory, NoteScheduler, Pattern, PatternKind, PatternRow, PerformanceConfig,
    PerformanceEngine, RecordingSink, Tempo, create_notification_channel,
};
use ringbuf::traits::Consumer;
use std::sync::Arc;

fn library() -> Arc<InMemoryLibrary> {
    Arc::new(
        InMemoryLibrary::new()
            .with_pattern(Pattern::new("Silence", PatternKind::Percussion, 2, 8))
            .with_pattern(
                Pattern::new("Kicks", PatternKind::Percussion, 1, 4)
                    .with_row(PatternRow::from_hits(36, "xxxx")),
            )
            .with_pattern(
                Pattern::new("Wide strum", PatternKind::Strum, 1, 4)
                    .with_row(PatternRow::from_hits(0, "x..."))
                    .with_row(PatternRow::from_hits(9, "x...")),
            )
            .with_chord(ChordDefinition::frets("Muted", &[None, None, None, None, None, None]))
            .with_chord(ChordDefinition::frets(
                "High",
                &[Some(24), Some(24), Some(24), Some(24), Some(24), Some(24)],
            )),
    )
}

fn engine() -> (PerformanceEngine, ManualTimeSource, RecordingSink, NotificationConsumer) {
    let time = ManualTimeSource::new(0.0);
    let sink = RecordingSink::new();
    let library = library();
    let mut engine = PerformanceEngine::new(
        Box::new(sink.clone()),
        Arc::new(time.clone()),
        library.clone(),
        library,
        PerformanceConfig::default().resolve(),
    );
    let (tx, rx) = create_notification_channel(16);
    engine.attach_notifications(tx);
    (engine, time, sink, rx)
}

fn advance(engine: &mut PerformanceEngine, time: &ManualTimeSource, seconds: f64) {
    let ticks = (seconds / 0.01).round() as usize;
    for _ in 0..ticks {
        time.advance(0.01);
        engine.tick();
    }
}

/// Invalid tempos keep the last good one, out-of-range tempos are clamped
#[test]
fn test_extreme_tempos() {
    let (mut engine, _time, _sink, mut notifications) = engine();

    assert_eq!(engine.set_tempo(90.0).bpm(), 90.0);
    for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 0.0, -120.0] {
        assert_eq!(engine.set_tempo(bad).bpm(), 90.0, "bpm {bad}");
    }
    assert_eq!(engine.set_tempo(10_000.0).bpm(), Tempo::MAX_BPM);
    assert_eq!(engine.set_tempo(1.0).bpm(), Tempo::MIN_BPM);

    let mut adjusted = 0;
    while let Some(notification) = notifications.try_pop() {
        assert_eq!(notification.category, NotificationCategory::Configuration);
        adjusted += 1;
    }
    assert_eq!(adjusted, 7);
}

/// Tempo changes while the loop runs never produce a negative step
#[test]
fn test_tempo_thrash_while_playing() {
    let (mut engine, time, sink, _notifications) = engine();
    engine.play("Kicks").unwrap();

    for bpm in [240.0, 40.0, 200.0, 60.0, 123.4, 40.0, 240.0] {
        engine.set_tempo(bpm);
        advance(&mut engine, &time, 0.73);
    }
    engine.stop();

    let times: Vec<f64> = sink.scheduled().iter().map(|e| e.time).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(engine.scheduler().sounding_count(), 0);
}

/// An empty pattern plays silently but still keeps time
#[test]
fn test_empty_pattern_keeps_time() {
    let (mut engine, time, sink, _notifications) = engine();
    engine.play("Silence").unwrap();
    advance(&mut engine, &time, 6.5);

    assert!(engine.is_playing());
    assert_eq!(engine.progress().measure, 2);
    // Only the count-in clicks
    assert_eq!(sink.scheduled().len(), 8);
}

#[test]
fn test_unknown_names_are_reported_not_fatal() {
    let (mut engine, time, sink, mut notifications) = engine();

    assert!(matches!(
        engine.play("Nope"),
        Err(EngineError::UnknownPattern(_))
    ));
    assert!(matches!(
        engine.play_chord("Nope", "Wide strum"),
        Err(EngineError::UnknownChord(_))
    ));
    assert!(matches!(
        engine.play_chord("High", "Nope"),
        Err(EngineError::UnknownPattern(_))
    ));
    assert!(matches!(
        engine.audition_chord("Nope"),
        Err(EngineError::UnknownChord(_))
    ));
    assert!(matches!(
        engine.preview("Nope"),
        Err(EngineError::UnknownPattern(_))
    ));

    advance(&mut engine, &time, 1.0);
    assert!(!engine.is_playing());
    assert!(sink.records().is_empty());

    let mut resolution = 0;
    while let Some(notification) = notifications.try_pop() {
        if notification.category == NotificationCategory::Resolution {
            resolution += 1;
        }
    }
    assert!(resolution >= 3);
}

/// Fully muted chords schedule nothing
#[test]
fn test_muted_chord_is_silent() {
    let (mut engine, time, sink, _notifications) = engine();
    let trigger = engine.play_chord("Muted", "Wide strum").unwrap();
    assert!(trigger.event_ids.is_empty());

    advance(&mut engine, &time, 3.0);
    assert!(sink.scheduled().is_empty());
}

/// Rows addressing strings the instrument does not have are skipped
#[test]
fn test_rows_beyond_the_instrument_are_ignored() {
    let (mut engine, _time, _sink, _notifications) = engine();
    engine.set_preset(InstrumentPreset::ukulele());

    let trigger = engine.play_chord("High", "Wide strum").unwrap();
    // String 0 only: an on and an off
    assert_eq!(trigger.event_ids.len(), 2);
}

/// Capo and transpose can never push a note past the MIDI range
#[test]
fn test_note_range_is_clamped() {
    let chord = ChordDefinition::frets("High", &[Some(24); 6]);
    let notes = chord.notes(&[100, 127], Key::default(), 12, 24);
    assert_eq!(notes, vec![Some(127), Some(127), None, None, None, None]);

    let open = ChordDefinition::frets("Open", &[Some(0); 3]);
    let notes = open.notes(&[0, 1, 2], Key::default(), 0, -24);
    assert_eq!(notes, vec![Some(0), Some(0), Some(0)]);
}

/// Odd timestamps fire on the next drain instead of getting lost
#[test]
fn test_non_finite_and_negative_times() {
    let sink = RecordingSink::new();
    let scheduler = NoteScheduler::new(Box::new(sink.clone()));

    scheduler.schedule_note_on(60, 100, 0, f64::NAN);
    scheduler.schedule_note_on(61, 100, 0, -5.0);
    scheduler.schedule_note_on(62, 100, 0, f64::NEG_INFINITY);
    scheduler.schedule_note_on(63, 100, 0, f64::INFINITY);

    assert_eq!(scheduler.process_due(0.0), 3);
    assert_eq!(scheduler.pending_count(), 1);
    scheduler.cancel_all();
    assert_eq!(scheduler.pending_count(), 0);
    assert_eq!(scheduler.sounding_count(), 0);
}

/// Stop and play hammered in quick succession
#[test]
fn test_rapid_start_stop() {
    let (mut engine, time, sink, _notifications) = engine();
    for _ in 0..50 {
        engine.play("Kicks").unwrap();
        advance(&mut engine, &time, 0.01);
        engine.stop();
    }
    assert_eq!(sink.panic_count(), 50);
    assert_eq!(engine.scheduler().pending_count(), 0);
    assert_eq!(engine.scheduler().sounding_count(), 0);
}
